//! # Block Structure
//!
//! A block is the atomic unit of the chain. It carries an opaque payload,
//! a link to its parent, and an attestation report (`proof`) in place of
//! classic proof-of-work.
//!
//! ## Block Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Index     u64     parent.Index + 1          │
//! │  Txs       String  opaque, never parsed      │
//! │  Hash      String  SHA-256 hex (see below)   │
//! │  Nonce     u32     uniform random            │
//! │  PrevHash  String  parent.Hash               │
//! │  Proof     bytes   attestation report        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Hash Computation
//!
//! `Hash = hex(SHA-256(decimal(Index) || PrevHash || decimal(Nonce) || Proof))`.
//! Decimal renderings are ASCII, `PrevHash` is its hex text, `Proof` goes in
//! as raw bytes. `Txs` is NOT covered by the hash.
//!
//! ## Wire Names
//!
//! The JSON field names and their order are part of the file and gossip
//! contract. `Proof` is standard base64 text; `null` is accepted as empty.

use serde::{Deserialize, Serialize};

use crate::config::{GENESIS_HASH, GENESIS_NONCE};
use crate::crypto::hash::sha256_multi;

/// A single block. Immutable after construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Height of this block; genesis is 0.
    #[serde(rename = "Index")]
    pub index: u64,
    /// Opaque transaction payload.
    #[serde(rename = "Txs", default)]
    pub txs: String,
    /// Hex-encoded SHA-256 of the header fields.
    #[serde(rename = "Hash")]
    pub hash: String,
    /// Random nonce. There is no search over it.
    #[serde(rename = "Nonce")]
    pub nonce: u32,
    /// Hash of the parent block. Empty for genesis.
    #[serde(rename = "PrevHash", default)]
    pub prev_hash: String,
    /// Attestation report binding this block to its parent.
    #[serde(rename = "Proof", default, with = "proof_encoding")]
    pub proof: Vec<u8>,
}

impl Block {
    /// The fixed genesis block every chain starts with.
    pub fn genesis() -> Self {
        Block {
            index: 0,
            txs: String::new(),
            hash: GENESIS_HASH.to_string(),
            nonce: GENESIS_NONCE,
            prev_hash: String::new(),
            proof: Vec::new(),
        }
    }

    /// Construct a block on top of `parent` and compute its hash.
    ///
    /// Returns `None` when `parent` already sits at `u64::MAX`.
    pub fn new(parent: &Block, txs: String, nonce: u32, proof: Vec<u8>) -> Option<Self> {
        let index = parent.index.checked_add(1)?;
        let prev_hash = parent.hash.clone();
        let hash = compute_block_hash(index, &prev_hash, nonce, &proof);
        Some(Block {
            index,
            txs,
            hash,
            nonce,
            prev_hash,
            proof,
        })
    }

    /// Recompute the hash from the header fields.
    pub fn compute_hash(&self) -> String {
        compute_block_hash(self.index, &self.prev_hash, self.nonce, &self.proof)
    }

    /// Whether the stored hash matches the content.
    ///
    /// Always false for genesis: its hash is a constant, not a digest.
    pub fn has_valid_hash(&self) -> bool {
        self.compute_hash() == self.hash
    }

    /// Whether this is exactly the genesis block.
    pub fn is_genesis(&self) -> bool {
        *self == Block::genesis()
    }
}

/// Hash a block header from its constituent fields.
pub fn compute_block_hash(index: u64, prev_hash: &str, nonce: u32, proof: &[u8]) -> String {
    let index = index.to_string();
    let nonce = nonce.to_string();
    let digest = sha256_multi(&[
        index.as_bytes(),
        prev_hash.as_bytes(),
        nonce.as_bytes(),
        proof,
    ]);
    hex::encode(digest)
}

/// Base64 text encoding for the `Proof` field.
mod proof_encoding {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(proof: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(proof))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(text) => BASE64.decode(text.as_bytes()).map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
