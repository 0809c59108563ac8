//! # Protocol Configuration & Constants
//!
//! Every magic number of the chain lives here, plus [`ChainParams`], the
//! runtime knobs a node is started with. The genesis constants are part of
//! the compatibility contract with the chain file and the gossip wire format:
//! two nodes with different genesis blocks will never agree on anything.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Crate-level protocol version, reported by the node's status endpoint.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Genesis
// ---------------------------------------------------------------------------

/// Hash of the genesis block. Forty zeros, not sixty-four: it is a constant,
/// not the output of a hash function, and it contributes 40 to every
/// chain's weight.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000";

/// Nonce of the genesis block.
pub const GENESIS_NONCE: u32 = 21;

// ---------------------------------------------------------------------------
// Consensus Parameters
// ---------------------------------------------------------------------------

/// Minimum number of leading `'0'` characters a block hash must carry.
pub const DEFAULT_DIFFICULTY: usize = 1;

/// Number of leading bytes of the attestation's disclosed data that must
/// match the parent hash text. Hardware report-data fields are fixed width,
/// so only a prefix of the 64-character parent hash fits.
pub const BINDING_LEN: usize = 32;

/// Work-oracle signals between two mining attempts.
pub const DEFAULT_TRIGGER_THRESHOLD: u64 = 100_000;

// ---------------------------------------------------------------------------
// Timing Constants
// ---------------------------------------------------------------------------

/// How often each gossip session pushes a chain snapshot to its peer.
pub const GOSSIP_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on a single block submission round trip.
pub const SUBMISSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound peer dial timeout.
pub const PEER_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Network Parameters
// ---------------------------------------------------------------------------

/// Default TCP port for gossip sessions.
pub const DEFAULT_P2P_PORT: u16 = 4000;

/// Default HTTP API port (block ingestion lives at `/newblock`).
pub const DEFAULT_RPC_PORT: u16 = 4001;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 4002;

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// File name of the persisted chain inside the data directory.
pub const CHAIN_FILE_NAME: &str = "blockchain.json";

/// File name of the software enclave signing key inside the data directory.
pub const ENCLAVE_KEY_FILE_NAME: &str = "enclave.key";

/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = "./data";

// ---------------------------------------------------------------------------
// ChainParams
// ---------------------------------------------------------------------------

/// Runtime consensus parameters shared by the guard, the factory and the
/// work trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    /// Issuer identity that attestation reports must carry, raw bytes.
    /// Configured as hex on the command line.
    pub trusted_identity: Vec<u8>,
    /// Leading-zero threshold for block hashes.
    pub difficulty: usize,
    /// Re-validate every block of a candidate chain before letting it
    /// compete on weight. Off by default: weight alone decides.
    pub verify_replacements: bool,
}

impl ChainParams {
    /// Parameters trusting `identity` at the default difficulty.
    pub fn new(trusted_identity: Vec<u8>) -> Self {
        Self {
            trusted_identity,
            ..Self::default()
        }
    }

    /// Decodes a hex-encoded trusted identity.
    pub fn from_hex_identity(identity: &str) -> Result<Self, hex::FromHexError> {
        Ok(Self::new(hex::decode(identity.trim())?))
    }

    /// Builder-style difficulty override.
    pub fn with_difficulty(mut self, difficulty: usize) -> Self {
        self.difficulty = difficulty;
        self
    }

    /// Builder-style toggle for full-chain verification on replacement.
    pub fn with_verified_replacements(mut self, enabled: bool) -> Self {
        self.verify_replacements = enabled;
        self
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            trusted_identity: Vec::new(),
            difficulty: DEFAULT_DIFFICULTY,
            verify_replacements: false,
        }
    }
}

/// Location of the chain file for a given data directory.
pub fn chain_file_path(data_dir: impl Into<PathBuf>) -> PathBuf {
    data_dir.into().join(CHAIN_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_hash_is_all_zeros() {
        assert_eq!(GENESIS_HASH.len(), 40);
        assert!(GENESIS_HASH.chars().all(|c| c == '0'));
    }

    #[test]
    fn hex_identity_decodes() {
        let params = ChainParams::from_hex_identity(" abcd01 ").unwrap();
        assert_eq!(params.trusted_identity, vec![0xab, 0xcd, 0x01]);
        assert_eq!(params.difficulty, DEFAULT_DIFFICULTY);
        assert!(!params.verify_replacements);
    }

    #[test]
    fn hex_identity_rejects_garbage() {
        assert!(ChainParams::from_hex_identity("not-hex").is_err());
    }

    #[test]
    fn chain_file_lives_in_data_dir() {
        let path = chain_file_path("/tmp/node-a");
        assert_eq!(path, PathBuf::from("/tmp/node-a/blockchain.json"));
    }
}
