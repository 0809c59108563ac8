//! # Block Factory
//!
//! Turns the current tip into a candidate successor:
//!
//! ```text
//! 1. TIP     — last block of the snapshot
//! 2. ATTEST  — ask the enclave for a report over the tip's hash text
//! 3. NONCE   — draw a uniformly random u32
//! 4. BUILD   — index + 1, prev_hash = tip.hash, hash recomputed
//! ```
//!
//! The factory never appends. Whether the candidate meets the difficulty and
//! whether it still extends the tip by the time it reaches the guard is the
//! caller's problem.

use std::sync::Arc;

use rand::Rng;
use thiserror::Error;
use tracing::debug;

use crate::attestation::{AttestationError, AttestationGateway};
use crate::storage::{Block, Blockchain};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Reasons a candidate could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FactoryError {
    #[error("chain has no tip to build on")]
    EmptyChain,

    #[error("tip at index {0} has no successor")]
    IndexOverflow(u64),

    #[error("attestation failed: {0}")]
    Attestation(#[from] AttestationError),
}

// ---------------------------------------------------------------------------
// BlockFactory
// ---------------------------------------------------------------------------

/// Builds candidate blocks on top of a chain snapshot.
#[derive(Clone)]
pub struct BlockFactory {
    gateway: Arc<dyn AttestationGateway>,
}

impl BlockFactory {
    pub fn new(gateway: Arc<dyn AttestationGateway>) -> Self {
        Self { gateway }
    }

    /// Builds a successor of `chain`'s tip with a random nonce.
    pub async fn build(&self, chain: &Blockchain) -> Result<Block, FactoryError> {
        let tip = chain.tip().ok_or(FactoryError::EmptyChain)?;
        let proof = self.gateway.generate(tip.hash.as_bytes()).await?;
        let nonce: u32 = rand::thread_rng().gen();

        let block = Block::new(tip, String::new(), nonce, proof)
            .ok_or(FactoryError::IndexOverflow(tip.index))?;
        debug!(index = block.index, nonce, hash = %block.hash, "candidate built");
        Ok(block)
    }
}
