//! # Chain Weight
//!
//! Fork choice compares chains by the sum of their blocks' leading-zero
//! counts, genesis included. Length does not enter into it: a short chain
//! of unusually "hard" hashes outweighs a longer chain of easy ones.

use super::difficulty::leading_zeros;
use crate::storage::{Block, Blockchain};

/// Total fork-choice weight of `chain`.
pub fn chain_weight(chain: &Blockchain) -> u64 {
    blocks_weight(chain.blocks())
}

/// Weight of an arbitrary block slice.
pub fn blocks_weight(blocks: &[Block]) -> u64 {
    blocks.iter().map(|b| leading_zeros(&b.hash) as u64).sum()
}
