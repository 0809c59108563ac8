//! # Consensus Module
//!
//! Block validity and fork choice.
//!
//! ```text
//! difficulty.rs  — leading-zero counting on hex hashes
//! weight.rs      — chain weight (sum of leading zeros)
//! validation.rs  — ordered successor checks, whole-chain verification
//! guard.rs       — the lock-guarded owner of the authoritative chain
//! ```

pub mod difficulty;
pub mod guard;
pub mod validation;
pub mod weight;

pub use difficulty::{leading_zeros, meets_difficulty};
pub use guard::{ChainEvent, ConsensusGuard};
pub use validation::{
    check_integrity, check_linkage, check_proof, is_block_valid, verify_chain, ValidationError,
};
pub use weight::{blocks_weight, chain_weight};
