//! # Storage Module
//!
//! Data model and persistence for the chain.
//!
//! ## Architecture
//!
//! ```text
//! block.rs  — Block record, genesis block, hash computation
//! chain.rs  — Blockchain: ordered block sequence
//! store.rs  — BlockStore: JSON chain file, genesis bootstrap
//! ```
//!
//! The chain file and the gossip protocol share one encoding: pretty JSON
//! on disk, compact JSON on the wire. Every save rewrites the whole file.

pub mod block;
pub mod chain;
pub mod store;

pub use block::{compute_block_hash, Block};
pub use chain::Blockchain;
pub use store::{BlockStore, StoreError};
