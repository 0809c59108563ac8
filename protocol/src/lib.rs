// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Enclave Chain — Core Library
//!
//! A small blockchain where the right to extend the chain comes from a
//! trusted execution environment instead of raw hash power. Nodes count
//! "useful work" signals; every N signals they ask the enclave for an
//! attestation report over the current tip's hash, wrap it in a block, and
//! keep it if the block hash clears a leading-zero difficulty. Peers gossip
//! whole chains and keep the heaviest one they have seen.
//!
//! ## Architecture
//!
//! - **config** — Protocol constants and chain parameters.
//! - **crypto** — SHA-256 helpers.
//! - **storage** — Block record, chain container, JSON chain file.
//! - **attestation** — The enclave gateway trait and a software enclave.
//! - **consensus** — Difficulty, chain weight, validation, and the guard
//!   that owns the authoritative chain.
//! - **network** — Block factory, work trigger, submission, gossip, and
//!   peer discovery.
//!
//! ## Ground Rules
//!
//! 1. Only the [`consensus::ConsensusGuard`] mutates the chain.
//! 2. No lock is held across attestation calls, disk writes, or sockets.
//! 3. Steady-state errors are logged and survived. Only a chain file that
//!    cannot be loaded at startup is fatal.

pub mod attestation;
pub mod config;
pub mod consensus;
pub mod crypto;
pub mod network;
pub mod storage;
