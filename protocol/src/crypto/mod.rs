//! # Cryptographic Primitives
//!
//! SHA-256 for block hashes. Signatures live with the software enclave in
//! [`crate::attestation`], because on this chain the only thing that signs
//! anything is the attestation service.

pub mod hash;

pub use hash::{sha256, sha256_hex, sha256_multi};
