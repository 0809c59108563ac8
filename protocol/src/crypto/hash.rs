//! # Hashing Utilities
//!
//! Block hashes on this chain are SHA-256, rendered as lowercase hex text.
//! The hex text (not the raw digest) is what gets compared, chained into
//! `PrevHash`, scored for leading zeros and disclosed to the attestation
//! service, so the helpers here hand out both forms.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of the input data.
///
/// # Example
///
/// ```
/// use enclave_protocol::crypto::sha256;
///
/// let hash = sha256(b"enclave");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// SHA-256 over several byte slices, fed to the hasher in order.
///
/// Equivalent to hashing their concatenation without allocating it.
pub fn sha256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Lowercase hex rendering of a SHA-256 digest (64 characters).
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}
