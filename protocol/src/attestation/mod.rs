//! # Attestation Gateway
//!
//! Blocks on this chain are not mined by burning hashes. Each one carries a
//! remote-attestation report from a trusted execution environment, issued
//! over the parent block's hash. Validators check three things about it:
//! the report verifies, it was issued by the one enclave identity the node
//! trusts, and the data it discloses is the parent hash.
//!
//! The attestation service itself is external. The core only sees the
//! [`AttestationGateway`] capability:
//!
//! ```text
//! generate(disclosed bytes) -> report bytes
//! verify(report bytes)      -> (issuer identity, disclosed bytes)
//! ```
//!
//! ## Binding Encoding
//!
//! The miner discloses the parent hash as its ASCII hex text, not as the
//! decoded digest. [`binds_parent`] compares the first [`BINDING_LEN`] bytes
//! of the disclosed data against the first [`BINDING_LEN`] characters of the
//! parent hash text (or the whole hash text when it is shorter).

pub mod software;

use async_trait::async_trait;

use crate::config::BINDING_LEN;

pub use software::{EnclaveKeyError, SoftwareEnclave};

/// Errors surfaced by an attestation gateway.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttestationError {
    /// The trusted-execution service could not be reached, or this gateway
    /// has no capability to issue reports.
    #[error("attestation service unavailable: {0}")]
    Unavailable(String),

    /// The report is malformed or its signature does not check out.
    #[error("invalid attestation report: {0}")]
    Invalid(String),
}

/// The verified contents of an attestation report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedReport {
    /// Hardware (or software) identity of the issuing enclave.
    pub issuer: Vec<u8>,
    /// Data the enclave bound into the report.
    pub disclosed: Vec<u8>,
}

/// Capability to produce and check attestation reports.
///
/// Implementations are shared across tasks behind an `Arc<dyn …>`; both
/// calls may block on a network or hardware round trip.
#[async_trait]
pub trait AttestationGateway: Send + Sync {
    /// Produce a report binding `disclosed`.
    async fn generate(&self, disclosed: &[u8]) -> Result<Vec<u8>, AttestationError>;

    /// Check a report and return its issuer and disclosed data.
    async fn verify(&self, report: &[u8]) -> Result<VerifiedReport, AttestationError>;
}

/// Whether `disclosed` carries the (prefix of the) parent hash text.
pub fn binds_parent(disclosed: &[u8], parent_hash: &str) -> bool {
    let want = parent_hash.len().min(BINDING_LEN);
    if want == 0 || disclosed.len() < want {
        return false;
    }
    disclosed[..want] == parent_hash.as_bytes()[..want]
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARENT: &str = "0f3a9c1e2b4d5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8";

    #[test]
    fn full_hash_text_binds() {
        assert!(binds_parent(PARENT.as_bytes(), PARENT));
    }

    #[test]
    fn only_the_prefix_is_compared() {
        let mut disclosed = PARENT.as_bytes()[..BINDING_LEN].to_vec();
        disclosed.extend_from_slice(&[0u8; 32]);
        assert!(binds_parent(&disclosed, PARENT));
    }

    #[test]
    fn raw_digest_bytes_do_not_bind() {
        let raw = hex::decode(PARENT).unwrap();
        assert!(!binds_parent(&raw, PARENT));
    }

    #[test]
    fn short_or_foreign_data_does_not_bind() {
        assert!(!binds_parent(&PARENT.as_bytes()[..10], PARENT));
        assert!(!binds_parent(b"", PARENT));
        let other = "1".repeat(64);
        assert!(!binds_parent(other.as_bytes(), PARENT));
    }

    #[test]
    fn genesis_hash_is_shorter_than_the_binding_width() {
        let genesis = crate::config::GENESIS_HASH;
        assert!(binds_parent(genesis.as_bytes(), genesis));
        assert!(!binds_parent(b"", genesis));
        assert!(!binds_parent(b"", ""));
    }
}
