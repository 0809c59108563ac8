//! # Software Enclave
//!
//! A development stand-in for TEE hardware. It issues reports signed with
//! an Ed25519 key; the enclave identity is the 32-byte public key. Any node
//! can verify reports with a key-less [`SoftwareEnclave::verifier`], but
//! only the holder of the signing key can issue them.
//!
//! ## Report Format
//!
//! ```text
//! bincode(SignedReport {
//!     issuer:    32-byte Ed25519 public key,
//!     data:      disclosed bytes,
//!     signature: Ed25519(REPORT_DOMAIN || data),
//! })
//! ```

use async_trait::async_trait;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{AttestationError, AttestationGateway, VerifiedReport};

/// Domain tag prefixed to the disclosed data before signing.
const REPORT_DOMAIN: &[u8] = b"enclave-chain/report/v1";

/// Errors loading an enclave signing key.
#[derive(Debug, Error)]
pub enum EnclaveKeyError {
    #[error("enclave key is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("enclave key must be 32 bytes, got {0}")]
    Length(usize),
}

#[derive(Serialize, Deserialize)]
struct SignedReport {
    issuer: Vec<u8>,
    data: Vec<u8>,
    signature: Vec<u8>,
}

/// Ed25519-backed attestation gateway.
pub struct SoftwareEnclave {
    signing_key: Option<SigningKey>,
}

impl SoftwareEnclave {
    /// A new enclave with a fresh random key.
    pub fn random() -> Self {
        Self {
            signing_key: Some(SigningKey::generate(&mut OsRng)),
        }
    }

    /// A verify-only gateway. `generate` on it reports `Unavailable`.
    pub fn verifier() -> Self {
        Self { signing_key: None }
    }

    /// Restores an enclave from the 32-byte secret key.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, EnclaveKeyError> {
        let secret: [u8; SECRET_KEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| EnclaveKeyError::Length(bytes.len()))?;
        Ok(Self {
            signing_key: Some(SigningKey::from_bytes(&secret)),
        })
    }

    /// Restores an enclave from a hex-encoded secret key.
    pub fn from_secret_hex(text: &str) -> Result<Self, EnclaveKeyError> {
        Self::from_secret_bytes(&hex::decode(text.trim())?)
    }

    /// Raw secret key bytes, if this enclave can sign.
    pub fn secret_bytes(&self) -> Option<[u8; SECRET_KEY_LENGTH]> {
        self.signing_key.as_ref().map(SigningKey::to_bytes)
    }

    /// Issuer identity this enclave stamps into its reports.
    pub fn identity(&self) -> Option<Vec<u8>> {
        self.signing_key
            .as_ref()
            .map(|k| k.verifying_key().to_bytes().to_vec())
    }

    /// Hex form of [`identity`](Self::identity), as configured on peers.
    pub fn identity_hex(&self) -> Option<String> {
        self.identity().map(hex::encode)
    }

    fn sign_report(&self, data: &[u8]) -> Result<Vec<u8>, AttestationError> {
        let key = self.signing_key.as_ref().ok_or_else(|| {
            AttestationError::Unavailable("enclave has no signing key".to_string())
        })?;

        let signature = key.sign(&signed_message(data));
        let report = SignedReport {
            issuer: key.verifying_key().to_bytes().to_vec(),
            data: data.to_vec(),
            signature: signature.to_bytes().to_vec(),
        };
        bincode::serialize(&report).map_err(|e| AttestationError::Unavailable(e.to_string()))
    }

    fn check_report(report: &[u8]) -> Result<VerifiedReport, AttestationError> {
        let report: SignedReport = bincode::deserialize(report)
            .map_err(|e| AttestationError::Invalid(format!("malformed report: {}", e)))?;

        let issuer: [u8; 32] = report
            .issuer
            .as_slice()
            .try_into()
            .map_err(|_| AttestationError::Invalid("issuer key has wrong length".into()))?;
        let verifying_key = VerifyingKey::from_bytes(&issuer)
            .map_err(|_| AttestationError::Invalid("issuer key is not a curve point".into()))?;
        let signature = Signature::from_slice(&report.signature)
            .map_err(|_| AttestationError::Invalid("signature has wrong length".into()))?;

        verifying_key
            .verify_strict(&signed_message(&report.data), &signature)
            .map_err(|_| AttestationError::Invalid("signature check failed".into()))?;

        Ok(VerifiedReport {
            issuer: report.issuer,
            disclosed: report.data,
        })
    }
}

fn signed_message(data: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(REPORT_DOMAIN.len() + data.len());
    msg.extend_from_slice(REPORT_DOMAIN);
    msg.extend_from_slice(data);
    msg
}

#[async_trait]
impl AttestationGateway for SoftwareEnclave {
    async fn generate(&self, disclosed: &[u8]) -> Result<Vec<u8>, AttestationError> {
        self.sign_report(disclosed)
    }

    async fn verify(&self, report: &[u8]) -> Result<VerifiedReport, AttestationError> {
        Self::check_report(report)
    }
}
