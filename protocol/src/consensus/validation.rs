//! # Block Validation
//!
//! A candidate block is checked against its parent in a fixed order; the
//! first failing check decides the rejection reason:
//!
//! ```text
//! 1. index      new.index == old.index + 1
//! 2. linkage    new.prev_hash == old.hash
//! 3. integrity  recomputed hash == new.hash
//! 4. difficulty leading zeros of new.hash >= difficulty
//! 5. proof      report verifies, issuer is trusted, data binds old.hash
//! ```
//!
//! Checks 1–4 are pure. Check 5 is a round trip to the attestation gateway,
//! which is why [`is_block_valid`] is async and why the guard runs it before
//! taking its lock.

use thiserror::Error;

use super::difficulty::{leading_zeros, meets_difficulty};
use crate::attestation::{binds_parent, AttestationError, AttestationGateway};
use crate::config::ChainParams;
use crate::storage::{Block, Blockchain};

/// Why a block (or chain) was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("expected index {expected}, got {got}")]
    IndexMismatch { expected: u64, got: u64 },

    #[error("parent index {0} has no successor")]
    IndexOverflow(u64),

    #[error("prev_hash {got} does not match parent hash {expected}")]
    PrevHashMismatch { expected: String, got: String },

    #[error("stored hash {stored} does not match computed {computed}")]
    HashMismatch { stored: String, computed: String },

    #[error("hash has {zeros} leading zeros, difficulty is {required}")]
    InsufficientDifficulty { zeros: usize, required: usize },

    #[error("proof rejected: {0}")]
    Attestation(#[from] AttestationError),

    #[error("proof issued by untrusted enclave {0}")]
    UntrustedIssuer(String),

    #[error("proof is not bound to parent hash")]
    UnboundProof,

    #[error("chain does not start with the genesis block")]
    MissingGenesis,

    #[error("block {index}: {source}")]
    AtBlock {
        index: u64,
        #[source]
        source: Box<ValidationError>,
    },
}

/// Checks 1 and 2: position and parent linkage.
pub fn check_linkage(new: &Block, old: &Block) -> Result<(), ValidationError> {
    let expected = old
        .index
        .checked_add(1)
        .ok_or(ValidationError::IndexOverflow(old.index))?;
    if new.index != expected {
        return Err(ValidationError::IndexMismatch {
            expected,
            got: new.index,
        });
    }
    if new.prev_hash != old.hash {
        return Err(ValidationError::PrevHashMismatch {
            expected: old.hash.clone(),
            got: new.prev_hash.clone(),
        });
    }
    Ok(())
}

/// Checks 3 and 4: content integrity and difficulty.
pub fn check_integrity(new: &Block, difficulty: usize) -> Result<(), ValidationError> {
    let computed = new.compute_hash();
    if computed != new.hash {
        return Err(ValidationError::HashMismatch {
            stored: new.hash.clone(),
            computed,
        });
    }
    if !meets_difficulty(&new.hash, difficulty) {
        return Err(ValidationError::InsufficientDifficulty {
            zeros: leading_zeros(&new.hash),
            required: difficulty,
        });
    }
    Ok(())
}

/// Check 5: the attestation report.
pub async fn check_proof(
    new: &Block,
    old: &Block,
    gateway: &dyn AttestationGateway,
    params: &ChainParams,
) -> Result<(), ValidationError> {
    let report = gateway.verify(&new.proof).await?;
    if report.issuer != params.trusted_identity {
        return Err(ValidationError::UntrustedIssuer(hex::encode(&report.issuer)));
    }
    if !binds_parent(&report.disclosed, &old.hash) {
        return Err(ValidationError::UnboundProof);
    }
    Ok(())
}

/// Full ordered validation of `new` as the successor of `old`.
pub async fn is_block_valid(
    new: &Block,
    old: &Block,
    gateway: &dyn AttestationGateway,
    params: &ChainParams,
) -> Result<(), ValidationError> {
    check_linkage(new, old)?;
    check_integrity(new, params.difficulty)?;
    check_proof(new, old, gateway, params).await
}

/// Validates a whole chain: genesis first, then every block pairwise.
pub async fn verify_chain(
    chain: &Blockchain,
    gateway: &dyn AttestationGateway,
    params: &ChainParams,
) -> Result<(), ValidationError> {
    match chain.get(0) {
        Some(first) if first.is_genesis() => {}
        _ => return Err(ValidationError::MissingGenesis),
    }
    for pair in chain.blocks().windows(2) {
        is_block_valid(&pair[1], &pair[0], gateway, params)
            .await
            .map_err(|e| ValidationError::AtBlock {
                index: pair[1].index,
                source: Box::new(e),
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::SoftwareEnclave;
    use crate::storage::compute_block_hash;

    /// Builds a valid successor of `parent`, walking nonces until the hash
    /// meets `difficulty`.
    async fn mine(parent: &Block, enclave: &SoftwareEnclave, difficulty: usize) -> Block {
        let proof = enclave.generate(parent.hash.as_bytes()).await.unwrap();
        (0u32..)
            .filter_map(|nonce| Block::new(parent, String::new(), nonce, proof.clone()))
            .find(|b| meets_difficulty(&b.hash, difficulty))
            .unwrap()
    }

    fn params_for(enclave: &SoftwareEnclave) -> ChainParams {
        ChainParams::new(enclave.identity().unwrap())
    }

    #[tokio::test]
    async fn mined_block_is_valid() {
        let enclave = SoftwareEnclave::random();
        let genesis = Block::genesis();
        let block = mine(&genesis, &enclave, 1).await;

        is_block_valid(&block, &genesis, &enclave, &params_for(&enclave))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn index_gap_is_rejected() {
        let enclave = SoftwareEnclave::random();
        let params = params_for(&enclave);

        let mut parent = Block::genesis();
        for _ in 0..3 {
            parent = mine(&parent, &enclave, 1).await;
        }
        assert_eq!(parent.index, 3);

        // Well-formed in every other respect, but claims index 5.
        let good = mine(&parent, &enclave, 1).await;
        let skipped = (0u32..)
            .map(|n| Block {
                index: 5,
                nonce: n,
                hash: compute_block_hash(5, &good.prev_hash, n, &good.proof),
                ..good.clone()
            })
            .find(|b| meets_difficulty(&b.hash, 1))
            .unwrap();

        let err = is_block_valid(&skipped, &parent, &enclave, &params)
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::IndexMismatch { expected: 4, got: 5 });
    }

    #[test]
    fn parent_at_max_index_has_no_successor() {
        let parent = Block {
            index: u64::MAX,
            hash: "0".repeat(64),
            ..Block::genesis()
        };
        let child = Block {
            index: 0,
            prev_hash: parent.hash.clone(),
            ..Block::genesis()
        };
        assert_eq!(
            check_linkage(&child, &parent),
            Err(ValidationError::IndexOverflow(u64::MAX))
        );
    }

    #[tokio::test]
    async fn mismatched_prev_hash_is_rejected_even_when_self_consistent() {
        let enclave = SoftwareEnclave::random();
        let genesis = Block::genesis();
        let parent = mine(&genesis, &enclave, 1).await;

        // Same height as the real parent, different hash.
        let impostor = Block {
            hash: "00ab".repeat(16),
            ..parent.clone()
        };
        assert_ne!(impostor.hash, parent.hash);
        let foreign = mine(&impostor, &enclave, 1).await;
        assert!(foreign.has_valid_hash());
        assert_eq!(foreign.index, parent.index + 1);

        let err = is_block_valid(&foreign, &parent, &enclave, &params_for(&enclave))
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::PrevHashMismatch { .. }));
    }

    #[tokio::test]
    async fn tampered_hash_is_rejected() {
        let enclave = SoftwareEnclave::random();
        let genesis = Block::genesis();
        let mut block = mine(&genesis, &enclave, 1).await;
        block.nonce = block.nonce.wrapping_add(1);

        let err = is_block_valid(&block, &genesis, &enclave, &params_for(&enclave))
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::HashMismatch { .. }));
    }

    #[tokio::test]
    async fn easy_hash_fails_difficulty() {
        let enclave = SoftwareEnclave::random();
        let genesis = Block::genesis();
        let proof = enclave.generate(genesis.hash.as_bytes()).await.unwrap();
        let block = (0u32..)
            .filter_map(|n| Block::new(&genesis, String::new(), n, proof.clone()))
            .find(|b| leading_zeros(&b.hash) == 0)
            .unwrap();

        let err = is_block_valid(&block, &genesis, &enclave, &params_for(&enclave))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::InsufficientDifficulty { zeros: 0, required: 1 }
        );
    }

    #[tokio::test]
    async fn foreign_enclave_is_untrusted() {
        let trusted = SoftwareEnclave::random();
        let rogue = SoftwareEnclave::random();
        let genesis = Block::genesis();
        let block = mine(&genesis, &rogue, 1).await;

        let err = is_block_valid(&block, &genesis, &trusted, &params_for(&trusted))
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::UntrustedIssuer(_)));
    }

    #[tokio::test]
    async fn proof_over_other_data_is_unbound() {
        let enclave = SoftwareEnclave::random();
        let genesis = Block::genesis();
        let proof = enclave.generate(b"operation-counter:42").await.unwrap();
        let block = (0u32..)
            .filter_map(|n| Block::new(&genesis, String::new(), n, proof.clone()))
            .find(|b| meets_difficulty(&b.hash, 1))
            .unwrap();

        let err = is_block_valid(&block, &genesis, &enclave, &params_for(&enclave))
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::UnboundProof);
    }

    #[tokio::test]
    async fn garbage_proof_is_an_attestation_error() {
        let enclave = SoftwareEnclave::random();
        let genesis = Block::genesis();
        let block = (0u32..)
            .filter_map(|n| Block::new(&genesis, String::new(), n, b"junk".to_vec()))
            .find(|b| meets_difficulty(&b.hash, 1))
            .unwrap();

        let err = is_block_valid(&block, &genesis, &enclave, &params_for(&enclave))
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::Attestation(AttestationError::Invalid(_))));
    }

    #[tokio::test]
    async fn verify_chain_accepts_mined_chain_and_names_bad_block() {
        let enclave = SoftwareEnclave::random();
        let params = params_for(&enclave);

        let mut chain = Blockchain::genesis();
        for _ in 0..3 {
            let next = mine(chain.tip().unwrap(), &enclave, 1).await;
            chain.append(next);
        }
        verify_chain(&chain, &enclave, &params).await.unwrap();

        let mut blocks = chain.into_blocks();
        blocks[2].nonce ^= 1;
        let broken = Blockchain::from_blocks(blocks);
        let err = verify_chain(&broken, &enclave, &params).await.unwrap_err();
        assert!(matches!(err, ValidationError::AtBlock { index: 2, .. }));
    }

    #[tokio::test]
    async fn verify_chain_requires_genesis() {
        let enclave = SoftwareEnclave::random();
        let params = params_for(&enclave);
        let err = verify_chain(&Blockchain::default(), &enclave, &params)
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingGenesis);

        let mut fake = Block::genesis();
        fake.nonce = 22;
        let err = verify_chain(&Blockchain::from_blocks(vec![fake]), &enclave, &params)
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingGenesis);
    }
}
