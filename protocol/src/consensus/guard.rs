//! # Consensus Guard
//!
//! The single owner of the authoritative chain. Everything else in the node
//! (the work trigger, every gossip session, the HTTP ingestion endpoint)
//! sees the chain only through three operations:
//!
//! ```text
//! snapshot()         -> immutable copy of the chain
//! try_append(block)  -> extend the tip if the block is valid
//! try_replace(chain) -> adopt a strictly heavier chain
//! ```
//!
//! ## Locking
//!
//! The chain sits behind one `parking_lot::Mutex`, held only for in-memory
//! copies and mutations. Attestation round trips happen before the lock is
//! taken; disk writes happen after it is released. Linkage is re-checked
//! under the lock, so a block validated against a tip that has since moved
//! is rejected rather than appended to the wrong parent.
//!
//! Saves are serialized by a second, async lock. Each save writes a fresh
//! snapshot taken while holding it, so the last save to run always writes
//! the latest chain regardless of how mutations and saves interleave.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::validation::{check_linkage, is_block_valid, verify_chain};
use super::weight::chain_weight;
use crate::attestation::AttestationGateway;
use crate::config::ChainParams;
use crate::storage::{Block, BlockStore, Blockchain, StoreError};

/// Capacity of the chain event channel. Slow subscribers lag and skip
/// events rather than block consensus.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notifications emitted after the chain changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainEvent {
    /// A block was appended to the tip.
    BlockAppended { index: u64, hash: String, weight: u64 },
    /// The whole chain was replaced by a heavier one.
    ChainReplaced { height: u64, weight: u64 },
}

/// Owns the chain and enforces validity and fork choice on every change.
pub struct ConsensusGuard {
    chain: Mutex<Blockchain>,
    store: BlockStore,
    persist_lock: tokio::sync::Mutex<()>,
    gateway: Arc<dyn AttestationGateway>,
    params: ChainParams,
    events: broadcast::Sender<ChainEvent>,
}

impl ConsensusGuard {
    /// Loads (or bootstraps) the chain from `store`.
    pub fn open(
        store: BlockStore,
        gateway: Arc<dyn AttestationGateway>,
        params: ChainParams,
    ) -> Result<Self, StoreError> {
        let chain = store.load()?;
        info!(
            blocks = chain.len(),
            weight = chain_weight(&chain),
            "chain loaded"
        );
        Ok(Self::with_chain(chain, store, gateway, params))
    }

    /// Wraps an already loaded chain.
    pub fn with_chain(
        chain: Blockchain,
        store: BlockStore,
        gateway: Arc<dyn AttestationGateway>,
        params: ChainParams,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            chain: Mutex::new(chain),
            store,
            persist_lock: tokio::sync::Mutex::new(()),
            gateway,
            params,
            events,
        }
    }

    /// Immutable copy of the current chain.
    pub fn snapshot(&self) -> Blockchain {
        self.chain.lock().clone()
    }

    /// Copy of the current tip.
    pub fn tip(&self) -> Option<Block> {
        self.chain.lock().tip().cloned()
    }

    /// Number of blocks, genesis included.
    pub fn height(&self) -> u64 {
        self.chain.lock().len() as u64
    }

    /// Fork-choice weight of the current chain.
    pub fn weight(&self) -> u64 {
        chain_weight(&self.chain.lock())
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn gateway(&self) -> &Arc<dyn AttestationGateway> {
        &self.gateway
    }

    /// Subscribes to chain change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }

    /// Appends `candidate` if it is a valid successor of the current tip.
    pub async fn try_append(&self, candidate: Block) -> bool {
        let Some(parent) = self.tip() else {
            warn!("cannot append to an empty chain");
            return false;
        };

        if let Err(e) =
            is_block_valid(&candidate, &parent, self.gateway.as_ref(), &self.params).await
        {
            warn!(index = candidate.index, hash = %candidate.hash, error = %e, "block rejected");
            return false;
        }

        let index = candidate.index;
        let hash = candidate.hash.clone();
        let weight = {
            let mut chain = self.chain.lock();
            let linked = match chain.tip() {
                Some(tip) => check_linkage(&candidate, tip),
                None => return false,
            };
            if let Err(e) = linked {
                debug!(index, error = %e, "tip moved during validation");
                return false;
            }
            chain.append(candidate);
            chain_weight(&chain)
        };

        info!(index, hash = %hash, weight, "block appended");
        self.persist().await;
        let _ = self.events.send(ChainEvent::BlockAppended { index, hash, weight });
        true
    }

    /// Adopts `candidate` wholesale if it is strictly heavier than the
    /// current chain. Ties keep the current chain.
    pub async fn try_replace(&self, candidate: Blockchain) -> bool {
        if self.params.verify_replacements {
            if let Err(e) = verify_chain(&candidate, self.gateway.as_ref(), &self.params).await {
                warn!(blocks = candidate.len(), error = %e, "candidate chain failed verification");
                return false;
            }
        }

        let candidate_weight = chain_weight(&candidate);
        let height = candidate.len() as u64;
        {
            let mut chain = self.chain.lock();
            let current_weight = chain_weight(&chain);
            if candidate_weight <= current_weight {
                debug!(
                    candidate_weight,
                    current_weight, "candidate chain is not heavier, keeping ours"
                );
                return false;
            }
            *chain = candidate;
        }

        info!(height, weight = candidate_weight, "heavier chain received, replaced ours");
        self.persist().await;
        let _ = self.events.send(ChainEvent::ChainReplaced {
            height,
            weight: candidate_weight,
        });
        true
    }

    /// Writes the latest chain to disk. Failures are logged; the in-memory
    /// chain stays authoritative.
    async fn persist(&self) {
        let _serialized = self.persist_lock.lock().await;
        let snapshot = self.snapshot();
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.save(&snapshot)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "failed to persist chain"),
            Err(e) => error!(error = %e, "chain persistence task failed"),
        }
    }
}
