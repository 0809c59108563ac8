//! # Work Trigger
//!
//! Converts a stream of "useful work happened" signals into mining attempts.
//! Every `threshold`-th signal runs exactly one attempt:
//!
//! ```text
//! snapshot -> factory.build -> meets difficulty? -> try_append -> submit
//! ```
//!
//! Any step failing abandons the attempt; the next one happens only after
//! another `threshold` signals. Signals are consumed one at a time by a
//! single task, so at most one attempt is ever in flight.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::producer::BlockFactory;
use super::submission::BlockSubmitter;
use crate::consensus::{meets_difficulty, ConsensusGuard};
use crate::storage::Block;

/// One unit of work reported by the work oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkSignal;

/// What happened to one mining attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiningOutcome {
    /// Appended locally and delivered to the submission channel.
    Submitted(Block),
    /// Appended locally, but submission failed.
    AppendedUnsubmitted(Block),
    /// The candidate's hash missed the difficulty.
    DifficultyMiss,
    /// The guard rejected the candidate (usually a tip race).
    Rejected,
    /// The candidate could not be built.
    BuildFailed(String),
}

impl MiningOutcome {
    /// The locally appended block, if any.
    pub fn block(&self) -> Option<&Block> {
        match self {
            Self::Submitted(b) | Self::AppendedUnsubmitted(b) => Some(b),
            _ => None,
        }
    }
}

type OutcomeHook = Box<dyn Fn(&MiningOutcome) + Send + Sync>;

/// Counts work signals and mines every `threshold`-th one.
pub struct WorkTrigger {
    guard: Arc<ConsensusGuard>,
    factory: BlockFactory,
    submitter: Arc<dyn BlockSubmitter>,
    threshold: u64,
    counter: u64,
    on_outcome: Option<OutcomeHook>,
}

impl WorkTrigger {
    /// A `threshold` of zero is treated as one.
    pub fn new(
        guard: Arc<ConsensusGuard>,
        factory: BlockFactory,
        submitter: Arc<dyn BlockSubmitter>,
        threshold: u64,
    ) -> Self {
        Self {
            guard,
            factory,
            submitter,
            threshold: threshold.max(1),
            counter: 0,
            on_outcome: None,
        }
    }

    /// Calls `hook` with the outcome of every attempt made by [`run`](Self::run).
    pub fn with_outcome_hook(
        mut self,
        hook: impl Fn(&MiningOutcome) + Send + Sync + 'static,
    ) -> Self {
        self.on_outcome = Some(Box::new(hook));
        self
    }

    /// Signals counted so far.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Counts one signal. Returns the attempt's outcome if this signal
    /// crossed the threshold.
    pub async fn on_signal(&mut self) -> Option<MiningOutcome> {
        self.counter += 1;
        if self.counter % self.threshold != 0 {
            return None;
        }
        Some(self.attempt().await)
    }

    /// Runs one mining attempt against the current tip.
    pub async fn attempt(&self) -> MiningOutcome {
        let snapshot = self.guard.snapshot();
        let candidate = match self.factory.build(&snapshot).await {
            Ok(block) => block,
            Err(e) => {
                warn!(error = %e, "mining attempt abandoned");
                return MiningOutcome::BuildFailed(e.to_string());
            }
        };

        if !meets_difficulty(&candidate.hash, self.guard.params().difficulty) {
            debug!(hash = %candidate.hash, "candidate missed difficulty");
            return MiningOutcome::DifficultyMiss;
        }

        if !self.guard.try_append(candidate.clone()).await {
            debug!(index = candidate.index, "mined block was not appended");
            return MiningOutcome::Rejected;
        }

        info!(index = candidate.index, hash = %candidate.hash, "mined block");
        match self.submitter.submit(&candidate).await {
            Ok(()) => MiningOutcome::Submitted(candidate),
            Err(e) => {
                warn!(index = candidate.index, error = %e, "block submission failed");
                MiningOutcome::AppendedUnsubmitted(candidate)
            }
        }
    }

    /// Consumes signals until the channel closes or shutdown fires.
    pub async fn run(
        mut self,
        mut signals: mpsc::Receiver<WorkSignal>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(threshold = self.threshold, "work trigger started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(WorkSignal) => {
                        let outcome = self.on_signal().await;
                        if let (Some(outcome), Some(hook)) = (outcome, &self.on_outcome) {
                            hook(&outcome);
                        }
                    }
                    None => {
                        debug!("work signal channel closed");
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!(signals = self.counter, "work trigger stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::{AttestationGateway, SoftwareEnclave};
    use crate::config::ChainParams;
    use crate::network::submission::ChannelSubmitter;
    use crate::storage::BlockStore;

    struct Harness {
        guard: Arc<ConsensusGuard>,
        trigger: WorkTrigger,
        submitted: mpsc::Receiver<Block>,
        _dir: tempfile::TempDir,
    }

    fn harness(difficulty: usize, threshold: u64) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let enclave = Arc::new(SoftwareEnclave::random());
        let params = ChainParams::new(enclave.identity().unwrap()).with_difficulty(difficulty);
        let guard = Arc::new(
            ConsensusGuard::open(BlockStore::new(dir.path()), enclave.clone(), params).unwrap(),
        );
        let (submitter, submitted) = ChannelSubmitter::new(16);
        let trigger = WorkTrigger::new(
            guard.clone(),
            BlockFactory::new(enclave as Arc<dyn AttestationGateway>),
            Arc::new(submitter),
            threshold,
        );
        Harness {
            guard,
            trigger,
            submitted,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn fires_only_on_multiples_of_threshold() {
        let mut h = harness(0, 3);
        assert!(h.trigger.on_signal().await.is_none());
        assert!(h.trigger.on_signal().await.is_none());
        assert!(h.trigger.on_signal().await.is_some());
        assert!(h.trigger.on_signal().await.is_none());
        assert_eq!(h.trigger.counter(), 4);
    }

    #[tokio::test]
    async fn successful_attempt_appends_and_submits() {
        let mut h = harness(0, 1);
        let outcome = h.trigger.on_signal().await.unwrap();

        let block = match outcome {
            MiningOutcome::Submitted(b) => b,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(h.guard.tip(), Some(block.clone()));
        assert_eq!(h.submitted.recv().await, Some(block));
    }

    #[tokio::test]
    async fn impossible_difficulty_never_appends() {
        let mut h = harness(65, 1);
        for _ in 0..5 {
            assert_eq!(
                h.trigger.on_signal().await,
                Some(MiningOutcome::DifficultyMiss)
            );
        }
        assert_eq!(h.guard.height(), 1);
    }

    #[tokio::test]
    async fn submission_failure_keeps_local_block() {
        let h = harness(0, 1);
        drop(h.submitted);
        let outcome = h.trigger.attempt().await;

        assert!(matches!(outcome, MiningOutcome::AppendedUnsubmitted(_)));
        assert_eq!(h.guard.height(), 2);
        assert_eq!(outcome.block(), h.guard.tip().as_ref());
    }

    #[tokio::test]
    async fn run_stops_when_signals_close() {
        let h = harness(0, 2);
        let guard = h.guard.clone();
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counted = attempts.clone();
        let trigger = h.trigger.with_outcome_hook(move |_| {
            counted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        for _ in 0..4 {
            tx.send(WorkSignal).await.unwrap();
        }
        drop(tx);
        trigger.run(rx, shutdown_rx).await;

        assert_eq!(guard.height(), 3);
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let h = harness(0, 1);
        let (_tx, rx) = mpsc::channel::<WorkSignal>(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(h.trigger.run(rx, shutdown_rx));
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
