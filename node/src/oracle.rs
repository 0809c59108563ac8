//! # Work Oracle
//!
//! Stands in for the interpreter whose executed operations count as useful
//! work: emits one [`WorkSignal`] per period until shutdown or until the
//! work trigger goes away.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use enclave_protocol::network::WorkSignal;

pub struct IntervalOracle {
    period: Duration,
}

impl IntervalOracle {
    /// A zero period is raised to one millisecond.
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
        }
    }

    pub async fn run(self, signals: mpsc::Sender<WorkSignal>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if signals.send(WorkSignal).await.is_err() {
                        tracing::debug!("work trigger gone, oracle stopping");
                        return;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn emits_one_signal_per_period() {
        let (tx, mut rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let oracle = tokio::spawn(IntervalOracle::new(Duration::from_millis(10)).run(tx, shutdown_rx));

        let start = tokio::time::Instant::now();
        for _ in 0..3 {
            assert_eq!(rx.recv().await, Some(WorkSignal));
        }
        assert!(start.elapsed() >= Duration::from_millis(20));
        oracle.abort();
    }

    #[tokio::test]
    async fn stops_on_shutdown_and_on_closed_channel() {
        let (tx, _rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let oracle = tokio::spawn(IntervalOracle::new(Duration::from_secs(3600)).run(tx, shutdown_rx));
        shutdown_tx.send(true).unwrap();
        oracle.await.unwrap();

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        IntervalOracle::new(Duration::from_millis(1))
            .run(tx, shutdown_rx)
            .await;
    }
}
