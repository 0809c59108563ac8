//! # Prometheus Metrics
//!
//! Operational metrics for the node, scraped at `/metrics` on the metrics
//! port. Everything lives in a dedicated [`prometheus::Registry`] with the
//! `enclave` prefix.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

use enclave_protocol::consensus::ChainEvent;
use enclave_protocol::network::MiningOutcome;

/// Metric handles for the node. Cloning shares the underlying metrics.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Blocks in the local chain, genesis included.
    pub chain_height: IntGauge,
    /// Fork-choice weight of the local chain.
    pub chain_weight: IntGauge,
    pub blocks_appended_total: IntCounter,
    pub chains_replaced_total: IntCounter,
    /// Currently open gossip sessions.
    pub connected_peers: IntGauge,
    pub mining_attempts_total: IntCounter,
    /// Mining attempts that ended with a locally appended block.
    pub blocks_mined_total: IntCounter,
}

fn register<C: Collector + Clone + 'static>(
    registry: &Registry,
    metric: C,
) -> Result<C, prometheus::Error> {
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("enclave".into()), None)?;

        let chain_height = register(
            &registry,
            IntGauge::new("chain_height", "Number of blocks in the local chain")?,
        )?;
        let chain_weight = register(
            &registry,
            IntGauge::new("chain_weight", "Sum of leading zeros over the local chain")?,
        )?;
        let blocks_appended_total = register(
            &registry,
            IntCounter::new("blocks_appended_total", "Blocks appended to the local tip")?,
        )?;
        let chains_replaced_total = register(
            &registry,
            IntCounter::new(
                "chains_replaced_total",
                "Times the local chain was replaced by a heavier peer chain",
            )?,
        )?;
        let connected_peers = register(
            &registry,
            IntGauge::new("connected_peers", "Number of open gossip sessions")?,
        )?;
        let mining_attempts_total = register(
            &registry,
            IntCounter::new("mining_attempts_total", "Mining attempts run by the work trigger")?,
        )?;
        let blocks_mined_total = register(
            &registry,
            IntCounter::new("blocks_mined_total", "Mining attempts that appended a block")?,
        )?;

        Ok(Self {
            registry,
            chain_height,
            chain_weight,
            blocks_appended_total,
            chains_replaced_total,
            connected_peers,
            mining_attempts_total,
            blocks_mined_total,
        })
    }

    /// Seeds the chain gauges before any event arrives.
    pub fn set_chain(&self, height: u64, weight: u64) {
        self.chain_height.set(height as i64);
        self.chain_weight.set(weight as i64);
    }

    /// Applies one chain change notification.
    pub fn observe_chain(&self, event: &ChainEvent) {
        match event {
            ChainEvent::BlockAppended { index, weight, .. } => {
                self.blocks_appended_total.inc();
                self.set_chain(index.saturating_add(1), *weight);
            }
            ChainEvent::ChainReplaced { height, weight } => {
                self.chains_replaced_total.inc();
                self.set_chain(*height, *weight);
            }
        }
    }

    pub fn observe_mining(&self, outcome: &MiningOutcome) {
        self.mining_attempts_total.inc();
        if outcome.block().is_some() {
            self.blocks_mined_total.inc();
        }
    }

    /// Renders all metrics in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler for `/metrics`.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
