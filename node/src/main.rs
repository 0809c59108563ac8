// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Enclave Chain Node
//!
//! Entry point for the `enclave-node` binary. Parses CLI arguments,
//! initializes logging and metrics, loads the chain, and wires the
//! long-running tasks together:
//!
//! ```text
//! IntervalOracle --WorkSignal--> WorkTrigger --try_append--> ConsensusGuard
//! TCP peers <--GossipSession--> ConsensusGuard <--POST /newblock-- HTTP API
//! ConsensusGuard --ChainEvent--> metrics
//! ```
//!
//! Subcommands:
//!
//! - `run`     — start the node
//! - `init`    — create the data directory, genesis chain and enclave key
//! - `version` — print build version information

mod api;
mod cli;
mod keys;
mod logging;
mod metrics;
mod oracle;
mod p2p;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{broadcast, mpsc, watch};

use enclave_protocol::attestation::AttestationGateway;
use enclave_protocol::config::ChainParams;
use enclave_protocol::consensus::{ChainEvent, ConsensusGuard};
use enclave_protocol::network::{
    BlockFactory, BlockSubmitter, HttpSubmitter, NoopSubmitter, PeerDiscoveryProvider,
    StaticPeers, WorkTrigger,
};
use enclave_protocol::storage::BlockStore;

use cli::{Commands, EnclaveNodeCli};
use metrics::NodeMetrics;

/// Buffered work signals between the oracle and the trigger.
const WORK_SIGNAL_BUFFER: usize = 1024;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = EnclaveNodeCli::parse();
    logging::init_logging(logging::DEFAULT_FILTER, cli.log_format.into());

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node and runs until Ctrl+C or SIGTERM.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    tracing::info!(
        rpc_port = args.rpc_port,
        p2p_port = args.p2p_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        mine = args.mine,
        "starting enclave-node"
    );

    // --- Enclave and trust ---
    let enclave = Arc::new(keys::load_or_create(
        &args.data_dir,
        args.enclave_key.as_deref(),
    )?);
    let own_identity = enclave.identity_hex().unwrap_or_default();
    let params = match &args.trusted_identity {
        Some(id) => ChainParams::from_hex_identity(id).context("malformed --trusted-identity")?,
        None => ChainParams::from_hex_identity(&own_identity)?,
    }
    .with_difficulty(args.difficulty)
    .with_verified_replacements(args.verify_sync);
    tracing::info!(
        enclave = %own_identity,
        trusted = %hex::encode(&params.trusted_identity),
        difficulty = params.difficulty,
        "enclave ready"
    );

    // --- Chain ---
    let store = BlockStore::new(&args.data_dir);
    let gateway: Arc<dyn AttestationGateway> = enclave;
    let guard = Arc::new(
        ConsensusGuard::open(store.clone(), gateway.clone(), params)
            .with_context(|| format!("failed to load chain from {}", store.path().display()))?,
    );

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to create metrics registry")?);
    node_metrics.set_chain(guard.height(), guard.weight());
    let event_loop = tokio::spawn(record_chain_events(
        guard.subscribe(),
        Arc::clone(&node_metrics),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let peer_count = Arc::new(AtomicU64::new(0));

    // --- Peers ---
    let network = p2p::PeerNetwork::new(
        guard.clone(),
        Duration::from_secs(args.gossip_interval_secs.max(1)),
        Arc::clone(&peer_count),
        Arc::clone(&node_metrics),
        shutdown_rx.clone(),
    );
    let p2p_addr = format!("0.0.0.0:{}", args.p2p_port);
    let p2p_listener = tokio::net::TcpListener::bind(&p2p_addr)
        .await
        .with_context(|| format!("failed to bind P2P listener on {}", p2p_addr))?;
    tracing::info!("P2P listening on {}", p2p_addr);
    let accept_loop = tokio::spawn(network.clone().accept_loop(p2p_listener));

    let discovery: Arc<dyn PeerDiscoveryProvider> =
        Arc::new(StaticPeers::parse(&args.peers).context("malformed --peer")?);
    let dialer = tokio::spawn(network.dial_all(discovery));

    // --- Mining ---
    let mining = if args.mine {
        let submitter: Arc<dyn BlockSubmitter> = match &args.submit_url {
            Some(url) => Arc::new(HttpSubmitter::new(url).context("malformed --submit-url")?),
            None => {
                tracing::info!("no --submit-url, mined blocks spread by gossip only");
                Arc::new(NoopSubmitter)
            }
        };
        let (signal_tx, signal_rx) = mpsc::channel(WORK_SIGNAL_BUFFER);
        let outcome_metrics = Arc::clone(&node_metrics);
        let trigger = WorkTrigger::new(
            guard.clone(),
            BlockFactory::new(gateway),
            submitter,
            args.trigger_threshold,
        )
        .with_outcome_hook(move |outcome| outcome_metrics.observe_mining(outcome));

        let oracle = oracle::IntervalOracle::new(Duration::from_millis(args.work_interval_ms));
        Some((
            tokio::spawn(trigger.run(signal_rx, shutdown_rx.clone())),
            tokio::spawn(oracle.run(signal_tx, shutdown_rx.clone())),
        ))
    } else {
        None
    };

    // --- API server ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            enclave_protocol::config::PROTOCOL_VERSION,
        ),
        guard: guard.clone(),
        peer_count,
    };
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Some((trigger, oracle)) = mining {
        let _ = oracle.await;
        let _ = trigger.await;
    }
    let _ = accept_loop.await;
    dialer.abort();
    event_loop.abort();

    tracing::info!(height = guard.height(), weight = guard.weight(), "enclave-node stopped");
    Ok(())
}

/// Feeds chain events into the metrics until the guard goes away.
async fn record_chain_events(mut events: broadcast::Receiver<ChainEvent>, metrics: Arc<NodeMetrics>) {
    loop {
        match events.recv().await {
            Ok(event) => metrics.observe_chain(&event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "metrics lagged behind chain events");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Creates the data directory, bootstraps the genesis chain and generates
/// an enclave key.
fn init_node(args: cli::InitArgs) -> Result<()> {
    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    let enclave = keys::create(data_dir, args.force)?;
    let identity = enclave.identity_hex().unwrap_or_default();

    let store = BlockStore::new(data_dir);
    let chain = store
        .load()
        .with_context(|| format!("failed to bootstrap chain at {}", store.path().display()))?;

    tracing::info!(identity = %identity, blocks = chain.len(), "node initialized");

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Chain file     : {} ({} blocks)", store.path().display(), chain.len());
    println!("  Enclave key    : {}", keys::key_path(data_dir).display());
    println!("  Identity       : {}", identity);
    println!();
    println!("Peers that accept this node's blocks must run with:");
    println!("  ENCLAVE_UNIQUE_ID={}", identity);

    Ok(())
}

fn print_version() {
    println!("enclave-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol     {}", enclave_protocol::config::PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed, that signal is simply never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
