//! # CLI Interface
//!
//! Command-line arguments for `enclave-node`, via `clap` derive. Every `run`
//! flag has an `ENCLAVE_*` environment fallback.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use enclave_protocol::config::{
    DEFAULT_DATA_DIR, DEFAULT_DIFFICULTY, DEFAULT_METRICS_PORT, DEFAULT_P2P_PORT,
    DEFAULT_RPC_PORT, DEFAULT_TRIGGER_THRESHOLD, GOSSIP_INTERVAL,
};

use crate::logging::LogFormat;

/// Enclave chain node.
///
/// Keeps a copy of the chain, gossips it with peers, accepts blocks over
/// HTTP, and optionally mines blocks backed by enclave attestations.
#[derive(Parser, Debug)]
#[command(
    name = "enclave-node",
    about = "Attestation-backed blockchain node",
    version,
    propagate_version = true
)]
pub struct EnclaveNodeCli {
    /// Log output format.
    #[arg(long, global = true, env = "ENCLAVE_LOG_FORMAT", value_enum, default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Create the data directory, the genesis chain and an enclave key.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Directory holding `blockchain.json` and `enclave.key`.
    #[arg(long, short = 'd', env = "ENCLAVE_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Hex identity of the one enclave whose reports are accepted.
    ///
    /// Defaults to this node's own enclave identity.
    #[arg(long, env = "ENCLAVE_UNIQUE_ID")]
    pub trusted_identity: Option<String>,

    /// Hex-encoded enclave signing key. Overrides `<data_dir>/enclave.key`.
    #[arg(long, env = "ENCLAVE_KEY", hide_env_values = true)]
    pub enclave_key: Option<String>,

    /// Required number of leading zero hex digits in a block hash.
    #[arg(long, env = "ENCLAVE_DIFFICULTY", default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: usize,

    /// Port for inbound gossip connections.
    #[arg(long, env = "ENCLAVE_P2P_PORT", default_value_t = DEFAULT_P2P_PORT)]
    pub p2p_port: u16,

    /// Port for the HTTP API (including `POST /newblock`).
    #[arg(long, env = "ENCLAVE_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "ENCLAVE_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Peer to dial, as `host:port[@identity]`. Repeatable.
    #[arg(long = "peer", env = "ENCLAVE_PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Seconds between chain pushes to each peer.
    #[arg(long, env = "ENCLAVE_GOSSIP_INTERVAL_SECS", default_value_t = GOSSIP_INTERVAL.as_secs())]
    pub gossip_interval_secs: u64,

    /// Mine blocks from the local work oracle.
    #[arg(long, env = "ENCLAVE_MINE")]
    pub mine: bool,

    /// Milliseconds between work signals from the local oracle.
    #[arg(long, env = "ENCLAVE_WORK_INTERVAL_MS", default_value_t = 1)]
    pub work_interval_ms: u64,

    /// Work signals per mining attempt.
    #[arg(long, env = "ENCLAVE_TRIGGER_THRESHOLD", default_value_t = DEFAULT_TRIGGER_THRESHOLD,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub trigger_threshold: u64,

    /// Base URL that mined blocks are posted to (`<url>/newblock`).
    #[arg(long, env = "ENCLAVE_SUBMIT_URL")]
    pub submit_url: Option<String>,

    /// Fully validate chains received from peers before adopting them.
    #[arg(long, env = "ENCLAVE_VERIFY_SYNC")]
    pub verify_sync: bool,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Data directory to initialize.
    #[arg(long, short = 'd', env = "ENCLAVE_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Replace an existing enclave key.
    #[arg(long)]
    pub force: bool,
}
