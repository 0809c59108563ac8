//! # Network Module
//!
//! Everything that moves blocks in or out of the node.
//!
//! ## Architecture
//!
//! ```text
//! producer.rs    — BlockFactory: candidate successor of the tip
//! trigger.rs     — WorkTrigger: every N work signals, one mining attempt
//! submission.rs  — BlockSubmitter: delivery of mined blocks (HTTP, mpsc)
//! gossip.rs      — GossipSession: per-peer chain push/pull over a stream
//! discovery.rs   — PeerDiscoveryProvider: where outbound peers come from
//! ```
//!
//! The module is transport-agnostic: gossip runs over any
//! `AsyncRead + AsyncWrite` stream, and the node binary decides whether that
//! is TCP or something else.

pub mod discovery;
pub mod gossip;
pub mod producer;
pub mod submission;
pub mod trigger;

pub use discovery::{PeerDiscoveryProvider, PeerEndpoint, PeerParseError, StaticPeers};
pub use gossip::{decode_chain, encode_chain, DecodeError, GossipSession};
pub use producer::{BlockFactory, FactoryError};
pub use submission::{BlockSubmitter, ChannelSubmitter, HttpSubmitter, NoopSubmitter, SubmissionError};
pub use trigger::{MiningOutcome, WorkSignal, WorkTrigger};
