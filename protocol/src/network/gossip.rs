//! # Gossip Session
//!
//! Chain propagation between two connected peers. There is no handshake and
//! no acknowledgement: each side periodically pushes its whole chain, and
//! each side adopts whatever it receives if it is heavier than its own.
//!
//! ## Wire Format
//!
//! ```text
//! <compact JSON array of blocks>\n
//! <compact JSON array of blocks>\n
//! ...
//! ```
//!
//! One UTF-8 line per message. Empty lines are ignored, and lines that do not
//! decode as a chain (bad UTF-8 included) are logged and dropped without
//! closing the session.
//!
//! ## Tasks
//!
//! A session is two independent tokio tasks over the two halves of one
//! stream. The writer sleeps for the gossip interval, then writes the
//! current snapshot; a failed write ends it. The reader runs until EOF or an
//! I/O error on the stream. Neither task holds the chain lock while doing I/O.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::consensus::ConsensusGuard;
use crate::storage::Blockchain;

/// A peer line that could not be decoded as a chain.
#[derive(Debug, Error)]
#[error("malformed chain message: {0}")]
pub struct DecodeError(#[from] pub serde_json::Error);

/// Decodes one gossip line. Trailing whitespace, the newline included, is
/// ignored.
pub fn decode_chain(line: &[u8]) -> Result<Blockchain, DecodeError> {
    Ok(serde_json::from_slice(line)?)
}

/// Encodes a chain as one newline-terminated gossip line.
pub fn encode_chain(chain: &Blockchain) -> Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(chain)?;
    line.push(b'\n');
    Ok(line)
}

/// Handles to the reader and writer tasks of one peer connection.
pub struct GossipSession {
    peer: String,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl GossipSession {
    /// Splits `stream` and starts both tasks.
    pub fn spawn<S>(
        stream: S,
        guard: Arc<ConsensusGuard>,
        interval: Duration,
        peer_label: impl Into<String>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let peer = peer_label.into();
        let (read_half, write_half) = tokio::io::split(stream);

        let reader = tokio::spawn(read_loop(read_half, guard.clone(), peer.clone()));
        let writer = tokio::spawn(write_loop(write_half, guard, interval, peer.clone()));

        info!(peer = %peer, "gossip session started");
        Self {
            peer,
            reader,
            writer,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Whether the peer has hung up.
    pub fn is_finished(&self) -> bool {
        self.reader.is_finished()
    }

    /// Stops both tasks.
    pub fn abort(&self) {
        self.reader.abort();
        self.writer.abort();
    }

    /// Waits for the reader to end, then stops the writer.
    pub async fn join(self) {
        let _ = self.reader.await;
        self.writer.abort();
        info!(peer = %self.peer, "gossip session closed");
    }

    /// Like [`join`](Self::join), but also stops both tasks once `shutdown`
    /// turns true or its sender goes away.
    pub async fn join_until(self, mut shutdown: watch::Receiver<bool>) {
        let mut reader = self.reader;
        tokio::select! {
            _ = &mut reader => {}
            _ = shutdown.wait_for(|stop| *stop) => {
                debug!(peer = %self.peer, "stopping gossip session for shutdown");
            }
        }
        reader.abort();
        self.writer.abort();
        info!(peer = %self.peer, "gossip session closed");
    }
}

async fn read_loop<R>(read_half: R, guard: Arc<ConsensusGuard>, peer: String)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(read_half);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => {
                debug!(peer = %peer, "peer closed the stream");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(peer = %peer, error = %e, "gossip read failed");
                return;
            }
        }

        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        match decode_chain(&line) {
            Ok(chain) => {
                trace!(peer = %peer, blocks = chain.len(), "chain received");
                if guard.try_replace(chain).await {
                    info!(peer = %peer, height = guard.height(), "adopted chain from peer");
                }
            }
            Err(e) => warn!(peer = %peer, error = %e, "dropping gossip line"),
        }
    }
}

async fn write_loop<W>(mut write_half: W, guard: Arc<ConsensusGuard>, interval: Duration, peer: String)
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::time::sleep(interval).await;

        let line = match encode_chain(&guard.snapshot()) {
            Ok(line) => line,
            Err(e) => {
                warn!(peer = %peer, error = %e, "failed to encode chain");
                continue;
            }
        };

        let written = async {
            write_half.write_all(&line).await?;
            write_half.flush().await
        };
        if let Err(e) = written.await {
            debug!(peer = %peer, error = %e, "gossip write failed, stopping writer");
            return;
        }
    }
}
