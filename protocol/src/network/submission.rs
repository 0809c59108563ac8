//! # Block Submission
//!
//! After a locally mined block is appended, it is handed to a
//! [`BlockSubmitter`]. Delivery is best effort: a failed submission leaves
//! the block on the local chain, and gossip carries it to peers anyway.
//!
//! Two implementations ship with the crate:
//!
//! - [`HttpSubmitter`] posts the block's JSON to `<base>/newblock` through a
//!   `reqwest` client, with a bounded timeout.
//! - [`ChannelSubmitter`] forwards blocks into an in-process `mpsc` channel.
//!
//! [`NoopSubmitter`] is for nodes with nowhere to submit to.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::SUBMISSION_TIMEOUT;
use crate::storage::Block;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("submission timed out after {0:?}")]
    Timeout(Duration),

    #[error("submission request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("submission rejected with HTTP status {0}")]
    Rejected(u16),

    #[error("invalid submission URL: {0}")]
    InvalidUrl(String),

    #[error("submission channel is closed")]
    Closed,
}

/// Delivers mined blocks somewhere outside the local chain.
#[async_trait]
pub trait BlockSubmitter: Send + Sync {
    async fn submit(&self, block: &Block) -> Result<(), SubmissionError>;
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Posts blocks to `<base_url>/newblock`.
#[derive(Debug, Clone)]
pub struct HttpSubmitter {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpSubmitter {
    /// `base_url` must be an absolute `http://` or `https://` URL.
    pub fn new(base_url: &str) -> Result<Self, SubmissionError> {
        let invalid = || SubmissionError::InvalidUrl(base_url.to_string());

        let base = Url::parse(base_url).map_err(|_| invalid())?;
        if !matches!(base.scheme(), "http" | "https") || base.host().is_none() {
            return Err(invalid());
        }
        let endpoint = Url::parse(&format!("{}/newblock", base.as_str().trim_end_matches('/')))
            .map_err(|_| invalid())?;

        let client = Client::builder().build().map_err(SubmissionError::Http)?;

        Ok(Self {
            client,
            endpoint,
            timeout: SUBMISSION_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The full `/newblock` URL blocks are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl BlockSubmitter for HttpSubmitter {
    async fn submit(&self, block: &Block) -> Result<(), SubmissionError> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(block)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SubmissionError::Timeout(self.timeout)
                } else {
                    SubmissionError::Http(e)
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SubmissionError::Rejected(status.as_u16()));
        }
        debug!(index = block.index, status = status.as_u16(), "block submitted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-process channel
// ---------------------------------------------------------------------------

/// Forwards submitted blocks into an `mpsc` channel.
#[derive(Debug, Clone)]
pub struct ChannelSubmitter {
    tx: mpsc::Sender<Block>,
}

impl ChannelSubmitter {
    /// Returns the submitter and the receiving end of its channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Block>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl BlockSubmitter for ChannelSubmitter {
    async fn submit(&self, block: &Block) -> Result<(), SubmissionError> {
        self.tx
            .send(block.clone())
            .await
            .map_err(|_| SubmissionError::Closed)
    }
}

/// Accepts every block and does nothing with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSubmitter;

#[async_trait]
impl BlockSubmitter for NoopSubmitter {
    async fn submit(&self, block: &Block) -> Result<(), SubmissionError> {
        debug!(index = block.index, "no submission target, block stays local");
        Ok(())
    }
}
