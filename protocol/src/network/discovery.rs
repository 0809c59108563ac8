//! # Peer Discovery
//!
//! Where outbound gossip connections come from. The node asks its provider
//! for the next endpoint until the provider reports exhaustion.
//!
//! [`StaticPeers`] serves a fixed list parsed from `host:port[@identity]`
//! strings, where `identity` is the hex enclave identity the operator
//! expects at that address. The identity is informational; chain validity
//! never depends on who sent a chain.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A dialable peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEndpoint {
    /// `host:port`.
    pub address: String,
    /// Expected enclave identity, if known.
    pub identity: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerParseError {
    #[error("peer address is empty")]
    Empty,

    #[error("peer address {0} is missing a port")]
    MissingPort(String),

    #[error("peer identity is not valid hex: {0}")]
    Identity(String),
}

impl FromStr for PeerEndpoint {
    type Err = PeerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (address, identity) = match s.split_once('@') {
            Some((addr, id)) => {
                let id = hex::decode(id).map_err(|e| PeerParseError::Identity(e.to_string()))?;
                (addr, Some(id))
            }
            None => (s, None),
        };

        if address.is_empty() {
            return Err(PeerParseError::Empty);
        }
        match address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => return Err(PeerParseError::MissingPort(address.to_string())),
        }

        Ok(Self {
            address: address.to_string(),
            identity,
        })
    }
}

impl fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identity {
            Some(id) => write!(f, "{}@{}", self.address, hex::encode(id)),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Source of outbound peers.
#[async_trait]
pub trait PeerDiscoveryProvider: Send + Sync {
    /// The next peer to dial, or `None` once discovery is exhausted.
    async fn next_peer(&self) -> Option<PeerEndpoint>;
}

/// A fixed, pre-configured peer list.
#[derive(Debug, Default)]
pub struct StaticPeers {
    pending: Mutex<VecDeque<PeerEndpoint>>,
}

impl StaticPeers {
    pub fn new(peers: impl IntoIterator<Item = PeerEndpoint>) -> Self {
        Self {
            pending: Mutex::new(peers.into_iter().collect()),
        }
    }

    /// Parses every entry, failing on the first malformed one.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self, PeerParseError> {
        let peers = entries
            .iter()
            .map(|e| e.as_ref().parse())
            .collect::<Result<Vec<PeerEndpoint>, _>>()?;
        Ok(Self::new(peers))
    }

    pub fn remaining(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl PeerDiscoveryProvider for StaticPeers {
    async fn next_peer(&self) -> Option<PeerEndpoint> {
        self.pending.lock().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_identified_addresses() {
        let plain: PeerEndpoint = "127.0.0.1:4000".parse().unwrap();
        assert_eq!(plain.address, "127.0.0.1:4000");
        assert_eq!(plain.identity, None);

        let tagged: PeerEndpoint = "node-b:4000@abcd".parse().unwrap();
        assert_eq!(tagged.address, "node-b:4000");
        assert_eq!(tagged.identity, Some(vec![0xab, 0xcd]));
        assert_eq!(tagged.to_string(), "node-b:4000@abcd");
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert_eq!("".parse::<PeerEndpoint>(), Err(PeerParseError::Empty));
        assert!(matches!(
            "localhost".parse::<PeerEndpoint>(),
            Err(PeerParseError::MissingPort(_))
        ));
        assert!(matches!(
            "localhost:http".parse::<PeerEndpoint>(),
            Err(PeerParseError::MissingPort(_))
        ));
        assert!(matches!(
            "localhost:4000@xyz".parse::<PeerEndpoint>(),
            Err(PeerParseError::Identity(_))
        ));
    }

    #[tokio::test]
    async fn static_peers_drain_in_order() {
        let peers = StaticPeers::parse(&["a:1", "b:2"]).unwrap();
        assert_eq!(peers.remaining(), 2);
        assert_eq!(peers.next_peer().await.unwrap().address, "a:1");
        assert_eq!(peers.next_peer().await.unwrap().address, "b:2");
        assert_eq!(peers.next_peer().await, None);
    }
}
