//! # Peer Transport
//!
//! Plain TCP under the gossip protocol. Inbound connections come from a
//! `TcpListener`; outbound ones from a [`PeerDiscoveryProvider`]. Either way
//! each connection becomes one [`GossipSession`], and the open-session count
//! is kept in sync with the API and metrics. Every session is stopped when
//! the node's shutdown signal fires.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use enclave_protocol::config::PEER_CONNECTION_TIMEOUT;
use enclave_protocol::consensus::ConsensusGuard;
use enclave_protocol::network::{GossipSession, PeerDiscoveryProvider, PeerEndpoint};

use crate::metrics::SharedMetrics;

pub struct PeerNetwork {
    guard: Arc<ConsensusGuard>,
    gossip_interval: Duration,
    peer_count: Arc<AtomicU64>,
    metrics: SharedMetrics,
    shutdown: watch::Receiver<bool>,
}

impl PeerNetwork {
    pub fn new(
        guard: Arc<ConsensusGuard>,
        gossip_interval: Duration,
        peer_count: Arc<AtomicU64>,
        metrics: SharedMetrics,
        shutdown: watch::Receiver<bool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            guard,
            gossip_interval,
            peer_count,
            metrics,
            shutdown,
        })
    }

    /// Starts a session over `stream` and tracks it until the peer hangs up
    /// or the node shuts down.
    fn attach(self: &Arc<Self>, stream: TcpStream, label: String) {
        let _ = stream.set_nodelay(true);
        let session = GossipSession::spawn(stream, self.guard.clone(), self.gossip_interval, label);

        let open = self.peer_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.metrics.connected_peers.set(open as i64);

        let this = self.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            session.join_until(shutdown).await;
            let open = this.peer_count.fetch_sub(1, Ordering::Relaxed) - 1;
            this.metrics.connected_peers.set(open as i64);
        });
    }

    /// Accepts inbound peers until shutdown.
    pub async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        let mut shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tracing::info!(peer = %addr, "inbound peer connected");
                        self.attach(stream, addr.to_string());
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to accept peer"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// Dials one endpoint, bounded by the connection timeout.
    pub async fn dial(self: &Arc<Self>, peer: &PeerEndpoint) -> bool {
        match tokio::time::timeout(PEER_CONNECTION_TIMEOUT, TcpStream::connect(&peer.address)).await {
            Ok(Ok(stream)) => {
                tracing::info!(peer = %peer, "connected to peer");
                self.attach(stream, peer.address.clone());
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(peer = %peer, error = %e, "failed to connect to peer");
                false
            }
            Err(_) => {
                tracing::warn!(peer = %peer, "peer connection timed out");
                false
            }
        }
    }

    /// Dials every peer the provider yields until it is exhausted.
    pub async fn dial_all(self: Arc<Self>, discovery: Arc<dyn PeerDiscoveryProvider>) -> usize {
        let mut connected = 0;
        while let Some(peer) = discovery.next_peer().await {
            if self.dial(&peer).await {
                connected += 1;
            }
        }
        connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enclave_protocol::attestation::{AttestationGateway, SoftwareEnclave};
    use enclave_protocol::config::ChainParams;
    use enclave_protocol::network::StaticPeers;
    use enclave_protocol::storage::{Block, BlockStore, Blockchain};

    fn network(
        dir: &tempfile::TempDir,
        enclave: &Arc<SoftwareEnclave>,
        shutdown: watch::Receiver<bool>,
    ) -> Arc<PeerNetwork> {
        let params = ChainParams::new(enclave.identity().unwrap());
        let gateway: Arc<dyn AttestationGateway> = enclave.clone();
        let guard = Arc::new(ConsensusGuard::open(BlockStore::new(dir.path()), gateway, params).unwrap());
        PeerNetwork::new(
            guard,
            Duration::from_millis(20),
            Arc::new(AtomicU64::new(0)),
            Arc::new(crate::metrics::NodeMetrics::new().unwrap()),
            shutdown,
        )
    }

    fn heavier_chain() -> Blockchain {
        let genesis = Block::genesis();
        let next = Block {
            index: 1,
            txs: String::new(),
            hash: "0000ff".into(),
            nonce: 1,
            prev_hash: genesis.hash.clone(),
            proof: Vec::new(),
        };
        Blockchain::from_blocks(vec![genesis, next])
    }

    #[tokio::test]
    async fn dialing_node_adopts_heavier_chain() {
        let enclave = Arc::new(SoftwareEnclave::random());
        let (dir_a, dir_b) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let a = network(&dir_a, &enclave, shutdown_rx.clone());
        let b = network(&dir_b, &enclave, shutdown_rx);
        assert!(a.guard.try_replace(heavier_chain()).await);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(a.clone().accept_loop(listener));

        let mut events = b.guard.subscribe();
        let discovery = Arc::new(StaticPeers::parse(&[addr]).unwrap());
        assert_eq!(b.clone().dial_all(discovery).await, 1);

        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(b.guard.snapshot(), heavier_chain());
        assert_eq!(b.peer_count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn unreachable_peer_is_skipped() {
        let enclave = Arc::new(SoftwareEnclave::random());
        let dir = tempfile::tempdir().unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let net = network(&dir, &enclave, shutdown_rx);

        // Bind then drop to get a port nobody listens on.
        let addr = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().to_string()
        };
        let discovery = Arc::new(StaticPeers::parse(&[addr]).unwrap());
        assert_eq!(net.clone().dial_all(discovery).await, 0);
        assert_eq!(net.peer_count.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn shutdown_closes_open_sessions() {
        let enclave = Arc::new(SoftwareEnclave::random());
        let (dir_a, dir_b) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
        let (a_shutdown_tx, a_shutdown_rx) = watch::channel(false);
        let (_b_shutdown_tx, b_shutdown_rx) = watch::channel(false);
        let a = network(&dir_a, &enclave, a_shutdown_rx);
        let b = network(&dir_b, &enclave, b_shutdown_rx);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let accept = tokio::spawn(b.clone().accept_loop(listener));

        let discovery = Arc::new(StaticPeers::parse(&[addr]).unwrap());
        assert_eq!(a.clone().dial_all(discovery).await, 1);
        assert_eq!(a.peer_count.load(Ordering::Relaxed), 1);

        a_shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while a.peer_count.load(Ordering::Relaxed) != 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(a.metrics.connected_peers.get(), 0);
        accept.abort();
    }
}
