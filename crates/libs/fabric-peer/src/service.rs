use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fabric_routing::RoutingTable;
use fabric_wire::{Message, MessageHeader, PacketType};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::dedup::DuplicateCache;
use crate::error::PeerError;
use crate::framing;
use crate::session::SessionHandle;

/// Dispatch target for a packet delivered to this gateway, keyed by
/// `packetType`. Registered once per `PacketType` against a
/// [`PeerService`]; `fabric-gossip` registers the router-table/node-info
/// handlers, `fabric-gateway` registers the `P2PMessage`/`BroadcastMessage`
/// application handler.
#[async_trait]
pub trait PacketHandler: Send + Sync {
    async fn handle(&self, from_peer: &str, header: MessageHeader, payload: Vec<u8>);
}

const DEFAULT_DEDUP_CAPACITY: usize = 4096;
const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// Maintains one duplex session per peer gateway.
pub struct PeerService {
    self_id: String,
    unreachable_distance: u8,
    max_frame_size: usize,
    routing: Arc<RwLock<RoutingTable>>,
    sessions: RwLock<HashMap<String, SessionHandle>>,
    endpoint_to_id: RwLock<HashMap<String, String>>,
    handlers: RwLock<HashMap<PacketType, Arc<dyn PacketHandler>>>,
    dedup: Mutex<DuplicateCache>,
    next_generation: AtomicU64,
}

impl PeerService {
    pub fn new(
        self_id: impl Into<String>,
        unreachable_distance: u8,
        max_frame_size: usize,
        routing: Arc<RwLock<RoutingTable>>,
    ) -> Arc<Self> {
        Arc::new(Self {
                self_id: self_id.into(),
                unreachable_distance,
                max_frame_size,
                routing,
                sessions: RwLock::new(HashMap::new()),
                endpoint_to_id: RwLock::new(HashMap::new()),
                handlers: RwLock::new(HashMap::new()),
                dedup: Mutex::new(DuplicateCache::new(DEFAULT_DEDUP_CAPACITY)),
                next_generation: AtomicU64::new(0),
        })
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn routing_table(&self) -> &Arc<RwLock<RoutingTable>> {
        &self.routing
    }

    pub async fn register_handler(&self, packet_type: PacketType, handler: Arc<dyn PacketHandler>) {
        self.handlers.write().await.insert(packet_type, handler);
    }

    pub async fn is_connected(&self, peer_id: &str) -> bool {
        self.sessions.read().await.get(peer_id).map(|s| s.connected()).unwrap_or(false)
    }

    /// Every peer gateway with a currently live session, for `asyncGetPeers`.
    pub async fn peer_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Handshake plus session bookkeeping for one duplex stream.
    /// `endpoint` is the configured dial target when this call originates
    /// from the reconnection loop, or `None` for an inbound accept.
    pub async fn establish<S>(
        self: &Arc<Self>,
        endpoint: Option<String>,
        stream: S,
    ) -> Result<(), PeerError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (mut read_half, mut write_half) = tokio::io::split(stream);

        framing::write_frame(&mut write_half, self.self_id.as_bytes()).await?;
        let remote_bytes = framing::read_frame(&mut read_half, self.max_frame_size).await?;
        let remote_id = String::from_utf8(remote_bytes)
            .map_err(|_| PeerError::HandshakeFailed(endpoint.clone().unwrap_or_default()))?;

        if remote_id == self.self_id {
            log::debug!("peer service {}: dropping self-loop connection", self.self_id);
            return Err(PeerError::SelfLoop);
        }

        if self.is_connected(&remote_id).await {
            log::debug!("peer service {}: duplicate session to {}, keeping existing", self.self_id, remote_id);
            return Ok(());
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_QUEUE_DEPTH);

        let handle = SessionHandle { peer_id: remote_id.clone(), generation, tx, cancel: cancel.clone() };
        self.sessions.write().await.insert(remote_id.clone(), handle);
        if let Some(endpoint) = endpoint {
            self.endpoint_to_id.write().await.insert(endpoint, remote_id.clone());
        }
        {
            let mut table = self.routing.write().await;
            table.apply_advertised_table(&remote_id, &[]);
        }
        log::info!("peer service {}: session established with {}", self.self_id, remote_id);

        let writer_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_cancel.cancelled() => break,
                    frame = rx.recv() => {
                        match frame {
                            Some(bytes) => {
                                if framing::write_frame(&mut write_half, &bytes).await.is_err() {
                                    writer_cancel.cancel();
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        let service = Arc::clone(self);
        let reader_peer_id = remote_id.clone();
        let reader_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = reader_cancel.cancelled() => break,
                    frame = framing::read_frame(&mut read_half, service.max_frame_size) => {
                        match frame {
                            Ok(bytes) => service.receive(&reader_peer_id, bytes).await,
                            Err(err) => {
                                log::warn!("peer service {}: read from {} failed: {}", service.self_id, reader_peer_id, err);
                                break;
                            }
                        }
                    }
                }
            }
            service.on_disconnect(&reader_peer_id, generation).await;
        });

        Ok(())
    }

    /// Remove the session only if it is still the one we established,
    /// guarding against a stale close racing a newer connection.
    pub async fn on_disconnect(&self, peer_id: &str, generation: u64) {
        let mut sessions = self.sessions.write().await;
        if let Some(current) = sessions.get(peer_id) {
            if current.generation != generation {
                return;
            }
        } else {
            return;
        }
        sessions.remove(peer_id);
        drop(sessions);

        let mut endpoints = self.endpoint_to_id.write().await;
        endpoints.retain(|_, id| id != peer_id);
        drop(endpoints);

        let stale = self.routing.write().await.remove_peer(peer_id);
        log::info!(
            "peer service {}: session to {} closed, pruned {} routes",
            self.self_id,
            peer_id,
            stale.len()
        );
    }

    async fn send_raw_to(&self, peer_id: &str, bytes: Vec<u8>) -> Result<(), PeerError> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(peer_id).ok_or_else(|| PeerError::NoSession(peer_id.to_string()))?;
        session.tx.send(bytes).await.map_err(|_| PeerError::NoSession(peer_id.to_string()))
    }

    /// `asyncSendMessageByNodeID`: direct-send if we hold a session for
    /// `dst`, otherwise forward via the routing table's next hop.
    pub async fn send_to_node(&self, dst: &str, mut msg: Message) -> Result<(), PeerError> {
        msg.header.src_gw_node = self.self_id.as_bytes().to_vec();
        msg.header.dst_gw_node = dst.as_bytes().to_vec();

        let next_hop = {
            let table = self.routing.read().await;
            table.next_hop(dst).map(|s| s.to_string())
        };

        let bytes = msg.encode()?;
        match next_hop {
            Some(hop) if hop == dst => self.send_raw_to(dst, bytes).await,
            Some(hop) => self.send_raw_to(&hop, bytes).await,
            None => self.send_raw_to(dst, bytes).await,
        }
    }

    /// Enumerate all reachable nodes and send a copy to each, excluding
    /// self.
    pub async fn broadcast(&self, msg: Message) -> Vec<(String, Result<(), PeerError>)> {
        let targets: Vec<String> = {
            let table = self.routing.read().await;
            table.reachable_entries().map(|e| e.dst.clone()).collect()
        };

        let mut results = Vec::with_capacity(targets.len());
        for dst in targets {
            let outcome = self.send_to_node(&dst, msg.clone()).await;
            results.push((dst, outcome));
        }
        results
    }

    /// Inbound frame off the wire: deliver locally, or re-forward one hop
    /// closer.
    pub async fn receive(&self, from_peer: &str, bytes: Vec<u8>) {
        if self.dedup.lock().await.check_and_insert(&bytes) {
            log::trace!("peer service {}: dropping duplicate frame from {}", self.self_id, from_peer);
            return;
        }

        let msg = match Message::decode(&bytes, self.max_frame_size) {
            Ok(msg) => msg,
            Err(err) => {
                log::warn!("peer service {}: malformed frame from {}: {}", self.self_id, from_peer, err);
                return;
            }
        };

        if msg.header.dst_is_self_or_empty(self.self_id.as_bytes()) {
            self.dispatch_local(from_peer, msg).await;
            return;
        }

        let mut forwarded = msg;
        forwarded.header.ttl += 1;
        if forwarded.header.ttl >= self.unreachable_distance as u16 {
            log::debug!(
                "peer service {}: dropping frame to {:?}, ttl expired",
                self.self_id,
                String::from_utf8_lossy(&forwarded.header.dst_gw_node)
            );
            return;
        }

        let dst = String::from_utf8_lossy(&forwarded.header.dst_gw_node).to_string();
        if let Err(err) = self.send_to_node(&dst, forwarded).await {
            log::warn!("peer service {}: re-forward to {} failed: {}", self.self_id, dst, err);
        }
    }

    async fn dispatch_local(&self, from_peer: &str, msg: Message) {
        let handler = self.handlers.read().await.get(&msg.header.packet_type).cloned();
        match handler {
            Some(handler) => handler.handle(from_peer, msg.header, msg.payload).await,
            None => log::warn!(
                "peer service {}: no local handler registered for {:?}",
                self.self_id,
                msg.header.packet_type
            ),
        }
    }

    /// Fixed-interval reconnection loop: dial every configured
    /// endpoint whose ID is empty or not presently connected, skipping
    /// entries that resolve to our own endpoint.
    pub async fn run_reconnect_loop<F, Fut>(
        self: Arc<Self>,
        endpoints: Vec<String>,
        period: std::time::Duration,
        dial: F,
        cancel: CancellationToken,
    ) where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Option<tokio::net::TcpStream>> + Send,
    {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            for endpoint in &endpoints {
                let known_id = self.endpoint_to_id.read().await.get(endpoint).cloned();
                let connected = match &known_id {
                    Some(id) => self.is_connected(id).await,
                    None => false,
                };
                if connected {
                    continue;
                }

                if let Some(stream) = dial(endpoint.clone()).await {
                    let service = Arc::clone(&self);
                    let endpoint = endpoint.clone();
                    tokio::spawn(async move {
                        if let Err(err) = service.establish(Some(endpoint.clone()), stream).await {
                            log::info!("peer service {}: dial to {} failed: {}", service.self_id, endpoint, err);
                        }
                    });
                }
            }
        }
    }
}
