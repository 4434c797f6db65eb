use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fabric_nodeinfo::GatewayNodeInfo;
use fabric_peer::{PacketHandler, PeerService};
use fabric_wire::{Message, MessageHeader, PacketType};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

fn bare_message(self_id: &str, packet_type: PacketType, dst: &[u8], payload: Vec<u8>) -> Message {
    Message {
        header: MessageHeader {
            version: 1,
            packet_type,
            ttl: 0,
            ext: 0,
            trace_id: String::new(),
            src_gw_node: self_id.as_bytes().to_vec(),
            dst_gw_node: dst.to_vec(),
            route_info: None,
        },
        payload,
    }
}

/// Gossips `GatewayNodeInfo` between gateways: structurally identical
/// to [`crate::router_manager::RouterManager`], carrying a different
/// payload.
pub struct NodeInfoManager {
    self_id: String,
    peer: Arc<PeerService>,
    local: Arc<RwLock<GatewayNodeInfo>>,
    peer_snapshots: Arc<RwLock<HashMap<String, GatewayNodeInfo>>>,
    stored_seq: Mutex<HashMap<String, u32>>,
}

impl NodeInfoManager {
    pub fn new(self_id: impl Into<String>, peer: Arc<PeerService>, local: Arc<RwLock<GatewayNodeInfo>>) -> Arc<Self> {
        Arc::new(Self {
                self_id: self_id.into(),
                peer,
                local,
                peer_snapshots: Arc::new(RwLock::new(HashMap::new())),
                stored_seq: Mutex::new(HashMap::new()),
        })
    }

    /// Shared handle to the peer snapshot map, for `fabric_router::PeerRouterTable`
    /// to index from. Shared by `Arc` rather than copied since
    /// `GatewayNodeInfo` carries unbounded maps, and the peer router table
    /// must see each gossip pull immediately.
    pub fn peer_snapshots(&self) -> Arc<RwLock<HashMap<String, GatewayNodeInfo>>> {
        Arc::clone(&self.peer_snapshots)
    }

    async fn broadcast_seq(&self) {
        let seq = self.local.read().await.status_seq();
        let msg = bare_message(&self.self_id, PacketType::SyncNodeSeq, &[], seq.to_be_bytes().to_vec());
        for (dst, outcome) in self.peer.broadcast(msg).await {
            if let Err(err) = outcome {
                log::debug!("node-info manager {}: sync-seq broadcast to {} failed: {}", self.self_id, dst, err);
            }
        }
    }

    pub async fn run_broadcast_loop(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => self.broadcast_seq().await,
            }
        }
    }

    async fn on_sync_seq(&self, from_peer: &str, payload: &[u8]) {
        if payload.len() < 4 {
            log::warn!("node-info manager {}: malformed seq payload from {}", self.self_id, from_peer);
            return;
        }
        let seq = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let mut stored = self.stored_seq.lock().await;
        let prior = *stored.get(from_peer).unwrap_or(&0);
        let should_pull = seq > prior || GatewayNodeInfo::peer_restarted(prior, seq);
        if should_pull {
            stored.insert(from_peer.to_string(), seq);
        }
        drop(stored);

        if should_pull {
            let request = bare_message(&self.self_id, PacketType::RequestNodeStatus, from_peer.as_bytes(), Vec::new());
            if let Err(err) = self.peer.send_to_node(from_peer, request).await {
                log::debug!("node-info manager {}: request to {} failed: {}", self.self_id, from_peer, err);
            }
        }
    }

    async fn on_request(&self, from_peer: &str) {
        let payload = match self.local.read().await.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("node-info manager {}: failed to encode local status for {}: {}", self.self_id, from_peer, err);
                return;
            }
        };
        let response = bare_message(&self.self_id, PacketType::ResponseNodeStatus, from_peer.as_bytes(), payload);
        if let Err(err) = self.peer.send_to_node(from_peer, response).await {
            log::debug!("node-info manager {}: response to {} failed: {}", self.self_id, from_peer, err);
        }
    }

    async fn on_response(&self, from_peer: &str, payload: &[u8]) {
        let decoded = match GatewayNodeInfo::decode(payload) {
            Ok(decoded) => decoded,
            Err(err) => {
                log::warn!("node-info manager {}: malformed status response from {}: {}", self.self_id, from_peer, err);
                return;
            }
        };

        let mut snapshots = self.peer_snapshots.write().await;
        let is_newer = match snapshots.get(from_peer) {
            Some(existing) => {
                decoded.status_seq() > existing.status_seq()
                || GatewayNodeInfo::peer_restarted(existing.status_seq(), decoded.status_seq())
            }
            None => true,
        };
        if is_newer {
            snapshots.insert(from_peer.to_string(), decoded);
        }
    }
}

#[async_trait]
impl PacketHandler for NodeInfoManager {
    async fn handle(&self, from_peer: &str, header: MessageHeader, payload: Vec<u8>) {
        match header.packet_type {
            PacketType::SyncNodeSeq => self.on_sync_seq(from_peer, &payload).await,
            PacketType::RequestNodeStatus => self.on_request(from_peer).await,
            PacketType::ResponseNodeStatus => self.on_response(from_peer, &payload).await,
            other => log::warn!("node-info manager {}: unexpected packet type {:?} from {}", self.self_id, other, from_peer),
        }
    }
}
