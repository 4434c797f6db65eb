use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fabric_peer::{PacketHandler, PeerService};
use fabric_routing::RoutingTable;
use fabric_wire::{Message, MessageHeader, PacketType};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Notified once a destination's merge crosses into unreachable.
#[async_trait]
pub trait UnreachableHandler: Send + Sync {
    async fn on_unreachable(&self, dst: &str);
}

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

/// Gossips `RoutingTable` changes between gateways.
///
/// Registered on a [`PeerService`] as the handler for all three of its
/// packet types (`RouterTableSyncSeq`, `RouterTableRequest`,
/// `RouterTableResponse`); which branch runs is decided by the header's
/// `packet_type`, the same way an announce/discovery handler dispatches off
/// a single registered entry point.
pub struct RouterManager {
    self_id: String,
    peer: Arc<PeerService>,
    table: Arc<RwLock<RoutingTable>>,
    stored_seq: Mutex<HashMap<String, u32>>,
    unreachable_handlers: RwLock<Vec<Arc<dyn UnreachableHandler>>>,
}

impl RouterManager {
    pub fn new(self_id: impl Into<String>, peer: Arc<PeerService>, table: Arc<RwLock<RoutingTable>>) -> Arc<Self> {
        Arc::new(Self {
                self_id: self_id.into(),
                peer,
                table,
                stored_seq: Mutex::new(HashMap::new()),
                unreachable_handlers: RwLock::new(Vec::new()),
        })
    }

    pub async fn register_unreachable_handler(&self, handler: Arc<dyn UnreachableHandler>) {
        self.unreachable_handlers.write().await.push(handler);
    }

    async fn broadcast_seq(&self) {
        let seq = self.table.read().await.status_seq();
        let msg = bare_message(&self.self_id, PacketType::RouterTableSyncSeq, &[], seq.to_be_bytes().to_vec());
        for (dst, outcome) in self.peer.broadcast(msg).await {
            if let Err(err) = outcome {
                log::debug!("router manager {}: sync-seq broadcast to {} failed: {}", self.self_id, dst, err);
            }
        }
    }

    /// Every `period`, broadcast our current `statusSeq`.
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
            log::warn!("router manager {}: malformed seq payload from {}", self.self_id, from_peer);
            return;
        }
        let seq = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let mut stored = self.stored_seq.lock().await;
        let prior = *stored.get(from_peer).unwrap_or(&0);
        let should_pull = seq > prior || RoutingTable::peer_restarted(prior, seq);
        if should_pull {
            stored.insert(from_peer.to_string(), seq);
        }
        drop(stored);

        if should_pull {
            let request = bare_message(&self.self_id, PacketType::RouterTableRequest, from_peer.as_bytes(), Vec::new());
            if let Err(err) = self.peer.send_to_node(from_peer, request).await {
                log::debug!("router manager {}: request to {} failed: {}", self.self_id, from_peer, err);
            }
        }
    }

    async fn on_request(&self, from_peer: &str) {
        let snapshot = self.table.read().await.snapshot();
        let payload = match fabric_routing::encode_table(&snapshot) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("router manager {}: failed to encode table for {}: {}", self.self_id, from_peer, err);
                return;
            }
        };
        let response = bare_message(&self.self_id, PacketType::RouterTableResponse, from_peer.as_bytes(), payload);
        if let Err(err) = self.peer.send_to_node(from_peer, response).await {
            log::debug!("router manager {}: response to {} failed: {}", self.self_id, from_peer, err);
        }
    }

    async fn on_response(&self, from_peer: &str, payload: &[u8]) {
        let entries = match fabric_routing::decode_table(payload) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!("router manager {}: malformed table response from {}: {}", self.self_id, from_peer, err);
                return;
            }
        };

        let summary = self.table.write().await.apply_advertised_table(from_peer, &entries);
        if summary.changed {
            self.broadcast_seq().await;
            let handlers = self.unreachable_handlers.read().await;
            for dst in &summary.unreachable {
                for handler in handlers.iter() {
                    handler.on_unreachable(dst).await;
                }
            }
        }
    }
}

#[async_trait]
impl PacketHandler for RouterManager {
    async fn handle(&self, from_peer: &str, header: MessageHeader, payload: Vec<u8>) {
        match header.packet_type {
            PacketType::RouterTableSyncSeq => self.on_sync_seq(from_peer, &payload).await,
            PacketType::RouterTableRequest => self.on_request(from_peer).await,
            PacketType::RouterTableResponse => self.on_response(from_peer, &payload).await,
            other => log::warn!("router manager {}: unexpected packet type {:?} from {}", self.self_id, other, from_peer),
        }
    }
}
