//! Gateway dispatch facade: wraps the peer overlay, gossip, and the
//! local/peer routers into the operations a front (or `fabricd`) calls.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fabric_gossip::{NodeInfoManager, RouterManager};
use fabric_nodeinfo::{GatewayNodeInfo, NodeInfo};
use fabric_peer::{PacketHandler, PeerService};
use fabric_router::{send_with_retry, Ack, CallbackManager, DispatchError, FrontHandle, LocalRouter, PeerRouterTable};
use fabric_wire::{Message, MessageHeader, PacketType, RouteInfo, RoutePolicy};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::GatewayHandle;

/// ASCII ack codes exchanged on the wire per: "a short ASCII
/// error-code string (0 = ok, non-zero = dispatch error)".
const ACK_OK: &str = "0";
const ACK_NOT_FOUND: &str = "1001";

/// Wires [`PeerService`], the gossip managers, and [`LocalRouter`] /
/// [`PeerRouterTable`] into the dispatch operations.
pub struct Gateway {
    self_id: String,
    peer: Arc<PeerService>,
    router_manager: Arc<RouterManager>,
    node_info_manager: Arc<NodeInfoManager>,
    local_router: Arc<LocalRouter>,
    peer_router: PeerRouterTable,
    ack_callbacks: Arc<CallbackManager<String>>,
}

impl Gateway {
    /// `local_info` must be the same handle passed to the `NodeInfoManager`
    /// at construction so that a front registering here is visible to the
    /// next gossip broadcast without a separate sync step .
    pub fn new(
        self_id: impl Into<String>,
        peer: Arc<PeerService>,
        router_manager: Arc<RouterManager>,
        node_info_manager: Arc<NodeInfoManager>,
        local_info: Arc<RwLock<GatewayNodeInfo>>,
        holding_ttl: Duration,
    ) -> Arc<Self> {
        let self_id = self_id.into();
        let local_router = LocalRouter::new(local_info, holding_ttl);
        let peer_router = PeerRouterTable::new(self_id.clone(), node_info_manager.peer_snapshots());
        Arc::new(Self {
                self_id,
                peer,
                router_manager,
                node_info_manager,
                local_router,
                peer_router,
                ack_callbacks: CallbackManager::new(),
        })
    }

    pub fn local_router(&self) -> &Arc<LocalRouter> {
        &self.local_router
    }

    /// Background gossip/health loops: one task per loop, independent
    /// `tokio::spawn`ed daemons rather than a single supervisor future.
    pub fn spawn_background_loops(
        &self,
        router_sync_period: Duration,
        node_info_sync_period: Duration,
        health_check_period: Duration,
        cancel: CancellationToken,
    ) {
        tokio::spawn(Arc::clone(&self.router_manager).run_broadcast_loop(router_sync_period, cancel.clone()));
        tokio::spawn(Arc::clone(&self.node_info_manager).run_broadcast_loop(node_info_sync_period, cancel.clone()));
        let local_router = Arc::clone(&self.local_router);
        tokio::spawn(async move { local_router.run_health_checks(health_check_period, cancel).await });
    }

    /// Runs `dispatch_message` against the local router and folds its
    /// possibly-multiple acks into one outcome: dispatched if any receiver
    /// was found, the first failure (if any) otherwise.
    async fn dispatch_locally(
        &self,
        header: MessageHeader,
        payload: Vec<u8>,
        holding: bool,
    ) -> (bool, Option<DispatchError>) {
        let outcomes: Arc<std::sync::Mutex<Vec<Result<(), DispatchError>>>> =
        Arc::new(std::sync::Mutex::new(Vec::new()));
        let collected = Arc::clone(&outcomes);
        let ack: Ack = Arc::new(move |result| {
                collected.lock().unwrap_or_else(|e| e.into_inner()).push(result);
        });

        let dispatched = self.local_router.dispatch_message(header, payload, ack, holding).await;
        let outcomes = Arc::try_unwrap(outcomes).map(|m| m.into_inner().unwrap_or_default()).unwrap_or_default();
        let first_error = outcomes.into_iter().find_map(|r| r.err());
        (dispatched, first_error)
    }

    async fn on_receive_p2p(&self, from_peer: &str, header: MessageHeader, payload: Vec<u8>) {
        if header.is_response() {
            let code = String::from_utf8_lossy(&payload).to_string();
            let result = if code == ACK_OK { Ok(code) } else { Err(DispatchError::NotFoundFrontService) };
            self.ack_callbacks.complete(&header.trace_id, result).await;
            return;
        }

        let trace_id = header.trace_id.clone();
        let (dispatched, _error) = self.dispatch_locally(header, payload, true).await;
        let code = if dispatched { ACK_OK } else { ACK_NOT_FOUND };

        let reply = Message {
            header: MessageHeader {
                version: 1,
                packet_type: PacketType::P2PMessage,
                ttl: 0,
                ext: fabric_wire::EXT_RESPONSE,
                trace_id,
                src_gw_node: self.self_id.as_bytes().to_vec(),
                dst_gw_node: from_peer.as_bytes().to_vec(),
                route_info: Some(RouteInfo::default()),
            },
            payload: code.as_bytes().to_vec(),
        };
        if let Err(err) = self.peer.send_to_node(from_peer, reply).await {
            log::debug!("gateway {}: failed to ack {} back to {}: {}", self.self_id, code, from_peer, err);
        }
    }

    async fn on_receive_broadcast(&self, header: MessageHeader, payload: Vec<u8>) {
        self.dispatch_locally(header, payload, true).await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn attempt_peer(
    self_id: String,
    peer: Arc<PeerService>,
    callbacks: Arc<CallbackManager<String>>,
    policy: RoutePolicy,
    route_info: RouteInfo,
    target: String,
    trace_id: String,
    payload: Vec<u8>,
    timeout: Duration,
) -> Result<(), DispatchError> {
    let header = MessageHeader {
        version: 1,
        packet_type: PacketType::P2PMessage,
        ttl: 0,
        ext: policy.ext_bit(),
        trace_id: trace_id.clone(),
        src_gw_node: self_id.as_bytes().to_vec(),
        dst_gw_node: target.as_bytes().to_vec(),
        route_info: Some(route_info),
    };
    let msg = Message { header, payload };

    let rx = callbacks.register(trace_id.clone(), timeout).await;
    if let Err(err) = peer.send_to_node(&target, msg).await {
        callbacks.cancel(&trace_id).await;
        return Err(DispatchError::Transport(err));
    }

    match rx.await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(DispatchError::ShuttingDown),
    }
}

#[async_trait]
impl PacketHandler for Gateway {
    async fn handle(&self, from_peer: &str, header: MessageHeader, payload: Vec<u8>) {
        match header.packet_type {
            PacketType::P2PMessage => self.on_receive_p2p(from_peer, header, payload).await,
            PacketType::BroadcastMessage => self.on_receive_broadcast(header, payload).await,
            other => log::warn!("gateway {}: unexpected packet type {:?} from {}", self.self_id, other, from_peer),
        }
    }
}

#[async_trait]
impl GatewayHandle for Gateway {
    /// `asyncSendMessage`.
    async fn async_send_message(
        &self,
        policy: RoutePolicy,
        mut route_info: RouteInfo,
        trace_id: String,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<(), DispatchError> {
        route_info.src_inst = self.local_router.node_info().read().await.agency().to_string();
        let header = MessageHeader {
            version: 1,
            packet_type: PacketType::P2PMessage,
            ttl: 0,
            ext: policy.ext_bit(),
            trace_id: trace_id.clone(),
            src_gw_node: self.self_id.as_bytes().to_vec(),
            dst_gw_node: Vec::new(),
            route_info: Some(route_info.clone()),
        };

        let (dispatched, _) = self.dispatch_locally(header, payload.clone(), false).await;
        if dispatched {
            return Ok(());
        }

        let candidates = self.peer_router.select_router(policy, &route_info).await;
        if candidates.is_empty() {
            return Err(DispatchError::NoGatewayFound);
        }

        let self_id = self.self_id.clone();
        let peer = Arc::clone(&self.peer);
        let callbacks = Arc::clone(&self.ack_callbacks);
        send_with_retry(candidates, move |target| {
                let route_info = route_info.clone();
                let trace_id = trace_id.clone();
                let payload = payload.clone();
                let self_id = self_id.clone();
                let peer = Arc::clone(&peer);
                let callbacks = Arc::clone(&callbacks);
                async move {
                    attempt_peer(self_id, peer, callbacks, policy, route_info, target, trace_id, payload, timeout).await
                }
        })
        .await
    }

    /// `asyncSendBroadcast`.
    async fn async_send_broadcast(&self, mut route_info: RouteInfo, payload: Vec<u8>) {
        route_info.clear_dst_node();
        route_info.src_inst = self.local_router.node_info().read().await.agency().to_string();

        let header = MessageHeader {
            version: 1,
            packet_type: PacketType::BroadcastMessage,
            ttl: 0,
            ext: RoutePolicy::Topic.ext_bit(),
            trace_id: String::new(),
            src_gw_node: self.self_id.as_bytes().to_vec(),
            dst_gw_node: Vec::new(),
            route_info: Some(route_info.clone()),
        };
        self.dispatch_locally(header.clone(), payload.clone(), false).await;

        for target in self.peer_router.broadcast_targets().await {
            let msg = Message { header: header.clone(), payload: payload.clone() };
            if let Err(err) = self.peer.send_to_node(&target, msg).await {
                log::debug!("gateway {}: broadcast to {} failed: {}", self.self_id, target, err);
            }
        }
    }

    async fn register_node_info(&self, info: NodeInfo, handle: Arc<dyn FrontHandle>, remove_on_unhealthy: bool) -> bool {
        self.local_router.register(info, handle, remove_on_unhealthy).await
    }

    async fn unregister_node_info(&self, node_id: Vec<u8>) -> bool {
        self.local_router.unregister_node(&node_id).await
    }

    async fn register_topic(&self, node_id: Vec<u8>, topic: String) -> bool {
        self.local_router.register_topic(&node_id, topic).await
    }

    async fn unregister_topic(&self, node_id: Vec<u8>, topic: String) -> bool {
        self.local_router.unregister_topic(&node_id, &topic).await
    }

    async fn get_peers(&self) -> Vec<String> {
        self.peer.peer_ids().await
    }

    async fn get_agencies(&self) -> Vec<String> {
        let mut agencies: Vec<String> = self
        .node_info_manager
        .peer_snapshots()
        .read()
        .await
        .values()
        .map(|info| info.agency().to_string())
        .collect();
        agencies.push(self.local_router.node_info().read().await.agency().to_string());
        agencies.sort();
        agencies.dedup();
        agencies
    }
}
