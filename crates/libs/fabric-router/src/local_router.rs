//! Index of fronts attached to this gateway.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fabric_nodeinfo::{GatewayNodeInfo, NodeInfo};
use fabric_wire::{MessageHeader, PacketType, RouteInfo, RoutePolicy};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::DispatchError;
use crate::holding::{Ack, HoldingCache};

/// A local front's inbound delivery target, bound at `register` time to
/// a gateway-client handle for the front's endpoint. One implementor
/// lives in `fabric-front` (an in-process or gRPC channel to a real
/// front); tests here use a simple in-memory stub.
#[async_trait]
pub trait FrontHandle: Send + Sync {
    async fn deliver(&self, header: MessageHeader, payload: Vec<u8>) -> Result<(), DispatchError>;

    /// Liveness probe used by the health checker. Handles with no
    /// out-of-process channel to probe can accept the default.
    async fn health_check(&self) -> bool {
        true
    }
}

struct RegisteredFront {
    handle: Arc<dyn FrontHandle>,
    remove_on_unhealthy: bool,
}

/// Indexes fronts attached to this gateway and picks receivers per routing
/// policy. Holds the authoritative [`GatewayNodeInfo`] for local fronts
/// behind its own lock, separate from the handle table, following a
/// one-lock-per-registry discipline.
pub struct LocalRouter {
    info: Arc<RwLock<GatewayNodeInfo>>,
    handles: RwLock<HashMap<Vec<u8>, RegisteredFront>>,
    holding: Arc<HoldingCache>,
}

impl LocalRouter {
    /// `info` is shared with `fabric_gossip::NodeInfoManager` so that a
    /// front registering/unregistering here is visible to the next gossip
    /// broadcast without a separate sync step.
    pub fn new(info: Arc<RwLock<GatewayNodeInfo>>, holding_ttl: Duration) -> Arc<Self> {
        Arc::new(Self { info, handles: RwLock::new(HashMap::new()), holding: HoldingCache::new(holding_ttl) })
    }

    pub fn node_info(&self) -> &Arc<RwLock<GatewayNodeInfo>> {
        &self.info
    }

    /// `register`: bind a front's handle and insert its node-info,
    /// bumping `statusSeq` only if new or changed.
    pub async fn register(
        &self,
        info: NodeInfo,
        handle: Arc<dyn FrontHandle>,
        remove_on_unhealthy: bool,
    ) -> bool {
        let node_id = info.node_id.clone();
        let changed = self.info.write().await.register(info);
        self.handles.write().await.insert(node_id, RegisteredFront { handle, remove_on_unhealthy });
        changed
    }

    /// `unregisterNode`: remove node-info, topic bindings and the
    /// bound handle. Idempotent.
    pub async fn unregister_node(&self, node_id: &[u8]) -> bool {
        self.handles.write().await.remove(node_id);
        self.info.write().await.unregister_node(node_id)
    }

    /// `registerTopic`: bump the topic index, then redeliver any
    /// messages this topic was holding.
    pub async fn register_topic(&self, node_id: &[u8], topic: impl Into<String>) -> bool {
        let topic = topic.into();
        let changed = self.info.write().await.register_topic(node_id, topic.clone());

        for (header, payload, ack) in self.holding.take(&topic).await {
            self.dispatch_message(header, payload, ack, false).await;
        }
        changed
    }

    pub async fn unregister_topic(&self, node_id: &[u8], topic: &str) -> bool {
        self.info.write().await.unregister_topic(node_id, topic)
    }

    /// `chooseReceiver`: deterministic by routing policy.
    async fn choose_receiver(
        &self,
        policy: RoutePolicy,
        route_info: &RouteInfo,
        broadcast: bool,
    ) -> Vec<(Vec<u8>, Arc<dyn FrontHandle>)> {
        let info = self.info.read().await;
        let handles = self.handles.read().await;

        let candidate_ids: Vec<Vec<u8>> = match policy {
            RoutePolicy::NodeId => {
                info.node(&route_info.dst_node).map(|n| vec![n.node_id.clone()]).unwrap_or_default()
            }
            RoutePolicy::Component => {
                let matches: Vec<Vec<u8>> =
                info.nodes_with_component(&route_info.component_type).map(|n| n.node_id.clone()).collect();
                if broadcast { matches } else { matches.into_iter().take(1).collect() }
            }
            RoutePolicy::Agency => {
                let all: Vec<Vec<u8>> = info.nodes().map(|n| n.node_id.clone()).collect();
                if broadcast { all } else { all.into_iter().take(1).collect() }
            }
            RoutePolicy::Topic => {
                let matches: Vec<Vec<u8>> = if route_info.topic.is_empty() {
                    info.nodes().map(|n| n.node_id.clone()).collect()
                } else {
                    info.nodes_with_topic(&route_info.topic).map(|id| id.to_vec()).collect()
                };
                matches.into_iter().filter(|id| id.as_slice() != route_info.src_node.as_slice()).collect()
            }
        };

        candidate_ids
        .into_iter()
        .filter_map(|id| handles.get(&id).map(|f| (id, Arc::clone(&f.handle))))
        .collect()
    }

    /// Dispatch policy: deliver to every chosen receiver, or (byTopic
    /// only, when `holding` is set) park the message in the topic's
    /// holding queue, or report no receiver.
    pub async fn dispatch_message(
        &self,
        header: MessageHeader,
        payload: Vec<u8>,
        ack: Ack,
        holding: bool,
    ) -> bool {
        let policy = match RoutePolicy::decode_ext(header.ext) {
            Ok(policy) => policy,
            Err(err) => {
                log::warn!("local router: unrecognized route policy in ext 0x{:04x}: {}", header.ext, err);
                ack(Err(DispatchError::UnknownRoutePolicy(err)));
                return false;
            }
        };
        let broadcast = header.packet_type == PacketType::BroadcastMessage;
        let route_info = match header.route_info.clone() {
            Some(info) => info,
            None => {
                ack(Err(DispatchError::NotFoundFrontService));
                return false;
            }
        };

        let receivers = self.choose_receiver(policy, &route_info, broadcast).await;
        if !receivers.is_empty() {
            for (node_id, handle) in receivers {
                let result = handle.deliver(header.clone(), payload.clone()).await;
                if let Err(err) = &result {
                    log::debug!("local router: delivery to {:?} failed: {}", node_id, err);
                }
                ack(result);
            }
            return true;
        }

        if holding && policy == RoutePolicy::Topic && !route_info.topic.is_empty() {
            self.holding.hold(&route_info.topic, header, payload, ack).await;
            return false;
        }

        ack(Err(DispatchError::NotFoundFrontService));
        false
    }

    /// Health check: probe every registered front on a fixed
    /// interval; a front registered with `remove_on_unhealthy` is dropped
    /// the first time its probe fails, avoiding repeated unregister calls.
    pub async fn run_health_checks(self: &Arc<Self>, period: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => self.check_once().await,
            }
        }
    }

    async fn check_once(&self) {
        let snapshot: Vec<(Vec<u8>, Arc<dyn FrontHandle>, bool)> = self
        .handles
        .read()
        .await
        .iter()
        .map(|(id, f)| (id.clone(), Arc::clone(&f.handle), f.remove_on_unhealthy))
        .collect();

        for (node_id, handle, remove_on_unhealthy) in snapshot {
            if !handle.health_check().await && remove_on_unhealthy {
                log::info!("local router: front {:?} failed health check, unregistering", node_id);
                self.unregister_node(&node_id).await;
            }
        }
    }
}
