//! The Front ↔ Gateway RPC surface.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fabric_nodeinfo::NodeInfo;
use fabric_router::{DispatchError, FrontHandle};
use fabric_wire::{RouteInfo, RoutePolicy};

/// Restricted to the AIR (in-process) mode: a PRO-mode gRPC façade is out of
/// scope. `fabric-front`'s `Front` holds an `Arc<dyn GatewayHandle>`.
#[async_trait]
pub trait GatewayHandle: Send + Sync {
    async fn async_send_message(
        &self,
        policy: RoutePolicy,
        route_info: RouteInfo,
        trace_id: String,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<(), DispatchError>;

    async fn async_send_broadcast(&self, route_info: RouteInfo, payload: Vec<u8>);

    async fn register_node_info(
        &self,
        info: NodeInfo,
        handle: Arc<dyn FrontHandle>,
        remove_on_unhealthy: bool,
    ) -> bool;

    async fn unregister_node_info(&self, node_id: Vec<u8>) -> bool;
    async fn register_topic(&self, node_id: Vec<u8>, topic: String) -> bool;
    async fn unregister_topic(&self, node_id: Vec<u8>, topic: String) -> bool;

    async fn get_peers(&self) -> Vec<String>;
    async fn get_agencies(&self) -> Vec<String>;
}
