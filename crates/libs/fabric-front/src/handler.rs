use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fabric_gateway::GatewayHandle;
use fabric_wire::{MessagePayload, RouteInfo, RoutePolicy};

use crate::error::FrontError;

/// Handler registered under a topic or a componentType. Handlers run
/// off the I/O loop: `onReceiveMessage` spawns a task per incoming
/// message rather than invoking a handler inline.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: MessagePayload, route_info: RouteInfo, responder: ResponseSender);
}

/// Replies to whoever sent a request: re-encodes a payload with the
/// response bit set and the swapped src/dst node fields, then calls the
/// gateway again via byNode routing.
#[derive(Clone)]
pub struct ResponseSender {
    gateway: Arc<dyn GatewayHandle>,
    route_info: RouteInfo,
    trace_id: String,
    seq: u16,
    timeout: Duration,
}

impl ResponseSender {
    pub(crate) fn new(
        gateway: Arc<dyn GatewayHandle>,
        route_info: RouteInfo,
        trace_id: String,
        seq: u16,
        timeout: Duration,
    ) -> Self {
        Self { gateway, route_info, trace_id, seq, timeout }
    }

    pub async fn respond(&self, data: Vec<u8>) -> Result<(), FrontError> {
        let mut payload = MessagePayload::new(self.trace_id.clone(), self.seq, data);
        payload.mark_response();
        let bytes = payload.encode()?;
        self.gateway
        .async_send_message(RoutePolicy::NodeId, self.route_info.clone(), self.trace_id.clone(), bytes, self.timeout)
        .await
        .map_err(FrontError::from)
    }
}
