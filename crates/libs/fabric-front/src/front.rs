//! Front endpoint: send/receive, request/response correlation
//! via traceID, and topic/component dispatch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fabric_gateway::GatewayHandle;
use fabric_nodeinfo::NodeInfo;
use fabric_router::{CallbackManager, DispatchError, FrontHandle};
use fabric_wire::{MessageHeader, MessagePayload, RouteInfo, RoutePolicy};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::FrontError;
use crate::handler::{MessageHandler, ResponseSender};
use crate::topic_queue::TopicQueues;

/// Invoked exactly once per `asyncSendMessage` call.
pub type ErrCallback = Arc<dyn Fn(Option<FrontError>) + Send + Sync>;
/// Invoked once a response arrives (or never, if the send itself failed
/// before any response could be expected).
pub type RespCallback = Arc<dyn Fn(Result<(MessagePayload, ResponseSender), FrontError>) + Send + Sync>;

type ResponseCallbacks = CallbackManager<(MessagePayload, ResponseSender)>;

/// A front attached to one gateway. Construction binds the
/// gateway handle; `register_component`/`register_topic` then make this
/// front discoverable to local and (for components) remote dispatch.
pub struct Front {
    node_id: Vec<u8>,
    agency: String,
    gateway: Arc<dyn GatewayHandle>,
    callbacks: Arc<ResponseCallbacks>,
    topic_handlers: Arc<RwLock<HashMap<String, Arc<dyn MessageHandler>>>>,
    component_handlers: Arc<RwLock<HashMap<String, Arc<dyn MessageHandler>>>>,
    queues: Arc<TopicQueues>,
    default_timeout: Duration,
}

impl Front {
    pub fn new(
        node_id: impl Into<Vec<u8>>,
        agency: impl Into<String>,
        gateway: Arc<dyn GatewayHandle>,
        default_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
                node_id: node_id.into(),
                agency: agency.into(),
                gateway,
                callbacks: CallbackManager::new(),
                topic_handlers: Arc::new(RwLock::new(HashMap::new())),
                component_handlers: Arc::new(RwLock::new(HashMap::new())),
                queues: TopicQueues::new(),
                default_timeout,
        })
    }

    pub fn node_id(&self) -> &[u8] {
        &self.node_id
    }

    pub fn agency(&self) -> &str {
        &self.agency
    }

    pub fn topic_queues(&self) -> &Arc<TopicQueues> {
        &self.queues
    }

    /// Makes this front discoverable via byComponent routing, and also
    /// bridges the component name into the gateway's byTopic index, so
    /// remote gateways learn of the new capability through node-info
    /// gossip. Plain `register_topic` stays local-only — see that
    /// method's doc comment.
    pub async fn register_component(self: &Arc<Self>, name: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        let name = name.into();
        self.component_handlers.write().await.insert(name.clone(), handler);
        self.gateway.register_topic(self.node_id.clone(), name).await;
    }

    pub async fn unregister_component(&self, name: &str) {
        self.component_handlers.write().await.remove(name);
        self.gateway.unregister_topic(self.node_id.clone(), name.to_string()).await;
    }

    /// Registers only locally — a plain dispatch key for incoming
    /// messages, with no gateway-level discoverability side effect. Use
    /// [`Self::register_component`] to advertise a capability to the
    /// overlay.
    pub async fn register_topic(&self, name: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        self.topic_handlers.write().await.insert(name.into(), handler);
    }

    pub async fn unregister_topic(&self, name: &str) {
        self.topic_handlers.write().await.remove(name);
    }

    /// Bind this front to its gateway so inbound traffic can reach it.
    /// `remove_on_unhealthy` controls whether a failed health probe drops
    /// the registration.
    pub async fn register(self: &Arc<Self>, components: HashSet<String>, remove_on_unhealthy: bool, endpoint: impl Into<String>) -> Result<(), FrontError> {
        let info = NodeInfo::new(self.node_id.clone(), endpoint, components)?;
        let handle: Arc<dyn FrontHandle> = Arc::clone(self) as Arc<dyn FrontHandle>;
        self.gateway.register_node_info(info, handle, remove_on_unhealthy).await;
        Ok(())
    }

    /// `asyncSendMessage`: generate a traceID, register the response
    /// callback, stamp `srcNode`, and hand off to the gateway. Returns the
    /// immediate send-completion outcome; `resp_cb` fires later and
    /// independently when (if) a response arrives.
    pub async fn async_send_message(
        &self,
        policy: RoutePolicy,
        mut route_info: RouteInfo,
        payload: Vec<u8>,
        seq: u16,
        timeout: Duration,
        err_cb: ErrCallback,
        resp_cb: RespCallback,
    ) -> Result<(), FrontError> {
        let trace_id = Uuid::new_v4().to_string();
        let message_payload = MessagePayload::new(trace_id.clone(), seq, payload);
        let encoded = match message_payload.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                err_cb(Some(FrontError::from(err)));
                return Err(FrontError::from(err));
            }
        };

        let rx = self.callbacks.register(trace_id.clone(), timeout).await;
        tokio::spawn({
                let resp_cb = resp_cb.clone();
                async move {
                    if let Ok(result) = rx.await {
                        resp_cb(result.map_err(FrontError::from));
                    }
                }
        });

        route_info.src_node = self.node_id.clone();
        let result = self.gateway.async_send_message(policy, route_info, trace_id.clone(), encoded, timeout).await;

        match result {
            Ok(()) => {
                err_cb(None);
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                self.callbacks.cancel(&trace_id).await;
                err_cb(Some(FrontError::SendFailed(message.clone())));
                Err(FrontError::SendFailed(message))
            }
        }
    }

    /// the synchronous helper: identical to [`Self::async_send_message`]
    /// but with no callbacks to wire up — the return value carries the
    /// same outcome `errCb` would have received.
    pub async fn push(
        &self,
        policy: RoutePolicy,
        route_info: RouteInfo,
        payload: Vec<u8>,
        seq: u16,
        timeout: Duration,
    ) -> Result<(), FrontError> {
        self.async_send_message(policy, route_info, payload, seq, timeout, Arc::new(|_| {}), Arc::new(|_| {})).await
    }

    /// Block up to `timeout` waiting for the next queued message on `topic`.
    pub async fn pop(&self, topic: &str, timeout: Duration) -> Option<(MessagePayload, RouteInfo)> {
        self.queues.pop(topic, timeout).await
    }

    /// Non-blocking peek at the next queued message on `topic`, if any.
    pub async fn peek(&self, topic: &str) -> Option<(MessagePayload, RouteInfo)> {
        self.queues.peek(topic).await
    }

    fn build_responder(&self, header: &MessageHeader, message_payload: &MessagePayload) -> ResponseSender {
        let mut route_info = header.route_info.clone().unwrap_or_default();
        let original_src = route_info.src_node.clone();
        route_info.src_node = self.node_id.clone();
        route_info.dst_node = original_src;
        ResponseSender::new(
            Arc::clone(&self.gateway),
            route_info,
            message_payload.trace_id.clone(),
            message_payload.seq,
            self.default_timeout,
        )
    }
}

#[async_trait]
impl FrontHandle for Front {
    /// `onReceiveMessage`: ack immediately, non-blocking — the
    /// actual response-correlation/topic dispatch runs in a spawned task
    /// so it never delays the ack.
    async fn deliver(&self, header: MessageHeader, payload: Vec<u8>) -> Result<(), DispatchError> {
        let message_payload = match MessagePayload::decode(&payload) {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("front {:?}: dropping undecodable message: {}", self.node_id, err);
                return Err(DispatchError::UnknownRoutePolicy(err));
            }
        };

        let responder = self.build_responder(&header, &message_payload);

        if message_payload.is_response() {
            let trace_id = message_payload.trace_id.clone();
            self.callbacks.complete(&trace_id, Ok((message_payload, responder))).await;
            return Ok(());
        }

        let route_info = header.route_info.clone().unwrap_or_default();
        tokio::spawn(dispatch_incoming(
                Arc::clone(&self.topic_handlers),
                Arc::clone(&self.component_handlers),
                Arc::clone(&self.queues),
                message_payload,
                route_info,
                responder,
        ));
        Ok(())
    }
}

/// Dispatch order: topic handler, else component handler, else the holding queue.
async fn dispatch_incoming(
    topic_handlers: Arc<RwLock<HashMap<String, Arc<dyn MessageHandler>>>>,
    component_handlers: Arc<RwLock<HashMap<String, Arc<dyn MessageHandler>>>>,
    queues: Arc<TopicQueues>,
    payload: MessagePayload,
    route_info: RouteInfo,
    responder: ResponseSender,
) {
    if let Some(handler) = topic_handlers.read().await.get(&route_info.topic).cloned() {
        handler.handle(payload, route_info, responder).await;
        return;
    }

    if let Some(handler) = component_handlers.read().await.get(&route_info.component_type).cloned() {
        handler.handle(payload, route_info, responder).await;
        return;
    }

    let topic = route_info.topic.clone();
    queues.push(&topic, payload, route_info).await;
}
