//! Per-topic holding queue for messages that arrive before a local
//! subscriber exists.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fabric_wire::MessageHeader;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::DispatchError;

/// Ack sink for a held (or just-dispatched) message: invoked exactly once,
/// either with the delivery outcome or with a timeout error on TTL expiry.
pub type Ack = Arc<dyn Fn(Result<(), DispatchError>) + Send + Sync>;

struct QueuedMessage {
    header: MessageHeader,
    payload: Vec<u8>,
    ack: Ack,
}

struct Queue {
    messages: Vec<QueuedMessage>,
    cancel: CancellationToken,
}

/// Holds early-arriving `byTopic` messages until a matching
/// `registerTopic` call drains them, or the TTL timer fires first.
/// One queue per topic, each with its own TTL timer started on first
/// insertion, cleared when a topic subscriber appears or the TTL fires.
pub struct HoldingCache {
    ttl: Duration,
    queues: Mutex<HashMap<String, Queue>>,
}

impl HoldingCache {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self { ttl, queues: Mutex::new(HashMap::new()) })
    }

    /// Append a message to `topic`'s queue, starting its TTL timer on the
    /// first insertion.
    pub async fn hold(
        self: &Arc<Self>,
        topic: &str,
        header: MessageHeader,
        payload: Vec<u8>,
        ack: Ack,
    ) {
        let mut queues = self.queues.lock().await;
        if let Some(queue) = queues.get_mut(topic) {
            queue.messages.push(QueuedMessage { header, payload, ack });
            return;
        }

        let cancel = CancellationToken::new();
        queues.insert(
            topic.to_string(),
            Queue { messages: vec![QueuedMessage { header, payload, ack }], cancel: cancel.clone() },
        );
        drop(queues);

        let cache = Arc::clone(self);
        let topic = topic.to_string();
        let ttl = self.ttl;
        tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(ttl) => cache.expire(&topic).await,
                }
        });
    }

    /// Drain `topic`'s queue for redelivery, cancelling its TTL timer;
    /// callers redeliver each message with holding disabled.
    pub async fn take(&self, topic: &str) -> Vec<(MessageHeader, Vec<u8>, Ack)> {
        let mut queues = self.queues.lock().await;
        match queues.remove(topic) {
            Some(queue) => {
                queue.cancel.cancel();
                queue.messages.into_iter().map(|m| (m.header, m.payload, m.ack)).collect()
            }
            None => Vec::new(),
        }
    }

    async fn expire(&self, topic: &str) {
        let queue = self.queues.lock().await.remove(topic);
        if let Some(queue) = queue {
            log::debug!("holding cache: topic {:?} expired with {} queued message(s)", topic, queue.messages.len());
            for message in queue.messages {
                (message.ack)(Err(DispatchError::Timeout));
            }
        }
    }

    pub async fn is_empty(&self, topic: &str) -> bool {
        !self.queues.lock().await.contains_key(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_wire::{PacketType, EXT_ROUTE_BY_TOPIC};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn header() -> MessageHeader {
        MessageHeader {
            version: 1,
            packet_type: PacketType::P2PMessage,
            ttl: 0,
            ext: EXT_ROUTE_BY_TOPIC,
            trace_id: "t".into(),
            src_gw_node: Vec::new(),
            dst_gw_node: Vec::new(),
            route_info: None,
        }
    }

    #[tokio::test]
    async fn registered_topic_drains_held_messages() {
        let cache = HoldingCache::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let ack: Ack = Arc::new(move |result| {
                assert!(result.is_ok());
                calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        cache.hold("alerts", header(), b"payload".to_vec(), ack).await;
        assert!(!cache.is_empty("alerts").await);

        let held = cache.take("alerts").await;
        assert_eq!(held.len(), 1);
        for (_, _, ack) in held {
            ack(Ok(()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty("alerts").await);
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expiry_invokes_ack_with_timeout_for_every_queued_message() {
        let cache = HoldingCache::new(Duration::from_millis(50));
        let timeouts = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let timeouts = timeouts.clone();
            let ack: Ack = Arc::new(move |result| {
                    if matches!(result, Err(DispatchError::Timeout)) {
                        timeouts.fetch_add(1, Ordering::SeqCst);
                    }
            });
            cache.hold("alerts", header(), b"payload".to_vec(), ack).await;
        }

        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;

        assert_eq!(timeouts.load(Ordering::SeqCst), 3);
        assert!(cache.is_empty("alerts").await);
    }
}
