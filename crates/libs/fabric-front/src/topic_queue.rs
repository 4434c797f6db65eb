//! Topic-keyed holding queue for messages that matched no registered
//! handler: appended for later `pop(topic, timeout)` retrieval. Distinct from
//! `fabric_router::HoldingCache`, which holds gateway-side undeliverable
//! `byTopic` frames until a front registers; this one holds front-side
//! messages that a front received but has no handler for yet.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use fabric_wire::{MessagePayload, RouteInfo};
use tokio::sync::{Mutex, Notify};

struct Queue {
    items: VecDeque<(MessagePayload, RouteInfo)>,
    notify: Arc<Notify>,
}

impl Queue {
    fn empty() -> Self {
        Self { items: VecDeque::new(), notify: Arc::new(Notify::new()) }
    }
}

pub struct TopicQueues {
    queues: Mutex<HashMap<String, Queue>>,
}

impl TopicQueues {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { queues: Mutex::new(HashMap::new()) })
    }

    pub async fn push(&self, topic: &str, payload: MessagePayload, route_info: RouteInfo) {
        let mut queues = self.queues.lock().await;
        let queue = queues.entry(topic.to_string()).or_insert_with(Queue::empty);
        queue.items.push_back((payload, route_info));
        queue.notify.notify_one();
    }

    /// Non-blocking look at the oldest queued message, without removing it.
    pub async fn peek(&self, topic: &str) -> Option<(MessagePayload, RouteInfo)> {
        self.queues.lock().await.get(topic).and_then(|q| q.items.front().cloned())
    }

    /// Block up to `timeout` for a message to arrive on `topic`, dequeuing it.
    pub async fn pop(&self, topic: &str, timeout: Duration) -> Option<(MessagePayload, RouteInfo)> {
        loop {
            let notify = {
                let mut queues = self.queues.lock().await;
                let queue = queues.entry(topic.to_string()).or_insert_with(Queue::empty);
                if let Some(item) = queue.items.pop_front() {
                    return Some(item);
                }
                Arc::clone(&queue.notify)
            };

            if tokio::time::timeout(timeout, notify.notified()).await.is_err() {
                return None;
            }
        }
    }
}
