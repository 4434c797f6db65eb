use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};

use crate::error::DispatchError;

/// Generic `PendingCallback` registry: at most one owner per traceID,
/// pop-then-invoke transfers ownership, timer fire and response pop are the
/// only two completion paths and they're mutually exclusive because both
/// go through the same locked `HashMap::remove`. Shared between the gateway
/// facade (acking a peer's P2P send) and the front's response correlation —
/// both are the same `PendingCallback` entity with a different payload type.
pub struct CallbackManager<T: Send + 'static> {
    pending: Mutex<HashMap<String, oneshot::Sender<Result<T, DispatchError>>>>,
}

impl<T: Send + 'static> CallbackManager<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { pending: Mutex::new(HashMap::new()) })
    }

    /// Registers a pending callback and arms its timeout timer. The
    /// returned receiver completes exactly once, either from
    /// [`Self::complete`] or from the timer firing.
    pub async fn register(
        self: &Arc<Self>,
        trace_id: impl Into<String>,
        timeout: Duration,
    ) -> oneshot::Receiver<Result<T, DispatchError>> {
        let trace_id = trace_id.into();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(trace_id.clone(), tx);

        let manager = Arc::clone(self);
        tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                manager.fire_timeout(&trace_id).await;
        });

        rx
    }

    async fn fire_timeout(&self, trace_id: &str) {
        if let Some(tx) = self.pending.lock().await.remove(trace_id) {
            let _ = tx.send(Err(DispatchError::Timeout));
        }
    }

    /// Pop-then-invoke: returns `true` if a pending callback existed and
    /// was completed, `false` if it had already fired (by timeout or a
    /// prior response).
    pub async fn complete(&self, trace_id: &str, value: Result<T, DispatchError>) -> bool {
        match self.pending.lock().await.remove(trace_id) {
            Some(tx) => {
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    /// Drop a registration without completing it — used when the initial
    /// send itself failed transport-side, before any response could ever
    /// arrive.
    pub async fn cancel(&self, trace_id: &str) {
        self.pending.lock().await.remove(trace_id);
    }

    /// On system stop, cancel every timer and complete in-flight
    /// callbacks with a shutdown error.
    pub async fn cancel_all(&self) {
        let mut pending = self.pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(DispatchError::ShuttingDown));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_delivers_value_exactly_once() {
        let manager: Arc<CallbackManager<&'static str>> = CallbackManager::new();
        let rx = manager.register("t-1", Duration::from_secs(10)).await;
        assert!(manager.complete("t-1", Ok("0")).await);
        assert!(!manager.complete("t-1", Ok("0")).await);
        assert_eq!(rx.await.unwrap().unwrap(), "0");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_when_nothing_completes_first() {
        let manager: Arc<CallbackManager<&'static str>> = CallbackManager::new();
        let rx = manager.register("t-1", Duration::from_millis(50)).await;
        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(matches!(rx.await.unwrap(), Err(DispatchError::Timeout)));
        assert!(!manager.complete("t-1", Ok("0")).await);
    }

    #[tokio::test]
    async fn cancel_all_completes_every_pending_callback_with_shutdown() {
        let manager: Arc<CallbackManager<&'static str>> = CallbackManager::new();
        let rx1 = manager.register("t-1", Duration::from_secs(10)).await;
        let rx2 = manager.register("t-2", Duration::from_secs(10)).await;
        manager.cancel_all().await;
        assert!(matches!(rx1.await.unwrap(), Err(DispatchError::ShuttingDown)));
        assert!(matches!(rx2.await.unwrap(), Err(DispatchError::ShuttingDown)));
    }
}
