//! Keep-alive loop: periodically re-registers this front's node-info so
//! the gateway notices a front process restart even without an explicit
//! unregister/register cycle.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::front::Front;

pub async fn run(
    front: Arc<Front>,
    endpoint: String,
    components: HashSet<String>,
    period: Duration,
    remove_on_unhealthy: bool,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(err) = front.register(components.clone(), remove_on_unhealthy, endpoint.clone()).await {
                    log::warn!("keep-alive: re-registration failed: {}", err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fabric_gateway::GatewayHandle;
    use fabric_nodeinfo::NodeInfo;
    use fabric_router::{DispatchError, FrontHandle};
    use fabric_wire::{RouteInfo, RoutePolicy};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGateway {
        registrations: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl GatewayHandle for CountingGateway {
        async fn async_send_message(
            &self,
            _policy: RoutePolicy,
            _route_info: RouteInfo,
            _trace_id: String,
            _payload: Vec<u8>,
            _timeout: Duration,
        ) -> Result<(), DispatchError> {
            Ok(())
        }

        async fn async_send_broadcast(&self, _route_info: RouteInfo, _payload: Vec<u8>) {}

        async fn register_node_info(
            &self,
            _info: NodeInfo,
            _handle: Arc<dyn FrontHandle>,
            _remove_on_unhealthy: bool,
        ) -> bool {
            self.registrations.fetch_add(1, Ordering::SeqCst);
            true
        }

        async fn unregister_node_info(&self, _node_id: Vec<u8>) -> bool {
            true
        }

        async fn register_topic(&self, _node_id: Vec<u8>, _topic: String) -> bool {
            true
        }

        async fn unregister_topic(&self, _node_id: Vec<u8>, _topic: String) -> bool {
            true
        }

        async fn get_peers(&self) -> Vec<String> {
            Vec::new()
        }

        async fn get_agencies(&self) -> Vec<String> {
            Vec::new()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reregisters_on_every_tick_until_cancelled() {
        let registrations = Arc::new(AtomicUsize::new(0));
        let gateway = Arc::new(CountingGateway { registrations: registrations.clone() }) as Arc<dyn GatewayHandle>;
        let front = Front::new(vec![1], "agency-1", gateway, Duration::from_secs(1));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run(
                front,
                "127.0.0.1:9000".into(),
                HashSet::new(),
                Duration::from_millis(100),
                false,
                cancel.clone(),
        ));

        tokio::time::advance(Duration::from_millis(250)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(registrations.load(Ordering::SeqCst), 2);
    }
}
