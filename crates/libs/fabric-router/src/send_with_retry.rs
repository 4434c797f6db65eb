//! Peer failover for cross-gateway sends, mirroring `SendWithRetry`.

use std::future::Future;

use crate::error::DispatchError;

/// Try each candidate peer in turn until one confirms acceptance: each
/// attempt removes one peer from the candidate set, sends to it, and waits
/// for either the peer's ack payload or a transport error. Any transport
/// error, or a non-zero error-code string in the ack payload, triggers
/// another attempt with a remaining peer. `attempt` is expected to fold
/// both outcomes into its `Result`; exhaustion reports
/// [`DispatchError::RetryExhausted`] regardless of the last attempt's error.
pub async fn send_with_retry<F, Fut>(mut candidates: Vec<String>, mut attempt: F) -> Result<(), DispatchError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<(), DispatchError>>,
{
    if candidates.is_empty() {
        return Err(DispatchError::NoGatewayFound);
    }

    while let Some(peer) = candidates.pop() {
        match attempt(peer.clone()).await {
            Ok(()) => return Ok(()),
            Err(err) => log::debug!("send-with-retry: attempt to {} failed, trying next peer: {}", peer, err),
        }
    }

    Err(DispatchError::RetryExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_on_first_attempted_peer() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let result = send_with_retry(vec!["gw-b".into(), "gw-c".into()], move |peer| {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    if peer == "gw-c" { Ok(()) } else { Err(DispatchError::NotFoundFrontService) }
                }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn falls_back_to_remaining_peer_on_failure() {
        let result = send_with_retry(vec!["gw-b".into(), "gw-c".into()], |peer| async move {
                if peer == "gw-c" { Err(DispatchError::NotFoundFrontService) } else { Ok(()) }
        })
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn exhaustion_reports_cant_find_the_gateway() {
        let result =
        send_with_retry(vec!["gw-b".into()], |_| async { Err(DispatchError::NotFoundFrontService) }).await;
        assert!(matches!(result, Err(DispatchError::RetryExhausted)));
    }

    #[tokio::test]
    async fn empty_candidates_reports_no_gateway_found() {
        let result: Result<(), DispatchError> =
        send_with_retry(Vec::new(), |_: String| async { Ok(()) }).await;
        assert!(matches!(result, Err(DispatchError::NoGatewayFound)));
    }
}
