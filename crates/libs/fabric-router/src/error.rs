use fabric_peer::PeerError;
use fabric_wire::WireError;

/// Dispatch-kind errors.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no local front registered for this destination")]
    NotFoundFrontService,
    #[error("routing policy could not be determined")]
    UnknownRoutePolicy(#[from] WireError),
    #[error("no gateway found")]
    NoGatewayFound,
    #[error("can't find the gateway")]
    RetryExhausted,
    #[error("callback timed out")]
    Timeout,
    #[error("system is shutting down")]
    ShuttingDown,
    #[error(transparent)]
    Transport(#[from] PeerError),
}
