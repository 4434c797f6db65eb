use fabric_nodeinfo::NodeInfoError;
use fabric_router::DispatchError;
use fabric_wire::WireError;

/// Front-level errors.
#[derive(Debug, thiserror::Error)]
pub enum FrontError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    NodeInfo(#[from] NodeInfoError),
    #[error("no response arrived before the request timeout")]
    Timeout,
    #[error("front is shutting down")]
    ShuttingDown,
    #[error("send failed: {0}")]
    SendFailed(String),
}

impl From<FrontError> for DispatchError {
    fn from(err: FrontError) -> Self {
        match err {
            FrontError::Dispatch(err) => err,
            FrontError::Wire(err) => DispatchError::UnknownRoutePolicy(err),
            FrontError::NodeInfo(_) => DispatchError::NotFoundFrontService,
            FrontError::Timeout => DispatchError::Timeout,
            FrontError::ShuttingDown => DispatchError::ShuttingDown,
            FrontError::SendFailed(_) => DispatchError::NotFoundFrontService,
        }
    }
}
