use fabric_wire::WireError;

/// Transport-kind errors surfaced by the peer service.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("no network established to {0}")]
    NoSession(String),
    #[error("dropped connection: self-loop to our own gateway id")]
    SelfLoop,
    #[error("handshake with {0} failed")]
    HandshakeFailed(String),
    #[error("ttl expired before reaching {0}")]
    TtlExpired(String),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("system is shutting down")]
    ShuttingDown,
}
