//! Local and peer routers: index fronts/peers by routing policy, hold
//! early-arriving topic messages, and fail over across candidate peer
//! gateways.

mod callback;
mod error;
mod holding;
mod local_router;
mod peer_router;
mod send_with_retry;

pub use callback::CallbackManager;
pub use error::DispatchError;
pub use holding::{Ack, HoldingCache};
pub use local_router::{FrontHandle, LocalRouter};
pub use peer_router::PeerRouterTable;
pub use send_with_retry::send_with_retry;

/// Default holding-queue TTL ("default 30 min").
pub const DEFAULT_HOLDING_TTL: std::time::Duration = std::time::Duration::from_secs(30 * 60);
