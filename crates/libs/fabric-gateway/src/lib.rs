//! Gateway dispatch facade: the operations a front or `fabricd`
//! drives — `asyncSendMessage`, `asyncSendBroadcast`, and the inbound
//! P2P/broadcast handlers — wrapping the peer overlay, gossip managers, and
//! local/peer routers built by the lower crates.

mod config;
mod error;
mod gateway;
mod handle;

pub use config::{GatewayConfig, PeerEndpoints};
pub use error::ConfigError;
pub use gateway::Gateway;
pub use handle::GatewayHandle;
