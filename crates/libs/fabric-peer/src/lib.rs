//! Peer-gateway transport.
//!
//! [`PeerService`] owns one [`session::SessionHandle`] per peer gateway,
//! handles the handshake/self-loop/stale-close rules, runs the fixed-
//! interval reconnection loop, and forwards frames hop-by-hop using the
//! [`fabric_routing::RoutingTable`] it's constructed with.

mod dedup;
mod error;
mod framing;
mod session;
mod service;

pub use error::PeerError;
pub use framing::{read_frame, write_frame};
pub use service::{PacketHandler, PeerService};
pub use session::SessionHandle;
