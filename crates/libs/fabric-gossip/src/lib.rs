//! Periodic gossip orchestrators for the routing table and node-info
//! registries.
//!
//! Both managers here are registered on a shared [`fabric_peer::PeerService`]
//! as `PacketHandler`s — this crate exists separately from `fabric-routing`
//! and `fabric-nodeinfo` purely to break the dependency cycle that would
//! otherwise form between the peer transport (which needs the routing table
//! for forwarding) and the gossip orchestrators (which need the peer
//! transport to exchange packets).

mod node_info_manager;
mod router_manager;

pub use node_info_manager::NodeInfoManager;
pub use router_manager::{RouterManager, UnreachableHandler};
