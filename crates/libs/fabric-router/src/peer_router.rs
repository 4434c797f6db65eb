//! Secondary index over peer gateway node-info snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use fabric_nodeinfo::GatewayNodeInfo;
use fabric_wire::{RouteInfo, RoutePolicy};
use rand::seq::SliceRandom;
use tokio::sync::RwLock;

/// Indexes remote fronts by node-ID, agency, and component across every
/// peer gateway's advertised [`GatewayNodeInfo`] snapshot. Shares the
/// map `fabric_gossip::NodeInfoManager` writes on each gossip pull so a
/// snapshot refresh is visible to routing decisions immediately, without a
/// second copy — each update is refreshed atomically.
pub struct PeerRouterTable {
    self_id: String,
    snapshots: Arc<RwLock<HashMap<String, GatewayNodeInfo>>>,
}

impl PeerRouterTable {
    pub fn new(self_id: impl Into<String>, snapshots: Arc<RwLock<HashMap<String, GatewayNodeInfo>>>) -> Self {
        Self { self_id: self_id.into(), snapshots }
    }

    /// `selectRouter`: which peer gateways can deliver this message.
    pub async fn select_router(&self, policy: RoutePolicy, route_info: &RouteInfo) -> Vec<String> {
        let snapshots = self.snapshots.read().await;
        match policy {
            RoutePolicy::NodeId => snapshots
            .iter()
            .filter(|(_, info)| info.node(&route_info.dst_node).is_some())
            .map(|(peer, _)| peer.clone())
            .collect(),
            RoutePolicy::Agency | RoutePolicy::Topic => snapshots
            .iter()
            .filter(|(_, info)| info.agency() == route_info.dst_inst)
            .map(|(peer, _)| peer.clone())
            .collect(),
            RoutePolicy::Component => snapshots
            .iter()
            .filter(|(_, info)| {
                    info.agency() == route_info.dst_inst
                    && info.nodes_with_component(&route_info.component_type).next().is_some()
            })
            .map(|(peer, _)| peer.clone())
            .collect(),
        }
    }

    /// `asyncBroadcastMessage`: one peer gateway chosen uniformly at
    /// random per agency, avoiding self; the peer is then responsible for
    /// its own local fan-out.
    pub async fn broadcast_targets(&self) -> Vec<String> {
        let snapshots = self.snapshots.read().await;
        let mut by_agency: HashMap<&str, Vec<&str>> = HashMap::new();
        for (peer, info) in snapshots.iter() {
            if peer.as_str() == self.self_id {
                continue;
            }
            by_agency.entry(info.agency()).or_default().push(peer.as_str());
        }

        let mut rng = rand::thread_rng();
        by_agency.into_values().filter_map(|peers| peers.choose(&mut rng).map(|p| p.to_string())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_nodeinfo::NodeInfo;

    async fn snapshots_with(entries: Vec<(&str, &str, Vec<u8>, &str)>) -> Arc<RwLock<HashMap<String, GatewayNodeInfo>>> {
        let mut map = HashMap::new();
        for (peer, agency, node_id, component) in entries {
            let mut info = GatewayNodeInfo::new(peer.as_bytes().to_vec(), agency);
            let mut components = std::collections::HashSet::new();
            components.insert(component.to_string());
            info.register(NodeInfo::new(node_id, "127.0.0.1:9000", components).unwrap());
            map.insert(peer.to_string(), info);
        }
        Arc::new(RwLock::new(map))
    }

    #[tokio::test]
    async fn select_router_by_node_finds_owning_peer() {
        let snapshots = snapshots_with(vec![("gw-b", "agency-y", vec![9], "psi-match")]).await;
        let table = PeerRouterTable::new("gw-a", snapshots);
        let route_info = RouteInfo { dst_node: vec![9], ..Default::default() };
        let peers = table.select_router(RoutePolicy::NodeId, &route_info).await;
        assert_eq!(peers, vec!["gw-b".to_string()]);
    }

    #[tokio::test]
    async fn select_router_by_component_filters_on_both_agency_and_capability() {
        let snapshots = snapshots_with(vec![
                ("gw-b", "agency-y", vec![9], "psi-match"),
                ("gw-c", "agency-y", vec![10], "psi-store"),
                ("gw-d", "agency-z", vec![11], "psi-match"),
        ])
        .await;
        let table = PeerRouterTable::new("gw-a", snapshots);
        let route_info =
        RouteInfo { dst_inst: "agency-y".into(), component_type: "psi-match".into(), ..Default::default() };
        let peers = table.select_router(RoutePolicy::Component, &route_info).await;
        assert_eq!(peers, vec!["gw-b".to_string()]);
    }

    #[tokio::test]
    async fn broadcast_targets_picks_one_peer_per_agency_and_skips_self() {
        let snapshots = snapshots_with(vec![
                ("gw-a", "agency-x", vec![1], "psi-match"),
                ("gw-b", "agency-y", vec![2], "psi-match"),
                ("gw-c", "agency-y", vec![3], "psi-match"),
        ])
        .await;
        let table = PeerRouterTable::new("gw-a", snapshots);
        let targets = table.broadcast_targets().await;
        assert_eq!(targets.len(), 1);
        assert!(targets[0] == "gw-b" || targets[0] == "gw-c");
    }
}
