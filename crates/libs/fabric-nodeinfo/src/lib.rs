//! Gateway node-info registry.
//!
//! [`GatewayNodeInfo`] mirrors the shape of `fabric_routing::RoutingTable`:
//! a plain, lock-free data structure that bumps its own `statusSeq` exactly
//! once per call that actually changes something, leaving the "hold one
//! `RwLock` across the whole operation" discipline to its caller.

use std::collections::{HashMap, HashSet};

use fabric_wire::{read_len_prefixed_string, write_len_prefixed, WireError};

/// One front attached to a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub node_id: Vec<u8>,
    pub endpoint: String,
    pub components: HashSet<String>,
}

impl NodeInfo {
    pub fn new(
        node_id: impl Into<Vec<u8>>,
        endpoint: impl Into<String>,
        components: HashSet<String>,
    ) -> Result<Self, NodeInfoError> {
        let endpoint = endpoint.into();
        validate_host_port(&endpoint)?;
        Ok(Self { node_id: node_id.into(), endpoint, components })
    }

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        write_len_prefixed(out, &self.node_id)?;
        write_len_prefixed(out, self.endpoint.as_bytes())?;
        let count = u16::try_from(self.components.len())
        .map_err(|_| WireError::MalformedMessage("too many components to serialize"))?;
        out.extend_from_slice(&count.to_be_bytes());
        for component in &self.components {
            write_len_prefixed(out, component.as_bytes())?;
        }
        Ok(())
    }

    fn decode(buf: &[u8], idx: &mut usize) -> Result<Self, WireError> {
        let node_id = fabric_wire::read_len_prefixed(buf, idx)?.to_vec();
        let endpoint = read_len_prefixed_string(buf, idx)?;
        let count = fabric_wire::read_u16(buf, idx)? as usize;
        let mut components = HashSet::with_capacity(count);
        for _ in 0..count {
            components.insert(read_len_prefixed_string(buf, idx)?);
        }
        Ok(Self { node_id, endpoint, components })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NodeInfoError {
    #[error("endpoint {0:?} is not a parseable host:port pair")]
    InvalidEndpoint(String),
    #[error(transparent)]
    Wire(#[from] WireError),
}

fn validate_host_port(endpoint: &str) -> Result<(), NodeInfoError> {
    match endpoint.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(()),
        _ => Err(NodeInfoError::InvalidEndpoint(endpoint.to_string())),
    }
}

/// A gateway's full advertisement of its locally-attached fronts.
pub struct GatewayNodeInfo {
    p2p_node_id: Vec<u8>,
    agency: String,
    status_seq: u32,
    nodes: HashMap<Vec<u8>, NodeInfo>,
    topics: HashMap<Vec<u8>, HashSet<String>>,
}

impl GatewayNodeInfo {
    pub fn new(p2p_node_id: impl Into<Vec<u8>>, agency: impl Into<String>) -> Self {
        Self {
            p2p_node_id: p2p_node_id.into(),
            agency: agency.into(),
            status_seq: 0,
            nodes: HashMap::new(),
            topics: HashMap::new(),
        }
    }

    pub fn p2p_node_id(&self) -> &[u8] {
        &self.p2p_node_id
    }

    pub fn agency(&self) -> &str {
        &self.agency
    }

    pub fn status_seq(&self) -> u32 {
        self.status_seq
    }

    pub fn node(&self, node_id: &[u8]) -> Option<&NodeInfo> {
        self.nodes.get(node_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes.values()
    }

    pub fn topics_for(&self, node_id: &[u8]) -> Option<&HashSet<String>> {
        self.topics.get(node_id)
    }

    pub fn nodes_with_component<'a>(
        &'a self,
        component: &'a str,
    ) -> impl Iterator<Item = &'a NodeInfo> {
        self.nodes.values().filter(move |n| n.components.contains(component))
    }

    pub fn nodes_with_topic<'a>(&'a self, topic: &'a str) -> impl Iterator<Item = &'a [u8]> {
        self.topics
        .iter()
        .filter(move |(_, topics)| topics.contains(topic))
        .map(|(node_id, _)| node_id.as_slice())
    }

    /// `register`: insert or update, bumping `statusSeq` only if the
    /// stored info is new or actually different — registering the same
    /// info twice leaves `statusSeq` identical to a single register.
    pub fn register(&mut self, info: NodeInfo) -> bool {
        let changed = match self.nodes.get(&info.node_id) {
            Some(existing) => *existing != info,
            None => true,
        };
        if changed {
            self.nodes.insert(info.node_id.clone(), info);
            self.status_seq = self.status_seq.wrapping_add(1);
            log::debug!(
                "gateway node-info for agency {}: statusSeq -> {} after register",
                self.agency,
                self.status_seq
            );
        }
        changed
    }

    /// `unregisterNode`: drop the node and all of its topic
    /// bindings. Idempotent: unregistering an absent node is a no-op.
    pub fn unregister_node(&mut self, node_id: &[u8]) -> bool {
        let removed_node = self.nodes.remove(node_id).is_some();
        let removed_topics = self.topics.remove(node_id).is_some();
        let changed = removed_node || removed_topics;
        if changed {
            self.status_seq = self.status_seq.wrapping_add(1);
        }
        changed
    }

    pub fn register_topic(&mut self, node_id: &[u8], topic: impl Into<String>) -> bool {
        let topic = topic.into();
        let entry = self.topics.entry(node_id.to_vec()).or_default();
        let changed = entry.insert(topic);
        if changed {
            self.status_seq = self.status_seq.wrapping_add(1);
        }
        changed
    }

    pub fn unregister_topic(&mut self, node_id: &[u8], topic: &str) -> bool {
        let changed = match self.topics.get_mut(node_id) {
            Some(topics) => {
                let removed = topics.remove(topic);
                if topics.is_empty() {
                    self.topics.remove(node_id);
                }
                removed
            }
            None => false,
        };
        if changed {
            self.status_seq = self.status_seq.wrapping_add(1);
        }
        changed
    }

    /// Encode the `ResponseNodeStatus` payload: p2pNodeID · agency ·
    /// statusSeq(4B) · node count(2B) · nodes, each followed by its topic
    /// set.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut out = Vec::new();
        write_len_prefixed(&mut out, &self.p2p_node_id)?;
        write_len_prefixed(&mut out, self.agency.as_bytes())?;
        out.extend_from_slice(&self.status_seq.to_be_bytes());

        let count = u16::try_from(self.nodes.len())
        .map_err(|_| WireError::MalformedMessage("too many nodes to serialize"))?;
        out.extend_from_slice(&count.to_be_bytes());
        for info in self.nodes.values() {
            info.encode(&mut out)?;
            let topics = self.topics.get(&info.node_id);
            let topic_count = topics.map(|t| t.len()).unwrap_or(0);
            let topic_count = u16::try_from(topic_count)
            .map_err(|_| WireError::MalformedMessage("too many topics to serialize"))?;
            out.extend_from_slice(&topic_count.to_be_bytes());
            if let Some(topics) = topics {
                for topic in topics {
                    write_len_prefixed(&mut out, topic.as_bytes())?;
                }
            }
        }
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut idx = 0;
        let p2p_node_id = fabric_wire::read_len_prefixed(buf, &mut idx)?.to_vec();
        let agency = read_len_prefixed_string(buf, &mut idx)?;
        let status_seq = fabric_wire::read_u32(buf, &mut idx)?;

        let node_count = fabric_wire::read_u16(buf, &mut idx)? as usize;
        let mut nodes = HashMap::with_capacity(node_count);
        let mut topics = HashMap::new();
        for _ in 0..node_count {
            let info = NodeInfo::decode(buf, &mut idx)?;
            let topic_count = fabric_wire::read_u16(buf, &mut idx)? as usize;
            let mut node_topics = HashSet::with_capacity(topic_count);
            for _ in 0..topic_count {
                node_topics.insert(read_len_prefixed_string(buf, &mut idx)?);
            }
            if !node_topics.is_empty() {
                topics.insert(info.node_id.clone(), node_topics);
            }
            nodes.insert(info.node_id.clone(), info);
        }

        Ok(Self { p2p_node_id, agency, status_seq, nodes, topics })
    }

    /// Any observed decrease in a peer's advertised seq means the peer
    /// restarted; resync fully rather than treat it as stale.
    pub fn peer_restarted(stored_seq: u32, advertised_seq: u32) -> bool {
        advertised_seq < stored_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_node(id: u8) -> NodeInfo {
        NodeInfo::new(vec![id], "127.0.0.1:9000", HashSet::from(["psi-match".to_string()]))
        .unwrap()
    }

    #[test]
    fn endpoint_validation_rejects_missing_port() {
        assert!(NodeInfo::new(vec![1], "127.0.0.1", HashSet::new()).is_err());
    }

    #[test]
    fn register_bumps_seq_only_when_new_or_changed() {
        let mut gw = GatewayNodeInfo::new(b"gw-a".to_vec(), "agency-1");
        assert!(gw.register(sample_node(1)));
        let seq_after_first = gw.status_seq();
        assert!(!gw.register(sample_node(1)));
        assert_eq!(gw.status_seq(), seq_after_first);

        let mut changed = sample_node(1);
        changed.components.insert("psi-store".to_string());
        assert!(gw.register(changed));
        assert!(gw.status_seq() > seq_after_first);
    }

    #[test]
    fn unregister_node_removes_topics_and_is_idempotent() {
        let mut gw = GatewayNodeInfo::new(b"gw-a".to_vec(), "agency-1");
        gw.register(sample_node(1));
        gw.register_topic(&[1], "alerts");
        assert!(gw.unregister_node(&[1]));
        assert!(gw.node(&[1]).is_none());
        assert!(gw.topics_for(&[1]).is_none());
        assert!(!gw.unregister_node(&[1]));
    }

    #[test]
    fn register_topic_dedups_and_unregister_cleans_up_empty_sets() {
        let mut gw = GatewayNodeInfo::new(b"gw-a".to_vec(), "agency-1");
        gw.register(sample_node(1));
        assert!(gw.register_topic(&[1], "alerts"));
        assert!(!gw.register_topic(&[1], "alerts"));
        assert!(gw.unregister_topic(&[1], "alerts"));
        assert!(gw.topics_for(&[1]).is_none());
    }

    #[test]
    fn nodes_with_component_and_topic_filter_correctly() {
        let mut gw = GatewayNodeInfo::new(b"gw-a".to_vec(), "agency-1");
        gw.register(sample_node(1));
        gw.register(sample_node(2));
        gw.register_topic(&[1], "alerts");

        let with_component: Vec<_> = gw.nodes_with_component("psi-match").collect();
        assert_eq!(with_component.len(), 2);

        let with_topic: Vec<_> = gw.nodes_with_topic("alerts").collect();
        assert_eq!(with_topic, vec![[1u8].as_slice()]);
    }

    #[test]
    fn wire_roundtrip_preserves_nodes_and_topics() {
        let mut gw = GatewayNodeInfo::new(b"gw-a".to_vec(), "agency-1");
        gw.register(sample_node(1));
        gw.register_topic(&[1], "alerts");

        let bytes = gw.encode().unwrap();
        let decoded = GatewayNodeInfo::decode(&bytes).unwrap();
        assert_eq!(decoded.agency(), "agency-1");
        assert_eq!(decoded.status_seq(), gw.status_seq());
        assert_eq!(decoded.node(&[1]), gw.node(&[1]));
        assert_eq!(decoded.topics_for(&[1]), gw.topics_for(&[1]));
    }

    #[test]
    fn peer_restart_detection() {
        assert!(GatewayNodeInfo::peer_restarted(10, 2));
        assert!(!GatewayNodeInfo::peer_restarted(10, 11));
    }
}
