use crate::{read_len_prefixed, read_len_prefixed_string, write_len_prefixed, RoutePolicy, WireError};

/// Routing metadata carried alongside a `P2PMessage`/`BroadcastMessage`
/// frame. Wire order is `componentType · srcNode · srcInst ·
/// dstNode · dstInst · topic` — distinct from the field table's narrative
/// order, which lists `topic` first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteInfo {
    pub component_type: String,
    pub src_node: Vec<u8>,
    pub src_inst: String,
    pub dst_node: Vec<u8>,
    pub dst_inst: String,
    pub topic: String,
}

impl RouteInfo {
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        write_len_prefixed(out, self.component_type.as_bytes())?;
        write_len_prefixed(out, &self.src_node)?;
        write_len_prefixed(out, self.src_inst.as_bytes())?;
        write_len_prefixed(out, &self.dst_node)?;
        write_len_prefixed(out, self.dst_inst.as_bytes())?;
        write_len_prefixed(out, self.topic.as_bytes())?;
        Ok(())
    }

    pub fn decode(buf: &[u8], idx: &mut usize) -> Result<Self, WireError> {
        let component_type = read_len_prefixed_string(buf, idx)?;
        let src_node = read_len_prefixed(buf, idx)?.to_vec();
        let src_inst = read_len_prefixed_string(buf, idx)?;
        let dst_node = read_len_prefixed(buf, idx)?.to_vec();
        let dst_inst = read_len_prefixed_string(buf, idx)?;
        let topic = read_len_prefixed_string(buf, idx)?;
        Ok(Self { component_type, src_node, src_inst, dst_node, dst_inst, topic })
    }

    /// Checks the per-policy required-field invariants. This is an
    /// application-level validity check used by senders building an
    /// outbound frame, not part of wire decode: a frame that round-trips
    /// structurally is always decodable even if a higher layer would
    /// refuse to have sent it.
    pub fn validate(&self, policy: RoutePolicy) -> Result<(), WireError> {
        match policy {
            RoutePolicy::NodeId => {
                if self.dst_node.is_empty() {
                    return Err(WireError::InvalidRouteInfo(policy, "dst_node is required"));
                }
            }
            RoutePolicy::Agency => {
                if self.dst_inst.is_empty() {
                    return Err(WireError::InvalidRouteInfo(policy, "dst_inst is required"));
                }
            }
            RoutePolicy::Component => {
                if self.dst_inst.is_empty() {
                    return Err(WireError::InvalidRouteInfo(policy, "dst_inst is required"));
                }
                if self.component_type.is_empty() {
                    return Err(WireError::InvalidRouteInfo(policy, "component_type is required"));
                }
            }
            RoutePolicy::Topic => {
                if self.topic.is_empty() {
                    return Err(WireError::InvalidRouteInfo(policy, "topic is required"));
                }
            }
        }
        Ok(())
    }

    /// A broadcast clears `dst_node`; helper for senders.
    pub fn clear_dst_node(&mut self) {
        self.dst_node.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let info = RouteInfo {
            component_type: "PSI-server".into(),
            src_node: vec![1, 2, 3],
            src_inst: "agency-x".into(),
            dst_node: vec![4, 5],
            dst_inst: "agency-y".into(),
            topic: "handshake".into(),
        };
        let mut buf = Vec::new();
        info.encode(&mut buf).unwrap();
        let mut idx = 0;
        let decoded = RouteInfo::decode(&buf, &mut idx).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(idx, buf.len());
    }

    #[test]
    fn validate_by_node_requires_dst_node() {
        let info = RouteInfo::default();
        assert!(info.validate(RoutePolicy::NodeId).is_err());
    }

    #[test]
    fn validate_by_component_requires_both_fields() {
        let mut info = RouteInfo { dst_inst: "agency-y".into(), ..Default::default() };
        assert!(info.validate(RoutePolicy::Component).is_err());
        info.component_type = "PSI-server".into();
        assert!(info.validate(RoutePolicy::Component).is_ok());
    }
}
