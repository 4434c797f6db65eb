use crate::{
    read_len_prefixed, read_len_prefixed_string, read_u16, write_len_prefixed, PacketType,
    RouteInfo, WireError,
};

/// `MessageHeader`: version · packetType · ttl · ext · traceID ·
/// srcGwNode · dstGwNode · optional RouteInfo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub version: u16,
    pub packet_type: PacketType,
    pub ttl: u16,
    pub ext: u16,
    pub trace_id: String,
    pub src_gw_node: Vec<u8>,
    pub dst_gw_node: Vec<u8>,
    pub route_info: Option<RouteInfo>,
}

impl MessageHeader {
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&(self.packet_type as u16).to_be_bytes());
        out.extend_from_slice(&self.ttl.to_be_bytes());
        out.extend_from_slice(&self.ext.to_be_bytes());
        write_len_prefixed(out, self.trace_id.as_bytes())?;
        write_len_prefixed(out, &self.src_gw_node)?;
        write_len_prefixed(out, &self.dst_gw_node)?;

        if self.packet_type.carries_route_info() {
            let route_info = self
            .route_info
            .as_ref()
            .ok_or(WireError::MalformedMessage("route info required for this packet type"))?;
            route_info.encode(out)?;
        }
        Ok(())
    }

    pub fn decode(buf: &[u8], idx: &mut usize) -> Result<Self, WireError> {
        let version = read_u16(buf, idx)?;
        let packet_type = PacketType::from_u16(read_u16(buf, idx)?)?;
        let ttl = read_u16(buf, idx)?;
        let ext = read_u16(buf, idx)?;
        let trace_id = read_len_prefixed_string(buf, idx)?;
        let src_gw_node = read_len_prefixed(buf, idx)?.to_vec();
        let dst_gw_node = read_len_prefixed(buf, idx)?.to_vec();

        let route_info = if packet_type.carries_route_info() {
            Some(RouteInfo::decode(buf, idx)?)
        } else {
            None
        };

        Ok(Self { version, packet_type, ttl, ext, trace_id, src_gw_node, dst_gw_node, route_info })
    }

    pub fn is_response(&self) -> bool {
        crate::is_response(self.ext)
    }

    pub fn dst_is_self_or_empty(&self, self_gw_node: &[u8]) -> bool {
        self.dst_gw_node.is_empty() || self.dst_gw_node == self_gw_node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EXT_ROUTE_BY_TOPIC;

    fn sample_header() -> MessageHeader {
        MessageHeader {
            version: 1,
            packet_type: PacketType::P2PMessage,
            ttl: 0,
            ext: EXT_ROUTE_BY_TOPIC,
            trace_id: "trace-1".into(),
            src_gw_node: b"gw-a".to_vec(),
            dst_gw_node: b"gw-b".to_vec(),
            route_info: Some(RouteInfo { topic: "handshake".into(), ..Default::default() }),
        }
    }

    #[test]
    fn roundtrip_with_route_info() {
        let header = sample_header();
        let mut buf = Vec::new();
        header.encode(&mut buf).unwrap();
        let mut idx = 0;
        let decoded = MessageHeader::decode(&buf, &mut idx).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(idx, buf.len());
    }

    #[test]
    fn router_table_sync_seq_has_no_route_info() {
        let header = MessageHeader {
            version: 1,
            packet_type: PacketType::RouterTableSyncSeq,
            ttl: 0,
            ext: 0,
            trace_id: String::new(),
            src_gw_node: b"gw-a".to_vec(),
            dst_gw_node: Vec::new(),
            route_info: None,
        };
        let mut buf = Vec::new();
        header.encode(&mut buf).unwrap();
        let mut idx = 0;
        let decoded = MessageHeader::decode(&buf, &mut idx).unwrap();
        assert_eq!(decoded.route_info, None);
    }

    #[test]
    fn encode_fails_when_route_info_missing_but_required() {
        let mut header = sample_header();
        header.route_info = None;
        let mut buf = Vec::new();
        assert!(header.encode(&mut buf).is_err());
    }

    #[test]
    fn decode_rejects_truncated_buffer() {
        let header = sample_header();
        let mut buf = Vec::new();
        header.encode(&mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        let mut idx = 0;
        assert!(MessageHeader::decode(&buf, &mut idx).is_err());
    }
}
