use crate::{MessageHeader, WireError, DEFAULT_MAX_FRAME_SIZE};

/// A complete frame: header followed contiguously by the opaque application
/// payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut out = Vec::with_capacity(64 + self.payload.len());
        self.header.encode(&mut out)?;
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    pub fn decode(bytes: &[u8], max_frame_size: usize) -> Result<Self, WireError> {
        if bytes.len() > max_frame_size {
            return Err(WireError::FrameTooLarge(bytes.len(), max_frame_size));
        }
        let mut idx = 0;
        let header = MessageHeader::decode(bytes, &mut idx)?;
        let payload = bytes[idx..].to_vec();
        Ok(Self { header, payload })
    }

    pub fn decode_default(bytes: &[u8]) -> Result<Self, WireError> {
        Self::decode(bytes, DEFAULT_MAX_FRAME_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PacketType, RouteInfo, EXT_ROUTE_BY_NODE};

    fn sample() -> Message {
        Message {
            header: MessageHeader {
                version: 1,
                packet_type: PacketType::P2PMessage,
                ttl: 3,
                ext: EXT_ROUTE_BY_NODE,
                trace_id: "t-1".into(),
                src_gw_node: b"gw-a".to_vec(),
                dst_gw_node: b"gw-b".to_vec(),
                route_info: Some(RouteInfo { dst_node: b"front-1".to_vec(), ..Default::default() }),
            },
            payload: b"hello gateway".to_vec(),
        }
    }

    #[test]
    fn encode_decode_preserves_fields() {
        let msg = sample();
        let bytes = msg.encode().unwrap();
        let decoded = Message::decode_default(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn decode_rejects_oversize_frame() {
        let msg = sample();
        let bytes = msg.encode().unwrap();
        assert!(matches!(
                Message::decode(&bytes, bytes.len() - 1),
                Err(WireError::FrameTooLarge(_, _))
        ));
    }

    #[test]
    fn decode_checks_length_prefixes_before_advancing() {
        // A length prefix claiming more bytes than remain must fail cleanly
        // rather than panic on out-of-bounds slicing.
        let mut bytes = vec![0u8; 2 + 2 + 2 + 2];
        bytes[8] = 0xFF;
        bytes[9] = 0xFF;
        assert!(Message::decode_default(&bytes).is_err());
    }
}
