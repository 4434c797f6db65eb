use crate::{read_len_prefixed, read_len_prefixed_string, write_len_prefixed, WireError, EXT_RESPONSE};

/// Minimum byte count before [`MessagePayload::decode`] even attempts to
/// read its fixed-size fields.
const MIN_PAYLOAD_SIZE: usize = 6;

/// The inner envelope fronts exchange, carried inside a [`crate::Message`]'s
/// payload once it reaches a front: version · seq · traceID · ext · data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePayload {
    pub version: u8,
    pub seq: u16,
    pub trace_id: String,
    pub ext: u16,
    pub data: Vec<u8>,
}

impl MessagePayload {
    pub fn new(trace_id: impl Into<String>, seq: u16, data: Vec<u8>) -> Self {
        Self { version: 1, seq, trace_id: trace_id.into(), ext: 0, data }
    }

    pub fn is_response(&self) -> bool {
        self.ext & EXT_RESPONSE != 0
    }

    pub fn mark_response(&mut self) {
        self.ext |= EXT_RESPONSE;
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut out = Vec::with_capacity(MIN_PAYLOAD_SIZE + self.trace_id.len() + self.data.len());
        out.push(self.version);
        out.extend_from_slice(&self.seq.to_be_bytes());
        write_len_prefixed(&mut out, self.trace_id.as_bytes())?;
        out.extend_from_slice(&self.ext.to_be_bytes());
        write_len_prefixed(&mut out, &self.data)?;
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < MIN_PAYLOAD_SIZE {
            return Err(WireError::MalformedPayload("payload shorter than the minimum frame size"));
        }
        let mut idx = 0;
        if bytes.is_empty() {
            return Err(WireError::MalformedPayload("missing version byte"));
        }
        let version = bytes[idx];
        idx += 1;

        let seq = crate::read_u16(bytes, &mut idx)
        .map_err(|_| WireError::MalformedPayload("truncated seq field"))?;
        let trace_id = read_len_prefixed_string(bytes, &mut idx)
        .map_err(|_| WireError::MalformedPayload("truncated traceID field"))?;
        let ext = crate::read_u16(bytes, &mut idx)
        .map_err(|_| WireError::MalformedPayload("truncated ext field"))?;
        let data = read_len_prefixed(bytes, &mut idx)
        .map_err(|_| WireError::MalformedPayload("truncated data field"))?
        .to_vec();

        Ok(Self { version, seq, trace_id, ext, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let payload = MessagePayload::new("trace-xyz", 7, b"ping".to_vec());
        let bytes = payload.encode().unwrap();
        let decoded = MessagePayload::decode(&bytes).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn response_flag_roundtrips() {
        let mut payload = MessagePayload::new("trace-xyz", 1, Vec::new());
        payload.mark_response();
        let bytes = payload.encode().unwrap();
        let decoded = MessagePayload::decode(&bytes).unwrap();
        assert!(decoded.is_response());
    }

    #[test]
    fn decode_rejects_undersized_input() {
        assert!(matches!(
                MessagePayload::decode(&[0u8; 5]),
                Err(WireError::MalformedPayload(_))
        ));
    }

    #[test]
    fn decode_rejects_truncated_length_prefix() {
        let payload = MessagePayload::new("t", 1, b"data".to_vec());
        let mut bytes = payload.encode().unwrap();
        bytes.truncate(bytes.len() - 2);
        assert!(MessagePayload::decode(&bytes).is_err());
    }
}
