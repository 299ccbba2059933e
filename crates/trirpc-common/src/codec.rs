//! Wire codec and framing
//!
//! All transports encode messages as JSON; they differ only in how a
//! message boundary is expressed on the wire:
//!
//! - **HTTP**: one request body = one `Call`, one response body = one
//!   `Response`; the protocol's own content-length boundary frames it.
//! - **TCP**: `\n` + JSON(envelope) + `\n`. The leading newline means a
//!   message can never be concatenated onto a partial previous write;
//!   readers split on newlines and discard empty lines.
//! - **WebSocket**: one text message = one JSON envelope; the transport
//!   preserves message boundaries on its own.

use crate::protocol::{CallEnvelope, Result, ResponseEnvelope};

/// Delimiter between logical messages on the TCP transport.
pub const FRAME_DELIMITER: u8 = b'\n';

/// JSON codec for the envelope frames used by connection-oriented
/// transports.
///
/// # Example
///
/// ```
/// use trirpc_common::codec::JsonCodec;
/// use trirpc_common::protocol::{Call, CallEnvelope};
/// use serde_json::json;
///
/// let envelope = CallEnvelope { seq: 1, call: Call::query("echo", vec![json!("hi")]) };
/// let encoded = JsonCodec::encode_call(&envelope).unwrap();
/// let decoded = JsonCodec::decode_call(&encoded).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a client-to-server envelope to bytes.
    pub fn encode_call(envelope: &CallEnvelope) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(envelope)?)
    }

    /// Decode a client-to-server envelope from bytes.
    pub fn decode_call(data: &[u8]) -> Result<CallEnvelope> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Encode a server-to-client envelope to bytes.
    pub fn encode_response(envelope: &ResponseEnvelope) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(envelope)?)
    }

    /// Decode a server-to-client envelope from bytes.
    pub fn decode_response(data: &[u8]) -> Result<ResponseEnvelope> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Wrap an encoded payload in the TCP transport's newline framing.
///
/// Every write carries a leading and a trailing delimiter; the empty
/// line this produces between consecutive messages is discarded by the
/// read side.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(payload.len() + 2);
    framed.push(FRAME_DELIMITER);
    framed.extend_from_slice(payload);
    framed.push(FRAME_DELIMITER);
    framed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Call, Response};
    use serde_json::json;

    #[test]
    fn call_envelope_round_trip() {
        let envelope = CallEnvelope {
            seq: 42,
            call: Call::subscribe("listen", vec![json!("Life")]),
        };
        let encoded = JsonCodec::encode_call(&envelope).unwrap();
        assert!(!encoded.is_empty());
        let decoded = JsonCodec::decode_call(&encoded).unwrap();
        assert_eq!(envelope, decoded);
    }

    #[test]
    fn response_envelope_round_trip() {
        let envelope = ResponseEnvelope {
            seq: 42,
            response: Response::fail("not_found"),
        };
        let encoded = JsonCodec::encode_response(&envelope).unwrap();
        let decoded = JsonCodec::decode_response(&encoded).unwrap();
        assert_eq!(envelope, decoded);
    }

    #[test]
    fn invalid_data_returns_error() {
        assert!(JsonCodec::decode_call(&[0xff, 0xff]).is_err());
        assert!(JsonCodec::decode_response(b"{").is_err());
    }

    #[test]
    fn frame_adds_leading_and_trailing_delimiter() {
        let framed = frame(b"{}");
        assert_eq!(framed, b"\n{}\n");
    }

    #[test]
    fn framed_messages_survive_line_splitting() {
        let a = frame(br#"{"Seq":1}"#);
        let b = frame(br#"{"Seq":2}"#);
        let stream = [a, b].concat();
        let lines: Vec<&[u8]> = stream
            .split(|byte| *byte == FRAME_DELIMITER)
            .filter(|line| !line.is_empty())
            .collect();
        assert_eq!(lines, vec![&br#"{"Seq":1}"#[..], &br#"{"Seq":2}"#[..]]);
    }
}
