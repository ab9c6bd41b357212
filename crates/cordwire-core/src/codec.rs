//! JSON text framing for the gateway.
//!
//! Wire format: one JSON object per WebSocket text frame.

use serde::de::DeserializeOwned;

use crate::error::{CordError, CordResult};
use crate::messages::GatewayMessage;

/// Encode a gateway message into a text frame.
pub fn frame_encode(msg: &GatewayMessage) -> CordResult<String> {
    Ok(serde_json::to_string(msg)?)
}

/// Decode a text frame into a gateway message.
///
/// A truncated or otherwise malformed frame is a codec error.
pub fn frame_decode(text: &str) -> CordResult<GatewayMessage> {
    serde_json::from_str(text).map_err(|e| CordError::Codec(format!("malformed gateway frame: {e}")))
}

/// Decode the `d` field of a message into a typed payload.
pub fn payload_decode<T: DeserializeOwned>(msg: &GatewayMessage) -> CordResult<T> {
    T::deserialize(&msg.d).map_err(|e| CordError::Codec(format!("op {} payload: {e}", msg.op)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{HelloPayload, OpCode};
    use serde_json::json;

    #[test]
    fn decode_dispatch() {
        let msg = frame_decode(r#"{"op":0,"d":{"content":"hi"},"t":"MESSAGE_CREATE","s":42}"#)
            .unwrap();
        assert_eq!(msg.opcode(), Some(OpCode::Dispatch));
        assert_eq!(msg.t.as_deref(), Some("MESSAGE_CREATE"));
        assert_eq!(msg.s, Some(42));
        assert_eq!(msg.d["content"], json!("hi"));
    }

    #[test]
    fn decode_unknown_op_still_parses() {
        let msg = frame_decode(r#"{"op":42,"d":null}"#).unwrap();
        assert_eq!(msg.op, 42);
        assert_eq!(msg.opcode(), None);
    }

    #[test]
    fn decode_op_outside_u8_range_still_parses() {
        let msg = frame_decode(r#"{"op":300,"d":null}"#).unwrap();
        assert_eq!(msg.op, 300);
        assert_eq!(msg.opcode(), None);

        let msg = frame_decode(r#"{"op":-1,"d":{}}"#).unwrap();
        assert_eq!(msg.opcode(), None);
    }

    #[test]
    fn decode_truncated_frame_fails() {
        let err = frame_decode(r#"{"op":0,"d":{"con"#).unwrap_err();
        assert!(matches!(err, CordError::Codec(_)));
    }

    #[test]
    fn decode_hello_payload() {
        let msg = frame_decode(r#"{"op":10,"d":{"heartbeat_interval":41250}}"#).unwrap();
        let hello: HelloPayload = payload_decode(&msg).unwrap();
        assert_eq!(hello.heartbeat_interval, 41250);
    }

    #[test]
    fn encode_omits_absent_fields() {
        let text = frame_encode(&GatewayMessage::heartbeat(Some(3))).unwrap();
        assert_eq!(text, r#"{"op":1,"d":3}"#);
    }
}
