//! Gateway control message types.
//!
//! Every frame on the gateway is a JSON object `{op, d, t?, s?}`. The op code
//! is kept as a raw integer on [`GatewayMessage`] so frames carrying op codes
//! this crate does not model still parse and can be ignored.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::CordResult;

/// Gateway API version requested in the connection URL.
pub const GATEWAY_VERSION: u8 = 6;

/// Member count above which the server stops sending offline members.
pub const DEFAULT_LARGE_THRESHOLD: u32 = 250;

/// Numeric op codes of the gateway protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum OpCode {
    Dispatch = 0,
    Heartbeat = 1,
    Identify = 2,
    StatusUpdate = 3,
    Resume = 6,
    Reconnect = 7,
    RequestGuildMembers = 8,
    InvalidSession = 9,
    Hello = 10,
    HeartbeatAck = 11,
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> u8 {
        op as u8
    }
}

impl TryFrom<u8> for OpCode {
    type Error = String;
    fn try_from(v: u8) -> Result<Self, String> {
        match v {
            0 => Ok(Self::Dispatch),
            1 => Ok(Self::Heartbeat),
            2 => Ok(Self::Identify),
            3 => Ok(Self::StatusUpdate),
            6 => Ok(Self::Resume),
            7 => Ok(Self::Reconnect),
            8 => Ok(Self::RequestGuildMembers),
            9 => Ok(Self::InvalidSession),
            10 => Ok(Self::Hello),
            11 => Ok(Self::HeartbeatAck),
            _ => Err(format!("unknown op code: {v}")),
        }
    }
}

/// One gateway frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMessage {
    /// Raw op code; any integer is accepted so future op codes still parse.
    pub op: i64,
    #[serde(default)]
    pub d: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
}

impl GatewayMessage {
    pub fn new(op: OpCode, d: Value) -> Self {
        Self {
            op: i64::from(u8::from(op)),
            d,
            t: None,
            s: None,
        }
    }

    /// The modelled op code, or `None` for op codes this crate does not know.
    pub fn opcode(&self) -> Option<OpCode> {
        u8::try_from(self.op)
            .ok()
            .and_then(|raw| OpCode::try_from(raw).ok())
    }

    /// Heartbeat carrying the last received sequence number (`null` if none yet).
    pub fn heartbeat(seq: Option<u64>) -> Self {
        Self::new(OpCode::Heartbeat, json!(seq))
    }

    pub fn identify(payload: &IdentifyPayload) -> CordResult<Self> {
        Ok(Self::new(OpCode::Identify, serde_json::to_value(payload)?))
    }

    pub fn resume(payload: &ResumePayload) -> CordResult<Self> {
        Ok(Self::new(OpCode::Resume, serde_json::to_value(payload)?))
    }
}

/// Shard tuple `[id, count]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct ShardInfo {
    pub id: u32,
    pub count: u32,
}

impl ShardInfo {
    pub fn new(id: u32, count: u32) -> Self {
        Self { id, count }
    }
}

impl From<[u32; 2]> for ShardInfo {
    fn from([id, count]: [u32; 2]) -> Self {
        Self { id, count }
    }
}

impl From<ShardInfo> for [u32; 2] {
    fn from(shard: ShardInfo) -> Self {
        [shard.id, shard.count]
    }
}

/// Payload of op 10 Hello.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Interval in milliseconds.
    pub heartbeat_interval: u64,
}

/// Client metadata sent with Identify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl ConnectionProperties {
    /// Properties for this host's OS with the given client name.
    pub fn for_client(name: &str) -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: name.to_string(),
            device: name.to_string(),
        }
    }
}

/// Payload of op 2 Identify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
    pub properties: ConnectionProperties,
    pub compress: bool,
    pub large_threshold: u32,
    pub presence: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<ShardInfo>,
}

/// Payload of op 6 Resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumePayload {
    pub token: String,
    pub session_id: String,
    pub seq: Option<u64>,
}

/// The fields of the READY dispatch the client relies on.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReadyPayload {
    pub session_id: String,
    #[serde(default)]
    pub v: Option<u32>,
    #[serde(default)]
    pub shard: Option<ShardInfo>,
}

/// Online presence without a game, used when the caller supplies none.
pub fn default_presence() -> Value {
    json!({
        "game": null,
        "status": "online",
        "since": null,
        "afk": false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trip() {
        for op in [OpCode::Dispatch, OpCode::Resume, OpCode::HeartbeatAck] {
            let raw: u8 = op.into();
            assert_eq!(OpCode::try_from(raw).unwrap(), op);
        }
        assert!(OpCode::try_from(5).is_err());
        assert!(OpCode::try_from(42).is_err());
    }

    #[test]
    fn identify_parses_back_with_token_and_shard() {
        let payload = IdentifyPayload {
            token: "secret".into(),
            properties: ConnectionProperties::for_client("cordwire"),
            compress: false,
            large_threshold: DEFAULT_LARGE_THRESHOLD,
            presence: default_presence(),
            shard: Some(ShardInfo::new(1, 4)),
        };
        let msg = GatewayMessage::identify(&payload).unwrap();
        assert_eq!(msg.opcode(), Some(OpCode::Identify));
        assert_eq!(msg.d["shard"], json!([1, 4]));
        assert_eq!(msg.d["compress"], json!(false));
        assert_eq!(msg.d["large_threshold"], json!(250));

        let parsed: IdentifyPayload = serde_json::from_value(msg.d).unwrap();
        assert_eq!(parsed.token, "secret");
        assert_eq!(parsed.shard, Some(ShardInfo::new(1, 4)));
    }

    #[test]
    fn identify_without_shard_omits_field() {
        let payload = IdentifyPayload {
            token: "t".into(),
            properties: ConnectionProperties::for_client("cordwire"),
            compress: false,
            large_threshold: DEFAULT_LARGE_THRESHOLD,
            presence: default_presence(),
            shard: None,
        };
        let msg = GatewayMessage::identify(&payload).unwrap();
        assert!(msg.d.get("shard").is_none());
        assert_eq!(msg.d["properties"]["browser"], json!("cordwire"));
    }

    #[test]
    fn heartbeat_carries_sequence_or_null() {
        assert_eq!(GatewayMessage::heartbeat(None).d, Value::Null);
        assert_eq!(GatewayMessage::heartbeat(Some(7)).d, json!(7));
    }

    #[test]
    fn resume_payload_fields() {
        let msg = GatewayMessage::resume(&ResumePayload {
            token: "t".into(),
            session_id: "abc".into(),
            seq: Some(5),
        })
        .unwrap();
        assert_eq!(msg.op, 6);
        assert_eq!(msg.d, json!({"token": "t", "session_id": "abc", "seq": 5}));
    }
}
