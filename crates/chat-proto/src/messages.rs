//! Gateway message format
//!
//! Defines the `{op, d, s, t}` envelope carried on every WebSocket frame.

use super::{
    HelloPayload, IdentifyPayload, OpCode, ReadyData, RequestMembersPayload, ResumePayload,
    StatusUpdatePayload,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway message envelope
///
/// All frames sent over the WebSocket connection follow this format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayMessage {
    /// Operation code
    pub op: OpCode,

    /// Event type (only for op=0 Dispatch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,

    /// Sequence number (only for op=0 Dispatch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event data payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<Value>,
}

impl GatewayMessage {
    /// Create a bare message for an op with a payload
    #[must_use]
    pub fn new(op: OpCode, d: Option<Value>) -> Self {
        Self {
            op,
            t: None,
            s: None,
            d,
        }
    }

    // === Client Messages ===

    /// Create a Heartbeat message (op=1) carrying the last received sequence
    #[must_use]
    pub fn heartbeat(seq: u64) -> Self {
        Self::new(OpCode::Heartbeat, Some(Value::Number(seq.into())))
    }

    /// Create an Identify message (op=2)
    #[must_use]
    pub fn identify(payload: &IdentifyPayload) -> Self {
        Self::new(OpCode::Identify, serde_json::to_value(payload).ok())
    }

    /// Create a Resume message (op=6)
    #[must_use]
    pub fn resume(payload: &ResumePayload) -> Self {
        Self::new(OpCode::Resume, serde_json::to_value(payload).ok())
    }

    /// Create a Status Update message (op=3)
    #[must_use]
    pub fn status_update(payload: &StatusUpdatePayload) -> Self {
        Self::new(OpCode::StatusUpdate, serde_json::to_value(payload).ok())
    }

    /// Create a Request Guild Members message (op=8)
    #[must_use]
    pub fn request_guild_members(payload: &RequestMembersPayload) -> Self {
        Self::new(OpCode::RequestGuildMembers, serde_json::to_value(payload).ok())
    }

    /// Create a Sync Guild message (op=12) carrying a list of guild IDs
    #[must_use]
    pub fn sync_guilds(guild_ids: &[String]) -> Self {
        Self::new(OpCode::SyncGuild, serde_json::to_value(guild_ids).ok())
    }

    // === Parsing Server Messages ===

    /// Try to parse as a Hello payload (op=10)
    pub fn as_hello(&self) -> Option<HelloPayload> {
        if self.op != OpCode::Hello {
            return None;
        }
        self.d.as_ref().and_then(|d| serde_json::from_value(d.clone()).ok())
    }

    /// Try to parse a dispatch frame's data as the READY payload
    pub fn as_ready(&self) -> Option<ReadyData> {
        if self.op != OpCode::Dispatch || self.t.as_deref() != Some("READY") {
            return None;
        }
        self.d.as_ref().and_then(|d| serde_json::from_value(d.clone()).ok())
    }

    /// Try to read the Invalid Session resumable flag (op=9)
    pub fn as_invalid_session(&self) -> Option<bool> {
        if self.op != OpCode::InvalidSession {
            return None;
        }
        Some(self.d.as_ref().and_then(Value::as_bool).unwrap_or(false))
    }

    /// Get the dispatch event name, if this is a dispatch frame
    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        if self.op == OpCode::Dispatch {
            self.t.as_deref()
        } else {
            None
        }
    }

    // === Utilities ===

    /// Check if this is a valid server-originated message
    #[must_use]
    pub fn is_valid_server_message(&self) -> bool {
        self.op.is_receive_op()
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayMessage(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayMessage(op={})", self.op)
        }
    }
}
