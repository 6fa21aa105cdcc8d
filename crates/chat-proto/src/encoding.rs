//! Payload encoding
//!
//! The gateway negotiates one payload codec per session: textual JSON or the
//! compact MessagePack binary envelope. The choice is made at session init
//! and is sticky for the lifetime of the session.

use crate::GatewayMessage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol-level encode/decode errors
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    /// Failed to encode an outbound envelope
    #[error("Failed to encode frame: {0}")]
    Encode(String),

    /// Failed to decode an inbound envelope
    #[error("Failed to decode frame: {0}")]
    Decode(String),
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// An encoded outbound frame, matching the WebSocket message kind it rides on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedFrame {
    /// JSON rides on text frames
    Text(String),
    /// MessagePack rides on binary frames
    Binary(Vec<u8>),
}

impl EncodedFrame {
    /// Byte length of the encoded frame
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Binary(b) => b.len(),
        }
    }

    /// Check if the frame is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Payload codec for the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Textual JSON (the default)
    #[default]
    Json,
    /// Compact MessagePack binary envelopes
    #[serde(rename = "msgpack")]
    MessagePack,
}

impl Encoding {
    /// The encoding name used in the gateway URL query string
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::MessagePack => "msgpack",
        }
    }

    /// Encode an envelope for transmission
    pub fn encode(self, message: &GatewayMessage) -> ProtocolResult<EncodedFrame> {
        match self {
            Self::Json => message
                .to_json()
                .map(EncodedFrame::Text)
                .map_err(|e| ProtocolError::Encode(e.to_string())),
            Self::MessagePack => rmp_serde::to_vec_named(message)
                .map(EncodedFrame::Binary)
                .map_err(|e| ProtocolError::Encode(e.to_string())),
        }
    }

    /// Decode an inbound payload buffer into an envelope
    pub fn decode(self, payload: &[u8]) -> ProtocolResult<GatewayMessage> {
        match self {
            Self::Json => serde_json::from_slice(payload)
                .map_err(|e| ProtocolError::Decode(e.to_string())),
            Self::MessagePack => rmp_serde::from_slice(payload)
                .map_err(|e| ProtocolError::Decode(e.to_string())),
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}
