//! Shard error types

use chat_proto::ProtocolError;
use thiserror::Error;

/// Gateway session error
///
/// Recoverable errors are surfaced as `error`/`warn` signals and leave the
/// state machine on its documented transition; fatal errors disconnect the
/// session without re-arming the reconnect timer.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Transient transport failure (socket reset, handshake failure)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server closed the connection with a gateway close code
    #[error("{message}")]
    Closed {
        /// Numeric close code
        code: u16,
        /// Mapped error text
        message: String,
        /// Whether the close is fatal (no automatic reconnect)
        fatal: bool,
    },

    /// The connection attempt did not reach the handshake in time
    #[error("Connection timed out")]
    ConnectTimeout,

    /// Inbound frame failed to decompress
    #[error("Decompression error: {0}")]
    Decompress(String),

    /// Inbound frame failed to decode
    #[error(transparent)]
    Decode(#[from] ProtocolError),

    /// The server did not acknowledge the previous heartbeat
    #[error("Server didn't acknowledge previous heartbeat, possible lost connection")]
    MissedHeartbeat,

    /// Caller misuse (connect while connected, missing token)
    #[error("Usage error: {0}")]
    Usage(String),
}

impl GatewayError {
    /// Check if this error terminates the session without auto-reconnect
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Closed { fatal: true, .. })
    }
}

/// Result type for shard operations
pub type GatewayResult<T> = Result<T, GatewayError>;
