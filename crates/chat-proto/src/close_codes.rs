//! WebSocket close codes
//!
//! Defines gateway-specific close codes and the client-side policy for each:
//! whether to reconnect, and which parts of the session identity to discard.

use serde::{Deserialize, Serialize};

/// Gateway WebSocket close codes
///
/// These codes are received when the server closes the connection to indicate the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum CloseCode {
    /// Unknown error occurred
    UnknownError = 4000,
    /// Invalid opcode sent
    UnknownOpcode = 4001,
    /// Invalid payload encoding (decode error)
    DecodeError = 4002,
    /// Sent payload before Identify
    NotAuthenticated = 4003,
    /// Invalid token provided
    AuthenticationFailed = 4004,
    /// Sent Identify twice
    AlreadyAuthenticated = 4005,
    /// Session is no longer valid
    InvalidSession = 4006,
    /// Invalid sequence number for Resume
    InvalidSequence = 4007,
    /// Too many requests (rate limited)
    RateLimited = 4008,
    /// Session has timed out
    SessionTimeout = 4009,
    /// Invalid shard configuration
    InvalidShard = 4010,
    /// Too many guilds for an unsharded session
    ShardingRequired = 4011,
}

impl CloseCode {
    /// Create a `CloseCode` from a raw u16 value
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            4000 => Some(Self::UnknownError),
            4001 => Some(Self::UnknownOpcode),
            4002 => Some(Self::DecodeError),
            4003 => Some(Self::NotAuthenticated),
            4004 => Some(Self::AuthenticationFailed),
            4005 => Some(Self::AlreadyAuthenticated),
            4006 => Some(Self::InvalidSession),
            4007 => Some(Self::InvalidSequence),
            4008 => Some(Self::RateLimited),
            4009 => Some(Self::SessionTimeout),
            4010 => Some(Self::InvalidShard),
            4011 => Some(Self::ShardingRequired),
            _ => None,
        }
    }

    /// Get the raw u16 value
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Check if the client may reconnect after this close code
    ///
    /// Codes where this is `false` are fatal: the caller must fix the
    /// configuration (token, shard key) and reconnect explicitly.
    #[must_use]
    pub const fn should_reconnect(self) -> bool {
        !matches!(
            self,
            Self::AuthenticationFailed | Self::InvalidShard | Self::ShardingRequired
        )
    }

    /// Check if this close code invalidates the server-side session
    #[must_use]
    pub const fn drops_session(self) -> bool {
        matches!(self, Self::InvalidSession | Self::SessionTimeout)
    }

    /// Check if this close code invalidates the sequence counter
    ///
    /// A dropped session always drops the sequence with it.
    #[must_use]
    pub const fn drops_sequence(self) -> bool {
        matches!(
            self,
            Self::InvalidSession | Self::SessionTimeout | Self::InvalidSequence
        )
    }

    /// Get the description for this close code
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::UnknownError => "Unknown error",
            Self::UnknownOpcode => "Invalid op",
            Self::DecodeError => "Invalid message",
            Self::NotAuthenticated => "Not authenticated",
            Self::AuthenticationFailed => "Authentication failed",
            Self::AlreadyAuthenticated => "Already authenticated",
            Self::InvalidSession => "Invalid session",
            Self::InvalidSequence => "Invalid sequence",
            Self::RateLimited => "Rate limited",
            Self::SessionTimeout => "Invalid session",
            Self::InvalidShard => "Invalid shard key",
            Self::ShardingRequired => "Too many guilds",
        }
    }

    /// Get the name of this close code
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::UnknownError => "UnknownError",
            Self::UnknownOpcode => "UnknownOpcode",
            Self::DecodeError => "DecodeError",
            Self::NotAuthenticated => "NotAuthenticated",
            Self::AuthenticationFailed => "AuthenticationFailed",
            Self::AlreadyAuthenticated => "AlreadyAuthenticated",
            Self::InvalidSession => "InvalidSession",
            Self::InvalidSequence => "InvalidSequence",
            Self::RateLimited => "RateLimited",
            Self::SessionTimeout => "SessionTimeout",
            Self::InvalidShard => "InvalidShard",
            Self::ShardingRequired => "ShardingRequired",
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.as_u16(), self.description())
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}

/// What the client does after a close frame
///
/// Produced by [`CloseAction::classify`] from the numeric close code and
/// reason; consumed by the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseAction {
    /// Whether an automatic reconnect may be armed. `false` is fatal: the
    /// reconnect timer is not armed and the caller must reconnect explicitly.
    pub reconnect: bool,
    /// Forget the session identifier before the next connect
    pub drop_session: bool,
    /// Reset the sequence counter before the next connect
    pub drop_seq: bool,
    /// Human-readable error, absent for a clean close
    pub message: Option<String>,
}

impl CloseAction {
    /// Classify a close frame into the action the client takes
    #[must_use]
    pub fn classify(code: u16, reason: &str, clean: bool) -> Self {
        if code == 1000 && clean {
            return Self {
                reconnect: true,
                drop_session: false,
                drop_seq: false,
                message: None,
            };
        }

        if code == 1006 {
            return Self {
                reconnect: true,
                drop_session: false,
                drop_seq: false,
                message: Some("Connection reset by peer: 1006".to_string()),
            };
        }

        if let Some(known) = CloseCode::from_u16(code) {
            return Self {
                reconnect: known.should_reconnect(),
                drop_session: known.drops_session(),
                drop_seq: known.drops_sequence(),
                message: Some(known.description().to_string()),
            };
        }

        // Unknown non-clean close: keep the session and retry
        let message = if reason.is_empty() {
            format!("Connection closed: {code}")
        } else {
            format!("{code}: {reason}")
        };

        Self {
            reconnect: true,
            drop_session: false,
            drop_seq: false,
            message: Some(message),
        }
    }

    /// Check if this close is fatal (no reconnect timer)
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !self.reconnect
    }
}
