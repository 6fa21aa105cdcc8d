//! Gateway payload definitions
//!
//! Defines the payload structures carried in the `d` field of gateway
//! messages, for both directions of the connection.

use serde::{Deserialize, Serialize};

/// Payload for op 10 (Hello)
///
/// Received from the server immediately after the socket opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,

    /// Server trace of the gateway nodes handling this connection
    #[serde(rename = "_trace", default)]
    pub trace: Vec<String>,
}

/// Payload for op 2 (Identify)
///
/// Sent by the client to start a fresh server-side session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Authentication token
    pub token: String,

    /// Gateway protocol version
    pub v: u64,

    /// Whether large payloads may be compressed
    pub compress: bool,

    /// Member count above which a guild is sent without offline members
    pub large_threshold: u32,

    /// Client properties
    pub properties: IdentifyProperties,

    /// `[shard_id, shard_count]` pair, present only when sharding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u32; 2]>,

    /// Initial presence, present only when a status is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<StatusUpdatePayload>,
}

/// Client connection properties
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyProperties {
    /// Operating system
    pub os: String,

    /// Browser or client name
    pub browser: String,

    /// Device type
    pub device: String,
}

impl IdentifyProperties {
    /// Create properties describing this client
    #[must_use]
    pub fn new() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "chat-shard".to_string(),
            device: "chat-shard".to_string(),
        }
    }

    /// Set operating system
    #[must_use]
    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    /// Set browser
    #[must_use]
    pub fn with_browser(mut self, browser: impl Into<String>) -> Self {
        self.browser = browser.into();
        self
    }

    /// Set device type
    #[must_use]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload for op 6 (Resume)
///
/// Sent by the client to reattach to an existing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    /// Authentication token
    pub token: String,

    /// Session ID to resume
    pub session_id: String,

    /// Last received sequence number
    pub seq: u64,
}

/// Self-presence status values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Online and active
    Online,
    /// Away from keyboard
    Idle,
    /// Do not disturb
    Dnd,
    /// Online but shown as offline to others
    Invisible,
    /// Offline
    Offline,
}

impl Status {
    /// Get the wire string for this status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Idle => "idle",
            Self::Dnd => "dnd",
            Self::Invisible => "invisible",
            Self::Offline => "offline",
        }
    }

    /// Parse a status from its wire string
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "online" => Some(Self::Online),
            "idle" => Some(Self::Idle),
            "dnd" => Some(Self::Dnd),
            "invisible" => Some(Self::Invisible),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An activity shown under the self presence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Activity name
    pub name: String,

    /// Activity kind: 0 = playing, 1 = streaming, 2 = listening
    #[serde(rename = "type", default)]
    pub kind: u8,

    /// Stream URL, only meaningful for kind 1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Activity {
    /// Create a "playing" activity
    #[must_use]
    pub fn playing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: 0,
            url: None,
        }
    }

    /// Create a "streaming" activity with a stream URL
    #[must_use]
    pub fn streaming(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: 1,
            url: Some(url.into()),
        }
    }

    /// Create a "listening" activity
    #[must_use]
    pub fn listening(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: 2,
            url: None,
        }
    }
}

/// Payload for op 3 (Status Update)
///
/// Sent by the client to update the self presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdatePayload {
    /// New status
    pub status: Status,

    /// Whether the client is away from keyboard
    #[serde(default)]
    pub afk: bool,

    /// Current activity, or null to clear
    pub game: Option<Activity>,
}

/// Payload for op 8 (Request Guild Members)
///
/// Requests offline member chunks for the listed guilds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMembersPayload {
    /// Guild IDs to fetch members for
    pub guild_id: Vec<String>,

    /// Username prefix filter, empty for all members
    pub query: String,

    /// Maximum members to return, 0 for no limit
    pub limit: u32,
}

impl RequestMembersPayload {
    /// Request every member of the listed guilds
    #[must_use]
    pub fn all_members(guild_id: Vec<String>) -> Self {
        Self {
            guild_id,
            query: String::new(),
            limit: 0,
        }
    }
}

/// View over the READY dispatch payload
///
/// Only the fields the session core consumes; everything else in the READY
/// snapshot flows through to the domain sink untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyData {
    /// Gateway protocol version
    #[serde(default)]
    pub v: u64,

    /// Server-assigned session identifier
    pub session_id: String,

    /// Server trace
    #[serde(rename = "_trace", default)]
    pub trace: Vec<String>,

    /// The authenticated user
    #[serde(default)]
    pub user: ReadyUser,

    /// Guild stubs in the initial snapshot
    #[serde(default)]
    pub guilds: Vec<GuildStub>,
}

/// The authenticated user inside the READY payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadyUser {
    /// User ID
    #[serde(default)]
    pub id: String,

    /// Whether this account is a bot
    #[serde(default)]
    pub bot: bool,
}

/// A guild stub inside the READY payload
#[derive(Debug, Clone, Deserialize)]
pub struct GuildStub {
    /// Guild ID
    pub id: String,

    /// Whether the guild data has not been sent yet
    #[serde(default)]
    pub unavailable: bool,

    /// Whether the guild is above the large threshold
    #[serde(default)]
    pub large: bool,

    /// Member count, when the server includes it
    #[serde(default)]
    pub member_count: Option<u64>,
}

/// View over the GUILD_MEMBERS_CHUNK dispatch payload
#[derive(Debug, Clone, Deserialize)]
pub struct MemberChunkData {
    /// Guild the chunk belongs to
    pub guild_id: String,

    /// Index of this chunk, when the server paginates
    #[serde(default)]
    pub chunk_index: Option<u32>,

    /// Total chunk count, when the server paginates
    #[serde(default)]
    pub chunk_count: Option<u32>,
}
