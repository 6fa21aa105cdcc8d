//! Gateway dispatch events
//!
//! Defines the event names carried in the `t` field of dispatch messages and
//! the decoded envelope handed to the domain sink.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Gateway dispatch event names
///
/// A closed sum of the known event names. Names the client does not know are
/// preserved by the dispatcher as raw packets rather than dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    // Connection events
    /// Sent after successful Identify
    Ready,
    /// Sent after successful Resume
    Resumed,

    // Guild events
    /// Guild available, joined, or created
    GuildCreate,
    /// Guild settings changed
    GuildUpdate,
    /// Left guild, kicked, or guild deleted
    GuildDelete,
    /// Full guild state sync (user accounts)
    GuildSync,

    // Role events
    /// Role created
    GuildRoleCreate,
    /// Role updated
    GuildRoleUpdate,
    /// Role deleted
    GuildRoleDelete,

    // Channel events
    /// Channel created
    ChannelCreate,
    /// Channel updated
    ChannelUpdate,
    /// Channel deleted
    ChannelDelete,

    // Message events
    /// New message
    MessageCreate,
    /// Message edited
    MessageUpdate,
    /// Message deleted
    MessageDelete,

    // Reaction events
    /// Reaction added
    MessageReactionAdd,
    /// Reaction removed
    MessageReactionRemove,

    // Member events
    /// User joined guild
    GuildMemberAdd,
    /// Member updated (roles, nickname)
    GuildMemberUpdate,
    /// User left guild
    GuildMemberRemove,
    /// Offline member chunk in response to a member request
    GuildMembersChunk,

    // Presence events
    /// User status changed
    PresenceUpdate,
    /// Bulk presence replacement
    PresencesReplace,
    /// User started typing
    TypingStart,

    // User events
    /// Current user updated
    UserUpdate,

    // Voice events
    /// Voice state changed
    VoiceStateUpdate,

    // Call events (private channels)
    /// Call started
    CallCreate,
    /// Call updated
    CallUpdate,
    /// Call ended
    CallDelete,
}

impl EventKind {
    /// Get the wire name of the event
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Resumed => "RESUMED",
            Self::GuildCreate => "GUILD_CREATE",
            Self::GuildUpdate => "GUILD_UPDATE",
            Self::GuildDelete => "GUILD_DELETE",
            Self::GuildSync => "GUILD_SYNC",
            Self::GuildRoleCreate => "GUILD_ROLE_CREATE",
            Self::GuildRoleUpdate => "GUILD_ROLE_UPDATE",
            Self::GuildRoleDelete => "GUILD_ROLE_DELETE",
            Self::ChannelCreate => "CHANNEL_CREATE",
            Self::ChannelUpdate => "CHANNEL_UPDATE",
            Self::ChannelDelete => "CHANNEL_DELETE",
            Self::MessageCreate => "MESSAGE_CREATE",
            Self::MessageUpdate => "MESSAGE_UPDATE",
            Self::MessageDelete => "MESSAGE_DELETE",
            Self::MessageReactionAdd => "MESSAGE_REACTION_ADD",
            Self::MessageReactionRemove => "MESSAGE_REACTION_REMOVE",
            Self::GuildMemberAdd => "GUILD_MEMBER_ADD",
            Self::GuildMemberUpdate => "GUILD_MEMBER_UPDATE",
            Self::GuildMemberRemove => "GUILD_MEMBER_REMOVE",
            Self::GuildMembersChunk => "GUILD_MEMBERS_CHUNK",
            Self::PresenceUpdate => "PRESENCE_UPDATE",
            Self::PresencesReplace => "PRESENCES_REPLACE",
            Self::TypingStart => "TYPING_START",
            Self::UserUpdate => "USER_UPDATE",
            Self::VoiceStateUpdate => "VOICE_STATE_UPDATE",
            Self::CallCreate => "CALL_CREATE",
            Self::CallUpdate => "CALL_UPDATE",
            Self::CallDelete => "CALL_DELETE",
        }
    }

    /// Parse an event kind from its wire name
    #[must_use]
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "READY" => Some(Self::Ready),
            "RESUMED" => Some(Self::Resumed),
            "GUILD_CREATE" => Some(Self::GuildCreate),
            "GUILD_UPDATE" => Some(Self::GuildUpdate),
            "GUILD_DELETE" => Some(Self::GuildDelete),
            "GUILD_SYNC" => Some(Self::GuildSync),
            "GUILD_ROLE_CREATE" => Some(Self::GuildRoleCreate),
            "GUILD_ROLE_UPDATE" => Some(Self::GuildRoleUpdate),
            "GUILD_ROLE_DELETE" => Some(Self::GuildRoleDelete),
            "CHANNEL_CREATE" => Some(Self::ChannelCreate),
            "CHANNEL_UPDATE" => Some(Self::ChannelUpdate),
            "CHANNEL_DELETE" => Some(Self::ChannelDelete),
            "MESSAGE_CREATE" => Some(Self::MessageCreate),
            "MESSAGE_UPDATE" => Some(Self::MessageUpdate),
            "MESSAGE_DELETE" => Some(Self::MessageDelete),
            "MESSAGE_REACTION_ADD" => Some(Self::MessageReactionAdd),
            "MESSAGE_REACTION_REMOVE" => Some(Self::MessageReactionRemove),
            "GUILD_MEMBER_ADD" => Some(Self::GuildMemberAdd),
            "GUILD_MEMBER_UPDATE" => Some(Self::GuildMemberUpdate),
            "GUILD_MEMBER_REMOVE" => Some(Self::GuildMemberRemove),
            "GUILD_MEMBERS_CHUNK" => Some(Self::GuildMembersChunk),
            "PRESENCE_UPDATE" => Some(Self::PresenceUpdate),
            "PRESENCES_REPLACE" => Some(Self::PresencesReplace),
            "TYPING_START" => Some(Self::TypingStart),
            "USER_UPDATE" => Some(Self::UserUpdate),
            "VOICE_STATE_UPDATE" => Some(Self::VoiceStateUpdate),
            "CALL_CREATE" => Some(Self::CallCreate),
            "CALL_UPDATE" => Some(Self::CallUpdate),
            "CALL_DELETE" => Some(Self::CallDelete),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<EventKind> for String {
    fn from(event: EventKind) -> Self {
        event.as_str().to_string()
    }
}

/// A decoded dispatch event handed to the domain sink
#[derive(Debug, Clone)]
pub struct DispatchEvent {
    /// Event name
    pub kind: EventKind,

    /// Sequence number the frame carried
    pub seq: u64,

    /// Raw event payload
    pub data: Value,
}

impl DispatchEvent {
    /// Create a dispatch event
    #[must_use]
    pub fn new(kind: EventKind, seq: u64, data: Value) -> Self {
        Self { kind, seq, data }
    }
}

impl fmt::Display for DispatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DispatchEvent({}, s={})", self.kind, self.seq)
    }
}
