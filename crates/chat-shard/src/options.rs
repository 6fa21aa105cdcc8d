//! Shard configuration
//!
//! Loads from serde-deserializable config the way the rest of the stack does,
//! with builder methods for programmatic construction.

use crate::presence::Presence;
use chat_proto::Encoding;
use serde::Deserialize;
use std::collections::HashSet;

/// Configuration recognized by the shard core
#[derive(Debug, Clone, Deserialize)]
pub struct ShardOptions {
    /// Authentication token
    pub token: String,

    /// Gateway WebSocket URL, without query parameters
    pub gateway_url: String,

    /// This shard's index
    #[serde(default)]
    pub shard_id: u32,

    /// Total shard count
    #[serde(default = "default_max_shards")]
    pub max_shards: u32,

    /// Re-arm the reconnect timer after recoverable disconnects
    #[serde(default = "default_true")]
    pub autoreconnect: bool,

    /// Negotiate transport compression (zlib stream with flush sentinel)
    #[serde(default)]
    pub compress: bool,

    /// Use the synchronous inflate strategy instead of the streaming one
    #[serde(default)]
    pub sync_inflate: bool,

    /// Payload codec for the session
    #[serde(default)]
    pub encoding: Encoding,

    /// Member count above which guilds are sent without offline members
    #[serde(default = "default_large_threshold")]
    pub large_threshold: u32,

    /// Dispatch event names the host opts out of
    #[serde(default)]
    pub disable_events: HashSet<String>,

    /// Milliseconds allowed for a connection attempt to reach the handshake
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Milliseconds of guild-create silence before ready is forced
    #[serde(default = "default_guild_create_timeout_ms")]
    pub guild_create_timeout_ms: u64,

    /// Fetch offline members for large guilds after ready
    #[serde(default)]
    pub get_all_users: bool,

    /// Rejoin voice channels after a resume (voice transport is external;
    /// the flag is surfaced to the host)
    #[serde(default)]
    pub seed_voice_connections: bool,

    /// Emit a raw signal for every decoded inbound packet
    #[serde(default)]
    pub raw_events: bool,

    /// Default self-presence template
    #[serde(default)]
    pub presence: Presence,

    /// Transport tuning
    #[serde(default)]
    pub ws: TransportOptions,
}

/// Transport-level tuning handed to the connector
#[derive(Debug, Clone, Deserialize)]
pub struct TransportOptions {
    /// Milliseconds allowed for the WebSocket handshake itself
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Maximum inbound message size in bytes
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: default_handshake_timeout_ms(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl ShardOptions {
    /// Create options with defaults for everything but the token and URL
    #[must_use]
    pub fn new(token: impl Into<String>, gateway_url: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            gateway_url: gateway_url.into(),
            shard_id: 0,
            max_shards: default_max_shards(),
            autoreconnect: true,
            compress: false,
            sync_inflate: false,
            encoding: Encoding::default(),
            large_threshold: default_large_threshold(),
            disable_events: HashSet::new(),
            connection_timeout_ms: default_connection_timeout_ms(),
            guild_create_timeout_ms: default_guild_create_timeout_ms(),
            get_all_users: false,
            seed_voice_connections: false,
            raw_events: false,
            presence: Presence::default(),
            ws: TransportOptions::default(),
        }
    }

    /// Set the shard key
    #[must_use]
    pub fn with_shard(mut self, shard_id: u32, max_shards: u32) -> Self {
        self.shard_id = shard_id;
        self.max_shards = max_shards.max(1);
        self
    }

    /// Enable transport compression
    #[must_use]
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Select the payload codec
    #[must_use]
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set the default presence template
    #[must_use]
    pub fn with_presence(mut self, presence: Presence) -> Self {
        self.presence = presence;
        self
    }

    /// Opt out of a dispatch event by wire name
    #[must_use]
    pub fn disable_event(mut self, name: impl Into<String>) -> Self {
        self.disable_events.insert(name.into());
        self
    }

    /// Build the full gateway URL with version, encoding, and compression
    /// query parameters
    #[must_use]
    pub fn connect_url(&self) -> String {
        let mut url = format!(
            "{}?v={}&encoding={}",
            self.gateway_url,
            chat_proto::GATEWAY_VERSION,
            self.encoding.wire_name()
        );
        if self.compress {
            url.push_str("&compress=zlib-stream");
        }
        url
    }
}

fn default_true() -> bool {
    true
}

fn default_max_shards() -> u32 {
    1
}

fn default_large_threshold() -> u32 {
    250
}

fn default_connection_timeout_ms() -> u64 {
    30_000
}

fn default_guild_create_timeout_ms() -> u64 {
    2_000
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_max_message_bytes() -> usize {
    16 << 20
}
