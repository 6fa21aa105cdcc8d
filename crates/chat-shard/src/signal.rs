//! Signals observable by the hosting client
//!
//! Everything the shard reports flows through one channel, so the domain
//! sink sees lifecycle transitions and dispatch events in wire order.

use crate::error::GatewayError;
use chat_proto::{DispatchEvent, GatewayMessage};

/// A signal emitted by the shard task
#[derive(Debug)]
pub enum ShardSignal {
    /// The socket opened and the handshake began
    Connect,
    /// The session disconnected; carries the triggering error, if any
    Disconnect {
        /// What ended the session, absent for a requested clean close
        error: Option<GatewayError>,
    },
    /// HELLO arrived, with the server trace
    Hello {
        /// Gateway nodes handling this connection
        trace: Vec<String>,
    },
    /// The READY packet landed; startup draining begins
    PreReady,
    /// Startup fully drained; the session is live
    Ready,
    /// An existing session was resumed
    Resume,
    /// A recoverable error
    Error(GatewayError),
    /// A protocol anomaly worth surfacing
    Warn(String),
    /// Raw decoded packet (only with the `raw_events` option)
    Raw(GatewayMessage),
    /// A packet with an unknown op or event name
    Unknown(GatewayMessage),
    /// A decoded dispatch event for the domain sink
    Event(DispatchEvent),
}

impl ShardSignal {
    /// Short name for logging
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::Hello { .. } => "hello",
            Self::PreReady => "shardPreReady",
            Self::Ready => "ready",
            Self::Resume => "resume",
            Self::Error(_) => "error",
            Self::Warn(_) => "warn",
            Self::Raw(_) => "rawWS",
            Self::Unknown(_) => "unknown",
            Self::Event(_) => "event",
        }
    }
}
