//! Transport capability
//!
//! The shard consumes its WebSocket through this seam rather than a concrete
//! type, so the connector is injected at construction and tests drive the
//! session with a scripted socket. The default implementation rides on
//! tokio-tungstenite.

use crate::options::TransportOptions;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message, WebSocketConfig};

/// Transport-level failure
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Lifecycle state of a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Handshake in progress
    Connecting,
    /// Open for traffic
    Open,
    /// Close initiated, not yet confirmed
    Closing,
    /// Closed
    Closed,
}

/// A WebSocket data message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    /// UTF-8 text frame
    Text(String),
    /// Binary frame
    Binary(Bytes),
}

/// An event surfaced by the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsEvent {
    /// A data frame arrived
    Message(WsMessage),
    /// The peer closed the connection
    Close {
        /// Close code from the close frame, or 1006 when absent
        code: u16,
        /// Close reason text
        reason: String,
        /// Whether a close frame was actually received
        clean: bool,
    },
    /// The transport failed
    Error(String),
}

/// Opens sockets; injected into the shard at construction
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a socket to `url`; returning means the handshake completed
    async fn open(
        &self,
        url: &str,
        options: &TransportOptions,
    ) -> Result<Box<dyn Socket>, TransportError>;
}

/// One open WebSocket connection
#[async_trait]
pub trait Socket: Send {
    /// Wait for the next socket event; `None` means the stream ended without
    /// a close frame
    async fn next_event(&mut self) -> Option<WsEvent>;

    /// Send a data frame
    async fn send(&mut self, message: WsMessage) -> Result<(), TransportError>;

    /// Initiate a clean close with the given code
    async fn close(&mut self, code: u16) -> Result<(), TransportError>;

    /// Drop the connection without a close handshake
    fn terminate(&mut self);

    /// Current lifecycle state
    fn ready_state(&self) -> ReadyState;
}

/// Default connector over tokio-tungstenite
#[derive(Debug, Default)]
pub struct WsConnector;

impl WsConnector {
    /// Create the default connector
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(
        &self,
        url: &str,
        options: &TransportOptions,
    ) -> Result<Box<dyn Socket>, TransportError> {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(options.max_message_bytes);
        config.max_frame_size = Some(options.max_message_bytes);

        let handshake = tokio_tungstenite::connect_async_with_config(url, Some(config), false);
        let timeout = Duration::from_millis(options.handshake_timeout_ms);

        let (stream, _response) = tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| TransportError("WebSocket handshake timed out".to_string()))?
            .map_err(|e| TransportError(e.to_string()))?;

        Ok(Box::new(TungsteniteSocket {
            inner: stream,
            state: ReadyState::Open,
        }))
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TungsteniteSocket {
    inner: WsStream,
    state: ReadyState,
}

#[async_trait]
impl Socket for TungsteniteSocket {
    async fn next_event(&mut self) -> Option<WsEvent> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some(WsEvent::Message(WsMessage::Text(text)));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Some(WsEvent::Message(WsMessage::Binary(Bytes::from(data))));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                    // Control frames are answered by tungstenite itself
                    continue;
                }
                Some(Ok(Message::Close(frame))) => {
                    self.state = ReadyState::Closed;
                    let (code, reason) = match frame {
                        Some(f) => (u16::from(f.code), f.reason.to_string()),
                        None => (1006, String::new()),
                    };
                    return Some(WsEvent::Close {
                        code,
                        reason,
                        clean: true,
                    });
                }
                Some(Err(e)) => {
                    self.state = ReadyState::Closed;
                    return Some(WsEvent::Error(e.to_string()));
                }
                None => {
                    self.state = ReadyState::Closed;
                    return None;
                }
            }
        }
    }

    async fn send(&mut self, message: WsMessage) -> Result<(), TransportError> {
        let frame = match message {
            WsMessage::Text(text) => Message::Text(text),
            WsMessage::Binary(data) => Message::Binary(data.to_vec()),
        };

        self.inner
            .send(frame)
            .await
            .map_err(|e| TransportError(e.to_string()))
    }

    async fn close(&mut self, code: u16) -> Result<(), TransportError> {
        self.state = ReadyState::Closing;
        self.inner
            .close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: "".into(),
            }))
            .await
            .map_err(|e| TransportError(e.to_string()))
    }

    fn terminate(&mut self) {
        // Dropping the stream tears the TCP connection down without a close
        // handshake; the owner discards the box right after this call.
        self.state = ReadyState::Closed;
    }

    fn ready_state(&self) -> ReadyState {
        self.state
    }
}
