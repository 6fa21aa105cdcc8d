//! # chat-shard
//!
//! Single-shard gateway client for the chat/presence service: a long-lived,
//! resumable, compressed, heartbeat-driven WebSocket session, plus the state
//! machine that drives connect, identify/resume, live traffic, and
//! disconnect/reconnect transitions.
//!
//! The shard runs as one task. The host drives it through a [`ShardHandle`]
//! and consumes lifecycle signals and dispatch events, in wire order, from
//! the signal stream returned at construction.
//!
//! ```no_run
//! use chat_shard::{Shard, ShardOptions, ShardSignal, WsConnector};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let options = ShardOptions::new("token", "wss://gateway.example").with_compression(true);
//! let (shard, handle, mut signals) = Shard::new(options, Arc::new(WsConnector::new()));
//!
//! tokio::spawn(shard.run());
//! handle.connect().unwrap();
//!
//! while let Some(signal) = signals.recv().await {
//!     if let ShardSignal::Event(event) = signal {
//!         println!("{event}");
//!     }
//! }
//! # }
//! ```

pub mod backoff;
pub mod batcher;
pub mod bucket;
pub mod compression;
pub mod coordinator;
pub mod error;
pub mod heartbeat;
pub mod options;
pub mod presence;
pub mod ready;
pub mod shard;
pub mod signal;
pub mod transport;

pub use coordinator::{NoopCoordinator, ShardCoordinator};
pub use error::{GatewayError, GatewayResult};
pub use options::{ShardOptions, TransportOptions};
pub use presence::Presence;
pub use shard::{Shard, ShardHandle, ShardStatus};
pub use signal::ShardSignal;
pub use transport::{Connector, ReadyState, Socket, TransportError, WsConnector, WsEvent, WsMessage};
