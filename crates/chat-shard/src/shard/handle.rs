//! Public shard API
//!
//! All mutation happens on the shard task; the handle only enqueues commands
//! over a channel and reads the status watch.

use super::ShardStatus;
use crate::error::{GatewayError, GatewayResult};
use chat_proto::{Activity, Status};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

/// Commands from the public API to the shard task
#[derive(Debug)]
pub(crate) enum ShardCommand {
    /// Open the gateway connection
    Connect,
    /// Close the gateway connection
    Disconnect {
        /// Arm the reconnect timer afterwards (subject to `autoreconnect`)
        reconnect: bool,
    },
    /// Update the self status and activity
    EditStatus {
        status: Status,
        game: Option<Activity>,
    },
    /// Update the AFK flag
    EditAfk { afk: bool },
    /// Fetch offline members for the listed guilds
    RequestGuildMembers { guild_ids: Vec<String> },
    /// Request a state sync for the listed guilds
    SyncGuilds { guild_ids: Vec<String> },
    /// Read the measured heartbeat latency
    Latency {
        reply: oneshot::Sender<Option<Duration>>,
    },
}

/// Cloneable driver for a running shard task
#[derive(Debug, Clone)]
pub struct ShardHandle {
    commands: mpsc::UnboundedSender<ShardCommand>,
    status: watch::Receiver<ShardStatus>,
}

impl ShardHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<ShardCommand>,
        status: watch::Receiver<ShardStatus>,
    ) -> Self {
        Self { commands, status }
    }

    fn send(&self, command: ShardCommand) -> GatewayResult<()> {
        self.commands
            .send(command)
            .map_err(|_| GatewayError::Usage("Shard task has stopped".to_string()))
    }

    /// Open the gateway connection
    pub fn connect(&self) -> GatewayResult<()> {
        self.send(ShardCommand::Connect)
    }

    /// Close the gateway connection
    ///
    /// With `reconnect` the session resumes after the backoff interval,
    /// subject to the `autoreconnect` option; without it the session is
    /// hard-reset and stays down until [`connect`] is called again.
    ///
    /// [`connect`]: ShardHandle::connect
    pub fn disconnect(&self, reconnect: bool) -> GatewayResult<()> {
        self.send(ShardCommand::Disconnect { reconnect })
    }

    /// Update the self status and activity
    pub fn edit_status(&self, status: Status, game: Option<Activity>) -> GatewayResult<()> {
        self.send(ShardCommand::EditStatus { status, game })
    }

    /// Update the AFK flag
    pub fn edit_afk(&self, afk: bool) -> GatewayResult<()> {
        self.send(ShardCommand::EditAfk { afk })
    }

    /// Fetch offline members for the listed guilds
    pub fn request_guild_members(&self, guild_ids: Vec<String>) -> GatewayResult<()> {
        self.send(ShardCommand::RequestGuildMembers { guild_ids })
    }

    /// Request a state sync for the listed guilds
    pub fn sync_guilds(&self, guild_ids: Vec<String>) -> GatewayResult<()> {
        self.send(ShardCommand::SyncGuilds { guild_ids })
    }

    /// Measured heartbeat latency, when a round trip has been observed
    pub async fn latency(&self) -> GatewayResult<Option<Duration>> {
        let (reply, rx) = oneshot::channel();
        self.send(ShardCommand::Latency { reply })?;
        rx.await
            .map_err(|_| GatewayError::Usage("Shard task has stopped".to_string()))
    }

    /// Current connection status
    #[must_use]
    pub fn status(&self) -> ShardStatus {
        *self.status.borrow()
    }

    /// Watch channel for status transitions
    #[must_use]
    pub fn status_watch(&self) -> watch::Receiver<ShardStatus> {
        self.status.clone()
    }
}
