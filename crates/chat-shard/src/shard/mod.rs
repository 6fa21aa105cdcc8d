//! The shard session
//!
//! One task owns the socket, every timer, and all session state. The run
//! loop merges three event sources (public API commands, socket events, and
//! the earliest armed deadline) so every state transition happens inline on
//! one logical task and no locking is needed.

mod dispatch;
mod handle;

pub use handle::ShardHandle;

use crate::backoff::ReconnectPolicy;
use crate::batcher::{Batcher, REQUEST_MEMBERS_BUDGET, SYNC_GUILD_BUDGET};
use crate::bucket::Bucket;
use crate::compression::{FrameCodec, InflateStrategy};
use crate::coordinator::{NoopCoordinator, ShardCoordinator};
use crate::error::GatewayError;
use crate::heartbeat::{Heartbeat, TickOutcome};
use crate::options::ShardOptions;
use crate::presence::Presence;
use crate::ready::ReadyTracker;
use crate::signal::ShardSignal;
use crate::transport::{Connector, ReadyState, Socket, WsEvent, WsMessage};
use bytes::Bytes;
use chat_proto::{CloseAction, EncodedFrame, GatewayMessage, OpCode, RequestMembersPayload};
use handle::ShardCommand;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Global outbound budget: 120 frames per minute
const GLOBAL_BUCKET_CAPACITY: u32 = 120;

/// Presence outbound budget: 5 status updates per minute
const PRESENCE_BUCKET_CAPACITY: u32 = 5;

/// Rate-limit window shared by both buckets
const BUCKET_WINDOW: Duration = Duration::from_secs(60);

/// Stand-in deadline when no timer is armed
const FAR_FUTURE: Duration = Duration::from_secs(365 * 24 * 3600);

/// Connection status of a shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardStatus {
    /// No socket and no pending handshake
    Disconnected,
    /// Connection attempt or reconnect timer in flight
    Connecting,
    /// Socket open, identify pending
    Handshaking,
    /// Socket open, resume pending
    Resuming,
    /// Session established
    Ready,
}

impl std::fmt::Display for ShardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Resuming => "resuming",
            Self::Ready => "ready",
        };
        write!(f, "{name}")
    }
}

/// Whether a disconnect may arm the reconnect timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconnectIntent {
    /// Stay down until the caller reconnects explicitly
    No,
    /// Arm the reconnect timer, subject to the `autoreconnect` option
    Auto,
}

/// An encoded frame waiting in a bucket
#[derive(Debug)]
struct OutboundFrame {
    op: OpCode,
    frame: EncodedFrame,
}

/// A single gateway session and its state machine
pub struct Shard {
    options: ShardOptions,
    connector: Arc<dyn Connector>,
    coordinator: Arc<dyn ShardCoordinator>,
    signals: mpsc::UnboundedSender<ShardSignal>,
    commands: mpsc::UnboundedReceiver<ShardCommand>,
    status_tx: watch::Sender<ShardStatus>,
    status: ShardStatus,

    session_id: Option<String>,
    seq: u64,
    trace: Vec<String>,
    pre_ready: bool,
    presence: Presence,
    policy: ReconnectPolicy,

    socket: Option<Box<dyn Socket>>,
    codec: Option<FrameCodec>,
    heartbeat: Heartbeat,
    global_bucket: Bucket<OutboundFrame>,
    presence_bucket: Bucket<OutboundFrame>,
    sync_backlog: Batcher,
    member_backlog: Batcher,
    ready_tracker: ReadyTracker,

    connect_deadline: Option<Instant>,
    guild_create_deadline: Option<Instant>,
    reconnect_at: Option<Instant>,
}

impl Shard {
    /// Create a standalone shard
    ///
    /// Returns the shard task (drive it with [`run`]), the command handle,
    /// and the signal stream the host consumes.
    ///
    /// [`run`]: Shard::run
    pub fn new(
        options: ShardOptions,
        connector: Arc<dyn Connector>,
    ) -> (Self, ShardHandle, mpsc::UnboundedReceiver<ShardSignal>) {
        Self::with_coordinator(options, connector, Arc::new(NoopCoordinator))
    }

    /// Create a shard owned by a multi-shard manager
    pub fn with_coordinator(
        options: ShardOptions,
        connector: Arc<dyn Connector>,
        coordinator: Arc<dyn ShardCoordinator>,
    ) -> (Self, ShardHandle, mpsc::UnboundedReceiver<ShardSignal>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ShardStatus::Disconnected);
        let now = Instant::now();

        let presence = options.presence.clone();
        let shard = Self {
            options,
            connector,
            coordinator,
            signals: signal_tx,
            commands: command_rx,
            status_tx,
            status: ShardStatus::Disconnected,
            session_id: None,
            seq: 0,
            trace: Vec::new(),
            pre_ready: false,
            presence,
            policy: ReconnectPolicy::new(),
            socket: None,
            codec: None,
            heartbeat: Heartbeat::new(),
            global_bucket: Bucket::new(GLOBAL_BUCKET_CAPACITY, BUCKET_WINDOW, now),
            presence_bucket: Bucket::new(PRESENCE_BUCKET_CAPACITY, BUCKET_WINDOW, now),
            sync_backlog: Batcher::new(SYNC_GUILD_BUDGET),
            member_backlog: Batcher::new(REQUEST_MEMBERS_BUDGET),
            ready_tracker: ReadyTracker::new(),
            connect_deadline: None,
            guild_create_deadline: None,
            reconnect_at: None,
        };

        let handle = ShardHandle::new(command_tx, status_rx);
        (shard, handle, signal_rx)
    }

    /// Drive the session until every handle is dropped
    pub async fn run(mut self) {
        loop {
            let deadline = self
                .next_deadline()
                .unwrap_or_else(|| Instant::now() + FAR_FUTURE);

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        tracing::debug!(shard_id = self.options.shard_id, "All handles dropped, shutting down");
                        self.disconnect(ReconnectIntent::No, None).await;
                        return;
                    }
                },
                event = poll_socket(&mut self.socket), if self.socket.is_some() => {
                    self.handle_socket_event(event).await;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    self.on_deadline().await;
                }
            }
        }
    }

    // === Command handling ===

    async fn handle_command(&mut self, command: ShardCommand) {
        match command {
            ShardCommand::Connect => self.connect().await,
            ShardCommand::Disconnect { reconnect } => {
                let intent = if reconnect {
                    ReconnectIntent::Auto
                } else {
                    ReconnectIntent::No
                };
                self.disconnect(intent, None).await;
            }
            ShardCommand::EditStatus { status, game } => {
                self.presence.set_status(status, game);
                self.send_status_update().await;
            }
            ShardCommand::EditAfk { afk } => {
                self.presence.afk = afk;
                self.send_status_update().await;
            }
            ShardCommand::RequestGuildMembers { guild_ids } => {
                for guild_id in guild_ids {
                    self.queue_member_request(guild_id).await;
                }
            }
            ShardCommand::SyncGuilds { guild_ids } => {
                for guild_id in guild_ids {
                    self.queue_guild_sync(guild_id).await;
                }
            }
            ShardCommand::Latency { reply } => {
                let _ = reply.send(self.heartbeat.latency());
            }
        }
    }

    // === Lifecycle ===

    async fn connect(&mut self) {
        if self.socket.is_some() {
            let err = GatewayError::Usage("Existing connection detected".to_string());
            tracing::error!(shard_id = self.options.shard_id, "connect() while a socket exists");
            self.emit(ShardSignal::Error(err));
            return;
        }
        if self.options.token.is_empty() {
            let err = GatewayError::Usage("Token not specified".to_string());
            self.emit(ShardSignal::Error(err));
            return;
        }

        self.policy.record_attempt();
        self.reconnect_at = None;
        self.set_status(ShardStatus::Connecting);
        self.connect_deadline =
            Some(Instant::now() + Duration::from_millis(self.options.connection_timeout_ms));

        let url = self.options.connect_url();
        tracing::debug!(
            shard_id = self.options.shard_id,
            attempt = self.policy.attempts(),
            "Opening gateway connection"
        );

        match self.connector.open(&url, &self.options.ws).await {
            Ok(socket) => {
                self.socket = Some(socket);
                let strategy = if self.options.sync_inflate {
                    InflateStrategy::Sync
                } else {
                    InflateStrategy::Stream
                };
                self.codec = Some(FrameCodec::new(
                    self.options.compress,
                    strategy,
                    self.options.encoding,
                ));
                self.set_status(ShardStatus::Handshaking);
                self.emit(ShardSignal::Connect);
            }
            Err(e) => {
                self.connect_deadline = None;
                let err = GatewayError::Transport(e.to_string());
                tracing::warn!(shard_id = self.options.shard_id, error = %err, "Connection attempt failed");
                self.emit(ShardSignal::Error(err));

                if self.options.autoreconnect {
                    self.arm_reconnect();
                } else {
                    self.set_status(ShardStatus::Disconnected);
                    self.hard_reset();
                }
            }
        }
    }

    /// The single cancellation primitive
    ///
    /// Clears the heartbeat timer, drops every queued frame silently, tears
    /// the socket down (terminating when a resume is intended, closing
    /// cleanly otherwise), emits `disconnect` once, and arms the reconnect
    /// timer when requested.
    async fn disconnect(&mut self, intent: ReconnectIntent, error: Option<GatewayError>) {
        self.heartbeat.disarm();
        self.connect_deadline = None;
        self.guild_create_deadline = None;
        self.reconnect_at = None;
        self.global_bucket.clear();
        self.presence_bucket.clear();
        self.codec = None;

        let had_socket = self.socket.is_some();
        if let Some(mut socket) = self.socket.take() {
            let resume_intended =
                matches!(intent, ReconnectIntent::Auto) && self.session_id.is_some();
            if resume_intended || socket.ready_state() != ReadyState::Open {
                socket.terminate();
            } else if let Err(e) = socket.close(1000).await {
                tracing::debug!(error = %e, "Close handshake failed");
            }
        }

        if had_socket {
            tracing::info!(
                shard_id = self.options.shard_id,
                error = error.as_ref().map(tracing::field::display),
                "Disconnected"
            );
            self.emit(ShardSignal::Disconnect { error });
        }

        let reconnecting = matches!(intent, ReconnectIntent::Auto) && self.options.autoreconnect;
        if reconnecting {
            self.arm_reconnect();
        } else {
            self.set_status(ShardStatus::Disconnected);
            self.hard_reset();
        }
    }

    /// Arm the reconnect timer at the current backoff interval and grow it
    /// for the next failure
    fn arm_reconnect(&mut self) {
        let interval = self.policy.interval();
        tracing::info!(
            shard_id = self.options.shard_id,
            interval_ms = interval.as_millis() as u64,
            "Reconnect timer armed"
        );
        self.reconnect_at = Some(Instant::now() + interval);
        self.policy.record_failure();
        self.set_status(ShardStatus::Connecting);
        self.coordinator.request_connect(self.options.shard_id);
    }

    /// Forget everything tied to the session identity
    fn hard_reset(&mut self) {
        self.seq = 0;
        self.session_id = None;
        self.trace.clear();
        self.pre_ready = false;
        self.policy.reset();
        self.reconnect_at = None;
        self.presence = self.options.presence.clone();
        self.sync_backlog.drain();
        self.member_backlog.drain();
        self.ready_tracker.reset();
    }

    // === Socket events ===

    async fn handle_socket_event(&mut self, event: Option<WsEvent>) {
        match event {
            Some(WsEvent::Message(WsMessage::Text(text))) => {
                let decoded = match self.codec.as_ref() {
                    Some(codec) => codec.decode_text(&text),
                    None => return,
                };
                match decoded {
                    Ok(message) => self.handle_frame(message).await,
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropping undecodable text frame");
                    }
                }
            }
            Some(WsEvent::Message(WsMessage::Binary(bytes))) => {
                let decoded = match self.codec.as_mut() {
                    Some(codec) => codec.decode_binary(&bytes),
                    None => return,
                };
                match decoded {
                    Ok(Some(message)) => self.handle_frame(message).await,
                    Ok(None) => {} // mid-payload fragment, keep buffering
                    Err(err @ GatewayError::Decompress(_)) => {
                        self.emit(ShardSignal::Error(err.clone()));
                        self.disconnect(ReconnectIntent::Auto, Some(err)).await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropping undecodable binary frame");
                    }
                }
            }
            Some(WsEvent::Close {
                code,
                reason,
                clean,
            }) => {
                self.on_close(code, &reason, clean).await;
            }
            Some(WsEvent::Error(e)) => {
                let err = GatewayError::Transport(e);
                self.emit(ShardSignal::Error(err.clone()));
                self.disconnect(ReconnectIntent::Auto, Some(err)).await;
            }
            None => {
                // Stream ended without a close frame
                self.on_close(1006, "", false).await;
            }
        }
    }

    async fn on_close(&mut self, code: u16, reason: &str, clean: bool) {
        let action = CloseAction::classify(code, reason, clean);
        tracing::info!(
            shard_id = self.options.shard_id,
            code,
            reason,
            fatal = action.is_fatal(),
            "Socket closed"
        );

        if action.drop_session {
            self.session_id = None;
            self.seq = 0;
        } else if action.drop_seq {
            self.seq = 0;
        }

        let error = action.message.clone().map(|message| GatewayError::Closed {
            code,
            message,
            fatal: action.is_fatal(),
        });

        if action.is_fatal() {
            if let Some(err) = &error {
                self.emit(ShardSignal::Error(err.clone()));
            }
            self.disconnect(ReconnectIntent::No, error).await;
        } else {
            self.disconnect(ReconnectIntent::Auto, error).await;
        }
    }

    // === Deadlines ===

    fn next_deadline(&self) -> Option<Instant> {
        [
            self.reconnect_at,
            self.connect_deadline,
            self.heartbeat.next_tick(),
            self.guild_create_deadline,
            self.global_bucket.next_wake(),
            self.presence_bucket.next_wake(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    async fn on_deadline(&mut self) {
        let now = Instant::now();

        if self.reconnect_at.is_some_and(|t| now >= t) {
            self.reconnect_at = None;
            if self.socket.is_none() {
                tracing::debug!(shard_id = self.options.shard_id, "Reconnect timer fired");
                self.connect().await;
            }
        }

        if self.connect_deadline.is_some_and(|t| now >= t) {
            self.connect_deadline = None;
            if self.status != ShardStatus::Ready {
                let err = GatewayError::ConnectTimeout;
                self.emit(ShardSignal::Error(err.clone()));
                self.disconnect(ReconnectIntent::Auto, Some(err)).await;
            }
        }

        if self.heartbeat.next_tick().is_some_and(|t| now >= t) {
            match self.heartbeat.on_tick(now) {
                TickOutcome::Send => self.send_heartbeat().await,
                TickOutcome::MissedAck => {
                    let err = GatewayError::MissedHeartbeat;
                    tracing::warn!(shard_id = self.options.shard_id, "Heartbeat ack missed");
                    self.disconnect(ReconnectIntent::Auto, Some(err)).await;
                }
            }
        }

        if self.guild_create_deadline.is_some_and(|t| now >= t) {
            self.guild_create_deadline = None;
            self.check_ready(true).await;
        }

        self.drain_buckets(now).await;
    }

    // === Outbound path ===

    fn socket_open(&self) -> bool {
        self.socket
            .as_ref()
            .is_some_and(|s| s.ready_state() == ReadyState::Open)
    }

    /// Encode and send a frame through the rate limiters
    ///
    /// STATUS_UPDATE passes the presence bucket first and the global bucket
    /// second, so it is limited by the stricter of the two. The priority
    /// lane is reserved for HEARTBEAT, IDENTIFY, and RESUME; it observes the
    /// global bucket like everything else.
    async fn send_ws(&mut self, message: GatewayMessage, priority: bool) {
        if !self.socket_open() {
            tracing::debug!(op = %message.op, "Dropping frame, socket not open");
            return;
        }

        let op = message.op;
        let frame = match self.options.encoding.encode(&message) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(op = %op, error = %e, "Failed to encode frame");
                return;
            }
        };

        let out = OutboundFrame { op, frame };
        let now = Instant::now();

        if op == OpCode::StatusUpdate {
            if let Some(admitted) = self.presence_bucket.submit(out, now) {
                self.submit_global(admitted, now).await;
            }
        } else if priority {
            if let Some(admitted) = self.global_bucket.submit_priority(out, now) {
                self.write_frame(admitted).await;
            }
        } else if let Some(admitted) = self.global_bucket.submit(out, now) {
            self.write_frame(admitted).await;
        }
    }

    async fn submit_global(&mut self, frame: OutboundFrame, now: Instant) {
        if let Some(admitted) = self.global_bucket.submit(frame, now) {
            self.write_frame(admitted).await;
        }
    }

    async fn write_frame(&mut self, out: OutboundFrame) {
        let Some(socket) = self.socket.as_mut() else {
            return;
        };

        let message = match out.frame {
            EncodedFrame::Text(text) => WsMessage::Text(text),
            EncodedFrame::Binary(bytes) => WsMessage::Binary(Bytes::from(bytes)),
        };

        tracing::trace!(op = %out.op, "Sending frame");
        if let Err(e) = socket.send(message).await {
            tracing::warn!(op = %out.op, error = %e, "Failed to send frame");
        }
    }

    async fn drain_buckets(&mut self, now: Instant) {
        for frame in self.presence_bucket.drain(now) {
            self.submit_global(frame, now).await;
        }
        for frame in self.global_bucket.drain(now) {
            self.write_frame(frame).await;
        }
    }

    async fn send_heartbeat(&mut self) {
        self.send_ws(GatewayMessage::heartbeat(self.seq), true).await;
    }

    async fn send_status_update(&mut self) {
        if let Some(payload) = self.presence.to_payload() {
            self.send_ws(GatewayMessage::status_update(&payload), false)
                .await;
        }
    }

    // === Backlog batching ===

    /// Whether the session is fully live (past the ready gate)
    fn is_live(&self) -> bool {
        self.status == ShardStatus::Ready && !self.pre_ready
    }

    async fn queue_guild_sync(&mut self, guild_id: String) {
        if let Some(batch) = self.sync_backlog.enqueue(guild_id, self.is_live()) {
            self.send_guild_sync(batch).await;
        }
    }

    async fn queue_member_request(&mut self, guild_id: String) {
        if let Some(batch) = self.member_backlog.enqueue(guild_id, self.is_live()) {
            self.send_member_request(batch).await;
        }
    }

    async fn send_guild_sync(&mut self, guild_ids: Vec<String>) {
        if guild_ids.is_empty() {
            return;
        }
        self.send_ws(GatewayMessage::sync_guilds(&guild_ids), false)
            .await;
    }

    async fn send_member_request(&mut self, guild_ids: Vec<String>) {
        if guild_ids.is_empty() {
            return;
        }
        let payload = RequestMembersPayload::all_members(guild_ids);
        self.send_ws(GatewayMessage::request_guild_members(&payload), false)
            .await;
    }

    /// Flush the backlogs and emit `ready` once everything has drained
    async fn check_ready(&mut self, force: bool) {
        if !self.sync_backlog.is_empty() {
            let batch = self.sync_backlog.drain();
            self.send_guild_sync(batch).await;
        }
        if !self.member_backlog.is_empty() {
            let batch = self.member_backlog.drain();
            self.send_member_request(batch).await;
        }

        let fired = if force {
            self.ready_tracker.force_emit()
        } else {
            self.ready_tracker.try_emit(true)
        };

        if fired {
            self.pre_ready = false;
            self.guild_create_deadline = None;
            tracing::info!(shard_id = self.options.shard_id, "Shard ready");
            self.emit(ShardSignal::Ready);
        }
    }

    // === Plumbing ===

    fn emit(&self, signal: ShardSignal) {
        tracing::trace!(signal = signal.name(), "Emitting signal");
        let _ = self.signals.send(signal);
    }

    fn set_status(&mut self, status: ShardStatus) {
        if self.status != status {
            tracing::debug!(
                shard_id = self.options.shard_id,
                from = %self.status,
                to = %status,
                "Status transition"
            );
        }
        self.status = status;
        let _ = self.status_tx.send(status);
    }
}

async fn poll_socket(socket: &mut Option<Box<dyn Socket>>) -> Option<WsEvent> {
    match socket.as_mut() {
        Some(socket) => socket.next_event().await,
        None => std::future::pending().await,
    }
}
