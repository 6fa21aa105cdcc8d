//! Inbound frame classification
//!
//! Decoded envelopes are classified on their op: control ops feed the state
//! machine, dispatch events update the sequence counter and flow to the
//! domain sink in wire order.

use super::{ReconnectIntent, Shard, ShardStatus};
use crate::error::GatewayError;
use crate::signal::ShardSignal;
use chat_proto::{
    DispatchEvent, EventKind, GatewayMessage, GuildStub, IdentifyPayload, IdentifyProperties,
    MemberChunkData, ProtocolError, ReadyData, ResumePayload,
};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

impl Shard {
    /// Classify one decoded envelope
    pub(super) async fn handle_frame(&mut self, message: GatewayMessage) {
        if self.options.raw_events {
            self.emit(ShardSignal::Raw(message.clone()));
        }
        tracing::trace!(op = %message.op, "Received frame");

        match message.op {
            chat_proto::OpCode::Dispatch => self.on_dispatch(message).await,
            chat_proto::OpCode::Heartbeat => {
                // Server-requested heartbeat; tick phase stays put
                self.heartbeat.on_immediate_send(Instant::now());
                self.send_heartbeat().await;
            }
            chat_proto::OpCode::InvalidSession => self.on_invalid_session(&message).await,
            chat_proto::OpCode::Reconnect => {
                tracing::debug!(shard_id = self.options.shard_id, "Server requested reconnect");
                self.disconnect(ReconnectIntent::Auto, None).await;
            }
            chat_proto::OpCode::Hello => self.on_hello(&message).await,
            chat_proto::OpCode::HeartbeatAck => {
                self.heartbeat.on_ack(Instant::now());
            }
            other => {
                tracing::debug!(op = %other, "Unexpected op from server");
                self.emit(ShardSignal::Unknown(message));
            }
        }
    }

    async fn on_hello(&mut self, message: &GatewayMessage) {
        let Some(hello) = message.as_hello() else {
            tracing::warn!("Dropping HELLO with a malformed payload");
            return;
        };

        tracing::debug!(
            shard_id = self.options.shard_id,
            heartbeat_interval = hello.heartbeat_interval,
            trace = ?hello.trace,
            "HELLO received"
        );
        self.trace = hello.trace.clone();
        self.emit(ShardSignal::Hello { trace: hello.trace });

        if hello.heartbeat_interval > 0 {
            self.heartbeat
                .arm(Duration::from_millis(hello.heartbeat_interval), Instant::now());
        }

        if self.session_id.is_some() {
            self.set_status(ShardStatus::Resuming);
            self.send_resume().await;
        } else {
            self.send_identify().await;
        }

        // One immediate heartbeat, phase untouched
        self.heartbeat.on_immediate_send(Instant::now());
        self.send_heartbeat().await;
    }

    async fn on_invalid_session(&mut self, message: &GatewayMessage) {
        let resumable = message.as_invalid_session().unwrap_or(false);
        tracing::warn!(
            shard_id = self.options.shard_id,
            resumable,
            "Session invalidated by server"
        );
        self.emit(ShardSignal::Warn("Invalid session, reidentifying".to_string()));

        self.seq = 0;
        self.session_id = None;
        self.set_status(ShardStatus::Handshaking);
        self.send_identify().await;
    }

    async fn on_dispatch(&mut self, message: GatewayMessage) {
        // Sequence advances before anything else sees the event
        if let Some(s) = message.s {
            if s > self.seq + 1 && self.socket.is_some() && self.status != ShardStatus::Resuming {
                let warning = format!(
                    "Non-consecutive sequence, {} -> {s}",
                    self.seq
                );
                tracing::warn!(shard_id = self.options.shard_id, "{warning}");
                self.emit(ShardSignal::Warn(warning));
            }
            self.seq = s;
        }

        let Some(name) = message.t.clone() else {
            tracing::debug!("Dispatch frame without an event name");
            return;
        };

        let Some(kind) = EventKind::from_name(&name) else {
            tracing::debug!(event = %name, "Unknown dispatch event");
            self.emit(ShardSignal::Unknown(message));
            return;
        };

        let mut data = message.d.unwrap_or(Value::Null);

        match kind {
            EventKind::Ready => self.on_ready_packet(&data).await,
            EventKind::Resumed => self.on_resumed().await,
            EventKind::GuildCreate => self.on_guild_create(&data).await,
            EventKind::GuildSync => {
                self.ready_tracker.note_sync();
                self.check_ready(false).await;
            }
            EventKind::GuildMembersChunk => {
                if let Ok(chunk) = serde_json::from_value::<MemberChunkData>(data.clone()) {
                    self.ready_tracker
                        .note_chunk(&chunk.guild_id, chunk.chunk_index, chunk.chunk_count);
                }
                self.check_ready(false).await;
            }
            EventKind::PresencesReplace => {
                // Null entries would poison a bulk presence update downstream
                if let Value::Array(entries) = &mut data {
                    let before = entries.len();
                    entries.retain(|entry| !entry.is_null());
                    if entries.len() != before {
                        let warning =
                            "Dropping null entries in PRESENCES_REPLACE".to_string();
                        tracing::warn!(shard_id = self.options.shard_id, "{warning}");
                        self.emit(ShardSignal::Warn(warning));
                    }
                }
            }
            _ => {}
        }

        if !self.options.disable_events.contains(&name) {
            self.emit(ShardSignal::Event(DispatchEvent::new(kind, self.seq, data)));
        }
    }

    async fn on_ready_packet(&mut self, data: &Value) {
        let ready: ReadyData = match serde_json::from_value(data.clone()) {
            Ok(ready) => ready,
            Err(e) => {
                let err = GatewayError::Decode(ProtocolError::Decode(e.to_string()));
                self.emit(ShardSignal::Error(err));
                return;
            }
        };

        self.connect_deadline = None;
        self.session_id = Some(ready.session_id.clone());
        if !ready.trace.is_empty() {
            self.trace = ready.trace.clone();
        }
        self.policy.reset();
        self.set_status(ShardStatus::Ready);
        self.pre_ready = true;
        self.ready_tracker.reset();

        tracing::info!(
            shard_id = self.options.shard_id,
            session_id = %ready.session_id,
            guilds = ready.guilds.len(),
            "Session established"
        );
        self.emit(ShardSignal::PreReady);
        self.coordinator.shard_ready(self.options.shard_id);

        for guild in &ready.guilds {
            if guild.unavailable {
                self.ready_tracker.add_unavailable(&guild.id);
            }
        }

        if !ready.user.bot {
            let guild_ids: Vec<String> = ready.guilds.iter().map(|g| g.id.clone()).collect();
            for guild_id in guild_ids {
                self.ready_tracker.add_unsynced();
                self.queue_guild_sync(guild_id).await;
            }
        }

        if self.options.get_all_users {
            let large: Vec<String> = ready
                .guilds
                .iter()
                .filter(|g| g.large && !g.unavailable)
                .map(|g| g.id.clone())
                .collect();
            for guild_id in large {
                self.ready_tracker.expect_chunks(&guild_id);
                self.queue_member_request(guild_id).await;
            }
        }

        if self.options.seed_voice_connections {
            tracing::debug!(
                shard_id = self.options.shard_id,
                "Voice reconnection is delegated to the host"
            );
        }

        self.guild_create_deadline = Some(
            Instant::now() + Duration::from_millis(self.options.guild_create_timeout_ms),
        );
        self.check_ready(false).await;
    }

    async fn on_resumed(&mut self) {
        self.connect_deadline = None;
        self.policy.reset();
        self.set_status(ShardStatus::Ready);
        self.pre_ready = false;

        tracing::info!(
            shard_id = self.options.shard_id,
            session_id = self.session_id.as_deref(),
            seq = self.seq,
            "Session resumed"
        );
        self.emit(ShardSignal::Resume);
        self.coordinator.shard_ready(self.options.shard_id);

        if !self.ready_tracker.emitted() {
            self.check_ready(false).await;
        }
    }

    async fn on_guild_create(&mut self, data: &Value) {
        let Ok(stub) = serde_json::from_value::<GuildStub>(data.clone()) else {
            return;
        };

        if self.ready_tracker.note_guild_create(&stub.id) && !self.ready_tracker.emitted() {
            // Another unavailable guild landed; give the rest more time
            self.guild_create_deadline = Some(
                Instant::now() + Duration::from_millis(self.options.guild_create_timeout_ms),
            );
        }

        if self.options.get_all_users && stub.large {
            if !self.ready_tracker.emitted() {
                self.ready_tracker.expect_chunks(&stub.id);
            }
            self.queue_member_request(stub.id).await;
        }

        self.check_ready(false).await;
    }

    pub(super) async fn send_identify(&mut self) {
        let payload = IdentifyPayload {
            token: self.options.token.clone(),
            v: chat_proto::GATEWAY_VERSION,
            compress: self.options.compress,
            large_threshold: self.options.large_threshold,
            properties: IdentifyProperties::new(),
            shard: (self.options.max_shards > 1)
                .then(|| [self.options.shard_id, self.options.max_shards]),
            presence: self.presence.to_payload(),
        };

        tracing::debug!(shard_id = self.options.shard_id, "Identifying");
        self.send_ws(GatewayMessage::identify(&payload), true).await;
    }

    pub(super) async fn send_resume(&mut self) {
        let Some(session_id) = self.session_id.clone() else {
            // No session to resume; fall back to a fresh identify
            self.send_identify().await;
            return;
        };

        let payload = ResumePayload {
            token: self.options.token.clone(),
            session_id,
            seq: self.seq,
        };

        tracing::debug!(
            shard_id = self.options.shard_id,
            seq = self.seq,
            "Resuming session"
        );
        self.send_ws(GatewayMessage::resume(&payload), true).await;
    }
}
