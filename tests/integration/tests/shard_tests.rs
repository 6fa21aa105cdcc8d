//! Gateway session integration tests
//!
//! Every test drives the real shard task through a scripted gateway, with
//! paused tokio time so timers fire deterministically.
//!
//! Run with: cargo test -p integration-tests --test shard_tests

use chat_proto::OpCode;
use chat_shard::{GatewayError, Shard, ShardHandle, ShardOptions, ShardSignal, ShardStatus};
use integration_tests::{
    guild_stub, next_signal, ready_payload, signal_named, snowflake, ScriptedGateway,
    ServerDeflater, ServerDriver,
};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

type Signals = mpsc::UnboundedReceiver<ShardSignal>;

fn default_options() -> ShardOptions {
    ShardOptions::new("a-token", "wss://gateway.test")
}

fn spawn_shard(options: ShardOptions, gateway: &ScriptedGateway) -> (ShardHandle, Signals) {
    let (shard, handle, signals) = Shard::new(options, gateway.connector());
    tokio::spawn(shard.run());
    (handle, signals)
}

/// Drive a fresh connection through HELLO and READY
async fn establish_ready(
    driver: &mut ServerDriver,
    signals: &mut Signals,
    session_id: &str,
    ready_seq: u64,
    heartbeat_interval_ms: u64,
) {
    driver.hello(heartbeat_interval_ms);
    driver.expect_op(OpCode::Identify).await;
    driver.expect_op(OpCode::Heartbeat).await;
    driver.dispatch("READY", ready_seq, ready_payload(session_id, true, vec![]));
    signal_named(signals, "ready").await;

    // The READY dispatch itself is forwarded to the sink; consume it so the
    // caller only sees its own events
    let ShardSignal::Event(event) = signal_named(signals, "event").await else {
        unreachable!();
    };
    assert_eq!(event.kind, chat_proto::EventKind::Ready);
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cold_identify() {
    let mut gateway = ScriptedGateway::new();
    let (handle, mut signals) = spawn_shard(default_options(), &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    assert!(driver.url.contains("encoding=json"));

    assert_eq!(next_signal(&mut signals).await.name(), "connect");
    assert_eq!(handle.status(), ShardStatus::Handshaking);

    driver.hello(41_250);
    let ShardSignal::Hello { trace } = signal_named(&mut signals, "hello").await else {
        unreachable!();
    };
    assert_eq!(trace, vec!["gw-test-1".to_string()]);

    // Identify carries the configured token
    let identify = driver.expect_op(OpCode::Identify).await;
    let d = identify.d.unwrap();
    assert_eq!(d["token"], "a-token");
    assert_eq!(d["v"], 6);

    // One immediate heartbeat with payload 0
    let heartbeat = driver.expect_op(OpCode::Heartbeat).await;
    assert_eq!(heartbeat.d, Some(json!(0)));

    driver.dispatch("READY", 1, ready_payload("session-1", true, vec![]));
    signal_named(&mut signals, "shardPreReady").await;
    signal_named(&mut signals, "ready").await;
    assert_eq!(handle.status(), ShardStatus::Ready);

    // The periodic timer is armed at the HELLO interval; the next tick
    // carries the updated sequence
    let tick = driver.expect_op(OpCode::Heartbeat).await;
    assert_eq!(tick.d, Some(json!(1)));
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_connected_is_an_error() {
    let mut gateway = ScriptedGateway::new();
    let (handle, mut signals) = spawn_shard(default_options(), &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    establish_ready(&mut driver, &mut signals, "session-1", 1, 41_250).await;

    handle.connect().unwrap();
    let ShardSignal::Error(err) = signal_named(&mut signals, "error").await else {
        unreachable!();
    };
    assert!(matches!(err, GatewayError::Usage(_)));
    assert_eq!(handle.status(), ShardStatus::Ready);
    gateway
        .expect_no_connection(Duration::from_secs(5))
        .await;
}

// ============================================================================
// Resume
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_resume_after_clean_close() {
    let mut gateway = ScriptedGateway::new();
    let (handle, mut signals) = spawn_shard(default_options(), &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    establish_ready(&mut driver, &mut signals, "abc", 41, 41_250).await;

    driver.dispatch("MESSAGE_CREATE", 42, json!({"id": "1"}));
    let ShardSignal::Event(event) = signal_named(&mut signals, "event").await else {
        unreachable!();
    };
    assert_eq!(event.seq, 42);

    // Clean close: session preserved, reconnect timer armed at 1s
    driver.close(1_000, "");
    let ShardSignal::Disconnect { error } = signal_named(&mut signals, "disconnect").await else {
        unreachable!();
    };
    assert!(error.is_none());

    let mut driver = gateway.next_driver().await;
    driver.hello(41_250);

    let resume = driver.expect_op(OpCode::Resume).await;
    let d = resume.d.unwrap();
    assert_eq!(d["token"], "a-token");
    assert_eq!(d["session_id"], "abc");
    assert_eq!(d["seq"], 42);

    driver.expect_op(OpCode::Heartbeat).await;
    driver.dispatch("RESUMED", 43, json!({}));
    signal_named(&mut signals, "resume").await;
    assert_eq!(handle.status(), ShardStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_close_4007_resets_seq_and_keeps_session() {
    let mut gateway = ScriptedGateway::new();
    let (handle, mut signals) = spawn_shard(default_options(), &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    establish_ready(&mut driver, &mut signals, "abc", 41, 41_250).await;
    driver.dispatch("MESSAGE_CREATE", 42, json!({"id": "1"}));

    driver.close(4_007, "");
    signal_named(&mut signals, "disconnect").await;

    let mut driver = gateway.next_driver().await;
    driver.hello(41_250);

    // Session survives, the sequence does not
    let resume = driver.expect_op(OpCode::Resume).await;
    let d = resume.d.unwrap();
    assert_eq!(d["session_id"], "abc");
    assert_eq!(d["seq"], 0);
}

#[tokio::test(start_paused = true)]
async fn test_close_4006_drops_session_and_seq() {
    let mut gateway = ScriptedGateway::new();
    let (handle, mut signals) = spawn_shard(default_options(), &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    establish_ready(&mut driver, &mut signals, "abc", 41, 41_250).await;

    driver.close(4_006, "");
    signal_named(&mut signals, "disconnect").await;

    let mut driver = gateway.next_driver().await;
    driver.hello(41_250);

    // A fresh identify, not a resume
    driver.expect_op(OpCode::Identify).await;
}

#[tokio::test(start_paused = true)]
async fn test_invalid_session_reidentifies_on_same_socket() {
    let mut gateway = ScriptedGateway::new();
    let (handle, mut signals) = spawn_shard(default_options(), &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    establish_ready(&mut driver, &mut signals, "abc", 41, 41_250).await;

    driver.send_json(&json!({"op": 9, "d": false}));
    let ShardSignal::Warn(warning) = signal_named(&mut signals, "warn").await else {
        unreachable!();
    };
    assert!(warning.contains("Invalid session"));

    // No reconnect: the identify goes out on the same socket
    driver.expect_op(OpCode::Identify).await;
    gateway
        .expect_no_connection(Duration::from_secs(5))
        .await;
}

// ============================================================================
// Heartbeat liveness
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_heartbeat_miss_disconnects_once() {
    let mut gateway = ScriptedGateway::new();
    let (handle, mut signals) = spawn_shard(default_options(), &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;

    driver.hello(1_000);
    driver.expect_op(OpCode::Identify).await;
    driver.expect_op(OpCode::Heartbeat).await;

    // First tick sends and starts waiting for the ack
    driver.expect_op(OpCode::Heartbeat).await;

    // Second tick never sees the ack
    let ShardSignal::Disconnect { error } = signal_named(&mut signals, "disconnect").await else {
        unreachable!();
    };
    let err = error.expect("missed ack must carry an error");
    assert!(err.to_string().contains("acknowledge previous heartbeat"));

    // Auto reconnect follows
    gateway.next_driver().await;
}

#[tokio::test(start_paused = true)]
async fn test_acked_heartbeats_keep_the_session_alive() {
    let mut gateway = ScriptedGateway::new();
    let (handle, mut signals) = spawn_shard(default_options(), &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    establish_ready(&mut driver, &mut signals, "abc", 1, 1_000).await;

    for _ in 0..3 {
        driver.expect_op(OpCode::Heartbeat).await;
        driver.heartbeat_ack();
    }

    let latency = handle.latency().await.unwrap();
    assert!(latency.is_some());
    assert_eq!(handle.status(), ShardStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_server_requested_heartbeat() {
    let mut gateway = ScriptedGateway::new();
    let (handle, mut signals) = spawn_shard(default_options(), &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    establish_ready(&mut driver, &mut signals, "abc", 7, 41_250).await;

    driver.send_json(&json!({"op": 1}));
    let heartbeat = driver.expect_op(OpCode::Heartbeat).await;
    assert_eq!(heartbeat.d, Some(json!(7)));
}

// ============================================================================
// Close-code policy
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_fatal_close_4004() {
    let mut gateway = ScriptedGateway::new();
    let (handle, mut signals) = spawn_shard(default_options(), &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    driver.hello(41_250);
    driver.expect_op(OpCode::Identify).await;

    driver.close(4_004, "");
    let ShardSignal::Error(err) = signal_named(&mut signals, "error").await else {
        unreachable!();
    };
    assert_eq!(err.to_string(), "Authentication failed");
    assert!(err.is_fatal());

    signal_named(&mut signals, "disconnect").await;
    assert_eq!(handle.status(), ShardStatus::Disconnected);

    // Fatal: no reconnect timer is armed
    gateway
        .expect_no_connection(Duration::from_secs(60))
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_reconnects() {
    let mut gateway = ScriptedGateway::new();
    let (handle, mut signals) = spawn_shard(default_options(), &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    establish_ready(&mut driver, &mut signals, "abc", 1, 41_250).await;

    driver.fail("connection reset");
    let ShardSignal::Error(err) = signal_named(&mut signals, "error").await else {
        unreachable!();
    };
    assert!(matches!(err, GatewayError::Transport(_)));

    signal_named(&mut signals, "disconnect").await;
    gateway.next_driver().await;
}

// ============================================================================
// Sequence tracking
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_non_consecutive_sequence_warns_once() {
    let mut gateway = ScriptedGateway::new();
    let (handle, mut signals) = spawn_shard(default_options(), &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    establish_ready(&mut driver, &mut signals, "abc", 1, 41_250).await;

    // Jump from 1 to 5: one warning, sequence still advances
    driver.dispatch("MESSAGE_CREATE", 5, json!({"id": "1"}));
    let ShardSignal::Warn(warning) = signal_named(&mut signals, "warn").await else {
        unreachable!();
    };
    assert!(warning.contains("Non-consecutive"));

    let ShardSignal::Event(event) = signal_named(&mut signals, "event").await else {
        unreachable!();
    };
    assert_eq!(event.seq, 5);

    // Consecutive frame: no second warning
    driver.dispatch("MESSAGE_CREATE", 6, json!({"id": "2"}));
    let signal = signal_named(&mut signals, "event").await;
    let ShardSignal::Event(event) = signal else {
        unreachable!();
    };
    assert_eq!(event.seq, 6);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_events_are_not_forwarded() {
    let mut gateway = ScriptedGateway::new();
    let options = default_options().disable_event("TYPING_START");
    let (handle, mut signals) = spawn_shard(options, &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    establish_ready(&mut driver, &mut signals, "abc", 1, 41_250).await;

    driver.dispatch("TYPING_START", 2, json!({"user_id": "1"}));
    driver.dispatch("MESSAGE_CREATE", 3, json!({"id": "1"}));

    // Only the message event comes through; the opted-out one is skipped
    // but its sequence still advanced
    let ShardSignal::Event(event) = signal_named(&mut signals, "event").await else {
        unreachable!();
    };
    assert_eq!(event.kind, chat_proto::EventKind::MessageCreate);
    assert_eq!(event.seq, 3);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_event_is_preserved() {
    let mut gateway = ScriptedGateway::new();
    let (handle, mut signals) = spawn_shard(default_options(), &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    establish_ready(&mut driver, &mut signals, "abc", 1, 41_250).await;

    driver.dispatch("SOME_FUTURE_EVENT", 2, json!({"x": 1}));
    let ShardSignal::Unknown(packet) = signal_named(&mut signals, "unknown").await else {
        unreachable!();
    };
    assert_eq!(packet.t.as_deref(), Some("SOME_FUTURE_EVENT"));
    assert_eq!(packet.s, Some(2));
}

// ============================================================================
// Compression
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_compressed_fragmented_frames() {
    let mut gateway = ScriptedGateway::new();
    let options = default_options().with_compression(true);
    let (handle, mut signals) = spawn_shard(options, &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    assert!(driver.url.contains("compress=zlib-stream"));

    let mut deflater = ServerDeflater::new();
    let hello = deflater.message(
        br#"{"op":10,"d":{"heartbeat_interval":41250,"_trace":["gw-test-1"]}}"#,
    );

    // Two binary chunks; only the second carries the flush sentinel
    let cut = hello.len() - 4;
    driver.send_binary(hello[..cut].to_vec());
    driver.send_binary(hello[cut..].to_vec());

    // Exactly one envelope decoded after the sentinel
    driver.expect_op(OpCode::Identify).await;
    driver.expect_op(OpCode::Heartbeat).await;

    // A second compressed payload on the same shared inflate context
    let ready_frame = json!({
        "op": 0,
        "t": "READY",
        "s": 1,
        "d": ready_payload("abc", true, vec![])
    });
    let ready_bytes = deflater.message(ready_frame.to_string().as_bytes());

    let mid = ready_bytes.len() / 3;
    driver.send_binary(ready_bytes[..mid].to_vec());
    driver.send_binary(ready_bytes[mid..].to_vec());

    signal_named(&mut signals, "ready").await;
    assert_eq!(handle.status(), ShardStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_compressed_frame_reconnects() {
    let mut gateway = ScriptedGateway::new();
    let options = default_options().with_compression(true);
    let (handle, mut signals) = spawn_shard(options, &gateway);

    handle.connect().unwrap();
    let driver = gateway.next_driver().await;

    driver.send_binary(vec![0xde, 0xad, 0xbe, 0xef, 0x00, 0x00, 0xFF, 0xFF]);
    let ShardSignal::Error(err) = signal_named(&mut signals, "error").await else {
        unreachable!();
    };
    assert!(matches!(err, GatewayError::Decompress(_)));

    signal_named(&mut signals, "disconnect").await;
    gateway.next_driver().await;
}

// ============================================================================
// Startup backlog
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_guild_sync_backlog_flushes_in_bounded_batches() {
    let mut gateway = ScriptedGateway::new();
    let (handle, mut signals) = spawn_shard(default_options(), &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    driver.hello(41_250);
    driver.expect_op(OpCode::Identify).await;
    driver.expect_op(OpCode::Heartbeat).await;

    // A non-bot session syncs every guild in the snapshot
    let guild_ids: Vec<String> = (0..250).map(snowflake).collect();
    let guilds: Vec<_> = guild_ids
        .iter()
        .map(|id| guild_stub(id, false, false))
        .collect();
    driver.dispatch("READY", 1, ready_payload("abc", false, guilds));
    signal_named(&mut signals, "shardPreReady").await;

    // 250 ids exceed one frame budget: two flushes, order preserved
    let mut synced = Vec::new();
    for _ in 0..2 {
        let frame = driver.expect_op(OpCode::SyncGuild).await;
        let json = frame.to_json().unwrap();
        assert!(json.len() <= 4_096, "flush exceeds one frame: {} bytes", json.len());
        let ids: Vec<String> = serde_json::from_value(frame.d.unwrap()).unwrap();
        synced.extend(ids);
    }
    assert_eq!(synced, guild_ids);

    // Ready only fires once every sync response has drained
    for (i, id) in guild_ids.iter().enumerate() {
        driver.dispatch("GUILD_SYNC", 2 + i as u64, json!({"id": id}));
    }
    signal_named(&mut signals, "ready").await;
    assert_eq!(handle.status(), ShardStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_guilds_gate_ready() {
    let mut gateway = ScriptedGateway::new();
    let (handle, mut signals) = spawn_shard(default_options(), &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    driver.hello(41_250);
    driver.expect_op(OpCode::Identify).await;
    driver.expect_op(OpCode::Heartbeat).await;

    let guilds = vec![
        guild_stub(&snowflake(1), true, false),
        guild_stub(&snowflake(2), true, false),
    ];
    driver.dispatch("READY", 1, ready_payload("abc", true, guilds));
    signal_named(&mut signals, "shardPreReady").await;

    driver.dispatch("GUILD_CREATE", 2, guild_stub(&snowflake(1), false, false));
    driver.dispatch("GUILD_CREATE", 3, guild_stub(&snowflake(2), false, false));

    signal_named(&mut signals, "ready").await;
}

#[tokio::test(start_paused = true)]
async fn test_guild_create_timeout_forces_ready() {
    let mut gateway = ScriptedGateway::new();
    let (handle, mut signals) = spawn_shard(default_options(), &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    driver.hello(41_250);
    driver.expect_op(OpCode::Identify).await;
    driver.expect_op(OpCode::Heartbeat).await;

    // One unavailable guild that never arrives
    let guilds = vec![guild_stub(&snowflake(1), true, false)];
    driver.dispatch("READY", 1, ready_payload("abc", true, guilds));
    signal_named(&mut signals, "shardPreReady").await;

    // The guild-create timeout gives up on it
    signal_named(&mut signals, "ready").await;
    assert_eq!(handle.status(), ShardStatus::Ready);
}

// ============================================================================
// Presence and rate limiting
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_status_updates_observe_the_presence_bucket() {
    let mut gateway = ScriptedGateway::new();
    let (handle, mut signals) = spawn_shard(default_options(), &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    // Long heartbeat interval keeps liveness traffic out of the way
    establish_ready(&mut driver, &mut signals, "abc", 1, 600_000).await;

    for _ in 0..7 {
        handle
            .edit_status(chat_proto::Status::Idle, None)
            .unwrap();
    }

    // Five status updates pass within the window
    for _ in 0..5 {
        driver.expect_op(OpCode::StatusUpdate).await;
    }

    // The remaining two wait for the window reset
    driver.expect_op(OpCode::StatusUpdate).await;
    driver.expect_op(OpCode::StatusUpdate).await;
}

#[tokio::test(start_paused = true)]
async fn test_presences_replace_null_entries_are_dropped() {
    let mut gateway = ScriptedGateway::new();
    let (handle, mut signals) = spawn_shard(default_options(), &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    establish_ready(&mut driver, &mut signals, "abc", 1, 41_250).await;

    driver.dispatch(
        "PRESENCES_REPLACE",
        2,
        json!([{"user": {"id": "1"}}, null, {"user": {"id": "2"}}]),
    );

    let ShardSignal::Warn(warning) = signal_named(&mut signals, "warn").await else {
        unreachable!();
    };
    assert!(warning.contains("PRESENCES_REPLACE"));

    let ShardSignal::Event(event) = signal_named(&mut signals, "event").await else {
        unreachable!();
    };
    let entries = event.data.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| !e.is_null()));
}

// ============================================================================
// Explicit disconnect
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_explicit_disconnect_hard_resets() {
    let mut gateway = ScriptedGateway::new();
    let (handle, mut signals) = spawn_shard(default_options(), &gateway);

    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    establish_ready(&mut driver, &mut signals, "abc", 41, 41_250).await;

    handle.disconnect(false).unwrap();
    signal_named(&mut signals, "disconnect").await;
    assert_eq!(handle.status(), ShardStatus::Disconnected);
    gateway
        .expect_no_connection(Duration::from_secs(60))
        .await;

    // Reconnecting after a hard reset identifies from scratch
    handle.connect().unwrap();
    let mut driver = gateway.next_driver().await;
    driver.hello(41_250);
    driver.expect_op(OpCode::Identify).await;
}
