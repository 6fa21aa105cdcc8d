//! Heartbeat driver
//!
//! Tracks the periodic liveness exchange: one heartbeat per server-provided
//! interval, acknowledgement bookkeeping, and miss detection. The shard task
//! owns the clock; this type only decides what each tick means.

use std::time::Duration;
use tokio::time::Instant;

/// What a heartbeat tick requires of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Send a heartbeat carrying the current sequence
    Send,
    /// The previous heartbeat was never acknowledged; the connection is lost
    MissedAck,
}

/// Heartbeat state for one connection
#[derive(Debug)]
pub struct Heartbeat {
    interval: Option<Duration>,
    next_tick: Option<Instant>,
    last_sent: Option<Instant>,
    last_received: Option<Instant>,
    acked: bool,
}

impl Heartbeat {
    /// Create an unarmed driver
    #[must_use]
    pub fn new() -> Self {
        Self {
            interval: None,
            next_tick: None,
            last_sent: None,
            last_received: None,
            acked: true,
        }
    }

    /// Arm the periodic timer from a HELLO interval
    ///
    /// Replaces any existing timer; the caller follows up with one immediate
    /// heartbeat.
    pub fn arm(&mut self, interval: Duration, now: Instant) {
        self.interval = Some(interval);
        self.next_tick = Some(now + interval);
        self.acked = true;
    }

    /// Clear the timer; socket teardown path
    pub fn disarm(&mut self) {
        self.interval = None;
        self.next_tick = None;
    }

    /// Whether the periodic timer is armed
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.next_tick.is_some()
    }

    /// The next periodic deadline
    #[must_use]
    pub fn next_tick(&self) -> Option<Instant> {
        self.next_tick
    }

    /// Advance one periodic tick
    pub fn on_tick(&mut self, now: Instant) -> TickOutcome {
        if let (Some(interval), Some(next)) = (self.interval, self.next_tick) {
            self.next_tick = Some(next + interval);
        }

        if !self.acked {
            return TickOutcome::MissedAck;
        }

        self.acked = false;
        self.last_sent = Some(now);
        TickOutcome::Send
    }

    /// Record a heartbeat sent outside the tick phase (HELLO, server request)
    pub fn on_immediate_send(&mut self, now: Instant) {
        self.last_sent = Some(now);
    }

    /// Record a heartbeat acknowledgement
    pub fn on_ack(&mut self, now: Instant) {
        self.acked = true;
        self.last_received = Some(now);
    }

    /// Measured round-trip latency, when both endpoints have been observed
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        match (self.last_sent, self.last_received) {
            (Some(sent), Some(received)) => received.checked_duration_since(sent),
            _ => None,
        }
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}
