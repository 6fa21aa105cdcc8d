//! Ready orchestration
//!
//! Tracks the outstanding work between the READY packet and the moment the
//! session is fully live: unavailable guilds still streaming in, guilds
//! awaiting a sync, and member chunks still in flight. The `ready` signal
//! fires exactly once per session, when everything is drained.

use std::collections::{HashMap, HashSet};

/// Counters gating the `ready` signal
#[derive(Debug, Default)]
pub struct ReadyTracker {
    unavailable_guilds: HashSet<String>,
    unsynced_guilds: u32,
    pending_chunks: HashMap<String, u32>,
    emitted: bool,
}

impl ReadyTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a fresh session
    pub fn reset(&mut self) {
        self.unavailable_guilds.clear();
        self.unsynced_guilds = 0;
        self.pending_chunks.clear();
        self.emitted = false;
    }

    /// Record an unavailable guild from the READY snapshot
    pub fn add_unavailable(&mut self, guild_id: &str) {
        self.unavailable_guilds.insert(guild_id.to_string());
    }

    /// Record a GUILD_CREATE; returns whether it resolved a previously
    /// unavailable guild
    pub fn note_guild_create(&mut self, guild_id: &str) -> bool {
        self.unavailable_guilds.remove(guild_id)
    }

    /// Number of unavailable guilds still outstanding
    #[must_use]
    pub fn unavailable_count(&self) -> usize {
        self.unavailable_guilds.len()
    }

    /// Count a guild sync request issued during startup
    pub fn add_unsynced(&mut self) {
        self.unsynced_guilds = self.unsynced_guilds.saturating_add(1);
    }

    /// Record a GUILD_SYNC arriving
    pub fn note_sync(&mut self) {
        self.unsynced_guilds = self.unsynced_guilds.saturating_sub(1);
    }

    /// Expect at least one member chunk for a guild
    pub fn expect_chunks(&mut self, guild_id: &str) {
        self.pending_chunks.entry(guild_id.to_string()).or_insert(1);
    }

    /// Record a member chunk arriving
    ///
    /// The first chunk seeds the remaining count from the server's own
    /// `chunk_count` when it advertises pagination; the entry is removed when
    /// it reaches one.
    pub fn note_chunk(&mut self, guild_id: &str, chunk_index: Option<u32>, chunk_count: Option<u32>) {
        let Some(remaining) = self.pending_chunks.get_mut(guild_id) else {
            return;
        };

        if let (Some(index), Some(count)) = (chunk_index, chunk_count) {
            if *remaining == 1 && index == 0 && count > 1 {
                *remaining = count;
            }
        }

        if *remaining <= 1 {
            self.pending_chunks.remove(guild_id);
        } else {
            *remaining -= 1;
        }
    }

    /// Whether every counter has drained
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.unavailable_guilds.is_empty()
            && self.unsynced_guilds == 0
            && self.pending_chunks.is_empty()
    }

    /// Emit `ready` if drained and not yet emitted this session
    ///
    /// `queues_empty` covers the two backlog queues, which must have flushed
    /// before the session counts as live.
    pub fn try_emit(&mut self, queues_empty: bool) -> bool {
        if self.emitted || !queues_empty || !self.is_drained() {
            return false;
        }
        self.emitted = true;
        true
    }

    /// Force-emit `ready` after the guild-create timeout expires
    ///
    /// Some unavailable guilds never arrive; the timeout gives up on them.
    pub fn force_emit(&mut self) -> bool {
        if self.emitted {
            return false;
        }
        self.emitted = true;
        true
    }

    /// Whether `ready` has been emitted this session
    #[must_use]
    pub fn emitted(&self) -> bool {
        self.emitted
    }
}
