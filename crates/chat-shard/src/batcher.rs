//! Backlog batching
//!
//! Guild-sync and member-fetch requests accumulate while the session is not
//! ready and flush as batched control frames. Batches are bounded so a flush
//! always fits one 4 KiB frame.

/// Byte budget for a guild-sync flush: 4096 minus the `{"op":12,"d":[...]}`
/// envelope overhead
pub const SYNC_GUILD_BUDGET: usize = 4_081;

/// Byte budget for a member-fetch flush: 4096 minus the larger
/// `{"op":8,"d":{"guild_id":[...],"query":"","limit":0}}` envelope overhead
pub const REQUEST_MEMBERS_BUDGET: usize = 4_048;

/// Per-element framing overhead: two quotes plus a separator
const ID_OVERHEAD: usize = 3;

/// A byte-budgeted FIFO of identifiers
#[derive(Debug)]
pub struct Batcher {
    budget: usize,
    ids: Vec<String>,
    bytes: usize,
}

impl Batcher {
    /// Create a batcher with the given flush budget
    #[must_use]
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            ids: Vec::new(),
            bytes: 1,
        }
    }

    /// Enqueue an identifier
    ///
    /// Returns a batch that must be flushed immediately: the accumulated
    /// queue when this identifier would push it past the budget (the
    /// identifier then seeds the next batch), or the identifier alone when
    /// the session is already live.
    pub fn enqueue(&mut self, id: String, ready: bool) -> Option<Vec<String>> {
        if self.bytes + id.len() + ID_OVERHEAD > self.budget {
            let batch = std::mem::take(&mut self.ids);
            self.bytes = 1 + id.len() + ID_OVERHEAD;
            self.ids.push(id);
            return Some(batch);
        }

        if ready {
            return Some(vec![id]);
        }

        self.bytes += id.len() + ID_OVERHEAD;
        self.ids.push(id);
        None
    }

    /// Take everything queued; the pre-ready gating flush
    pub fn drain(&mut self) -> Vec<String> {
        self.bytes = 1;
        std::mem::take(&mut self.ids)
    }

    /// Check if nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of queued identifiers
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }
}
