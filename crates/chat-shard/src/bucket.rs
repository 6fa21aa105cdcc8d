//! Fixed-window token bucket
//!
//! Rate limits outbound control frames. Items admitted immediately are
//! returned to the caller for dispatch; the rest wait in a FIFO that drains
//! when the window resets. The bucket never tells time itself; callers pass
//! `now`, which keeps it deterministic under test.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// A fixed-window rate limiter with a FIFO of deferred items
#[derive(Debug)]
pub struct Bucket<T> {
    capacity: u32,
    window: Duration,
    remaining: u32,
    reset_at: Instant,
    queue: VecDeque<T>,
}

impl<T> Bucket<T> {
    /// Create a bucket admitting `capacity` items per `window`
    #[must_use]
    pub fn new(capacity: u32, window: Duration, now: Instant) -> Self {
        Self {
            capacity,
            window,
            remaining: capacity,
            reset_at: now + window,
            queue: VecDeque::new(),
        }
    }

    /// Submit an item; returns it back when admitted immediately
    ///
    /// Deferred items keep submission order and come out of [`drain`].
    ///
    /// [`drain`]: Bucket::drain
    pub fn submit(&mut self, item: T, now: Instant) -> Option<T> {
        self.refill_if_due(now);

        if self.queue.is_empty() && self.remaining > 0 {
            self.remaining -= 1;
            Some(item)
        } else {
            self.queue.push_back(item);
            None
        }
    }

    /// Submit an item on the priority lane
    ///
    /// Observes the same token budget, but a deferred item goes to the front
    /// of the FIFO so liveness frames cannot starve behind a full queue.
    pub fn submit_priority(&mut self, item: T, now: Instant) -> Option<T> {
        self.refill_if_due(now);

        if self.remaining > 0 {
            self.remaining -= 1;
            Some(item)
        } else {
            self.queue.push_front(item);
            None
        }
    }

    /// Refill at the window boundary and release queued items in order
    ///
    /// Call at or after [`next_wake`]; returns the items now admitted.
    ///
    /// [`next_wake`]: Bucket::next_wake
    pub fn drain(&mut self, now: Instant) -> Vec<T> {
        self.refill_if_due(now);

        let mut released = Vec::new();
        while self.remaining > 0 {
            match self.queue.pop_front() {
                Some(item) => {
                    self.remaining -= 1;
                    released.push(item);
                }
                None => break,
            }
        }
        released
    }

    /// The instant the next refill can release queued work, if any is queued
    #[must_use]
    pub fn next_wake(&self) -> Option<Instant> {
        if self.queue.is_empty() {
            None
        } else {
            Some(self.reset_at)
        }
    }

    /// Drop all queued items silently
    ///
    /// The socket teardown path already signals; deferred frames for a dead
    /// socket have nowhere to go.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Number of deferred items
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Tokens left in the current window
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    fn refill_if_due(&mut self, now: Instant) {
        while now >= self.reset_at {
            self.remaining = self.capacity;
            self.reset_at += self.window;
        }
    }
}
