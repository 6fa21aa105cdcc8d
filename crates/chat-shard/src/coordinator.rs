//! Shard manager upcall capability
//!
//! A multi-shard allocator owns N shards and paces their identifies. The
//! shard core never owns the manager; it holds this narrow capability and
//! calls up when its session establishes or when it wants a connect slot.

/// Upcalls from a shard to its manager
pub trait ShardCoordinator: Send + Sync {
    /// The shard's READY or RESUMED packet landed; used for identify pacing
    fn shard_ready(&self, shard_id: u32);

    /// The shard wants a (re)connect slot
    fn request_connect(&self, shard_id: u32);
}

/// Standalone coordinator: every upcall is a no-op
#[derive(Debug, Default)]
pub struct NoopCoordinator;

impl ShardCoordinator for NoopCoordinator {
    fn shard_ready(&self, _shard_id: u32) {}

    fn request_connect(&self, _shard_id: u32) {}
}
