//! Payload fixtures for gateway scenarios

use flate2::{Compress, Compression, FlushCompress, Status};
use serde_json::{json, Value};

/// An 18-digit identifier, shaped like a real snowflake
pub fn snowflake(n: u64) -> String {
    format!("{n:018}")
}

/// A guild stub for READY payloads
pub fn guild_stub(id: &str, unavailable: bool, large: bool) -> Value {
    json!({
        "id": id,
        "unavailable": unavailable,
        "large": large
    })
}

/// A READY payload with the given session and guild list
pub fn ready_payload(session_id: &str, bot: bool, guilds: Vec<Value>) -> Value {
    json!({
        "v": 6,
        "session_id": session_id,
        "_trace": ["gw-test-1"],
        "user": {"id": "42", "bot": bot},
        "guilds": guilds
    })
}

/// A shared deflate context playing the server side of a compressed session
pub struct ServerDeflater {
    ctx: Compress,
}

impl ServerDeflater {
    pub fn new() -> Self {
        Self {
            ctx: Compress::new(Compression::default(), true),
        }
    }

    /// Compress one logical payload as a sync-flushed block, ending in the
    /// `00 00 FF FF` sentinel
    pub fn message(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut offset = 0usize;
        loop {
            let in_before = self.ctx.total_in();
            let out_before = out.len();
            out.reserve(16 * 1024);
            let status = self
                .ctx
                .compress_vec(&data[offset..], &mut out, FlushCompress::Sync)
                .expect("deflate failed");
            offset += (self.ctx.total_in() - in_before) as usize;
            let produced = out.len() - out_before;
            assert_ne!(status, Status::StreamEnd);
            if offset >= data.len() && produced < 16 * 1024 {
                break;
            }
        }
        assert_eq!(&out[out.len() - 4..], &[0x00, 0x00, 0xFF, 0xFF]);
        out
    }
}

impl Default for ServerDeflater {
    fn default() -> Self {
        Self::new()
    }
}
