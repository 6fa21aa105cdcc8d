//! Inbound frame codec
//!
//! Reassembles fragmented compressed messages, detects the zlib flush
//! sentinel, inflates, and decodes payloads into gateway envelopes. The
//! inflate strategy and payload encoding are chosen at session init and are
//! sticky for the lifetime of the session.

use crate::error::{GatewayError, GatewayResult};
use chat_proto::{Encoding, GatewayMessage, ProtocolResult};
use flate2::{Decompress, FlushDecompress, Status};

/// The 4-byte zlib sync-flush marker delimiting one logical payload
pub const FLUSH_SENTINEL: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// Output buffer growth step for the inflater
const INFLATE_CHUNK: usize = 16 * 1024;

/// Check whether a compressed message terminates a logical payload
#[must_use]
pub fn ends_with_sentinel(chunk: &[u8]) -> bool {
    chunk.len() >= 4 && chunk[chunk.len() - 4..] == FLUSH_SENTINEL
}

/// Inflate strategy, fixed per session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflateStrategy {
    /// Streaming inflater: fragments accumulate between flush sentinels
    Stream,
    /// Synchronous inflater: one growing buffer, taken whole at the sentinel
    Sync,
}

/// Stateful zlib inflater shared across the messages of one connection
#[derive(Debug)]
pub struct Inflater {
    ctx: Decompress,
    strategy: InflateStrategy,
    /// Decompressed fragments awaiting the sentinel (streaming strategy)
    fragments: Vec<Vec<u8>>,
    /// Accumulating output buffer (synchronous strategy)
    buffer: Vec<u8>,
}

impl Inflater {
    /// Create an inflater expecting a zlib header
    #[must_use]
    pub fn new(strategy: InflateStrategy) -> Self {
        Self {
            ctx: Decompress::new(true),
            strategy,
            fragments: Vec::new(),
            buffer: Vec::new(),
        }
    }

    /// Feed one inbound binary message
    ///
    /// Returns a complete logical payload when the message ends with the
    /// flush sentinel; mid-payload fragments stay buffered, in arrival
    /// order, until the sentinel arrives.
    pub fn push(&mut self, chunk: &[u8]) -> GatewayResult<Option<Vec<u8>>> {
        let flush_point = ends_with_sentinel(chunk);

        match self.strategy {
            InflateStrategy::Stream => {
                let mut fragment = Vec::new();
                self.inflate_into(chunk, flush_point, &mut fragment)?;
                if !fragment.is_empty() {
                    self.fragments.push(fragment);
                }

                if !flush_point {
                    return Ok(None);
                }

                let total = self.fragments.iter().map(Vec::len).sum();
                let mut payload = Vec::with_capacity(total);
                for fragment in self.fragments.drain(..) {
                    payload.extend_from_slice(&fragment);
                }
                Ok(Some(payload))
            }
            InflateStrategy::Sync => {
                let mut buffer = std::mem::take(&mut self.buffer);
                self.inflate_into(chunk, flush_point, &mut buffer)?;

                if flush_point {
                    Ok(Some(buffer))
                } else {
                    self.buffer = buffer;
                    Ok(None)
                }
            }
        }
    }

    fn inflate_into(&mut self, input: &[u8], flush_point: bool, out: &mut Vec<u8>) -> GatewayResult<()> {
        let flush = if flush_point {
            FlushDecompress::Sync
        } else {
            FlushDecompress::None
        };

        let mut offset = 0usize;
        loop {
            let in_before = self.ctx.total_in();
            let out_before = out.len();
            out.reserve(INFLATE_CHUNK);

            let status = self
                .ctx
                .decompress_vec(&input[offset..], out, flush)
                .map_err(|e| GatewayError::Decompress(e.to_string()))?;

            offset += (self.ctx.total_in() - in_before) as usize;
            let produced = out.len() - out_before;

            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => {
                    // Finished once the input is consumed and the output no
                    // longer fills every byte we reserve
                    if offset >= input.len() && produced < INFLATE_CHUNK {
                        break;
                    }
                    if produced == 0 && offset >= input.len() {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Per-connection inbound codec: optional inflate plus payload decode
#[derive(Debug)]
pub struct FrameCodec {
    inflater: Option<Inflater>,
    encoding: Encoding,
}

impl FrameCodec {
    /// Create the codec for a fresh connection
    #[must_use]
    pub fn new(compress: bool, strategy: InflateStrategy, encoding: Encoding) -> Self {
        Self {
            inflater: compress.then(|| Inflater::new(strategy)),
            encoding,
        }
    }

    /// Decode a text frame
    pub fn decode_text(&self, text: &str) -> ProtocolResult<GatewayMessage> {
        Encoding::Json.decode(text.as_bytes())
    }

    /// Decode a binary frame
    ///
    /// Compressed sessions yield an envelope only once a full logical payload
    /// has been reassembled; uncompressed binary frames decode directly.
    pub fn decode_binary(&mut self, bytes: &[u8]) -> GatewayResult<Option<GatewayMessage>> {
        match self.inflater.as_mut() {
            Some(inflater) => match inflater.push(bytes)? {
                Some(payload) => Ok(Some(self.encoding.decode(&payload)?)),
                None => Ok(None),
            },
            None => Ok(Some(self.encoding.decode(bytes)?)),
        }
    }
}
