//! Framing of whole chunks on a byte stream

use crate::chunk::{Chunk, HEADER_LEN};
use crate::error::{DmapError, Result};
use crate::wire::{decode, encode_into, peek_header};
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

/// Default upper bound for a single top-level chunk (64 MiB)
pub const DEFAULT_MAX_FRAME: usize = 64 * 1024 * 1024;

/// `tokio_util` codec yielding one top-level [`Chunk`] per frame
///
/// A malformed frame surfaces as an error and the caller is expected to
/// drop the stream; nothing is skipped or resynchronized.
#[derive(Debug, Clone)]
pub struct ChunkCodec {
    max_frame: usize,
}

impl ChunkCodec {
    pub fn new() -> Self {
        Self {
            max_frame: DEFAULT_MAX_FRAME,
        }
    }

    /// Limit the payload size of a single frame
    pub fn with_max_frame(max_frame: usize) -> Self {
        Self { max_frame }
    }
}

impl Default for ChunkCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkCodec {
    type Item = Chunk;
    type Error = DmapError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Chunk>> {
        let Some((code, len)) = peek_header(src) else {
            return Ok(None);
        };

        let len = len as usize;
        if len > self.max_frame {
            tracing::debug!(%code, len, max = self.max_frame, "rejecting oversized frame");
            return Err(DmapError::PayloadTooLarge { code, len });
        }

        let total = HEADER_LEN + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let frame = src.split_to(total);
        decode(&frame).map(Some)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Chunk>> {
        match self.decode(buf)? {
            Some(chunk) => Ok(Some(chunk)),
            None if buf.is_empty() => Ok(None),
            None => Err(DmapError::Truncated {
                needed: peek_header(buf).map_or(HEADER_LEN, |(_, len)| HEADER_LEN + len as usize),
                available: buf.len(),
            }),
        }
    }
}

impl Encoder<&Chunk> for ChunkCodec {
    type Error = DmapError;

    fn encode(&mut self, item: &Chunk, dst: &mut BytesMut) -> Result<()> {
        encode_into(item, dst);
        Ok(())
    }
}

impl Encoder<Chunk> for ChunkCodec {
    type Error = DmapError;

    fn encode(&mut self, item: Chunk, dst: &mut BytesMut) -> Result<()> {
        encode_into(&item, dst);
        Ok(())
    }
}
