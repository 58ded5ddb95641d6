use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use super::{ChunkCodec, DEFAULT_LEVEL, EncodedChunk, clamp_level, decode_capacity, isize_field};
use crate::{ChunkzipError, Result};

/// Raw DEFLATE codec used by the gzip-member framing, which stores the
/// checksum in its own member footer.
#[derive(Debug, Clone, Copy)]
pub struct DeflateCodec {
    level: u32,
}

impl DeflateCodec {
    pub fn new(level: u32) -> Self {
        Self { level }
    }
}

impl Default for DeflateCodec {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL)
    }
}

impl ChunkCodec for DeflateCodec {
    fn name(&self) -> &'static str {
        "deflate"
    }

    fn encode(&self, raw: &[u8]) -> Result<EncodedChunk> {
        let mut encoder =
            DeflateEncoder::new(Vec::with_capacity(raw.len() / 2 + 16), clamp_level(self.level));
        encoder
            .write_all(raw)
            .map_err(|error| ChunkzipError::Codec(format!("deflate encode failed: {error}")))?;
        let payload = encoder
            .finish()
            .map_err(|error| ChunkzipError::Codec(format!("deflate encode failed: {error}")))?;

        Ok(EncodedChunk {
            payload,
            crc32: crc32fast::hash(raw),
            raw_len: isize_field(raw),
        })
    }

    fn decode(&self, compressed: &[u8], max_len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(decode_capacity(compressed.len(), max_len));
        DeflateDecoder::new(compressed)
            .take(max_len as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|error| ChunkzipError::Codec(format!("deflate decode failed: {error}")))?;

        if out.len() > max_len {
            return Err(ChunkzipError::Codec(format!(
                "deflate stream inflates past the {max_len} byte chunk limit"
            )));
        }
        Ok(out)
    }
}
