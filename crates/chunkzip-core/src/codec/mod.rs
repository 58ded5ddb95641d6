use std::time::Instant;

use crate::Result;
use crate::telemetry::{self, tags};
use crate::types::duration_to_us;

pub mod deflate;
pub mod gzip;

pub use deflate::DeflateCodec;
pub use gzip::GzipCodec;

/// Compression level used when none is configured.
pub const DEFAULT_LEVEL: u32 = 6;
/// Highest level accepted by the DEFLATE encoders.
pub const MAX_LEVEL: u32 = 9;

/// Result of compressing one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub payload: Vec<u8>,
    /// CRC-32 (IEEE) of the uncompressed bytes.
    pub crc32: u32,
    /// Uncompressed length modulo 2^32.
    pub raw_len: u32,
}

/// Stateless single-block codec shared by every worker.
pub trait ChunkCodec: Send + Sync {
    fn name(&self) -> &'static str;

    fn encode(&self, raw: &[u8]) -> Result<EncodedChunk>;

    /// Inflates one chunk. Output longer than `max_len` is rejected.
    fn decode(&self, compressed: &[u8], max_len: usize) -> Result<Vec<u8>>;
}

/// Runs `codec.encode` and records latency and size metrics.
pub fn encode_chunk(codec: &dyn ChunkCodec, raw: &[u8]) -> Result<EncodedChunk> {
    let start = Instant::now();
    let result = codec.encode(raw);
    if let Ok(encoded) = &result {
        let labels = [("codec", codec.name()), ("op", "encode")];
        telemetry::record_histogram(
            tags::METRIC_CODEC_ENCODE_LATENCY_US,
            duration_to_us(start.elapsed()),
            &labels,
        );
        tracing::trace!(
            target: tags::TARGET_WORKER,
            codec = codec.name(),
            input_bytes = raw.len(),
            output_bytes = encoded.payload.len(),
            "chunk encoded"
        );
    }
    result
}

/// Runs `codec.decode` and records latency and size metrics.
pub fn decode_chunk(codec: &dyn ChunkCodec, compressed: &[u8], max_len: usize) -> Result<Vec<u8>> {
    let start = Instant::now();
    let result = codec.decode(compressed, max_len);
    if let Ok(decoded) = &result {
        let labels = [("codec", codec.name()), ("op", "decode")];
        telemetry::record_histogram(
            tags::METRIC_CODEC_DECODE_LATENCY_US,
            duration_to_us(start.elapsed()),
            &labels,
        );
        tracing::trace!(
            target: tags::TARGET_WORKER,
            codec = codec.name(),
            input_bytes = compressed.len(),
            output_bytes = decoded.len(),
            "chunk decoded"
        );
    }
    result
}

/// Length as stored in a gzip ISIZE field: the input size modulo 2^32.
pub(crate) fn isize_field(raw: &[u8]) -> u32 {
    raw.len() as u32
}

/// Initial output buffer for inflating a chunk. `max_len` comes from the
/// container header, so it only bounds growth.
pub(crate) fn decode_capacity(compressed_len: usize, max_len: usize) -> usize {
    const MAX_INITIAL_CAPACITY: usize = 1 << 20;
    compressed_len
        .saturating_mul(4)
        .min(MAX_INITIAL_CAPACITY)
        .min(max_len)
}

pub(crate) fn clamp_level(level: u32) -> flate2::Compression {
    flate2::Compression::new(level.min(MAX_LEVEL))
}

#[cfg(test)]
mod tests {
    use super::decode_capacity;

    #[test]
    fn decode_capacity_ignores_oversized_limits() {
        assert_eq!(decode_capacity(100, usize::MAX), 400);
        assert_eq!(decode_capacity(usize::MAX, i32::MAX as usize), 1 << 20);
        assert_eq!(decode_capacity(100, 64), 64);
    }
}
