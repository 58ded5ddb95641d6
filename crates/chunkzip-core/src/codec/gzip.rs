use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use super::{ChunkCodec, DEFAULT_LEVEL, EncodedChunk, clamp_level, decode_capacity, isize_field};
use crate::{ChunkzipError, Result};

/// Encodes each chunk as a complete, self-validating gzip member.
///
/// The member trailer carries the CRC-32 and length of the chunk, so
/// [`ChunkCodec::decode`] detects corrupted payloads without extra framing.
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    level: u32,
}

impl GzipCodec {
    pub fn new(level: u32) -> Self {
        Self { level }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL)
    }
}

impl ChunkCodec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn encode(&self, raw: &[u8]) -> Result<EncodedChunk> {
        let mut encoder =
            GzEncoder::new(Vec::with_capacity(raw.len() / 2 + 64), clamp_level(self.level));
        encoder
            .write_all(raw)
            .map_err(|error| ChunkzipError::Codec(format!("gzip encode failed: {error}")))?;
        let payload = encoder
            .finish()
            .map_err(|error| ChunkzipError::Codec(format!("gzip encode failed: {error}")))?;

        Ok(EncodedChunk {
            payload,
            crc32: crc32fast::hash(raw),
            raw_len: isize_field(raw),
        })
    }

    fn decode(&self, compressed: &[u8], max_len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(decode_capacity(compressed.len(), max_len));
        GzDecoder::new(compressed)
            .take(max_len as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|error| ChunkzipError::Codec(format!("gzip decode failed: {error}")))?;

        if out.len() > max_len {
            return Err(ChunkzipError::Codec(format!(
                "gzip member inflates past the {max_len} byte chunk limit"
            )));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_payload_is_a_gzip_member() {
        let codec = GzipCodec::default();
        let encoded = codec.encode(b"hello hello hello").unwrap();
        assert_eq!(&encoded.payload[..3], &[0x1f, 0x8b, 0x08]);
        assert_eq!(encoded.raw_len, 17);
        assert_eq!(encoded.crc32, crc32fast::hash(b"hello hello hello"));
    }

    #[test]
    fn decode_rejects_output_above_limit() {
        let codec = GzipCodec::default();
        let encoded = codec.encode(&[7u8; 4096]).unwrap();
        let err = codec.decode(&encoded.payload, 4095).unwrap_err();
        assert!(matches!(err, ChunkzipError::Codec(_)));
        assert_eq!(codec.decode(&encoded.payload, 4096).unwrap().len(), 4096);
    }

    #[test]
    fn flipped_trailer_bit_fails_checksum() {
        let codec = GzipCodec::new(1);
        let mut payload = codec.encode(b"some payload bytes").unwrap().payload;
        let crc_offset = payload.len() - 8;
        payload[crc_offset] ^= 0x01;
        assert!(codec.decode(&payload, 1024).is_err());
    }
}
