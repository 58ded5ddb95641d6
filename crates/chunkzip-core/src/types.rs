use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ChunkzipError;

pub type Result<T> = std::result::Result<T, ChunkzipError>;

/// Direction a pipeline run transforms its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineMode {
    /// Plain file in, chunked container out.
    Compress,
    /// Chunked container in, plain file out.
    Decompress,
}

impl PipelineMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compress => "compress",
            Self::Decompress => "decompress",
        }
    }
}

impl FromStr for PipelineMode {
    type Err = ChunkzipError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compress" => Ok(Self::Compress),
            "decompress" => Ok(Self::Decompress),
            other => Err(ChunkzipError::Configuration(format!(
                "unknown mode '{other}', expected compress or decompress"
            ))),
        }
    }
}

/// Integrity trailer stored alongside a chunk by framings that carry one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkTrailer {
    /// CRC-32 of the uncompressed chunk bytes.
    pub crc32: u32,
    /// Uncompressed chunk length modulo 2^32.
    pub raw_len: u32,
}

/// A slice of the input handed from the reader to a worker.
///
/// `sequence` is the dense, zero-based index of the chunk in file order and
/// the only key correlating input and output.
#[derive(Debug, Clone)]
pub struct InputChunk {
    pub sequence: u64,
    pub payload: Bytes,
    pub trailer: Option<ChunkTrailer>,
}

impl InputChunk {
    pub fn new(sequence: u64, payload: Bytes) -> Self {
        Self {
            sequence,
            payload,
            trailer: None,
        }
    }

    pub fn with_trailer(sequence: u64, payload: Bytes, trailer: ChunkTrailer) -> Self {
        Self {
            sequence,
            payload,
            trailer: Some(trailer),
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// A processed chunk waiting in the ordered buffer for the writer.
///
/// On the compress path `crc32` and `raw_len` describe the uncompressed
/// bytes; on the decompress path both are zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub sequence: u64,
    pub payload: Vec<u8>,
    pub crc32: u32,
    pub raw_len: u32,
}

impl OutputChunk {
    pub fn new(sequence: u64, payload: Vec<u8>, crc32: u32, raw_len: u32) -> Self {
        Self {
            sequence,
            payload,
            crc32,
            raw_len,
        }
    }

    /// Builds a decompressed chunk, which carries no integrity metadata.
    pub fn plain(sequence: u64, payload: Vec<u8>) -> Self {
        Self::new(sequence, payload, 0, 0)
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[inline]
pub fn duration_to_us(duration: Duration) -> u64 {
    duration.as_micros().min(u64::MAX as u128) as u64
}
