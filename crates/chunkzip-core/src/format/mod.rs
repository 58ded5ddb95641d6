//! Container format: a fixed file header followed by one record per chunk.

mod consts;
mod headers;
mod reader;
mod writer;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ChunkzipError;
use crate::codec::{ChunkCodec, DeflateCodec, GzipCodec};

pub use consts::{
    DEFAULT_CHUNK_SIZE, FILE_HEADER_SIZE, GZIP_CM_DEFLATE, GZIP_FLAG_FEXTRA, GZIP_ID1, GZIP_ID2,
    GZIP_OS_UNKNOWN, HEADER_ID1, HEADER_ID2, LENGTH_PREFIX_SIZE, MEMBER_FOOTER_SIZE,
    MEMBER_HEADER_SIZE, MEMBER_SUBFIELD_ID,
};
pub use headers::{FileHeader, MemberFooter, MemberHeader};
pub use reader::ContainerReader;
pub use writer::ContainerWriter;

/// How each chunk record is laid out after the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkFraming {
    /// `i32` compressed length followed by a complete gzip member.
    LengthPrefixed,
    /// A bare RFC1952 member whose extra field carries the compressed length.
    GzipMember,
}

impl ChunkFraming {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LengthPrefixed => "length-prefixed",
            Self::GzipMember => "gzip-member",
        }
    }

    /// Codec whose payloads this framing stores.
    pub fn default_codec(self, level: u32) -> Arc<dyn ChunkCodec> {
        match self {
            Self::LengthPrefixed => Arc::new(GzipCodec::new(level)),
            Self::GzipMember => Arc::new(DeflateCodec::new(level)),
        }
    }

    /// Whether records carry a CRC-32/ISIZE trailer outside the payload.
    pub fn carries_trailer(self) -> bool {
        matches!(self, Self::GzipMember)
    }

    /// Largest compressed record accepted for a chunk of `chunk_size` bytes.
    pub fn max_record_len(self, chunk_size: u32) -> u64 {
        let chunk_size = u64::from(chunk_size);
        chunk_size + chunk_size / 2 + 4096
    }
}

impl Default for ChunkFraming {
    fn default() -> Self {
        if cfg!(feature = "rfc1952") {
            Self::GzipMember
        } else {
            Self::LengthPrefixed
        }
    }
}

impl fmt::Display for ChunkFraming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkFraming {
    type Err = ChunkzipError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "length-prefixed" | "length" | "prefixed" => Ok(Self::LengthPrefixed),
            "gzip-member" | "gzip" | "rfc1952" => Ok(Self::GzipMember),
            other => Err(ChunkzipError::Configuration(format!(
                "unknown chunk framing '{other}'"
            ))),
        }
    }
}
