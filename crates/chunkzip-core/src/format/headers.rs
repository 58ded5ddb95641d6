use std::io::{self, Read, Write};

use crate::{ChunkzipError, Result};

use super::{
    FILE_HEADER_SIZE, GZIP_CM_DEFLATE, GZIP_FLAG_FEXTRA, GZIP_ID1, GZIP_ID2, GZIP_OS_UNKNOWN,
    HEADER_ID1, HEADER_ID2, MEMBER_FOOTER_SIZE, MEMBER_HEADER_SIZE, MEMBER_SUBFIELD_ID,
};

/// Container file header.
///
/// Layout (little-endian): `u8 id1`, `i32 id2`, `i64 uncompressed_length`,
/// `i32 chunk_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub uncompressed_length: u64,
    pub chunk_size: u32,
}

impl FileHeader {
    pub fn new(uncompressed_length: u64, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_size > i32::MAX as usize {
            return Err(ChunkzipError::InvalidFormat(
                "chunk size must be between 1 and i32::MAX",
            ));
        }
        if uncompressed_length > i64::MAX as u64 {
            return Err(ChunkzipError::InvalidFormat(
                "uncompressed length exceeds i64::MAX",
            ));
        }

        Ok(Self {
            uncompressed_length,
            chunk_size: chunk_size as u32,
        })
    }

    /// Number of chunk records the container holds.
    pub fn chunk_count(&self) -> u64 {
        self.uncompressed_length
            .div_ceil(u64::from(self.chunk_size))
    }

    /// Uncompressed size of the chunk at `sequence`, or `None` past the end.
    pub fn chunk_len(&self, sequence: u64) -> Option<usize> {
        let chunk_size = u64::from(self.chunk_size);
        let start = sequence.checked_mul(chunk_size)?;
        if start >= self.uncompressed_length {
            return None;
        }
        Some((self.uncompressed_length - start).min(chunk_size) as usize)
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = [0u8; FILE_HEADER_SIZE];
        reader.read_exact(&mut bytes).map_err(|error| {
            if error.kind() == io::ErrorKind::UnexpectedEof {
                ChunkzipError::InvalidFormat("truncated container header")
            } else {
                ChunkzipError::Io(error)
            }
        })?;
        Self::from_bytes(bytes)
    }

    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut bytes = [0u8; FILE_HEADER_SIZE];
        bytes[0] = HEADER_ID1;
        bytes[1..5].copy_from_slice(&HEADER_ID2.to_le_bytes());
        bytes[5..13].copy_from_slice(&(self.uncompressed_length as i64).to_le_bytes());
        bytes[13..17].copy_from_slice(&(self.chunk_size as i32).to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: [u8; FILE_HEADER_SIZE]) -> Result<Self> {
        let id2 = i32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        if bytes[0] != HEADER_ID1 || id2 != HEADER_ID2 {
            return Err(ChunkzipError::InvalidFormat("invalid container magic"));
        }

        let length = i64::from_le_bytes([
            bytes[5], bytes[6], bytes[7], bytes[8], bytes[9], bytes[10], bytes[11], bytes[12],
        ]);
        if length < 0 {
            return Err(ChunkzipError::InvalidFormat(
                "negative uncompressed length in header",
            ));
        }

        let chunk_size = i32::from_le_bytes([bytes[13], bytes[14], bytes[15], bytes[16]]);
        if chunk_size <= 0 {
            return Err(ChunkzipError::InvalidFormat(
                "non-positive chunk size in header",
            ));
        }

        Ok(Self {
            uncompressed_length: length as u64,
            chunk_size: chunk_size as u32,
        })
    }
}

/// Header of one chunk record in the gzip-member framing.
///
/// A regular RFC1952 member header with `FEXTRA` set; the extra field holds
/// a single `CZ` subfield with the length of the DEFLATE payload that follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberHeader {
    pub compressed_len: u32,
}

impl MemberHeader {
    pub fn new(compressed_len: u32) -> Self {
        Self { compressed_len }
    }

    pub fn to_bytes(&self) -> [u8; MEMBER_HEADER_SIZE] {
        let mut bytes = [0u8; MEMBER_HEADER_SIZE];
        bytes[0] = GZIP_ID1;
        bytes[1] = GZIP_ID2;
        bytes[2] = GZIP_CM_DEFLATE;
        bytes[3] = GZIP_FLAG_FEXTRA;
        // bytes[4..8] MTIME and bytes[8] XFL stay zero.
        bytes[9] = GZIP_OS_UNKNOWN;
        bytes[10..12].copy_from_slice(&8u16.to_le_bytes());
        bytes[12..14].copy_from_slice(&MEMBER_SUBFIELD_ID);
        bytes[14..16].copy_from_slice(&4u16.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.compressed_len.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: [u8; MEMBER_HEADER_SIZE]) -> Result<Self> {
        if bytes[0] != GZIP_ID1 || bytes[1] != GZIP_ID2 {
            return Err(ChunkzipError::InvalidFormat("invalid gzip member magic"));
        }
        if bytes[2] != GZIP_CM_DEFLATE {
            return Err(ChunkzipError::InvalidFormat(
                "unsupported gzip compression method",
            ));
        }
        if bytes[3] != GZIP_FLAG_FEXTRA {
            return Err(ChunkzipError::InvalidFormat("unexpected gzip member flags"));
        }

        let xlen = u16::from_le_bytes([bytes[10], bytes[11]]);
        let sublen = u16::from_le_bytes([bytes[14], bytes[15]]);
        if xlen != 8 || bytes[12..14] != MEMBER_SUBFIELD_ID || sublen != 4 {
            return Err(ChunkzipError::InvalidFormat(
                "gzip member lacks the chunk length subfield",
            ));
        }

        Ok(Self {
            compressed_len: u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]),
        })
    }
}

/// Trailer of one gzip member: CRC-32 and ISIZE of the uncompressed bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberFooter {
    pub crc32: u32,
    pub isize: u32,
}

impl MemberFooter {
    pub fn to_bytes(&self) -> [u8; MEMBER_FOOTER_SIZE] {
        let mut bytes = [0u8; MEMBER_FOOTER_SIZE];
        bytes[..4].copy_from_slice(&self.crc32.to_le_bytes());
        bytes[4..].copy_from_slice(&self.isize.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: [u8; MEMBER_FOOTER_SIZE]) -> Self {
        Self {
            crc32: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            isize: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_matches_container_format() {
        let header = FileHeader::new(0x0102_0304_0506, 1024 * 1024).unwrap();
        let bytes = header.to_bytes();
        assert_eq!(bytes[0], 0x50);
        assert_eq!(&bytes[1..5], &[0x4D, 0x41, 0x45, 0x45]);
        assert_eq!(&bytes[5..13], &[0x06, 0x05, 0x04, 0x03, 0x02, 0x01, 0, 0]);
        assert_eq!(&bytes[13..17], &[0x00, 0x00, 0x10, 0x00]);
        assert_eq!(FileHeader::from_bytes(bytes).unwrap(), header);
    }

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(FileHeader::new(0, 10).unwrap().chunk_count(), 0);
        assert_eq!(FileHeader::new(10, 10).unwrap().chunk_count(), 1);
        assert_eq!(FileHeader::new(11, 10).unwrap().chunk_count(), 2);
    }

    #[test]
    fn chunk_len_reports_short_tail() {
        let header = FileHeader::new(25, 10).unwrap();
        assert_eq!(header.chunk_len(0), Some(10));
        assert_eq!(header.chunk_len(2), Some(5));
        assert_eq!(header.chunk_len(3), None);
    }

    #[test]
    fn zero_chunk_size_rejected() {
        assert!(FileHeader::new(10, 0).is_err());
    }

    #[test]
    fn member_header_round_trips() {
        let header = MemberHeader::new(777);
        let bytes = header.to_bytes();
        assert_eq!(&bytes[..4], &[0x1f, 0x8b, 0x08, 0x04]);
        assert_eq!(bytes[9], 255);
        assert_eq!(MemberHeader::from_bytes(bytes).unwrap(), header);
    }

    #[test]
    fn member_header_without_subfield_rejected() {
        let mut bytes = MemberHeader::new(1).to_bytes();
        bytes[12] = b'X';
        assert!(matches!(
            MemberHeader::from_bytes(bytes),
            Err(ChunkzipError::InvalidFormat(_))
        ));
    }
}
