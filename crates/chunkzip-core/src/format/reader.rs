use std::io::{self, Read};

use bytes::Bytes;

use crate::types::{ChunkTrailer, InputChunk};
use crate::{ChunkzipError, Result};

use super::{
    ChunkFraming, FileHeader, LENGTH_PREFIX_SIZE, MEMBER_FOOTER_SIZE, MEMBER_HEADER_SIZE,
    MemberFooter, MemberHeader,
};

const PAYLOAD_PREALLOC_LIMIT: u64 = 1 << 20;

/// Sequential reader over a container stream.
///
/// Validates the file header on open and then yields one [`InputChunk`] per
/// record, numbering them from zero. Truncated or oversized records and a
/// record count that disagrees with the header are reported as
/// [`ChunkzipError::InvalidFormat`].
#[derive(Debug)]
pub struct ContainerReader<R: Read> {
    reader: R,
    header: FileHeader,
    framing: ChunkFraming,
    next_sequence: u64,
    bytes_read: u64,
}

impl<R: Read> ContainerReader<R> {
    pub fn open(mut reader: R, framing: ChunkFraming) -> Result<Self> {
        let header = FileHeader::read(&mut reader)?;
        Ok(Self {
            reader,
            header,
            framing,
            next_sequence: 0,
            bytes_read: super::FILE_HEADER_SIZE as u64,
        })
    }

    pub fn header(&self) -> FileHeader {
        self.header
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Reads the next record, or `None` once the stream ends cleanly after
    /// the last record the header declares.
    pub fn next_chunk(&mut self) -> Result<Option<InputChunk>> {
        let chunk = match self.framing {
            ChunkFraming::LengthPrefixed => self.read_length_prefixed()?,
            ChunkFraming::GzipMember => self.read_member()?,
        };

        let Some(chunk) = chunk else {
            if self.next_sequence != self.header.chunk_count() {
                return Err(ChunkzipError::InvalidFormat(
                    "container ends before the declared chunk count",
                ));
            }
            return Ok(None);
        };

        if chunk.sequence >= self.header.chunk_count() {
            return Err(ChunkzipError::InvalidFormat(
                "container holds more chunks than its header declares",
            ));
        }
        Ok(Some(chunk))
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn read_length_prefixed(&mut self) -> Result<Option<InputChunk>> {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        if !self.read_record_start(&mut prefix)? {
            return Ok(None);
        }

        let len = i32::from_le_bytes(prefix);
        if len <= 0 {
            return Err(ChunkzipError::InvalidFormat(
                "non-positive chunk record length",
            ));
        }
        let payload = self.read_payload(len as u64)?;
        Ok(Some(self.emit(payload, None)))
    }

    fn read_member(&mut self) -> Result<Option<InputChunk>> {
        let mut header_bytes = [0u8; MEMBER_HEADER_SIZE];
        if !self.read_record_start(&mut header_bytes)? {
            return Ok(None);
        }

        let member = MemberHeader::from_bytes(header_bytes)?;
        let payload = self.read_payload(u64::from(member.compressed_len))?;

        let mut footer_bytes = [0u8; MEMBER_FOOTER_SIZE];
        self.read_exact_or_truncated(&mut footer_bytes)?;
        let footer = MemberFooter::from_bytes(footer_bytes);

        Ok(Some(self.emit(
            payload,
            Some(ChunkTrailer {
                crc32: footer.crc32,
                raw_len: footer.isize,
            }),
        )))
    }

    fn read_payload(&mut self, len: u64) -> Result<Vec<u8>> {
        if len > self.framing.max_record_len(self.header.chunk_size) {
            return Err(ChunkzipError::InvalidFormat(
                "chunk record exceeds the maximum size for its chunk",
            ));
        }
        // The length is only trusted up to what the stream actually holds.
        let mut payload = Vec::with_capacity(len.min(PAYLOAD_PREALLOC_LIMIT) as usize);
        let read = (&mut self.reader).take(len).read_to_end(&mut payload)?;
        self.bytes_read += read as u64;
        if (read as u64) < len {
            return Err(ChunkzipError::InvalidFormat("truncated chunk record"));
        }
        Ok(payload)
    }

    fn emit(&mut self, payload: Vec<u8>, trailer: Option<ChunkTrailer>) -> InputChunk {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        InputChunk {
            sequence,
            payload: Bytes::from(payload),
            trailer,
        }
    }

    /// Fills `buf` with the start of a record. Returns `false` on a clean end
    /// of stream before the first byte.
    fn read_record_start(&mut self, buf: &mut [u8]) -> Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(error.into()),
            }
        }
        self.bytes_read += filled as u64;

        match filled {
            0 => Ok(false),
            n if n == buf.len() => Ok(true),
            _ => Err(ChunkzipError::InvalidFormat("truncated chunk record header")),
        }
    }

    fn read_exact_or_truncated(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf).map_err(|error| {
            if error.kind() == io::ErrorKind::UnexpectedEof {
                ChunkzipError::InvalidFormat("truncated chunk record")
            } else {
                ChunkzipError::Io(error)
            }
        })?;
        self.bytes_read += buf.len() as u64;
        Ok(())
    }
}
