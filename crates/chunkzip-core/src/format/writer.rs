use std::io::Write;
use std::time::Instant;

use crate::telemetry::{self, tags};
use crate::types::{OutputChunk, duration_to_us};
use crate::{ChunkzipError, Result};

use super::{ChunkFraming, FileHeader, LENGTH_PREFIX_SIZE, MemberFooter, MemberHeader};

/// Writes a container: the file header once, then chunk records in strict
/// sequence order.
#[derive(Debug)]
pub struct ContainerWriter<W: Write> {
    writer: W,
    framing: ChunkFraming,
    header: Option<FileHeader>,
    chunks_written: u64,
    bytes_written: u64,
}

impl<W: Write> ContainerWriter<W> {
    pub fn new(writer: W, framing: ChunkFraming) -> Self {
        Self {
            writer,
            framing,
            header: None,
            chunks_written: 0,
            bytes_written: 0,
        }
    }

    pub fn write_header(&mut self, header: FileHeader) -> Result<()> {
        if self.header.is_some() {
            return Err(ChunkzipError::InvalidFormat("container header already written"));
        }
        header.write(&mut self.writer)?;
        self.bytes_written += super::FILE_HEADER_SIZE as u64;
        self.header = Some(header);
        Ok(())
    }

    /// Appends the record for `chunk`. Its sequence must equal the number of
    /// chunks written so far. Returns the number of bytes written.
    pub fn write_chunk(&mut self, chunk: &OutputChunk) -> Result<usize> {
        let header = self.header.ok_or(ChunkzipError::InvalidFormat(
            "container header must be written first",
        ))?;
        if chunk.sequence != self.chunks_written {
            return Err(ChunkzipError::InvalidSequence {
                expected: self.chunks_written,
                actual: chunk.sequence,
            });
        }
        if self.chunks_written >= header.chunk_count() {
            return Err(ChunkzipError::InvalidFormat(
                "chunk count exceeds the container header",
            ));
        }

        let start = Instant::now();
        let written = match self.framing {
            ChunkFraming::LengthPrefixed => {
                let len = i32::try_from(chunk.payload.len()).map_err(|_| {
                    ChunkzipError::InvalidFormat("compressed chunk exceeds i32 range")
                })?;
                self.writer.write_all(&len.to_le_bytes())?;
                self.writer.write_all(&chunk.payload)?;
                LENGTH_PREFIX_SIZE + chunk.payload.len()
            }
            ChunkFraming::GzipMember => {
                let len = u32::try_from(chunk.payload.len()).map_err(|_| {
                    ChunkzipError::InvalidFormat("compressed chunk exceeds u32 range")
                })?;
                let member = MemberHeader::new(len).to_bytes();
                let footer = MemberFooter {
                    crc32: chunk.crc32,
                    isize: chunk.raw_len,
                }
                .to_bytes();
                self.writer.write_all(&member)?;
                self.writer.write_all(&chunk.payload)?;
                self.writer.write_all(&footer)?;
                member.len() + chunk.payload.len() + footer.len()
            }
        };

        self.chunks_written += 1;
        self.bytes_written += written as u64;
        telemetry::increment_counter(
            tags::METRIC_FORMAT_CHUNK_WRITE_COUNT,
            1,
            &[("subsystem", "format"), ("op", "write_chunk")],
        );
        telemetry::record_histogram(
            tags::METRIC_FORMAT_CHUNK_WRITE_LATENCY_US,
            duration_to_us(start.elapsed()),
            &[("subsystem", "format"), ("op", "write_chunk")],
        );
        Ok(written)
    }

    pub fn header(&self) -> Option<FileHeader> {
        self.header
    }

    pub fn chunks_written(&self) -> u64 {
        self.chunks_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ContainerReader;

    fn chunk(sequence: u64, payload: &[u8]) -> OutputChunk {
        OutputChunk::new(sequence, payload.to_vec(), 0xDEAD_BEEF, payload.len() as u32)
    }

    #[test]
    fn rejects_out_of_order_chunks() {
        let mut writer = ContainerWriter::new(Vec::new(), ChunkFraming::LengthPrefixed);
        writer.write_header(FileHeader::new(20, 10).unwrap()).unwrap();
        let err = writer.write_chunk(&chunk(1, b"abc")).unwrap_err();
        assert!(matches!(
            err,
            ChunkzipError::InvalidSequence {
                expected: 0,
                actual: 1
            }
        ));
    }

    #[test]
    fn rejects_chunk_before_header() {
        let mut writer = ContainerWriter::new(Vec::new(), ChunkFraming::LengthPrefixed);
        assert!(writer.write_chunk(&chunk(0, b"abc")).is_err());
    }

    #[test]
    fn member_records_read_back_with_trailer() {
        let mut writer = ContainerWriter::new(Vec::new(), ChunkFraming::GzipMember);
        writer.write_header(FileHeader::new(4, 4).unwrap()).unwrap();
        writer.write_chunk(&chunk(0, b"wxyz")).unwrap();
        let bytes = writer.into_inner();

        let mut reader = ContainerReader::open(bytes.as_slice(), ChunkFraming::GzipMember).unwrap();
        let first = reader.next_chunk().unwrap().unwrap();
        assert_eq!(first.payload.as_ref(), b"wxyz");
        let trailer = first.trailer.unwrap();
        assert_eq!(trailer.crc32, 0xDEAD_BEEF);
        assert_eq!(trailer.raw_len, 4);
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn truncated_record_is_format_error() {
        let mut writer = ContainerWriter::new(Vec::new(), ChunkFraming::LengthPrefixed);
        writer.write_header(FileHeader::new(10, 10).unwrap()).unwrap();
        writer.write_chunk(&chunk(0, b"0123456789")).unwrap();
        let mut bytes = writer.into_inner();
        bytes.truncate(bytes.len() - 3);

        let mut reader =
            ContainerReader::open(bytes.as_slice(), ChunkFraming::LengthPrefixed).unwrap();
        assert!(matches!(
            reader.next_chunk(),
            Err(ChunkzipError::InvalidFormat("truncated chunk record"))
        ));
    }
}
