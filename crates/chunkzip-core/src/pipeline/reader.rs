use std::fs::File;
use std::io::{BufReader, Read};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::core::{ChunkSender, MemoryGovernor};
use crate::format::{ChunkFraming, ContainerReader, FileHeader};
use crate::telemetry::{self, tags};
use crate::types::InputChunk;
use crate::{ChunkzipError, Result};

use super::context::PipelineContext;

const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Where the reader stage pulls chunks from.
pub(crate) enum ChunkSource {
    /// Plain input cut into fixed-size chunks.
    Plain {
        input: BufReader<File>,
        chunk_size: usize,
        remaining: u64,
        next_sequence: u64,
    },
    /// Container records, one chunk each.
    Container(ContainerReader<BufReader<File>>),
}

impl ChunkSource {
    pub(crate) fn plain(input: File, header: FileHeader) -> Self {
        Self::Plain {
            input: BufReader::with_capacity(READ_BUFFER_SIZE, input),
            chunk_size: header.chunk_size as usize,
            remaining: header.uncompressed_length,
            next_sequence: 0,
        }
    }

    /// Opens a container and validates its header before any chunk is read.
    pub(crate) fn container(input: File, framing: ChunkFraming) -> Result<Self> {
        let reader = ContainerReader::open(BufReader::with_capacity(READ_BUFFER_SIZE, input), framing)?;
        Ok(Self::Container(reader))
    }

    pub(crate) fn header(&self) -> Option<FileHeader> {
        match self {
            Self::Plain { .. } => None,
            Self::Container(reader) => Some(reader.header()),
        }
    }

    fn next_chunk(&mut self) -> Result<Option<InputChunk>> {
        match self {
            Self::Container(reader) => reader.next_chunk(),
            Self::Plain {
                input,
                chunk_size,
                remaining,
                next_sequence,
            } => {
                if *remaining == 0 {
                    return Ok(None);
                }

                let len = (*remaining).min(*chunk_size as u64) as usize;
                let mut payload = vec![0u8; len];
                input.read_exact(&mut payload).map_err(|error| {
                    ChunkzipError::Io(error).with_context("input ended before its reported length")
                })?;

                *remaining -= len as u64;
                let sequence = *next_sequence;
                *next_sequence += 1;
                Ok(Some(InputChunk::new(sequence, Bytes::from(payload))))
            }
        }
    }

    fn bytes_consumed(&self, chunk_bytes: u64) -> u64 {
        match self {
            Self::Plain { .. } => chunk_bytes,
            Self::Container(reader) => reader.bytes_read(),
        }
    }
}

/// Totals reported when the reader stage exits.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ReaderReport {
    pub(crate) chunks: u64,
    pub(crate) input_bytes: u64,
}

/// Sequential stage that frames the input into chunks and feeds the queue.
pub(crate) struct ReaderStage {
    context: Arc<PipelineContext>,
    governor: Arc<MemoryGovernor>,
    sender: ChunkSender,
    source: ChunkSource,
    poll: Duration,
}

impl ReaderStage {
    pub(crate) fn new(
        context: Arc<PipelineContext>,
        governor: Arc<MemoryGovernor>,
        sender: ChunkSender,
        source: ChunkSource,
        poll: Duration,
    ) -> Self {
        Self {
            context,
            governor,
            sender,
            source,
            poll,
        }
    }

    /// Reads until the input ends, an error occurs or the run is cancelled.
    /// The queue closes and "read complete" latches on every exit path.
    pub(crate) fn run(mut self) -> ReaderReport {
        let mut report = ReaderReport::default();
        let mut chunk_bytes = 0u64;

        if let Err(error) = self.pump(&mut report, &mut chunk_bytes) {
            self.context.fail("reader", error);
        }
        report.input_bytes = self.source.bytes_consumed(chunk_bytes);

        tracing::debug!(
            target: tags::TARGET_READER,
            chunks = report.chunks,
            input_bytes = report.input_bytes,
            cancelled = self.context.is_cancelled(),
            "reader finished"
        );

        let Self {
            context, sender, ..
        } = self;
        drop(sender);
        context.latch_read_complete();
        report
    }

    fn pump(&mut self, report: &mut ReaderReport, chunk_bytes: &mut u64) -> Result<()> {
        let cancel = Arc::clone(self.context.cancel_flag());
        while !self.context.is_cancelled() {
            let Some(chunk) = self.source.next_chunk()? else {
                return Ok(());
            };
            let len = chunk.len();
            let sequence = chunk.sequence;

            if !self.governor.admit(len, &cancel) {
                return Ok(());
            }
            if !self.sender.push(chunk, self.poll, &cancel) {
                self.governor.release(len);
                return Ok(());
            }

            report.chunks += 1;
            *chunk_bytes += len as u64;
            telemetry::increment_counter(
                tags::METRIC_READER_CHUNK_COUNT,
                1,
                &[("subsystem", "reader")],
            );
            telemetry::increment_counter(
                tags::METRIC_READER_BYTES,
                len as u64,
                &[("subsystem", "reader")],
            );
            tracing::debug!(target: tags::TARGET_READER, sequence, bytes = len, "chunk queued");
        }
        Ok(())
    }
}
