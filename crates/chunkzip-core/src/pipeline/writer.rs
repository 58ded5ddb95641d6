use std::fs::File;
use std::io::{BufWriter, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::worker_pool::panic_message;
use crate::core::{MemoryGovernor, OrderedResultBuffer, TakeOutcome};
use crate::format::{ChunkFraming, ContainerWriter, FileHeader};
use crate::telemetry::{self, tags};
use crate::types::{OutputChunk, PipelineMode, duration_to_us};
use crate::{ChunkzipError, Result};

use super::ProgressEvent;
use super::context::PipelineContext;

const WRITE_BUFFER_SIZE: usize = 256 * 1024;

enum ChunkSink {
    Container(ContainerWriter<BufWriter<File>>),
    Plain { output: BufWriter<File>, bytes: u64 },
}

impl ChunkSink {
    fn write(&mut self, chunk: &OutputChunk) -> Result<()> {
        match self {
            Self::Container(writer) => {
                writer.write_chunk(chunk)?;
            }
            Self::Plain { output, bytes } => {
                output.write_all(&chunk.payload)?;
                *bytes += chunk.payload.len() as u64;
            }
        }
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        match self {
            Self::Container(writer) => writer.bytes_written(),
            Self::Plain { bytes, .. } => *bytes,
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self {
            Self::Container(writer) => writer.flush(),
            Self::Plain { output, .. } => Ok(output.flush()?),
        }
    }
}

/// Totals reported when the writer stage exits.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct WriterReport {
    pub(crate) chunks: u64,
    pub(crate) output_bytes: u64,
}

struct WriteCompleteLatch(Arc<PipelineContext>);

impl Drop for WriteCompleteLatch {
    fn drop(&mut self) {
        self.0.latch_write_complete();
    }
}

/// Stage that drains the ordered buffer into the output file in sequence.
pub(crate) struct WriterStage {
    mode: PipelineMode,
    header: FileHeader,
    sink: ChunkSink,
    context: Arc<PipelineContext>,
    governor: Arc<MemoryGovernor>,
    buffer: Arc<OrderedResultBuffer>,
    poll: Duration,
}

impl WriterStage {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        mode: PipelineMode,
        header: FileHeader,
        output: File,
        framing: ChunkFraming,
        context: Arc<PipelineContext>,
        governor: Arc<MemoryGovernor>,
        buffer: Arc<OrderedResultBuffer>,
        poll: Duration,
    ) -> Self {
        let output = BufWriter::with_capacity(WRITE_BUFFER_SIZE, output);
        let sink = match mode {
            PipelineMode::Compress => ChunkSink::Container(ContainerWriter::new(output, framing)),
            PipelineMode::Decompress => ChunkSink::Plain { output, bytes: 0 },
        };
        Self {
            mode,
            header,
            sink,
            context,
            governor,
            buffer,
            poll,
        }
    }

    /// Writes chunks until every chunk is out or the run is cancelled, then
    /// latches "write complete". The latch also fires if this stage unwinds.
    pub(crate) fn run(mut self) -> WriterReport {
        let _latch = WriteCompleteLatch(Arc::clone(&self.context));
        let mut report = WriterReport::default();

        let drained = catch_unwind(AssertUnwindSafe(|| self.drain(&mut report)))
            .unwrap_or_else(|payload| {
                Err(ChunkzipError::Other(anyhow::anyhow!(
                    "writer panicked after {} chunks: {}",
                    report.chunks,
                    panic_message(payload.as_ref())
                )))
            });
        if let Err(error) = drained {
            self.context.fail("writer", error);
        }
        report.output_bytes = self.sink.bytes_written();

        tracing::debug!(
            target: tags::TARGET_WRITER,
            chunks = report.chunks,
            output_bytes = report.output_bytes,
            read_complete = self.context.is_read_complete(),
            pending = self.buffer.pending_len(),
            cancelled = self.context.is_cancelled(),
            "writer finished"
        );
        report
    }

    fn drain(&mut self, report: &mut WriterReport) -> Result<()> {
        let total = self.header.chunk_count();
        if let ChunkSink::Container(writer) = &mut self.sink {
            writer.write_header(self.header)?;
        }

        let mut waiting_since = Instant::now();
        loop {
            if self.context.is_cancelled() {
                return Ok(());
            }

            let chunk = match self.buffer.take_next(self.poll) {
                TakeOutcome::Ready(chunk) => chunk,
                TakeOutcome::Pending => continue,
                TakeOutcome::Exhausted => break,
            };
            telemetry::record_histogram(
                tags::METRIC_WRITER_WAIT_US,
                duration_to_us(waiting_since.elapsed()),
                &[("subsystem", "writer")],
            );

            self.sink.write(&chunk)?;
            self.governor.release(chunk.len());
            report.chunks += 1;

            telemetry::increment_counter(
                tags::METRIC_WRITER_CHUNK_COUNT,
                1,
                &[("subsystem", "writer")],
            );
            telemetry::increment_counter(
                tags::METRIC_WRITER_BYTES,
                chunk.len() as u64,
                &[("subsystem", "writer")],
            );
            tracing::debug!(
                target: tags::TARGET_WRITER,
                sequence = chunk.sequence,
                bytes = chunk.len(),
                "chunk written"
            );

            self.context
                .observer()
                .on_progress(ProgressEvent::new(report.chunks, total));
            waiting_since = Instant::now();
        }

        if self.context.is_cancelled() {
            return Ok(());
        }
        self.sink.flush()?;

        if report.chunks != total {
            return Err(ChunkzipError::InvalidFormat(
                "chunk count written differs from the expected count",
            ));
        }
        if self.mode == PipelineMode::Decompress
            && self.sink.bytes_written() != self.header.uncompressed_length
        {
            return Err(ChunkzipError::InvalidFormat(
                "decompressed length does not match the container header",
            ));
        }
        Ok(())
    }
}
