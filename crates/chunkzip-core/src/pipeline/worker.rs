use std::sync::{Arc, Mutex};

use crate::codec::{self, ChunkCodec};
use crate::core::{ChunkProcessor, MemoryGovernor, OrderedResultBuffer, lock_unpoisoned};
use crate::format::FileHeader;
use crate::telemetry::tags;
use crate::types::{InputChunk, OutputChunk, PipelineMode};
use crate::{ChunkzipError, Result};

use super::context::{self, LiveGuard, PipelineContext};

/// Codec work run on every worker thread.
pub(crate) struct WorkerStage {
    mode: PipelineMode,
    header: FileHeader,
    codec: Arc<dyn ChunkCodec>,
    context: Arc<PipelineContext>,
    governor: Arc<MemoryGovernor>,
    buffer: Arc<OrderedResultBuffer>,
    live: Mutex<Option<LiveGuard>>,
}

impl WorkerStage {
    pub(crate) fn new(
        mode: PipelineMode,
        header: FileHeader,
        codec: Arc<dyn ChunkCodec>,
        context: Arc<PipelineContext>,
        governor: Arc<MemoryGovernor>,
        buffer: Arc<OrderedResultBuffer>,
    ) -> Self {
        let live = context.enter();
        Self {
            mode,
            header,
            codec,
            context,
            governor,
            buffer,
            live: Mutex::new(Some(live)),
        }
    }

    fn transform(&self, chunk: &InputChunk) -> Result<OutputChunk> {
        match self.mode {
            PipelineMode::Compress => {
                let encoded = codec::encode_chunk(self.codec.as_ref(), &chunk.payload)?;
                Ok(OutputChunk::new(
                    chunk.sequence,
                    encoded.payload,
                    encoded.crc32,
                    encoded.raw_len,
                ))
            }
            PipelineMode::Decompress => {
                let expected_len = self.header.chunk_len(chunk.sequence).ok_or(
                    ChunkzipError::InvalidFormat("chunk sequence beyond the header length"),
                )?;
                let raw = codec::decode_chunk(self.codec.as_ref(), &chunk.payload, expected_len)?;

                if let Some(trailer) = chunk.trailer {
                    let actual = crc32fast::hash(&raw);
                    if actual != trailer.crc32 {
                        return Err(ChunkzipError::ChecksumMismatch {
                            expected: trailer.crc32,
                            actual,
                        });
                    }
                    if raw.len() as u32 != trailer.raw_len {
                        return Err(ChunkzipError::Codec(format!(
                            "chunk {} length {} disagrees with its trailer ({})",
                            chunk.sequence,
                            raw.len(),
                            trailer.raw_len
                        )));
                    }
                }
                if raw.len() != expected_len {
                    return Err(ChunkzipError::InvalidFormat(
                        "chunk decodes to a length other than the header implies",
                    ));
                }
                Ok(OutputChunk::plain(chunk.sequence, raw))
            }
        }
    }
}

impl ChunkProcessor for WorkerStage {
    fn on_start(&self, _worker_id: usize) {
        context::mark_pipeline_thread();
    }

    fn process(&self, worker_id: usize, chunk: InputChunk) -> Result<()> {
        let output = self.transform(&chunk)?;
        let (sequence, input_len, output_len) = (chunk.sequence, chunk.len(), output.len());
        drop(chunk);

        self.governor.resize(input_len, output_len);
        self.buffer.insert(output)?;
        self.governor
            .throttle(|| self.buffer.has_next_ready(), self.context.cancel_flag());

        tracing::debug!(
            target: tags::TARGET_WORKER,
            worker_id,
            sequence,
            input_bytes = input_len,
            output_bytes = output_len,
            "chunk processed"
        );
        Ok(())
    }

    fn on_failure(&self, worker_id: usize, error: ChunkzipError) {
        tracing::warn!(target: tags::TARGET_WORKER, worker_id, error = %error, "worker stopped");
        self.context.fail("worker", error);
    }

    fn on_drained(&self) {
        self.buffer.close();
        let live = lock_unpoisoned(&self.live).take();
        drop(live);
    }
}
