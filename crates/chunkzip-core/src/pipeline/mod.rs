//! Reader, worker and writer stages wired into one run.
//!
//! A [`Pipeline`] is created from [`PipelineOptions`], which opens both files
//! and rejects bad configuration up front. [`Pipeline::process`] then runs
//! one reader thread, a pool of worker threads and one writer thread until
//! the output is complete or the run is cancelled. [`Pipeline::cancel`] may be
//! called from any other thread, typically through an `Arc<Pipeline>`.

mod context;
mod observer;
mod reader;
mod types;
mod worker;
mod writer;

use std::fs::File;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use crate::codec::ChunkCodec;
use crate::core::{
    BoundedChunkQueue, MemoryGovernor, OrderedResultBuffer, PoolRuntimeSnapshot, WorkerPool,
    WorkerPoolHandle, lock_unpoisoned,
};
use crate::format::FileHeader;
use crate::telemetry::{self, tags};
use crate::types::{PipelineMode, duration_to_us};
use crate::{ChunkzipError, Result};

use context::PipelineContext;
use reader::{ChunkSource, ReaderReport, ReaderStage};
use worker::WorkerStage;
use writer::{WriterReport, WriterStage};

pub use observer::{FnObserver, NoopObserver, PipelineObserver};
pub use types::{
    DEFAULT_MEMORY_LIMIT, DEFAULT_POLL_INTERVAL, PipelineOptions, PipelineOutcome, PipelineState,
    PipelineStats, ProgressEvent,
};

struct PipelineFiles {
    input: File,
    output: File,
    input_len: u64,
}

struct RunHandles {
    reader: JoinHandle<ReaderReport>,
    workers: WorkerPoolHandle,
    writer: JoinHandle<WriterReport>,
}

/// Parallel chunked compressor or decompressor for one input file.
pub struct Pipeline {
    options: PipelineOptions,
    codec: Arc<dyn ChunkCodec>,
    context: Arc<PipelineContext>,
    files: Mutex<Option<PipelineFiles>>,
}

impl Pipeline {
    /// Validates `options`, opens the input and creates the output.
    ///
    /// # Errors
    /// [`ChunkzipError::Configuration`] for invalid options, an unreadable
    /// input or an output that cannot be created.
    pub fn create(options: PipelineOptions) -> Result<Self> {
        options.validate()?;

        let input = File::open(&options.input).map_err(|error| {
            ChunkzipError::Configuration(format!(
                "cannot open input '{}': {error}",
                options.input.display()
            ))
        })?;
        let metadata = input.metadata().map_err(|error| {
            ChunkzipError::Configuration(format!(
                "cannot stat input '{}': {error}",
                options.input.display()
            ))
        })?;
        if !metadata.is_file() {
            return Err(ChunkzipError::Configuration(format!(
                "input '{}' is not a regular file",
                options.input.display()
            )));
        }
        let output = File::create(&options.output).map_err(|error| {
            ChunkzipError::Configuration(format!(
                "cannot create output '{}': {error}",
                options.output.display()
            ))
        })?;

        let codec = options.framing.default_codec(options.level);
        Ok(Self {
            options,
            codec,
            context: Arc::new(PipelineContext::new(Arc::new(NoopObserver))),
            files: Mutex::new(Some(PipelineFiles {
                input,
                output,
                input_len: metadata.len(),
            })),
        })
    }

    /// Replaces the observer receiving progress, completion and errors.
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        let context = PipelineContext::new(observer);
        if self.context.is_cancelled() {
            context.request_cancel();
        }
        self.context = Arc::new(context);
        self
    }

    /// Replaces the codec chosen from the configured framing.
    pub fn with_codec(mut self, codec: Arc<dyn ChunkCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn state(&self) -> PipelineState {
        self.context.state()
    }

    /// Stage threads currently alive.
    pub fn live_threads(&self) -> usize {
        self.context.live()
    }

    /// Runs the pipeline to completion or cancellation.
    ///
    /// Stage errors do not surface as `Err`: they cancel the run and come
    /// back as [`PipelineOutcome::Cancelled`] with the first error as cause.
    ///
    /// # Errors
    /// [`ChunkzipError::State`] when called more than once.
    pub fn process(&self) -> Result<PipelineOutcome> {
        self.context.begin()?;
        let started = Instant::now();
        telemetry::increment_counter(
            tags::METRIC_PIPELINE_RUN_COUNT,
            1,
            &[("mode", self.options.mode.as_str())],
        );
        tracing::info!(
            target: tags::TARGET_PIPELINE,
            mode = self.options.mode.as_str(),
            input = %self.options.input.display(),
            output = %self.options.output.display(),
            chunk_size = self.options.chunk_size,
            memory_limit = self.options.memory_limit,
            workers = self.options.workers,
            framing = self.options.framing.as_str(),
            codec = self.codec.name(),
            "pipeline started"
        );

        let files = lock_unpoisoned(&self.files).take();
        let Some(files) = files else {
            self.context.finish(PipelineState::Cancelled);
            return Err(ChunkzipError::State("pipeline files are no longer available"));
        };
        if self.context.is_cancelled() {
            return Ok(self.conclude(started, None));
        }

        let run = self.run(files);
        Ok(self.conclude(started, run))
    }

    /// Stops the run and waits until every stage thread has exited.
    ///
    /// Safe to call before [`process`](Self::process) (the run then ends
    /// immediately) and from observer callbacks, where it only raises the
    /// flag without waiting.
    pub fn cancel(&self) {
        if !self.context.is_cancelled() {
            telemetry::increment_counter(tags::METRIC_PIPELINE_CANCEL_COUNT, 1, &[]);
            tracing::info!(target: tags::TARGET_PIPELINE, "cancellation requested");
        }
        self.context.request_cancel();
        if context::on_pipeline_thread() {
            return;
        }
        self.context.wait_until_idle();
    }

    fn run(&self, files: PipelineFiles) -> Option<(FileHeader, RunTotals)> {
        let (source, header) = match self.open_source(files.input, files.input_len) {
            Ok(opened) => opened,
            Err(error) => {
                self.context.fail("reader", error);
                return None;
            }
        };

        let governor = Arc::new(MemoryGovernor::new(
            self.options.memory_limit,
            self.options.poll_interval,
        ));
        let buffer = Arc::new(OrderedResultBuffer::new());

        let handles = match self.launch(source, header, files.output, &governor, &buffer) {
            Ok(handles) => handles,
            Err(error) => {
                self.context.fail("pipeline", error);
                buffer.close();
                self.context.wait_until_idle();
                return None;
            }
        };

        self.context.wait_write_complete();
        let totals = self.join(handles, &governor);
        Some((header, totals))
    }

    fn open_source(&self, input: File, input_len: u64) -> Result<(ChunkSource, FileHeader)> {
        match self.options.mode {
            PipelineMode::Compress => {
                let header = FileHeader::new(input_len, self.options.chunk_size)?;
                Ok((ChunkSource::plain(input, header), header))
            }
            PipelineMode::Decompress => {
                let source = ChunkSource::container(input, self.options.framing)?;
                let header = source
                    .header()
                    .ok_or(ChunkzipError::State("container source without header"))?;
                tracing::debug!(
                    target: tags::TARGET_READER,
                    uncompressed_length = header.uncompressed_length,
                    chunk_size = header.chunk_size,
                    chunks = header.chunk_count(),
                    "container header read"
                );
                Ok((source, header))
            }
        }
    }

    fn launch(
        &self,
        source: ChunkSource,
        header: FileHeader,
        output: File,
        governor: &Arc<MemoryGovernor>,
        buffer: &Arc<OrderedResultBuffer>,
    ) -> Result<RunHandles> {
        let poll = self.options.poll_interval;
        let (sender, receiver) =
            BoundedChunkQueue::new(self.options.workers.saturating_mul(2)).into_parts();

        let writer = WriterStage::new(
            self.options.mode,
            header,
            output,
            self.options.framing,
            Arc::clone(&self.context),
            Arc::clone(governor),
            Arc::clone(buffer),
            poll,
        );
        let writer = self.context.spawn_stage("writer", move || writer.run())?;

        let stage = Arc::new(WorkerStage::new(
            self.options.mode,
            header,
            Arc::clone(&self.codec),
            Arc::clone(&self.context),
            Arc::clone(governor),
            Arc::clone(buffer),
        ));
        let workers = WorkerPool::new(self.options.workers, self.options.mode.as_str(), poll)
            .spawn(receiver, Arc::clone(self.context.cancel_flag()), stage)?;

        let reader = ReaderStage::new(
            Arc::clone(&self.context),
            Arc::clone(governor),
            sender,
            source,
            poll,
        );
        let reader = self.context.spawn_stage("reader", move || reader.run())?;

        Ok(RunHandles {
            reader,
            workers,
            writer,
        })
    }

    fn join(&self, handles: RunHandles, governor: &MemoryGovernor) -> RunTotals {
        let reader = handles.reader.join().unwrap_or_else(|_| {
            self.context
                .fail("reader", ChunkzipError::State("reader thread panicked"));
            ReaderReport::default()
        });
        let runtime = handles.workers.join().unwrap_or_else(|error| {
            self.context.fail("worker", error);
            PoolRuntimeSnapshot::default()
        });
        let writer = handles.writer.join().unwrap_or_else(|_| {
            self.context
                .fail("writer", ChunkzipError::State("writer thread panicked"));
            WriterReport::default()
        });

        RunTotals {
            reader,
            writer,
            runtime,
            peak_resident_bytes: governor.peak(),
        }
    }

    fn conclude(&self, started: Instant, run: Option<(FileHeader, RunTotals)>) -> PipelineOutcome {
        let elapsed = started.elapsed();
        telemetry::record_histogram(
            tags::METRIC_PIPELINE_RUN_LATENCY_US,
            duration_to_us(elapsed),
            &[("mode", self.options.mode.as_str())],
        );

        let completed = match run {
            Some((header, totals)) if !self.context.is_cancelled() => Some((header, totals)),
            _ => None,
        };
        let Some((header, totals)) = completed else {
            self.context.finish(PipelineState::Cancelled);
            let cause = self.context.take_error();
            tracing::info!(
                target: tags::TARGET_PIPELINE,
                elapsed_us = duration_to_us(elapsed),
                failed = cause.is_some(),
                "pipeline cancelled"
            );
            return PipelineOutcome::Cancelled { cause };
        };

        let stats = PipelineStats {
            mode: self.options.mode,
            framing: self.options.framing,
            codec: self.codec.name(),
            chunk_size: header.chunk_size as usize,
            chunks: totals.writer.chunks,
            input_bytes: totals.reader.input_bytes,
            output_bytes: totals.writer.output_bytes,
            peak_resident_bytes: totals.peak_resident_bytes,
            elapsed,
            workers: totals.runtime.workers,
        };
        self.context.finish(PipelineState::Completed);
        tracing::info!(
            target: tags::TARGET_PIPELINE,
            chunks = stats.chunks,
            input_bytes = stats.input_bytes,
            output_bytes = stats.output_bytes,
            elapsed_us = duration_to_us(elapsed),
            "pipeline completed"
        );
        self.context.observer().on_completed();
        PipelineOutcome::Completed(stats)
    }
}

struct RunTotals {
    reader: ReaderReport,
    writer: WriterReport,
    runtime: PoolRuntimeSnapshot,
    peak_resident_bytes: usize,
}
