use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::{DEFAULT_LEVEL, MAX_LEVEL};
use crate::core::WorkerRuntimeSnapshot;
use crate::format::{ChunkFraming, DEFAULT_CHUNK_SIZE};
use crate::types::PipelineMode;
use crate::{ChunkzipError, Result};

/// Memory budget used when none is configured (500 MiB).
pub const DEFAULT_MEMORY_LIMIT: usize = 500 * 1024 * 1024;
/// Slice length of every bounded wait inside the pipeline.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Construction config for a [`Pipeline`](super::Pipeline).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOptions {
    pub mode: PipelineMode,
    pub input: PathBuf,
    pub output: PathBuf,
    /// Uncompressed bytes per chunk. Ignored on decompress, where the
    /// container header decides.
    pub chunk_size: usize,
    /// Budget for bytes read but not yet written.
    pub memory_limit: usize,
    pub workers: usize,
    pub framing: ChunkFraming,
    /// DEFLATE level, 0 to 9.
    pub level: u32,
    pub poll_interval: Duration,
}

impl Default for PipelineOptions {
    /// Compress mode with every tunable at its default; paths are empty.
    fn default() -> Self {
        Self::new(PipelineMode::Compress, PathBuf::new(), PathBuf::new())
    }
}

impl PipelineOptions {
    pub fn new(mode: PipelineMode, input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            input: input.into(),
            output: output.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            workers: num_cpus::get().max(1),
            framing: ChunkFraming::default(),
            level: DEFAULT_LEVEL,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn compress(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self::new(PipelineMode::Compress, input, output)
    }

    pub fn decompress(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self::new(PipelineMode::Decompress, input, output)
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_memory_limit(mut self, memory_limit: usize) -> Self {
        self.memory_limit = memory_limit;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_framing(mut self, framing: ChunkFraming) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Checks every value that does not need the filesystem.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ChunkzipError::Configuration(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_size > i32::MAX as usize {
            return Err(ChunkzipError::Configuration(format!(
                "chunk size {} exceeds the container limit of {} bytes",
                self.chunk_size,
                i32::MAX
            )));
        }
        if self.memory_limit == 0 {
            return Err(ChunkzipError::Configuration(
                "memory limit must be greater than zero".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(ChunkzipError::Configuration(
                "worker count must be greater than zero".to_string(),
            ));
        }
        if self.level > MAX_LEVEL {
            return Err(ChunkzipError::Configuration(format!(
                "compression level {} is outside 0..={MAX_LEVEL}",
                self.level
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(ChunkzipError::Configuration(
                "poll interval must be non-zero".to_string(),
            ));
        }
        if same_path(&self.input, &self.output) {
            return Err(ChunkzipError::Configuration(
                "input and output must be different files".to_string(),
            ));
        }
        Ok(())
    }
}

fn same_path(left: &Path, right: &Path) -> bool {
    match (left.canonicalize(), right.canonicalize()) {
        (Ok(left), Ok(right)) => left == right,
        _ => left == right,
    }
}

/// Lifecycle of a pipeline. Every run moves `Idle -> Running` and ends in
/// one of the two terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl PipelineState {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Completed => 2,
            Self::Cancelled => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Completed,
            _ => Self::Cancelled,
        }
    }
}

/// Progress after the writer emits a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// `100 * chunks_written / chunks_total`, rounded down.
    pub percentage: u8,
    pub chunks_written: u64,
    pub chunks_total: u64,
}

impl ProgressEvent {
    pub(crate) fn new(chunks_written: u64, chunks_total: u64) -> Self {
        let percentage = if chunks_total == 0 {
            100
        } else {
            (u128::from(chunks_written) * 100 / u128::from(chunks_total)).min(100) as u8
        };
        Self {
            percentage,
            chunks_written,
            chunks_total,
        }
    }
}

/// Totals for a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub mode: PipelineMode,
    pub framing: ChunkFraming,
    pub codec: &'static str,
    pub chunk_size: usize,
    pub chunks: u64,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub peak_resident_bytes: usize,
    pub elapsed: Duration,
    pub workers: Vec<WorkerRuntimeSnapshot>,
}

impl PipelineStats {
    /// Output size relative to input size; 1.0 for empty input.
    pub fn ratio(&self) -> f64 {
        if self.input_bytes == 0 {
            1.0
        } else {
            self.output_bytes as f64 / self.input_bytes as f64
        }
    }
}

/// How a call to [`Pipeline::process`](super::Pipeline::process) ended.
#[derive(Debug)]
pub enum PipelineOutcome {
    Completed(PipelineStats),
    /// Stopped by [`Pipeline::cancel`](super::Pipeline::cancel) (`cause` is
    /// `None`) or by the first error any stage hit.
    Cancelled { cause: Option<ChunkzipError> },
}

impl PipelineOutcome {
    /// Process exit code: 0 when completed, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed(_) => 0,
            Self::Cancelled { .. } => 1,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn stats(&self) -> Option<&PipelineStats> {
        match self {
            Self::Completed(stats) => Some(stats),
            Self::Cancelled { .. } => None,
        }
    }

    pub fn cause(&self) -> Option<&ChunkzipError> {
        match self {
            Self::Completed(_) => None,
            Self::Cancelled { cause } => cause.as_ref(),
        }
    }
}
