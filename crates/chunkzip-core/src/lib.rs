pub mod codec;
pub mod core;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod telemetry;
pub mod types;

pub use codec::{ChunkCodec, DeflateCodec, EncodedChunk, GzipCodec};
pub use core::{
    BoundedChunkQueue, ChunkProcessor, ChunkReceiver, ChunkSender, MemoryGovernor,
    OrderedResultBuffer, PoolRuntimeSnapshot, QueuePop, TakeOutcome, WorkerPool, WorkerPoolHandle,
    WorkerRuntimeSnapshot,
};
pub use error::{ChunkzipError, ErrorKind};
pub use format::{ChunkFraming, ContainerReader, ContainerWriter, FileHeader};
pub use pipeline::{
    FnObserver, NoopObserver, Pipeline, PipelineObserver, PipelineOptions, PipelineOutcome,
    PipelineState, PipelineStats, ProgressEvent,
};
pub use telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
pub use types::{ChunkTrailer, InputChunk, OutputChunk, PipelineMode, Result};
