/// Tracing target for the reader stage.
pub const TARGET_READER: &str = "chunkzip::reader";
/// Tracing target for worker threads.
pub const TARGET_WORKER: &str = "chunkzip::worker";
/// Tracing target for the writer stage.
pub const TARGET_WRITER: &str = "chunkzip::writer";
/// Tracing target for pipeline lifecycle events.
pub const TARGET_PIPELINE: &str = "chunkzip::pipeline";
/// Tracing target for memory governor waits.
pub const TARGET_GOVERNOR: &str = "chunkzip::governor";

pub const METRIC_READER_CHUNK_COUNT: &str = "chunkzip.reader.chunk.count";
pub const METRIC_READER_BYTES: &str = "chunkzip.reader.bytes";
pub const METRIC_WRITER_CHUNK_COUNT: &str = "chunkzip.writer.chunk.count";
pub const METRIC_WRITER_BYTES: &str = "chunkzip.writer.bytes";
pub const METRIC_WRITER_WAIT_US: &str = "chunkzip.writer.wait_us";

pub const METRIC_GOVERNOR_RESIDENT_BYTES: &str = "chunkzip.governor.resident_bytes";
pub const METRIC_GOVERNOR_WAIT_COUNT: &str = "chunkzip.governor.wait.count";
pub const METRIC_GOVERNOR_WAIT_US: &str = "chunkzip.governor.wait_us";

pub const METRIC_FORMAT_CHUNK_WRITE_COUNT: &str = "chunkzip.format.chunk_write.count";
pub const METRIC_FORMAT_CHUNK_WRITE_LATENCY_US: &str = "chunkzip.format.chunk_write.latency_us";

pub const METRIC_CODEC_ENCODE_LATENCY_US: &str = "chunkzip.codec.encode.latency_us";
pub const METRIC_CODEC_DECODE_LATENCY_US: &str = "chunkzip.codec.decode.latency_us";

pub const METRIC_WORKER_TASK_COUNT: &str = "chunkzip.worker.task.count";
pub const METRIC_WORKER_TASK_START_COUNT: &str = "chunkzip.worker.task.start.count";
pub const METRIC_WORKER_TASK_FINISH_COUNT: &str = "chunkzip.worker.task.finish.count";
pub const METRIC_WORKER_TASK_FAIL_COUNT: &str = "chunkzip.worker.task.fail.count";
pub const METRIC_WORKER_TASK_LATENCY_US: &str = "chunkzip.worker.task.latency_us";
pub const METRIC_WORKER_QUEUE_DEPTH: &str = "chunkzip.worker.queue.depth";
pub const METRIC_WORKER_QUEUE_DEPTH_HIST: &str = "chunkzip.worker.queue.depth.hist";
pub const METRIC_WORKER_ACTIVE_COUNT: &str = "chunkzip.worker.active.count";

pub const METRIC_PIPELINE_RUN_COUNT: &str = "chunkzip.pipeline.run.count";
pub const METRIC_PIPELINE_CANCEL_COUNT: &str = "chunkzip.pipeline.cancel.count";
pub const METRIC_PIPELINE_RUN_LATENCY_US: &str = "chunkzip.pipeline.run.latency_us";
