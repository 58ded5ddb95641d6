use crate::ChunkzipError;

use super::ProgressEvent;

/// Receives notifications from a running pipeline.
///
/// Callbacks run on pipeline threads: progress on the writer, errors on
/// whichever stage failed, completion on the thread that called
/// [`Pipeline::process`](super::Pipeline::process).
pub trait PipelineObserver: Send + Sync {
    fn on_progress(&self, _event: ProgressEvent) {}

    /// Called once per run, only when it was not cancelled.
    fn on_completed(&self) {}

    /// Called once per run with the first fatal error.
    fn on_error(&self, _error: &ChunkzipError) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Observer that forwards progress events to a closure.
pub struct FnObserver<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    on_progress: F,
}

impl<F> FnObserver<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    pub fn new(on_progress: F) -> Self {
        Self { on_progress }
    }
}

impl<F> PipelineObserver for FnObserver<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        (self.on_progress)(event);
    }
}
