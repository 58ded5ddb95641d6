use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::core::lock_unpoisoned;
use crate::telemetry::tags;
use crate::{ChunkzipError, Result};

use super::{PipelineObserver, PipelineState};

thread_local! {
    static ON_PIPELINE_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread was spawned by a pipeline.
pub(crate) fn on_pipeline_thread() -> bool {
    ON_PIPELINE_THREAD.with(Cell::get)
}

pub(crate) fn mark_pipeline_thread() {
    ON_PIPELINE_THREAD.with(|flag| flag.set(true));
}

/// State shared by every stage of one pipeline run.
pub(crate) struct PipelineContext {
    cancel: Arc<AtomicBool>,
    state: AtomicU8,
    read_complete: AtomicBool,
    write_complete: AtomicBool,
    live: Mutex<usize>,
    changed: Condvar,
    failed: AtomicBool,
    first_error: Mutex<Option<ChunkzipError>>,
    observer: Arc<dyn PipelineObserver>,
}

impl PipelineContext {
    pub(crate) fn new(observer: Arc<dyn PipelineObserver>) -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
            state: AtomicU8::new(PipelineState::Idle.to_u8()),
            read_complete: AtomicBool::new(false),
            write_complete: AtomicBool::new(false),
            live: Mutex::new(0),
            changed: Condvar::new(),
            failed: AtomicBool::new(false),
            first_error: Mutex::new(None),
            observer,
        }
    }

    pub(crate) fn observer(&self) -> &dyn PipelineObserver {
        self.observer.as_ref()
    }

    pub(crate) fn cancel_flag(&self) -> &Arc<AtomicBool> {
        &self.cancel
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub(crate) fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Release);
        self.changed.notify_all();
    }

    pub(crate) fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves `Idle -> Running`. Fails for every later call.
    pub(crate) fn begin(&self) -> Result<()> {
        self.state
            .compare_exchange(
                PipelineState::Idle.to_u8(),
                PipelineState::Running.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|_| ChunkzipError::State("pipeline has already been processed"))
    }

    pub(crate) fn finish(&self, state: PipelineState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }

    /// Records a fatal error and cancels the run. Only the first error is
    /// kept and reported to the observer; later ones are logged.
    pub(crate) fn fail(&self, stage: &'static str, error: ChunkzipError) {
        self.request_cancel();

        if self.failed.swap(true, Ordering::AcqRel) {
            tracing::debug!(
                target: tags::TARGET_PIPELINE,
                stage,
                error = %error,
                "suppressed error after cancellation"
            );
            return;
        }

        tracing::error!(
            target: tags::TARGET_PIPELINE,
            stage,
            error = %error,
            "pipeline stage failed"
        );
        // The observer may call back into `cancel`, so no lock is held here.
        self.observer.on_error(&error);
        *lock_unpoisoned(&self.first_error) = Some(error);
    }

    pub(crate) fn take_error(&self) -> Option<ChunkzipError> {
        lock_unpoisoned(&self.first_error).take()
    }

    pub(crate) fn latch_read_complete(&self) {
        self.read_complete.store(true, Ordering::Release);
        self.changed.notify_all();
    }

    pub(crate) fn is_read_complete(&self) -> bool {
        self.read_complete.load(Ordering::Acquire)
    }

    pub(crate) fn latch_write_complete(&self) {
        // Taking the lock orders the store with waiters checking the latch.
        let _live = lock_unpoisoned(&self.live);
        self.write_complete.store(true, Ordering::Release);
        self.changed.notify_all();
    }

    pub(crate) fn is_write_complete(&self) -> bool {
        self.write_complete.load(Ordering::Acquire)
    }

    /// Counts one unit of live work; the returned guard releases it.
    pub(crate) fn enter(self: &Arc<Self>) -> LiveGuard {
        *lock_unpoisoned(&self.live) += 1;
        LiveGuard {
            context: Arc::clone(self),
        }
    }

    pub(crate) fn live(&self) -> usize {
        *lock_unpoisoned(&self.live)
    }

    fn exit(&self) {
        let mut live = lock_unpoisoned(&self.live);
        *live = live.saturating_sub(1);
        drop(live);
        self.changed.notify_all();
    }

    pub(crate) fn wait_write_complete(&self) {
        let mut live = lock_unpoisoned(&self.live);
        while !self.is_write_complete() {
            live = match self.changed.wait(live) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    pub(crate) fn wait_until_idle(&self) {
        let mut live = lock_unpoisoned(&self.live);
        while *live > 0 {
            live = match self.changed.wait(live) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Spawns a named stage thread counted as live until it returns.
    pub(crate) fn spawn_stage<T, F>(self: &Arc<Self>, name: &str, body: F) -> Result<JoinHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let guard = self.enter();
        thread::Builder::new()
            .name(format!("chunkzip-{name}"))
            .spawn(move || {
                mark_pipeline_thread();
                let _guard = guard;
                body()
            })
            .map_err(|error| {
                ChunkzipError::Io(error).with_context(format!("failed to spawn {name} thread"))
            })
    }
}

/// Marks one unit of pipeline work as live until dropped.
pub(crate) struct LiveGuard {
    context: Arc<PipelineContext>,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.context.exit();
    }
}
