use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::core::chunk_queue::{ChunkReceiver, QueuePop};
use crate::telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
use crate::types::{InputChunk, duration_to_us};
use crate::{ChunkzipError, Result};

/// Per-chunk work run by every pool thread.
pub trait ChunkProcessor: Send + Sync + 'static {
    /// Runs on the worker thread before its first chunk.
    fn on_start(&self, _worker_id: usize) {}

    fn process(&self, worker_id: usize, chunk: InputChunk) -> Result<()>;

    /// Called once with the error that stopped `worker_id`.
    fn on_failure(&self, worker_id: usize, error: ChunkzipError);

    /// Called once by the last worker to leave its loop.
    fn on_drained(&self) {}
}

/// Fixed set of threads pulling chunks from a [`ChunkReceiver`].
pub struct WorkerPool {
    num_workers: usize,
    task_kind: &'static str,
    poll: Duration,
    telemetry: Arc<dyn WorkerTelemetry>,
}

impl WorkerPool {
    pub fn new(num_workers: usize, task_kind: &'static str, poll: Duration) -> Self {
        Self::with_telemetry(num_workers, task_kind, poll, Arc::new(DefaultWorkerTelemetry))
    }

    pub fn with_telemetry(
        num_workers: usize,
        task_kind: &'static str,
        poll: Duration,
        telemetry: Arc<dyn WorkerTelemetry>,
    ) -> Self {
        Self {
            num_workers: num_workers.max(1),
            task_kind,
            poll,
            telemetry,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Starts the workers. Each one exits when `cancel` is set, when the
    /// queue is closed and drained, or after its processor fails.
    pub fn spawn<P: ChunkProcessor>(
        &self,
        queue: ChunkReceiver,
        cancel: Arc<AtomicBool>,
        processor: Arc<P>,
    ) -> Result<WorkerPoolHandle> {
        let state = Arc::new(PoolState::new(
            self.num_workers,
            self.task_kind,
            self.poll,
            Arc::clone(&self.telemetry),
            cancel,
        ));

        let mut handles = Vec::with_capacity(self.num_workers);
        for worker_id in 0..self.num_workers {
            let worker_state = Arc::clone(&state);
            let worker_queue = queue.clone();
            let worker_processor = Arc::clone(&processor);
            let spawned = thread::Builder::new()
                .name(format!("chunkzip-worker-{worker_id}"))
                .spawn(move || {
                    run_worker_loop(worker_id, worker_state, worker_queue, worker_processor);
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    // Workers that never started still count as exited.
                    let missing = self.num_workers - worker_id;
                    state.cancel.store(true, Ordering::Release);
                    if state.live.fetch_sub(missing, Ordering::AcqRel) == missing {
                        processor.on_drained();
                    }
                    let mut handle = WorkerPoolHandle { state, handles };
                    let _ = handle.join_workers();
                    return Err(ChunkzipError::Io(error).with_context("failed to spawn worker"));
                }
            }
        }

        Ok(WorkerPoolHandle { state, handles })
    }
}

struct PoolState {
    task_kind: &'static str,
    poll: Duration,
    telemetry: Arc<dyn WorkerTelemetry>,
    cancel: Arc<AtomicBool>,
    started_at: Instant,
    live: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    task_counts: Vec<AtomicUsize>,
    started_offsets_us: Vec<AtomicU64>,
    stopped_offsets_us: Vec<AtomicU64>,
    busy_us: Vec<AtomicU64>,
}

impl PoolState {
    fn new(
        num_workers: usize,
        task_kind: &'static str,
        poll: Duration,
        telemetry: Arc<dyn WorkerTelemetry>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        let counters = || (0..num_workers).map(|_| AtomicU64::new(0)).collect::<Vec<_>>();
        Self {
            task_kind,
            poll,
            telemetry,
            cancel,
            started_at: Instant::now(),
            live: AtomicUsize::new(num_workers),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            task_counts: (0..num_workers).map(|_| AtomicUsize::new(0)).collect(),
            started_offsets_us: counters(),
            stopped_offsets_us: counters(),
            busy_us: counters(),
        }
    }

    /// Offsets are stored plus one so that zero means "not recorded".
    fn mark(&self, slots: &[AtomicU64], worker_id: usize) {
        let offset_us = duration_to_us(self.started_at.elapsed());
        slots[worker_id].store(offset_us.saturating_add(1), Ordering::Release);
    }
}

/// Per-worker runtime metrics.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerRuntimeSnapshot {
    pub worker_id: usize,
    pub tasks_completed: usize,
    pub uptime: Duration,
    pub busy: Duration,
    pub idle: Duration,
    pub utilization: f64,
}

/// Runtime metrics for the whole pool.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolRuntimeSnapshot {
    pub elapsed: Duration,
    pub completed: usize,
    pub failed: usize,
    pub live_workers: usize,
    pub workers: Vec<WorkerRuntimeSnapshot>,
}

/// Handle over running pool threads.
pub struct WorkerPoolHandle {
    state: Arc<PoolState>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPoolHandle {
    /// Workers that have not yet left their loop.
    pub fn live_workers(&self) -> usize {
        self.state.live.load(Ordering::Acquire)
    }

    pub fn completed_count(&self) -> usize {
        self.state.completed.load(Ordering::Acquire)
    }

    pub fn runtime_snapshot(&self) -> PoolRuntimeSnapshot {
        let state = &self.state;
        let elapsed = state.started_at.elapsed();
        let elapsed_us = duration_to_us(elapsed);

        let workers = (0..state.task_counts.len())
            .map(|worker_id| {
                let started_raw = state.started_offsets_us[worker_id].load(Ordering::Acquire);
                let stopped_raw = state.stopped_offsets_us[worker_id].load(Ordering::Acquire);
                let stop_us = match stopped_raw {
                    0 => elapsed_us,
                    raw => raw - 1,
                };
                let uptime_us = match started_raw {
                    0 => 0,
                    raw => stop_us.saturating_sub(raw - 1),
                };
                let busy_us = state.busy_us[worker_id]
                    .load(Ordering::Acquire)
                    .min(uptime_us);

                WorkerRuntimeSnapshot {
                    worker_id,
                    tasks_completed: state.task_counts[worker_id].load(Ordering::Acquire),
                    uptime: Duration::from_micros(uptime_us),
                    busy: Duration::from_micros(busy_us),
                    idle: Duration::from_micros(uptime_us - busy_us),
                    utilization: if uptime_us == 0 {
                        0.0
                    } else {
                        busy_us as f64 / uptime_us as f64
                    },
                }
            })
            .collect();

        PoolRuntimeSnapshot {
            elapsed,
            completed: self.completed_count(),
            failed: state.failed.load(Ordering::Acquire),
            live_workers: self.live_workers(),
            workers,
        }
    }

    /// Joins every worker thread. Workers stop on their own once the queue
    /// closes or the cancel flag is set.
    pub fn join(mut self) -> Result<PoolRuntimeSnapshot> {
        self.join_workers().map_err(ChunkzipError::State)?;
        Ok(self.runtime_snapshot())
    }

    fn join_workers(&mut self) -> std::result::Result<(), &'static str> {
        let mut outcome = Ok(());
        for handle in self.handles.drain(..) {
            if let Err(payload) = handle.join() {
                tracing::error!(
                    target: crate::telemetry::tags::TARGET_WORKER,
                    panic = %panic_message(payload.as_ref()),
                    "worker thread panicked outside a chunk"
                );
                outcome = Err("worker thread panicked");
            }
        }
        outcome
    }
}

fn run_worker_loop<P: ChunkProcessor>(
    worker_id: usize,
    state: Arc<PoolState>,
    queue: ChunkReceiver,
    processor: Arc<P>,
) {
    state.mark(&state.started_offsets_us, worker_id);
    processor.on_start(worker_id);

    while !state.cancel.load(Ordering::Acquire) {
        state.telemetry.on_queue_depth(worker_id, queue.len());
        let chunk = match queue.pop(state.poll) {
            QueuePop::Ready(chunk) => chunk,
            QueuePop::Timeout => continue,
            QueuePop::Closed => break,
        };

        let sequence = chunk.sequence;
        state.telemetry.on_task_started(worker_id, state.task_kind);
        let started_at = Instant::now();

        let result = catch_unwind(AssertUnwindSafe(|| processor.process(worker_id, chunk)))
            .unwrap_or_else(|payload| {
                Err(ChunkzipError::Codec(format!(
                    "worker panicked while processing chunk {sequence}: {}",
                    panic_message(payload.as_ref())
                )))
            });

        let elapsed = started_at.elapsed();
        state.busy_us[worker_id].fetch_add(duration_to_us(elapsed), Ordering::AcqRel);

        match result {
            Ok(()) => {
                state
                    .telemetry
                    .on_task_finished(worker_id, state.task_kind, elapsed);
                state.completed.fetch_add(1, Ordering::AcqRel);
                state.task_counts[worker_id].fetch_add(1, Ordering::AcqRel);
            }
            Err(error) => {
                state
                    .telemetry
                    .on_task_failed(worker_id, state.task_kind, elapsed);
                state.failed.fetch_add(1, Ordering::AcqRel);
                processor.on_failure(worker_id, error);
                break;
            }
        }
    }

    state.mark(&state.stopped_offsets_us, worker_id);
    if state.live.fetch_sub(1, Ordering::AcqRel) == 1 {
        processor.on_drained();
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
