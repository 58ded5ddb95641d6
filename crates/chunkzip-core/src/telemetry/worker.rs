use std::time::Duration;

use crate::telemetry;
use crate::telemetry::tags;
use crate::types::duration_to_us;

/// Hooks a worker pool calls around each chunk it processes.
///
/// Implementations must be cheap; they run on the worker threads between
/// codec calls.
pub trait WorkerTelemetry: Send + Sync {
    fn on_queue_depth(&self, worker_id: usize, depth: usize);
    fn on_task_started(&self, worker_id: usize, task_kind: &str);
    fn on_task_finished(&self, worker_id: usize, task_kind: &str, elapsed: Duration);
    fn on_task_failed(&self, worker_id: usize, task_kind: &str, elapsed: Duration);
}

/// Reports worker activity into the process-wide metric registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultWorkerTelemetry;

impl WorkerTelemetry for DefaultWorkerTelemetry {
    fn on_queue_depth(&self, _worker_id: usize, depth: usize) {
        telemetry::set_gauge(
            tags::METRIC_WORKER_QUEUE_DEPTH,
            depth as u64,
            &[("subsystem", "worker"), ("op", "queue_depth")],
        );
        telemetry::record_histogram(
            tags::METRIC_WORKER_QUEUE_DEPTH_HIST,
            depth as u64,
            &[("subsystem", "worker"), ("op", "queue_depth")],
        );
    }

    fn on_task_started(&self, worker_id: usize, task_kind: &str) {
        telemetry::increment_counter(
            tags::METRIC_WORKER_TASK_START_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task_start")],
        );
        telemetry::add_gauge(
            tags::METRIC_WORKER_ACTIVE_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task_start")],
        );
        tracing::trace!(
            target: tags::TARGET_WORKER,
            worker_id,
            task_kind,
            "worker task started"
        );
    }

    fn on_task_finished(&self, worker_id: usize, task_kind: &str, elapsed: Duration) {
        let elapsed_us = duration_to_us(elapsed);

        telemetry::increment_counter(
            tags::METRIC_WORKER_TASK_FINISH_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task_finish"), ("result", "ok")],
        );
        telemetry::increment_counter(
            tags::METRIC_WORKER_TASK_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task"), ("result", "ok")],
        );
        telemetry::record_histogram(
            tags::METRIC_WORKER_TASK_LATENCY_US,
            elapsed_us,
            &[("subsystem", "worker"), ("op", "task"), ("result", "ok")],
        );
        telemetry::sub_gauge_saturating(
            tags::METRIC_WORKER_ACTIVE_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task_finish")],
        );
        tracing::trace!(
            target: tags::TARGET_WORKER,
            worker_id,
            task_kind,
            elapsed_us,
            "worker task finished"
        );
    }

    fn on_task_failed(&self, worker_id: usize, task_kind: &str, elapsed: Duration) {
        let elapsed_us = duration_to_us(elapsed);

        telemetry::increment_counter(
            tags::METRIC_WORKER_TASK_FAIL_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task_finish"), ("result", "error")],
        );
        telemetry::increment_counter(
            tags::METRIC_WORKER_TASK_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task"), ("result", "error")],
        );
        telemetry::record_histogram(
            tags::METRIC_WORKER_TASK_LATENCY_US,
            elapsed_us,
            &[("subsystem", "worker"), ("op", "task"), ("result", "error")],
        );
        telemetry::sub_gauge_saturating(
            tags::METRIC_WORKER_ACTIVE_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task_failed")],
        );
        tracing::debug!(
            target: tags::TARGET_WORKER,
            worker_id,
            task_kind,
            elapsed_us,
            "worker task failed"
        );
    }
}
