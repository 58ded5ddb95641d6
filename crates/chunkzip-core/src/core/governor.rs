use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::core::lock_unpoisoned;
use crate::telemetry::{self, tags};
use crate::types::duration_to_us;

/// Byte budget for chunks that have been read but not yet written.
///
/// The reader [`admit`](Self::admit)s every chunk it reads, workers
/// [`resize`](Self::resize) the reservation to the size of their output and
/// the writer [`release`](Self::release)s it after the write. Waits are
/// sliced by the poll interval and give up once the cancel flag is set.
#[derive(Debug)]
pub struct MemoryGovernor {
    limit: usize,
    poll: Duration,
    usage: Mutex<Usage>,
    changed: Condvar,
}

#[derive(Debug, Default)]
struct Usage {
    resident: usize,
    peak: usize,
}

impl MemoryGovernor {
    pub fn new(limit: usize, poll: Duration) -> Self {
        Self {
            limit: limit.max(1),
            poll,
            usage: Mutex::new(Usage::default()),
            changed: Condvar::new(),
        }
    }

    /// Bytes currently reserved.
    pub fn resident(&self) -> usize {
        lock_unpoisoned(&self.usage).resident
    }

    /// Highest reservation seen since construction.
    pub fn peak(&self) -> usize {
        lock_unpoisoned(&self.usage).peak
    }

    /// Reserves `bytes` for a newly read chunk.
    ///
    /// Blocks while the reservation would push usage past the limit. A chunk
    /// larger than the whole budget is still admitted once nothing else is
    /// resident. Returns `false` if cancelled before the reservation.
    pub fn admit(&self, bytes: usize, cancel: &AtomicBool) -> bool {
        let started = Instant::now();
        let mut usage = lock_unpoisoned(&self.usage);
        let mut waited = false;
        while usage.resident > 0 && usage.resident.saturating_add(bytes) > self.limit {
            if cancel.load(Ordering::Acquire) {
                return false;
            }
            waited = true;
            usage = self.wait(usage);
        }
        if cancel.load(Ordering::Acquire) {
            return false;
        }

        usage.resident += bytes;
        usage.peak = usage.peak.max(usage.resident);
        let resident = usage.resident;
        drop(usage);

        self.report(resident);
        if waited {
            self.record_wait("admit", started);
        }
        true
    }

    /// Swaps a reservation of `old` bytes for one of `new` bytes without
    /// blocking.
    pub fn resize(&self, old: usize, new: usize) {
        let mut usage = lock_unpoisoned(&self.usage);
        usage.resident = usage.resident.saturating_sub(old).saturating_add(new);
        usage.peak = usage.peak.max(usage.resident);
        let resident = usage.resident;
        drop(usage);

        self.report(resident);
        if new < old {
            self.changed.notify_all();
        }
    }

    /// Waits while usage exceeds the limit and `writer_can_advance` holds.
    ///
    /// Callers pass a predicate that is true only while the writer has the
    /// next chunk available, so the wait always ends with the writer
    /// releasing bytes or running out of ready work.
    pub fn throttle<F>(&self, writer_can_advance: F, cancel: &AtomicBool)
    where
        F: Fn() -> bool,
    {
        let started = Instant::now();
        let mut usage = lock_unpoisoned(&self.usage);
        let mut waited = false;
        while usage.resident > self.limit
            && !cancel.load(Ordering::Acquire)
            && writer_can_advance()
        {
            waited = true;
            usage = self.wait(usage);
        }
        drop(usage);

        if waited {
            self.record_wait("throttle", started);
        }
    }

    /// Returns `bytes` to the budget and wakes every waiter.
    pub fn release(&self, bytes: usize) {
        let mut usage = lock_unpoisoned(&self.usage);
        usage.resident = usage.resident.saturating_sub(bytes);
        let resident = usage.resident;
        drop(usage);

        self.report(resident);
        self.changed.notify_all();
    }

    fn wait<'a>(&self, usage: MutexGuard<'a, Usage>) -> MutexGuard<'a, Usage> {
        match self.changed.wait_timeout(usage, self.poll) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }

    fn report(&self, resident: usize) {
        telemetry::set_gauge(
            tags::METRIC_GOVERNOR_RESIDENT_BYTES,
            resident as u64,
            &[("subsystem", "governor")],
        );
    }

    fn record_wait(&self, op: &'static str, started: Instant) {
        let waited_us = duration_to_us(started.elapsed());
        telemetry::increment_counter(
            tags::METRIC_GOVERNOR_WAIT_COUNT,
            1,
            &[("subsystem", "governor"), ("op", op)],
        );
        telemetry::record_histogram(
            tags::METRIC_GOVERNOR_WAIT_US,
            waited_us,
            &[("subsystem", "governor"), ("op", op)],
        );
        tracing::trace!(target: tags::TARGET_GOVERNOR, op, waited_us, "memory budget wait");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    const POLL: Duration = Duration::from_millis(5);

    #[test]
    fn oversized_chunk_admitted_when_idle() {
        let governor = MemoryGovernor::new(10, POLL);
        let cancel = AtomicBool::new(false);
        assert!(governor.admit(100, &cancel));
        assert_eq!(governor.resident(), 100);
        governor.release(100);
        assert_eq!(governor.resident(), 0);
        assert_eq!(governor.peak(), 100);
    }

    #[test]
    fn admit_blocks_until_release() {
        let governor = Arc::new(MemoryGovernor::new(10, POLL));
        let cancel = Arc::new(AtomicBool::new(false));
        assert!(governor.admit(8, &cancel));

        let waiter = {
            let governor = Arc::clone(&governor);
            let cancel = Arc::clone(&cancel);
            thread::spawn(move || governor.admit(8, &cancel))
        };
        thread::sleep(Duration::from_millis(30));
        assert_eq!(governor.resident(), 8);

        governor.release(8);
        assert!(waiter.join().unwrap());
        assert_eq!(governor.resident(), 8);
    }

    #[test]
    fn cancelled_admit_reserves_nothing() {
        let governor = MemoryGovernor::new(10, POLL);
        let cancel = AtomicBool::new(false);
        assert!(governor.admit(10, &cancel));
        cancel.store(true, Ordering::Release);
        assert!(!governor.admit(1, &cancel));
        assert_eq!(governor.resident(), 10);
    }

    #[test]
    fn throttle_returns_when_writer_cannot_advance() {
        let governor = MemoryGovernor::new(4, POLL);
        let cancel = AtomicBool::new(false);
        assert!(governor.admit(2, &cancel));
        governor.resize(2, 64);
        governor.throttle(|| false, &cancel);
        assert_eq!(governor.resident(), 64);
    }
}
