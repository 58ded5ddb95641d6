use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::core::lock_unpoisoned;
use crate::types::OutputChunk;
use crate::{ChunkzipError, Result};

/// Holding area between the workers and the writer.
///
/// Workers insert finished chunks in any order; the writer takes them back
/// strictly by sequence. A chunk leaves the buffer when it is taken.
#[derive(Debug, Default)]
pub struct OrderedResultBuffer {
    state: Mutex<BufferState>,
    ready: Condvar,
}

#[derive(Debug, Default)]
struct BufferState {
    next_expected: u64,
    pending: BTreeMap<u64, OutputChunk>,
    buffered_bytes: usize,
    closed: bool,
}

/// Outcome of [`OrderedResultBuffer::take_next`].
#[derive(Debug)]
pub enum TakeOutcome {
    /// The chunk with the next expected sequence.
    Ready(OutputChunk),
    /// Not produced yet; producers are still running.
    Pending,
    /// Closed and the next expected chunk will never arrive.
    Exhausted,
}

impl OrderedResultBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `chunk` under its sequence and wakes the writer.
    ///
    /// # Errors
    /// Rejects sequences already taken and duplicates of a pending sequence.
    pub fn insert(&self, chunk: OutputChunk) -> Result<()> {
        let mut state = lock_unpoisoned(&self.state);
        if chunk.sequence < state.next_expected {
            return Err(ChunkzipError::InvalidSequence {
                expected: state.next_expected,
                actual: chunk.sequence,
            });
        }
        if state.pending.contains_key(&chunk.sequence) {
            return Err(ChunkzipError::State(
                "duplicate chunk sequence in ordered buffer",
            ));
        }

        let wakes_writer = chunk.sequence == state.next_expected;
        state.buffered_bytes += chunk.len();
        state.pending.insert(chunk.sequence, chunk);
        drop(state);

        if wakes_writer {
            self.ready.notify_all();
        }
        Ok(())
    }

    /// Removes the next chunk in sequence, waiting at most `timeout` for it.
    pub fn take_next(&self, timeout: Duration) -> TakeOutcome {
        let mut state = lock_unpoisoned(&self.state);
        let mut waited = false;
        loop {
            let next = state.next_expected;
            if let Some(chunk) = state.pending.remove(&next) {
                state.next_expected += 1;
                state.buffered_bytes -= chunk.len();
                return TakeOutcome::Ready(chunk);
            }
            if state.closed {
                return TakeOutcome::Exhausted;
            }
            if waited {
                return TakeOutcome::Pending;
            }

            state = match self.ready.wait_timeout(state, timeout) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
            waited = true;
        }
    }

    /// Marks that no further chunks will be inserted.
    pub fn close(&self) {
        lock_unpoisoned(&self.state).closed = true;
        self.ready.notify_all();
    }

    /// Whether the chunk the writer needs next is already buffered.
    pub fn has_next_ready(&self) -> bool {
        let state = lock_unpoisoned(&self.state);
        state.pending.contains_key(&state.next_expected)
    }

    pub fn next_expected(&self) -> u64 {
        lock_unpoisoned(&self.state).next_expected
    }

    pub fn pending_len(&self) -> usize {
        lock_unpoisoned(&self.state).pending.len()
    }

    pub fn buffered_bytes(&self) -> usize {
        lock_unpoisoned(&self.state).buffered_bytes
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    const WAIT: Duration = Duration::from_millis(20);

    fn chunk(sequence: u64) -> OutputChunk {
        OutputChunk::plain(sequence, vec![sequence as u8; 3])
    }

    #[test]
    fn releases_in_sequence_regardless_of_insert_order() {
        let buffer = OrderedResultBuffer::new();
        buffer.insert(chunk(2)).unwrap();
        buffer.insert(chunk(1)).unwrap();
        assert!(matches!(buffer.take_next(WAIT), TakeOutcome::Pending));
        assert!(!buffer.has_next_ready());

        buffer.insert(chunk(0)).unwrap();
        assert_eq!(buffer.pending_len(), 3);
        assert_eq!(buffer.buffered_bytes(), 9);
        for expected in 0..3 {
            match buffer.take_next(WAIT) {
                TakeOutcome::Ready(chunk) => assert_eq!(chunk.sequence, expected),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(buffer.next_expected(), 3);
        assert_eq!(buffer.pending_len(), 0);
        assert_eq!(buffer.buffered_bytes(), 0);
    }

    #[test]
    fn stale_and_duplicate_sequences_rejected() {
        let buffer = OrderedResultBuffer::new();
        buffer.insert(chunk(0)).unwrap();
        buffer.insert(chunk(1)).unwrap();
        assert!(buffer.insert(chunk(1)).is_err());
        assert!(matches!(buffer.take_next(WAIT), TakeOutcome::Ready(_)));
        assert!(matches!(
            buffer.insert(chunk(0)),
            Err(ChunkzipError::InvalidSequence {
                expected: 1,
                actual: 0
            })
        ));
    }

    #[test]
    fn closed_buffer_drains_then_exhausts() {
        let buffer = OrderedResultBuffer::new();
        buffer.insert(chunk(0)).unwrap();
        buffer.close();
        assert!(matches!(buffer.take_next(WAIT), TakeOutcome::Ready(_)));
        assert!(matches!(buffer.take_next(WAIT), TakeOutcome::Exhausted));
    }

    #[test]
    fn insert_wakes_waiting_writer() {
        let buffer = Arc::new(OrderedResultBuffer::new());
        let producer = Arc::clone(&buffer);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.insert(chunk(0)).unwrap();
        });
        let mut outcome = buffer.take_next(Duration::from_secs(5));
        while matches!(outcome, TakeOutcome::Pending) {
            outcome = buffer.take_next(Duration::from_secs(5));
        }
        handle.join().unwrap();
        assert!(matches!(outcome, TakeOutcome::Ready(chunk) if chunk.sequence == 0));
    }
}
