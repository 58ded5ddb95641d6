use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};

use crate::types::InputChunk;

/// FIFO handoff from the reader to the workers.
///
/// Capacity is counted in chunks. Dropping the [`ChunkSender`] closes the
/// queue: receivers drain whatever is left and then observe
/// [`QueuePop::Closed`].
#[derive(Debug)]
pub struct BoundedChunkQueue {
    sender: ChunkSender,
    receiver: ChunkReceiver,
}

impl BoundedChunkQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            sender: ChunkSender { tx },
            receiver: ChunkReceiver { rx },
        }
    }

    pub fn into_parts(self) -> (ChunkSender, ChunkReceiver) {
        (self.sender, self.receiver)
    }
}

/// Result of one bounded wait on the queue.
#[derive(Debug)]
pub enum QueuePop {
    Ready(InputChunk),
    Timeout,
    Closed,
}

#[derive(Debug)]
pub struct ChunkSender {
    tx: Sender<InputChunk>,
}

impl ChunkSender {
    /// Enqueues `chunk`, waiting in `poll` slices while the queue is full.
    ///
    /// Returns `false` without enqueueing once `cancel` is set or every
    /// receiver is gone.
    pub fn push(&self, mut chunk: InputChunk, poll: Duration, cancel: &AtomicBool) -> bool {
        loop {
            if cancel.load(Ordering::Acquire) {
                return false;
            }
            match self.tx.send_timeout(chunk, poll) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(returned)) => chunk = returned,
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ChunkReceiver {
    rx: Receiver<InputChunk>,
}

impl ChunkReceiver {
    pub fn pop(&self, timeout: Duration) -> QueuePop {
        match self.rx.recv_timeout(timeout) {
            Ok(chunk) => QueuePop::Ready(chunk),
            Err(RecvTimeoutError::Timeout) => QueuePop::Timeout,
            Err(RecvTimeoutError::Disconnected) => QueuePop::Closed,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
