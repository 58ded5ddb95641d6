pub mod chunk_queue;
pub mod governor;
pub mod ordered_buffer;
pub mod worker_pool;

use std::sync::{Mutex, MutexGuard};

pub use chunk_queue::{BoundedChunkQueue, ChunkReceiver, ChunkSender, QueuePop};
pub use governor::MemoryGovernor;
pub use ordered_buffer::{OrderedResultBuffer, TakeOutcome};
pub use worker_pool::{
    ChunkProcessor, PoolRuntimeSnapshot, WorkerPool, WorkerPoolHandle, WorkerRuntimeSnapshot,
};

/// Locks `mutex`, recovering the guard from a poisoned lock.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
