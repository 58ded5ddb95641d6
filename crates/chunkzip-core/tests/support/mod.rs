#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chunkzip_core::{
    ChunkCodec, ChunkzipError, EncodedChunk, ErrorKind, GzipCodec, PipelineObserver,
    ProgressEvent, Result,
};
use tempfile::{NamedTempFile, TempDir};

pub type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

pub fn write_fixture(data: &[u8]) -> std::result::Result<NamedTempFile, Box<dyn std::error::Error>> {
    let mut file = NamedTempFile::new()?;
    file.write_all(data)?;
    file.flush()?;
    Ok(file)
}

pub fn build_text_fixture(bytes: usize) -> Vec<u8> {
    let line = b"chunked pipeline integration line with a little entropy\n";
    let mut data = Vec::with_capacity(bytes);
    let mut counter = 0u32;
    while data.len() < bytes {
        let remaining = bytes - data.len();
        let take = remaining.min(line.len());
        data.extend_from_slice(&line[..take]);
        counter = counter.wrapping_add(1);
        if data.len() < bytes {
            data.push(b'0' + (counter % 10) as u8);
        }
    }
    data.truncate(bytes);
    data
}

/// Deterministic, poorly compressible bytes (xorshift).
pub fn build_noise_fixture(bytes: usize, seed: u64) -> Vec<u8> {
    let mut state = seed.max(1);
    (0..bytes)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

/// Every chunk is filled with its own index, so output order is visible.
pub fn build_indexed_fixture(chunks: usize, chunk_size: usize) -> Vec<u8> {
    (0..chunks)
        .flat_map(|index| std::iter::repeat_n(index as u8, chunk_size))
        .collect()
}

pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> std::result::Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, data: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.path(name);
        std::fs::write(&path, data)?;
        Ok(path)
    }
}

pub fn read(path: &Path) -> std::io::Result<Vec<u8>> {
    std::fs::read(path)
}

/// Observer that records every notification.
#[derive(Default)]
pub struct RecordingObserver {
    progress: Mutex<Vec<ProgressEvent>>,
    errors: Mutex<Vec<(ErrorKind, String)>>,
    completed: AtomicUsize,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn progress(&self) -> Vec<ProgressEvent> {
        self.progress.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<(ErrorKind, String)> {
        self.errors.lock().unwrap().clone()
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl PipelineObserver for RecordingObserver {
    fn on_progress(&self, event: ProgressEvent) {
        self.progress.lock().unwrap().push(event);
    }

    fn on_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, error: &ChunkzipError) {
        self.errors
            .lock()
            .unwrap()
            .push((error.kind(), error.to_string()));
    }
}

/// Gzip codec that sleeps before encoding; the delay is chosen from the
/// first byte of the chunk.
pub struct DelayCodec {
    inner: GzipCodec,
    delay_for: Box<dyn Fn(u8) -> Duration + Send + Sync>,
}

impl DelayCodec {
    pub fn new<F>(delay_for: F) -> Self
    where
        F: Fn(u8) -> Duration + Send + Sync + 'static,
    {
        Self {
            inner: GzipCodec::new(1),
            delay_for: Box::new(delay_for),
        }
    }

    pub fn uniform(delay: Duration) -> Self {
        Self::new(move |_| delay)
    }
}

impl ChunkCodec for DelayCodec {
    fn name(&self) -> &'static str {
        "delayed-gzip"
    }

    fn encode(&self, raw: &[u8]) -> Result<EncodedChunk> {
        let delay = raw.first().map_or(Duration::ZERO, |byte| (self.delay_for)(*byte));
        thread::sleep(delay);
        self.inner.encode(raw)
    }

    fn decode(&self, compressed: &[u8], max_len: usize) -> Result<Vec<u8>> {
        let raw = self.inner.decode(compressed, max_len)?;
        let delay = raw.first().map_or(Duration::ZERO, |byte| (self.delay_for)(*byte));
        thread::sleep(delay);
        Ok(raw)
    }
}

/// Codec whose encode panics for chunks starting with `trigger`.
pub struct PanickingCodec {
    pub trigger: u8,
}

impl ChunkCodec for PanickingCodec {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn encode(&self, raw: &[u8]) -> Result<EncodedChunk> {
        if raw.first() == Some(&self.trigger) {
            panic!("injected codec panic");
        }
        GzipCodec::default().encode(raw)
    }

    fn decode(&self, compressed: &[u8], max_len: usize) -> Result<Vec<u8>> {
        GzipCodec::default().decode(compressed, max_len)
    }
}
