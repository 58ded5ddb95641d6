use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChunkzipError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid format: {0}")]
    InvalidFormat(&'static str),
    #[error("checksum mismatch (expected {expected:#010x}, actual {actual:#010x})")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("codec error: {0}")]
    Codec(String),
    #[error("invalid chunk sequence (expected {expected}, actual {actual})")]
    InvalidSequence { expected: u64, actual: u64 },
    #[error("pipeline state error: {0}")]
    State(&'static str),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ChunkzipError>,
    },
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ChunkzipError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Broad category used for reporting, looking through context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Io(_) => ErrorKind::Io,
            Self::InvalidFormat(_) | Self::InvalidSequence { .. } => ErrorKind::Format,
            Self::ChecksumMismatch { .. } | Self::Codec(_) => ErrorKind::Codec,
            Self::State(_) | Self::Other(_) => ErrorKind::Internal,
            Self::Context { source, .. } => source.kind(),
        }
    }
}

/// Error categories surfaced to pipeline callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Format,
    Io,
    Codec,
    Internal,
}
