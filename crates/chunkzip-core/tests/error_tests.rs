use std::io;

use chunkzip_core::{ChunkzipError, ErrorKind, PipelineMode};

#[test]
fn io_error_converts_and_keeps_kind() {
    let error: ChunkzipError = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
    assert_eq!(error.kind(), ErrorKind::Io);
    assert!(error.to_string().contains("denied"));
}

#[test]
fn anyhow_error_is_internal() {
    let error: ChunkzipError = anyhow::anyhow!("unexpected").into();
    assert_eq!(error.kind(), ErrorKind::Internal);
    assert_eq!(error.to_string(), "unexpected");
}

#[test]
fn context_wraps_message_and_preserves_kind() {
    let error = ChunkzipError::ChecksumMismatch {
        expected: 0x1234_5678,
        actual: 0x0000_00ff,
    }
    .with_context("chunk 4");

    assert_eq!(error.kind(), ErrorKind::Codec);
    let message = error.to_string();
    assert!(message.starts_with("chunk 4: checksum mismatch"));
    assert!(message.contains("0x12345678"));
    assert!(message.contains("0x000000ff"));
    assert!(std::error::Error::source(&error).is_some());
}

#[test]
fn kinds_cover_every_variant() {
    let cases = [
        (ChunkzipError::Configuration("x".into()), ErrorKind::Configuration),
        (ChunkzipError::InvalidFormat("x"), ErrorKind::Format),
        (
            ChunkzipError::InvalidSequence {
                expected: 1,
                actual: 3,
            },
            ErrorKind::Format,
        ),
        (ChunkzipError::Codec("x".into()), ErrorKind::Codec),
        (ChunkzipError::State("x"), ErrorKind::Internal),
    ];
    for (error, kind) in cases {
        assert_eq!(error.kind(), kind, "{error}");
    }
}

#[test]
fn mode_parsing_rejects_unknown_names() {
    assert_eq!(" Compress ".parse::<PipelineMode>().ok(), Some(PipelineMode::Compress));
    assert_eq!(
        "decompress".parse::<PipelineMode>().ok(),
        Some(PipelineMode::Decompress)
    );
    assert!(matches!(
        "inflate".parse::<PipelineMode>(),
        Err(ChunkzipError::Configuration(_))
    ));
}
