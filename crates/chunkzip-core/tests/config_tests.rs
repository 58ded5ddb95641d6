mod support;

use std::time::Duration;

use chunkzip_core::{ChunkzipError, ErrorKind, Pipeline, PipelineMode, PipelineOptions};

use support::{TestResult, Workspace};

fn expect_configuration(options: PipelineOptions) -> String {
    match Pipeline::create(options) {
        Err(error @ ChunkzipError::Configuration(_)) => error.to_string(),
        Err(other) => panic!("expected configuration error, got {other}"),
        Ok(_) => panic!("expected configuration error, pipeline was created"),
    }
}

#[test]
fn missing_input_is_rejected() -> TestResult {
    let ws = Workspace::new()?;
    let message = expect_configuration(PipelineOptions::compress(
        ws.path("absent.bin"),
        ws.path("out.cz"),
    ));
    assert!(message.contains("cannot open input"));
    assert!(!ws.path("out.cz").exists());
    Ok(())
}

#[test]
fn directory_input_is_rejected() -> TestResult {
    let ws = Workspace::new()?;
    let dir = ws.path("folder");
    std::fs::create_dir(&dir)?;
    let message = expect_configuration(PipelineOptions::compress(&dir, ws.path("out.cz")));
    assert!(message.contains("not a regular file"));
    Ok(())
}

#[test]
fn output_in_missing_directory_is_rejected() -> TestResult {
    let ws = Workspace::new()?;
    let input = ws.write("in.bin", b"data")?;
    let message = expect_configuration(PipelineOptions::compress(
        &input,
        ws.path("missing").join("out.cz"),
    ));
    assert!(message.contains("cannot create output"));
    Ok(())
}

#[test]
fn invalid_numbers_are_rejected() -> TestResult {
    let ws = Workspace::new()?;
    let input = ws.write("in.bin", b"data")?;
    let base = || PipelineOptions::compress(&input, ws.path("out.cz"));

    expect_configuration(base().with_chunk_size(0));
    expect_configuration(base().with_chunk_size(i32::MAX as usize + 1));
    expect_configuration(base().with_memory_limit(0));
    expect_configuration(base().with_workers(0));
    expect_configuration(base().with_level(10));
    expect_configuration(base().with_poll_interval(Duration::ZERO));
    Ok(())
}

#[test]
fn input_and_output_must_differ() -> TestResult {
    let ws = Workspace::new()?;
    let input = ws.write("same.bin", b"keep me")?;
    expect_configuration(PipelineOptions::compress(&input, &input));
    assert_eq!(std::fs::read(&input)?, b"keep me");
    Ok(())
}

#[test]
fn defaults_are_usable() -> TestResult {
    let options = PipelineOptions::new(PipelineMode::Decompress, "a", "b");
    assert_eq!(options.chunk_size, 1024 * 1024);
    assert_eq!(options.memory_limit, 500 * 1024 * 1024);
    assert!(options.workers >= 1);
    assert!(options.validate().is_ok());
    assert_eq!(
        PipelineOptions::compress("a", "b")
            .with_workers(0)
            .validate()
            .map_err(|error| error.kind())
            .err(),
        Some(ErrorKind::Configuration)
    );
    Ok(())
}
