use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use chunkzip_core::{
    ChunkFraming, FnObserver, Pipeline, PipelineMode, PipelineOptions, PipelineOutcome,
    PipelineStats, ProgressEvent,
};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

const CLI_TARGET: &str = "chunkzip::cli";

#[derive(Parser)]
#[command(
    name = "chunkzip",
    version,
    about = "Parallel chunked gzip compressor",
    long_about = "Compress a file into a chunked gzip container, or restore one, using one \
                  reader, a pool of codec workers and one ordered writer."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a plain file into a chunked container.
    Compress(RunArgs),
    /// Restore a plain file from a chunked container.
    Decompress(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Source file.
    input: PathBuf,

    /// Destination file (created or truncated).
    output: PathBuf,

    /// Uncompressed bytes per chunk (supports suffixes K/M/G, e.g. 64K, 1M).
    #[arg(long, default_value = "1M", value_parser = parse_size)]
    chunk_size: usize,

    /// Soft cap on chunk bytes held in memory (supports suffixes K/M/G).
    #[arg(long, default_value = "500M", value_parser = parse_size)]
    memory_limit: usize,

    /// Number of codec worker threads (defaults to CPU count).
    #[arg(long, default_value_t = num_cpus::get())]
    workers: usize,

    /// DEFLATE compression level, 0 to 9.
    #[arg(long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(0..=9))]
    level: u32,

    /// Layout of each chunk record after the file header.
    #[arg(long, value_enum, default_value_t = FramingArg::default())]
    framing: FramingArg,

    /// Print run statistics as JSON instead of the text summary.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FramingArg {
    /// i32 length prefix followed by a complete gzip member.
    LengthPrefixed,
    /// RFC1952 members carrying their length in an extra field.
    GzipMember,
}

impl Default for FramingArg {
    fn default() -> Self {
        match ChunkFraming::default() {
            ChunkFraming::LengthPrefixed => Self::LengthPrefixed,
            ChunkFraming::GzipMember => Self::GzipMember,
        }
    }
}

impl From<FramingArg> for ChunkFraming {
    fn from(value: FramingArg) -> Self {
        match value {
            FramingArg::LengthPrefixed => ChunkFraming::LengthPrefixed,
            FramingArg::GzipMember => ChunkFraming::GzipMember,
        }
    }
}

fn main() {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let failed = error.use_stderr();
            let _ = error.print();
            if failed {
                eprintln!();
                let _ = Cli::command().print_help();
                std::process::exit(1);
            }
            std::process::exit(0);
        }
    };

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("error: {error:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let (mode, args) = match cli.command {
        Commands::Compress(args) => (PipelineMode::Compress, args),
        Commands::Decompress(args) => (PipelineMode::Decompress, args),
    };
    run_command(mode, args)
}

fn run_command(mode: PipelineMode, args: RunArgs) -> anyhow::Result<i32> {
    let options = PipelineOptions::new(mode, &args.input, &args.output)
        .with_chunk_size(args.chunk_size)
        .with_memory_limit(args.memory_limit)
        .with_workers(args.workers)
        .with_level(args.level)
        .with_framing(args.framing.into());

    let show_progress = !args.json;
    let observer = FnObserver::new(move |event: ProgressEvent| {
        if show_progress {
            eprint!("\r\x1b[2KProgress: {}%", event.percentage);
            let _ = io::stderr().flush();
        }
    });

    let pipeline = Arc::new(
        Pipeline::create(options)
            .with_context(|| format!("cannot start {}", mode.as_str()))?
            .with_observer(Arc::new(observer)),
    );
    spawn_interrupt_handler(Arc::clone(&pipeline))?;

    if show_progress {
        print_header(pipeline.options());
    }
    tracing::info!(
        target: CLI_TARGET,
        mode = mode.as_str(),
        input = %args.input.display(),
        output = %args.output.display(),
        "run started"
    );
    let outcome = pipeline.process().context("pipeline run failed")?;
    if show_progress {
        eprintln!();
    }
    tracing::info!(
        target: CLI_TARGET,
        mode = mode.as_str(),
        exit_code = outcome.exit_code(),
        completed = outcome.is_completed(),
        "run finished"
    );

    match &outcome {
        PipelineOutcome::Completed(stats) if args.json => {
            println!("{}", serde_json::to_string_pretty(stats)?);
        }
        PipelineOutcome::Completed(stats) => print_summary(&args.input, &args.output, stats),
        PipelineOutcome::Cancelled { cause: Some(cause) } => {
            eprintln!("{} failed: {cause}", mode.as_str());
        }
        PipelineOutcome::Cancelled { cause: None } => {
            eprintln!("Operation has been cancelled");
        }
    }

    Ok(outcome.exit_code())
}

/// Cancels `pipeline` on Ctrl-C. The handler thread lives until exit.
fn spawn_interrupt_handler(pipeline: Arc<Pipeline>) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("cannot start the signal runtime")?;

    thread::Builder::new()
        .name("chunkzip-signal".to_string())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => interrupt(&pipeline),
                    Err(error) => {
                        tracing::warn!(
                            target: CLI_TARGET,
                            error = %error,
                            "cannot listen for Ctrl-C"
                        );
                    }
                }
            });
        })
        .context("cannot spawn the signal thread")?;
    Ok(())
}

fn interrupt(pipeline: &Pipeline) {
    tracing::warn!(target: CLI_TARGET, "interrupt received, cancelling");
    pipeline.cancel();
}

fn print_header(options: &PipelineOptions) {
    println!("chunkzip {}", options.mode.as_str());
    println!("  workers: {}", options.workers);
    println!("  memory limit: {}", format_bytes(options.memory_limit as u64));
    if options.mode == PipelineMode::Compress {
        println!("  chunk size: {}", format_bytes(options.chunk_size as u64));
    } else {
        println!("  chunk size: from container header");
    }
    println!("  framing: {}", options.framing);
}

fn print_summary(input: &Path, output: &Path, stats: &PipelineStats) {
    let elapsed_secs = stats.elapsed.as_secs_f64().max(1e-6);
    let read_bps = stats.input_bytes as f64 / elapsed_secs;
    let write_bps = stats.output_bytes as f64 / elapsed_secs;

    println!("{} complete", stats.mode.as_str());
    println!("  input: {}", input.display());
    println!("  output: {}", output.display());
    println!("  codec: {} ({})", stats.codec, stats.framing);
    println!("  elapsed: {}", format_duration(stats.elapsed));
    println!("  input bytes: {}", format_bytes(stats.input_bytes));
    println!("  output bytes: {}", format_bytes(stats.output_bytes));
    println!("  output/input ratio: {:.3}x", stats.ratio());
    println!("  read throughput: {}/s", format_rate(read_bps));
    println!("  write throughput: {}/s", format_rate(write_bps));
    println!(
        "  chunks: {} of {}",
        stats.chunks,
        format_bytes(stats.chunk_size as u64)
    );
    println!(
        "  peak resident: {}",
        format_bytes(stats.peak_resident_bytes as u64)
    );

    let tasks = stats.workers.iter().map(|worker| worker.tasks_completed);
    let min_tasks = tasks.clone().min().unwrap_or(0);
    let max_tasks = tasks.max().unwrap_or(0);
    println!(
        "  workers: {} | task balance min/max {min_tasks}/{max_tasks}",
        stats.workers.len()
    );
    for worker in &stats.workers {
        println!(
            "    w{:02} tasks {:>6} | busy {:>8} | idle {:>8} | util {:>6.2}%",
            worker.worker_id,
            worker.tasks_completed,
            format_duration(worker.busy),
            format_duration(worker.idle),
            worker.utilization * 100.0,
        );
    }
}

fn parse_size(value: &str) -> Result<usize, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("size cannot be empty".to_string());
    }

    let split_at = trimmed
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (num_part, suffix_part) = trimmed.split_at(split_at);
    if num_part.is_empty() {
        return Err(format!("invalid size: {value}"));
    }

    let base: usize = num_part
        .parse()
        .map_err(|_| format!("invalid size number: {value}"))?;

    let multiplier = match suffix_part.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1usize,
        "k" | "kb" | "kib" => 1024,
        "m" | "mb" | "mib" => 1024 * 1024,
        "g" | "gb" | "gib" => 1024 * 1024 * 1024,
        other => return Err(format!("invalid size suffix '{other}' in '{value}'")),
    };

    match base.checked_mul(multiplier) {
        Some(0) => Err(format!("size must be greater than zero: {value}")),
        Some(size) => Ok(size),
        None => Err(format!("size overflow: {value}")),
    }
}

const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

fn format_rate(bytes_per_second: f64) -> String {
    if !bytes_per_second.is_finite() || bytes_per_second <= 0.0 {
        return "0 B".to_string();
    }

    let mut value = bytes_per_second;
    let mut unit = 0usize;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let millis = duration.subsec_millis();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else if minutes > 0 {
        format!("{minutes:02}:{seconds:02}")
    } else {
        format!("{seconds}.{millis:03}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_accepts_suffixes() {
        assert_eq!(parse_size("64K"), Ok(64 * 1024));
        assert_eq!(parse_size("1m"), Ok(1024 * 1024));
        assert_eq!(parse_size(" 2GiB "), Ok(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_size("4096"), Ok(4096));
    }

    #[test]
    fn parse_size_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("M").is_err());
        assert!(parse_size("12Q").is_err());
        assert!(parse_size("0").is_err());
    }

    #[test]
    fn cli_parses_both_commands() {
        let cli = Cli::try_parse_from([
            "chunkzip",
            "compress",
            "in.bin",
            "out.cz",
            "--chunk-size",
            "256K",
            "--workers",
            "3",
            "--framing",
            "gzip-member",
        ]);
        let Ok(Cli {
            command: Commands::Compress(args),
        }) = cli
        else {
            panic!("compress arguments did not parse");
        };
        assert_eq!(args.chunk_size, 256 * 1024);
        assert_eq!(args.workers, 3);
        assert!(matches!(args.framing, FramingArg::GzipMember));

        assert!(Cli::try_parse_from(["chunkzip", "decompress", "a.cz", "b.bin"]).is_ok());
        assert!(Cli::try_parse_from(["chunkzip", "decompress", "a.cz"]).is_err());
        assert!(Cli::try_parse_from(["chunkzip", "compress", "a", "b", "--level", "12"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    fn compress_fixture(
        dir: &tempfile::TempDir,
    ) -> Result<Arc<Pipeline>, Box<dyn std::error::Error>> {
        let input = dir.path().join("input.txt");
        std::fs::write(&input, "interruptible payload\n".repeat(4096))?;
        let options = PipelineOptions::compress(&input, dir.path().join("input.cz"))
            .with_chunk_size(4096)
            .with_workers(2);
        Ok(Arc::new(Pipeline::create(options)?))
    }

    #[test]
    fn interrupt_cancels_the_run() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let pipeline = compress_fixture(&dir)?;

        interrupt(&pipeline);
        let outcome = pipeline.process()?;
        assert!(matches!(outcome, PipelineOutcome::Cancelled { cause: None }));
        assert_eq!(outcome.exit_code(), 1);
        Ok(())
    }

    #[test]
    fn interrupt_handler_leaves_normal_runs_alone() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let pipeline = compress_fixture(&dir)?;

        spawn_interrupt_handler(Arc::clone(&pipeline))?;
        assert_eq!(pipeline.options().chunk_size, 4096);
        let outcome = pipeline.process()?;
        assert_eq!(outcome.exit_code(), 0);
        Ok(())
    }

    #[test]
    fn format_helpers_scale_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KiB");
        assert_eq!(format_duration(Duration::from_millis(1_250)), "1.250s");
        assert_eq!(format_duration(Duration::from_secs(125)), "02:05");
    }
}
