//! # hls-dl CLI
//!
//! Command-line interface for the hls-dl library.
//! Downloads HLS playlists and merges each one into a single MP3.

use std::path::PathBuf;
use anyhow::{Context, Result};
use clap::Parser;
use hls_dl::{HlsDownloader, Job, JobOptions, DEFAULT_CONCURRENCY};
use log::{error, LevelFilter};
use tokio_util::sync::CancellationToken;

mod cli;

/// Command-line interface for hls-dl
#[derive(Parser)]
#[command(name = "hls-dl")]
#[command(about = "Concurrent HLS playlist downloader that merges segments into one MP3")]
#[command(long_about = "Downloads HLS playlists and merges them into MP3 files:
  hls-dl https://host/show/index.m3u8             # Saved as dist/<hash>.mp3
  hls-dl -o episode https://host/show/index.m3u8  # Saved as dist/episode.mp3
  hls-dl -i jobs.txt --clean                      # One 'url' or 'name:url' per line

Segments are cached under temp/<hash>/ and reused when a job is run again.")]
#[command(version = env!("HLS_DL_VERSION"))]
struct Cli {
    /// Playlist URLs to download
    urls: Vec<String>,

    /// Batch file with one `url` or `name:url` per line
    #[arg(short = 'i', long = "input")]
    input: Option<PathBuf>,

    /// Output file name for a single positional URL
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Delete cached segments after a successful merge
    #[arg(long)]
    clean: bool,

    /// Maximum number of concurrent segment downloads
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Directory for merged files
    #[arg(long, default_value = "dist")]
    output_dir: PathBuf,

    /// Directory for cached segments
    #[arg(long, default_value = "temp")]
    temp_dir: PathBuf,

    /// Encoder executable
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Resolve playlists and print segment URLs without downloading
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("❌ Error: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Run the CLI, returning whether every job succeeded
async fn run() -> Result<bool> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .init();

    let jobs = gather_jobs(&cli)?;
    if jobs.is_empty() {
        eprintln!("Usage: hls-dl [-i urls_file] [-o name] <m3u8_url>...");
        return Ok(false);
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("⚠️  Interrupted, finishing in-flight segments...");
                cancel.cancel();
            }
        });
    }

    let progress = cli::ProgressManager::new(&format!("🎧 {} job(s) queued", jobs.len()));
    let options = JobOptions {
        output_dir: cli.output_dir.clone(),
        temp_dir: cli.temp_dir.clone(),
        concurrency: cli.concurrency,
        clean: cli.clean,
        ffmpeg: cli.ffmpeg.clone(),
        progress: Some(progress.callback()),
        cancel: Some(cancel),
        ..Default::default()
    };
    let downloader = HlsDownloader::new(options);

    if cli.dry_run {
        return dry_run(&downloader, &jobs).await;
    }

    eprintln!("📁 Saving to: {}", cli.output_dir.display());
    let summary = downloader.run_batch(&jobs).await?;

    eprintln!(
        "Done: {} completed, {} already present, {} empty, {} failed",
        summary.completed,
        summary.skipped,
        summary.empty,
        summary.failed.len()
    );
    for failure in &summary.failed {
        eprintln!("  ❌ {}: {}", failure.job.url, failure.error);
    }

    Ok(summary.is_success())
}

/// Collect jobs from positional URLs and the optional batch file
fn gather_jobs(cli: &Cli) -> Result<Vec<Job>> {
    let mut jobs = cli::collect_jobs(&cli.urls, cli.output.as_deref())?;

    if let Some(ref input) = cli.input {
        let contents = std::fs::read_to_string(input)
            .with_context(|| format!("File not found: {}", input.display()))?;
        let batch = cli::parse_job_list(&contents)
            .with_context(|| format!("Invalid batch file {}", input.display()))?;
        jobs.extend(batch);
    }

    Ok(jobs)
}

/// Print the resolved segments of every job
async fn dry_run(downloader: &HlsDownloader, jobs: &[Job]) -> Result<bool> {
    let mut ok = true;
    for job in jobs {
        let output_name = job.output_name(&downloader.options().output_extension)?;
        eprintln!("🔍 [DRY RUN] {} -> {}", job.url, output_name);
        match downloader.resolve(&job.url).await {
            Ok(segments) => {
                for segment in segments {
                    println!("{}\t{}", segment.index, segment.url);
                }
            }
            Err(e) => {
                eprintln!("  ❌ {e}");
                ok = false;
            }
        }
    }
    Ok(ok)
}
