//! # hls-dl
//!
//! Downloads static HLS playlists and merges them into a single audio file.
//!
//! A job resolves a (possibly two-level) playlist into ordered segment URLs,
//! fetches the segments with bounded concurrency into a per-playlist cache
//! directory, and hands the cached files to an encoder in playback order.
//! Cached segments and existing outputs are reused, so an interrupted job can
//! simply be run again.
//!
//! ```no_run
//! # async fn example() -> hls_dl::Result<()> {
//! use hls_dl::{HlsDownloader, Job, JobOptions};
//!
//! let downloader = HlsDownloader::new(JobOptions::default());
//! let job = Job::parse("episode.mp3:https://example.com/show/index.m3u8")?;
//! downloader.run_job(&job).await?;
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use crate::core::assembler::{Assembler, Encoder, FfmpegEncoder, MergeOutcome};
pub use crate::core::coordinator::{DownloadCoordinator, JobReport, SegmentFailure};
pub use crate::core::downloader::{BatchSummary, HlsDownloader, JobFailure, JobOutcome};
pub use crate::core::error::{Error, Result};
pub use crate::core::fetcher::{slot_name, FetchOutcome, SegmentFetcher, SLOT_WIDTH};
pub use crate::core::hash::{content_key, job_id};
pub use crate::core::job::Job;
pub use crate::core::options::{JobOptions, ProgressCallback, DEFAULT_CONCURRENCY};
pub use crate::core::playlist::{PlaylistResolver, SegmentRef};

/// Download and merge a single playlist with the given options
pub async fn download(entry: &str, options: JobOptions) -> Result<JobOutcome> {
    let job = Job::parse(entry)?;
    HlsDownloader::new(options).run_job(&job).await
}
