//! Job orchestration for hls-dl
//!
//! Wires resolver, coordinator and assembler together for one job, and runs
//! batches of jobs one after another so a failing job never stops the rest.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use log::{error, info, warn};
use once_cell::sync::Lazy;
use reqwest::{Client, ClientBuilder};

use crate::core::assembler::{Assembler, Encoder, FfmpegEncoder, MergeOutcome};
use crate::core::coordinator::{DownloadCoordinator, JobReport};
use crate::core::error::{Error, Result};
use crate::core::fetcher::SegmentFetcher;
use crate::core::job::Job;
use crate::core::options::JobOptions;
use crate::core::playlist::{PlaylistResolver, SegmentRef};

/// Shared HTTP client, one connection pool for every job
static GLOBAL_CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .tcp_keepalive(Duration::from_secs(60))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(32)
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(format!("hls-dl/{}", env!("HLS_DL_VERSION")))
        .build()
        .unwrap_or_else(|_| Client::new())
});

/// What happened to a job that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Segments fetched and merged (or merge skipped) into `output`
    Completed { output: PathBuf, segments: usize },
    /// Output existed before the job started, nothing was fetched
    AlreadyExists(PathBuf),
    /// Playlist resolved to zero segments
    Empty,
}

/// A job that failed, with its cause
#[derive(Debug)]
pub struct JobFailure {
    pub job: Job,
    pub error: Error,
}

/// Totals of a batch run
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub completed: usize,
    pub skipped: usize,
    pub empty: usize,
    pub failed: Vec<JobFailure>,
    /// Jobs left unstarted after cancellation
    pub not_started: usize,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.not_started == 0
    }
}

/// High-level downloader running whole jobs
pub struct HlsDownloader {
    client: Client,
    options: JobOptions,
    encoder: Arc<dyn Encoder>,
}

impl Default for HlsDownloader {
    fn default() -> Self {
        Self::new(JobOptions::default())
    }
}

impl HlsDownloader {
    /// Create a downloader using the shared client and ffmpeg
    pub fn new(options: JobOptions) -> Self {
        let encoder = Arc::new(FfmpegEncoder::new(options.ffmpeg.clone()));
        Self {
            client: GLOBAL_CLIENT.clone(),
            options,
            encoder,
        }
    }

    /// Replace the HTTP client
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Replace the merge step
    pub fn with_encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    /// Resolve a playlist without downloading anything
    pub async fn resolve(&self, playlist_url: &str) -> Result<Vec<SegmentRef>> {
        PlaylistResolver::new(self.client.clone(), self.options.segment_suffix.clone())
            .resolve(playlist_url)
            .await
    }

    /// Fetch every segment of a resolved job into its cache directory
    pub async fn download_segments(&self, job_id: &str, segments: &[SegmentRef]) -> Result<JobReport> {
        DownloadCoordinator::new(SegmentFetcher::new(self.client.clone()), &self.options.temp_dir)
            .with_concurrency(self.options.concurrency)
            .with_progress(self.options.progress.clone())
            .with_cancel(self.options.cancel.clone())
            .run(job_id, segments)
            .await
    }

    /// Merge a job's cached segments into `output_name`
    pub async fn merge(
        &self,
        job_id: &str,
        segments: &[SegmentRef],
        output_name: &str,
    ) -> Result<MergeOutcome> {
        Assembler::new(&*self.encoder, &self.options.temp_dir, &self.options.output_dir)
            .merge(job_id, segments, output_name)
            .await
    }

    /// Run one job end to end: resolve, fetch, merge, optionally clean
    pub async fn run_job(&self, job: &Job) -> Result<JobOutcome> {
        let output_name = job.output_name(&self.options.output_extension)?;
        let output = self.options.output_dir.join(&output_name);

        if exists(&output).await? {
            info!("File already exists: {}", output.display());
            return Ok(JobOutcome::AlreadyExists(output));
        }

        let job_id = job.id()?;
        let segments = self.resolve(&job.url).await?;
        if segments.is_empty() {
            warn!("Playlist {} lists no segments, nothing to do", job.url);
            return Ok(JobOutcome::Empty);
        }

        info!("Resolved {} segments for {} (job {job_id})", segments.len(), job.url);

        let report = self.download_segments(&job_id, &segments).await?;
        for failure in &report.failed {
            error!(
                "Segment {} of {} failed: {}",
                failure.index, job.url, failure.error
            );
        }
        report.into_result()?;

        let merged = self.merge(&job_id, &segments, &output_name).await?;
        let output = match merged {
            MergeOutcome::Merged(path) => {
                info!("Merged into {}", path.display());
                path
            }
            MergeOutcome::Skipped(path) => path,
        };

        if self.options.clean {
            let job_dir = self.options.job_dir(&job_id);
            if let Err(e) = tokio::fs::remove_dir_all(&job_dir).await {
                warn!("Failed to clean {}: {e}", job_dir.display());
            }
        }

        Ok(JobOutcome::Completed {
            output,
            segments: segments.len(),
        })
    }

    /// Run jobs sequentially, continuing past failures
    ///
    /// Only failing to create the output or temp directory aborts the batch.
    pub async fn run_batch(&self, jobs: &[Job]) -> Result<BatchSummary> {
        for dir in [&self.options.output_dir, &self.options.temp_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::storage(dir, e))?;
        }

        let mut summary = BatchSummary::default();

        for (position, job) in jobs.iter().enumerate() {
            if self.options.is_cancelled() {
                summary.not_started = jobs.len() - position;
                warn!("Cancelled, {} jobs not started", summary.not_started);
                break;
            }

            match self.run_job(job).await {
                Ok(JobOutcome::Completed { .. }) => summary.completed += 1,
                Ok(JobOutcome::AlreadyExists(_)) => summary.skipped += 1,
                Ok(JobOutcome::Empty) => summary.empty += 1,
                Err(e) => {
                    error!("Job {} failed: {e}", job.url);
                    summary.failed.push(JobFailure {
                        job: job.clone(),
                        error: e,
                    });
                }
            }
        }

        Ok(summary)
    }
}

async fn exists(path: &Path) -> Result<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| Error::storage(path, e))
}
