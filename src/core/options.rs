//! Per-job configuration for hls-dl
//!
//! Everything a job needs to know about where it writes, how hard it hits the
//! origin and how it merges lives here. Nothing is process-global.

use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Default number of in-flight segment fetches per job
pub const DEFAULT_CONCURRENCY: usize = 25;

/// Progress callback function type, called with `(completed, total)` segments
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Options for a download job
#[derive(Clone)]
pub struct JobOptions {
    /// Directory receiving merged output files
    pub output_dir: PathBuf,

    /// Directory holding one segment cache directory per job
    pub temp_dir: PathBuf,

    /// Maximum number of concurrent segment fetches
    pub concurrency: usize,

    /// Delete the job's segment cache after a successful merge
    pub clean: bool,

    /// Suffix identifying segment lines in a chunk-list
    pub segment_suffix: String,

    /// Extension appended to output names, without the dot
    pub output_extension: String,

    /// Encoder program used for the merge step
    pub ffmpeg: PathBuf,

    /// Optional progress callback
    pub progress: Option<ProgressCallback>,

    /// Stops dispatching new fetches and jobs once triggered
    pub cancel: Option<CancellationToken>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("dist"),
            temp_dir: PathBuf::from("temp"),
            concurrency: DEFAULT_CONCURRENCY,
            clean: false,
            segment_suffix: ".ts".to_string(),
            output_extension: "mp3".to_string(),
            ffmpeg: PathBuf::from("ffmpeg"),
            progress: None,
            cancel: None,
        }
    }
}

impl JobOptions {
    /// Cache directory for one job
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.temp_dir.join(job_id)
    }

    /// Whether the cancellation token (if any) has fired
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|token| token.is_cancelled())
    }
}
