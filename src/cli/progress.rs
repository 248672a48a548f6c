//! CLI-specific progress handling for hls-dl
//!
//! One bar per job, counting segments rather than bytes.

use std::sync::Arc;
use indicatif::{ProgressBar, ProgressStyle};
use hls_dl::ProgressCallback;

/// Creates a segment-count progress bar for CLI display
pub fn create_progress_bar(total_segments: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_segments);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} segments ({percent}%) ETA: {eta}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

/// Progress manager shared by every job of a run
pub struct ProgressManager {
    pub pb: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(message: &str) -> Self {
        let pb = create_progress_bar(0);

        eprintln!("{}", message);

        Self { pb }
    }

    /// Callback driving the bar; a report of `0` completed starts a new job
    pub fn callback(&self) -> ProgressCallback {
        let pb = self.pb.clone();
        Arc::new(move |completed, total| {
            if completed == 0 {
                pb.reset();
                pb.set_length(total as u64);
            }
            pb.set_position(completed as u64);
            if completed >= total {
                pb.finish_with_message("✅ Segments downloaded");
            }
        })
    }
}
