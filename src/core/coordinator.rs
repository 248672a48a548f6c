//! Bounded-concurrency download of all segments of a job
//!
//! Fetches run through `buffer_unordered`, so they complete in any order.
//! Nothing here tracks order: each segment lands in the slot named after its
//! index, and the assembler reads slots back by index.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::core::error::{Error, Result};
use crate::core::fetcher::{slot_path, FetchOutcome, SegmentFetcher};
use crate::core::options::{ProgressCallback, DEFAULT_CONCURRENCY};
use crate::core::playlist::SegmentRef;

/// A segment that could not be fetched
#[derive(Debug)]
pub struct SegmentFailure {
    pub index: usize,
    pub url: String,
    pub error: Error,
}

/// Per-segment outcome of a coordinator run
#[derive(Debug, Default)]
pub struct JobReport {
    /// Number of segments in the job
    pub total: usize,
    /// Indices fetched over the network during this run
    pub downloaded: Vec<usize>,
    /// Indices whose slot already existed
    pub cached: Vec<usize>,
    /// Indices that failed, with their cause
    pub failed: Vec<SegmentFailure>,
    /// Indices never dispatched because the run was cancelled
    pub cancelled: Vec<usize>,
}

impl JobReport {
    /// All indices whose slot is now populated, ascending
    pub fn succeeded(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .downloaded
            .iter()
            .chain(self.cached.iter())
            .copied()
            .collect();
        indices.sort_unstable();
        indices
    }

    /// Indices that did not end up with a populated slot, ascending
    pub fn missing(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .failed
            .iter()
            .map(|f| f.index)
            .chain(self.cancelled.iter().copied())
            .collect();
        indices.sort_unstable();
        indices
    }

    /// True when every segment has a populated slot
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }

    /// Collapse the report into a job-level result
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::IncompleteJob {
                failed: self.failed.len() + self.cancelled.len(),
                total: self.total,
            })
        }
    }
}

enum SegmentStatus {
    Fetched(FetchOutcome),
    Failed(Error),
    Cancelled,
}

/// Runs a [`SegmentFetcher`] over every segment of a job
pub struct DownloadCoordinator {
    fetcher: SegmentFetcher,
    temp_dir: PathBuf,
    concurrency: usize,
    progress: Option<ProgressCallback>,
    cancel: Option<CancellationToken>,
}

impl DownloadCoordinator {
    pub fn new(fetcher: SegmentFetcher, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            temp_dir: temp_dir.into(),
            concurrency: DEFAULT_CONCURRENCY,
            progress: None,
            cancel: None,
        }
    }

    /// Set the maximum number of in-flight fetches (at least 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: Option<CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Directory holding the slots of `job_id`
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.temp_dir.join(job_id)
    }

    /// Fetch every segment of `job_id` and report per-segment results
    ///
    /// Only setup problems (slot overflow, directory creation) return `Err`.
    /// Segment failures are collected in the report and never stop siblings.
    pub async fn run(&self, job_id: &str, segments: &[SegmentRef]) -> Result<JobReport> {
        let job_dir = self.job_dir(job_id);

        let work = segments
            .iter()
            .map(|segment| slot_path(&job_dir, segment.index).map(|slot| (segment, slot)))
            .collect::<Result<Vec<_>>>()?;

        tokio::fs::create_dir_all(&job_dir)
            .await
            .map_err(|e| Error::storage(&job_dir, e))?;

        let total = segments.len();
        info!("Downloading {total} segments into {}", job_dir.display());

        if let Some(ref progress) = self.progress {
            progress(0, total);
        }

        let completed = AtomicUsize::new(0);

        let results: Vec<(&SegmentRef, SegmentStatus)> = futures::stream::iter(work)
            .map(|(segment, slot)| {
                let completed = &completed;
                async move {
                    let status = self.fetch_one(segment, &slot).await;
                    if !matches!(status, SegmentStatus::Cancelled) {
                        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                        if let Some(ref progress) = self.progress {
                            progress(done, total);
                        }
                    }
                    (segment, status)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = JobReport {
            total,
            ..Default::default()
        };

        for (segment, status) in results {
            match status {
                SegmentStatus::Fetched(FetchOutcome::Cached) => report.cached.push(segment.index),
                SegmentStatus::Fetched(FetchOutcome::Downloaded(_)) => {
                    report.downloaded.push(segment.index)
                }
                SegmentStatus::Failed(error) => {
                    warn!("Segment {} failed ({}): {error}", segment.index, segment.url);
                    report.failed.push(SegmentFailure {
                        index: segment.index,
                        url: segment.url.clone(),
                        error,
                    });
                }
                SegmentStatus::Cancelled => report.cancelled.push(segment.index),
            }
        }

        report.downloaded.sort_unstable();
        report.cached.sort_unstable();
        report.failed.sort_by_key(|f| f.index);
        report.cancelled.sort_unstable();

        info!(
            "Segments: {} downloaded, {} cached, {} failed, {} cancelled",
            report.downloaded.len(),
            report.cached.len(),
            report.failed.len(),
            report.cancelled.len()
        );

        Ok(report)
    }

    async fn fetch_one(&self, segment: &SegmentRef, slot: &Path) -> SegmentStatus {
        if self.cancel.as_ref().is_some_and(|token| token.is_cancelled()) {
            return SegmentStatus::Cancelled;
        }

        match self.fetcher.fetch(segment, slot).await {
            Ok(outcome) => {
                if let FetchOutcome::Downloaded(bytes) = outcome {
                    debug!("Downloaded segment {} ({bytes} bytes)", segment.index);
                }
                SegmentStatus::Fetched(outcome)
            }
            Err(error) => SegmentStatus::Failed(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};
    use reqwest::Client;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn segments(server: &MockServer, count: usize) -> Vec<SegmentRef> {
        (0..count)
            .map(|index| SegmentRef {
                index,
                url: format!("{}/p/seg{index}.ts", server.uri()),
            })
            .collect()
    }

    fn coordinator(temp_dir: &Path) -> DownloadCoordinator {
        DownloadCoordinator::new(SegmentFetcher::new(Client::new()), temp_dir)
    }

    #[tokio::test]
    async fn test_run_isolates_failed_segment() {
        let server = MockServer::start().await;
        for (index, status) in [(0, 200), (1, 500), (2, 200)] {
            Mock::given(method("GET"))
                .and(path(format!("/p/seg{index}.ts")))
                .respond_with(ResponseTemplate::new(status).set_body_bytes(vec![index as u8; 8]))
                .mount(&server)
                .await;
        }

        let dir = tempdir().unwrap();
        let coordinator = coordinator(dir.path());
        let report = coordinator.run("job", &segments(&server, 3)).await.unwrap();

        assert_eq!(report.downloaded, vec![0, 2]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].index, 1);
        assert!(report.failed[0].url.ends_with("/p/seg1.ts"));
        assert!(!report.is_success());
        assert_eq!(report.missing(), vec![1]);
        assert_eq!(report.succeeded(), vec![0, 2]);

        let job_dir = dir.path().join("job");
        assert!(job_dir.join("0000.ts").exists());
        assert!(!job_dir.join("0001.ts").exists());
        assert!(job_dir.join("0002.ts").exists());

        match report.into_result() {
            Err(Error::IncompleteJob { failed, total }) => {
                assert_eq!(failed, 1);
                assert_eq!(total, 3);
            }
            other => panic!("Expected incomplete job, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rerun_with_cached_slots_makes_no_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let job_dir = dir.path().join("job");
        std::fs::create_dir_all(&job_dir).unwrap();
        for index in 0..3 {
            std::fs::write(job_dir.join(slot_name_for(index)), b"cached").unwrap();
        }

        let report = coordinator(dir.path())
            .run("job", &segments(&server, 3))
            .await
            .unwrap();

        assert_eq!(report.cached, vec![0, 1, 2]);
        assert!(report.downloaded.is_empty());
        assert!(report.is_success());
    }

    fn slot_name_for(index: usize) -> String {
        crate::core::fetcher::slot_name(index).unwrap()
    }

    #[tokio::test]
    async fn test_run_respects_concurrency_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"x".to_vec())
                    .set_delay(Duration::from_millis(100)),
            )
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let started = Instant::now();
        let report = coordinator(dir.path())
            .with_concurrency(3)
            .run("job", &segments(&server, 12))
            .await
            .unwrap();
        let elapsed = started.elapsed();

        // 12 delayed responses through 3 slots need at least 4 rounds
        assert_eq!(report.downloaded.len(), 12);
        assert!(elapsed >= Duration::from_millis(400), "finished too fast: {elapsed:?}");
        assert_eq!(server.received_requests().await.unwrap().len(), 12);
    }

    #[tokio::test]
    async fn test_progress_reports_every_completion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()))
            .mount(&server)
            .await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let progress: ProgressCallback = {
            let seen = Arc::clone(&seen);
            Arc::new(move |done, total| seen.lock().unwrap().push((done, total)))
        };

        let dir = tempdir().unwrap();
        coordinator(dir.path())
            .with_progress(Some(progress))
            .run("job", &segments(&server, 4))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.first(), Some(&(0, 4)));
        assert_eq!(seen.last(), Some(&(4, 4)));
        assert_eq!(seen.len(), 5);
    }

    #[tokio::test]
    async fn test_cancelled_run_dispatches_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let token = CancellationToken::new();
        token.cancel();

        let dir = tempdir().unwrap();
        let report = coordinator(dir.path())
            .with_cancel(Some(token))
            .run("job", &segments(&server, 3))
            .await
            .unwrap();

        assert_eq!(report.cancelled, vec![0, 1, 2]);
        assert!(!report.is_success());
        assert!(dir.path().join("job").is_dir());
    }

    #[tokio::test]
    async fn test_empty_job_creates_namespace() {
        let dir = tempdir().unwrap();
        let report = coordinator(dir.path()).run("empty", &[]).await.unwrap();

        assert_eq!(report.total, 0);
        assert!(report.is_success());
        assert!(dir.path().join("empty").is_dir());
    }

    #[tokio::test]
    async fn test_slot_overflow_fails_before_fan_out() {
        let dir = tempdir().unwrap();
        let too_many = vec![SegmentRef {
            index: 10_000,
            url: "http://127.0.0.1:9/seg.ts".to_string(),
        }];

        let result = coordinator(dir.path()).run("big", &too_many).await;

        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(!dir.path().join("big").exists());
    }
}
