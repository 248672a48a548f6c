//! Merge of downloaded segments into the final output file
//!
//! The encoder is opaque: it gets the slot paths in index order and a
//! destination, and its exit status is the only thing inspected.

use std::path::{Path, PathBuf};
use futures::future::BoxFuture;
use log::info;
use tokio::process::Command;

use crate::core::error::{Error, Result};
use crate::core::fetcher::slot_path;
use crate::core::job::validate_output_name;
use crate::core::playlist::SegmentRef;

/// External merge step over an ordered list of segment files
pub trait Encoder: Send + Sync {
    /// Produce `output` from `inputs`, in the given order
    fn encode<'a>(&'a self, inputs: &'a [PathBuf], output: &'a Path) -> BoxFuture<'a, Result<()>>;
}

/// Runs ffmpeg with a fixed MP3 argument template
///
/// stdout and stderr are inherited so ffmpeg's own progress stays visible.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Argument list for one invocation
    pub fn args(inputs: &[PathBuf], output: &Path) -> Vec<String> {
        let concat = inputs
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("|");

        vec![
            "-i".to_string(),
            format!("concat:{concat}"),
            "-vn".to_string(),
            "-acodec".to_string(),
            "libmp3lame".to_string(),
            "-ab".to_string(),
            "256k".to_string(),
            "-ar".to_string(),
            "44100".to_string(),
            "-ac".to_string(),
            "2".to_string(),
            "-f".to_string(),
            "mp3".to_string(),
            "-y".to_string(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

impl Encoder for FfmpegEncoder {
    fn encode<'a>(&'a self, inputs: &'a [PathBuf], output: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let program = self.program.display();
            let status = Command::new(&self.program)
                .args(Self::args(inputs, output))
                .stdin(std::process::Stdio::null())
                .status()
                .await
                .map_err(|e| Error::Merge(format!("failed to spawn {program}: {e}")))?;

            if !status.success() {
                return Err(Error::Merge(format!("{program} exited with {status}")));
            }
            Ok(())
        })
    }
}

/// Result of a merge request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Encoder ran and produced the output
    Merged(PathBuf),
    /// Output already existed, encoder not invoked
    Skipped(PathBuf),
}

/// Encodes the slots of a job into one output file
pub struct Assembler<'e> {
    encoder: &'e dyn Encoder,
    temp_dir: PathBuf,
    output_dir: PathBuf,
}

impl<'e> Assembler<'e> {
    pub fn new(
        encoder: &'e dyn Encoder,
        temp_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            encoder,
            temp_dir: temp_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Slot paths of `segments`, ascending by index
    pub fn ordered_inputs(&self, job_id: &str, segments: &[SegmentRef]) -> Result<Vec<PathBuf>> {
        let job_dir = self.temp_dir.join(job_id);
        let mut indices: Vec<usize> = segments.iter().map(|s| s.index).collect();
        indices.sort_unstable();
        indices
            .into_iter()
            .map(|index| slot_path(&job_dir, index))
            .collect()
    }

    /// Merge the slots of `job_id` into `output_dir/output_name`
    ///
    /// Does nothing if the output exists. The encoder writes to a `.part`
    /// sibling that only replaces the output once it exits successfully.
    pub async fn merge(
        &self,
        job_id: &str,
        segments: &[SegmentRef],
        output_name: &str,
    ) -> Result<MergeOutcome> {
        validate_output_name(output_name)?;
        let output = self.output_dir.join(output_name);
        if tokio::fs::try_exists(&output)
            .await
            .map_err(|e| Error::storage(&output, e))?
        {
            info!("Output already exists, skipping merge: {}", output.display());
            return Ok(MergeOutcome::Skipped(output));
        }

        if segments.is_empty() {
            return Err(Error::Merge(format!("no segments to merge into {output_name}")));
        }

        let inputs = self.ordered_inputs(job_id, segments)?;
        for input in &inputs {
            if !tokio::fs::try_exists(input)
                .await
                .map_err(|e| Error::storage(input, e))?
            {
                return Err(Error::Merge(format!(
                    "segment slot {} is missing",
                    input.display()
                )));
            }
        }

        let partial = self.output_dir.join(format!("{output_name}.part"));
        info!("Merging {} segments into {}", inputs.len(), output.display());

        if let Err(e) = self.encoder.encode(&inputs, &partial).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        tokio::fs::rename(&partial, &output)
            .await
            .map_err(|e| Error::storage(&output, e))?;

        Ok(MergeOutcome::Merged(output))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Concatenates input bytes and records every call
    #[derive(Default)]
    pub(crate) struct ConcatEncoder {
        pub calls: AtomicUsize,
        pub inputs: Mutex<Vec<PathBuf>>,
    }

    impl Encoder for ConcatEncoder {
        fn encode<'a>(&'a self, inputs: &'a [PathBuf], output: &'a Path) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                *self.inputs.lock().unwrap() = inputs.to_vec();
                let mut merged = Vec::new();
                for input in inputs {
                    merged.extend(tokio::fs::read(input).await.map_err(|e| Error::storage(input, e))?);
                }
                tokio::fs::write(output, merged)
                    .await
                    .map_err(|e| Error::storage(output, e))
            })
        }
    }

    struct FailingEncoder;

    impl Encoder for FailingEncoder {
        fn encode<'a>(&'a self, _inputs: &'a [PathBuf], output: &'a Path) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                tokio::fs::write(output, b"half").await.ok();
                Err(Error::Merge("encoder exited with exit status: 1".to_string()))
            })
        }
    }

    fn refs(count: usize) -> Vec<SegmentRef> {
        (0..count)
            .map(|index| SegmentRef {
                index,
                url: format!("https://host/p/seg{index}.ts"),
            })
            .collect()
    }

    fn populate(temp_dir: &Path, job_id: &str, count: usize) {
        let job_dir = temp_dir.join(job_id);
        std::fs::create_dir_all(&job_dir).unwrap();
        for index in 0..count {
            std::fs::write(slot_path(&job_dir, index).unwrap(), format!("[{index}]")).unwrap();
        }
    }

    #[test]
    fn test_ffmpeg_args_template() {
        let inputs = vec![PathBuf::from("temp/j/0000.ts"), PathBuf::from("temp/j/0001.ts")];
        let args = FfmpegEncoder::args(&inputs, Path::new("dist/out.mp3"));
        assert_eq!(
            args,
            vec![
                "-i", "concat:temp/j/0000.ts|temp/j/0001.ts", "-vn", "-acodec", "libmp3lame",
                "-ab", "256k", "-ar", "44100", "-ac", "2", "-f", "mp3", "-y", "dist/out.mp3",
            ]
        );
    }

    #[test]
    fn test_ordered_inputs_sorts_by_index() {
        let encoder = ConcatEncoder::default();
        let assembler = Assembler::new(&encoder, "temp", "dist");
        let mut shuffled = refs(3);
        shuffled.reverse();

        let inputs = assembler.ordered_inputs("job", &shuffled).unwrap();

        let base = PathBuf::from("temp").join("job");
        assert_eq!(
            inputs,
            vec![base.join("0000.ts"), base.join("0001.ts"), base.join("0002.ts")]
        );
    }

    #[tokio::test]
    async fn test_merge_concatenates_in_index_order() {
        let temp = tempdir().unwrap();
        let out = tempdir().unwrap();
        populate(temp.path(), "job", 3);
        let encoder = ConcatEncoder::default();
        let assembler = Assembler::new(&encoder, temp.path(), out.path());

        let outcome = assembler.merge("job", &refs(3), "show.mp3").await.unwrap();

        let output = out.path().join("show.mp3");
        assert_eq!(outcome, MergeOutcome::Merged(output.clone()));
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "[0][1][2]");
        assert!(!out.path().join("show.mp3.part").exists());
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_merge_skips_existing_output() {
        let temp = tempdir().unwrap();
        let out = tempdir().unwrap();
        populate(temp.path(), "job", 2);
        std::fs::write(out.path().join("show.mp3"), b"done").unwrap();
        let encoder = ConcatEncoder::default();
        let assembler = Assembler::new(&encoder, temp.path(), out.path());

        let outcome = assembler.merge("job", &refs(2), "show.mp3").await.unwrap();

        assert!(matches!(outcome, MergeOutcome::Skipped(_)));
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read(out.path().join("show.mp3")).unwrap(), b"done");
    }

    #[tokio::test]
    async fn test_merge_rejects_output_outside_output_dir() {
        let temp = tempdir().unwrap();
        let out = tempdir().unwrap();
        populate(temp.path(), "job", 2);
        let encoder = ConcatEncoder::default();
        let assembler = Assembler::new(&encoder, temp.path(), out.path());
        let escaped = temp.path().join("escaped.mp3");

        let result = assembler
            .merge("job", &refs(2), &escaped.to_string_lossy())
            .await;

        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 0);
        assert!(!escaped.exists());
    }

    #[tokio::test]
    async fn test_merge_refuses_incomplete_slots() {
        let temp = tempdir().unwrap();
        let out = tempdir().unwrap();
        populate(temp.path(), "job", 2);
        let encoder = ConcatEncoder::default();
        let assembler = Assembler::new(&encoder, temp.path(), out.path());

        let result = assembler.merge("job", &refs(3), "show.mp3").await;

        match result {
            Err(Error::Merge(msg)) => assert!(msg.contains("0002.ts")),
            other => panic!("Expected merge error, got {other:?}"),
        }
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_encode_leaves_no_output() {
        let temp = tempdir().unwrap();
        let out = tempdir().unwrap();
        populate(temp.path(), "job", 1);
        let assembler = Assembler::new(&FailingEncoder, temp.path(), out.path());

        let result = assembler.merge("job", &refs(1), "show.mp3").await;

        assert!(matches!(result, Err(Error::Merge(_))));
        assert!(!out.path().join("show.mp3").exists());
        assert!(!out.path().join("show.mp3.part").exists());
    }

    #[tokio::test]
    async fn test_ffmpeg_spawn_failure_is_merge_error() {
        let out = tempdir().unwrap();
        let encoder = FfmpegEncoder::new("/nonexistent/hls-dl-test-encoder");
        let inputs = vec![PathBuf::from("0000.ts")];

        let result = encoder.encode(&inputs, &out.path().join("x.mp3")).await;

        match result {
            Err(Error::Merge(msg)) => assert!(msg.contains("failed to spawn")),
            other => panic!("Expected merge error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_merge_error() {
        let out = tempdir().unwrap();
        let encoder = FfmpegEncoder::new("false");
        let inputs = vec![PathBuf::from("0000.ts")];

        let result = encoder.encode(&inputs, &out.path().join("x.mp3")).await;

        match result {
            Err(Error::Merge(msg)) => assert!(msg.contains("exited with")),
            other => panic!("Expected merge error, got {other:?}"),
        }
    }
}
