//! Single-segment download into a local slot
//!
//! Slots are named by zero-padded index so a plain lexicographic listing of a
//! job directory is already in merge order.

use std::path::{Path, PathBuf};
use futures::TryStreamExt;
use reqwest::Client;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::core::error::{Error, Result};
use crate::core::playlist::SegmentRef;

/// Number of digits in a slot file name
pub const SLOT_WIDTH: usize = 4;

/// Buffer size for streaming a segment body to disk
const BUFFER_SIZE: usize = 64 * 1024;

/// File name of the slot for `index`, e.g. `0007.ts`
///
/// Fails instead of widening the name, since a wider name would sort out of
/// order against existing slots.
pub fn slot_name(index: usize) -> Result<String> {
    if index >= 10usize.pow(SLOT_WIDTH as u32) {
        return Err(Error::InvalidInput(format!(
            "segment index {index} does not fit in a {SLOT_WIDTH}-digit slot name"
        )));
    }
    Ok(format!("{index:0width$}.ts", width = SLOT_WIDTH))
}

/// Full slot path for `index` inside a job directory
pub fn slot_path(job_dir: &Path, index: usize) -> Result<PathBuf> {
    Ok(job_dir.join(slot_name(index)?))
}

/// Temporary sibling a slot is written to before being renamed into place
fn partial_path(slot: &Path) -> PathBuf {
    let mut name = slot.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Result of a successful fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Slot was already populated, no request made
    Cached,
    /// Segment downloaded, with its size in bytes
    Downloaded(u64),
}

/// Downloads one segment at a time into its slot
#[derive(Clone)]
pub struct SegmentFetcher {
    client: Client,
}

impl SegmentFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetch `segment` into `slot` unless the slot already exists
    pub async fn fetch(&self, segment: &SegmentRef, slot: &Path) -> Result<FetchOutcome> {
        if tokio::fs::try_exists(slot)
            .await
            .map_err(|e| Error::storage(slot, e))?
        {
            return Ok(FetchOutcome::Cached);
        }

        let response = self.client.get(&segment.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(&segment.url, format!("HTTP {status}")));
        }

        let partial = partial_path(slot);
        let written = match write_body(&segment.url, response, &partial).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        commit_partial(&partial, slot).await?;
        Ok(FetchOutcome::Downloaded(written))
    }
}

/// Move a finished partial file into its slot, removing it if that fails
async fn commit_partial(partial: &Path, slot: &Path) -> Result<()> {
    if let Err(e) = tokio::fs::rename(partial, slot).await {
        let _ = tokio::fs::remove_file(partial).await;
        return Err(Error::storage(slot, e));
    }
    Ok(())
}

/// Stream a response body into `path`, returning the number of bytes written
async fn write_body(url: &str, response: reqwest::Response, path: &Path) -> Result<u64> {
    let mut reader = tokio_util::io::StreamReader::new(
        response.bytes_stream().map_err(std::io::Error::other),
    );
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| Error::storage(path, e))?;

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut written = 0u64;

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .await
            .map_err(|e| Error::fetch(url, format!("body read error: {e}")))?;

        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .await
            .map_err(|e| Error::storage(path, e))?;
        written += bytes_read as u64;
    }

    file.flush().await.map_err(|e| Error::storage(path, e))?;
    Ok(written)
}
