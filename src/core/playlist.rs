//! Playlist resolution for hls-dl
//!
//! Turns a master playlist URL into the flat, ordered list of segments it
//! describes. Resolution goes at most one level deep: the playlist lists
//! chunk-lists, and each chunk-list lists segment files.
//!
//! References are resolved by swapping the last path segment of the URL that
//! listed them. This is not RFC 3986 relative resolution; origins that nest
//! segments in subdirectories are not supported.

use log::{debug, warn};
use reqwest::Client;
use url::{Position, Url};

use crate::core::error::{Error, Result};

/// One segment of a job, in merge order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRef {
    /// 0-based position in playback order
    pub index: usize,
    /// Absolute URL of the segment
    pub url: String,
}

/// Fetches and flattens a two-level HLS manifest
#[derive(Clone)]
pub struct PlaylistResolver {
    client: Client,
    segment_suffix: String,
}

impl PlaylistResolver {
    pub fn new(client: Client, segment_suffix: impl Into<String>) -> Self {
        Self {
            client,
            segment_suffix: segment_suffix.into(),
        }
    }

    /// Resolve `playlist_url` into ordered segment references
    ///
    /// An empty playlist resolves to an empty list. Each top-level reference
    /// is fetched as a chunk-list; a chunk-list without any segment lines is
    /// kept as a direct segment instead, so flat playlists survive.
    pub async fn resolve(&self, playlist_url: &str) -> Result<Vec<SegmentRef>> {
        Url::parse(playlist_url)?;

        let body = self.fetch_text(playlist_url).await?;
        let mut urls = Vec::new();

        for reference in references(&body) {
            let target = substitute_last_segment(playlist_url, reference)?;

            if self.is_segment(reference) {
                debug!("Direct segment reference: {target}");
                urls.push(target);
                continue;
            }

            let chunk_list = self.fetch_text(&target).await?;
            let before = urls.len();
            for line in references(&chunk_list).filter(|line| self.is_segment(line)) {
                urls.push(substitute_last_segment(&target, line)?);
            }

            let found = urls.len() - before;
            if found == 0 {
                warn!("No segments listed in {target}, treating it as a segment");
                urls.push(target);
            } else {
                debug!("Chunk-list {target} lists {found} segments");
            }
        }

        Ok(urls
            .into_iter()
            .enumerate()
            .map(|(index, url)| SegmentRef { index, url })
            .collect())
    }

    /// Whether a reference line names a segment file
    fn is_segment(&self, reference: &str) -> bool {
        let path = reference.split(['?', '#']).next().unwrap_or(reference);
        let last = path.rsplit('/').next().unwrap_or(path);
        last.ends_with(self.segment_suffix.as_str())
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(url, format!("HTTP {status}")));
        }
        Ok(response.text().await?)
    }
}

/// Non-empty, non-comment lines of a manifest, trimmed
fn references(body: &str) -> impl Iterator<Item = &str> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Replace the last path segment of `base` with `reference`
///
/// Absolute references are returned as they are. The query of `base` is kept
/// unless the reference carries its own.
pub fn substitute_last_segment(base: &str, reference: &str) -> Result<String> {
    if let Ok(absolute) = Url::parse(reference) {
        if absolute.has_host() {
            return Ok(absolute.to_string());
        }
    }

    let url = Url::parse(base)?;
    if url.cannot_be_a_base() {
        return Err(Error::Parse(format!("{base} has no path to resolve against")));
    }

    let path = url.path();
    let path_start = url[..Position::BeforePath].len();
    let segment_start = path_start + path.rfind('/').map_or(0, |slash| slash + 1);

    let tail = if reference.contains('?') {
        ""
    } else {
        &url[Position::AfterPath..]
    };

    let candidate = format!("{}{}{}", &url.as_str()[..segment_start], reference, tail);
    let resolved = Url::parse(&candidate)
        .map_err(|e| Error::Parse(format!("cannot resolve '{reference}' against {base}: {e}")))?;
    Ok(resolved.to_string())
}
