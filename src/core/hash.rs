//! Content keys for job namespaces
//!
//! A job is keyed by the MD5 of its playlist URL path, so the same playlist
//! served with different query tokens still maps onto the same segment cache.

use url::Url;

use crate::core::error::Result;

/// Hex digest of `input`, always 32 lowercase characters
pub fn content_key(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Derive the job identifier from a playlist URL's path component
pub fn job_id(playlist_url: &str) -> Result<String> {
    let url = Url::parse(playlist_url)?;
    Ok(content_key(url.path()))
}
