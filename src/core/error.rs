//! Error types for hls-dl
//!
//! Every failure a job can hit maps onto one variant here. Fetch, parse,
//! merge and storage failures keep enough context (URL, path, index) to be
//! diagnosed from a single log line.

use std::fmt;
use std::path::PathBuf;

/// Main error type for hls-dl operations
#[derive(Debug)]
pub enum Error {
    /// Playlist or segment HTTP/transport failure
    Fetch { url: String, message: String },

    /// Malformed manifest content or URL
    Parse(String),

    /// External encoder failed to spawn or exited non-zero
    Merge(String),

    /// Filesystem create/write/rename failure
    Storage { path: PathBuf, source: std::io::Error },

    /// Invalid job specification or option
    InvalidInput(String),

    /// One or more segments of a job could not be fetched
    IncompleteJob { failed: usize, total: usize },
}

impl Error {
    /// Build a fetch error for `url`
    pub fn fetch(url: &str, message: impl Into<String>) -> Self {
        Error::Fetch {
            url: url.to_string(),
            message: message.into(),
        }
    }

    /// Wrap an I/O error with the path it happened on
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Storage {
            path: path.into(),
            source,
        }
    }

    /// Whether this error came from the network side
    pub fn is_fetch(&self) -> bool {
        matches!(self, Error::Fetch { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Fetch { url, message } => {
                write!(f, "Fetch failed for {}: {}", url, message)
            }
            Error::Parse(msg) => {
                write!(f, "Parse error: {}", msg)
            }
            Error::Merge(msg) => {
                write!(f, "Merge failed: {}", msg)
            }
            Error::Storage { path, source } => {
                write!(f, "Storage error at {}: {}", path.display(), source)
            }
            Error::InvalidInput(msg) => {
                write!(f, "Invalid input: {}", msg)
            }
            Error::IncompleteJob { failed, total } => {
                write!(f, "{} of {} segments failed to download", failed, total)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Storage { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown url>".to_string());
        let message = if err.is_connect() {
            format!("connection failed: {err}")
        } else if err.is_timeout() {
            format!("timed out: {err}")
        } else {
            err.to_string()
        };
        Error::Fetch { url, message }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Parse(format!("invalid URL: {err}"))
    }
}

/// Convenience result type for hls-dl operations
pub type Result<T> = std::result::Result<T, Error>;
