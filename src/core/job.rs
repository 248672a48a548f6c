//! Job entries
//!
//! A job is a playlist URL plus an optional output name, written either as a
//! bare URL or as `name:url`.

use std::path::{Component, Path};
use url::Url;

use crate::core::error::{Error, Result};
use crate::core::hash;

/// One playlist to download and merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Requested output file name, if any
    pub name: Option<String>,
    /// Absolute playlist URL
    pub url: String,
}

impl Job {
    pub fn new(name: Option<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.filter(|n| !n.trim().is_empty()),
            url: url.into(),
        }
    }

    /// Parse `url` or `name:url`
    ///
    /// A string that is already an absolute URL is never split on its
    /// scheme separator.
    pub fn parse(entry: &str) -> Result<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(Error::InvalidInput("empty job entry".to_string()));
        }

        if is_absolute_url(entry) {
            return Ok(Self::new(None, entry));
        }

        let (name, url) = entry
            .split_once(':')
            .ok_or_else(|| Error::InvalidInput(format!("'{entry}' is neither a URL nor name:url")))?;
        let url = url.trim();

        if !is_absolute_url(url) {
            return Err(Error::Parse(format!("'{url}' is not an absolute playlist URL")));
        }

        let name = name.trim();
        if !name.is_empty() {
            validate_output_name(name)?;
        }

        Ok(Self::new(Some(name.to_string()), url))
    }

    /// Content key namespacing this job's segment cache
    pub fn id(&self) -> Result<String> {
        hash::job_id(&self.url)
    }

    /// Output file name, with `extension` appended if missing
    ///
    /// Jobs without a name are stored as `<job id>.<extension>`.
    pub fn output_name(&self, extension: &str) -> Result<String> {
        let suffix = format!(".{extension}");
        let name = match &self.name {
            Some(name) if name.ends_with(&suffix) => name.clone(),
            Some(name) => format!("{name}{suffix}"),
            None => format!("{}{suffix}", self.id()?),
        };
        validate_output_name(&name)?;
        Ok(name)
    }
}

/// Reject output names that would resolve outside the output directory
///
/// A valid name is a single plain file name: not absolute, no separators,
/// no `.` or `..`.
pub fn validate_output_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    let single_file = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single_file || name.contains(['/', '\\']) || name.contains("..") {
        return Err(Error::InvalidInput(format!(
            "output name '{name}' must be a plain file name"
        )));
    }
    Ok(())
}

fn is_absolute_url(candidate: &str) -> bool {
    Url::parse(candidate).is_ok_and(|url| url.has_host())
}
