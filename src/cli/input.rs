//! Job list assembly from command-line arguments and batch files

use hls_dl::{Error, Job, Result};

/// Parse a batch file: one `url` or `name:url` per line
///
/// Blank lines and lines starting with `#` are ignored. Line numbers in
/// errors are 1-based.
pub fn parse_job_list(contents: &str) -> Result<Vec<Job>> {
    contents
        .lines()
        .enumerate()
        .map(|(number, line)| (number + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(number, line)| {
            Job::parse(line).map_err(|e| Error::InvalidInput(format!("line {number}: {e}")))
        })
        .collect()
}

/// Build jobs from positional URLs, naming them `output` when given
///
/// A single output name cannot be shared by several URLs.
pub fn collect_jobs(urls: &[String], output: Option<&str>) -> Result<Vec<Job>> {
    if output.is_some() && urls.len() > 1 {
        return Err(Error::InvalidInput(
            "-o can only be used with a single playlist URL".to_string(),
        ));
    }

    urls.iter()
        .map(|url| {
            let job = Job::parse(url)?;
            Ok(match output {
                Some(name) => Job::new(Some(name.to_string()), job.url),
                None => job,
            })
        })
        .collect()
}
