//! CLI-specific utilities for hls-dl
//!
//! This module contains code specific to the command-line interface,
//! separate from the core library functionality.

pub mod input;
pub mod progress;

pub use input::{collect_jobs, parse_job_list};
pub use progress::ProgressManager;
