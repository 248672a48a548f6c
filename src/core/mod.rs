//! Core library modules for hls-dl
//!
//! Leaf-first: hashing and options, playlist resolution, single-segment
//! fetch, bounded fan-out, merge, and the job runner tying them together.

pub mod error;
pub mod hash;
pub mod options;
pub mod playlist;
pub mod fetcher;
pub mod coordinator;
pub mod assembler;
pub mod job;
pub mod downloader;

// Re-export main types for internal use
pub use downloader::HlsDownloader;
pub use options::JobOptions;
