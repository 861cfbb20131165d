use std::path::PathBuf;
use std::time::Duration;

use crate::progress::PROGRESS_INTERVAL;
use crate::retry::RetryPolicy;

/// Configurable options for the download engine. Values come from the
/// settings collaborator; everything has a sensible default.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Exactly this many jobs may be `Downloading` at once.
    pub max_concurrent: usize,

    /// Transfer buffer size; the source is read in chunks of roughly this
    /// size.
    pub chunk_size: usize,

    /// Minimum spacing between externally visible progress updates per job.
    pub progress_interval: Duration,

    /// Backoff policy for transient transfer failures.
    pub retry: RetryPolicy,

    /// Directory finished files land in.
    pub download_dir: PathBuf,

    /// Reject transfers whose advertised size exceeds this, before any
    /// bytes move.
    pub max_file_size: Option<u64>,

    /// Sliding-window submission limit per user.
    pub rate_limit_max_requests: usize,
    pub rate_limit_window: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            chunk_size: 64 * 1024,
            progress_interval: PROGRESS_INTERVAL,
            retry: RetryPolicy::default(),
            download_dir: PathBuf::from("downloads"),
            max_file_size: None,
            rate_limit_max_requests: 5,
            rate_limit_window: Duration::from_secs(60),
        }
    }
}
