//! Throttled progress reporting.
//!
//! Workers can see dozens of chunks per second; externally visible updates
//! are limited to one per [`ProgressThrottle`] interval per job. Terminal
//! events always go out.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use media_types::TrackMetadata;

use crate::job::JobId;

/// Default minimum spacing between visible progress updates for one job.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

pub struct ProgressThrottle {
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl ProgressThrottle {
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            last_emit: None,
            min_interval,
        }
    }

    /// Whether enough time has passed to emit another update.
    pub fn should_emit(&mut self) -> bool {
        let now = Instant::now();
        match self.last_emit {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(PROGRESS_INTERVAL)
    }
}

/// Events pushed to the delivery collaborator over an mpsc channel.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Accepted {
        job_id: JobId,
        /// 1-based queue position at enqueue time.
        position: usize,
    },
    Started {
        job_id: JobId,
    },
    Progress {
        job_id: JobId,
        bytes: u64,
        /// `None` while the source reports no content length; progress is
        /// indeterminate then.
        total: Option<u64>,
    },
    Completed {
        job_id: JobId,
        path: PathBuf,
        track: Box<TrackMetadata>,
    },
    Failed {
        job_id: JobId,
        /// Stable error kind, e.g. `network_failure`.
        kind: &'static str,
        /// The one human-readable line; detail stays in the logs.
        message: String,
    },
    Cancelled {
        job_id: JobId,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Accepted { job_id, .. }
            | JobEvent::Started { job_id }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Cancelled { job_id } => *job_id,
        }
    }
}

/// Human-readable byte count for progress lines.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
