use chrono::{DateTime, Utc};
use media_types::{AudioFormat, MediaReference, QualityTier, TrackMetadata};
use uuid::Uuid;

use crate::error::DownloadError;

/// Opaque job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Duplicate-suppression key: at most one non-terminal job may exist per
/// (user, media, tier, format) tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub user_id: u64,
    pub media_id: String,
    pub quality: QualityTier,
    pub format: AudioFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Forward-only state machine: `Pending -> Downloading -> terminal`,
    /// plus `Pending -> Cancelled` for cancel-before-admission.
    pub fn can_transition(&self, to: JobStatus) -> bool {
        match (self, to) {
            (JobStatus::Pending, JobStatus::Downloading | JobStatus::Cancelled) => true,
            (
                JobStatus::Downloading,
                JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled,
            ) => true,
            _ => false,
        }
    }
}

/// The unit of work tracked by the queue from enqueue to terminal state.
///
/// Owned exclusively by the queue; callers only ever see clones.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub id: JobId,
    pub user_id: u64,
    pub reference: MediaReference,
    pub track: TrackMetadata,
    pub quality: QualityTier,
    pub format: AudioFormat,
    pub status: JobStatus,
    pub bytes_read: u64,
    pub total_bytes: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Human-readable message for terminal failures.
    pub error: Option<String>,
}

impl DownloadJob {
    pub fn new(
        user_id: u64,
        reference: MediaReference,
        track: TrackMetadata,
        quality: QualityTier,
        format: AudioFormat,
    ) -> Self {
        Self {
            id: JobId::new(),
            user_id,
            reference,
            track,
            quality,
            format,
            status: JobStatus::Pending,
            bytes_read: 0,
            total_bytes: None,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            user_id: self.user_id,
            media_id: self.track.id.clone(),
            quality: self.quality,
            format: self.format,
        }
    }

    pub fn transition(&mut self, to: JobStatus) -> Result<(), DownloadError> {
        if !self.status.can_transition(to) {
            return Err(DownloadError::IllegalTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        if to.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Record transfer progress. Monotonic: a retry that restarts the
    /// transfer can never make the externally visible byte count go down.
    pub fn record_progress(&mut self, bytes: u64, total: Option<u64>) -> u64 {
        self.bytes_read = self.bytes_read.max(bytes);
        if total.is_some() {
            self.total_bytes = total;
        }
        self.bytes_read
    }

    /// Progress in [0, 1], or `None` while the total is unknown.
    pub fn progress_fraction(&self) -> Option<f32> {
        let total = self.total_bytes?;
        if total == 0 {
            return Some(1.0);
        }
        Some((self.bytes_read as f64 / total as f64).min(1.0) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_types::{MediaType, Service};

    fn job() -> DownloadJob {
        let track = TrackMetadata::builder("42", "Song", "Album")
            .artist("Artist")
            .build();
        DownloadJob::new(
            7,
            MediaReference::new(Service::Deezer, MediaType::Track, "42"),
            track,
            QualityTier::High,
            AudioFormat::Mp3,
        )
    }

    #[test]
    fn test_forward_only_transitions() {
        let mut j = job();
        j.transition(JobStatus::Downloading).unwrap();
        j.transition(JobStatus::Completed).unwrap();
        // No way out of a terminal state.
        assert!(j.transition(JobStatus::Downloading).is_err());
        assert!(j.transition(JobStatus::Failed).is_err());
        assert!(j.completed_at.is_some());
    }

    #[test]
    fn test_pending_can_cancel_directly() {
        let mut j = job();
        j.transition(JobStatus::Cancelled).unwrap();
        assert_eq!(j.status, JobStatus::Cancelled);
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        let mut j = job();
        assert!(j.transition(JobStatus::Completed).is_err());
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut j = job();
        assert_eq!(j.record_progress(100, Some(1000)), 100);
        assert_eq!(j.record_progress(50, Some(1000)), 100); // retry restarted
        assert_eq!(j.record_progress(1000, Some(1000)), 1000);
        assert_eq!(j.progress_fraction(), Some(1.0));
    }

    #[test]
    fn test_progress_indeterminate_without_total() {
        let mut j = job();
        j.record_progress(100, None);
        assert_eq!(j.progress_fraction(), None);
    }

    #[test]
    fn test_dedup_key_spans_user_media_quality_format() {
        let a = job();
        let mut b = job();
        b.user_id = a.user_id;
        assert_eq!(a.dedup_key(), b.dedup_key());
        b.quality = QualityTier::Lossless;
        assert_ne!(a.dedup_key(), b.dedup_key());
    }
}
