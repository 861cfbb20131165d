//! Atomic finalization of downloaded files.
//!
//! The worker streams into a private `.part` path; finalization tags that
//! file in place and then moves it to the final path with a single rename,
//! so a partially tagged file is never visible at the destination.
//! Temporary files are removed on every failure path.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use media_types::{AudioFormat, TrackMetadata};
use reqwest::Client;
use tracing::{debug, instrument, warn};

use crate::cover::CoverCache;
use crate::error::TagError;
use crate::tag::write_tags;

/// Seam between the download engine and post-processing.
#[async_trait]
pub trait PostProcess: Send + Sync {
    async fn finalize(
        &self,
        part_path: &Path,
        final_path: &Path,
        track: &TrackMetadata,
        format: AudioFormat,
    ) -> Result<PathBuf, TagError>;
}

/// Tags, embeds artwork and atomically publishes downloaded files.
pub struct PostProcessor {
    covers: CoverCache,
}

impl PostProcessor {
    pub fn new(client: Client) -> Self {
        Self {
            covers: CoverCache::new(client),
        }
    }

    pub fn covers(&self) -> &CoverCache {
        &self.covers
    }
}

#[async_trait]
impl PostProcess for PostProcessor {
    #[instrument(skip(self, track), fields(track_id = %track.id), level = "debug")]
    async fn finalize(
        &self,
        part_path: &Path,
        final_path: &Path,
        track: &TrackMetadata,
        format: AudioFormat,
    ) -> Result<PathBuf, TagError> {
        let guard = TempGuard::new(part_path);

        // Missing artwork downgrades the file, it does not fail the job.
        let cover = match &track.cover_url {
            Some(url) => match self.covers.fetch(url).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!(%url, error = %e, "Cover fetch failed; tagging without artwork");
                    None
                }
            },
            None => None,
        };

        write_tags(part_path, track, format, cover.as_deref())?;

        tokio::fs::rename(part_path, final_path).await?;
        guard.disarm();

        debug!(path = %final_path.display(), "Finalized download");
        Ok(final_path.to_path_buf())
    }
}

/// Removes the guarded file on drop unless disarmed.
struct TempGuard {
    path: PathBuf,
    armed: bool,
}

impl TempGuard {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if self.armed && self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "Failed to remove temp file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track() -> TrackMetadata {
        TrackMetadata::builder("1", "Song", "Album")
            .artist("Artist")
            .build()
    }

    #[tokio::test]
    async fn test_failure_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("file.flac.part");
        let dest = dir.path().join("file.flac");
        std::fs::write(&part, b"not a flac file").unwrap();

        let processor = PostProcessor::new(Client::new());
        let err = processor
            .finalize(&part, &dest, &track(), AudioFormat::Flac)
            .await
            .unwrap_err();

        assert!(matches!(err, TagError::Conversion { .. }));
        assert!(!part.exists(), "partial file must be cleaned up on failure");
        assert!(!dest.exists(), "nothing may appear at the final path");
    }

    #[tokio::test]
    async fn test_missing_part_file_errors_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("missing.part");
        let dest = dir.path().join("missing.flac");

        let processor = PostProcessor::new(Client::new());
        let err = processor
            .finalize(&part, &dest, &track(), AudioFormat::Flac)
            .await
            .unwrap_err();
        assert!(matches!(err, TagError::Io { .. }));
    }

    #[test]
    fn test_temp_guard_disarm_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kept.part");
        std::fs::write(&path, b"data").unwrap();

        let guard = TempGuard::new(&path);
        guard.disarm();
        assert!(path.exists());

        let guard = TempGuard::new(&path);
        drop(guard);
        assert!(!path.exists());
    }
}
