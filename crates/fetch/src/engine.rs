//! Submission facade: raw URL in, queued jobs out.
//!
//! `submit` runs the fail-fast part of the pipeline — rate limiting, URL
//! resolution, authentication, metadata — before anything is enqueued.
//! Albums and playlists fan out into one job per track; a child that fails
//! metadata resolution is skipped with a warning rather than aborting the
//! rest of the batch.

use media_types::{
    AudioFormat, MediaMetadata, MediaReference, MediaType, QualityTier, TrackMetadata,
};
use service_adapters::AdapterError;
use tracing::{info, instrument, warn};

use crate::error::DownloadError;
use crate::job::JobId;
use crate::manager::DownloadManager;

/// Explicit per-call context; there is no ambient "current user".
#[derive(Debug, Clone, Copy)]
pub struct SubmitContext {
    pub user_id: u64,
}

/// What a successful submission produced.
#[derive(Debug, Clone)]
pub struct Submission {
    pub reference: MediaReference,
    pub title: String,
    pub job_ids: Vec<JobId>,
}

impl DownloadManager {
    /// Resolve a raw URL and enqueue the download(s) it refers to.
    #[instrument(skip(self), level = "info")]
    pub async fn submit(
        &self,
        ctx: SubmitContext,
        raw_url: &str,
        quality: QualityTier,
        format: AudioFormat,
    ) -> Result<Submission, DownloadError> {
        let decision = { self.inner.limiter.lock().can_proceed(ctx.user_id) };
        if !decision.allowed {
            return Err(DownloadError::RateLimited {
                retry_after: decision.retry_after.unwrap_or_default(),
            });
        }

        // Resolution failures reach the caller before any job exists.
        let reference = self.inner.resolver.resolve(raw_url).await?;
        let adapter = self.inner.registry.get(reference.service())?;
        adapter.authenticate().await?;

        let metadata = adapter.resolve_metadata(&reference).await?;
        let title = metadata.title().to_string();

        let job_ids = match metadata {
            MediaMetadata::Track(track) => {
                vec![self.enqueue_track(ctx.user_id, reference.clone(), track, quality, format)]
            }
            MediaMetadata::Collection(_) if reference.media_type() == MediaType::Artist => {
                return Err(DownloadError::download(
                    "artist pages are browse-only; submit a track, album or playlist",
                ));
            }
            MediaMetadata::Collection(collection) => {
                let mut job_ids = Vec::with_capacity(collection.track_ids.len());
                for track_id in &collection.track_ids {
                    let track_ref = MediaReference::new(
                        reference.service(),
                        MediaType::Track,
                        track_id.clone(),
                    );
                    match adapter.resolve_metadata(&track_ref).await {
                        Ok(MediaMetadata::Track(track)) => {
                            job_ids.push(self.enqueue_track(
                                ctx.user_id,
                                track_ref,
                                track,
                                quality,
                                format,
                            ));
                        }
                        Ok(MediaMetadata::Collection(_)) => {
                            warn!(%track_id, "Child resolved to a collection; skipping");
                        }
                        Err(e) => {
                            // One broken track must not sink the batch.
                            warn!(%track_id, error = %e, "Skipping child track");
                        }
                    }
                }
                if job_ids.is_empty() {
                    return Err(DownloadError::Adapter(AdapterError::metadata(
                        "no downloadable tracks in this collection",
                    )));
                }
                job_ids
            }
        };

        info!(
            reference = %reference,
            jobs = job_ids.len(),
            "Submission accepted"
        );

        Ok(Submission {
            reference,
            title,
            job_ids,
        })
    }

    /// Convenience wrapper for collaborators that already hold metadata.
    pub fn submit_resolved(
        &self,
        ctx: SubmitContext,
        reference: MediaReference,
        track: TrackMetadata,
        quality: QualityTier,
        format: AudioFormat,
    ) -> JobId {
        self.enqueue_track(ctx.user_id, reference, track, quality, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::progress::JobEvent;
    use crate::testing::{NoopPost, StubAdapter, serve_bytes};
    use media_types::Service;
    use reqwest::Client;
    use service_adapters::AdapterRegistry;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn engine(
        dir: &std::path::Path,
        download_url: &str,
        rate_limit: usize,
    ) -> (DownloadManager, mpsc::UnboundedReceiver<JobEvent>) {
        let config = EngineConfig {
            download_dir: dir.to_path_buf(),
            rate_limit_max_requests: rate_limit,
            rate_limit_window: Duration::from_secs(60),
            ..EngineConfig::default()
        };
        let mut registry = AdapterRegistry::new();
        registry.insert(Arc::new(StubAdapter::new(Service::Deezer, download_url)));
        DownloadManager::with_parts(config, Client::new(), registry, Arc::new(NoopPost))
    }

    fn ctx() -> SubmitContext {
        SubmitContext { user_id: 1 }
    }

    #[tokio::test]
    async fn test_submit_track_url_creates_one_job() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_bytes(vec![1u8; 512], 1, Duration::ZERO).await;
        let (manager, _rx) = engine(dir.path(), &url, 100);

        let submission = manager
            .submit(
                ctx(),
                "https://deezer.com/track/42",
                QualityTier::High,
                AudioFormat::Mp3,
            )
            .await
            .unwrap();

        assert_eq!(submission.job_ids.len(), 1);
        assert_eq!(submission.reference.media_id(), "42");
    }

    #[tokio::test]
    async fn test_submit_album_fans_out_per_track() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_bytes(vec![1u8; 512], 1, Duration::ZERO).await;
        let (manager, _rx) = engine(dir.path(), &url, 100);

        let submission = manager
            .submit(
                ctx(),
                "https://deezer.com/en/album/999",
                QualityTier::High,
                AudioFormat::Mp3,
            )
            .await
            .unwrap();

        // The stub album has two children.
        assert_eq!(submission.job_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_host_fails_before_any_job() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_bytes(vec![1u8; 512], 1, Duration::ZERO).await;
        let (manager, mut rx) = engine(dir.path(), &url, 100);

        let err = manager
            .submit(
                ctx(),
                "https://invalid-url.com/track/1",
                QualityTier::High,
                AudioFormat::Mp3,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DownloadError::Adapter(AdapterError::UnsupportedService(_))
        ));
        assert!(rx.try_recv().is_err(), "no events for a rejected submission");
    }

    #[tokio::test]
    async fn test_rate_limited_submission_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_bytes(vec![1u8; 512], 1, Duration::ZERO).await;
        let (manager, _rx) = engine(dir.path(), &url, 1);

        manager
            .submit(
                ctx(),
                "https://deezer.com/track/1",
                QualityTier::High,
                AudioFormat::Mp3,
            )
            .await
            .unwrap();

        let err = manager
            .submit(
                ctx(),
                "https://deezer.com/track/2",
                QualityTier::High,
                AudioFormat::Mp3,
            )
            .await
            .unwrap_err();
        match err {
            DownloadError::RateLimited { retry_after } => {
                assert!(retry_after > Duration::ZERO);
            }
            other => panic!("unexpected error: {other}"),
        }

        // A different user is unaffected.
        let other = SubmitContext { user_id: 2 };
        manager
            .submit(
                other,
                "https://deezer.com/track/3",
                QualityTier::High,
                AudioFormat::Mp3,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_artist_submission_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_bytes(vec![1u8; 512], 1, Duration::ZERO).await;
        let (manager, _rx) = engine(dir.path(), &url, 100);

        let err = manager
            .submit(
                ctx(),
                "https://deezer.com/artist/27",
                QualityTier::High,
                AudioFormat::Mp3,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Download { .. }));
    }
}
