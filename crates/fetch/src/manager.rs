//! Queue orchestration: admission, worker lifecycle, completion.
//!
//! All queue state is mutated through one path — the mutex-guarded
//! [`QueueState`] — by `enqueue_track`, `pump` and `finish_job`. Slot
//! release is event-driven: a worker reaching a terminal state pumps the
//! next pending job immediately.

use std::path::PathBuf;
use std::sync::Arc;

use audio_tagger::{PostProcess, PostProcessor};
use media_types::{AudioFormat, MediaReference, QualityTier, TrackMetadata};
use parking_lot::Mutex;
use reqwest::Client;
use service_adapters::{AdapterRegistry, UrlResolver, default_client};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::config::EngineConfig;
use crate::error::DownloadError;
use crate::job::{DownloadJob, JobId, JobStatus};
use crate::limiter::RateLimiter;
use crate::paths;
use crate::progress::{JobEvent, ProgressThrottle};
use crate::queue::{CancelOutcome, EnqueueOutcome, QueueState};
use crate::retry::retry_with_backoff;
use crate::worker;

pub(crate) struct ManagerInner {
    pub(crate) config: EngineConfig,
    pub(crate) client: Client,
    pub(crate) registry: AdapterRegistry,
    pub(crate) resolver: UrlResolver,
    pub(crate) state: Mutex<QueueState>,
    pub(crate) limiter: Mutex<RateLimiter>,
    pub(crate) post: Arc<dyn PostProcess>,
    pub(crate) events: mpsc::UnboundedSender<JobEvent>,
}

/// The download queue facade handed to collaborators.
#[derive(Clone)]
pub struct DownloadManager {
    pub(crate) inner: Arc<ManagerInner>,
}

impl DownloadManager {
    /// Build a manager with the default HTTP client and the lofty-backed
    /// post-processor. Returns the event stream for the delivery
    /// collaborator.
    pub fn new(
        config: EngineConfig,
        registry: AdapterRegistry,
    ) -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let client = default_client();
        let post = Arc::new(PostProcessor::new(client.clone()));
        Self::with_parts(config, client, registry, post)
    }

    pub fn with_parts(
        config: EngineConfig,
        client: Client,
        registry: AdapterRegistry,
        post: Arc<dyn PostProcess>,
    ) -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let inner = Arc::new(ManagerInner {
            state: Mutex::new(QueueState::new(config.max_concurrent)),
            limiter: Mutex::new(RateLimiter::new(
                config.rate_limit_max_requests,
                config.rate_limit_window,
            )),
            resolver: UrlResolver::new(),
            config,
            client,
            registry,
            post,
            events,
        });
        (Self { inner }, receiver)
    }

    /// Enqueue a single track. Returns the existing job id when a
    /// non-terminal job for the same (user, media, tier, format) tuple is
    /// already queued or running — no second worker is spawned.
    pub fn enqueue_track(
        &self,
        user_id: u64,
        reference: MediaReference,
        track: TrackMetadata,
        quality: QualityTier,
        format: AudioFormat,
    ) -> JobId {
        let job = DownloadJob::new(user_id, reference, track, quality, format);
        let (id, position) = {
            let mut state = self.inner.state.lock();
            match state.enqueue(job) {
                EnqueueOutcome::Duplicate(existing) => {
                    info!(job_id = %existing, "Duplicate submission; returning existing job");
                    return existing;
                }
                EnqueueOutcome::Created(id) => {
                    (id, state.downloading_count() + state.pending_count())
                }
            }
        };
        self.emit(JobEvent::Accepted {
            job_id: id,
            position,
        });
        pump(&self.inner);
        id
    }

    /// Cancel a job. A pending job goes straight to `Cancelled`; a running
    /// worker is signalled and observes the flag at its next chunk
    /// boundary. Returns the status at the time of the call.
    pub fn cancel(&self, job_id: JobId) -> Result<JobStatus, DownloadError> {
        let outcome = { self.inner.state.lock().cancel(job_id) };
        match outcome {
            CancelOutcome::WasPending => {
                self.emit(JobEvent::Cancelled { job_id });
                Ok(JobStatus::Cancelled)
            }
            CancelOutcome::Signalled(token) => {
                token.cancel();
                Ok(JobStatus::Downloading)
            }
            CancelOutcome::AlreadyTerminal(status) => Ok(status),
            CancelOutcome::NotFound => Err(DownloadError::JobNotFound { id: job_id }),
        }
    }

    /// Snapshot of a job's current state.
    pub fn job(&self, job_id: JobId) -> Option<DownloadJob> {
        self.inner.state.lock().job(job_id).cloned()
    }

    pub(crate) fn emit(&self, event: JobEvent) {
        let _ = self.inner.events.send(event);
    }
}

/// Admit pending jobs while slots are free. Called on enqueue and on every
/// job completion.
pub(crate) fn pump(inner: &Arc<ManagerInner>) {
    loop {
        let admitted = { inner.state.lock().admit_next() };
        let Some((job, token)) = admitted else {
            break;
        };
        let _ = inner.events.send(JobEvent::Started { job_id: job.id });
        let inner = inner.clone();
        tokio::spawn(run_job(inner, job, token));
    }
}

#[instrument(skip_all, fields(job_id = %job.id, media = %job.reference), level = "info")]
async fn run_job(inner: Arc<ManagerInner>, job: DownloadJob, token: CancellationToken) {
    let result = execute(&inner, &job, &token).await;

    let (status, error, event) = match result {
        Ok(path) => (
            JobStatus::Completed,
            None,
            JobEvent::Completed {
                job_id: job.id,
                path,
                track: Box::new(job.track.clone()),
            },
        ),
        Err(DownloadError::Cancelled) => (
            JobStatus::Cancelled,
            None,
            JobEvent::Cancelled { job_id: job.id },
        ),
        Err(e) => {
            // Full detail to the log; the user only sees the one line.
            error!(error = %e, kind = e.kind(), "Job failed");
            let message = e.user_message();
            (
                JobStatus::Failed,
                Some(message.clone()),
                JobEvent::Failed {
                    job_id: job.id,
                    kind: e.kind(),
                    message,
                },
            )
        }
    };

    {
        inner.state.lock().finish(job.id, status, error);
    }
    let _ = inner.events.send(event);

    // The freed slot admits the next pending job immediately.
    pump(&inner);
}

async fn execute(
    inner: &Arc<ManagerInner>,
    job: &DownloadJob,
    token: &CancellationToken,
) -> Result<PathBuf, DownloadError> {
    let adapter = inner.registry.get(job.reference.service())?;

    tokio::fs::create_dir_all(&inner.config.download_dir).await?;
    let part_path = inner.config.download_dir.join(format!(".{}.part", job.id));
    let throttle = Arc::new(Mutex::new(ProgressThrottle::new(
        inner.config.progress_interval,
    )));

    let part_ref = &part_path;
    let adapter_ref = &adapter;
    let resolved = retry_with_backoff(&inner.config.retry, token, |_attempt| {
        let throttle = throttle.clone();
        async move {
            // The download URL is short-lived on every service; re-resolve
            // it on each attempt.
            let resolved = adapter_ref
                .resolve_download_url(&job.track.id, job.quality)
                .await?;

            worker::transfer(
                &inner.client,
                &resolved.url,
                part_ref,
                token,
                inner.config.max_file_size,
                inner.config.chunk_size,
                |bytes, total| {
                    let Some((clamped, total)) =
                        inner.state.lock().record_progress(job.id, bytes, total)
                    else {
                        return;
                    };
                    if throttle.lock().should_emit() {
                        let _ = inner.events.send(JobEvent::Progress {
                            job_id: job.id,
                            bytes: clamped,
                            total,
                        });
                    }
                },
            )
            .await?;

            Ok(resolved)
        }
    })
    .await?;

    // Terminal progress update, never throttled: the final value equals
    // the total byte count when it is known.
    if let Some((bytes, total)) = {
        let state = inner.state.lock();
        state.job(job.id).map(|j| (j.bytes_read, j.total_bytes))
    } {
        let _ = inner.events.send(JobEvent::Progress {
            job_id: job.id,
            bytes,
            total,
        });
    }

    let final_path = paths::output_path(&inner.config.download_dir, &job.track, resolved.format);
    let path = inner
        .post
        .finalize(&part_path, &final_path, &job.track, resolved.format)
        .await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::testing::{NoopPost, StubAdapter, serve_bytes, serve_flaky, serve_status, stub_track};
    use media_types::{MediaType, Service};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn test_config(dir: &std::path::Path, max_concurrent: usize) -> EngineConfig {
        EngineConfig {
            max_concurrent,
            download_dir: dir.to_path_buf(),
            progress_interval: Duration::ZERO,
            retry: RetryPolicy {
                max_retries: 2,
                base_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(50),
                jitter: false,
            },
            ..EngineConfig::default()
        }
    }

    fn manager_with_stub(
        config: EngineConfig,
        download_url: &str,
    ) -> (DownloadManager, mpsc::UnboundedReceiver<JobEvent>) {
        let mut registry = AdapterRegistry::new();
        registry.insert(Arc::new(StubAdapter::new(Service::Deezer, download_url)));
        DownloadManager::with_parts(config, Client::new(), registry, Arc::new(NoopPost))
    }

    fn reference(id: &str) -> MediaReference {
        MediaReference::new(Service::Deezer, MediaType::Track, id)
    }

    fn enqueue(manager: &DownloadManager, user: u64, id: &str) -> JobId {
        manager.enqueue_track(
            user,
            reference(id),
            stub_track(id),
            QualityTier::High,
            AudioFormat::Mp3,
        )
    }

    /// Drain events until `jobs` jobs have reached a terminal state.
    async fn drain_until_terminal(
        rx: &mut mpsc::UnboundedReceiver<JobEvent>,
        jobs: usize,
    ) -> Vec<JobEvent> {
        let mut events = Vec::new();
        let mut terminal = 0;
        while terminal < jobs {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("timed out waiting for events")
                .expect("event channel closed");
            if matches!(
                event,
                JobEvent::Completed { .. } | JobEvent::Failed { .. } | JobEvent::Cancelled { .. }
            ) {
                terminal += 1;
            }
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_returns_same_job() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_bytes(vec![1u8; 1024], 4, Duration::from_millis(20)).await;
        let (manager, mut rx) = manager_with_stub(test_config(dir.path(), 3), &url);

        let first = enqueue(&manager, 1, "42");
        let second = enqueue(&manager, 1, "42");
        assert_eq!(first, second);

        let events = drain_until_terminal(&mut rx, 1).await;
        let accepted = events
            .iter()
            .filter(|e| matches!(e, JobEvent::Accepted { .. }))
            .count();
        assert_eq!(accepted, 1, "the duplicate must not be accepted again");
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_cap() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_bytes(vec![1u8; 64 * 1024], 8, Duration::from_millis(10)).await;
        let (manager, mut rx) = manager_with_stub(test_config(dir.path(), 2), &url);

        for i in 0..6 {
            enqueue(&manager, 1, &i.to_string());
        }

        let events = drain_until_terminal(&mut rx, 6).await;
        let mut running = 0usize;
        let mut max_running = 0usize;
        for event in &events {
            match event {
                JobEvent::Started { .. } => {
                    running += 1;
                    max_running = max_running.max(running);
                }
                JobEvent::Completed { .. } | JobEvent::Failed { .. } | JobEvent::Cancelled { .. } => {
                    running = running.saturating_sub(1);
                }
                _ => {}
            }
        }
        assert!(max_running <= 2, "observed {max_running} concurrent jobs");

        let completed = events
            .iter()
            .filter(|e| matches!(e, JobEvent::Completed { .. }))
            .count();
        assert_eq!(completed, 6);
    }

    #[tokio::test]
    async fn test_progress_monotonic_and_final_equals_total() {
        let dir = tempfile::tempdir().unwrap();
        let body = vec![9u8; 256 * 1024];
        let total = body.len() as u64;
        let url = serve_bytes(body, 16, Duration::from_millis(2)).await;
        let (manager, mut rx) = manager_with_stub(test_config(dir.path(), 1), &url);

        enqueue(&manager, 1, "song");
        let events = drain_until_terminal(&mut rx, 1).await;

        let progress: Vec<(u64, Option<u64>)> = events
            .iter()
            .filter_map(|e| match e {
                JobEvent::Progress { bytes, total, .. } => Some((*bytes, *total)),
                _ => None,
            })
            .collect();
        assert!(!progress.is_empty());
        assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0), "monotonic");
        assert_eq!(progress.last().unwrap(), &(total, Some(total)));
    }

    #[tokio::test]
    async fn test_pending_cancel_never_starts() {
        let dir = tempfile::tempdir().unwrap();
        // The active job trickles slowly so the second one stays pending.
        let url = serve_bytes(vec![1u8; 1 << 20], 64, Duration::from_millis(50)).await;
        let (manager, mut rx) = manager_with_stub(test_config(dir.path(), 1), &url);

        let active = enqueue(&manager, 1, "active");
        let pending = enqueue(&manager, 1, "pending");

        assert_eq!(manager.cancel(pending).unwrap(), JobStatus::Cancelled);
        assert_eq!(manager.job(pending).unwrap().status, JobStatus::Cancelled);

        // Cancel the active one too so the test finishes quickly.
        manager.cancel(active).unwrap();
        let events = drain_until_terminal(&mut rx, 2).await;

        let started: Vec<JobId> = events
            .iter()
            .filter_map(|e| match e {
                JobEvent::Started { job_id } => Some(*job_id),
                _ => None,
            })
            .collect();
        assert!(started.contains(&active));
        assert!(
            !started.contains(&pending),
            "a cancelled pending job must never be observed Downloading"
        );
    }

    #[tokio::test]
    async fn test_active_cancel_removes_partial_and_frees_slot() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_bytes(vec![1u8; 1 << 20], 64, Duration::from_millis(40)).await;
        let (manager, mut rx) = manager_with_stub(test_config(dir.path(), 1), &url);

        let active = enqueue(&manager, 1, "a");
        let queued = enqueue(&manager, 1, "b");

        // Let the transfer begin, then cancel mid-stream.
        tokio::time::sleep(Duration::from_millis(120)).await;
        manager.cancel(active).unwrap();

        let events = drain_until_terminal(&mut rx, 2).await;
        assert_eq!(manager.job(active).unwrap().status, JobStatus::Cancelled);
        assert_eq!(manager.job(queued).unwrap().status, JobStatus::Completed);

        assert!(
            events.iter().any(
                |e| matches!(e, JobEvent::Cancelled { job_id } if *job_id == active)
            )
        );
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| {
                let name = entry.unwrap().file_name();
                if name.to_string_lossy().ends_with(".part") {
                    Some(name)
                } else {
                    None
                }
            })
            .collect();
        assert!(leftovers.is_empty(), "no partial files may remain: {leftovers:?}");
    }

    #[tokio::test]
    async fn test_transient_failures_retry_until_success() {
        let dir = tempfile::tempdir().unwrap();
        let (url, hits) = serve_flaky(vec![5u8; 2048], 2).await;
        let (manager, mut rx) = manager_with_stub(test_config(dir.path(), 1), &url);

        enqueue(&manager, 1, "flaky");
        let events = drain_until_terminal(&mut rx, 1).await;

        assert!(events.iter().any(|e| matches!(e, JobEvent::Completed { .. })));
        // Two 500s plus the final success.
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let (url, hits) = serve_flaky(Vec::new(), usize::MAX).await;
        let (manager, mut rx) = manager_with_stub(test_config(dir.path(), 1), &url);

        let id = enqueue(&manager, 1, "doomed");
        let events = drain_until_terminal(&mut rx, 1).await;

        assert!(events.iter().any(|e| matches!(e, JobEvent::Failed { .. })));
        let job = manager.job(id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.is_some());
        // Initial attempt + max_retries.
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_is_immediate() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_status(404).await;
        let (manager, mut rx) = manager_with_stub(test_config(dir.path(), 1), &url);

        enqueue(&manager, 1, "missing");
        let events = drain_until_terminal(&mut rx, 1).await;

        let message = events
            .iter()
            .find_map(|e| match e {
                JobEvent::Failed { message, .. } => Some(message.clone()),
                _ => None,
            })
            .expect("job must fail");
        // The surfaced message is the human one, not debug formatting.
        assert!(!message.contains("HttpStatus"));
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_other_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let good_url = serve_bytes(vec![2u8; 4096], 2, Duration::ZERO).await;
        let bad_url = serve_status(404).await;

        let mut registry = AdapterRegistry::new();
        registry.insert(Arc::new(StubAdapter::new(Service::Deezer, &bad_url)));
        registry.insert(Arc::new(StubAdapter::new(Service::Tidal, &good_url)));
        let (manager, mut rx) = DownloadManager::with_parts(
            test_config(dir.path(), 2),
            Client::new(),
            registry,
            Arc::new(NoopPost),
        );

        let doomed = manager.enqueue_track(
            1,
            MediaReference::new(Service::Deezer, MediaType::Track, "bad"),
            stub_track("bad"),
            QualityTier::High,
            AudioFormat::Mp3,
        );
        let fine = manager.enqueue_track(
            1,
            MediaReference::new(Service::Tidal, MediaType::Track, "good"),
            stub_track("good"),
            QualityTier::High,
            AudioFormat::Mp3,
        );

        drain_until_terminal(&mut rx, 2).await;
        assert_eq!(manager.job(doomed).unwrap().status, JobStatus::Failed);
        assert_eq!(manager.job(fine).unwrap().status, JobStatus::Completed);
    }
}
