//! Pure queue state: pending order, active set, duplicate suppression.
//!
//! No I/O and no internal locking; the manager serializes every mutation
//! through its single admission/completion path.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;

use crate::job::{DedupKey, DownloadJob, JobId, JobStatus};

pub(crate) enum EnqueueOutcome {
    Created(JobId),
    /// A non-terminal job for the same (user, media, tier, format) tuple
    /// already exists; the caller gets that one instead of a second worker.
    Duplicate(JobId),
}

pub(crate) enum CancelOutcome {
    /// Cancelled before admission; went straight to `Cancelled`.
    WasPending,
    /// Worker signalled; it observes the token at the next chunk boundary.
    Signalled(CancellationToken),
    AlreadyTerminal(JobStatus),
    NotFound,
}

pub(crate) struct QueueState {
    max_concurrent: usize,
    jobs: FxHashMap<JobId, DownloadJob>,
    pending: VecDeque<JobId>,
    active: FxHashMap<JobId, CancellationToken>,
    dedup: FxHashMap<DedupKey, JobId>,
}

impl QueueState {
    pub(crate) fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            jobs: FxHashMap::default(),
            pending: VecDeque::new(),
            active: FxHashMap::default(),
            dedup: FxHashMap::default(),
        }
    }

    pub(crate) fn enqueue(&mut self, job: DownloadJob) -> EnqueueOutcome {
        let key = job.dedup_key();
        if let Some(existing) = self.dedup.get(&key) {
            return EnqueueOutcome::Duplicate(*existing);
        }
        let id = job.id;
        self.dedup.insert(key, id);
        self.jobs.insert(id, job);
        self.pending.push_back(id);
        EnqueueOutcome::Created(id)
    }

    /// Admit the next pending job if a slot is free. Global FIFO across
    /// users; no per-user fairness (documented limitation).
    pub(crate) fn admit_next(&mut self) -> Option<(DownloadJob, CancellationToken)> {
        if self.active.len() >= self.max_concurrent {
            return None;
        }
        let id = self.pending.pop_front()?;
        let job = self.jobs.get_mut(&id)?;
        job.transition(JobStatus::Downloading).ok()?;
        let token = CancellationToken::new();
        self.active.insert(id, token.clone());
        Some((job.clone(), token))
    }

    /// Record progress and return the monotonically clamped byte count, or
    /// `None` when the job no longer exists.
    pub(crate) fn record_progress(&mut self, id: JobId, bytes: u64, total: Option<u64>) -> Option<(u64, Option<u64>)> {
        let job = self.jobs.get_mut(&id)?;
        let clamped = job.record_progress(bytes, total);
        Some((clamped, job.total_bytes))
    }

    /// Move an active job to its terminal state and release the slot.
    pub(crate) fn finish(&mut self, id: JobId, status: JobStatus, error: Option<String>) {
        self.active.remove(&id);
        if let Some(job) = self.jobs.get_mut(&id) {
            if job.transition(status).is_ok() {
                job.error = error;
            }
            self.dedup.remove(&job.dedup_key());
        }
    }

    pub(crate) fn cancel(&mut self, id: JobId) -> CancelOutcome {
        let Some(job) = self.jobs.get_mut(&id) else {
            return CancelOutcome::NotFound;
        };
        match job.status {
            JobStatus::Pending => {
                self.pending.retain(|pending| *pending != id);
                // Checked transition: Pending -> Cancelled is always legal.
                let _ = job.transition(JobStatus::Cancelled);
                self.dedup.remove(&job.dedup_key());
                CancelOutcome::WasPending
            }
            JobStatus::Downloading => match self.active.get(&id) {
                Some(token) => CancelOutcome::Signalled(token.clone()),
                None => CancelOutcome::NotFound,
            },
            status => CancelOutcome::AlreadyTerminal(status),
        }
    }

    pub(crate) fn job(&self, id: JobId) -> Option<&DownloadJob> {
        self.jobs.get(&id)
    }

    pub(crate) fn downloading_count(&self) -> usize {
        self.active.len()
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
