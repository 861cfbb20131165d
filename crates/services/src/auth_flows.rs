//! Per-user registry of in-flight device authorizations.
//!
//! Keyed by user id with a hard TTL so abandoned logins are evicted instead
//! of leaking pending state. Starting a new flow for a user cancels the one
//! already running.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::services::tidal::DeviceAuthHandle;

struct PendingFlow {
    handle: DeviceAuthHandle,
    expires_at: Instant,
}

pub struct AuthFlows {
    ttl: Duration,
    flows: Mutex<FxHashMap<u64, PendingFlow>>,
}

impl AuthFlows {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            flows: Mutex::new(FxHashMap::default()),
        }
    }

    /// Register a flow for a user, cancelling any previous one.
    pub fn begin(&self, user_id: u64, handle: DeviceAuthHandle) {
        let mut flows = self.flows.lock();
        Self::evict_expired_locked(&mut flows);
        if let Some(previous) = flows.insert(
            user_id,
            PendingFlow {
                handle,
                expires_at: Instant::now() + self.ttl,
            },
        ) {
            debug!(user_id, "Replacing pending auth flow");
            previous.handle.cancel();
        }
    }

    /// Cancel and drop a user's pending flow. Returns whether one existed.
    pub fn cancel(&self, user_id: u64) -> bool {
        match self.flows.lock().remove(&user_id) {
            Some(flow) => {
                flow.handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove a user's flow so the caller can await its completion.
    pub fn take(&self, user_id: u64) -> Option<DeviceAuthHandle> {
        let mut flows = self.flows.lock();
        Self::evict_expired_locked(&mut flows);
        flows.remove(&user_id).map(|flow| flow.handle)
    }

    pub fn pending_count(&self) -> usize {
        let mut flows = self.flows.lock();
        Self::evict_expired_locked(&mut flows);
        flows.len()
    }

    fn evict_expired_locked(flows: &mut FxHashMap<u64, PendingFlow>) {
        let now = Instant::now();
        flows.retain(|user_id, flow| {
            if flow.expires_at <= now {
                debug!(user_id, "Evicting expired auth flow");
                flow.handle.cancel();
                false
            } else {
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn dummy_handle() -> DeviceAuthHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            token.cancelled().await;
            Err(crate::AdapterError::authentication(
                media_types::Service::Tidal,
                "cancelled",
            ))
        });
        DeviceAuthHandle::new(cancel, task)
    }

    #[tokio::test]
    async fn test_begin_replaces_previous_flow() {
        let flows = AuthFlows::new(Duration::from_secs(60));
        flows.begin(1, dummy_handle());
        flows.begin(1, dummy_handle());
        assert_eq!(flows.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_removes_flow() {
        let flows = AuthFlows::new(Duration::from_secs(60));
        flows.begin(1, dummy_handle());
        assert!(flows.cancel(1));
        assert!(!flows.cancel(1));
        assert_eq!(flows.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_flows_are_evicted() {
        let flows = AuthFlows::new(Duration::ZERO);
        flows.begin(1, dummy_handle());
        flows.begin(2, dummy_handle());
        assert_eq!(flows.pending_count(), 0);
        assert!(flows.take(1).is_none());
    }

    #[tokio::test]
    async fn test_flows_are_per_user() {
        let flows = AuthFlows::new(Duration::from_secs(60));
        flows.begin(1, dummy_handle());
        flows.begin(2, dummy_handle());
        assert_eq!(flows.pending_count(), 2);
        assert!(flows.take(1).is_some());
        assert_eq!(flows.pending_count(), 1);
    }
}
