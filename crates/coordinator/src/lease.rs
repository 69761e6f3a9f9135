//! Coordinator session leases.
//!
//! Every coordinator that starts a run writes a lease record keyed by its
//! session id and refreshes it on a fixed interval. Tasks carry the session
//! id as their owner, so another process sharing the same data directory can
//! tell a run that is still alive from one whose process died.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use logtriage_core::error::StorageError;
use logtriage_core::Task;

use crate::store::LeaseStore;

/// Liveness record of one coordinator session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLease {
    /// Session id, also stored as [`Task::owner`].
    pub id: String,
    /// Process that holds the lease.
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    /// Last refresh.
    pub heartbeat_at: DateTime<Utc>,
}

impl SessionLease {
    /// A fresh lease for the current process.
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            pid: std::process::id(),
            started_at: now,
            heartbeat_at: now,
        }
    }

    /// Whether the lease was refreshed within `ttl` of `now`.
    pub fn is_live(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return true;
        };
        self.heartbeat_at + ttl > now
    }
}

/// Whether `task` is owned by a session whose lease is still live.
///
/// Tasks without an owner, or whose owner left no lease, are not live.
pub async fn owner_is_live<S: LeaseStore>(
    store: &S,
    task: &Task,
    ttl: Duration,
) -> Result<bool, StorageError> {
    let Some(owner) = task.owner.as_deref() else {
        return Ok(false);
    };
    Ok(store
        .get_lease(owner)
        .await?
        .is_some_and(|lease| lease.is_live(ttl, Utc::now())))
}

/// Refresh interval for a lease that expires after `ttl`.
pub fn heartbeat_interval(ttl: Duration) -> Duration {
    (ttl / 3).max(Duration::from_millis(100))
}

/// Refresh `lease` every `every` until `stop` is cancelled.
pub(crate) async fn heartbeat<S: LeaseStore>(
    store: Arc<S>,
    mut lease: SessionLease,
    every: Duration,
    stop: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                lease.heartbeat_at = Utc::now();
                if let Err(e) = store.put_lease(&lease).await {
                    tracing::warn!(session = %lease.id, error = %e, "lease refresh failed");
                }
            }
        }
    }
    tracing::debug!(session = %lease.id, "heartbeat stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::store::MemoryStore;

    #[test]
    fn lease_expires_after_ttl() {
        let lease = SessionLease::new("s-1");
        let ttl = Duration::from_secs(30);
        assert!(lease.is_live(ttl, lease.heartbeat_at + chrono::Duration::seconds(29)));
        assert!(!lease.is_live(ttl, lease.heartbeat_at + chrono::Duration::seconds(31)));
    }

    #[tokio::test]
    async fn ownerless_and_orphaned_tasks_are_not_live() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(30);

        let mut task = Task::new("ISSUE-1", None);
        assert!(!owner_is_live(&store, &task, ttl).await.unwrap());

        task.owner = Some("gone".to_owned());
        assert!(!owner_is_live(&store, &task, ttl).await.unwrap());

        store.put_lease(&SessionLease::new("gone")).await.unwrap();
        assert!(owner_is_live(&store, &task, ttl).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_refreshes_until_cancelled() {
        let store = Arc::new(MemoryStore::new());
        let mut lease = SessionLease::new("s-2");
        lease.heartbeat_at = Utc::now() - chrono::Duration::hours(1);
        store.put_lease(&lease).await.unwrap();

        let stop = CancellationToken::new();
        let handle = tokio::spawn(heartbeat(
            Arc::clone(&store),
            lease.clone(),
            Duration::from_secs(1),
            stop.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let refreshed = store.get_lease("s-2").await.unwrap().unwrap();
        assert!(refreshed.heartbeat_at > lease.heartbeat_at);

        stop.cancel();
        handle.await.unwrap();
    }
}
