//! Task progress: fast cache, durable store and the reader that merges them.
//!
//! The coordinator publishes every progress step to both sinks. The cache
//! can run ahead of a store write that has not landed yet, never behind it:
//! [`reconcile`] takes the cache value only when its progress is at least
//! the stored one, so a reader never sees progress regress.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use logtriage_core::config::ProgressConfig;
use logtriage_core::error::StorageError;
use logtriage_core::{Task, TaskStage};

use crate::store::TaskStore;

/// Point-in-time view of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub task_id: String,
    pub issue_id: String,
    pub stage: TaskStage,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Same state, ignoring the timestamp.
    fn same_state(&self, other: &Self) -> bool {
        self.stage == other.stage
            && self.progress == other.progress
            && self.message == other.message
            && self.error == other.error
    }
}

impl From<&Task> for ProgressSnapshot {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            issue_id: task.issue_id.clone(),
            stage: task.stage,
            progress: task.progress,
            message: task.message.clone(),
            error: task.error.clone(),
            updated_at: task.updated_at,
        }
    }
}

/// Merge the cached and stored views of one task.
pub fn reconcile(
    cached: Option<ProgressSnapshot>,
    stored: Option<ProgressSnapshot>,
) -> Option<ProgressSnapshot> {
    match (cached, stored) {
        (Some(cached), Some(stored)) => {
            if cached.progress >= stored.progress {
                Some(cached)
            } else {
                Some(stored)
            }
        }
        (cached, stored) => cached.or(stored),
    }
}

// ─── ProgressCache ───────────────────────────────────────────────────

/// In-memory progress cache owned by the coordinator.
///
/// Lost on restart; the store is authoritative.
#[derive(Debug, Default)]
pub struct ProgressCache {
    entries: Mutex<HashMap<String, ProgressSnapshot>>,
}

impl ProgressCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ProgressSnapshot>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a snapshot. Lower progress than the cached value is ignored.
    pub fn publish(&self, snapshot: ProgressSnapshot) {
        let mut entries = self.lock();
        if let Some(existing) = entries.get(&snapshot.task_id) {
            if existing.progress > snapshot.progress {
                return;
            }
        }
        entries.insert(snapshot.task_id.clone(), snapshot);
    }

    pub fn get(&self, task_id: &str) -> Option<ProgressSnapshot> {
        self.lock().get(task_id).cloned()
    }

    pub fn remove(&self, task_id: &str) {
        self.lock().remove(task_id);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

// ─── ProgressWatcher ─────────────────────────────────────────────────

/// How a watch ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEnd {
    /// The task reached DONE or FAILED.
    Terminal(ProgressSnapshot),
    /// Nothing changed for `max_idle_polls` consecutive polls.
    Idle(Option<ProgressSnapshot>),
}

/// Polling progress reader.
pub struct ProgressWatcher<S> {
    cache: Arc<ProgressCache>,
    store: Arc<S>,
    interval: Duration,
    max_idle_polls: u32,
}

impl<S: TaskStore> ProgressWatcher<S> {
    pub fn new(cache: Arc<ProgressCache>, store: Arc<S>, config: &ProgressConfig) -> Self {
        Self {
            cache,
            store,
            interval: config.poll_interval(),
            max_idle_polls: config.max_idle_polls,
        }
    }

    /// Reconciled snapshot of one task.
    pub async fn snapshot(&self, task_id: &str) -> Result<Option<ProgressSnapshot>, StorageError> {
        let stored = self.store.get_task(task_id).await?;
        Ok(reconcile(
            self.cache.get(task_id),
            stored.as_ref().map(ProgressSnapshot::from),
        ))
    }

    /// Poll until the task is terminal or stops changing.
    ///
    /// `on_update` sees every distinct snapshot, including the first one.
    pub async fn watch<F>(&self, task_id: &str, mut on_update: F) -> Result<WatchEnd, StorageError>
    where
        F: FnMut(&ProgressSnapshot) + Send,
    {
        let mut last: Option<ProgressSnapshot> = None;
        let mut idle_polls = 0u32;

        loop {
            let current = self.snapshot(task_id).await?;

            let changed = match (&current, &last) {
                (Some(current), Some(last)) => !current.same_state(last),
                (Some(_), None) => true,
                (None, _) => false,
            };

            if changed {
                idle_polls = 0;
                if let Some(snapshot) = &current {
                    on_update(snapshot);
                    if snapshot.is_terminal() {
                        return Ok(WatchEnd::Terminal(snapshot.clone()));
                    }
                }
                last = current;
            } else {
                idle_polls += 1;
                if idle_polls >= self.max_idle_polls {
                    tracing::debug!(task_id, idle_polls, "progress watch went idle");
                    return Ok(WatchEnd::Idle(last));
                }
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::store::MemoryStore;

    fn snapshot(task_id: &str, progress: u8) -> ProgressSnapshot {
        ProgressSnapshot {
            task_id: task_id.to_owned(),
            issue_id: "ISSUE-1".to_owned(),
            stage: TaskStage::from_progress(progress, None),
            progress,
            message: format!("at {progress}"),
            error: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn cache_wins_when_ahead_or_equal() {
        let merged = reconcile(Some(snapshot("t", 40)), Some(snapshot("t", 30))).unwrap();
        assert_eq!(merged.progress, 40);

        let mut cached = snapshot("t", 30);
        cached.message = "from cache".to_owned();
        let merged = reconcile(Some(cached), Some(snapshot("t", 30))).unwrap();
        assert_eq!(merged.message, "from cache");
    }

    #[test]
    fn store_wins_when_cache_is_behind() {
        let merged = reconcile(Some(snapshot("t", 10)), Some(snapshot("t", 60))).unwrap();
        assert_eq!(merged.progress, 60);
    }

    #[test]
    fn either_side_alone_is_used() {
        assert_eq!(reconcile(None, Some(snapshot("t", 5))).unwrap().progress, 5);
        assert_eq!(reconcile(Some(snapshot("t", 7)), None).unwrap().progress, 7);
        assert!(reconcile(None, None).is_none());
    }

    #[test]
    fn cache_never_regresses() {
        let cache = ProgressCache::new();
        cache.publish(snapshot("t", 50));
        cache.publish(snapshot("t", 30));
        assert_eq!(cache.get("t").unwrap().progress, 50);

        cache.publish(snapshot("t", 60));
        assert_eq!(cache.get("t").unwrap().progress, 60);

        cache.clear();
        assert!(cache.is_empty());
    }

    fn config(max_idle_polls: u32) -> ProgressConfig {
        ProgressConfig {
            poll_interval_ms: 10,
            max_idle_polls,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn watch_stops_at_terminal_stage() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(ProgressCache::new());
        let mut task = Task::new("ISSUE-1", None);
        store.put_task(&task).await.unwrap();

        let watcher = ProgressWatcher::new(Arc::clone(&cache), Arc::clone(&store), &config(100));
        let id = task.id.clone();
        let updater = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move {
                for progress in [30u8, 60, 100] {
                    tokio::time::sleep(Duration::from_millis(25)).await;
                    let mut snap = snapshot(&id, progress);
                    if progress == 100 {
                        snap.stage = TaskStage::Done;
                    }
                    cache.publish(snap);
                }
            }
        });

        let mut seen = Vec::new();
        let end = watcher
            .watch(&task.id, |s| seen.push(s.progress))
            .await
            .unwrap();
        updater.await.unwrap();

        assert!(matches!(end, WatchEnd::Terminal(ref s) if s.stage == TaskStage::Done));
        assert_eq!(seen, vec![0, 30, 60, 100]);

        // the stored record alone also ends the watch
        task.stage = TaskStage::Failed;
        task.progress = 100;
        store.put_task(&task).await.unwrap();
        cache.clear();
        let end = watcher.watch(&task.id, |_| {}).await.unwrap();
        assert!(matches!(end, WatchEnd::Terminal(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn watch_gives_up_when_idle() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(ProgressCache::new());
        let task = Task::new("ISSUE-1", None);
        store.put_task(&task).await.unwrap();

        let watcher = ProgressWatcher::new(cache, store, &config(3));
        let mut updates = 0;
        let end = watcher.watch(&task.id, |_| updates += 1).await.unwrap();

        assert_eq!(updates, 1);
        assert!(matches!(end, WatchEnd::Idle(Some(ref s)) if s.progress == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn watch_of_unknown_task_goes_idle() {
        let watcher = ProgressWatcher::new(
            Arc::new(ProgressCache::new()),
            Arc::new(MemoryStore::new()),
            &config(2),
        );
        let end = watcher.watch("missing", |_| {}).await.unwrap();
        assert_eq!(end, WatchEnd::Idle(None));
    }
}
