//! Durable task, issue and result records.
//!
//! The store is the authoritative record of where every task stands. The
//! in-memory progress cache only ever runs ahead of it, see
//! [`crate::progress::reconcile`].
//!
//! - [`MemoryStore`]: tests and one-shot runs
//! - [`JsonFileStore`]: one JSON document per record, survives restarts
//!
//! Session leases live next to the records so that processes sharing a data
//! directory can see each other, see [`crate::lease`].

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use logtriage_core::error::StorageError;
use logtriage_core::{AnalysisResult, Issue, Task};

use crate::lease::SessionLease;

/// Task records.
pub trait TaskStore: Send + Sync + 'static {
    /// Insert or replace a task.
    fn put_task(&self, task: &Task) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn get_task(&self, id: &str)
    -> impl Future<Output = Result<Option<Task>, StorageError>> + Send;

    /// All tasks, oldest first.
    fn list_tasks(&self) -> impl Future<Output = Result<Vec<Task>, StorageError>> + Send;
}

/// Issue records.
pub trait IssueStore: Send + Sync + 'static {
    fn put_issue(&self, issue: &Issue) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn get_issue(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<Issue>, StorageError>> + Send;

    /// All issues ordered by id.
    fn list_issues(&self) -> impl Future<Output = Result<Vec<Issue>, StorageError>> + Send;
}

/// Analysis results, keyed by task id.
pub trait ResultStore: Send + Sync + 'static {
    fn put_result(
        &self,
        result: &AnalysisResult,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn get_result(
        &self,
        task_id: &str,
    ) -> impl Future<Output = Result<Option<AnalysisResult>, StorageError>> + Send;
}

/// Coordinator session leases, keyed by session id.
pub trait LeaseStore: Send + Sync + 'static {
    /// Insert or refresh a lease.
    fn put_lease(
        &self,
        lease: &SessionLease,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn get_lease(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<SessionLease>, StorageError>> + Send;

    /// Remove a lease. Removing a missing lease is not an error.
    fn delete_lease(&self, id: &str) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn list_leases(&self) -> impl Future<Output = Result<Vec<SessionLease>, StorageError>> + Send;
}

/// Everything the coordinator persists.
pub trait DurableStore: TaskStore + IssueStore + ResultStore + LeaseStore {}

impl<T: TaskStore + IssueStore + ResultStore + LeaseStore> DurableStore for T {}

fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

// ─── MemoryStore ─────────────────────────────────────────────────────

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: RwLock<HashMap<String, Task>>,
    issues: RwLock<HashMap<String, Issue>>,
    results: RwLock<HashMap<String, AnalysisResult>>,
    leases: RwLock<HashMap<String, SessionLease>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for MemoryStore {
    async fn put_task(&self, task: &Task) -> Result<(), StorageError> {
        self.tasks
            .write()
            .await
            .insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>, StorageError> {
        Ok(self.tasks.read().await.get(id).cloned())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, StorageError> {
        let mut tasks: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        sort_tasks(&mut tasks);
        Ok(tasks)
    }
}

impl IssueStore for MemoryStore {
    async fn put_issue(&self, issue: &Issue) -> Result<(), StorageError> {
        self.issues
            .write()
            .await
            .insert(issue.id.clone(), issue.clone());
        Ok(())
    }

    async fn get_issue(&self, id: &str) -> Result<Option<Issue>, StorageError> {
        Ok(self.issues.read().await.get(id).cloned())
    }

    async fn list_issues(&self) -> Result<Vec<Issue>, StorageError> {
        let mut issues: Vec<Issue> = self.issues.read().await.values().cloned().collect();
        issues.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(issues)
    }
}

impl ResultStore for MemoryStore {
    async fn put_result(&self, result: &AnalysisResult) -> Result<(), StorageError> {
        self.results
            .write()
            .await
            .insert(result.task_id.clone(), result.clone());
        Ok(())
    }

    async fn get_result(&self, task_id: &str) -> Result<Option<AnalysisResult>, StorageError> {
        Ok(self.results.read().await.get(task_id).cloned())
    }
}

impl LeaseStore for MemoryStore {
    async fn put_lease(&self, lease: &SessionLease) -> Result<(), StorageError> {
        self.leases
            .write()
            .await
            .insert(lease.id.clone(), lease.clone());
        Ok(())
    }

    async fn get_lease(&self, id: &str) -> Result<Option<SessionLease>, StorageError> {
        Ok(self.leases.read().await.get(id).cloned())
    }

    async fn delete_lease(&self, id: &str) -> Result<(), StorageError> {
        self.leases.write().await.remove(id);
        Ok(())
    }

    async fn list_leases(&self) -> Result<Vec<SessionLease>, StorageError> {
        Ok(self.leases.read().await.values().cloned().collect())
    }
}

// ─── JsonFileStore ───────────────────────────────────────────────────

const TASKS: &str = "tasks";
const ISSUES: &str = "issues";
const RESULTS: &str = "results";
const LEASES: &str = "leases";

/// File-backed store: `<root>/{tasks,issues,results,leases}/<id>.json`.
///
/// Each record is written to a temp file and renamed into place, so a crash
/// mid-write leaves the previous version intact.
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    /// Open the store, creating its directories.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        for kind in [TASKS, ISSUES, RESULTS, LEASES] {
            let dir = root.join(kind);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| write_err(&dir, e))?;
        }
        Ok(Self {
            root,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, kind: &str, id: &str) -> Result<PathBuf, StorageError> {
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && !id.contains(['/', '\\'])
            && !id.chars().any(char::is_control);
        if !valid {
            return Err(StorageError::Write {
                path: self.root.join(kind).display().to_string(),
                reason: format!("invalid record id '{id}'"),
            });
        }
        Ok(self.root.join(kind).join(format!("{id}.json")))
    }

    async fn write_record<T: Serialize + Sync>(
        &self,
        kind: &str,
        id: &str,
        record: &T,
    ) -> Result<(), StorageError> {
        let path = self.record_path(kind, id)?;
        let json = serde_json::to_vec_pretty(record).map_err(|e| StorageError::Serialization {
            kind: kind.to_owned(),
            id: id.to_owned(),
            reason: e.to_string(),
        })?;
        let tmp = self.root.join(kind).join(format!(".{id}.json.tmp"));

        let _guard = self.write_lock.lock().await;
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| write_err(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| write_err(&path, e))?;
        Ok(())
    }

    async fn read_record<T: DeserializeOwned>(
        &self,
        kind: &str,
        id: &str,
    ) -> Result<Option<T>, StorageError> {
        let path = self.record_path(kind, id)?;
        read_file(kind, id, &path).await
    }

    async fn delete_record(&self, kind: &str, id: &str) -> Result<(), StorageError> {
        let path = self.record_path(kind, id)?;
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(write_err(&path, e)),
        }
    }

    async fn list_records<T: DeserializeOwned>(&self, kind: &str) -> Result<Vec<T>, StorageError> {
        let dir = self.root.join(kind);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| read_err(&dir, e))?;

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| read_err(&dir, e))? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(id) = name.strip_suffix(".json") else {
                continue;
            };
            if id.starts_with('.') {
                continue;
            }
            match read_file::<T>(kind, id, &path).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record");
                }
            }
        }
        Ok(records)
    }
}

async fn read_file<T: DeserializeOwned>(
    kind: &str,
    id: &str,
    path: &Path,
) -> Result<Option<T>, StorageError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(read_err(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StorageError::Serialization {
            kind: kind.to_owned(),
            id: id.to_owned(),
            reason: e.to_string(),
        })
}

fn read_err(path: &Path, e: std::io::Error) -> StorageError {
    StorageError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

fn write_err(path: &Path, e: std::io::Error) -> StorageError {
    StorageError::Write {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

impl TaskStore for JsonFileStore {
    async fn put_task(&self, task: &Task) -> Result<(), StorageError> {
        self.write_record(TASKS, &task.id, task).await
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>, StorageError> {
        self.read_record(TASKS, id).await
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, StorageError> {
        let mut tasks = self.list_records::<Task>(TASKS).await?;
        sort_tasks(&mut tasks);
        Ok(tasks)
    }
}

impl IssueStore for JsonFileStore {
    async fn put_issue(&self, issue: &Issue) -> Result<(), StorageError> {
        self.write_record(ISSUES, &issue.id, issue).await
    }

    async fn get_issue(&self, id: &str) -> Result<Option<Issue>, StorageError> {
        self.read_record(ISSUES, id).await
    }

    async fn list_issues(&self) -> Result<Vec<Issue>, StorageError> {
        let mut issues = self.list_records::<Issue>(ISSUES).await?;
        issues.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(issues)
    }
}

impl ResultStore for JsonFileStore {
    async fn put_result(&self, result: &AnalysisResult) -> Result<(), StorageError> {
        self.write_record(RESULTS, &result.task_id, result).await
    }

    async fn get_result(&self, task_id: &str) -> Result<Option<AnalysisResult>, StorageError> {
        self.read_record(RESULTS, task_id).await
    }
}

impl LeaseStore for JsonFileStore {
    async fn put_lease(&self, lease: &SessionLease) -> Result<(), StorageError> {
        self.write_record(LEASES, &lease.id, lease).await
    }

    async fn get_lease(&self, id: &str) -> Result<Option<SessionLease>, StorageError> {
        self.read_record(LEASES, id).await
    }

    async fn delete_lease(&self, id: &str) -> Result<(), StorageError> {
        self.delete_record(LEASES, id).await
    }

    async fn list_leases(&self) -> Result<Vec<SessionLease>, StorageError> {
        self.list_records::<SessionLease>(LEASES).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use logtriage_core::{IssueStatus, TaskStage};

    async fn exercise_store(store: &impl DurableStore) {
        let mut first = Task::new("ISSUE-1", None);
        let second = Task::new("ISSUE-2", Some("codex".to_owned()));
        store.put_task(&first).await.unwrap();
        store.put_task(&second).await.unwrap();

        first.progress = 40;
        first.stage = TaskStage::Extracting;
        store.put_task(&first).await.unwrap();

        let loaded = store.get_task(&first.id).await.unwrap().unwrap();
        assert_eq!(loaded.progress, 40);
        assert_eq!(store.list_tasks().await.unwrap().len(), 2);
        assert!(store.get_task("missing").await.unwrap().is_none());

        let issue = Issue {
            id: "ISSUE-1".to_owned(),
            status: IssueStatus::Analyzing,
            ..Issue::default()
        };
        store.put_issue(&issue).await.unwrap();
        assert_eq!(
            store.get_issue("ISSUE-1").await.unwrap().unwrap().status,
            IssueStatus::Analyzing
        );

        let result = AnalysisResult {
            task_id: first.id.clone(),
            problem_type: "ble".to_owned(),
            ..AnalysisResult::default()
        };
        store.put_result(&result).await.unwrap();
        assert_eq!(
            store.get_result(&first.id).await.unwrap().unwrap().problem_type,
            "ble"
        );

        let lease = SessionLease::new("session-1");
        store.put_lease(&lease).await.unwrap();
        assert_eq!(store.get_lease("session-1").await.unwrap(), Some(lease));
        assert_eq!(store.list_leases().await.unwrap().len(), 1);
        store.delete_lease("session-1").await.unwrap();
        store.delete_lease("session-1").await.unwrap();
        assert!(store.get_lease("session-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_semantics() {
        exercise_store(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn json_store_semantics() {
        let dir = tempfile::tempdir().unwrap();
        exercise_store(&JsonFileStore::open(dir.path()).await.unwrap()).await;
    }

    #[tokio::test]
    async fn json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let task = Task::new("ISSUE-3", None);
        {
            let store = JsonFileStore::open(dir.path()).await.unwrap();
            store.put_task(&task).await.unwrap();
        }
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        assert_eq!(store.get_task(&task.id).await.unwrap().unwrap(), task);
    }

    #[tokio::test]
    async fn json_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        let issue = Issue {
            id: "../escape".to_owned(),
            ..Issue::default()
        };
        assert!(matches!(
            store.put_issue(&issue).await,
            Err(StorageError::Write { .. })
        ));
    }

    #[tokio::test]
    async fn json_store_skips_corrupt_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        store.put_task(&Task::new("ISSUE-4", None)).await.unwrap();
        std::fs::write(dir.path().join(TASKS).join("broken.json"), b"{").unwrap();

        assert_eq!(store.list_tasks().await.unwrap().len(), 1);
        assert!(matches!(
            store.get_task("broken").await,
            Err(StorageError::Serialization { .. })
        ));
    }
}
