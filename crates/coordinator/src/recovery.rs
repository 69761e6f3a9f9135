//! Crash recovery.
//!
//! Runs once at process start, before any new run is triggered. A task that
//! was still in flight when its process died can never finish, so it is marked
//! FAILED; its issue goes from `analyzing` to `failed`.
//!
//! Other processes may share the data directory. A task whose owner still
//! holds a live [`SessionLease`](crate::lease::SessionLease) is left alone,
//! along with its issue.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use logtriage_core::error::StorageError;
use logtriage_core::metrics as m;
use logtriage_core::types::PROGRESS_COMPLETE;
use logtriage_core::{IssueStatus, TaskStage};

use crate::lease::owner_is_live;
use crate::store::DurableStore;

/// Reason recorded on swept tasks.
pub const INTERRUPTED_REASON: &str = "interrupted by restart";

/// What a recovery sweep changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Ids of tasks moved to FAILED.
    pub tasks: Vec<String>,
    /// Ids of issues moved to `failed`.
    pub issues: Vec<String>,
    /// Ids of in-flight tasks left running under a live session.
    pub live: Vec<String>,
    /// Ids of expired session leases removed.
    pub expired_leases: Vec<String>,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.issues.is_empty()
    }
}

/// Fail every in-flight task and analysing issue not held by a live session.
///
/// `ttl` is how long a session lease stays valid after its last heartbeat.
pub async fn recover_interrupted<S: DurableStore>(
    store: &S,
    ttl: Duration,
) -> Result<RecoveryReport, StorageError> {
    let mut report = RecoveryReport::default();
    let mut live_issues = HashSet::new();

    for mut task in store.list_tasks().await? {
        if !task.stage.is_in_flight() {
            continue;
        }
        if owner_is_live(store, &task, ttl).await? {
            tracing::debug!(task_id = %task.id, owner = ?task.owner, "task owned by live session");
            live_issues.insert(task.issue_id.clone());
            report.live.push(task.id);
            continue;
        }
        tracing::warn!(task_id = %task.id, issue_id = %task.issue_id, stage = %task.stage, "failing interrupted task");
        task.stage = TaskStage::Failed;
        task.progress = PROGRESS_COMPLETE;
        task.message = "failed".to_owned();
        task.error = Some(INTERRUPTED_REASON.to_owned());
        task.updated_at = Utc::now();
        store.put_task(&task).await?;
        report.tasks.push(task.id);
    }

    for mut issue in store.list_issues().await? {
        if issue.status != IssueStatus::Analyzing || live_issues.contains(&issue.id) {
            continue;
        }
        issue.status = IssueStatus::Failed;
        store.put_issue(&issue).await?;
        report.issues.push(issue.id);
    }

    let now = Utc::now();
    for lease in store.list_leases().await? {
        if !lease.is_live(ttl, now) {
            store.delete_lease(&lease.id).await?;
            report.expired_leases.push(lease.id);
        }
    }

    if !report.is_empty() || !report.live.is_empty() {
        if !report.tasks.is_empty() {
            metrics::counter!(m::TASKS_RECOVERED_TOTAL).increment(report.tasks.len() as u64);
        }
        tracing::info!(
            tasks = report.tasks.len(),
            issues = report.issues.len(),
            live = report.live.len(),
            expired_leases = report.expired_leases.len(),
            "recovered interrupted work"
        );
    }
    Ok(report)
}
