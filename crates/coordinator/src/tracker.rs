//! Local issue tracker for upload mode.
//!
//! Issues are registered in memory with log references that point at local
//! files. Results are posted as markdown files, one per task.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;

use logtriage_core::error::TrackerError;
use logtriage_core::{AnalysisResult, Issue, IssueTracker, LogFileRef};

/// In-process tracker backed by the local filesystem.
#[derive(Debug)]
pub struct LocalIssueTracker {
    issues: RwLock<HashMap<String, Issue>>,
    results_dir: PathBuf,
}

impl LocalIssueTracker {
    /// Results are written under `results_dir`.
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            issues: RwLock::new(HashMap::new()),
            results_dir: results_dir.into(),
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Register or replace an issue.
    pub async fn register(&self, issue: Issue) {
        self.issues.write().await.insert(issue.id.clone(), issue);
    }

    /// Path the formatted result of `task_id` is posted to.
    pub fn result_path(&self, issue_id: &str, task_id: &str) -> PathBuf {
        let issue_id: String = issue_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.results_dir.join(format!("{issue_id}-{task_id}.md"))
    }
}

impl IssueTracker for LocalIssueTracker {
    async fn fetch_issue(&self, issue_id: &str) -> Result<Issue, TrackerError> {
        self.issues
            .read()
            .await
            .get(issue_id)
            .cloned()
            .ok_or_else(|| TrackerError::IssueNotFound {
                issue_id: issue_id.to_owned(),
            })
    }

    async fn fetch_log(&self, file: &LogFileRef, dest_dir: &Path) -> Result<PathBuf, TrackerError> {
        let fetch_err = |reason: String| TrackerError::FetchFailed {
            name: file.name.clone(),
            reason,
        };

        let name = Path::new(&file.name)
            .file_name()
            .ok_or_else(|| fetch_err("invalid file name".to_owned()))?;
        let dest = dest_dir.join(name);
        let src = Path::new(&file.locator);

        // already in place (upload mode saves straight into raw/)
        if src == dest {
            return Ok(dest);
        }

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        tokio::fs::copy(src, &dest)
            .await
            .map_err(|e| fetch_err(format!("{}: {e}", src.display())))?;
        Ok(dest)
    }

    async fn post_result(
        &self,
        issue: &Issue,
        result: &AnalysisResult,
        formatted: &str,
    ) -> Result<(), TrackerError> {
        let post_err = |reason: String| TrackerError::PostFailed {
            issue_id: issue.id.clone(),
            reason,
        };
        tokio::fs::create_dir_all(&self.results_dir)
            .await
            .map_err(|e| post_err(e.to_string()))?;
        let path = self.result_path(&issue.id, &result.task_id);
        tokio::fs::write(&path, formatted)
            .await
            .map_err(|e| post_err(e.to_string()))?;
        tracing::info!(issue_id = %issue.id, path = %path.display(), "posted result");
        Ok(())
    }
}
