//! Pipeline coordinator.
//!
//! [`PipelineCoordinator`] drives one analysis run per trigger:
//!
//! ```text
//! fetch issue -> download -> decode -> match rules -> extract
//!     -> workspace -> [agent slot] -> agent -> outcome -> DONE | FAILED
//! ```
//!
//! Every run is fire-and-forget background work on a [`TaskTracker`]. The
//! agent stage is the only one gated by the semaphore; decode and extraction
//! run unthrottled. Progress goes to the [`ProgressCache`] first and the
//! durable store second, so the cache may run ahead but never behind.
//!
//! The first trigger opens a session lease in the store and keeps it fresh
//! until shutdown. Tasks record the session as their owner, which lets the
//! restart sweep and the duplicate check in other processes see live runs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{OnceCell, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use logtriage_core::config::{ProgressConfig, TriageConfig};
use logtriage_core::metrics as m;
use logtriage_core::types::PROGRESS_COMPLETE;
use logtriage_core::{
    AnalysisResult, Confidence, Issue, IssueStatus, IssueTracker, LogFileRef, ResultStatus, Task,
    TaskStage,
};
use logtriage_log_pipeline::{
    ContainerDecoder, Extractor, PipelineConfig, RuleCatalog, RuleStore, guess_problem_date,
};

use crate::agent::{AgentRouter, build_prompt};
use crate::error::CoordinatorError;
use crate::lease::{self, SessionLease, heartbeat_interval, owner_is_live};
use crate::outcome::{self, failure_reason};
use crate::progress::{ProgressCache, ProgressSnapshot, ProgressWatcher, reconcile};
use crate::store::DurableStore;
use crate::workspace::{Workspace, unique_name};

/// Problem type recorded when a run aborts on an internal error.
pub const ANALYSIS_ERROR: &str = "analysis error";

// ─── Active issue guard ──────────────────────────────────────────────

/// Issues with a run in flight.
#[derive(Debug, Clone, Default)]
struct ActiveIssues {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl ActiveIssues {
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim an issue; `None` when it is already active.
    fn claim(&self, issue_id: &str) -> Option<ActiveGuard> {
        if !self.lock().insert(issue_id.to_owned()) {
            return None;
        }
        Some(ActiveGuard {
            ids: Arc::clone(&self.ids),
            issue_id: issue_id.to_owned(),
        })
    }

    fn snapshot(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().iter().cloned().collect();
        ids.sort();
        ids
    }

    fn clear(&self) {
        self.lock().clear();
    }
}

/// Releases the issue when the run ends, however it ends.
#[derive(Debug)]
struct ActiveGuard {
    ids: Arc<Mutex<HashSet<String>>>,
    issue_id: String,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.issue_id);
    }
}

// ─── Session lease ───────────────────────────────────────────────────

/// This coordinator's lease and its heartbeat.
struct Session {
    id: String,
    ttl: Duration,
    opened: OnceCell<()>,
    stop: CancellationToken,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    // stops the heartbeat when the coordinator is dropped without shutdown
    _stop_on_drop: DropGuard,
}

impl Session {
    fn new(ttl: Duration) -> Self {
        let stop = CancellationToken::new();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            ttl,
            opened: OnceCell::new(),
            _stop_on_drop: stop.clone().drop_guard(),
            stop,
            heartbeat: Mutex::new(None),
        }
    }

    fn take_heartbeat(&self) -> Option<JoinHandle<()>> {
        self.heartbeat
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

// ─── PipelineCoordinator ─────────────────────────────────────────────

/// Where a run gets its issue and input files from.
enum Source {
    /// Fetch the issue and its logs through the tracker.
    Tracker,
    /// Issue supplied inline, input files already on disk.
    Upload { issue: Issue, files: Vec<PathBuf> },
}

struct Inner<T, S, R> {
    tracker: Arc<T>,
    store: Arc<S>,
    catalog: Arc<RuleCatalog<R>>,
    decoder: ContainerDecoder,
    extractor: Extractor,
    router: AgentRouter,
    agent_slots: Semaphore,
    cache: Arc<ProgressCache>,
    active: ActiveIssues,
    tasks: TaskTracker,
    workspace_dir: PathBuf,
    code_repo: Option<PathBuf>,
    progress: ProgressConfig,
    session: Session,
}

/// Orchestrates analysis runs.
///
/// Cheap to clone; clones share the same runs, cache and semaphore.
pub struct PipelineCoordinator<T, S, R> {
    inner: Arc<Inner<T, S, R>>,
}

impl<T, S, R> Clone for PipelineCoordinator<T, S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, S, R> PipelineCoordinator<T, S, R>
where
    T: IssueTracker,
    S: DurableStore,
    R: RuleStore,
{
    pub fn builder() -> PipelineCoordinatorBuilder<T, S, R> {
        PipelineCoordinatorBuilder::new()
    }

    /// Start a run for an issue held by the tracker.
    ///
    /// Returns the new task id. Fails with [`CoordinatorError::ActiveIssue`]
    /// when the issue already has a run in flight, here or in another live
    /// session sharing the store.
    pub async fn trigger(
        &self,
        issue_id: &str,
        agent_override: Option<String>,
    ) -> Result<String, CoordinatorError> {
        self.start(issue_id, agent_override, Source::Tracker).await
    }

    /// Start a run for an issue supplied inline with files already on disk.
    pub async fn trigger_upload(
        &self,
        mut issue: Issue,
        files: Vec<PathBuf>,
        agent_override: Option<String>,
    ) -> Result<String, CoordinatorError> {
        if issue.source.is_empty() {
            issue.source = "upload".to_owned();
        }
        issue.log_files = files
            .iter()
            .map(|path| LogFileRef {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                locator: path.display().to_string(),
                size: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            })
            .collect();
        let issue_id = issue.id.clone();
        self.start(&issue_id, agent_override, Source::Upload { issue, files })
            .await
    }

    async fn start(
        &self,
        issue_id: &str,
        agent_override: Option<String>,
        source: Source,
    ) -> Result<String, CoordinatorError> {
        if self.inner.tasks.is_closed() {
            return Err(CoordinatorError::ShutDown);
        }
        let guard = self
            .inner
            .active
            .claim(issue_id)
            .ok_or_else(|| CoordinatorError::ActiveIssue {
                issue_id: issue_id.to_owned(),
            })?;
        self.open_session().await?;
        self.reject_foreign_run(issue_id).await?;

        let mut task = Task::new(issue_id, agent_override.filter(|a| !a.trim().is_empty()));
        task.owner = Some(self.inner.session.id.clone());
        self.inner.cache.publish(ProgressSnapshot::from(&task));
        self.inner.store.put_task(&task).await?;

        metrics::counter!(m::TASKS_STARTED_TOTAL).increment(1);
        info!(task_id = %task.id, issue_id, "analysis triggered");

        let task_id = task.id.clone();
        let inner = Arc::clone(&self.inner);
        self.inner.tasks.spawn(async move {
            inner.run(task, source).await;
            drop(guard);
        });
        Ok(task_id)
    }

    /// Write the session lease and start its heartbeat, once.
    async fn open_session(&self) -> Result<(), CoordinatorError> {
        let session = &self.inner.session;
        session
            .opened
            .get_or_try_init(|| async {
                let lease = SessionLease::new(&session.id);
                self.inner.store.put_lease(&lease).await?;
                let handle = tokio::spawn(lease::heartbeat(
                    Arc::clone(&self.inner.store),
                    lease,
                    heartbeat_interval(session.ttl),
                    session.stop.clone(),
                ));
                *session
                    .heartbeat
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);
                info!(session = %session.id, ttl_secs = session.ttl.as_secs(), "session lease opened");
                Ok::<(), CoordinatorError>(())
            })
            .await?;
        Ok(())
    }

    /// Refuse an issue that a live session elsewhere is still analysing.
    async fn reject_foreign_run(&self, issue_id: &str) -> Result<(), CoordinatorError> {
        let session = &self.inner.session;
        for task in self.inner.store.list_tasks().await? {
            if task.issue_id != issue_id
                || !task.stage.is_in_flight()
                || task.owner.as_deref() == Some(session.id.as_str())
            {
                continue;
            }
            if owner_is_live(self.inner.store.as_ref(), &task, session.ttl).await? {
                warn!(issue_id, task_id = %task.id, owner = ?task.owner, "issue active in another session");
                return Err(CoordinatorError::ActiveIssue {
                    issue_id: issue_id.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Reconciled progress of one task.
    pub async fn snapshot(
        &self,
        task_id: &str,
    ) -> Result<Option<ProgressSnapshot>, CoordinatorError> {
        let stored = self.inner.store.get_task(task_id).await?;
        Ok(reconcile(
            self.inner.cache.get(task_id),
            stored.as_ref().map(ProgressSnapshot::from),
        ))
    }

    /// Polling reader over this coordinator's cache and store.
    pub fn watcher(&self) -> ProgressWatcher<S> {
        ProgressWatcher::new(
            Arc::clone(&self.inner.cache),
            Arc::clone(&self.inner.store),
            &self.inner.progress,
        )
    }

    /// Stored result of a finished task.
    pub async fn result(&self, task_id: &str) -> Result<Option<AnalysisResult>, CoordinatorError> {
        Ok(self.inner.store.get_result(task_id).await?)
    }

    /// Issues with a run in flight, sorted.
    pub fn active_issues(&self) -> Vec<String> {
        self.inner.active.snapshot()
    }

    /// Number of runs still executing.
    pub fn in_flight(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Id this coordinator records as the owner of its tasks.
    pub fn session_id(&self) -> &str {
        &self.inner.session.id
    }

    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    pub fn catalog(&self) -> &Arc<RuleCatalog<R>> {
        &self.inner.catalog
    }

    /// Stop accepting triggers, wait for in-flight runs, release the lease.
    pub async fn shutdown(&self) {
        self.inner.tasks.close();
        self.inner.agent_slots.close();
        info!(in_flight = self.inner.tasks.len(), "coordinator shutting down");
        self.inner.tasks.wait().await;
        self.inner.cache.clear();
        self.inner.active.clear();

        let session = &self.inner.session;
        session.stop.cancel();
        if let Some(handle) = session.take_heartbeat() {
            let _ = handle.await;
        }
        if session.opened.initialized() {
            if let Err(e) = self.inner.store.delete_lease(&session.id).await {
                warn!(session = %session.id, error = %e, "failed to release session lease");
            }
        }
    }
}

impl<T, S, R> Inner<T, S, R>
where
    T: IssueTracker,
    S: DurableStore,
    R: RuleStore,
{
    async fn run(&self, mut task: Task, source: Source) {
        let task_id = task.id.clone();
        if let Err(e) = self.execute(&mut task, source).await {
            error!(task_id = %task_id, issue_id = %task.issue_id, error = %e, "analysis failed");
            self.abort(&mut task, &e.to_string()).await;
        }
    }

    /// Publish progress to both sinks. Progress never moves backwards.
    async fn advance(
        &self,
        task: &mut Task,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<(), CoordinatorError> {
        let progress = progress.max(task.progress).min(PROGRESS_COMPLETE - 1);
        task.progress = progress;
        task.stage = TaskStage::from_progress(progress, None);
        task.message = message.into();
        task.updated_at = Utc::now();

        self.cache.publish(ProgressSnapshot::from(&*task));
        self.store.put_task(task).await?;
        tracing::debug!(task_id = %task.id, progress, stage = %task.stage, message = %task.message, "progress");
        Ok(())
    }

    async fn execute(&self, task: &mut Task, source: Source) -> Result<(), CoordinatorError> {
        self.advance(task, 5, "fetching issue").await?;
        let (mut issue, uploads) = match source {
            Source::Tracker => (self.tracker.fetch_issue(&task.issue_id).await?, None),
            Source::Upload { issue, files } => (issue, Some(files)),
        };
        issue.status = IssueStatus::Analyzing;
        self.store.put_issue(&issue).await?;

        let ws = Workspace::create(&self.workspace_dir, &task.id).await?;

        // acquire
        let (inputs, mut diagnostics) = match uploads {
            Some(files) => {
                self.advance(task, 8, "staging uploaded files").await?;
                ws.stage_uploads(&files).await
            }
            None => {
                self.advance(task, 10, "downloading logs").await?;
                self.download(&issue, &ws.raw_dir()).await
            }
        };
        self.advance(task, 25, format!("downloaded {} files", inputs.len()))
            .await?;

        if inputs.is_empty() {
            warn!(task_id = %task.id, issue_id = %issue.id, "no input files");
            let result = outcome::no_logs_result(&task.id, &issue, &diagnostics);
            return self.finish(task, &mut issue, result).await;
        }

        // decode
        self.advance(task, 30, "decoding logs").await?;
        let corpus = self.decoder.decode_all(&inputs, &ws.processed_dir()).await;
        diagnostics.extend(corpus.diagnostics.iter().cloned());
        self.advance(task, 40, format!("decoded {} log files", corpus.logs.len()))
            .await?;
        if corpus.is_empty() {
            warn!(task_id = %task.id, diagnostics = ?diagnostics, "no usable logs, continuing without evidence");
        }

        // classify
        self.advance(task, 45, "matching rules").await?;
        let rule_id = self.catalog.classify(&issue.description).await;
        let rules = self.catalog.expand(&rule_id).await;
        info!(
            task_id = %task.id,
            rule_id = %rule_id,
            rules = ?rules.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            "rules matched"
        );

        // extract
        self.advance(task, 50, "pre-extracting").await?;
        let problem_date = guess_problem_date(&issue.description);
        let extraction = if corpus.is_empty() {
            None
        } else {
            Some(
                self.extractor
                    .extract(&rules, &corpus.logs, problem_date.as_deref())
                    .await,
            )
        };

        // workspace
        self.advance(task, 55, "preparing workspace").await?;
        ws.install_logs(&corpus.logs).await?;
        ws.install_rules(&rules).await?;
        ws.link_code(&rules, self.code_repo.as_deref()).await?;
        let prompt = build_prompt(&issue, &rules, extraction.as_ref(), problem_date.as_deref());

        // handoff
        let (agent_name, provider) = self
            .router
            .select(&rule_id, task.agent_override.as_deref())?;
        self.advance(task, 60, "waiting for agent slot").await?;
        let permit = self
            .agent_slots
            .acquire()
            .await
            .map_err(|_| CoordinatorError::ShutDown)?;
        self.advance(task, 60, format!("running agent {agent_name}"))
            .await?;
        info!(task_id = %task.id, agent = %agent_name, "agent session started");
        let mut result = provider.analyze(ws.root(), &prompt).await;
        drop(permit);

        self.advance(task, 90, "parsing result").await?;
        result.task_id = task.id.clone();
        result.issue_id = issue.id.clone();
        result.rule_type = rule_id;
        if result.agent_type.is_empty() {
            result.agent_type = agent_name;
        }
        self.finish(task, &mut issue, result).await
    }

    /// Fetch every attached log into `dest`. Failures become diagnostics.
    ///
    /// Attachments sharing a file name are stored as `name_2.ext`, `name_3.ext`.
    async fn download(&self, issue: &Issue, dest: &Path) -> (Vec<PathBuf>, Vec<String>) {
        let mut files = Vec::with_capacity(issue.log_files.len());
        let mut diagnostics = Vec::new();
        let mut taken = HashSet::new();
        for file in &issue.log_files {
            let base = Path::new(&file.name)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "log".to_owned());
            let target = LogFileRef {
                name: unique_name(&base, &mut taken),
                ..file.clone()
            };
            match self.tracker.fetch_log(&target, dest).await {
                Ok(path) => files.push(path),
                Err(e) => {
                    warn!(issue_id = %issue.id, file = %file.name, error = %e, "log download failed");
                    diagnostics.push(format!("{}: {e}", file.name));
                }
            }
        }
        (files, diagnostics)
    }

    /// Persist the result and move task and issue to their terminal state.
    async fn finish(
        &self,
        task: &mut Task,
        issue: &mut Issue,
        result: AnalysisResult,
    ) -> Result<(), CoordinatorError> {
        let failed = outcome::is_failure(&result);
        self.store.put_result(&result).await?;

        let formatted = outcome::format_result(issue, &result);
        if let Err(e) = self.tracker.post_result(issue, &result, &formatted).await {
            warn!(task_id = %task.id, error = %e, "failed to post result");
        }

        task.progress = PROGRESS_COMPLETE;
        task.stage = TaskStage::from_progress(PROGRESS_COMPLETE, Some(failed));
        task.updated_at = Utc::now();
        if failed {
            task.message = "failed".to_owned();
            task.error = Some(failure_reason(&result.root_cause));
        } else {
            task.message = "done".to_owned();
        }
        self.cache.publish(ProgressSnapshot::from(&*task));
        self.store.put_task(task).await?;

        issue.status = if failed {
            IssueStatus::Failed
        } else {
            IssueStatus::Done
        };
        self.store.put_issue(issue).await?;

        let outcome_label = if failed { "failed" } else { "done" };
        metrics::counter!(m::TASKS_FINISHED_TOTAL, m::LABEL_OUTCOME => outcome_label).increment(1);
        info!(
            task_id = %task.id,
            issue_id = %issue.id,
            problem_type = %result.problem_type,
            confidence = %result.confidence,
            outcome = outcome_label,
            "analysis finished"
        );
        Ok(())
    }

    /// Fail a run that stopped on an error. Store errors are only logged.
    async fn abort(&self, task: &mut Task, reason: &str) {
        let reason = failure_reason(reason);

        let result = AnalysisResult {
            task_id: task.id.clone(),
            issue_id: task.issue_id.clone(),
            status: ResultStatus::Unavailable,
            problem_type: ANALYSIS_ERROR.to_owned(),
            root_cause: reason.clone(),
            confidence: Confidence::Low,
            needs_engineer: true,
            ..AnalysisResult::default()
        };
        if let Err(e) = self.store.put_result(&result).await {
            warn!(task_id = %task.id, error = %e, "failed to store error result");
        }

        task.progress = PROGRESS_COMPLETE;
        task.stage = TaskStage::Failed;
        task.message = "failed".to_owned();
        task.error = Some(reason);
        task.updated_at = Utc::now();
        self.cache.publish(ProgressSnapshot::from(&*task));
        if let Err(e) = self.store.put_task(task).await {
            error!(task_id = %task.id, error = %e, "failed to record task failure");
        }

        match self.store.get_issue(&task.issue_id).await {
            Ok(Some(mut issue)) => {
                issue.status = IssueStatus::Failed;
                if let Err(e) = self.store.put_issue(&issue).await {
                    warn!(issue_id = %issue.id, error = %e, "failed to record issue failure");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(issue_id = %task.issue_id, error = %e, "failed to load issue"),
        }

        metrics::counter!(m::TASKS_FINISHED_TOTAL, m::LABEL_OUTCOME => "failed").increment(1);
    }
}

// ─── Builder ─────────────────────────────────────────────────────────

/// Builder for [`PipelineCoordinator`].
pub struct PipelineCoordinatorBuilder<T, S, R> {
    config: TriageConfig,
    tracker: Option<Arc<T>>,
    store: Option<Arc<S>>,
    catalog: Option<Arc<RuleCatalog<R>>>,
    router: Option<AgentRouter>,
}

impl<T, S, R> Default for PipelineCoordinatorBuilder<T, S, R> {
    fn default() -> Self {
        Self {
            config: TriageConfig::default(),
            tracker: None,
            store: None,
            catalog: None,
            router: None,
        }
    }
}

impl<T, S, R> PipelineCoordinatorBuilder<T, S, R>
where
    T: IssueTracker,
    S: DurableStore,
    R: RuleStore,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: TriageConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tracker(mut self, tracker: Arc<T>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn catalog(mut self, catalog: Arc<RuleCatalog<R>>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Use a prepared router instead of building one from `[agent]`.
    pub fn router(mut self, router: AgentRouter) -> Self {
        self.router = Some(router);
        self
    }

    pub fn build(self) -> Result<PipelineCoordinator<T, S, R>, CoordinatorError> {
        let tracker = self.tracker.ok_or_else(|| missing("tracker"))?;
        let store = self.store.ok_or_else(|| missing("store"))?;
        let catalog = self.catalog.ok_or_else(|| missing("catalog"))?;

        let max_sessions = self.config.concurrency.max_agent_sessions;
        if max_sessions == 0 {
            return Err(CoordinatorError::Config {
                field: "concurrency.max_agent_sessions".to_owned(),
                reason: "must be > 0".to_owned(),
            });
        }

        let pipeline = PipelineConfig::from_core(&self.config);
        let decoder = ContainerDecoder::new(pipeline.clone())?;
        let extractor = Extractor::from_config(&pipeline)?;
        let router = self
            .router
            .unwrap_or_else(|| AgentRouter::from_config(&self.config.agent));

        Ok(PipelineCoordinator {
            inner: Arc::new(Inner {
                tracker,
                store,
                catalog,
                decoder,
                extractor,
                router,
                agent_slots: Semaphore::new(max_sessions),
                cache: Arc::new(ProgressCache::new()),
                active: ActiveIssues::default(),
                tasks: TaskTracker::new(),
                workspace_dir: PathBuf::from(&self.config.storage.workspace_dir),
                code_repo: self.config.storage.code_repo(),
                progress: self.config.progress.clone(),
                session: Session::new(self.config.storage.session_ttl()),
            }),
        })
    }
}

fn missing(field: &str) -> CoordinatorError {
    CoordinatorError::Config {
        field: field.to_owned(),
        reason: "must be provided".to_owned(),
    }
}
