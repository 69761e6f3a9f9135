//! Analysis task orchestration for logtriage.
//!
//! # Modules
//!
//! - [`coordinator`]: [`PipelineCoordinator`] and its builder
//! - [`agent`]: agent providers, routing, prompt and result parsing
//! - [`store`]: durable task/issue/result records
//! - [`progress`]: progress cache, reconciliation and the polling watcher
//! - [`workspace`]: per-task directory layout
//! - [`outcome`]: terminal-outcome predicate and result formatting
//! - [`recovery`]: restart sweep for interrupted runs
//! - [`lease`]: coordinator session leases shared through the store
//! - [`tracker`]: local issue tracker for upload mode
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(JsonFileStore::open(&config.storage.data_dir).await?);
//! recover_interrupted(store.as_ref(), config.storage.session_ttl()).await?;
//!
//! let coordinator = PipelineCoordinator::builder()
//!     .config(config)
//!     .tracker(tracker)
//!     .store(store)
//!     .catalog(catalog)
//!     .build()?;
//!
//! let task_id = coordinator.trigger("ISSUE-42", None).await?;
//! ```

pub mod agent;
pub mod coordinator;
pub mod error;
pub mod lease;
pub mod outcome;
pub mod progress;
pub mod recovery;
pub mod store;
pub mod tracker;
pub mod workspace;

pub use agent::{
    AgentProvider, AgentRouter, ClaudeCodeProvider, CodexProvider, DynAgentProvider,
    build_prompt, parse_result,
};
pub use coordinator::{PipelineCoordinator, PipelineCoordinatorBuilder};
pub use error::{AgentError, CoordinatorError};
pub use lease::SessionLease;
pub use outcome::{format_result, is_failure};
pub use progress::{ProgressCache, ProgressSnapshot, ProgressWatcher, WatchEnd, reconcile};
pub use recovery::{RecoveryReport, recover_interrupted};
pub use store::{
    DurableStore, IssueStore, JsonFileStore, LeaseStore, MemoryStore, ResultStore, TaskStore,
};
pub use tracker::LocalIssueTracker;
pub use workspace::Workspace;
