//! Coordinator error types.
//!
//! [`CoordinatorError`] covers everything that can stop a run before the
//! agent handoff produces a result. Inside a run these errors never escape:
//! the coordinator turns them into a FAILED task with a bounded reason.
//! `From<CoordinatorError> for TriageError` lets callers outside the crate
//! propagate them with `?`.

use logtriage_core::error::{
    ConfigError, PipelineError, StorageError, TrackerError, TriageError,
};
use logtriage_log_pipeline::LogPipelineError;

/// Coordinator domain error.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// Agent selection or invocation failed.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Durable store failure.
    #[error(transparent)]
    Store(#[from] StorageError),

    /// Issue tracker failure.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// Decoder, rule or extraction failure.
    #[error(transparent)]
    Pipeline(#[from] LogPipelineError),

    /// Workspace preparation failed.
    #[error("workspace error: {path}: {reason}")]
    Workspace {
        /// Workspace path involved.
        path: String,
        /// Failure reason.
        reason: String,
    },

    /// A run for this issue is already in flight.
    #[error("issue {issue_id} already has an active analysis")]
    ActiveIssue {
        /// Issue that is already being analysed.
        issue_id: String,
    },

    /// Invalid builder or runtime configuration.
    #[error("config error: {field}: {reason}")]
    Config {
        /// Offending field.
        field: String,
        /// Reason.
        reason: String,
    },

    /// The coordinator has been shut down.
    #[error("coordinator is shut down")]
    ShutDown,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Agent selection and process errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Neither the requested nor the default provider is usable.
    #[error("no enabled agent provider: tried '{tried}', available: [{available}]")]
    NoProvider {
        /// Provider name that was tried last.
        tried: String,
        /// Comma-separated list of registered providers.
        available: String,
    },

    /// A provider name has no implementation.
    #[error("unknown agent provider: {0}")]
    UnknownProvider(String),

    /// The agent process could not be started.
    #[error("failed to spawn {program}: {reason}")]
    Spawn {
        /// Executable name.
        program: String,
        /// Spawn failure reason.
        reason: String,
    },

    /// The agent process did not exit in time.
    #[error("{program} timed out after {secs}s")]
    Timeout {
        /// Executable name.
        program: String,
        /// Timeout that elapsed.
        secs: u64,
    },
}

impl From<CoordinatorError> for TriageError {
    fn from(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::Store(e) => TriageError::Storage(e),
            CoordinatorError::Tracker(e) => TriageError::Tracker(e),
            CoordinatorError::Pipeline(e) => e.into(),
            CoordinatorError::Io(e) => TriageError::Io(e),
            CoordinatorError::ActiveIssue { issue_id } => {
                TriageError::Pipeline(PipelineError::AlreadyActive { issue_id })
            }
            CoordinatorError::Config { field, reason } => {
                TriageError::Config(ConfigError::InvalidValue { field, reason })
            }
            other => TriageError::Pipeline(PipelineError::Handoff(other.to_string())),
        }
    }
}
