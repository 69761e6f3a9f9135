//! CLI-specific error types and exit code mapping

use logtriage_core::error::{StorageError, TriageError};
use logtriage_coordinator::CoordinatorError;
use logtriage_log_pipeline::LogPipelineError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The analysis ran but ended FAILED.
    #[error("analysis failed: {0}")]
    Analysis(String),

    /// None of the decode inputs produced a usable log.
    #[error("decode error: {0}")]
    Decode(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from logtriage-core.
    #[error("{0}")]
    Core(#[from] TriageError),

    /// Rule catalog error.
    #[error("rule error: {0}")]
    Rule(String),

    /// Coordinator error outside a run (store, builder, trigger).
    #[error("{0}")]
    Coordinator(#[from] CoordinatorError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                               |
    /// |------|---------------------------------------|
    /// | 0    | Success                               |
    /// | 1    | General / command error               |
    /// | 2    | Configuration error                   |
    /// | 3    | Analysis finished as FAILED           |
    /// | 4    | No usable log decoded                 |
    /// | 10   | IO error                              |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(TriageError::Config(_)) => 2,
            Self::Analysis(_) => 3,
            Self::Decode(_) => 4,
            Self::Io(_) => 10,
            Self::JsonSerialize(_)
            | Self::Command(_)
            | Self::Core(_)
            | Self::Rule(_)
            | Self::Coordinator(_) => 1,
        }
    }
}

impl From<LogPipelineError> for CliError {
    fn from(e: LogPipelineError) -> Self {
        Self::Rule(e.to_string())
    }
}

impl From<StorageError> for CliError {
    fn from(e: StorageError) -> Self {
        Self::Core(TriageError::Storage(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logtriage_core::error::ConfigError;

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("test error".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_core_config_error() {
        let err: CliError = TriageError::Config(ConfigError::InvalidValue {
            field: "agent.default".to_owned(),
            reason: "provider 'x' is not configured".to_owned(),
        })
        .into();
        assert_eq!(
            err.exit_code(),
            2,
            "config errors from core should also return exit code 2"
        );
    }

    #[test]
    fn test_exit_code_analysis_failed() {
        let err = CliError::Analysis("agent timeout".to_owned());
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.to_string(), "analysis failed: agent timeout");
    }

    #[test]
    fn test_exit_code_decode_error() {
        let err = CliError::Decode("no usable log".to_owned());
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = CliError::Io(io_err);
        assert_eq!(err.exit_code(), 10, "io error should return exit code 10");
    }

    #[test]
    fn test_exit_code_general_errors() {
        assert_eq!(CliError::Command("x".to_owned()).exit_code(), 1);
        assert_eq!(CliError::Rule("x".to_owned()).exit_code(), 1);
        assert_eq!(
            CliError::Coordinator(CoordinatorError::ShutDown).exit_code(),
            1
        );
    }

    #[test]
    fn test_from_rule_not_found() {
        let err: CliError = LogPipelineError::RuleNotFound("wifi".to_owned()).into();
        match &err {
            CliError::Rule(msg) => assert!(msg.contains("wifi")),
            _ => panic!("expected Rule variant"),
        }
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_from_storage_error() {
        let err: CliError = StorageError::NotFound {
            kind: "task".to_owned(),
            id: "t-1".to_owned(),
        }
        .into();
        assert!(matches!(err, CliError::Core(TriageError::Storage(_))));
        assert!(err.to_string().contains("task/t-1"));
    }

    #[test]
    fn test_error_display_command() {
        let err = CliError::Command("execution failed".to_owned());
        assert_eq!(format!("{}", err), "execution failed");
    }
}
