//! logtriage 공통 크레이트
//!
//! 에러 계층, 설정, 도메인 타입, 외부 트래커 경계 trait, 메트릭 이름을 제공합니다.

pub mod config;
pub mod error;
pub mod metrics;
pub mod tracker;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, PipelineError, StorageError, TrackerError, TriageError};

// 설정
pub use config::TriageConfig;

// 트래커 trait
pub use tracker::{BoxFuture, IssueTracker};

// 도메인 타입
pub use types::{
    AnalysisResult, Confidence, Issue, IssueStatus, LogFileRef, ResultStatus, Task, TaskStage,
};
