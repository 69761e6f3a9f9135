//! 에러 타입: 도메인별 에러 정의

/// logtriage 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 외부 이슈 트래커 에러
    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    /// 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 디코딩 단계 실패
    #[error("decode failed: {0}")]
    Decode(String),

    /// 규칙 처리 실패
    #[error("rule error: {0}")]
    Rule(String),

    /// 에이전트 핸드오프 실패
    #[error("agent handoff failed: {0}")]
    Handoff(String),

    /// 이미 분석 중인 이슈
    #[error("issue already in flight: {issue_id}")]
    AlreadyActive { issue_id: String },
}

/// 외부 이슈 트래커 에러
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// 이슈를 찾을 수 없음
    #[error("issue not found: {issue_id}")]
    IssueNotFound { issue_id: String },

    /// 로그 파일 다운로드 실패
    #[error("failed to fetch log '{name}': {reason}")]
    FetchFailed { name: String, reason: String },

    /// 결과 게시 실패
    #[error("failed to post result for '{issue_id}': {reason}")]
    PostFailed { issue_id: String, reason: String },
}

/// 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 레코드를 찾을 수 없음
    #[error("record not found: {kind}/{id}")]
    NotFound { kind: String, id: String },

    /// 직렬화 실패
    #[error("serialization failed for {kind}/{id}: {reason}")]
    Serialization {
        kind: String,
        id: String,
        reason: String,
    },

    /// 읽기 실패
    #[error("read failed at {path}: {reason}")]
    Read { path: String, reason: String },

    /// 쓰기 실패
    #[error("write failed at {path}: {reason}")]
    Write { path: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_into_triage_error() {
        let err: TriageError = ConfigError::InvalidValue {
            field: "agent.default".to_owned(),
            reason: "unknown provider".to_owned(),
        }
        .into();
        assert!(matches!(err, TriageError::Config(_)));
        assert!(err.to_string().contains("agent.default"));
    }

    #[test]
    fn storage_error_display_names_record() {
        let err = StorageError::NotFound {
            kind: "task".to_owned(),
            id: "t-1".to_owned(),
        };
        assert_eq!(err.to_string(), "record not found: task/t-1");
    }
}
