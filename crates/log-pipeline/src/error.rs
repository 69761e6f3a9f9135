//! 로그 파이프라인 에러 타입
//!
//! [`LogPipelineError`]는 디코딩, 규칙 관리, 사전 추출에서 발생하는 에러를 표현합니다.
//! `From<LogPipelineError> for TriageError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.
//!
//! 디코딩 실패 자체는 에러가 아니라 [`DecodeOutcome`](crate::decoder::DecodeOutcome)의
//! 사유 문자열로 보고됩니다. 이 타입은 I/O 계층과 규칙 CRUD 경계에서만 사용됩니다.

use logtriage_core::error::{PipelineError, TriageError};

/// 로그 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum LogPipelineError {
    /// 컨테이너 디코딩 중 내부 단계 실패
    #[error("decode error: {path}: {reason}")]
    Decode {
        /// 입력 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 규칙 파일 로딩 실패
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 규칙 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 규칙 유효성 검증 실패
    #[error("rule validation error: rule '{rule_id}': {reason}")]
    RuleValidation {
        /// 문제가 된 규칙 ID
        rule_id: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 규칙이 존재하지 않음
    #[error("rule not found: {0}")]
    RuleNotFound(String),

    /// 같은 ID의 규칙이 이미 존재함
    #[error("rule already exists: {0}")]
    RuleExists(String),

    /// 규칙 저장소 에러
    #[error("rule store error: {0}")]
    Store(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// YAML 파싱 에러
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<LogPipelineError> for TriageError {
    fn from(err: LogPipelineError) -> Self {
        match err {
            LogPipelineError::Decode { .. } => {
                TriageError::Pipeline(PipelineError::Decode(err.to_string()))
            }
            LogPipelineError::Io(e) => TriageError::Io(e),
            other => TriageError::Pipeline(PipelineError::Rule(other.to_string())),
        }
    }
}
