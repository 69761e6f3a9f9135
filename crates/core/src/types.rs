//! 도메인 타입: 시스템 전역에서 사용되는 공통 타입
//!
//! 이슈, 태스크, 분석 결과처럼 여러 크레이트가 주고받는 레코드를 정의합니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 다운로드 단계의 상한 진행률
pub const DOWNLOADING_MAX: u8 = 20;
/// 복호화 단계의 상한 진행률
pub const DECRYPTING_MAX: u8 = 35;
/// 추출 단계의 상한 진행률
pub const EXTRACTING_MAX: u8 = 55;
/// 완료 진행률
pub const PROGRESS_COMPLETE: u8 = 100;

/// 이슈에 첨부된 로그 파일 참조
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFileRef {
    /// 파일 이름
    pub name: String,
    /// 트래커가 이해하는 위치 (다운로드 토큰 또는 로컬 경로)
    pub locator: String,
    /// 바이트 크기 (모르면 0)
    #[serde(default)]
    pub size: u64,
}

/// 이슈 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    /// 아직 분석되지 않음
    #[default]
    Pending,
    /// 분석 진행 중
    Analyzing,
    /// 분석 완료
    Done,
    /// 분석 실패
    Failed,
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Analyzing => "analyzing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// 정규화된 이슈 레코드
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Issue {
    /// 이슈 ID
    pub id: String,
    /// 사용자가 작성한 문제 설명
    #[serde(default)]
    pub description: String,
    /// 디바이스 시리얼 번호
    #[serde(default)]
    pub device_sn: String,
    /// 펌웨어 버전
    #[serde(default)]
    pub firmware: String,
    /// 앱 버전
    #[serde(default)]
    pub app_version: String,
    /// 우선순위 표기
    #[serde(default)]
    pub priority: String,
    /// 외부 티켓 참조
    #[serde(default)]
    pub external_ref: String,
    /// 이슈 출처 (tracker, upload)
    #[serde(default)]
    pub source: String,
    /// 첨부 로그
    #[serde(default)]
    pub log_files: Vec<LogFileRef>,
    /// 분석 상태
    #[serde(default)]
    pub status: IssueStatus,
}

/// 태스크 단계
///
/// 중간 네 단계는 별도로 저장하지 않고 진행률에서 유도됩니다.
/// [`TaskStage::from_progress`]를 참고하세요.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStage {
    /// 대기 중
    #[default]
    Queued,
    /// 이슈/로그 수집 중
    Downloading,
    /// 복호화 중
    Decrypting,
    /// 규칙 매칭 및 사전 추출 중
    Extracting,
    /// 에이전트 분석 중
    Analyzing,
    /// 완료
    Done,
    /// 실패
    Failed,
}

impl TaskStage {
    /// 진행률과 종료 여부로부터 단계를 계산합니다.
    ///
    /// `terminal`이 `Some(failed)`이면 진행률과 무관하게 종료 단계를 반환합니다.
    /// 진행률 0은 `Queued`, 100 이상은 종료 플래그 없이도 `Analyzing`으로 취급합니다.
    pub fn from_progress(progress: u8, terminal: Option<bool>) -> Self {
        match terminal {
            Some(true) => return Self::Failed,
            Some(false) => return Self::Done,
            None => {}
        }
        match progress {
            0 => Self::Queued,
            p if p <= DOWNLOADING_MAX => Self::Downloading,
            p if p <= DECRYPTING_MAX => Self::Decrypting,
            p if p <= EXTRACTING_MAX => Self::Extracting,
            _ => Self::Analyzing,
        }
    }

    /// 종료 단계 여부
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// 재시작 시 복구 대상이 되는 미종료 단계 여부
    pub fn is_in_flight(self) -> bool {
        !self.is_terminal()
    }

    /// 문자열 표현
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Decrypting => "decrypting",
            Self::Extracting => "extracting",
            Self::Analyzing => "analyzing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 분석 태스크
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// 태스크 ID
    pub id: String,
    /// 대상 이슈 ID
    pub issue_id: String,
    /// 현재 단계
    pub stage: TaskStage,
    /// 진행률 (0-100)
    pub progress: u8,
    /// 사람이 읽는 진행 메시지
    #[serde(default)]
    pub message: String,
    /// 실패 사유
    #[serde(default)]
    pub error: Option<String>,
    /// 명시적으로 지정된 에이전트
    #[serde(default)]
    pub agent_override: Option<String>,
    /// 태스크를 실행 중인 코디네이터 세션 ID (없으면 소유자 미상)
    #[serde(default)]
    pub owner: Option<String>,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
    /// 마지막 갱신 시각
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// 새 대기 태스크를 생성합니다.
    pub fn new(issue_id: impl Into<String>, agent_override: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            issue_id: issue_id.into(),
            stage: TaskStage::Queued,
            progress: 0,
            message: "queued".to_owned(),
            error: None,
            agent_override,
            owner: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 에이전트 판단의 확신도
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    #[default]
    Low,
}

impl Confidence {
    /// 느슨한 문자열 파싱 (알 수 없는 값은 `Low`)
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        f.write_str(s)
    }
}

/// 분석 결과의 명시적 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// 에이전트가 결과를 작성함
    #[default]
    Completed,
    /// 에이전트 시간 초과
    Timeout,
    /// 에이전트를 실행할 수 없음
    Unavailable,
    /// 에이전트 출력 해석 실패
    Unparseable,
    /// 사용 가능한 로그가 없음
    NoLogs,
}

impl ResultStatus {
    /// 느슨한 문자열 파싱
    pub fn parse_lenient(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "completed" | "complete" | "done" | "ok" => Some(Self::Completed),
            "timeout" | "timed_out" => Some(Self::Timeout),
            "unavailable" => Some(Self::Unavailable),
            "unparseable" | "parse_failed" => Some(Self::Unparseable),
            "no_logs" => Some(Self::NoLogs),
            _ => None,
        }
    }
}

/// 에이전트 분석 결과
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// 태스크 ID
    pub task_id: String,
    /// 이슈 ID
    pub issue_id: String,
    /// 명시적 결과 상태
    #[serde(default)]
    pub status: ResultStatus,
    /// 문제 분류
    #[serde(default)]
    pub problem_type: String,
    /// 근본 원인
    #[serde(default)]
    pub root_cause: String,
    /// 확신도
    #[serde(default)]
    pub confidence: Confidence,
    /// 확신도 근거
    #[serde(default)]
    pub confidence_reason: String,
    /// 핵심 근거 (최대 5개)
    #[serde(default)]
    pub key_evidence: Vec<String>,
    /// 사용자 응답 초안
    #[serde(default)]
    pub user_reply: String,
    /// 엔지니어 에스컬레이션 필요 여부
    #[serde(default)]
    pub needs_engineer: bool,
    /// 수정 제안
    #[serde(default)]
    pub fix_suggestion: String,
    /// 추가 정보 요청 여부
    #[serde(default)]
    pub requires_more_info: bool,
    /// 추가 정보 안내
    #[serde(default)]
    pub more_info_guidance: String,
    /// 다음 조치
    #[serde(default)]
    pub next_steps: Vec<String>,
    /// 분류된 규칙 ID
    #[serde(default)]
    pub rule_type: String,
    /// 사용한 에이전트
    #[serde(default)]
    pub agent_type: String,
    /// 에이전트 원본 출력 (잘림)
    #[serde(default)]
    pub raw_output: String,
    /// 생성 시각
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_thresholds_follow_progress() {
        assert_eq!(TaskStage::from_progress(0, None), TaskStage::Queued);
        assert_eq!(TaskStage::from_progress(5, None), TaskStage::Downloading);
        assert_eq!(TaskStage::from_progress(20, None), TaskStage::Downloading);
        assert_eq!(TaskStage::from_progress(21, None), TaskStage::Decrypting);
        assert_eq!(TaskStage::from_progress(35, None), TaskStage::Decrypting);
        assert_eq!(TaskStage::from_progress(40, None), TaskStage::Extracting);
        assert_eq!(TaskStage::from_progress(55, None), TaskStage::Extracting);
        assert_eq!(TaskStage::from_progress(60, None), TaskStage::Analyzing);
        assert_eq!(TaskStage::from_progress(99, None), TaskStage::Analyzing);
        assert_eq!(TaskStage::from_progress(100, Some(false)), TaskStage::Done);
        assert_eq!(TaskStage::from_progress(100, Some(true)), TaskStage::Failed);
    }

    #[test]
    fn only_done_and_failed_are_terminal() {
        assert!(TaskStage::Done.is_terminal());
        assert!(TaskStage::Failed.is_terminal());
        for stage in [
            TaskStage::Queued,
            TaskStage::Downloading,
            TaskStage::Decrypting,
            TaskStage::Extracting,
            TaskStage::Analyzing,
        ] {
            assert!(stage.is_in_flight(), "{stage} should be in flight");
        }
    }

    #[test]
    fn stage_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStage::Extracting).unwrap();
        assert_eq!(json, "\"extracting\"");
    }

    #[test]
    fn confidence_parse_is_lenient() {
        assert_eq!(Confidence::parse_lenient(" HIGH "), Confidence::High);
        assert_eq!(Confidence::parse_lenient("medium"), Confidence::Medium);
        assert_eq!(Confidence::parse_lenient("sure"), Confidence::Low);
    }

    #[test]
    fn new_task_is_queued() {
        let task = Task::new("issue-1", None);
        assert_eq!(task.stage, TaskStage::Queued);
        assert_eq!(task.progress, 0);
        assert!(task.error.is_none());
        assert!(!task.id.is_empty());
    }
}
