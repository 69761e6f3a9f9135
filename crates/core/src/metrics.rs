//! 메트릭 상수
//!
//! 모든 메트릭의 이름을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::histogram!()`
//! 매크로를 호출합니다. 레코더가 설치되지 않으면 호출은 아무 일도 하지 않습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logtriage_`
//! - 모듈명: `decoder_`, `extractor_`, `agent_`, `task_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(logtriage_core::metrics::TASKS_STARTED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 에이전트 이름 레이블 키
pub const LABEL_PROVIDER: &str = "provider";

/// 결과 레이블 키 (done, failed)
pub const LABEL_OUTCOME: &str = "outcome";

// ─── Decoder 메트릭 ────────────────────────────────────────────────

/// Decoder: 처리한 입력 파일 수 (counter)
pub const DECODER_FILES_TOTAL: &str = "logtriage_decoder_files_total";

/// Decoder: 사용 가능한 로그를 얻지 못한 입력 수 (counter)
pub const DECODER_FAILURES_TOTAL: &str = "logtriage_decoder_failures_total";

/// Decoder: 병합 폴백으로 생성된 로그 수 (counter)
pub const DECODER_MERGED_TOTAL: &str = "logtriage_decoder_merged_total";

// ─── Extractor 메트릭 ──────────────────────────────────────────────

/// Extractor: 시간 초과된 패턴 검색 수 (counter)
pub const EXTRACTOR_TIMEOUTS_TOTAL: &str = "logtriage_extractor_timeouts_total";

// ─── Agent 메트릭 ──────────────────────────────────────────────────

/// Agent: 실행 횟수 (counter, label: provider)
pub const AGENT_INVOCATIONS_TOTAL: &str = "logtriage_agent_invocations_total";

/// Agent: 시간 초과 횟수 (counter, label: provider)
pub const AGENT_TIMEOUTS_TOTAL: &str = "logtriage_agent_timeouts_total";

/// Agent: 실행 시간 (histogram, 초, label: provider)
pub const AGENT_DURATION_SECONDS: &str = "logtriage_agent_duration_seconds";

// ─── Task 메트릭 ───────────────────────────────────────────────────

/// Task: 시작된 태스크 수 (counter)
pub const TASKS_STARTED_TOTAL: &str = "logtriage_tasks_started_total";

/// Task: 종료된 태스크 수 (counter, label: outcome)
pub const TASKS_FINISHED_TOTAL: &str = "logtriage_tasks_finished_total";

/// Task: 재시작 복구로 실패 처리된 태스크 수 (counter)
pub const TASKS_RECOVERED_TOTAL: &str = "logtriage_tasks_recovered_total";
