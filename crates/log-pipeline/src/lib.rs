//! 로그 번들 디코딩, 분석 규칙, 사전 추출
//!
//! # 모듈 구성
//!
//! - [`decoder`]: 고정 키 스트림 암호, 컨테이너/ZIP/gzip 판별과 폴백 체인
//! - [`rule`]: front matter 마크다운 규칙, 저장소, 분류 카탈로그
//! - [`extract`]: 시간 제한이 있는 패턴 추출과 심각도 집계
//! - [`config`]: 파이프라인 설정 (core 설정에서 파생)
//! - [`error`]: 도메인 에러 타입
//!
//! # 데이터 흐름
//!
//! ```text
//! input files -> ContainerDecoder -> LogCorpus ─┐
//! description -> RuleCatalog::match_rules ──────┴-> Extractor -> ExtractionResult
//! ```

pub mod config;
pub mod decoder;
pub mod error;
pub mod extract;
pub mod rule;

// --- 주요 타입 re-export ---

// 설정
pub use config::{PipelineConfig, PipelineConfigBuilder};

// 에러
pub use error::LogPipelineError;

// 디코더
pub use decoder::{ContainerDecoder, DecodeOutcome, LogCorpus, SignatureDetector};

// 규칙
pub use rule::{
    ExtractionPattern, JsonRuleStore, MemoryRuleStore, Rule, RuleCatalog, RuleLoader, RulePatch,
    RuleStore, RuleTrigger, SeedReport,
};

// 추출
pub use extract::{
    ExtractionResult, Extractor, LogInfo, PatternExtract, SeverityCounts, guess_problem_date,
};
