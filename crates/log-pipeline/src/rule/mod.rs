//! 분석 규칙 -- 문서 로딩, 저장소, 분류 카탈로그
//!
//! # 모듈 구성
//! - [`types`]: 규칙 데이터 구조와 유효성 검증
//! - [`loader`]: front matter 마크다운 문서 로더
//! - [`store`]: 영속 계층 trait과 메모리/JSON 구현
//! - [`catalog`]: 키워드 분류와 한 단계 의존성 확장, CRUD

pub mod catalog;
pub mod loader;
pub mod store;
pub mod types;

pub use catalog::{RuleCatalog, SeedReport};
pub use loader::RuleLoader;
pub use store::{JsonRuleStore, MemoryRuleStore, RuleStore};
pub use types::{ExtractionPattern, Rule, RulePatch, RuleTrigger};
