//! 로그 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 디코더/추출기/규칙 섹션을 묶어
//! 디코더와 추출기가 직접 사용하는 형태로 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use logtriage_core::config::TriageConfig;
//! use logtriage_log_pipeline::config::PipelineConfig;
//!
//! let core_config = TriageConfig::default();
//! let config = PipelineConfig::from_core(&core_config);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LogPipelineError;

/// 로그 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 디바이스 로그 시그니처를 검사할 선두 바이트 수
    pub signature_window_bytes: usize,
    /// 외부 unzip 폴백 타임아웃 (초)
    pub unzip_timeout_secs: u64,
    /// 외부 unzip 실행 파일
    pub unzip_program: String,
    /// 패턴당 샘플 최대 개수
    pub max_samples: usize,
    /// 패턴 검색 시간 제한 (초)
    pub extract_timeout_secs: u64,
    /// 분류 실패 시 규칙 ID
    pub fallback_rule_id: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            signature_window_bytes: 2048,
            unzip_timeout_secs: 60,
            unzip_program: "unzip".to_owned(),
            max_samples: 20,
            extract_timeout_secs: 30,
            fallback_rule_id: "general".to_owned(),
        }
    }
}

impl PipelineConfig {
    /// core 설정에서 파이프라인 설정을 생성합니다.
    pub fn from_core(core: &logtriage_core::config::TriageConfig) -> Self {
        Self {
            signature_window_bytes: core.decoder.signature_window_bytes,
            unzip_timeout_secs: core.decoder.unzip_timeout_secs,
            unzip_program: core.decoder.unzip_program.clone(),
            max_samples: core.extractor.max_samples,
            extract_timeout_secs: core.extractor.timeout_secs,
            fallback_rule_id: core.rules.fallback_rule_id.clone(),
        }
    }

    /// 외부 unzip 타임아웃
    pub fn unzip_timeout(&self) -> Duration {
        Duration::from_secs(self.unzip_timeout_secs)
    }

    /// 패턴 검색 시간 제한
    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogPipelineError> {
        if self.signature_window_bytes == 0 {
            return Err(LogPipelineError::Config {
                field: "signature_window_bytes".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.unzip_program.trim().is_empty() {
            return Err(LogPipelineError::Config {
                field: "unzip_program".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        if self.max_samples == 0 {
            return Err(LogPipelineError::Config {
                field: "max_samples".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.extract_timeout_secs == 0 {
            return Err(LogPipelineError::Config {
                field: "extract_timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        Ok(())
    }
}

/// [`PipelineConfig`] 빌더
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// 기본값으로 시작하는 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 시그니처 검사 범위를 설정합니다.
    pub fn signature_window_bytes(mut self, bytes: usize) -> Self {
        self.config.signature_window_bytes = bytes;
        self
    }

    /// 외부 unzip 실행 파일을 설정합니다.
    pub fn unzip_program(mut self, program: impl Into<String>) -> Self {
        self.config.unzip_program = program.into();
        self
    }

    /// 외부 unzip 타임아웃을 설정합니다.
    pub fn unzip_timeout_secs(mut self, secs: u64) -> Self {
        self.config.unzip_timeout_secs = secs;
        self
    }

    /// 샘플 상한을 설정합니다.
    pub fn max_samples(mut self, max: usize) -> Self {
        self.config.max_samples = max;
        self
    }

    /// 패턴 검색 시간 제한을 설정합니다.
    pub fn extract_timeout_secs(mut self, secs: u64) -> Self {
        self.config.extract_timeout_secs = secs;
        self
    }

    /// 폴백 규칙 ID를 설정합니다.
    pub fn fallback_rule_id(mut self, id: impl Into<String>) -> Self {
        self.config.fallback_rule_id = id.into();
        self
    }

    /// 설정을 검증하고 생성합니다.
    pub fn build(self) -> Result<PipelineConfig, LogPipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
