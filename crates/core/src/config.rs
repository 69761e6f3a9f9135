//! 설정 관리: logtriage.toml 파싱 및 런타임 설정
//!
//! [`TriageConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOGTRIAGE_AGENT_DEFAULT=codex` 형식)
//! 3. 설정 파일 (`logtriage.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logtriage_core::error::TriageError> {
//! use logtriage_core::config::TriageConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = TriageConfig::load("logtriage.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = TriageConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, TriageError};

/// logtriage 통합 설정
///
/// `logtriage.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriageConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 저장소 및 워크스페이스 경로
    #[serde(default)]
    pub storage: StorageConfig,
    /// 규칙 카탈로그 설정
    #[serde(default)]
    pub rules: RulesConfig,
    /// 컨테이너 디코더 설정
    #[serde(default)]
    pub decoder: DecoderConfig,
    /// 사전 추출 설정
    #[serde(default)]
    pub extractor: ExtractorConfig,
    /// 외부 에이전트 설정
    #[serde(default)]
    pub agent: AgentConfig,
    /// 동시성 제한
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    /// 진행률 폴링 설정
    #[serde(default)]
    pub progress: ProgressConfig,
}

impl TriageConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TriageError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, TriageError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TriageError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                TriageError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, TriageError> {
        toml::from_str(toml_str).map_err(|e| {
            TriageError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGTRIAGE_{SECTION}_{FIELD}`
    /// 예: `LOGTRIAGE_CONCURRENCY_MAX_AGENT_SESSIONS=5`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGTRIAGE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGTRIAGE_GENERAL_LOG_FORMAT");

        // Storage
        override_string(&mut self.storage.data_dir, "LOGTRIAGE_STORAGE_DATA_DIR");
        override_string(
            &mut self.storage.workspace_dir,
            "LOGTRIAGE_STORAGE_WORKSPACE_DIR",
        );
        override_string(
            &mut self.storage.code_repo_path,
            "LOGTRIAGE_STORAGE_CODE_REPO_PATH",
        );
        override_u64(
            &mut self.storage.session_ttl_secs,
            "LOGTRIAGE_STORAGE_SESSION_TTL_SECS",
        );

        // Rules
        override_string(&mut self.rules.dir, "LOGTRIAGE_RULES_DIR");
        override_string(
            &mut self.rules.fallback_rule_id,
            "LOGTRIAGE_RULES_FALLBACK_RULE_ID",
        );

        // Decoder
        override_usize(
            &mut self.decoder.signature_window_bytes,
            "LOGTRIAGE_DECODER_SIGNATURE_WINDOW_BYTES",
        );
        override_u64(
            &mut self.decoder.unzip_timeout_secs,
            "LOGTRIAGE_DECODER_UNZIP_TIMEOUT_SECS",
        );
        override_string(
            &mut self.decoder.unzip_program,
            "LOGTRIAGE_DECODER_UNZIP_PROGRAM",
        );

        // Extractor
        override_usize(
            &mut self.extractor.max_samples,
            "LOGTRIAGE_EXTRACTOR_MAX_SAMPLES",
        );
        override_u64(
            &mut self.extractor.timeout_secs,
            "LOGTRIAGE_EXTRACTOR_TIMEOUT_SECS",
        );

        // Agent
        override_string(&mut self.agent.default, "LOGTRIAGE_AGENT_DEFAULT");
        override_u64(&mut self.agent.timeout_secs, "LOGTRIAGE_AGENT_TIMEOUT_SECS");
        override_u32(&mut self.agent.max_turns, "LOGTRIAGE_AGENT_MAX_TURNS");
        for (name, provider) in &mut self.agent.providers {
            let prefix = format!("LOGTRIAGE_AGENT_{}", name.to_uppercase());
            override_bool(&mut provider.enabled, &format!("{prefix}_ENABLED"));
            override_string(&mut provider.model, &format!("{prefix}_MODEL"));
        }

        // Concurrency
        override_usize(
            &mut self.concurrency.max_agent_sessions,
            "LOGTRIAGE_CONCURRENCY_MAX_AGENT_SESSIONS",
        );

        // Progress
        override_u64(
            &mut self.progress.poll_interval_ms,
            "LOGTRIAGE_PROGRESS_POLL_INTERVAL_MS",
        );
        override_u32(
            &mut self.progress.max_idle_polls,
            "LOGTRIAGE_PROGRESS_MAX_IDLE_POLLS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), TriageError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.storage.workspace_dir.is_empty() {
            return Err(invalid("storage.workspace_dir", "must not be empty"));
        }

        if self.storage.session_ttl_secs == 0 {
            return Err(invalid("storage.session_ttl_secs", "must be > 0"));
        }

        if self.rules.fallback_rule_id.trim().is_empty() {
            return Err(invalid("rules.fallback_rule_id", "must not be empty"));
        }

        if self.decoder.signature_window_bytes == 0 {
            return Err(invalid("decoder.signature_window_bytes", "must be > 0"));
        }

        if self.extractor.max_samples == 0 {
            return Err(invalid("extractor.max_samples", "must be > 0"));
        }

        if self.extractor.timeout_secs == 0 {
            return Err(invalid("extractor.timeout_secs", "must be > 0"));
        }

        if self.agent.timeout_secs == 0 {
            return Err(invalid("agent.timeout_secs", "must be > 0"));
        }

        // 기본 에이전트는 providers에 정의되어 있어야 함
        if !self.agent.providers.contains_key(&self.agent.default) {
            return Err(invalid(
                "agent.default",
                format!("provider '{}' is not configured", self.agent.default),
            ));
        }

        for (rule_id, provider) in &self.agent.routing {
            if !self.agent.providers.contains_key(provider) {
                return Err(invalid(
                    format!("agent.routing.{rule_id}"),
                    format!("provider '{provider}' is not configured"),
                ));
            }
        }

        if self.concurrency.max_agent_sessions == 0 {
            return Err(invalid("concurrency.max_agent_sessions", "must be > 0"));
        }

        if self.progress.poll_interval_ms == 0 {
            return Err(invalid("progress.poll_interval_ms", "must be > 0"));
        }

        Ok(())
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> TriageError {
    ConfigError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 태스크/이슈/결과 레코드 디렉토리
    pub data_dir: String,
    /// 태스크별 워크스페이스 루트
    pub workspace_dir: String,
    /// 에이전트에 노출할 소스 트리 경로 (빈 문자열이면 사용 안 함)
    pub code_repo_path: String,
    /// 코디네이터 세션 임대(lease) 유효 시간 (초). 하트비트가 이 시간 동안 없으면 만료
    pub session_ttl_secs: u64,
}

impl StorageConfig {
    /// 세션 임대 유효 시간
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// 설정된 코드 저장소 경로
    pub fn code_repo(&self) -> Option<PathBuf> {
        if self.code_repo_path.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.code_repo_path))
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_owned(),
            workspace_dir: "./data/workspaces".to_owned(),
            code_repo_path: String::new(),
            session_ttl_secs: 30,
        }
    }
}

/// 규칙 카탈로그 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// 시드 규칙 파일(.md) 디렉토리
    pub dir: String,
    /// 매칭되는 규칙이 없을 때 사용하는 규칙 ID
    pub fallback_rule_id: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            dir: "./rules".to_owned(),
            fallback_rule_id: "general".to_owned(),
        }
    }
}

/// 컨테이너 디코더 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// 디바이스 로그 시그니처를 검사할 선두 바이트 수
    pub signature_window_bytes: usize,
    /// 외부 unzip 폴백 타임아웃 (초)
    pub unzip_timeout_secs: u64,
    /// 외부 unzip 실행 파일
    pub unzip_program: String,
}

impl DecoderConfig {
    /// 외부 unzip 타임아웃
    pub fn unzip_timeout(&self) -> Duration {
        Duration::from_secs(self.unzip_timeout_secs)
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            signature_window_bytes: 2048,
            unzip_timeout_secs: 60,
            unzip_program: "unzip".to_owned(),
        }
    }
}

/// 사전 추출 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// 패턴당 샘플 최대 개수
    pub max_samples: usize,
    /// 패턴 검색 시간 제한 (초)
    pub timeout_secs: u64,
}

impl ExtractorConfig {
    /// 패턴 검색 시간 제한
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_samples: 20,
            timeout_secs: 30,
        }
    }
}

/// 외부 에이전트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// 기본 에이전트 이름
    pub default: String,
    /// 에이전트 실행 타임아웃 (초)
    pub timeout_secs: u64,
    /// 에이전트 최대 턴 수
    pub max_turns: u32,
    /// 에이전트별 설정
    pub providers: BTreeMap<String, ProviderConfig>,
    /// 규칙 ID → 에이전트 이름
    pub routing: BTreeMap<String, String>,
}

impl AgentConfig {
    /// 에이전트별 타임아웃 (0이면 공통 타임아웃 사용)
    pub fn timeout_for(&self, provider: &str) -> Duration {
        let secs = self
            .providers
            .get(provider)
            .map(|p| p.timeout_secs)
            .filter(|secs| *secs > 0)
            .unwrap_or(self.timeout_secs);
        Duration::from_secs(secs)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(
            "claude_code".to_owned(),
            ProviderConfig {
                program: "claude".to_owned(),
                allowed_tools: vec![
                    "Read".to_owned(),
                    "Grep".to_owned(),
                    "Glob".to_owned(),
                    "Bash".to_owned(),
                    "Write".to_owned(),
                ],
                ..ProviderConfig::default()
            },
        );
        providers.insert(
            "codex".to_owned(),
            ProviderConfig {
                program: "codex".to_owned(),
                ..ProviderConfig::default()
            },
        );
        Self {
            default: "claude_code".to_owned(),
            timeout_secs: 300,
            max_turns: 25,
            providers,
            routing: BTreeMap::new(),
        }
    }
}

/// 에이전트 한 종류의 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 실행 파일 이름 또는 경로
    pub program: String,
    /// 모델 이름 (빈 문자열이면 CLI 기본값)
    pub model: String,
    /// 타임아웃 (초, 0이면 agent.timeout_secs)
    pub timeout_secs: u64,
    /// 허용할 도구 목록
    pub allowed_tools: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: String::new(),
            model: String::new(),
            timeout_secs: 0,
            allowed_tools: Vec::new(),
        }
    }
}

/// 동시성 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// 동시에 실행 가능한 에이전트 세션 수
    pub max_agent_sessions: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_agent_sessions: 3,
        }
    }
}

/// 진행률 폴링 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// 폴링 간격 (밀리초)
    pub poll_interval_ms: u64,
    /// 변화 없는 폴링을 허용하는 최대 횟수
    pub max_idle_polls: u32,
}

impl ProgressConfig {
    /// 폴링 간격
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_idle_polls: 300,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
