//! logtriage.toml 통합 설정 테스트
//!
//! - logtriage.toml.example 파싱 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 빈 파일 / 잘못된 형식 에러 테스트

use logtriage_core::config::TriageConfig;
use logtriage_core::error::{ConfigError, TriageError};

const EXAMPLE: &str = include_str!("../../../logtriage.toml.example");

/// 환경변수를 설정한 상태로 `f`를 실행한 뒤 원래 값을 복원합니다.
fn with_env<T>(key: &str, value: &str, f: impl FnOnce() -> T) -> T {
    let original = std::env::var(key).ok();
    // SAFETY: 테스트는 serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var(key, value);
    }

    let result = f();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var(key, val),
            None => std::env::remove_var(key),
        }
    }
    result
}

// =============================================================================
// logtriage.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let config = TriageConfig::parse(EXAMPLE).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "pretty");
    assert_eq!(config.storage.data_dir, "./data");
    assert_eq!(config.storage.workspace_dir, "./data/workspaces");
    assert!(config.storage.code_repo().is_none());
}

#[test]
fn example_config_passes_validation() {
    let config = TriageConfig::parse(EXAMPLE).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_has_both_providers() {
    let config = TriageConfig::parse(EXAMPLE).expect("should parse");

    assert_eq!(config.agent.default, "claude_code");
    assert_eq!(config.agent.providers.len(), 2);
    assert_eq!(config.agent.providers["claude_code"].program, "claude");
    assert_eq!(config.agent.providers["codex"].program, "codex");
    assert!(config.agent.providers["codex"].allowed_tools.is_empty());
    assert!(config.agent.routing.is_empty());
}

#[test]
fn example_config_matches_code_defaults() {
    let from_file = TriageConfig::parse(EXAMPLE).expect("should parse");
    let from_code = TriageConfig::default();

    // 모든 기본값이 코드 Default 구현과 일치하는지 확인
    assert_eq!(from_file.general.log_level, from_code.general.log_level);
    assert_eq!(from_file.general.log_format, from_code.general.log_format);

    assert_eq!(from_file.storage.data_dir, from_code.storage.data_dir);
    assert_eq!(
        from_file.storage.workspace_dir,
        from_code.storage.workspace_dir
    );
    assert_eq!(
        from_file.storage.code_repo_path,
        from_code.storage.code_repo_path
    );
    assert_eq!(
        from_file.storage.session_ttl_secs,
        from_code.storage.session_ttl_secs
    );

    assert_eq!(from_file.rules.dir, from_code.rules.dir);
    assert_eq!(
        from_file.rules.fallback_rule_id,
        from_code.rules.fallback_rule_id
    );

    assert_eq!(
        from_file.decoder.signature_window_bytes,
        from_code.decoder.signature_window_bytes
    );
    assert_eq!(
        from_file.decoder.unzip_timeout_secs,
        from_code.decoder.unzip_timeout_secs
    );
    assert_eq!(
        from_file.decoder.unzip_program,
        from_code.decoder.unzip_program
    );

    assert_eq!(
        from_file.extractor.max_samples,
        from_code.extractor.max_samples
    );
    assert_eq!(
        from_file.extractor.timeout_secs,
        from_code.extractor.timeout_secs
    );

    assert_eq!(from_file.agent.default, from_code.agent.default);
    assert_eq!(from_file.agent.timeout_secs, from_code.agent.timeout_secs);
    assert_eq!(from_file.agent.max_turns, from_code.agent.max_turns);
    for (name, provider) in &from_code.agent.providers {
        let parsed = &from_file.agent.providers[name];
        assert_eq!(parsed.enabled, provider.enabled, "{name}.enabled");
        assert_eq!(parsed.program, provider.program, "{name}.program");
        assert_eq!(parsed.model, provider.model, "{name}.model");
        assert_eq!(
            parsed.timeout_secs, provider.timeout_secs,
            "{name}.timeout_secs"
        );
        assert_eq!(
            parsed.allowed_tools, provider.allowed_tools,
            "{name}.allowed_tools"
        );
    }

    assert_eq!(
        from_file.concurrency.max_agent_sessions,
        from_code.concurrency.max_agent_sessions
    );
    assert_eq!(
        from_file.progress.poll_interval_ms,
        from_code.progress.poll_interval_ms
    );
    assert_eq!(
        from_file.progress.max_idle_polls,
        from_code.progress.max_idle_polls
    );
}

// =============================================================================
// 부분 설정 로딩 테스트
// =============================================================================

#[test]
fn partial_config_general_only() {
    let toml = r#"
[general]
log_level = "debug"
log_format = "json"
"#;
    let config = TriageConfig::parse(toml).expect("should parse");
    config.validate().expect("should validate");

    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.general.log_format, "json");
    // 나머지 섹션은 기본값
    assert_eq!(config.agent.default, "claude_code");
    assert_eq!(config.concurrency.max_agent_sessions, 3);
}

#[test]
fn partial_config_provider_keeps_other_defaults() {
    let toml = r#"
[agent.providers.claude_code]
program = "/opt/bin/claude"
"#;
    let config = TriageConfig::parse(toml).expect("should parse");

    let claude = &config.agent.providers["claude_code"];
    assert_eq!(claude.program, "/opt/bin/claude");
    // 명시하지 않은 필드는 ProviderConfig 기본값
    assert!(claude.enabled);
    assert_eq!(claude.timeout_secs, 0);
    // agent 섹션의 나머지 필드는 기본값
    assert_eq!(config.agent.timeout_secs, 300);
    assert_eq!(config.agent.max_turns, 25);
}

#[test]
fn partial_config_routing_to_known_provider() {
    let toml = r#"
[agent.routing]
bluetooth = "codex"
"#;
    let config = TriageConfig::parse(toml).expect("should parse");
    config.validate().expect("should validate");

    assert_eq!(
        config.agent.routing.get("bluetooth").map(String::as_str),
        Some("codex")
    );
}

#[test]
fn partial_config_routing_to_unknown_provider_fails_validation() {
    let toml = r#"
[agent.routing]
bluetooth = "gemini"
"#;
    let config = TriageConfig::parse(toml).expect("should parse");
    let err = config.validate().expect_err("unknown provider should fail");

    assert!(matches!(
        err,
        TriageError::Config(ConfigError::InvalidValue { ref field, .. })
            if field == "agent.routing.bluetooth"
    ));
}

#[test]
fn partial_config_two_sections() {
    let toml = r#"
[extractor]
max_samples = 5

[progress]
poll_interval_ms = 250
"#;
    let config = TriageConfig::parse(toml).expect("should parse");
    config.validate().expect("should validate");

    assert_eq!(config.extractor.max_samples, 5);
    assert_eq!(config.extractor.timeout_secs, 30);
    assert_eq!(config.progress.poll_interval().as_millis(), 250);
    assert_eq!(config.progress.max_idle_polls, 300);
}

#[test]
fn provider_timeout_falls_back_to_agent_timeout() {
    let toml = r#"
[agent]
timeout_secs = 90

[agent.providers.codex]
program = "codex"
timeout_secs = 15
"#;
    let config = TriageConfig::parse(toml).expect("should parse");

    assert_eq!(config.agent.timeout_for("codex").as_secs(), 15);
    assert_eq!(config.agent.timeout_for("claude_code").as_secs(), 90);
    assert_eq!(config.agent.timeout_for("unknown").as_secs(), 90);
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[general]
log_level = "info"
"#;

    let result = with_env("LOGTRIAGE_GENERAL_LOG_LEVEL", "error", || {
        let mut config = TriageConfig::parse(toml).expect("should parse");
        config.apply_env_overrides();
        config.general.log_level
    });

    assert_eq!(result, "error");
}

#[test]
#[serial_test::serial]
fn env_override_default_agent() {
    let result = with_env("LOGTRIAGE_AGENT_DEFAULT", "codex", || {
        let mut config = TriageConfig::parse("").expect("should parse");
        config.apply_env_overrides();
        config
    });

    assert_eq!(result.agent.default, "codex");
    result.validate().expect("codex is a configured provider");
}

#[test]
#[serial_test::serial]
fn env_override_numeric_field() {
    let result = with_env("LOGTRIAGE_CONCURRENCY_MAX_AGENT_SESSIONS", "8", || {
        let mut config = TriageConfig::parse("").expect("should parse");
        config.apply_env_overrides();
        config.concurrency.max_agent_sessions
    });

    assert_eq!(result, 8);
}

#[test]
#[serial_test::serial]
fn env_override_provider_bool_field() {
    let result = with_env("LOGTRIAGE_AGENT_CODEX_ENABLED", "false", || {
        let mut config = TriageConfig::parse("").expect("should parse");
        config.apply_env_overrides();
        config.agent.providers["codex"].enabled
    });

    assert!(!result);
}

#[test]
#[serial_test::serial]
fn env_override_invalid_number_keeps_value() {
    let toml = r#"
[decoder]
unzip_timeout_secs = 45
"#;

    let result = with_env("LOGTRIAGE_DECODER_UNZIP_TIMEOUT_SECS", "soon", || {
        let mut config = TriageConfig::parse(toml).expect("should parse");
        config.apply_env_overrides();
        config.decoder.unzip_timeout_secs
    });

    assert_eq!(result, 45);
}

#[test]
#[serial_test::serial]
fn env_override_missing_var_keeps_toml_value() {
    let toml = r#"
[general]
log_level = "warn"
"#;

    // SAFETY: 존재하지 않는 변수를 명시적으로 제거
    unsafe {
        std::env::remove_var("LOGTRIAGE_GENERAL_LOG_LEVEL");
    }

    let mut config = TriageConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();

    assert_eq!(config.general.log_level, "warn");
}

// =============================================================================
// 빈 파일 / 잘못된 형식 에러 테스트
// =============================================================================

#[test]
fn empty_string_parses_with_defaults() {
    let config = TriageConfig::parse("").expect("empty string should parse");
    config.validate().expect("should validate");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.rules.fallback_rule_id, "general");
    assert_eq!(config.decoder.signature_window_bytes, 2048);
}

#[test]
fn comments_only_parses_with_defaults() {
    let toml = r#"
# 이것은 주석입니다
# 모든 줄이 주석입니다
"#;
    let config = TriageConfig::parse(toml).expect("comments-only should parse");
    config.validate().expect("should validate");
    assert_eq!(config.general.log_level, "info");
}

#[test]
fn malformed_toml_returns_parse_error() {
    let err = TriageConfig::parse("[invalid toml").expect_err("should fail");
    assert!(matches!(
        err,
        TriageError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn invalid_type_returns_parse_error() {
    let toml = r#"
[concurrency]
max_agent_sessions = "three"
"#;
    let err = TriageConfig::parse(toml).expect_err("should fail");
    assert!(matches!(
        err,
        TriageError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn invalid_log_format_fails_validation() {
    let toml = r#"
[general]
log_format = "xml"
"#;
    let config = TriageConfig::parse(toml).expect("should parse");
    let err = config.validate().expect_err("xml is not a log format");
    assert!(err.to_string().contains("general.log_format"));
}

#[tokio::test]
async fn load_missing_file_returns_not_found() {
    let err = TriageConfig::load("/nonexistent/logtriage.toml")
        .await
        .expect_err("missing file should fail");
    assert!(matches!(
        err,
        TriageError::Config(ConfigError::FileNotFound { .. })
    ));
}
