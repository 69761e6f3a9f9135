//! Shared setup for command handlers: configuration, durable store, rule catalog.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use logtriage_core::config::TriageConfig;
use logtriage_core::error::{ConfigError, TriageError};
use logtriage_coordinator::JsonFileStore;
use logtriage_log_pipeline::{JsonRuleStore, RuleCatalog};

use crate::error::CliError;

/// Load the effective configuration.
///
/// A missing file is not an error: defaults plus env overrides apply. The
/// `--log-level` flag wins over both.
pub async fn load_config(path: &Path, log_level: Option<&str>) -> Result<TriageConfig, CliError> {
    let mut config = match TriageConfig::load(path).await {
        Ok(config) => config,
        Err(TriageError::Config(ConfigError::FileNotFound { .. })) => {
            let mut config = TriageConfig::default();
            config.apply_env_overrides();
            config
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(level) = log_level {
        config.general.log_level = level.to_owned();
    }
    config.validate()?;
    Ok(config)
}

/// Directory holding the JSON rule store.
pub fn rule_store_dir(config: &TriageConfig) -> PathBuf {
    Path::new(&config.storage.data_dir).join("rules")
}

/// Directory formatted results are posted to.
pub fn results_dir(config: &TriageConfig) -> PathBuf {
    Path::new(&config.storage.data_dir).join("results")
}

/// Open the task/issue/result store under `storage.data_dir`.
pub async fn open_store(config: &TriageConfig) -> Result<JsonFileStore, CliError> {
    Ok(JsonFileStore::open(&config.storage.data_dir).await?)
}

/// Open the rule catalog, seeding it from `rules.dir` when that exists.
///
/// Seeding never overwrites rules already in the store.
pub async fn open_catalog(config: &TriageConfig) -> Result<RuleCatalog<JsonRuleStore>, CliError> {
    let store = JsonRuleStore::open(rule_store_dir(config)).await?;
    let catalog = RuleCatalog::new(store, config.rules.fallback_rule_id.clone());

    let seed_dir = Path::new(&config.rules.dir);
    if seed_dir.is_dir() {
        let report = catalog.seed_from_dir(seed_dir).await?;
        info!(
            dir = %seed_dir.display(),
            loaded = report.loaded,
            inserted = report.inserted,
            "rule catalog ready"
        );
    } else {
        warn!(dir = %seed_dir.display(), "rules directory not found, using stored rules only");
        catalog.reload().await?;
    }

    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config(&dir.path().join("absent.toml"), None)
            .await
            .expect("defaults should apply");
        assert_eq!(config.rules.fallback_rule_id, "general");
        assert_eq!(config.agent.default, "claude_code");
    }

    #[tokio::test]
    async fn test_log_level_flag_overrides_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logtriage.toml");
        std::fs::write(&path, "[general]\nlog_level = \"warn\"\n").expect("write config");

        let config = load_config(&path, Some("debug")).await.expect("load");
        assert_eq!(config.general.log_level, "debug");
    }

    #[tokio::test]
    async fn test_invalid_log_level_flag_is_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_config(&dir.path().join("absent.toml"), Some("loud"))
            .await
            .expect_err("bad level should fail");
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_malformed_config_is_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[general\nlog_level = 1").expect("write config");

        let err = load_config(&path, None).await.expect_err("should fail");
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_open_catalog_seeds_from_rules_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rules_dir = dir.path().join("rules");
        std::fs::create_dir_all(&rules_dir).expect("mkdir");
        std::fs::write(
            rules_dir.join("general.md"),
            "---\nid: general\nname: General\n---\nLook at everything.\n",
        )
        .expect("write rule");

        let mut config = TriageConfig::default();
        config.storage.data_dir = dir.path().join("data").display().to_string();
        config.rules.dir = rules_dir.display().to_string();

        let catalog = open_catalog(&config).await.expect("catalog");
        assert!(catalog.get("general").await.is_some());
        assert!(rule_store_dir(&config).is_dir());
    }
}
