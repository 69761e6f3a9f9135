//! `logtriage config` command handler

use std::io::Write;
use std::path::Path;

use colored::Colorize;
use serde::Serialize;
use tracing::info;

use logtriage_core::config::TriageConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const SECTIONS: [&str; 8] = [
    "general",
    "storage",
    "rules",
    "decoder",
    "extractor",
    "agent",
    "concurrency",
    "progress",
];

/// Execute the `config` command.
///
/// `show` receives the effective configuration already loaded by `main`;
/// `validate` re-reads the file itself so a missing file is reported.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    effective: &TriageConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, effective, section, writer),
    }
}

/// Load and validate the configuration file, reporting any errors.
///
/// # Errors
///
/// Returns `CliError::Config` when the file is missing, malformed or invalid.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let report = match TriageConfig::load(config_path).await {
        Ok(_) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: true,
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: false,
            errors: vec![e.to_string()],
        },
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

/// Render the effective configuration, whole or one section.
///
/// # Errors
///
/// Returns `CliError::Command` for an unknown section name.
fn execute_show(
    config_path: &Path,
    config: &TriageConfig,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let source = if config_path.is_file() {
        config_path.display().to_string()
    } else {
        format!("{} (not found, defaults)", config_path.display())
    };

    let config_toml = match section.as_deref() {
        None => to_toml(config),
        Some("general") => to_toml(&config.general),
        Some("storage") => to_toml(&config.storage),
        Some("rules") => to_toml(&config.rules),
        Some("decoder") => to_toml(&config.decoder),
        Some("extractor") => to_toml(&config.extractor),
        Some("agent") => to_toml(&config.agent),
        Some("concurrency") => to_toml(&config.concurrency),
        Some("progress") => to_toml(&config.progress),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {other} (expected: {})",
                SECTIONS.join(", ")
            )));
        }
    };

    writer.render(&ConfigReport {
        source,
        section,
        config_toml,
    })
}

fn to_toml<T: Serialize>(value: &T) -> String {
    toml::to_string_pretty(value).unwrap_or_else(|e| format!("(serialization error: {e})"))
}

/// Configuration display report.
#[derive(Serialize)]
pub struct ConfigReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        match &self.section {
            Some(section) => writeln!(
                w,
                "Configuration {} (source: {})",
                format!("[{section}]").bold(),
                self.source
            )?,
            None => writeln!(w, "Configuration (source: {})", self.source.bold())?,
        }
        writeln!(w)?;
        write!(w, "{}", self.config_toml)
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    /// Empty when valid.
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::OutputFormat;

    #[test]
    fn test_every_section_serializes() {
        let config = TriageConfig::default();
        let writer = OutputWriter::new(OutputFormat::Json);
        for section in SECTIONS {
            execute_show(
                Path::new("absent.toml"),
                &config,
                Some(section.to_owned()),
                &writer,
            )
            .unwrap_or_else(|e| panic!("section {section} should render: {e}"));
        }
    }

    #[test]
    fn test_unknown_section_is_rejected() {
        let writer = OutputWriter::new(OutputFormat::Text);
        let err = execute_show(
            Path::new("absent.toml"),
            &TriageConfig::default(),
            Some("ebpf".to_owned()),
            &writer,
        )
        .expect_err("unknown section should fail");
        assert!(err.to_string().contains("unknown section: ebpf"));
    }

    #[test]
    fn test_agent_section_contains_providers() {
        let toml = to_toml(&TriageConfig::default().agent);
        assert!(toml.contains("claude_code"), "{toml}");
        assert!(toml.contains("codex"), "{toml}");
    }

    #[tokio::test]
    async fn test_validate_missing_file_is_config_error() {
        let writer = OutputWriter::new(OutputFormat::Json);
        let err = execute_validate(Path::new("/nonexistent/logtriage.toml"), &writer)
            .await
            .expect_err("missing file should fail validation");
        assert_eq!(err.exit_code(), 2);
    }
}
