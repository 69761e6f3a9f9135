//! `logtriage rules` command handler

use std::io::Write;
use std::path::Path;

use colored::Colorize;
use serde::Serialize;
use tracing::info;

use logtriage_core::config::TriageConfig;
use logtriage_log_pipeline::decoder::archive::{find_files, has_suffix};
use logtriage_log_pipeline::{LogPipelineError, Rule, RuleLoader, guess_problem_date};

use crate::cli::{RulesAction, RulesArgs};
use crate::context;
use crate::error::CliError;
use crate::output::{OutputWriter, Render, ellipsize};

/// Execute the `rules` command.
pub async fn execute(
    args: RulesArgs,
    config: &TriageConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        RulesAction::List { status } => execute_list(config, status, writer).await,
        RulesAction::Show { id } => execute_show(config, &id, writer).await,
        RulesAction::Classify { text } => execute_classify(config, &text, writer).await,
        RulesAction::Validate { path } => {
            let path = path.unwrap_or_else(|| config.rules.dir.clone().into());
            execute_validate(&path, writer).await
        }
    }
}

async fn execute_list(
    config: &TriageConfig,
    status_filter: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let wanted = match status_filter.as_deref() {
        None => None,
        Some("enabled") => Some(true),
        Some("disabled") => Some(false),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown status: {other} (expected: enabled, disabled)"
            )));
        }
    };

    let catalog = context::open_catalog(config).await?;
    let rules: Vec<RuleEntry> = catalog
        .list()
        .await
        .iter()
        .filter(|r| wanted.is_none_or(|enabled| r.enabled == enabled))
        .map(RuleEntry::from)
        .collect();

    writer.render(&RuleListReport {
        total: rules.len(),
        fallback: catalog.fallback_rule_id().to_owned(),
        rules,
    })
}

async fn execute_show(config: &TriageConfig, id: &str, writer: &OutputWriter) -> Result<(), CliError> {
    let catalog = context::open_catalog(config).await?;
    let rule = catalog
        .get(id)
        .await
        .ok_or_else(|| LogPipelineError::RuleNotFound(id.to_owned()))?;
    writer.render(&RuleDetail(rule))
}

async fn execute_classify(
    config: &TriageConfig,
    text: &str,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let catalog = context::open_catalog(config).await?;
    let rule_id = catalog.classify(text).await;
    let matched = catalog.expand(&rule_id).await;

    info!(rule_id = %rule_id, matched = matched.len(), "classified description");

    writer.render(&ClassifyReport {
        rule_id,
        matched: matched.iter().map(|r| r.id.clone()).collect(),
        problem_date: guess_problem_date(text),
    })
}

async fn execute_validate(path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %path.display(), "validating rule documents");

    if !path.is_dir() {
        return Err(CliError::Rule(format!(
            "rules directory not found: {}",
            path.display()
        )));
    }

    let files = {
        let root = path.to_path_buf();
        tokio::task::spawn_blocking(move || find_files(&root, |p| has_suffix(p, ".md")))
            .await
            .map_err(|e| CliError::Command(format!("rule scan failed: {e}")))?
    };

    let mut seen = std::collections::BTreeMap::<String, String>::new();
    let mut errors = Vec::new();
    for file in &files {
        let display = file.display().to_string();
        match RuleLoader::load_file(file).await {
            Ok(rule) => {
                if let Some(first) = seen.get(&rule.id) {
                    errors.push(RuleError {
                        file: display,
                        error: format!("duplicate rule id '{}' (first defined in {first})", rule.id),
                    });
                } else {
                    seen.insert(rule.id, display);
                }
            }
            Err(e) => errors.push(RuleError {
                file: display,
                error: e.to_string(),
            }),
        }
    }

    let report = RuleValidationReport {
        path: path.display().to_string(),
        total_files: files.len(),
        valid: files.len() - errors.len(),
        invalid: errors.len(),
        errors,
    };
    writer.render(&report)?;

    if report.invalid > 0 {
        return Err(CliError::Rule(format!("{} invalid rule file(s)", report.invalid)));
    }
    Ok(())
}

// ─── Reports ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct RuleListReport {
    pub total: usize,
    pub fallback: String,
    pub rules: Vec<RuleEntry>,
}

#[derive(Serialize)]
pub struct RuleEntry {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub priority: i32,
    pub keywords: Vec<String>,
    pub depends_on: Vec<String>,
    pub patterns: usize,
}

impl From<&Rule> for RuleEntry {
    fn from(rule: &Rule) -> Self {
        Self {
            id: rule.id.clone(),
            name: rule.display_name().to_owned(),
            enabled: rule.enabled,
            priority: rule.triggers.priority,
            keywords: rule.triggers.keywords.clone(),
            depends_on: rule.depends_on.clone(),
            patterns: rule.extraction_patterns.len(),
        }
    }
}

impl Render for RuleListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            w,
            "Analysis Rules ({} total, fallback: {})",
            self.total.to_string().bold(),
            self.fallback
        )?;
        writeln!(w)?;
        writeln!(
            w,
            "{:<20} {:<28} {:<9} {:>4} {:>8}  Keywords",
            "ID", "Name", "Status", "Prio", "Patterns"
        )?;
        writeln!(w, "{}", "-".repeat(90))?;

        for r in &self.rules {
            let status = if r.enabled {
                "enabled".green()
            } else {
                "disabled".yellow()
            };
            writeln!(
                w,
                "{:<20} {:<28} {:<9} {:>4} {:>8}  {}",
                r.id,
                ellipsize(&r.name, 28),
                status,
                r.priority,
                r.patterns,
                r.keywords.join(", ")
            )?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(transparent)]
pub struct RuleDetail(pub Rule);

impl Render for RuleDetail {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        let rule = &self.0;
        writeln!(w, "{} ({})", rule.display_name().bold(), rule.id)?;
        writeln!(w, "  Version:    {}", rule.version)?;
        writeln!(w, "  Enabled:    {}", rule.enabled)?;
        writeln!(
            w,
            "  Triggers:   [{}] priority {}",
            rule.triggers.keywords.join(", "),
            rule.triggers.priority
        )?;
        if !rule.depends_on.is_empty() {
            writeln!(w, "  Depends on: {}", rule.depends_on.join(", "))?;
        }
        writeln!(w, "  Needs code: {}", rule.needs_code)?;
        for p in &rule.extraction_patterns {
            let filter = if p.date_filter { " (date filtered)" } else { "" };
            writeln!(w, "  Pattern:    {} = {}{}", p.name, p.pattern, filter)?;
        }
        writeln!(w)?;
        writeln!(w, "{}", rule.content)
    }
}

#[derive(Serialize)]
pub struct ClassifyReport {
    pub rule_id: String,
    pub matched: Vec<String>,
    pub problem_date: Option<String>,
}

impl Render for ClassifyReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Rule:         {}", self.rule_id.bold())?;
        writeln!(w, "Matched set:  {}", self.matched.join(" -> "))?;
        writeln!(
            w,
            "Problem date: {}",
            self.problem_date.as_deref().unwrap_or("-")
        )
    }
}

#[derive(Serialize)]
pub struct RuleValidationReport {
    pub path: String,
    pub total_files: usize,
    pub valid: usize,
    pub invalid: usize,
    pub errors: Vec<RuleError>,
}

#[derive(Serialize)]
pub struct RuleError {
    pub file: String,
    pub error: String,
}

impl Render for RuleValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Rule Validation: {}", self.path.bold())?;
        writeln!(
            w,
            "  Files: {} total, {} valid, {} invalid",
            self.total_files,
            self.valid.to_string().green(),
            if self.invalid > 0 {
                self.invalid.to_string().red()
            } else {
                self.invalid.to_string().normal()
            }
        )?;

        if !self.errors.is_empty() {
            writeln!(w)?;
            writeln!(w, "Errors:")?;
            for e in &self.errors {
                writeln!(w, "  {}: {}", e.file.red(), e.error)?;
            }
        }
        Ok(())
    }
}
