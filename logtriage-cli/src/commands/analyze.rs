//! `logtriage analyze` command handler
//!
//! Runs one upload-mode analysis in-process: recover stale runs, start the
//! coordinator, stream progress to stderr, then print the stored result.

use std::io::Write;
use std::sync::Arc;

use colored::Colorize;
use serde::Serialize;
use tracing::{info, warn};

use logtriage_core::config::TriageConfig;
use logtriage_core::{AnalysisResult, Issue, TaskStage};
use logtriage_coordinator::{
    LocalIssueTracker, PipelineCoordinator, ProgressSnapshot, WatchEnd, is_failure,
    recover_interrupted,
};

use crate::cli::AnalyzeArgs;
use crate::context;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `analyze` command.
///
/// Returns [`CliError::Analysis`] when the task ends FAILED, after the
/// report has been printed.
pub async fn execute(
    args: AnalyzeArgs,
    config: &TriageConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    for file in &args.files {
        if !file.is_file() {
            return Err(CliError::Command(format!(
                "input file not found: {}",
                file.display()
            )));
        }
    }

    let store = context::open_store(config).await?;
    let recovered = recover_interrupted(&store, config.storage.session_ttl()).await?;
    if !recovered.is_empty() {
        warn!(
            tasks = recovered.tasks.len(),
            issues = recovered.issues.len(),
            live = recovered.live.len(),
            "marked interrupted runs as failed"
        );
    }

    let catalog = context::open_catalog(config).await?;
    let tracker = Arc::new(LocalIssueTracker::new(context::results_dir(config)));

    let coordinator = PipelineCoordinator::builder()
        .config(config.clone())
        .tracker(Arc::clone(&tracker))
        .store(Arc::new(store))
        .catalog(Arc::new(catalog))
        .build()?;

    let issue = Issue {
        id: args
            .issue_id
            .clone()
            .unwrap_or_else(|| format!("local-{}", short_id())),
        description: args.description.clone(),
        device_sn: args.device_sn.clone(),
        firmware: args.firmware.clone(),
        source: "upload".to_owned(),
        ..Issue::default()
    };
    let issue_id = issue.id.clone();

    let task_id = coordinator
        .trigger_upload(issue, args.files.clone(), args.agent.clone())
        .await?;
    info!(task_id = %task_id, issue_id = %issue_id, files = args.files.len(), "analysis started");

    let quiet = args.quiet;
    let end = coordinator
        .watcher()
        .watch(&task_id, |snapshot| {
            if !quiet {
                print_progress(snapshot);
            }
        })
        .await;

    // the run itself always reaches a terminal state; wait for it
    coordinator.shutdown().await;

    let snapshot = match end {
        Ok(WatchEnd::Idle(_)) => {
            warn!(task_id = %task_id, "progress watch went idle before the run finished");
            coordinator.snapshot(&task_id).await?
        }
        Ok(WatchEnd::Terminal(snapshot)) => Some(snapshot),
        Err(e) => {
            warn!(task_id = %task_id, error = %e, "progress watch failed");
            coordinator.snapshot(&task_id).await?
        }
    }
    .ok_or_else(|| CliError::Command(format!("task {task_id} disappeared from the store")))?;

    let result = coordinator.result(&task_id).await?;
    let report = AnalysisReport {
        task_id: task_id.clone(),
        issue_id: issue_id.clone(),
        stage: snapshot.stage,
        error: snapshot.error.clone(),
        result_file: result
            .as_ref()
            .map(|_| tracker.result_path(&issue_id, &task_id).display().to_string()),
        result,
    };
    writer.render(&report)?;

    if report.failed() {
        return Err(CliError::Analysis(
            report
                .error
                .clone()
                .unwrap_or_else(|| "analysis did not complete".to_owned()),
        ));
    }
    Ok(())
}

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_owned()
}

fn print_progress(snapshot: &ProgressSnapshot) {
    eprintln!(
        "[{:>3}%] {:<11} {}",
        snapshot.progress,
        snapshot.stage.as_str(),
        snapshot.message
    );
}

// ─── Report ──────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct AnalysisReport {
    pub task_id: String,
    pub issue_id: String,
    pub stage: TaskStage,
    pub error: Option<String>,
    pub result_file: Option<String>,
    pub result: Option<AnalysisResult>,
}

impl AnalysisReport {
    fn failed(&self) -> bool {
        self.stage == TaskStage::Failed || self.result.as_ref().is_none_or(is_failure)
    }
}

impl Render for AnalysisReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        let stage = if self.failed() {
            self.stage.as_str().red().bold()
        } else {
            self.stage.as_str().green().bold()
        };
        writeln!(w, "Task {} ({}): {}", self.task_id, self.issue_id, stage)?;
        if let Some(error) = &self.error {
            writeln!(w, "  Reason: {error}")?;
        }

        let Some(result) = &self.result else {
            return Ok(());
        };
        writeln!(w)?;
        render_result(w, result)?;
        if let Some(path) = &self.result_file {
            writeln!(w)?;
            writeln!(w, "Result posted to {path}")?;
        }
        Ok(())
    }
}

/// Shared text body for `analyze` and `tasks show`.
pub(crate) fn render_result(w: &mut dyn Write, result: &AnalysisResult) -> std::io::Result<()> {
    writeln!(w, "  Problem:    {}", result.problem_type.bold())?;
    writeln!(w, "  Rule:       {}", or_dash(&result.rule_type))?;
    writeln!(w, "  Agent:      {}", or_dash(&result.agent_type))?;
    writeln!(
        w,
        "  Confidence: {}{}",
        result.confidence,
        if result.confidence_reason.is_empty() {
            String::new()
        } else {
            format!(" ({})", result.confidence_reason)
        }
    )?;
    if result.needs_engineer {
        writeln!(w, "  {}", "Needs engineer".yellow())?;
    }
    writeln!(w)?;
    writeln!(w, "Root cause:")?;
    writeln!(w, "  {}", result.root_cause)?;

    if !result.key_evidence.is_empty() {
        writeln!(w)?;
        writeln!(w, "Key evidence:")?;
        for item in &result.key_evidence {
            writeln!(w, "  - {item}")?;
        }
    }
    if !result.fix_suggestion.is_empty() {
        writeln!(w)?;
        writeln!(w, "Fix suggestion:")?;
        writeln!(w, "  {}", result.fix_suggestion)?;
    }
    if result.requires_more_info && !result.more_info_guidance.is_empty() {
        writeln!(w)?;
        writeln!(w, "More information needed:")?;
        writeln!(w, "  {}", result.more_info_guidance)?;
    }
    if !result.next_steps.is_empty() {
        writeln!(w)?;
        writeln!(w, "Next steps:")?;
        for (i, step) in result.next_steps.iter().enumerate() {
            writeln!(w, "  {}. {step}", i + 1)?;
        }
    }
    if !result.user_reply.is_empty() {
        writeln!(w)?;
        writeln!(w, "Suggested reply:")?;
        for line in result.user_reply.lines() {
            writeln!(w, "  > {line}")?;
        }
    }
    Ok(())
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}
