//! `logtriage tasks` and `logtriage recover` command handlers

use std::io::Write;

use colored::Colorize;
use serde::Serialize;
use tracing::info;

use logtriage_core::config::TriageConfig;
use logtriage_core::error::StorageError;
use logtriage_core::{AnalysisResult, Task, TaskStage};
use logtriage_coordinator::{
    IssueStore, ProgressSnapshot, RecoveryReport, ResultStore, TaskStore, recover_interrupted,
};

use crate::cli::{TasksAction, TasksArgs};
use crate::commands::analyze::render_result;
use crate::context;
use crate::error::CliError;
use crate::output::{OutputWriter, Render, ellipsize};

/// Execute the `tasks` command.
pub async fn execute(
    args: TasksArgs,
    config: &TriageConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        TasksAction::List { stage } => execute_list(config, stage, writer).await,
        TasksAction::Show { id } => execute_show(config, &id, writer).await,
    }
}

/// Execute the `recover` command.
pub async fn execute_recover(config: &TriageConfig, writer: &OutputWriter) -> Result<(), CliError> {
    let store = context::open_store(config).await?;
    let report = recover_interrupted(&store, config.storage.session_ttl()).await?;
    info!(
        tasks = report.tasks.len(),
        issues = report.issues.len(),
        live = report.live.len(),
        "recovery sweep complete"
    );
    writer.render(&RecoverReport(report))
}

async fn execute_list(
    config: &TriageConfig,
    stage: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let stage = stage.as_deref().map(parse_stage).transpose()?;
    let store = context::open_store(config).await?;

    let tasks: Vec<TaskEntry> = store
        .list_tasks()
        .await?
        .iter()
        .filter(|t| stage.is_none_or(|s| t.stage == s))
        .map(TaskEntry::from)
        .collect();

    writer.render(&TaskListReport {
        total: tasks.len(),
        tasks,
    })
}

async fn execute_show(config: &TriageConfig, id: &str, writer: &OutputWriter) -> Result<(), CliError> {
    let store = context::open_store(config).await?;
    let task = store.get_task(id).await?.ok_or_else(|| StorageError::NotFound {
        kind: "task".to_owned(),
        id: id.to_owned(),
    })?;

    // no live cache outside the coordinator process; the store is authoritative
    let snapshot = ProgressSnapshot::from(&task);
    let description = store
        .get_issue(&task.issue_id)
        .await?
        .map(|issue| issue.description)
        .unwrap_or_default();
    let result = store.get_result(id).await?;

    writer.render(&TaskDetail {
        snapshot,
        description,
        agent_override: task.agent_override,
        created_at: task.created_at.to_rfc3339(),
        result,
    })
}

fn parse_stage(value: &str) -> Result<TaskStage, CliError> {
    const STAGES: [TaskStage; 7] = [
        TaskStage::Queued,
        TaskStage::Downloading,
        TaskStage::Decrypting,
        TaskStage::Extracting,
        TaskStage::Analyzing,
        TaskStage::Done,
        TaskStage::Failed,
    ];
    let wanted = value.trim().to_ascii_lowercase();
    STAGES
        .into_iter()
        .find(|s| s.as_str() == wanted)
        .ok_or_else(|| {
            let names: Vec<_> = STAGES.iter().map(|s| s.as_str()).collect();
            CliError::Command(format!(
                "unknown stage: {value} (expected: {})",
                names.join(", ")
            ))
        })
}

fn colored_stage(stage: TaskStage) -> colored::ColoredString {
    match stage {
        TaskStage::Done => stage.as_str().green(),
        TaskStage::Failed => stage.as_str().red(),
        TaskStage::Queued => stage.as_str().normal(),
        _ => stage.as_str().cyan(),
    }
}

// ─── Reports ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct TaskListReport {
    pub total: usize,
    pub tasks: Vec<TaskEntry>,
}

#[derive(Serialize)]
pub struct TaskEntry {
    pub id: String,
    pub issue_id: String,
    pub stage: TaskStage,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    pub updated_at: String,
}

impl From<&Task> for TaskEntry {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            issue_id: task.issue_id.clone(),
            stage: task.stage,
            progress: task.progress,
            message: task.message.clone(),
            error: task.error.clone(),
            updated_at: task.updated_at.to_rfc3339(),
        }
    }
}

impl Render for TaskListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Tasks ({} total)", self.total.to_string().bold())?;
        writeln!(w)?;
        writeln!(
            w,
            "{:<36} {:<16} {:<11} {:>4}  Message",
            "ID", "Issue", "Stage", "%"
        )?;
        writeln!(w, "{}", "-".repeat(100))?;

        for t in &self.tasks {
            let message = t.error.as_deref().unwrap_or(&t.message);
            writeln!(
                w,
                "{:<36} {:<16} {:<11} {:>4}  {}",
                t.id,
                ellipsize(&t.issue_id, 16),
                colored_stage(t.stage),
                t.progress,
                ellipsize(message, 60)
            )?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub snapshot: ProgressSnapshot,
    pub description: String,
    pub agent_override: Option<String>,
    pub created_at: String,
    pub result: Option<AnalysisResult>,
}

impl Render for TaskDetail {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        let s = &self.snapshot;
        writeln!(w, "Task {}", s.task_id.bold())?;
        writeln!(w, "  Issue:    {}", s.issue_id)?;
        if !self.description.is_empty() {
            writeln!(w, "  Problem:  {}", ellipsize(&self.description, 100))?;
        }
        writeln!(w, "  Stage:    {} ({}%)", colored_stage(s.stage), s.progress)?;
        writeln!(w, "  Message:  {}", s.message)?;
        if let Some(error) = &s.error {
            writeln!(w, "  Error:    {}", error.red())?;
        }
        if let Some(agent) = &self.agent_override {
            writeln!(w, "  Agent:    {agent} (override)")?;
        }
        writeln!(w, "  Created:  {}", self.created_at)?;
        writeln!(w, "  Updated:  {}", s.updated_at.to_rfc3339())?;

        if let Some(result) = &self.result {
            writeln!(w)?;
            render_result(w, result)?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(transparent)]
pub struct RecoverReport(pub RecoveryReport);

impl Render for RecoverReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        let report = &self.0;
        if !report.live.is_empty() {
            writeln!(
                w,
                "Left {} task(s) running under live sessions",
                report.live.len()
            )?;
        }
        if report.is_empty() {
            return writeln!(w, "No interrupted runs found.");
        }
        writeln!(
            w,
            "Recovered {} task(s) and {} issue(s)",
            report.tasks.len().to_string().bold(),
            report.issues.len()
        )?;
        for id in &report.tasks {
            writeln!(w, "  task  {id}")?;
        }
        for id in &report.issues {
            writeln!(w, "  issue {id}")?;
        }
        Ok(())
    }
}
