//! `codex` CLI provider.

use std::path::Path;
use std::time::Duration;

use logtriage_core::AnalysisResult;
use logtriage_core::config::ProviderConfig;

use super::{AgentProvider, execute, process};

/// Runs `codex exec --full-auto` inside the workspace.
///
/// codex refuses to run outside a git repository, so the workspace is
/// initialised as one first.
#[derive(Debug, Clone)]
pub struct CodexProvider {
    name: String,
    program: String,
    model: String,
    timeout: Duration,
}

impl CodexProvider {
    /// Configuration key this provider is registered under by default.
    pub const NAME: &'static str = "codex";

    pub fn new(name: impl Into<String>, config: &ProviderConfig, timeout: Duration) -> Self {
        let program = if config.program.trim().is_empty() {
            "codex".to_owned()
        } else {
            config.program.clone()
        };
        Self {
            name: name.into(),
            program,
            model: config.model.clone(),
            timeout,
        }
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["exec".to_owned(), "--full-auto".to_owned()];
        if !self.model.is_empty() {
            args.push("--model".to_owned());
            args.push(self.model.clone());
        }
        args.push(process::prompt_instruction());
        args
    }

    async fn ensure_git_repo(workspace: &Path) {
        if tokio::fs::try_exists(workspace.join(".git"))
            .await
            .unwrap_or(false)
        {
            return;
        }
        let args = ["init".to_owned(), "-q".to_owned()];
        match process::run("git", &args, workspace, Duration::from_secs(30)).await {
            Ok(out) if out.success() => {}
            Ok(out) => {
                tracing::warn!(exit_code = out.exit_code, stderr = %out.stderr.trim(), "git init failed");
            }
            Err(e) => tracing::warn!(error = %e, "git init failed"),
        }
    }
}

impl AgentProvider for CodexProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, workspace: &Path, prompt: &str) -> AnalysisResult {
        Self::ensure_git_repo(workspace).await;
        execute(
            &self.name,
            &self.program,
            &self.args(),
            workspace,
            prompt,
            self.timeout,
        )
        .await
    }
}
