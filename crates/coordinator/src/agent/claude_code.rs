//! `claude` CLI provider.

use std::path::Path;
use std::time::Duration;

use logtriage_core::AnalysisResult;
use logtriage_core::config::ProviderConfig;

use super::{AgentProvider, execute, process};

/// Runs `claude -p` in print mode inside the workspace.
#[derive(Debug, Clone)]
pub struct ClaudeCodeProvider {
    name: String,
    program: String,
    model: String,
    max_turns: u32,
    allowed_tools: Vec<String>,
    timeout: Duration,
}

impl ClaudeCodeProvider {
    /// Configuration key this provider is registered under by default.
    pub const NAME: &'static str = "claude_code";

    pub fn new(
        name: impl Into<String>,
        config: &ProviderConfig,
        max_turns: u32,
        timeout: Duration,
    ) -> Self {
        let program = if config.program.trim().is_empty() {
            "claude".to_owned()
        } else {
            config.program.clone()
        };
        Self {
            name: name.into(),
            program,
            model: config.model.clone(),
            max_turns,
            allowed_tools: config.allowed_tools.clone(),
            timeout,
        }
    }

    /// Command line arguments after the program name.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-p".to_owned(),
            process::prompt_instruction(),
            "--output-format".to_owned(),
            "text".to_owned(),
        ];
        if !self.model.is_empty() {
            args.push("--model".to_owned());
            args.push(self.model.clone());
        }
        if self.max_turns > 0 {
            args.push("--max-turns".to_owned());
            args.push(self.max_turns.to_string());
        }
        if !self.allowed_tools.is_empty() {
            args.push("--allowedTools".to_owned());
            args.extend(self.allowed_tools.iter().cloned());
        }
        args
    }
}

impl AgentProvider for ClaudeCodeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, workspace: &Path, prompt: &str) -> AnalysisResult {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_include_optional_flags() {
        let config = ProviderConfig {
            model: "sonnet".to_owned(),
            allowed_tools: vec!["Read".to_owned(), "Grep".to_owned()],
            ..ProviderConfig::default()
        };
        let provider = ClaudeCodeProvider::new("claude_code", &config, 25, Duration::from_secs(60));
        let args = provider.args();

        assert_eq!(args[0], "-p");
        assert!(args[1].contains(process::PROMPT_FILE));
        assert!(args.windows(2).any(|w| w == ["--model", "sonnet"]));
        assert!(args.windows(2).any(|w| w == ["--max-turns", "25"]));
        assert_eq!(&args[args.len() - 3..], ["--allowedTools", "Read", "Grep"]);
        assert_eq!(provider.program, "claude");
    }

    #[test]
    fn args_skip_unset_flags() {
        let provider = ClaudeCodeProvider::new(
            "claude_code",
            &ProviderConfig::default(),
            0,
            Duration::from_secs(60),
        );
        let args = provider.args();
        assert_eq!(args.len(), 4);
    }
}
