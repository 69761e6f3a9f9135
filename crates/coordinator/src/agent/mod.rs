//! Agent handoff.
//!
//! An agent is an external process that reads `prompt.md` in a prepared
//! workspace and writes `output/result.json`. Two CLIs are supported
//! ([`ClaudeCodeProvider`], [`CodexProvider`]); [`AgentRouter`] picks one per
//! run from the override, the per-rule routing table and the default.
//!
//! Providers never fail: timeouts and spawn failures come back as sentinel
//! results so the terminal-outcome predicate handles every case alike.

pub mod claude_code;
pub mod codex;
pub mod process;
pub mod prompt;
pub mod result;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use logtriage_core::config::{AgentConfig, ProviderConfig};
use logtriage_core::metrics as m;
use logtriage_core::{AnalysisResult, BoxFuture};

use crate::error::AgentError;
use crate::outcome::truncate_chars;

pub use claude_code::ClaudeCodeProvider;
pub use codex::CodexProvider;
pub use prompt::build_prompt;
pub use result::{RESULT_FILE, extract_json_from_text, parse_result};

/// Agent provider.
///
/// # Example
/// ```ignore
/// struct EchoAgent;
///
/// impl AgentProvider for EchoAgent {
///     fn name(&self) -> &str { "echo" }
///
///     async fn analyze(&self, workspace: &Path, prompt: &str) -> AnalysisResult {
///         AnalysisResult::default()
///     }
/// }
/// ```
pub trait AgentProvider: Send + Sync + 'static {
    /// Name used in routing tables and reports.
    fn name(&self) -> &str;

    /// Analyse the prepared workspace.
    fn analyze(
        &self,
        workspace: &Path,
        prompt: &str,
    ) -> impl Future<Output = AnalysisResult> + Send;
}

/// Object-safe twin of [`AgentProvider`].
///
/// The router stores providers as `Arc<dyn DynAgentProvider>`; every
/// `AgentProvider` gets this for free through the blanket impl.
pub trait DynAgentProvider: Send + Sync {
    fn name(&self) -> &str;

    fn analyze<'a>(&'a self, workspace: &'a Path, prompt: &'a str)
    -> BoxFuture<'a, AnalysisResult>;
}

impl<T: AgentProvider> DynAgentProvider for T {
    fn name(&self) -> &str {
        AgentProvider::name(self)
    }

    fn analyze<'a>(
        &'a self,
        workspace: &'a Path,
        prompt: &'a str,
    ) -> BoxFuture<'a, AnalysisResult> {
        Box::pin(AgentProvider::analyze(self, workspace, prompt))
    }
}

/// Write the prompt, run the agent process and parse what it left behind.
pub(crate) async fn execute(
    provider: &str,
    program: &str,
    args: &[String],
    workspace: &Path,
    prompt: &str,
    timeout: Duration,
) -> AnalysisResult {
    metrics::counter!(m::AGENT_INVOCATIONS_TOTAL, m::LABEL_PROVIDER => provider.to_owned())
        .increment(1);

    if let Err(e) = process::write_prompt(workspace, prompt).await {
        tracing::error!(provider, error = %e, "failed to write prompt");
        let mut result = result::unavailable_result(provider, &format!("cannot write prompt: {e}"));
        result.agent_type = provider.to_owned();
        return result;
    }

    tracing::info!(
        provider,
        program,
        workspace = %workspace.display(),
        prompt_chars = prompt.chars().count(),
        timeout_secs = timeout.as_secs(),
        "running agent"
    );

    let mut analysis = match process::run(program, args, workspace, timeout).await {
        Ok(out) => {
            metrics::histogram!(m::AGENT_DURATION_SECONDS, m::LABEL_PROVIDER => provider.to_owned())
                .record(out.duration.as_secs_f64());
            if !out.success() {
                tracing::warn!(
                    provider,
                    exit_code = out.exit_code,
                    stderr = %truncate_chars(out.stderr.trim(), 500),
                    "agent exited with non-zero status"
                );
            }
            parse_result(workspace, &out.stdout).await
        }
        Err(AgentError::Timeout { secs, .. }) => {
            metrics::counter!(m::AGENT_TIMEOUTS_TOTAL, m::LABEL_PROVIDER => provider.to_owned())
                .increment(1);
            tracing::error!(provider, timeout_secs = secs, "agent timed out");
            result::timeout_result(provider, secs)
        }
        Err(e) => {
            tracing::error!(provider, error = %e, "agent unavailable");
            result::unavailable_result(provider, &e.to_string())
        }
    };
    analysis.agent_type = provider.to_owned();
    analysis
}

// ─── AgentRouter ─────────────────────────────────────────────────────

struct RegisteredProvider {
    provider: Arc<dyn DynAgentProvider>,
    enabled: bool,
}

/// Provider selection: override, then `routing[rule_id]`, then the default.
///
/// A requested provider that is missing or disabled falls back to the
/// default; if the default is unusable too, selection fails.
pub struct AgentRouter {
    providers: BTreeMap<String, RegisteredProvider>,
    routing: BTreeMap<String, String>,
    default: String,
}

impl AgentRouter {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            providers: BTreeMap::new(),
            routing: BTreeMap::new(),
            default: default.into(),
        }
    }

    /// Build the router and every configured provider.
    ///
    /// Provider entries whose name or program is not a supported CLI are
    /// skipped with a warning.
    pub fn from_config(config: &AgentConfig) -> Self {
        let mut router = Self::new(config.default.clone());
        for (name, provider_config) in &config.providers {
            match provider_for(name, provider_config, config) {
                Ok(provider) => router.register(name.clone(), provider, provider_config.enabled),
                Err(e) => tracing::warn!(provider = %name, error = %e, "skipping agent provider"),
            }
        }
        for (rule_id, provider) in &config.routing {
            router.route(rule_id.clone(), provider.clone());
        }
        router
    }

    /// Register (or replace) a provider.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn DynAgentProvider>,
        enabled: bool,
    ) {
        self.providers
            .insert(name.into(), RegisteredProvider { provider, enabled });
    }

    /// Route a rule id to a provider name.
    pub fn route(&mut self, rule_id: impl Into<String>, provider: impl Into<String>) {
        self.routing.insert(rule_id.into(), provider.into());
    }

    pub fn default_provider(&self) -> &str {
        &self.default
    }

    /// Names of enabled providers.
    pub fn available(&self) -> Vec<String> {
        self.providers
            .iter()
            .filter(|(_, p)| p.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn usable(&self, name: &str) -> Option<Arc<dyn DynAgentProvider>> {
        self.providers
            .get(name)
            .filter(|p| p.enabled)
            .map(|p| Arc::clone(&p.provider))
    }

    /// Pick the provider for a run.
    pub fn select(
        &self,
        rule_id: &str,
        override_name: Option<&str>,
    ) -> Result<(String, Arc<dyn DynAgentProvider>), AgentError> {
        let requested = override_name
            .filter(|name| !name.trim().is_empty())
            .or_else(|| self.routing.get(rule_id).map(String::as_str))
            .unwrap_or(&self.default);

        if let Some(provider) = self.usable(requested) {
            return Ok((requested.to_owned(), provider));
        }

        tracing::warn!(
            requested,
            fallback = %self.default,
            "agent provider missing or disabled, falling back to default"
        );
        match self.usable(&self.default) {
            Some(provider) => Ok((self.default.clone(), provider)),
            None => Err(AgentError::NoProvider {
                tried: self.default.clone(),
                available: self.available().join(", "),
            }),
        }
    }
}

impl std::fmt::Debug for AgentRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRouter")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("routing", &self.routing)
            .field("default", &self.default)
            .finish()
    }
}

/// Build the provider implementation for a configured name.
pub fn provider_for(
    name: &str,
    provider_config: &ProviderConfig,
    agent_config: &AgentConfig,
) -> Result<Arc<dyn DynAgentProvider>, AgentError> {
    let timeout = agent_config.timeout_for(name);
    let program = Path::new(&provider_config.program)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if name == CodexProvider::NAME || program.starts_with("codex") {
        Ok(Arc::new(CodexProvider::new(name, provider_config, timeout)))
    } else if name == ClaudeCodeProvider::NAME || program.starts_with("claude") {
        Ok(Arc::new(ClaudeCodeProvider::new(
            name,
            provider_config,
            agent_config.max_turns,
            timeout,
        )))
    } else {
        Err(AgentError::UnknownProvider(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockAgentProvider {
        name: String,
        calls: AtomicUsize,
    }

    impl MockAgentProvider {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_owned(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl AgentProvider for MockAgentProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn analyze(&self, _workspace: &Path, _prompt: &str) -> AnalysisResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            AnalysisResult {
                problem_type: "mock".to_owned(),
                agent_type: self.name.clone(),
                ..AnalysisResult::default()
            }
        }
    }

    fn router() -> AgentRouter {
        let mut router = AgentRouter::new("claude_code");
        router.register("claude_code", MockAgentProvider::new("claude_code"), true);
        router.register("codex", MockAgentProvider::new("codex"), true);
        router.route("bluetooth", "codex");
        router
    }

    #[test]
    fn routing_table_then_default() {
        let router = router();
        assert_eq!(router.select("bluetooth", None).unwrap().0, "codex");
        assert_eq!(router.select("general", None).unwrap().0, "claude_code");
    }

    #[test]
    fn override_wins_over_routing() {
        let router = router();
        let (name, _) = router.select("bluetooth", Some("claude_code")).unwrap();
        assert_eq!(name, "claude_code");
    }

    #[test]
    fn unknown_or_disabled_falls_back_to_default() {
        let mut router = router();
        assert_eq!(router.select("x", Some("gemini")).unwrap().0, "claude_code");

        router.register("codex", MockAgentProvider::new("codex"), false);
        assert_eq!(router.select("bluetooth", None).unwrap().0, "claude_code");
        assert_eq!(router.available(), vec!["claude_code"]);
    }

    #[test]
    fn unusable_default_is_an_error() {
        let mut router = AgentRouter::new("claude_code");
        router.register("claude_code", MockAgentProvider::new("claude_code"), false);
        let err = router.select("general", None).err().unwrap();
        assert!(matches!(err, AgentError::NoProvider { .. }));
    }

    #[tokio::test]
    async fn dyn_provider_delegates() {
        let mock = MockAgentProvider::new("mock");
        let provider: Arc<dyn DynAgentProvider> = mock.clone();
        let dir = tempfile::tempdir().unwrap();
        let result = provider.analyze(dir.path(), "prompt").await;
        assert_eq!(result.agent_type, "mock");
        assert_eq!(mock.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn from_config_builds_known_providers() {
        let mut config = AgentConfig::default();
        config.providers.insert(
            "gemini".to_owned(),
            ProviderConfig {
                program: "gemini".to_owned(),
                ..ProviderConfig::default()
            },
        );
        config.routing.insert("audio".to_owned(), "codex".to_owned());

        let router = AgentRouter::from_config(&config);
        assert_eq!(router.available(), vec!["claude_code", "codex"]);
        assert_eq!(router.select("audio", None).unwrap().0, "codex");
        assert!(matches!(
            provider_for("gemini", &config.providers["gemini"], &config),
            Err(AgentError::UnknownProvider(_))
        ));
    }
}
