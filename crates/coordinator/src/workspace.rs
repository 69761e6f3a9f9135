//! Per-task workspace.
//!
//! ```text
//! <workspace_dir>/<task_id>/
//!   raw/         downloaded inputs
//!   processed/   decoder output
//!   logs/        canonical logs handed to the agent
//!   rules/       matched rule documents (<id>.md)
//!   output/      the agent writes result.json here
//!   code         symlink to the source tree, when a rule needs it
//!   prompt.md
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use logtriage_log_pipeline::Rule;

use crate::error::CoordinatorError;

/// Directory layout for one task.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create `<base>/<task_id>` and its subdirectories.
    pub async fn create(base: &Path, task_id: &str) -> Result<Self, CoordinatorError> {
        let ws = Self {
            root: base.join(task_id),
        };
        for dir in [
            ws.raw_dir(),
            ws.processed_dir(),
            ws.logs_dir(),
            ws.rules_dir(),
            ws.output_dir(),
        ] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| ws_err(&dir, e))?;
        }
        Ok(ws)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join("processed")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn rules_dir(&self) -> PathBuf {
        self.root.join("rules")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    pub fn code_dir(&self) -> PathBuf {
        self.root.join("code")
    }

    /// Copy uploaded files into `raw/`.
    ///
    /// Files that cannot be copied become diagnostics instead of errors.
    pub async fn stage_uploads(&self, files: &[PathBuf]) -> (Vec<PathBuf>, Vec<String>) {
        let raw_dir = self.raw_dir();
        let mut taken = HashSet::new();
        let mut staged = Vec::with_capacity(files.len());
        let mut diagnostics = Vec::new();

        for file in files {
            let name = unique_name(&file_name(file, "upload"), &mut taken);
            let dest = raw_dir.join(&name);
            match tokio::fs::copy(file, &dest).await {
                Ok(_) => staged.push(dest),
                Err(e) => {
                    tracing::warn!(path = %file.display(), error = %e, "cannot stage upload");
                    diagnostics.push(format!("{name}: {e}"));
                }
            }
        }
        (staged, diagnostics)
    }

    /// Copy logs into `logs/`. Name collisions get a numeric suffix.
    pub async fn install_logs(&self, logs: &[PathBuf]) -> Result<Vec<PathBuf>, CoordinatorError> {
        let logs_dir = self.logs_dir();
        let mut taken = HashSet::new();
        let mut installed = Vec::with_capacity(logs.len());

        for log in logs {
            let name = unique_name(&file_name(log, "log"), &mut taken);
            let dest = logs_dir.join(&name);
            tokio::fs::copy(log, &dest)
                .await
                .map_err(|e| ws_err(log, e))?;
            tracing::debug!(src = %log.display(), dest = %dest.display(), "installed log");
            installed.push(dest);
        }
        Ok(installed)
    }

    /// Write each rule as `rules/<id>.md`.
    pub async fn install_rules(&self, rules: &[Rule]) -> Result<(), CoordinatorError> {
        for rule in rules {
            let path = self.rules_dir().join(format!("{}.md", rule.id));
            tokio::fs::write(&path, rule.workspace_document())
                .await
                .map_err(|e| ws_err(&path, e))?;
        }
        Ok(())
    }

    /// Expose the source tree as `code/` when any rule asks for it.
    ///
    /// Returns whether the link exists afterwards.
    pub async fn link_code(
        &self,
        rules: &[Rule],
        code_repo: Option<&Path>,
    ) -> Result<bool, CoordinatorError> {
        let Some(repo) = code_repo else {
            return Ok(false);
        };
        if !rules.iter().any(|r| r.needs_code) {
            return Ok(false);
        }
        let link = self.code_dir();
        if tokio::fs::symlink_metadata(&link).await.is_ok() {
            return Ok(true);
        }
        symlink_dir(repo, &link).await.map_err(|e| ws_err(&link, e))?;
        Ok(true)
    }
}

#[cfg(unix)]
async fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(target, link).await
}

#[cfg(windows)]
async fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    tokio::fs::symlink_dir(target, link).await
}

fn file_name(path: &Path, fallback: &str) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| fallback.to_owned())
}

/// `name`, or `name` with `_2`, `_3`, ... before the extension when taken.
pub(crate) fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_owned()) {
        return name.to_owned();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
        _ => (name, String::new()),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{stem}_{n}{ext}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn ws_err(path: &Path, e: std::io::Error) -> CoordinatorError {
    CoordinatorError::Workspace {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_lays_out_directories() {
        let base = tempfile::tempdir().unwrap();
        let ws = Workspace::create(base.path(), "task-1").await.unwrap();
        assert_eq!(ws.root(), base.path().join("task-1"));
        for dir in [ws.raw_dir(), ws.processed_dir(), ws.logs_dir(), ws.rules_dir(), ws.output_dir()] {
            assert!(dir.is_dir(), "{} missing", dir.display());
        }
    }

    #[tokio::test]
    async fn colliding_log_names_are_kept_apart() {
        let base = tempfile::tempdir().unwrap();
        let ws = Workspace::create(base.path(), "task-2").await.unwrap();
        let a = base.path().join("a");
        let b = base.path().join("b");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();
        std::fs::write(a.join("plaud.log"), "first").unwrap();
        std::fs::write(b.join("plaud.log"), "second").unwrap();

        let installed = ws
            .install_logs(&[a.join("plaud.log"), b.join("plaud.log")])
            .await
            .unwrap();
        assert_eq!(installed[0], ws.logs_dir().join("plaud.log"));
        assert_eq!(installed[1], ws.logs_dir().join("plaud_2.log"));
        assert_eq!(std::fs::read_to_string(&installed[1]).unwrap(), "second");
    }

    #[tokio::test]
    async fn rules_are_written_as_documents() {
        let base = tempfile::tempdir().unwrap();
        let ws = Workspace::create(base.path(), "task-3").await.unwrap();
        let mut rule = Rule::new("bluetooth");
        rule.name = "Bluetooth".to_owned();
        rule.content = "Check pairing.".to_owned();
        ws.install_rules(&[rule]).await.unwrap();

        let text = std::fs::read_to_string(ws.rules_dir().join("bluetooth.md")).unwrap();
        assert_eq!(text, "# Bluetooth\n\nCheck pairing.");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn code_link_only_when_requested() {
        let base = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        let ws = Workspace::create(base.path(), "task-4").await.unwrap();

        let plain = Rule::new("general");
        assert!(!ws.link_code(&[plain.clone()], Some(repo.path())).await.unwrap());
        assert!(!ws.code_dir().exists());

        let mut code_rule = Rule::new("firmware");
        code_rule.needs_code = true;
        assert!(!ws.link_code(&[code_rule.clone()], None).await.unwrap());
        assert!(ws.link_code(&[plain, code_rule.clone()], Some(repo.path())).await.unwrap());
        assert!(ws.code_dir().is_dir());
        // idempotent
        assert!(ws.link_code(&[code_rule], Some(repo.path())).await.unwrap());
    }

    #[tokio::test]
    async fn uploads_are_staged_with_diagnostics() {
        let base = tempfile::tempdir().unwrap();
        let ws = Workspace::create(base.path(), "task-5").await.unwrap();
        let present = base.path().join("bundle.plaud");
        std::fs::write(&present, b"data").unwrap();

        let (staged, diagnostics) = ws
            .stage_uploads(&[present, base.path().join("missing.zip")])
            .await;
        assert_eq!(staged, vec![ws.raw_dir().join("bundle.plaud")]);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].starts_with("missing.zip: "));
    }

    #[test]
    fn unique_names_keep_extension() {
        let mut taken = HashSet::new();
        assert_eq!(unique_name("a.log", &mut taken), "a.log");
        assert_eq!(unique_name("a.log", &mut taken), "a_2.log");
        assert_eq!(unique_name("a.log", &mut taken), "a_3.log");
        assert_eq!(unique_name("noext", &mut taken), "noext");
        assert_eq!(unique_name("noext", &mut taken), "noext_2");
    }
}
