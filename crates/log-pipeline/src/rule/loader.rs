//! 규칙 문서 로더 -- 마크다운 규칙 문서를 디스크에서 로드합니다.
//!
//! 규칙 디렉토리(하위 디렉토리 포함)의 `.md` 파일을 경로 순으로 스캔합니다.
//! 각 문서는 `---`로 감싼 YAML front matter와 마크다운 본문으로 구성됩니다.
//! 개별 파일 로딩 실패는 경고 로그를 남기고 건너뜁니다.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::LogPipelineError;

use super::types::Rule;

const MAX_RULE_FILE_SIZE: u64 = 1024 * 1024; // 1MB
const MAX_RULES_COUNT: usize = 10_000;

const FRONT_MATTER_DELIMITER: &str = "---";

/// 규칙 문서 로더
pub struct RuleLoader;

impl RuleLoader {
    /// 디렉토리에서 모든 규칙 문서를 로드합니다.
    ///
    /// 같은 ID가 두 번 나오면 먼저 로드된 문서를 유지하고 나머지는 건너뜁니다.
    ///
    /// # Errors
    /// - 디렉토리를 읽을 수 없는 경우
    /// - 규칙 수가 `MAX_RULES_COUNT`를 초과하는 경우
    pub async fn load_directory(dir: impl AsRef<Path>) -> Result<Vec<Rule>, LogPipelineError> {
        let dir = dir.as_ref();
        let paths = Self::scan_markdown(dir).await?;

        let mut rules = Vec::new();
        let mut seen_ids = HashSet::new();

        for path in paths {
            match Self::load_file(&path).await {
                Ok(rule) => {
                    if !seen_ids.insert(rule.id.clone()) {
                        tracing::warn!(
                            rule_id = %rule.id,
                            path = %path.display(),
                            "duplicate rule id, skipping"
                        );
                        continue;
                    }
                    rules.push(rule);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load rule file, skipping"
                    );
                }
            }

            if rules.len() > MAX_RULES_COUNT {
                return Err(LogPipelineError::RuleLoad {
                    path: dir.display().to_string(),
                    reason: format!("too many rules: max {MAX_RULES_COUNT}"),
                });
            }
        }

        tracing::info!(dir = %dir.display(), count = rules.len(), "loaded analysis rules");

        Ok(rules)
    }

    /// 단일 규칙 문서를 로드합니다. ID가 없으면 파일 이름(확장자 제외)을 사용합니다.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<Rule, LogPipelineError> {
        let path = path.as_ref();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| LogPipelineError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file metadata: {e}"),
            })?;

        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(LogPipelineError::RuleLoad {
                path: path.display().to_string(),
                reason: format!(
                    "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LogPipelineError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file: {e}"),
            })?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self::parse_document(&text, &path.display().to_string(), &stem)
    }

    /// 규칙 문서 문자열을 파싱합니다.
    ///
    /// front matter가 없으면 문서 전체를 본문으로 보고 기본 메타데이터를 사용합니다.
    pub fn parse_document(
        text: &str,
        source: &str,
        default_id: &str,
    ) -> Result<Rule, LogPipelineError> {
        let mut rule = match split_front_matter(text) {
            Some((yaml, body)) => {
                let mut rule: Rule = if yaml.trim().is_empty() {
                    Rule::new(String::new())
                } else {
                    serde_yaml::from_str(yaml).map_err(|e| LogPipelineError::RuleLoad {
                        path: source.to_owned(),
                        reason: format!("front matter parse error: {e}"),
                    })?
                };
                rule.content = body.trim().to_owned();
                rule
            }
            None => {
                tracing::debug!(source, "rule document has no front matter");
                let mut rule = Rule::new(String::new());
                rule.content = text.trim_start_matches('\u{feff}').trim().to_owned();
                rule
            }
        };

        if rule.id.trim().is_empty() {
            rule.id = default_id.to_owned();
        }

        rule.validate()?;

        Ok(rule)
    }

    /// 디렉토리 트리에서 `.md` 파일을 찾아 경로 순으로 반환합니다.
    async fn scan_markdown(dir: &Path) -> Result<Vec<PathBuf>, LogPipelineError> {
        let read_err = |path: &Path, e: std::io::Error| LogPipelineError::RuleLoad {
            path: path.display().to_string(),
            reason: format!("failed to read directory: {e}"),
        };

        let mut found = Vec::new();
        let mut pending = vec![dir.to_path_buf()];

        while let Some(current) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current)
                .await
                .map_err(|e| read_err(&current, e))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| read_err(&current, e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| read_err(&path, e))?;

                if file_type.is_dir() {
                    pending.push(path);
                } else if path.extension().is_some_and(|ext| ext == "md") {
                    found.push(path);
                }
            }
        }

        found.sort();
        Ok(found)
    }
}

/// `---` 구분선으로 감싼 front matter와 본문을 분리합니다.
fn split_front_matter(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start_matches('\u{feff}');
    let after_open = text.strip_prefix(FRONT_MATTER_DELIMITER)?;
    let after_open = after_open
        .strip_prefix("\r\n")
        .or_else(|| after_open.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in after_open.split_inclusive('\n') {
        if line.trim_end() == FRONT_MATTER_DELIMITER {
            return Some((&after_open[..offset], &after_open[offset + line.len()..]));
        }
        offset += line.len();
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLUETOOTH_DOC: &str = "---
id: bluetooth
name: Bluetooth
triggers:
  keywords: [bluetooth, 蓝牙]
  priority: 8
depends_on: [common]
pre_extract:
  - name: disconnect
    pattern: \"BLE.*disconnect\"
    date_filter: true
---

# Steps

Check the disconnect reason code.
";

    #[test]
    fn parse_valid_document() {
        let rule = RuleLoader::parse_document(BLUETOOTH_DOC, "bluetooth.md", "bluetooth").unwrap();
        assert_eq!(rule.id, "bluetooth");
        assert_eq!(rule.triggers.priority, 8);
        assert_eq!(rule.depends_on, vec!["common".to_owned()]);
        assert!(rule.extraction_patterns[0].date_filter);
        assert!(rule.content.starts_with("# Steps"));
        assert!(rule.content.ends_with("reason code."));
    }

    #[test]
    fn missing_id_defaults_to_file_stem() {
        let doc = "---\nname: Wifi\n---\nbody\n";
        let rule = RuleLoader::parse_document(doc, "wifi.md", "wifi").unwrap();
        assert_eq!(rule.id, "wifi");
        assert_eq!(rule.triggers.priority, 5);
        assert!(rule.enabled);
    }

    #[test]
    fn crlf_and_bom_are_accepted() {
        let doc = "\u{feff}---\r\nid: crlf\r\n---\r\nbody\r\n";
        let rule = RuleLoader::parse_document(doc, "crlf.md", "x").unwrap();
        assert_eq!(rule.id, "crlf");
        assert_eq!(rule.content, "body");
    }

    #[test]
    fn document_without_front_matter_is_body_only() {
        let rule = RuleLoader::parse_document("just notes\n", "notes.md", "notes").unwrap();
        assert_eq!(rule.id, "notes");
        assert_eq!(rule.content, "just notes");
        assert!(rule.triggers.keywords.is_empty());
    }

    #[test]
    fn unterminated_front_matter_is_body_only() {
        assert!(split_front_matter("---\nid: x\nno closing line\n").is_none());
    }

    #[test]
    fn invalid_front_matter_is_rejected() {
        let doc = "---\nid: [unclosed\n---\nbody\n";
        assert!(RuleLoader::parse_document(doc, "bad.md", "bad").is_err());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let doc = "---\nid: bad\npre_extract:\n  - name: p\n    pattern: \"(\"\n---\n";
        assert!(RuleLoader::parse_document(doc, "bad.md", "bad").is_err());
    }

    #[tokio::test]
    async fn load_directory_skips_invalid_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a_bluetooth.md"), BLUETOOTH_DOC).unwrap();
        std::fs::write(dir.path().join("b_dup.md"), BLUETOOTH_DOC).unwrap();
        std::fs::write(dir.path().join("c_bad.md"), "---\nid: [\n---\n").unwrap();
        std::fs::write(dir.path().join("ignored.txt"), "not a rule").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/general.md"), "---\nid: general\n---\nfallback").unwrap();

        let rules = RuleLoader::load_directory(dir.path()).await.unwrap();
        let ids: Vec<_> = rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["bluetooth", "general"]);
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.md");
        let body = "x".repeat(MAX_RULE_FILE_SIZE as usize + 1);
        std::fs::write(&path, body).unwrap();
        assert!(RuleLoader::load_file(&path).await.is_err());
    }

    #[tokio::test]
    async fn load_nonexistent_directory_returns_error() {
        let result = RuleLoader::load_directory("/nonexistent/path/rules").await;
        assert!(result.is_err());
    }
}
