//! Agent result parsing.
//!
//! Agents are asked to write `output/result.json`, but not all of them do.
//! Sources are tried in order: the expected file, any other `result.json` in
//! the workspace that looks like a result, a fenced JSON block in stdout, and
//! finally the largest balanced object in stdout mentioning `problem_type`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use logtriage_core::{AnalysisResult, Confidence, ResultStatus};

use crate::outcome::{self, AGENT_TIMEOUT, AGENT_UNAVAILABLE, truncate_chars};

/// Relative path of the result file agents are asked to write.
pub const RESULT_FILE: &str = "output/result.json";

const MAX_RAW_OUTPUT_CHARS: usize = 10_000;
const MAX_ROOT_CAUSE_FALLBACK_CHARS: usize = 2_000;
const MAX_KEY_EVIDENCE: usize = 5;

static FENCED_JSON: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*\n(.*?)\n\s*```").ok());
static FENCED_OBJECT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```\s*\n(\{.*?\})\s*\n\s*```").ok());

/// Build an [`AnalysisResult`] from whatever the agent left behind.
pub async fn parse_result(workspace: &Path, raw_output: &str) -> AnalysisResult {
    let data = match read_result_files(workspace).await {
        Some(data) => data,
        None => extract_json_from_text(raw_output).unwrap_or_default(),
    };
    if data.is_empty() {
        tracing::warn!(workspace = %workspace.display(), "agent produced no structured result");
    }
    from_fields(&data, raw_output)
}

async fn read_result_files(workspace: &Path) -> Option<Map<String, Value>> {
    let primary = workspace.join(RESULT_FILE);
    if let Some(data) = read_object(&primary).await {
        return Some(data);
    }

    let mut candidates = Vec::new();
    collect_named(workspace, "result.json", &mut candidates).await;
    candidates.sort();
    for path in candidates.into_iter().filter(|p| *p != primary) {
        let Some(data) = read_object(&path).await else {
            continue;
        };
        if data.contains_key("problem_type") || data.contains_key("root_cause") {
            tracing::info!(path = %path.display(), "using result file outside output/");
            return Some(data);
        }
    }
    None
}

async fn read_object(path: &Path) -> Option<Map<String, Value>> {
    let text = tokio::fs::read_to_string(path).await.ok()?;
    let text = text.trim_start_matches('\u{feff}');
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "result file is not valid json");
            None
        }
    }
}

async fn collect_named(root: &Path, name: &str, out: &mut Vec<PathBuf>) {
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            let path = entry.path();
            // code/ is a symlink to the source tree
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && entry.file_name() == name {
                out.push(path);
            }
        }
    }
}

/// Pull a JSON object out of free-form agent output.
pub fn extract_json_from_text(text: &str) -> Option<Map<String, Value>> {
    for re in [FENCED_JSON.as_ref(), FENCED_OBJECT.as_ref()].into_iter().flatten() {
        for caps in re.captures_iter(text) {
            if let Some(Value::Object(map)) = caps
                .get(1)
                .and_then(|m| serde_json::from_str::<Value>(m.as_str().trim()).ok())
            {
                return Some(map);
            }
        }
    }

    // Largest balanced object that mentions problem_type.
    let mut best: Option<&str> = None;
    for candidate in balanced_objects(text) {
        if !candidate.contains("\"problem_type\"") {
            continue;
        }
        if best.is_none_or(|b| candidate.len() > b.len()) {
            best = Some(candidate);
        }
    }
    match serde_json::from_str::<Value>(best?) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Every `{...}` span with balanced braces, ignoring braces inside strings.
fn balanced_objects(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' if !stack.is_empty() => in_string = true,
            b'{' => stack.push(i),
            b'}' => {
                if let Some(start) = stack.pop() {
                    spans.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    spans
}

fn from_fields(data: &Map<String, Value>, raw_output: &str) -> AnalysisResult {
    let problem_type = string_field(data, "problem_type").unwrap_or_else(|| "unknown".to_owned());

    let root_cause = string_field(data, "root_cause").unwrap_or_else(|| {
        if raw_output.trim().is_empty() {
            "agent produced no output".to_owned()
        } else {
            truncate_chars(raw_output, MAX_ROOT_CAUSE_FALLBACK_CHARS)
        }
    });

    let status = if data.is_empty() {
        ResultStatus::Unparseable
    } else {
        string_field(data, "status")
            .and_then(|s| ResultStatus::parse_lenient(&s))
            .unwrap_or_else(|| outcome::infer_status(&problem_type))
    };

    let mut key_evidence = list_field(data, "key_evidence");
    key_evidence.truncate(MAX_KEY_EVIDENCE);

    AnalysisResult {
        status,
        problem_type,
        root_cause,
        confidence: string_field(data, "confidence")
            .map(|c| Confidence::parse_lenient(&c))
            .unwrap_or(Confidence::Low),
        confidence_reason: string_field(data, "confidence_reason").unwrap_or_default(),
        key_evidence,
        user_reply: string_field(data, "user_reply").unwrap_or_default(),
        needs_engineer: bool_field(data, "needs_engineer").unwrap_or(true),
        fix_suggestion: string_field(data, "fix_suggestion").unwrap_or_default(),
        requires_more_info: bool_field(data, "requires_more_info").unwrap_or(false),
        more_info_guidance: string_field(data, "more_info_guidance").unwrap_or_default(),
        next_steps: list_field(data, "next_steps"),
        raw_output: truncate_chars(raw_output, MAX_RAW_OUTPUT_CHARS),
        ..AnalysisResult::default()
    }
}

fn string_field(data: &Map<String, Value>, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Null | Value::String(_) => None,
        other => Some(other.to_string()),
    }
}

fn bool_field(data: &Map<String, Value>, key: &str) -> Option<bool> {
    match data.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn list_field(data: &Map<String, Value>, key: &str) -> Vec<String> {
    match data.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Result recorded when the agent outlives its timeout.
pub fn timeout_result(provider: &str, secs: u64) -> AnalysisResult {
    AnalysisResult {
        status: ResultStatus::Timeout,
        problem_type: AGENT_TIMEOUT.to_owned(),
        root_cause: format!("{provider} did not finish within {secs}s"),
        confidence: Confidence::Low,
        needs_engineer: true,
        agent_type: provider.to_owned(),
        ..AnalysisResult::default()
    }
}

/// Result recorded when the agent could not be started.
pub fn unavailable_result(provider: &str, reason: &str) -> AnalysisResult {
    AnalysisResult {
        status: ResultStatus::Unavailable,
        problem_type: AGENT_UNAVAILABLE.to_owned(),
        root_cause: format!("{provider} could not be started: {reason}"),
        confidence: Confidence::Low,
        needs_engineer: true,
        agent_type: provider.to_owned(),
        ..AnalysisResult::default()
    }
}
