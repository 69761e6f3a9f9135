//! Terminal outcome of a run.
//!
//! The agent's result decides whether a task ends DONE or FAILED. The
//! explicit [`ResultStatus`] is authoritative; the sentinel problem types and
//! the low-confidence heuristic cover agents that do not report a status.

use logtriage_core::{AnalysisResult, Confidence, Issue, ResultStatus};

/// Problem type recorded when the agent outlives its timeout.
pub const AGENT_TIMEOUT: &str = "agent timeout";
/// Problem type recorded when no agent could be started.
pub const AGENT_UNAVAILABLE: &str = "agent unavailable";
/// Problem type recorded when the input set yields nothing to analyse.
pub const LOG_PARSE_FAILED: &str = "log parse failed";

/// Maximum length of a stored failure reason.
pub const MAX_REASON_CHARS: usize = 200;

const SENTINELS: [&str; 3] = [AGENT_TIMEOUT, AGENT_UNAVAILABLE, LOG_PARSE_FAILED];

/// Whether a result ends the task as FAILED.
pub fn is_failure(result: &AnalysisResult) -> bool {
    if result.status != ResultStatus::Completed {
        return true;
    }
    let problem_type = result.problem_type.trim().to_lowercase();
    if SENTINELS.contains(&problem_type.as_str()) {
        return true;
    }
    result.confidence == Confidence::Low
        && result.needs_engineer
        && result.user_reply.trim().is_empty()
}

/// Infer a status from sentinel problem types when the agent gave none.
pub fn infer_status(problem_type: &str) -> ResultStatus {
    match problem_type.trim().to_lowercase().as_str() {
        AGENT_TIMEOUT => ResultStatus::Timeout,
        AGENT_UNAVAILABLE => ResultStatus::Unavailable,
        LOG_PARSE_FAILED => ResultStatus::NoLogs,
        _ => ResultStatus::Completed,
    }
}

/// Result for a run whose whole input set was empty.
pub fn no_logs_result(task_id: &str, issue: &Issue, diagnostics: &[String]) -> AnalysisResult {
    let mut root_cause = "no usable log files".to_owned();
    if !diagnostics.is_empty() {
        root_cause.push_str(": ");
        root_cause.push_str(&diagnostics.join("; "));
    }

    AnalysisResult {
        task_id: task_id.to_owned(),
        issue_id: issue.id.clone(),
        status: ResultStatus::NoLogs,
        problem_type: LOG_PARSE_FAILED.to_owned(),
        root_cause,
        confidence: Confidence::Low,
        needs_engineer: true,
        requires_more_info: true,
        more_info_guidance: "Reproduce the problem in the app, then export and upload the latest \
                             logs right away. Include when it happened, the steps taken and the \
                             device firmware version."
            .to_owned(),
        next_steps: vec![
            "Reproduce the problem in the app".to_owned(),
            "Export and upload the latest logs".to_owned(),
            "Add the time of the problem and the steps taken".to_owned(),
        ],
        user_reply: "Hello, we are looking into your problem. The log files we received could \
                     not be read, so an engineer will take a closer look. We will get back to \
                     you as soon as possible."
            .to_owned(),
        ..AnalysisResult::default()
    }
}

/// Truncate to at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_owned(),
        None => text.to_owned(),
    }
}

/// Bounded, single-line failure reason.
pub fn failure_reason(text: &str) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&single_line, MAX_REASON_CHARS)
}

/// Markdown summary posted back to the tracker.
pub fn format_result(issue: &Issue, result: &AnalysisResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("## Log analysis: {}\n\n", issue.id));
    out.push_str(&format!("- **Problem type**: {}\n", result.problem_type));
    out.push_str(&format!(
        "- **Confidence**: {} {}\n",
        result.confidence,
        if result.confidence_reason.is_empty() {
            String::new()
        } else {
            format!("({})", result.confidence_reason)
        }
    ));
    if !result.rule_type.is_empty() {
        out.push_str(&format!("- **Rule**: {}\n", result.rule_type));
    }
    if !result.agent_type.is_empty() {
        out.push_str(&format!("- **Agent**: {}\n", result.agent_type));
    }
    out.push_str(&format!(
        "- **Needs engineer**: {}\n",
        if result.needs_engineer { "yes" } else { "no" }
    ));

    out.push_str("\n### Root cause\n\n");
    out.push_str(result.root_cause.trim());
    out.push('\n');

    if !result.key_evidence.is_empty() {
        out.push_str("\n### Key evidence\n\n");
        for line in &result.key_evidence {
            out.push_str(&format!("- `{}`\n", line.replace('`', "'")));
        }
    }

    if !result.fix_suggestion.trim().is_empty() {
        out.push_str("\n### Fix suggestion\n\n");
        out.push_str(result.fix_suggestion.trim());
        out.push('\n');
    }

    if result.requires_more_info {
        out.push_str("\n### More information needed\n\n");
        out.push_str(result.more_info_guidance.trim());
        out.push('\n');
        for (i, step) in result.next_steps.iter().enumerate() {
            out.push_str(&format!("{}. {step}\n", i + 1));
        }
    }

    if !result.user_reply.trim().is_empty() {
        out.push_str("\n### Suggested reply\n\n");
        for line in result.user_reply.trim().lines() {
            out.push_str("> ");
            out.push_str(line);
            out.push('\n');
        }
    }

    out
}
