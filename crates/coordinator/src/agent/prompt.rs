//! Analysis prompt.
//!
//! The prompt is the agent's whole briefing: issue fields, the matched rule
//! bodies, the pre-extracted evidence and the result contract. It is written
//! to `prompt.md` in the workspace, see [`super::process::write_prompt`].

use std::fmt::Write as _;

use logtriage_core::Issue;
use logtriage_log_pipeline::{ExtractionResult, Rule};

use super::result::RESULT_FILE;

const ROLE_WITH_LOGS: &str = "\
You are a device log analysis expert helping the support team triage user tickets.
Your findings are shown directly to support staff, who send your reply draft to the user.

## Principles

1. **Start from the pre-extracted evidence**: key log lines were already pulled out for you.
2. **Grep only when needed**: search `logs/` only if the evidence is not enough.
3. **Rules first**: follow the troubleshooting steps in the files under `rules/`.
4. **Always write the result file**: finish by writing the JSON result to `output/result.json`.";

const ROLE_WITHOUT_LOGS: &str = "\
You are a product and technical expert helping the support team answer user tickets.
**This ticket has no usable log files.** Work from the description, the rules and the code.
Your findings are shown directly to support staff, who send your reply draft to the user.

## Principles

1. **Code first**: read the repository under `code/` (if present) to understand the behaviour.
2. **Rules as reference**: the files under `rules/` describe known problems and fixes.
3. **Always write the result file**: finish by writing the JSON result to `output/result.json`.
4. **Say what is missing**: if the root cause cannot be confirmed without logs, ask the user for logs in `user_reply`.";

const RESULT_SCHEMA: &str = r#"```json
{
    "status": "completed",
    "problem_type": "short problem category",
    "root_cause": "root cause analysis, 2-5 sentences",
    "confidence": "high | medium | low",
    "confidence_reason": "why this confidence level",
    "key_evidence": ["key log line 1", "key log line 2 (at most 5)"],
    "user_reply": "complete, polite reply the support team can send as is",
    "needs_engineer": false,
    "fix_suggestion": "",
    "requires_more_info": false,
    "more_info_guidance": "",
    "next_steps": []
}
```"#;

const CONFIDENCE_GUIDE: &str = "\
## Confidence

- **high**: clear evidence in the logs, clear root cause and fix
- **medium**: some evidence but not conclusive, or several possible causes
- **low**: not enough information; an engineer or more data is needed

When confidence is low, set `needs_engineer` to true.";

/// Build the full prompt.
///
/// `extraction` is `None` when the run has no usable logs; the prompt then
/// switches to the description-only briefing.
pub fn build_prompt(
    issue: &Issue,
    rules: &[Rule],
    extraction: Option<&ExtractionResult>,
    problem_date: Option<&str>,
) -> String {
    let mut out = String::new();

    out.push_str(if extraction.is_some() {
        ROLE_WITH_LOGS
    } else {
        ROLE_WITHOUT_LOGS
    });
    out.push_str("\n\n## Ticket\n\n");
    let _ = writeln!(out, "- **Description**: {}", issue.description.trim());
    let _ = writeln!(out, "- **Device SN**: {}", issue.device_sn);
    let _ = writeln!(out, "- **Firmware**: {}", issue.firmware);
    let _ = writeln!(out, "- **App version**: {}", issue.app_version);
    if !issue.external_ref.is_empty() {
        let _ = writeln!(out, "- **Reference**: {}", issue.external_ref);
    }
    if let Some(date) = problem_date {
        let _ = writeln!(out, "- **Problem date**: {date}");
    }

    out.push_str(
        "\n## Rules\n\nRead the rule files under `rules/` and follow their steps. Summary:\n",
    );
    for rule in rules {
        let _ = write!(out, "\n### Rule: {}\n\n{}\n", rule.display_name(), rule.content.trim());
    }

    match extraction {
        Some(extraction) => {
            let json = serde_json::to_string_pretty(extraction).unwrap_or_else(|_| "{}".to_owned());
            let _ = write!(
                out,
                "\n## Pre-extracted evidence\n\n\
                 Lines matched by the rule patterns. `match_count > 0` means the log has \
                 matching lines, read `matches` carefully; `match_count = 0` means nothing \
                 was recorded.\n\n```json\n{json}\n```\n"
            );
            out.push_str(
                "\n## Workspace\n\n```\n\
                 logs/     decrypted log files, grep them directly\n\
                 rules/    rule documents\n\
                 code/     source repository (if present)\n\
                 output/   write result.json here\n```\n",
            );
        }
        None => {
            out.push_str(
                "\n## Logs\n\n**No usable log files were provided.** Base the analysis on the \
                 description, the code and the rules. If logs are needed, guide the user to \
                 provide them in `user_reply`.\n",
            );
            out.push_str(
                "\n## Workspace\n\n```\n\
                 rules/    rule documents\n\
                 code/     source repository (if present)\n\
                 output/   write result.json here\n```\n",
            );
        }
    }

    let _ = write!(
        out,
        "\n## Output\n\nWhen done, write the result as JSON to `{RESULT_FILE}`. \
         Set `status` to `completed` unless you could not analyse the ticket.\n\n{RESULT_SCHEMA}\n\n\
         `user_reply` is sent to the user as is: complete, polite and free of internal jargon.\n\n\
         {CONFIDENCE_GUIDE}\n"
    );

    out
}
