//! 사전 추출 -- 규칙 패턴을 로그에 적용해 제한된 크기의 증거를 만듭니다.
//!
//! 패턴 하나의 검색은 블로킹 스레드에서 실행되며 시간 제한을 넘기면
//! 취소 플래그를 세우고 `[TIMEOUT]` 항목 하나로 대체됩니다.
//! 규칙 매칭 여부와 무관하게 로그별 error/exception/fail 줄 수를 항상 집계합니다.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use logtriage_core::metrics as m;

use crate::config::PipelineConfig;
use crate::error::LogPipelineError;
use crate::rule::{ExtractionPattern, Rule};

/// 샘플 한 줄의 최대 문자 수
const MAX_LINE_CHARS: usize = 500;

const DATE_PATTERN: &str = r"\d{4}-\d{2}-\d{2}";

/// 문제 발생 날짜 후보 패턴 (우선순위 순)
const PROBLEM_DATE_PATTERNS: [&str; 3] = [
    r"(\d{4}-\d{2}-\d{2})",
    r"(\d{4}/\d{2}/\d{2})",
    r"(\d{1,2}/\d{1,2}/\d{4})",
];

/// 한 번만 컴파일되는 날짜 후보 정규식 (우선순위 순)
static PROBLEM_DATE_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    PROBLEM_DATE_PATTERNS
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
});

/// 패턴 하나의 추출 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternExtract {
    pub pattern: String,
    pub date_filter: bool,
    /// 실제 일치 줄 수 (샘플 상한과 무관)
    pub match_count: usize,
    /// 샘플 (최대 `max_samples`개)
    pub matches: Vec<String>,
}

/// 로그 하나의 심각도 집계 (일치하는 줄 수)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub errors: usize,
    pub exceptions: usize,
    pub failures: usize,
}

/// 로그 파일 기본 정보
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogInfo {
    pub size_bytes: u64,
    pub line_count: usize,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
}

/// 실행 한 번의 추출 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// `{rule_id}.{pattern_name}` -> 결과
    pub patterns: BTreeMap<String, PatternExtract>,
    /// 로그 이름 -> 심각도 집계
    pub error_summary: BTreeMap<String, SeverityCounts>,
    /// 로그 이름 -> 기본 정보
    pub log_info: BTreeMap<String, LogInfo>,
}

impl ExtractionResult {
    /// 모든 패턴의 일치 수 합계
    pub fn total_matches(&self) -> usize {
        self.patterns.values().map(|p| p.match_count).sum()
    }
}

/// 심각도 집계에 쓰는 정규식 묶음
#[derive(Debug)]
struct SeverityMatchers {
    error: Regex,
    exception: Regex,
    failure: Regex,
    date: Regex,
}

/// 규칙 기반 사전 추출기
#[derive(Debug, Clone)]
pub struct Extractor {
    max_samples: usize,
    timeout: Duration,
    matchers: Arc<SeverityMatchers>,
}

impl Extractor {
    /// 추출기를 생성합니다.
    pub fn new(max_samples: usize, timeout: Duration) -> Result<Self, LogPipelineError> {
        Ok(Self {
            max_samples,
            timeout,
            matchers: Arc::new(SeverityMatchers {
                error: Regex::new(r"(?i)error")?,
                exception: Regex::new(r"(?i)exception")?,
                failure: Regex::new(r"(?i)fail|失败")?,
                date: Regex::new(DATE_PATTERN)?,
            }),
        })
    }

    /// 파이프라인 설정으로 추출기를 생성합니다.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, LogPipelineError> {
        Self::new(config.max_samples, config.extract_timeout())
    }

    /// 규칙 목록의 모든 추출 패턴을 로그 묶음에 적용합니다.
    ///
    /// 잘못된 정규식과 시간 초과는 에러 대신 합성 항목으로 기록됩니다.
    pub async fn extract(
        &self,
        rules: &[Rule],
        logs: &[PathBuf],
        problem_date: Option<&str>,
    ) -> ExtractionResult {
        let labels = Arc::new(label_logs(logs));
        let mut result = ExtractionResult::default();

        for rule in rules {
            for pattern in &rule.extraction_patterns {
                let key = format!("{}.{}", rule.id, pattern.name);
                let extract = self
                    .run_pattern(pattern, Arc::clone(&labels), problem_date)
                    .await;
                tracing::debug!(
                    key = %key,
                    match_count = extract.match_count,
                    "pattern extracted"
                );
                result.patterns.insert(key, extract);
            }
        }

        for (path, label) in labels.iter() {
            let (info, counts) = self.profile_log(path).await;
            result.log_info.insert(label.clone(), info);
            result.error_summary.insert(label.clone(), counts);
        }

        tracing::info!(
            patterns = result.patterns.len(),
            logs = logs.len(),
            matches = result.total_matches(),
            "pre-extraction complete"
        );

        result
    }

    async fn run_pattern(
        &self,
        pattern: &ExtractionPattern,
        labels: Arc<Vec<(PathBuf, String)>>,
        problem_date: Option<&str>,
    ) -> PatternExtract {
        let mut extract = PatternExtract {
            pattern: pattern.pattern.clone(),
            date_filter: pattern.date_filter,
            match_count: 0,
            matches: Vec::new(),
        };

        let regex = match Regex::new(&pattern.pattern) {
            Ok(regex) => regex,
            Err(e) => {
                extract.matches.push(format!("[INVALID PATTERN] {e}"));
                return extract;
            }
        };

        let date = if pattern.date_filter {
            problem_date.map(str::to_owned)
        } else {
            None
        };
        let max_samples = self.max_samples;
        let prefix_names = labels.len() > 1;
        let cancel = Arc::new(AtomicBool::new(false));
        let task_cancel = Arc::clone(&cancel);

        let search = tokio::task::spawn_blocking(move || {
            let mut count = 0;
            let mut samples = Vec::new();
            for (path, label) in labels.iter() {
                let scanned = scan_lines(path, &task_cancel, |line| {
                    if let Some(date) = &date {
                        if !line.contains(date.as_str()) {
                            return;
                        }
                    }
                    if !regex.is_match(line) {
                        return;
                    }
                    count += 1;
                    if samples.len() < max_samples {
                        samples.push(sample_line(line, label, prefix_names));
                    }
                });
                if let Err(e) = scanned {
                    tracing::warn!(path = %path.display(), error = %e, "failed to scan log");
                }
            }
            (count, samples)
        });

        match tokio::time::timeout(self.timeout, search).await {
            Ok(Ok((count, samples))) => {
                extract.match_count = count;
                extract.matches = samples;
            }
            Ok(Err(e)) => {
                tracing::warn!(pattern = %pattern.name, error = %e, "pattern search task failed");
                extract.matches.push(format!("[ERROR] {e}"));
            }
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                metrics::counter!(m::EXTRACTOR_TIMEOUTS_TOTAL).increment(1);
                tracing::warn!(
                    pattern = %pattern.name,
                    timeout_secs = self.timeout.as_secs(),
                    "pattern search timed out"
                );
                extract.matches.push(format!(
                    "[TIMEOUT] pattern search exceeded {}s",
                    self.timeout.as_secs()
                ));
            }
        }

        extract
    }

    /// 로그 하나의 기본 정보와 심각도 집계를 한 번에 계산합니다.
    async fn profile_log(&self, path: &Path) -> (LogInfo, SeverityCounts) {
        let path = path.to_path_buf();
        let matchers = Arc::clone(&self.matchers);
        let cancel = Arc::new(AtomicBool::new(false));
        let task_cancel = Arc::clone(&cancel);

        let profile = tokio::task::spawn_blocking(move || {
            let mut info = LogInfo {
                size_bytes: std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0),
                ..LogInfo::default()
            };
            let mut counts = SeverityCounts::default();

            let scanned = scan_lines(&path, &task_cancel, |line| {
                info.line_count += 1;
                if matchers.error.is_match(line) {
                    counts.errors += 1;
                }
                if matchers.exception.is_match(line) {
                    counts.exceptions += 1;
                }
                if matchers.failure.is_match(line) {
                    counts.failures += 1;
                }
                if let Some(found) = matchers.date.find(line) {
                    if info.first_timestamp.is_none() {
                        info.first_timestamp = Some(found.as_str().to_owned());
                    }
                    info.last_timestamp = Some(found.as_str().to_owned());
                }
            });
            if let Err(e) = scanned {
                tracing::warn!(path = %path.display(), error = %e, "failed to profile log");
            }
            (info, counts)
        });

        match tokio::time::timeout(self.timeout, profile).await {
            Ok(Ok(profile)) => profile,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "log profile task failed");
                (LogInfo::default(), SeverityCounts::default())
            }
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                metrics::counter!(m::EXTRACTOR_TIMEOUTS_TOTAL).increment(1);
                tracing::warn!("log profile timed out");
                (LogInfo::default(), SeverityCounts::default())
            }
        }
    }
}

/// 파일을 줄 단위로 읽어 콜백에 넘깁니다. UTF-8이 아닌 바이트는 대체 문자로 바꿉니다.
fn scan_lines(
    path: &Path,
    cancel: &AtomicBool,
    mut on_line: impl FnMut(&str),
) -> std::io::Result<()> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let mut buf = Vec::new();

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Ok(());
        }
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        on_line(line.trim_end_matches(['\r', '\n']));
    }
}

fn sample_line(line: &str, label: &str, prefix: bool) -> String {
    let trimmed = line.trim();
    let clipped: String = trimmed.chars().take(MAX_LINE_CHARS).collect();
    if prefix {
        format!("{label}: {clipped}")
    } else {
        clipped
    }
}

/// 로그마다 결과 키로 쓸 이름을 붙입니다. 파일 이름이 겹치면 전체 경로를 사용합니다.
fn label_logs(logs: &[PathBuf]) -> Vec<(PathBuf, String)> {
    let mut seen = std::collections::HashSet::new();
    logs.iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let label = if seen.insert(name.clone()) {
                name
            } else {
                path.display().to_string()
            };
            (path.clone(), label)
        })
        .collect()
}

/// 문제 설명에서 발생 날짜를 추정합니다. `/` 구분자는 `-`로 정규화합니다.
pub fn guess_problem_date(description: &str) -> Option<String> {
    PROBLEM_DATE_REGEXES.iter().find_map(|regex| {
        regex
            .captures(description)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().replace('/', "-"))
    })
}
