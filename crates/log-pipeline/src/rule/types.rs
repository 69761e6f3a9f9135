//! 분석 규칙 데이터 타입
//!
//! 규칙 문서의 front matter에서 역직렬화되는 구조체들을 정의합니다.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LogPipelineError;

/// 규칙 ID 최대 길이
const MAX_RULE_ID_LEN: usize = 128;

fn default_priority() -> i32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

/// 분류 트리거
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTrigger {
    /// 문제 설명에 부분 문자열로 포함되면 규칙에 투표하는 키워드
    #[serde(default)]
    pub keywords: Vec<String>,
    /// 우선순위 (높을수록 우선)
    #[serde(default = "default_priority")]
    pub priority: i32,
}

impl Default for RuleTrigger {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            priority: default_priority(),
        }
    }
}

/// 사전 추출 패턴
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionPattern {
    /// 패턴 이름 (`{rule_id}.{name}` 키에 사용)
    pub name: String,
    /// 정규식
    pub pattern: String,
    /// 문제 발생 날짜가 포함된 줄로 먼저 좁힐지 여부
    #[serde(default)]
    pub date_filter: bool,
}

/// 분석 규칙 -- 하나의 규칙 문서에 대응합니다.
///
/// # 문서 형식
/// ```text
/// ---
/// id: bluetooth
/// name: Bluetooth connection
/// triggers:
///   keywords: [bluetooth, 蓝牙]
///   priority: 8
/// depends_on: [common]
/// pre_extract:
///   - name: disconnect
///     pattern: "BLE.*disconnect"
///     date_filter: true
/// needs_code: false
/// ---
/// 1. 먼저 연결 해제 사유 코드를 확인합니다.
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// 규칙 고유 ID (없으면 파일 이름에서 유도)
    #[serde(default)]
    pub id: String,
    /// 표시 이름
    #[serde(default)]
    pub name: String,
    /// 규칙 버전
    #[serde(default = "default_version")]
    pub version: u32,
    /// 작성자
    #[serde(default)]
    pub author: String,
    /// 마지막 수정일
    #[serde(default)]
    pub updated: String,
    /// 분류 대상 여부
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 분류 트리거
    #[serde(default)]
    pub triggers: RuleTrigger,
    /// 함께 적용할 규칙 ID (한 단계만 확장)
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// 사전 추출 패턴
    #[serde(default, rename = "pre_extract", alias = "extraction_patterns")]
    pub extraction_patterns: Vec<ExtractionPattern>,
    /// 소스 트리가 필요한지 여부
    #[serde(default, rename = "needs_code", alias = "needs_external_code")]
    pub needs_code: bool,
    /// 결과에 반드시 포함할 항목
    #[serde(default)]
    pub required_output: Vec<String>,
    /// 규칙 본문 (마크다운)
    #[serde(default)]
    pub content: String,
}

impl Rule {
    /// ID만 가진 빈 규칙을 생성합니다.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            version: default_version(),
            author: String::new(),
            updated: String::new(),
            enabled: true,
            triggers: RuleTrigger::default(),
            depends_on: Vec::new(),
            extraction_patterns: Vec::new(),
            needs_code: false,
            required_output: Vec::new(),
            content: String::new(),
        }
    }

    /// 표시 이름 (비어 있으면 ID)
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// 에이전트 워크스페이스에 기록할 마크다운 문서
    pub fn workspace_document(&self) -> String {
        format!("# {}\n\n{}", self.display_name(), self.content)
    }

    /// 대소문자를 무시하고 트리거 키워드가 설명에 포함되는지 검사합니다.
    ///
    /// `description_lower`는 이미 소문자로 변환된 설명이어야 합니다.
    pub fn triggered_by(&self, description_lower: &str) -> bool {
        self.triggers
            .keywords
            .iter()
            .filter(|kw| !kw.trim().is_empty())
            .any(|kw| description_lower.contains(&kw.to_lowercase()))
    }

    /// 규칙의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogPipelineError> {
        if self.id.is_empty() {
            return Err(LogPipelineError::RuleValidation {
                rule_id: "(empty)".to_owned(),
                reason: "rule id must not be empty".to_owned(),
            });
        }

        if self.id.len() > MAX_RULE_ID_LEN {
            return Err(LogPipelineError::RuleValidation {
                rule_id: self.id.clone(),
                reason: format!("rule id must not exceed {MAX_RULE_ID_LEN} characters"),
            });
        }

        // ID는 워크스페이스와 저장소의 파일 이름으로 사용됨
        let id_is_safe = self
            .id
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !self.id.starts_with('.');
        if !id_is_safe {
            return Err(LogPipelineError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "rule id may only contain letters, digits, '-', '_' and '.'".to_owned(),
            });
        }

        let mut names = HashSet::new();
        for pattern in &self.extraction_patterns {
            if pattern.name.trim().is_empty() {
                return Err(LogPipelineError::RuleValidation {
                    rule_id: self.id.clone(),
                    reason: "extraction pattern name must not be empty".to_owned(),
                });
            }
            if !names.insert(pattern.name.as_str()) {
                return Err(LogPipelineError::RuleValidation {
                    rule_id: self.id.clone(),
                    reason: format!("duplicate extraction pattern name '{}'", pattern.name),
                });
            }
            Regex::new(&pattern.pattern).map_err(|e| LogPipelineError::RuleValidation {
                rule_id: self.id.clone(),
                reason: format!("invalid pattern '{}': {e}", pattern.name),
            })?;
        }

        Ok(())
    }
}

/// 부분 업데이트
///
/// `Some`인 필드만 교체합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulePatch {
    pub name: Option<String>,
    pub triggers: Option<RuleTrigger>,
    pub depends_on: Option<Vec<String>>,
    #[serde(rename = "pre_extract", alias = "extraction_patterns")]
    pub extraction_patterns: Option<Vec<ExtractionPattern>>,
    pub needs_code: Option<bool>,
    pub enabled: Option<bool>,
    pub content: Option<String>,
}

impl RulePatch {
    /// 변경 사항이 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.triggers.is_none()
            && self.depends_on.is_none()
            && self.extraction_patterns.is_none()
            && self.needs_code.is_none()
            && self.enabled.is_none()
            && self.content.is_none()
    }

    /// 규칙에 변경 사항을 적용합니다.
    pub fn apply_to(self, rule: &mut Rule) {
        if let Some(name) = self.name {
            rule.name = name;
        }
        if let Some(triggers) = self.triggers {
            rule.triggers = triggers;
        }
        if let Some(depends_on) = self.depends_on {
            rule.depends_on = depends_on;
        }
        if let Some(patterns) = self.extraction_patterns {
            rule.extraction_patterns = patterns;
        }
        if let Some(needs_code) = self.needs_code {
            rule.needs_code = needs_code;
        }
        if let Some(enabled) = self.enabled {
            rule.enabled = enabled;
        }
        if let Some(content) = self.content {
            rule.content = content;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rule() -> Rule {
        let mut rule = Rule::new("bluetooth");
        rule.name = "Bluetooth".to_owned();
        rule.triggers = RuleTrigger {
            keywords: vec!["Bluetooth".to_owned(), "BLE".to_owned()],
            priority: 8,
        };
        rule.extraction_patterns = vec![ExtractionPattern {
            name: "disconnect".to_owned(),
            pattern: r"BLE.*disconnect".to_owned(),
            date_filter: false,
        }];
        rule
    }

    #[test]
    fn valid_rule_passes() {
        sample_rule().validate().unwrap();
    }

    #[test]
    fn trigger_match_is_case_insensitive() {
        let rule = sample_rule();
        assert!(rule.triggered_by("my bluetooth keeps dropping"));
        assert!(rule.triggered_by("ble pairing"));
        assert!(!rule.triggered_by("wifi is slow"));
    }

    #[test]
    fn blank_keywords_never_trigger() {
        let mut rule = Rule::new("blank");
        rule.triggers.keywords = vec!["  ".to_owned()];
        assert!(!rule.triggered_by("anything at all"));
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let mut rule = sample_rule();
        rule.extraction_patterns[0].pattern = "(unclosed".to_owned();
        let err = rule.validate().unwrap_err();
        assert!(err.to_string().contains("disconnect"));
    }

    #[test]
    fn duplicate_pattern_names_are_rejected() {
        let mut rule = sample_rule();
        rule.extraction_patterns
            .push(rule.extraction_patterns[0].clone());
        assert!(rule.validate().is_err());
    }

    #[test]
    fn unsafe_id_is_rejected() {
        assert!(Rule::new("../etc").validate().is_err());
        assert!(Rule::new("a/b").validate().is_err());
        assert!(Rule::new("").validate().is_err());
        Rule::new("wifi_sync-2").validate().unwrap();
    }

    #[test]
    fn patch_replaces_only_supplied_fields() {
        let mut rule = sample_rule();
        let patch = RulePatch {
            enabled: Some(false),
            content: Some("new body".to_owned()),
            ..RulePatch::default()
        };
        patch.apply_to(&mut rule);
        assert!(!rule.enabled);
        assert_eq!(rule.content, "new body");
        assert_eq!(rule.name, "Bluetooth");
        assert_eq!(rule.triggers.priority, 8);
    }

    #[test]
    fn front_matter_keys_deserialize() {
        let yaml = r#"
id: wifi
needs_code: true
pre_extract:
  - name: scan
    pattern: "wifi scan"
"#;
        let rule: Rule = serde_yaml::from_str(yaml).unwrap();
        assert!(rule.needs_code);
        assert!(rule.enabled);
        assert_eq!(rule.triggers.priority, 5);
        assert_eq!(rule.extraction_patterns[0].name, "scan");
        assert!(!rule.extraction_patterns[0].date_filter);
    }
}
