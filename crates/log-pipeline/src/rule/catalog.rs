//! 규칙 카탈로그 -- 분류, 의존성 확장, CRUD
//!
//! 카탈로그는 [`RuleStore`]를 원본으로 삼고 메모리에 ID 순 맵을 유지합니다.
//! 디스크의 규칙 문서는 [`RuleCatalog::seed_from_dir`]로 최초 한 번 삽입될 뿐이며,
//! 이미 저장된 규칙을 덮어쓰지 않습니다.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use tokio::sync::RwLock;

use crate::error::LogPipelineError;

use super::loader::RuleLoader;
use super::store::RuleStore;
use super::types::{Rule, RulePatch};

/// 시드 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// 디렉토리에서 읽은 규칙 수
    pub loaded: usize,
    /// 저장소에 새로 삽입된 규칙 수
    pub inserted: usize,
}

/// 규칙 카탈로그
pub struct RuleCatalog<S> {
    store: S,
    fallback_rule_id: String,
    rules: RwLock<BTreeMap<String, Rule>>,
}

impl<S: RuleStore> RuleCatalog<S> {
    /// 빈 카탈로그를 생성합니다. 저장소 내용은 [`reload`](Self::reload)로 읽어들입니다.
    pub fn new(store: S, fallback_rule_id: impl Into<String>) -> Self {
        Self {
            store,
            fallback_rule_id: fallback_rule_id.into(),
            rules: RwLock::new(BTreeMap::new()),
        }
    }

    /// 분류 실패 시 사용하는 규칙 ID
    pub fn fallback_rule_id(&self) -> &str {
        &self.fallback_rule_id
    }

    /// 백엔드 저장소
    pub fn store(&self) -> &S {
        &self.store
    }

    /// 디렉토리의 규칙 문서를 저장소에 없는 것만 삽입한 뒤 카탈로그를 다시 읽습니다.
    pub async fn seed_from_dir(&self, dir: impl AsRef<Path>) -> Result<SeedReport, LogPipelineError> {
        let rules = RuleLoader::load_directory(dir.as_ref()).await?;
        let loaded = rules.len();
        let mut inserted = 0;

        for rule in rules {
            let id = rule.id.clone();
            if self.store.insert(rule).await? {
                tracing::debug!(rule_id = %id, "seeded rule");
                inserted += 1;
            }
        }

        self.reload().await?;

        tracing::info!(loaded, inserted, "rule seed complete");
        Ok(SeedReport { loaded, inserted })
    }

    /// 저장소에서 메모리 카탈로그를 다시 구성합니다. 규칙 수를 반환합니다.
    pub async fn reload(&self) -> Result<usize, LogPipelineError> {
        let stored = self.store.list().await?;
        let mut map = BTreeMap::new();
        for rule in stored {
            map.insert(rule.id.clone(), rule);
        }
        let count = map.len();
        *self.rules.write().await = map;
        Ok(count)
    }

    /// 문제 설명을 규칙 ID로 분류합니다.
    ///
    /// 활성 규칙 중 트리거 키워드가 포함된 규칙들의 우선순위를 비교하고,
    /// 동률이면 ID 사전순으로 가장 앞선 규칙을 선택합니다.
    /// 일치하는 규칙이 없으면 폴백 ID를 반환합니다.
    pub async fn classify(&self, description: &str) -> String {
        let lower = description.to_lowercase();
        let rules = self.rules.read().await;

        // BTreeMap 순회는 ID 오름차순이므로 엄격히 큰 우선순위만 교체하면 된다
        let mut best: Option<&Rule> = None;
        for rule in rules.values() {
            if !rule.enabled || !rule.triggered_by(&lower) {
                continue;
            }
            match best {
                Some(current) if current.triggers.priority >= rule.triggers.priority => {}
                _ => best = Some(rule),
            }
        }

        match best {
            Some(rule) => rule.id.clone(),
            None => self.fallback_rule_id.clone(),
        }
    }

    /// 규칙과 그 직접 의존 규칙을 선언 순서대로 반환합니다.
    ///
    /// 규칙이 없으면 폴백 규칙으로 대체하고, 폴백 규칙도 없으면 빈 목록을 반환합니다.
    /// 존재하지 않는 의존 ID는 조용히 건너뜁니다.
    pub async fn expand(&self, rule_id: &str) -> Vec<Rule> {
        let rules = self.rules.read().await;

        let primary = match rules
            .get(rule_id)
            .or_else(|| rules.get(&self.fallback_rule_id))
        {
            Some(rule) => rule,
            None => return Vec::new(),
        };

        let mut seen = HashSet::new();
        seen.insert(primary.id.as_str());
        let mut matched = vec![primary.clone()];

        for dep_id in &primary.depends_on {
            if !seen.insert(dep_id.as_str()) {
                continue;
            }
            match rules.get(dep_id) {
                Some(dep) => matched.push(dep.clone()),
                None => tracing::debug!(rule_id = %primary.id, dependency = %dep_id, "missing dependency skipped"),
            }
        }

        matched
    }

    /// 설명을 분류한 뒤 의존 규칙까지 확장합니다.
    pub async fn match_rules(&self, description: &str) -> Vec<Rule> {
        let rule_id = self.classify(description).await;
        self.expand(&rule_id).await
    }

    /// ID로 규칙을 조회합니다.
    pub async fn get(&self, id: &str) -> Option<Rule> {
        self.rules.read().await.get(id).cloned()
    }

    /// 모든 규칙을 ID 순으로 반환합니다.
    pub async fn list(&self) -> Vec<Rule> {
        self.rules.read().await.values().cloned().collect()
    }

    /// 규칙 수
    pub async fn len(&self) -> usize {
        self.rules.read().await.len()
    }

    /// 카탈로그가 비어 있는지 여부
    pub async fn is_empty(&self) -> bool {
        self.rules.read().await.is_empty()
    }

    /// 새 규칙을 생성합니다.
    ///
    /// # Errors
    /// - 같은 ID가 이미 있으면 `RuleExists`
    /// - 유효성 검증 실패
    pub async fn create(&self, rule: Rule) -> Result<Rule, LogPipelineError> {
        rule.validate()?;

        let mut rules = self.rules.write().await;
        if rules.contains_key(&rule.id) || !self.store.insert(rule.clone()).await? {
            return Err(LogPipelineError::RuleExists(rule.id));
        }
        rules.insert(rule.id.clone(), rule.clone());

        tracing::info!(rule_id = %rule.id, "rule created");
        Ok(rule)
    }

    /// 지정한 필드만 교체합니다.
    pub async fn update(&self, id: &str, patch: RulePatch) -> Result<Rule, LogPipelineError> {
        let mut rules = self.rules.write().await;
        let mut rule = rules
            .get(id)
            .cloned()
            .ok_or_else(|| LogPipelineError::RuleNotFound(id.to_owned()))?;

        patch.apply_to(&mut rule);
        rule.validate()?;

        self.store.upsert(rule.clone()).await?;
        rules.insert(rule.id.clone(), rule.clone());

        tracing::info!(rule_id = %id, "rule updated");
        Ok(rule)
    }

    /// 저장소에서 먼저 삭제한 뒤 카탈로그에서 제거합니다.
    ///
    /// 저장소 삭제가 실패하면 카탈로그는 그대로 유지됩니다.
    pub async fn delete(&self, id: &str) -> Result<(), LogPipelineError> {
        let mut rules = self.rules.write().await;
        if !rules.contains_key(id) {
            return Err(LogPipelineError::RuleNotFound(id.to_owned()));
        }
        self.store.delete(id).await?;
        rules.remove(id);

        tracing::info!(rule_id = %id, "rule deleted");
        Ok(())
    }
}
