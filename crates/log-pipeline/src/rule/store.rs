//! 규칙 저장소
//!
//! [`RuleStore`]는 카탈로그의 영속 계층입니다. 디스크의 규칙 문서는 초기 시드일 뿐이고,
//! 이후 생성/수정/삭제는 모두 저장소에 반영됩니다.
//!
//! - [`MemoryRuleStore`]: 테스트와 일회성 CLI 실행용
//! - [`JsonRuleStore`]: 규칙 하나당 JSON 파일 하나 (`<dir>/<id>.json`)

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;

use crate::error::LogPipelineError;

use super::types::Rule;

/// 규칙 영속 계층
pub trait RuleStore: Send + Sync + 'static {
    /// 저장된 모든 규칙을 ID 순으로 반환합니다.
    fn list(&self) -> impl Future<Output = Result<Vec<Rule>, LogPipelineError>> + Send;

    /// ID로 규칙을 조회합니다.
    fn get(&self, id: &str) -> impl Future<Output = Result<Option<Rule>, LogPipelineError>> + Send;

    /// 규칙이 없을 때만 저장합니다. 저장했으면 `true`를 반환합니다.
    fn insert(&self, rule: Rule) -> impl Future<Output = Result<bool, LogPipelineError>> + Send;

    /// 규칙을 저장하거나 덮어씁니다.
    fn upsert(&self, rule: Rule) -> impl Future<Output = Result<(), LogPipelineError>> + Send;

    /// 규칙을 삭제합니다. 존재했으면 `true`를 반환합니다.
    fn delete(&self, id: &str) -> impl Future<Output = Result<bool, LogPipelineError>> + Send;
}

// ─── MemoryRuleStore ─────────────────────────────────────────────────

/// 메모리 기반 규칙 저장소
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    rules: RwLock<BTreeMap<String, Rule>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RuleStore for MemoryRuleStore {
    async fn list(&self) -> Result<Vec<Rule>, LogPipelineError> {
        Ok(self.rules.read().await.values().cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Rule>, LogPipelineError> {
        Ok(self.rules.read().await.get(id).cloned())
    }

    async fn insert(&self, rule: Rule) -> Result<bool, LogPipelineError> {
        let mut rules = self.rules.write().await;
        if rules.contains_key(&rule.id) {
            return Ok(false);
        }
        rules.insert(rule.id.clone(), rule);
        Ok(true)
    }

    async fn upsert(&self, rule: Rule) -> Result<(), LogPipelineError> {
        self.rules.write().await.insert(rule.id.clone(), rule);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, LogPipelineError> {
        Ok(self.rules.write().await.remove(id).is_some())
    }
}

// ─── JsonRuleStore ───────────────────────────────────────────────────

/// 파일 기반 규칙 저장소
///
/// 쓰기는 임시 파일에 기록한 뒤 rename하므로 중간에 중단되어도
/// 반쯤 쓰인 레코드가 남지 않습니다.
#[derive(Debug)]
pub struct JsonRuleStore {
    dir: PathBuf,
    // 같은 프로세스 안의 insert 경합 방지
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonRuleStore {
    /// 저장 디렉토리를 생성하고 저장소를 엽니다.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, LogPipelineError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| store_err(&dir, e))?;
        Ok(Self {
            dir,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// 저장 디렉토리
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn read_record(path: &Path) -> Result<Option<Rule>, LogPipelineError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(store_err(path, e)),
        };
        let rule = serde_json::from_slice(&bytes).map_err(|e| {
            LogPipelineError::Store(format!("corrupt rule record {}: {e}", path.display()))
        })?;
        Ok(Some(rule))
    }

    async fn write_record(&self, rule: &Rule) -> Result<(), LogPipelineError> {
        let path = self.record_path(&rule.id);
        let tmp = self.dir.join(format!(".{}.json.tmp", rule.id));
        let json = serde_json::to_vec_pretty(rule)
            .map_err(|e| LogPipelineError::Store(format!("serialize rule {}: {e}", rule.id)))?;

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| store_err(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| store_err(&path, e))?;
        Ok(())
    }
}

impl RuleStore for JsonRuleStore {
    async fn list(&self) -> Result<Vec<Rule>, LogPipelineError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| store_err(&self.dir, e))?;

        let mut rules = BTreeMap::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| store_err(&self.dir, e))?
        {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(Some(rule)) => {
                    rules.insert(rule.id.clone(), rule);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable rule record");
                }
            }
        }

        Ok(rules.into_values().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Rule>, LogPipelineError> {
        Self::read_record(&self.record_path(id)).await
    }

    async fn insert(&self, rule: Rule) -> Result<bool, LogPipelineError> {
        let _guard = self.write_lock.lock().await;
        let exists = tokio::fs::try_exists(self.record_path(&rule.id))
            .await
            .map_err(|e| store_err(&self.dir, e))?;
        if exists {
            return Ok(false);
        }
        self.write_record(&rule).await?;
        Ok(true)
    }

    async fn upsert(&self, rule: Rule) -> Result<(), LogPipelineError> {
        let _guard = self.write_lock.lock().await;
        self.write_record(&rule).await
    }

    async fn delete(&self, id: &str) -> Result<bool, LogPipelineError> {
        let _guard = self.write_lock.lock().await;
        let path = self.record_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(store_err(&path, e)),
        }
    }
}

fn store_err(path: &Path, e: std::io::Error) -> LogPipelineError {
    LogPipelineError::Store(format!("{}: {e}", path.display()))
}
