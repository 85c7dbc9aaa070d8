use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::store::{CacheIdentity, CacheStore, FileCacheStore, TaskCacheEntry, TaskSignature};
use crate::config::CacheConfig;
use crate::errors::{InsightError, InsightResult};

const RECORDS_FIELD: &str = "records";
const UPDATED_AT_FIELD: &str = "updatedAt";

/// Kind of result a cache record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Locate,
    Extract,
}

/// One cached call inside a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub prompt: String,
    pub result: Value,
}

/// Task-result cache in front of the insight pipeline.
///
/// Entries are read fresh on every lookup and rewritten on every store; no
/// entry is held in memory between calls.
#[derive(Clone)]
pub struct TaskCache {
    store: Arc<dyn CacheStore>,
    identity: CacheIdentity,
    enabled: bool,
}

impl TaskCache {
    pub fn new(store: Arc<dyn CacheStore>, identity: CacheIdentity, enabled: bool) -> Self {
        Self {
            store,
            identity,
            enabled,
        }
    }

    pub fn from_config(cfg: &CacheConfig) -> Self {
        let dir = cfg.resolved_dir();
        tracing::info!(enabled = cfg.enabled, dir = %dir.display(), "task cache configured");
        Self::new(Arc::new(FileCacheStore::new(dir)), CacheIdentity::engine(), cfg.enabled)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn identity(&self) -> &CacheIdentity {
        &self.identity
    }

    /// Entry for `(task_file, task_title)`, or `None` on a miss.
    ///
    /// An entry written by another engine identity is a miss, as is an
    /// unreadable file.
    pub fn read(&self, task_file: &str, task_title: &str) -> Option<TaskCacheEntry> {
        if !self.enabled {
            return None;
        }
        let key = TaskSignature::new(task_file, task_title);
        match self.store.load(&key, &self.identity) {
            Ok(entry) => entry,
            Err(InsightError::CacheMismatch { expected, found }) => {
                tracing::info!(
                    task_file,
                    task_title,
                    %expected,
                    %found,
                    "cache entry from another engine version, ignoring"
                );
                None
            }
            Err(e) => {
                tracing::warn!(task_file, task_title, error = %e, "cache entry unreadable, ignoring");
                None
            }
        }
    }

    /// Persist `fields` for `(task_file, task_title)` under this engine's identity.
    pub fn write(
        &self,
        task_file: &str,
        task_title: &str,
        fields: serde_json::Map<String, Value>,
    ) -> InsightResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut entry = TaskCacheEntry::new(&self.identity, &TaskSignature::new(task_file, task_title));
        entry.fields = fields;
        self.store.save(&entry)
    }

    /// Cached result of one call inside a task.
    pub fn lookup(&self, signature: &TaskSignature, kind: RecordKind, prompt: &str) -> Option<Value> {
        let entry = self.read(&signature.task_file, &signature.task_title)?;
        let hit = records_of(&entry)
            .into_iter()
            .find(|r| r.kind == kind && r.prompt == prompt)
            .map(|r| r.result);
        tracing::debug!(
            task = %signature.task_title,
            ?kind,
            prompt,
            hit = hit.is_some(),
            "cache lookup"
        );
        hit
    }

    /// Insert or replace one call's result and rewrite the task entry.
    pub fn store(
        &self,
        signature: &TaskSignature,
        kind: RecordKind,
        prompt: &str,
        result: Value,
    ) -> InsightResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut fields = self
            .read(&signature.task_file, &signature.task_title)
            .map(|e| e.fields)
            .unwrap_or_default();

        let mut records: Vec<CacheRecord> = fields
            .get(RECORDS_FIELD)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let record = CacheRecord {
            kind,
            prompt: prompt.to_string(),
            result,
        };
        match records.iter_mut().find(|r| r.kind == kind && r.prompt == prompt) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }

        fields.insert(RECORDS_FIELD.into(), serde_json::to_value(&records)?);
        fields.insert(
            UPDATED_AT_FIELD.into(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        self.write(&signature.task_file, &signature.task_title, fields)?;
        tracing::debug!(task = %signature.task_title, ?kind, prompt, "cache record stored");
        Ok(())
    }
}

fn records_of(entry: &TaskCacheEntry) -> Vec<CacheRecord> {
    entry
        .fields
        .get(RECORDS_FIELD)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}
