use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{InsightError, InsightResult};

/// Engine identity a cache entry was written by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheIdentity {
    pub pkg_name: String,
    pub pkg_version: String,
}

impl CacheIdentity {
    pub fn new(pkg_name: impl Into<String>, pkg_version: impl Into<String>) -> Self {
        Self {
            pkg_name: pkg_name.into(),
            pkg_version: pkg_version.into(),
        }
    }

    /// The running crate's own name and version.
    pub fn engine() -> Self {
        Self::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}

impl std::fmt::Display for CacheIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.pkg_name, self.pkg_version)
    }
}

/// `(taskFile, taskTitle)`: one automation task in one script.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskSignature {
    pub task_file: String,
    pub task_title: String,
}

impl TaskSignature {
    pub fn new(task_file: impl Into<String>, task_title: impl Into<String>) -> Self {
        Self {
            task_file: task_file.into(),
            task_title: task_title.into(),
        }
    }

    /// Deterministic, filesystem-safe file name for this signature.
    pub fn file_name(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.task_file.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.task_title.as_bytes());
        let digest = hex::encode(hasher.finalize());
        let stem = Path::new(&self.task_file)
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.task_file);
        format!(
            "{}-{}-{}.json",
            slug(stem),
            slug(&self.task_title),
            &digest[..12]
        )
    }
}

fn slug(s: &str) -> String {
    let mut out = String::new();
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
        if out.len() >= 40 {
            break;
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "task".to_string()
    } else {
        trimmed.to_string()
    }
}

/// One cached task as persisted on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCacheEntry {
    pub pkg_name: String,
    pub pkg_version: String,
    pub task_file: String,
    pub task_title: String,
    /// Task payload stored alongside the identity fields.
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl TaskCacheEntry {
    pub fn new(identity: &CacheIdentity, signature: &TaskSignature) -> Self {
        Self {
            pkg_name: identity.pkg_name.clone(),
            pkg_version: identity.pkg_version.clone(),
            task_file: signature.task_file.clone(),
            task_title: signature.task_title.clone(),
            fields: serde_json::Map::new(),
        }
    }

    pub fn identity(&self) -> CacheIdentity {
        CacheIdentity::new(&self.pkg_name, &self.pkg_version)
    }

    pub fn signature(&self) -> TaskSignature {
        TaskSignature::new(&self.task_file, &self.task_title)
    }
}

/// Persistence for task cache entries.
///
/// `load` checks identity at lookup time and reports a mismatch as
/// `CacheMismatch`; callers decide that it means "miss".
pub trait CacheStore: Send + Sync {
    fn load(&self, key: &TaskSignature, expected: &CacheIdentity) -> InsightResult<Option<TaskCacheEntry>>;
    fn save(&self, entry: &TaskCacheEntry) -> InsightResult<()>;
}

/// One JSON file per task signature under `dir`.
///
/// No locking: at most one process may write a given key at a time.
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &TaskSignature) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

impl CacheStore for FileCacheStore {
    fn load(&self, key: &TaskSignature, expected: &CacheIdentity) -> InsightResult<Option<TaskCacheEntry>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let entry: TaskCacheEntry = serde_json::from_str(&content)?;

        let found = entry.identity();
        if &found != expected {
            return Err(InsightError::CacheMismatch {
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        if entry.signature() != *key {
            // Hash prefix collision or a hand-edited file.
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn save(&self, entry: &TaskCacheEntry) -> InsightResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&entry.signature());
        let content = serde_json::to_string_pretty(entry)?;
        std::fs::write(&path, content)?;
        tracing::debug!(path = %path.display(), "cache entry written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_stable_and_distinct() {
        let a = TaskSignature::new("tests/login.yaml", "Sign in with email");
        let b = TaskSignature::new("tests/login.yaml", "Sign in with phone");
        assert_eq!(a.file_name(), a.clone().file_name());
        assert_ne!(a.file_name(), b.file_name());
        assert!(a.file_name().starts_with("login-sign-in-with-email-"));
        assert!(a.file_name().ends_with(".json"));
        assert!(TaskSignature::new("", "???").file_name().starts_with("task-task-"));
    }

    #[test]
    fn entry_serializes_identity_fields_in_camel_case() {
        let mut entry = TaskCacheEntry::new(&CacheIdentity::new("uisight", "0.1.0"), &TaskSignature::new("a.yaml", "t"));
        entry.fields.insert("records".into(), serde_json::json!([]));
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["pkgName"], "uisight");
        assert_eq!(v["pkgVersion"], "0.1.0");
        assert_eq!(v["taskFile"], "a.yaml");
        assert_eq!(v["taskTitle"], "t");
        assert_eq!(v["records"], serde_json::json!([]));
    }

    #[test]
    fn mismatched_identity_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        let sig = TaskSignature::new("a.yaml", "t");
        store.save(&TaskCacheEntry::new(&CacheIdentity::new("uisight", "0.0.9"), &sig)).unwrap();

        let err = store.load(&sig, &CacheIdentity::new("uisight", "0.1.0")).unwrap_err();
        assert!(matches!(err, InsightError::CacheMismatch { .. }));
        assert!(store.load(&TaskSignature::new("b.yaml", "t"), &CacheIdentity::engine()).unwrap().is_none());
    }
}
