use crate::error::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Small persistent key-value store, one JSON object per file.
///
/// Without a path it lives only in memory. Every write rewrites the file.
pub struct LocalStorage {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl LocalStorage {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Loads `path` if it exists. An unreadable or corrupt file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                debug!("Ignoring corrupt local storage {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("Opened local storage {} with {} keys", path.display(), entries.len());
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.lock();
        entries.insert(key.to_string(), value);
        self.persist(&entries)
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        let mut entries = self.lock();
        let removed = entries.remove(key).is_some();
        if removed {
            self.persist(&entries)?;
        }
        Ok(removed)
    }

    /// Drops every key for which `pred` holds and returns how many went.
    pub fn remove_where(&self, pred: impl Fn(&str) -> bool) -> Result<usize> {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|k, _| !pred(k));
        let removed = before - entries.len();
        if removed > 0 {
            self.persist(&entries)?;
        }
        Ok(removed)
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_vec(entries)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        let storage = LocalStorage::open(&path).unwrap();
        storage.set("api_base_url", json!("https://example.test/exec")).unwrap();
        storage.set("cache_news", json!({"data": []})).unwrap();
        drop(storage);

        let reopened = LocalStorage::open(&path).unwrap();
        assert_eq!(reopened.get("api_base_url"), Some(json!("https://example.test/exec")));
        assert_eq!(reopened.keys().len(), 2);
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "{not json").unwrap();

        let storage = LocalStorage::open(&path).unwrap();
        assert!(storage.keys().is_empty());
    }

    #[test]
    fn remove_where_reports_count() {
        let storage = LocalStorage::in_memory();
        storage.set("cache_a", json!(1)).unwrap();
        storage.set("cache_b", json!(2)).unwrap();
        storage.set("api_base_url", json!("x")).unwrap();

        assert_eq!(storage.remove_where(|k| k.starts_with("cache_")).unwrap(), 2);
        assert_eq!(storage.keys(), vec!["api_base_url".to_string()]);
        assert!(!storage.remove("cache_a").unwrap());
    }
}
