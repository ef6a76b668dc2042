use super::datastore::{not_found, DataStore};
use crate::error::Result;
use crate::models::{Collection, Query, Record};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Process-local backend. Counts reads so callers can see whether a
/// request reached the store or was served from cache.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<Collection, Vec<Record>>>,
    reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.lock().get(&collection).map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Collection, Vec<Record>>> {
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn list(&self, collection: Collection, _query: &Query) -> Result<Vec<Record>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.lock().get(&collection).cloned().unwrap_or_default())
    }

    async fn fetch(&self, collection: Collection, id: &str) -> Result<Record> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.lock()
            .get(&collection)
            .and_then(|records| records.iter().find(|r| r.id == id).cloned())
            .ok_or_else(|| not_found(collection, id))
    }

    async fn insert(&self, collection: Collection, record: &Record) -> Result<Record> {
        self.lock()
            .entry(collection)
            .or_default()
            .push(record.clone());
        Ok(record.clone())
    }

    async fn update(&self, collection: Collection, record: &Record) -> Result<Record> {
        let mut collections = self.lock();
        let slot = collections
            .get_mut(&collection)
            .and_then(|records| records.iter_mut().find(|r| r.id == record.id))
            .ok_or_else(|| not_found(collection, &record.id))?;
        *slot = record.clone();
        Ok(record.clone())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let mut collections = self.lock();
        let records = collections.entry(collection).or_default();
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(not_found(collection, id));
        }
        Ok(())
    }
}
