use crate::error::{DirectoryError, Result};
use crate::models::{Collection, Query, Record};
use async_trait::async_trait;

/// One persistence backend. Implementations only move records; validation,
/// caching and retry live in the service in front of them.
#[async_trait]
pub trait DataStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fields this backend refuses to store a record without.
    fn required_fields(&self, collection: Collection) -> &'static [&'static str] {
        collection.required_fields()
    }

    /// All records of `collection`. Backends that can narrow the read
    /// server-side may use `query`; callers re-apply it either way.
    async fn list(&self, collection: Collection, query: &Query) -> Result<Vec<Record>>;

    async fn fetch(&self, collection: Collection, id: &str) -> Result<Record> {
        self.list(collection, &Query::new())
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| not_found(collection, id))
    }

    async fn insert(&self, collection: Collection, record: &Record) -> Result<Record>;

    /// Replaces the stored record with the same id.
    async fn update(&self, collection: Collection, record: &Record) -> Result<Record>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<()>;
}

pub fn not_found(collection: Collection, id: &str) -> DirectoryError {
    DirectoryError::NotFound(format!("{}/{}", collection, id))
}
