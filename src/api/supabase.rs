use super::datastore::{not_found, DataStore};
use super::ensure_success;
use crate::error::Result;
use crate::models::{Collection, Query, Record};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use tracing::debug;

/// Supabase tables through PostgREST, one table per collection.
pub struct SupabaseStore {
    client: Client,
    url: String,
    api_key: String,
}

impl SupabaseStore {
    pub fn new(client: Client, url: &str, api_key: &str) -> Self {
        Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn table_url(&self, collection: Collection) -> String {
        format!("{}/rest/v1/{}", self.url, collection)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    fn eq(id: &str) -> String {
        format!("eq.{}", id)
    }

    async fn rows(&self, request: RequestBuilder, context: &str) -> Result<Vec<Record>> {
        let response = self.authorize(request).send().await?;
        let response = ensure_success(response, context).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl DataStore for SupabaseStore {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn list(&self, collection: Collection, query: &Query) -> Result<Vec<Record>> {
        let mut params: Vec<(String, String)> = vec![
            ("select".to_string(), "*".to_string()),
            ("order".to_string(), "created_at.desc".to_string()),
        ];
        params.extend(query.filter.iter().map(|(k, v)| (k.clone(), Self::eq(v))));
        debug!("Selecting {} with {} filters", collection, query.filter.len());

        let request = self.client.get(self.table_url(collection)).query(&params);
        self.rows(request, &format!("select {}", collection)).await
    }

    async fn fetch(&self, collection: Collection, id: &str) -> Result<Record> {
        let request = self
            .client
            .get(self.table_url(collection))
            .query(&[("select", "*".to_string()), ("id", Self::eq(id))]);
        self.rows(request, &format!("select {}/{}", collection, id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(collection, id))
    }

    async fn insert(&self, collection: Collection, record: &Record) -> Result<Record> {
        let request = self
            .client
            .post(self.table_url(collection))
            .header("Prefer", "return=representation")
            .json(record);
        Ok(self
            .rows(request, &format!("insert {}", collection))
            .await?
            .into_iter()
            .next()
            .unwrap_or_else(|| record.clone()))
    }

    async fn update(&self, collection: Collection, record: &Record) -> Result<Record> {
        let request = self
            .client
            .patch(self.table_url(collection))
            .query(&[("id", Self::eq(&record.id))])
            .header("Prefer", "return=representation")
            .json(record);
        self.rows(request, &format!("update {}/{}", collection, record.id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(collection, &record.id))
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let request = self
            .client
            .delete(self.table_url(collection))
            .query(&[("id", Self::eq(id))])
            .header("Prefer", "return=representation");
        let deleted = self.rows(request, &format!("delete {}/{}", collection, id)).await?;
        if deleted.is_empty() {
            return Err(not_found(collection, id));
        }
        Ok(())
    }
}
