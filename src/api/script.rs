use super::datastore::DataStore;
use super::ensure_success;
use crate::error::{DirectoryError, Result};
use crate::models::{Collection, Query, Record};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Apps Script web-app endpoint. Every call is a POST of
/// `{"action", "type", "data"}` answered by `{"success", "data", "error"}`.
pub struct ScriptStore {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct Envelope<'a> {
    action: &'a str,
    #[serde(rename = "type")]
    kind: Collection,
    data: Value,
}

#[derive(Deserialize)]
struct ScriptResponse {
    success: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<String>,
}

impl ScriptStore {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim().to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call(&self, action: &str, collection: Collection, data: Value) -> Result<Value> {
        debug!("Sending {} {} to script endpoint", action, collection);
        let envelope = Envelope {
            action,
            kind: collection,
            data,
        };
        let response = self.client.post(&self.base_url).json(&envelope).send().await?;
        let response = ensure_success(response, &format!("{} {}", action, collection)).await?;
        let body: ScriptResponse = response.json().await?;

        if body.success {
            return Ok(body.data);
        }
        let message = body.error.unwrap_or_else(|| "request rejected".to_string());
        let lowered = message.to_lowercase();
        Err(if lowered.contains("not found") {
            DirectoryError::NotFound(format!("{}: {}", collection, message))
        } else if lowered.contains("required") || lowered.contains("missing") {
            DirectoryError::Validation(message)
        } else {
            DirectoryError::InvalidResponse(message)
        })
    }

    /// The script answers writes with the stored record; older deployments
    /// answer with nothing, in which case what was sent is what was stored.
    fn record_or(data: Value, sent: &Record) -> Result<Record> {
        match data {
            Value::Object(_) => Ok(serde_json::from_value(data)?),
            _ => Ok(sent.clone()),
        }
    }
}

#[async_trait]
impl DataStore for ScriptStore {
    fn name(&self) -> &'static str {
        "script"
    }

    async fn list(&self, collection: Collection, _query: &Query) -> Result<Vec<Record>> {
        let data = self.call("get", collection, json!({})).await?;
        match data {
            Value::Array(_) => Ok(serde_json::from_value(data)?),
            Value::Null => Ok(Vec::new()),
            other => Err(DirectoryError::InvalidResponse(format!(
                "expected a list of {}, got {}",
                collection, other
            ))),
        }
    }

    async fn insert(&self, collection: Collection, record: &Record) -> Result<Record> {
        let data = self.call("save", collection, serde_json::to_value(record)?).await?;
        Self::record_or(data, record)
    }

    async fn update(&self, collection: Collection, record: &Record) -> Result<Record> {
        let data = self.call("update", collection, serde_json::to_value(record)?).await?;
        Self::record_or(data, record)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        self.call("delete", collection, json!({ "id": id })).await?;
        Ok(())
    }
}
