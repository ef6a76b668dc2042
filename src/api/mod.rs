pub mod datastore;
pub mod firestore;
pub mod memory;
pub mod retry;
pub mod script;
pub mod supabase;

pub use datastore::DataStore;
pub use retry::RetryPolicy;

use crate::configuration::{BackendKind, Settings};
use crate::error::{DirectoryError, Result};
use crate::utils::local_storage::LocalStorage;
use reqwest::{Client, Response};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Local storage key holding the user's override of the script endpoint.
pub const BASE_URL_KEY: &str = "api_base_url";

/// Builds the backend named in `settings`.
pub fn connect(settings: &Settings, storage: &LocalStorage) -> Result<Arc<dyn DataStore>> {
    let client = Client::builder()
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .build()?;

    let store: Arc<dyn DataStore> = match settings.backend {
        BackendKind::Script => {
            let url = base_url_override(storage).unwrap_or_else(|| settings.script.base_url.clone());
            if url.trim().is_empty() {
                return Err(DirectoryError::Config("script.base_url is not set".into()));
            }
            Arc::new(script::ScriptStore::new(client, &url))
        }
        BackendKind::Firestore => Arc::new(firestore::FirestoreStore::new(
            client,
            &settings.firestore.base_url,
            &settings.firestore.project_id,
            &settings.firestore.api_key,
        )),
        BackendKind::Supabase => Arc::new(supabase::SupabaseStore::new(
            client,
            &settings.supabase.url,
            &settings.supabase.api_key,
        )),
        BackendKind::Memory => Arc::new(memory::MemoryStore::new()),
    };
    info!("Using {} backend", store.name());
    Ok(store)
}

pub fn base_url_override(storage: &LocalStorage) -> Option<String> {
    storage
        .get(BASE_URL_KEY)
        .and_then(|v| v.as_str().map(str::to_string))
        .filter(|url| !url.trim().is_empty())
}

/// Persists a new script endpoint. An empty url clears the override.
pub fn set_base_url_override(storage: &LocalStorage, url: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        storage.remove(BASE_URL_KEY)?;
        return Ok(());
    }
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(DirectoryError::Validation(format!(
            "'{}' is not an http(s) url",
            url
        )));
    }
    storage.set(BASE_URL_KEY, Value::String(url.to_string()))
}

/// Passes 2xx responses through and turns anything else into an error,
/// keeping the body for the log.
pub(crate) async fn ensure_success(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    debug!("{} answered {}: {}", context, status, body);
    Err(DirectoryError::from_status(status, context))
}
