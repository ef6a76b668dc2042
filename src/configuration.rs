use crate::api::firestore::DEFAULT_FIRESTORE_URL;
use crate::api::RetryPolicy;
use crate::error::{DirectoryError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Script,
    Firestore,
    Supabase,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub backend: BackendKind,
    /// Per-request timeout; an expired request is aborted and retried.
    pub request_timeout_secs: u64,
    /// Local storage file. Unset keeps everything in memory.
    pub storage_path: Option<String>,
    pub script: ScriptSettings,
    pub firestore: FirestoreSettings,
    pub supabase: SupabaseSettings,
    pub cache: CacheSettings,
    pub retry: RetrySettings,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptSettings {
    /// Deployed web-app url, e.g. https://script.google.com/macros/s/<id>/exec
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirestoreSettings {
    pub base_url: String,
    pub project_id: String,
    /// From env: FIREBASE_API_KEY
    pub api_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupabaseSettings {
    /// From env: SUPABASE_URL
    pub url: String,
    /// From env: SUPABASE_KEY
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    pub admin_username: String,
    /// Output of `hash_password`; admin login is disabled while empty.
    pub admin_password_hash: String,
    /// HMAC key for session tokens. A random one is generated when empty,
    /// which invalidates tokens on restart.
    pub token_secret: String,
    pub token_ttl_secs: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Script,
            request_timeout_secs: 10,
            storage_path: None,
            script: ScriptSettings::default(),
            firestore: FirestoreSettings {
                base_url: DEFAULT_FIRESTORE_URL.to_string(),
                project_id: String::new(),
                api_key: String::new(),
            },
            supabase: SupabaseSettings::default(),
            cache: CacheSettings { ttl_secs: 300 },
            retry: RetrySettings {
                max_attempts: 3,
                base_delay_ms: 1000,
            },
            auth: AuthSettings {
                admin_username: "admin".to_string(),
                admin_password_hash: String::new(),
                token_secret: String::new(),
                token_ttl_secs: 8 * 60 * 60,
            },
        }
    }
}

impl Settings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
        )
    }

    /// Backend credentials usually come from the environment rather than
    /// the configuration file.
    fn apply_env_credentials(&mut self) {
        if let Ok(key) = std::env::var("FIREBASE_API_KEY") {
            self.firestore.api_key = key;
        }
        if let Ok(project) = std::env::var("FIREBASE_PROJECT_ID") {
            self.firestore.project_id = project;
        }
        if let Ok(url) = std::env::var("SUPABASE_URL") {
            self.supabase.url = url;
        }
        if let Ok(key) = std::env::var("SUPABASE_KEY") {
            self.supabase.api_key = key;
        }
    }

    /// Checks that the selected backend has what it needs to connect.
    pub fn validate(&self) -> Result<()> {
        let missing = match self.backend {
            BackendKind::Firestore if self.firestore.project_id.is_empty() => {
                Some("firestore.project_id (FIREBASE_PROJECT_ID)")
            }
            BackendKind::Firestore if self.firestore.api_key.is_empty() => {
                Some("firestore.api_key (FIREBASE_API_KEY)")
            }
            BackendKind::Supabase if self.supabase.url.is_empty() => Some("supabase.url (SUPABASE_URL)"),
            BackendKind::Supabase if self.supabase.api_key.is_empty() => {
                Some("supabase.api_key (SUPABASE_KEY)")
            }
            _ => None,
        };
        match missing {
            Some(name) => Err(DirectoryError::Config(format!("{} is not set", name))),
            None => Ok(()),
        }
    }
}

/// Defaults, then an optional `configuration.{yaml,toml,json}` in the
/// working directory, then `DIRECTORY__*` variables (`DIRECTORY__CACHE__TTL_SECS=60`).
pub fn get_configuration() -> Result<Settings> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let settings = config::Config::builder()
        .add_source(config::Config::try_from(&Settings::default())?)
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("DIRECTORY")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    let mut config: Settings = settings.try_deserialize()?;
    config.apply_env_credentials();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let settings = Settings::default();
        assert_eq!(settings.cache_ttl(), Duration::from_secs(300));
        assert_eq!(settings.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn selected_backend_must_be_configured() {
        let mut settings = Settings::default();
        settings.backend = BackendKind::Supabase;
        assert!(matches!(settings.validate(), Err(DirectoryError::Config(_))));

        settings.supabase.url = "https://abc.supabase.co".into();
        settings.supabase.api_key = "anon".into();
        assert!(settings.validate().is_ok());

        settings.backend = BackendKind::Memory;
        assert!(settings.validate().is_ok());
    }
}
