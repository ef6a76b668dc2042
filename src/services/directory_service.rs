use crate::api::{self, DataStore, RetryPolicy};
use crate::configuration::Settings;
use crate::error::{DirectoryError, Result};
use crate::models::record::missing_fields;
use crate::models::{Collection, Fields, Query, Record, ResponseCache};
use crate::services::auth::{self, Authenticator, Claims, Role, Session};
use crate::utils::local_storage::LocalStorage;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_SHOP_STATUS: &str = "pending";

/// The data access client: one backend, a read cache in front of it and a
/// retry policy around every backend call.
pub struct DirectoryService {
    store: Arc<dyn DataStore>,
    cache: ResponseCache,
    retry: RetryPolicy,
    auth: Authenticator,
}

impl DirectoryService {
    pub fn new(
        store: Arc<dyn DataStore>,
        cache: ResponseCache,
        retry: RetryPolicy,
        auth: Authenticator,
    ) -> Self {
        Self {
            store,
            cache,
            retry,
            auth,
        }
    }

    /// Wires the configured backend, cache and auth over `storage`.
    pub fn from_settings(settings: &Settings, storage: Arc<LocalStorage>) -> Result<Self> {
        let store = api::connect(settings, &storage)?;
        let cache = ResponseCache::new(storage, settings.cache_ttl());
        Ok(Self::new(
            store,
            cache,
            settings.retry_policy(),
            Authenticator::new(&settings.auth),
        ))
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.name()
    }

    /// Records of `collection` matching `query`, newest first. Served from
    /// cache while fresh.
    pub async fn get(&self, collection: Collection, query: &Query) -> Result<Vec<Record>> {
        let key = query.cache_key(collection);
        if let Some(records) = self.cache.get(&key) {
            return Ok(records);
        }

        debug!("Cache miss for {}", key);
        let records = self.fetch_fresh(collection, query).await?;
        if let Err(e) = self.cache.insert(&key, &records) {
            warn!("Could not cache {}: {}", key, e);
        }
        Ok(records)
    }

    pub async fn save(&self, collection: Collection, mut fields: Fields) -> Result<Record> {
        let missing = missing_fields(self.store.required_fields(collection), &fields);
        if !missing.is_empty() {
            return Err(DirectoryError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }
        protect_password(collection, &mut fields);

        let mut record = Record::new(fields);
        if collection.is_approvable() {
            record.set("approved", false);
            record.set("rejected", false);
        }

        let store = &self.store;
        let pending = &record;
        let stored = self
            .retry
            .run("save", move || store.insert(collection, pending))
            .await;
        // Even a failed write may have landed.
        self.invalidate(collection);
        let stored = stored?;
        info!("Saved {}/{}", collection, stored.id);
        Ok(stored)
    }

    pub async fn update(&self, collection: Collection, id: &str, mut fields: Fields) -> Result<Record> {
        let id = id.trim();
        if id.is_empty() {
            return Err(DirectoryError::Validation("record id is required".into()));
        }
        protect_password(collection, &mut fields);

        let store = &self.store;
        let mut record = self
            .retry
            .run("fetch", move || store.fetch(collection, id))
            .await?;
        record.merge(fields);

        let merged = &record;
        let stored = self
            .retry
            .run("update", move || store.update(collection, merged))
            .await;
        // Even a failed write may have landed.
        self.invalidate(collection);
        let stored = stored?;
        info!("Updated {}/{}", collection, stored.id);
        Ok(stored)
    }

    pub async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let id = id.trim();
        if id.is_empty() {
            return Err(DirectoryError::Validation("record id is required".into()));
        }
        let store = &self.store;
        let outcome = self
            .retry
            .run("delete", move || store.delete(collection, id))
            .await;
        // Even a failed write may have landed.
        self.invalidate(collection);
        outcome?;
        info!("Deleted {}/{}", collection, id);
        Ok(())
    }

    /// Moderation decision: `approved` and `rejected` are always opposite.
    pub async fn approve(&self, collection: Collection, id: &str, approved: bool) -> Result<Record> {
        if !collection.is_approvable() {
            return Err(DirectoryError::Validation(format!(
                "{} entries are not moderated",
                collection
            )));
        }
        let mut fields = Fields::new();
        fields.insert("approved".to_string(), Value::Bool(approved));
        fields.insert("rejected".to_string(), Value::Bool(!approved));
        self.update(collection, id, fields).await
    }

    /// Moderated entries still waiting for a decision.
    pub async fn pending(&self, collection: Collection) -> Result<Vec<Record>> {
        if !collection.is_approvable() {
            return Err(DirectoryError::Validation(format!(
                "{} entries are not moderated",
                collection
            )));
        }
        Ok(self
            .get(collection, &Query::new())
            .await?
            .into_iter()
            .filter(Record::is_pending_review)
            .collect())
    }

    pub async fn login(&self, username: &str, password: &str, role: Role) -> Result<Session> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(DirectoryError::Authentication("username and password are required".into()));
        }

        let session = match role {
            Role::Admin => {
                if !self.auth.check_admin(username, password) {
                    return Err(DirectoryError::Authentication("invalid admin credentials".into()));
                }
                self.auth.issue(username, Role::Admin)?
            }
            Role::ShopOwner => {
                let query = Query::new().with_filter("phone", username);
                let shop = self
                    .get(Collection::Shops, &query)
                    .await?
                    .into_iter()
                    .find(|shop| {
                        shop.get_str("password")
                            .map(|stored| auth::verify_password(password, &stored))
                            .unwrap_or(false)
                    })
                    .ok_or_else(|| DirectoryError::Authentication("invalid shop credentials".into()))?;
                self.auth.issue(&shop.id, Role::ShopOwner)?
            }
        };
        info!("{} logged in as {}", session.claims.sub, role);
        Ok(session)
    }

    /// Creates a shop account. Phone numbers are unique across shops.
    pub async fn register(&self, mut fields: Fields) -> Result<Record> {
        let missing = missing_fields(self.store.required_fields(Collection::Shops), &fields);
        if !missing.is_empty() {
            return Err(DirectoryError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }
        let phone = fields
            .get("phone")
            .and_then(crate::models::record::value_as_string)
            .map(|p| p.trim().to_string())
            .unwrap_or_default();

        // Bypass the cache: a stale read here would let a duplicate through.
        let query = Query::new().with_filter("phone", phone.clone());
        if !self.fetch_fresh(Collection::Shops, &query).await?.is_empty() {
            return Err(DirectoryError::Conflict(format!("phone {} is already registered", phone)));
        }

        fields.insert("phone".to_string(), Value::String(phone));
        fields.insert("status".to_string(), Value::String(DEFAULT_SHOP_STATUS.to_string()));
        self.save(Collection::Shops, fields).await
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        self.auth.verify(token)
    }

    pub fn clear_cache(&self) -> Result<usize> {
        self.cache.clear()
    }

    async fn fetch_fresh(&self, collection: Collection, query: &Query) -> Result<Vec<Record>> {
        let store = &self.store;
        let records = self
            .retry
            .run("list", move || store.list(collection, query))
            .await?;
        Ok(query.apply(records))
    }

    fn invalidate(&self, collection: Collection) {
        if let Err(e) = self.cache.invalidate(collection) {
            warn!("Could not invalidate cache for {}: {}", collection, e);
        }
    }
}

/// Shop passwords are never written in the clear.
fn protect_password(collection: Collection, fields: &mut Fields) {
    if collection != Collection::Shops {
        return;
    }
    if let Some(Value::String(password)) = fields.get_mut("password") {
        if !password.is_empty() && !auth::is_hashed(password) {
            *password = auth::hash_password(password);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::MemoryStore;
    use crate::configuration::AuthSettings;
    use serde_json::json;
    use std::time::Duration;

    fn service() -> (DirectoryService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let cache = ResponseCache::new(Arc::new(LocalStorage::in_memory()), Duration::from_secs(300));
        let auth = Authenticator::new(&AuthSettings {
            admin_username: "admin".into(),
            admin_password_hash: auth::hash_password("letmein"),
            token_secret: "test-secret".into(),
            token_ttl_secs: 60,
        });
        (
            DirectoryService::new(store.clone(), cache, RetryPolicy::none(), auth),
            store,
        )
    }

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn new_offers_await_moderation() {
        let (svc, _) = service();
        let offer = svc
            .save(Collection::Offers, fields(json!({"title": "2 for 1", "shop_id": "s1"})))
            .await
            .unwrap();
        assert!(offer.is_pending_review());
        assert_eq!(svc.pending(Collection::Offers).await.unwrap().len(), 1);

        let approved = svc.approve(Collection::Offers, &offer.id, true).await.unwrap();
        assert!(approved.is_approved() && !approved.is_rejected());
        assert!(svc.pending(Collection::Offers).await.unwrap().is_empty());

        let rejected = svc.approve(Collection::Offers, &offer.id, false).await.unwrap();
        assert!(!rejected.is_approved() && rejected.is_rejected());
    }

    #[tokio::test]
    async fn approve_is_limited_to_moderated_collections() {
        let (svc, _) = service();
        assert!(matches!(
            svc.approve(Collection::News, "x", true).await,
            Err(DirectoryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn update_keeps_identity_and_bumps_timestamp() {
        let (svc, _) = service();
        let saved = svc
            .save(Collection::Emergency, fields(json!({"name": "Civil defence", "phone": "102"})))
            .await
            .unwrap();
        let updated = svc
            .update(Collection::Emergency, &saved.id, fields(json!({"phone": "101", "id": "other"})))
            .await
            .unwrap();
        assert_eq!(updated.id, saved.id);
        assert_eq!(updated.created_at, saved.created_at);
        assert!(updated.updated_at >= saved.updated_at);
        assert_eq!(updated.get_str("phone").as_deref(), Some("101"));
    }

    #[tokio::test]
    async fn update_and_delete_need_an_existing_id() {
        let (svc, _) = service();
        assert!(matches!(
            svc.update(Collection::News, " ", Fields::new()).await,
            Err(DirectoryError::Validation(_))
        ));
        assert!(matches!(
            svc.update(Collection::News, "nope", Fields::new()).await,
            Err(DirectoryError::NotFound(_))
        ));
        assert!(matches!(
            svc.delete(Collection::News, "nope").await,
            Err(DirectoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn shop_passwords_are_stored_hashed() {
        let (svc, store) = service();
        let shop = svc
            .save(Collection::Shops, fields(json!({"name": "Corner", "phone": "0599", "password": "pw"})))
            .await
            .unwrap();
        let stored = store.fetch(Collection::Shops, &shop.id).await.unwrap();
        let hash = stored.get_str("password").unwrap();
        assert!(auth::is_hashed(&hash));
        assert!(auth::verify_password("pw", &hash));
    }

    #[tokio::test]
    async fn shop_owner_logs_in_with_phone() {
        let (svc, _) = service();
        let shop = svc
            .register(fields(json!({"name": "Corner", "phone": "0599", "password": "pw"})))
            .await
            .unwrap();
        assert_eq!(shop.get_str("status").as_deref(), Some(DEFAULT_SHOP_STATUS));

        let session = svc.login("0599", "pw", Role::ShopOwner).await.unwrap();
        assert_eq!(session.claims.sub, shop.id);
        assert_eq!(svc.verify_token(&session.token).unwrap().role, Role::ShopOwner);

        assert!(matches!(
            svc.login("0599", "wrong", Role::ShopOwner).await,
            Err(DirectoryError::Authentication(_))
        ));
    }
}
