//! Key-value configuration store.
//!
//! The bridge keeps its mutable configuration (upstream endpoint, credentials, model
//! aliases) behind the narrow `ConfigStore` interface. Nothing else in the crate touches a
//! storage backend directly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::BridgeError;

/// Well-known store keys.
pub mod keys {
    pub const UPSTREAM_BASE_URL: &str = "upstream_base_url";
    pub const UPSTREAM_PATH: &str = "upstream_path";
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const API_KEY: &str = "api_key";
    pub const EXPIRES_AT: &str = "expires_at";
    pub const REFRESH_URL: &str = "refresh_url";
    pub const MODEL_MAPPING: &str = "model_mapping";

    /// Keys the admin endpoint and seed files are allowed to write.
    pub const WRITABLE: [&str; 8] = [
        UPSTREAM_BASE_URL,
        UPSTREAM_PATH,
        ACCESS_TOKEN,
        REFRESH_TOKEN,
        API_KEY,
        EXPIRES_AT,
        REFRESH_URL,
        MODEL_MAPPING,
    ];
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, BridgeError>;
    async fn put(&self, key: &str, value: &str) -> Result<(), BridgeError>;
}

/// Process-local store; contents are lost on restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, BridgeError> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), BridgeError> {
        self.inner
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Persistent store backed by an embedded sled database.
#[cfg(feature = "sled")]
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

#[cfg(feature = "sled")]
impl SledStore {
    pub fn open(path: &str) -> Result<Self, BridgeError> {
        let db = sled::open(path).map_err(|e| BridgeError::Store(e.to_string()))?;
        Ok(Self { db })
    }
}

#[cfg(feature = "sled")]
#[async_trait]
impl ConfigStore for SledStore {
    async fn get(&self, key: &str) -> Result<Option<String>, BridgeError> {
        let value = self
            .db
            .get(key.as_bytes())
            .map_err(|e| BridgeError::Store(e.to_string()))?;
        Ok(value.map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), BridgeError> {
        self.db
            .insert(key.as_bytes(), value.as_bytes())
            .map_err(|e| BridgeError::Store(e.to_string()))?;
        self.db
            .flush_async()
            .await
            .map_err(|e| BridgeError::Store(e.to_string()))?;
        Ok(())
    }
}

/// Open the store selected by `store_path`: sled when a path is given and the `sled`
/// feature is enabled, memory otherwise.
pub fn open_store(store_path: Option<&str>) -> Result<Arc<dyn ConfigStore>, BridgeError> {
    #[cfg(feature = "sled")]
    if let Some(path) = store_path {
        tracing::info!("Opening sled config store at {}", path);
        return Ok(Arc::new(SledStore::open(path)?));
    }

    #[cfg(not(feature = "sled"))]
    if let Some(path) = store_path {
        tracing::warn!(
            "BRIDGE_STORE_PATH={} ignored: built without the `sled` feature",
            path
        );
    }

    tracing::info!("Using in-memory config store");
    Ok(Arc::new(MemoryStore::new()))
}
