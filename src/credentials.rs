use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::BridgeError;
use crate::store::{keys, ConfigStore};

/// Refresh this many seconds before the stored token expires.
const REFRESH_MARGIN_SECS: u64 = 60;
const DEFAULT_EXPIRES_IN: u64 = 3600;

/// Source of the bearer token used for upstream calls.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn token(&self) -> Result<String, BridgeError>;
}

/// Always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn token(&self) -> Result<String, BridgeError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Credentials kept in the config store.
///
/// Resolution order:
/// 1. `api_key` in the store;
/// 2. `access_token`, unless missing or within a minute of `expires_at`, in which case it is
///    refreshed through `refresh_url` with the stored `refresh_token`;
/// 3. the static fallback key (from `UPSTREAM_API_KEY`) when no refresh token exists.
pub struct StoreCredentials {
    store: Arc<dyn ConfigStore>,
    http: reqwest::Client,
    fallback_key: Option<String>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl StoreCredentials {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        http: reqwest::Client,
        fallback_key: Option<String>,
    ) -> Self {
        Self {
            store,
            http,
            fallback_key: fallback_key.filter(|k| !k.trim().is_empty()),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn stored_api_key(&self) -> Result<Option<String>, BridgeError> {
        Ok(self
            .store
            .get(keys::API_KEY)
            .await?
            .filter(|k| !k.trim().is_empty()))
    }

    /// Stored access token if it is present and not about to expire.
    async fn fresh_access_token(&self) -> Result<Option<String>, BridgeError> {
        let token = self
            .store
            .get(keys::ACCESS_TOKEN)
            .await?
            .filter(|t| !t.is_empty());
        let expires_at = self
            .store
            .get(keys::EXPIRES_AT)
            .await?
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(0);
        Ok(token.filter(|_| expires_at.saturating_sub(now_secs()) >= REFRESH_MARGIN_SECS))
    }

    async fn refresh(&self) -> Result<String, BridgeError> {
        let refresh_token = match self.store.get(keys::REFRESH_TOKEN).await? {
            Some(t) if !t.is_empty() => t,
            _ => {
                if let Some(key) = self.stored_api_key().await?.or(self.fallback_key.clone()) {
                    return Ok(key);
                }
                return Err(BridgeError::Credentials(
                    "Missing refresh_token or api_key in config store".into(),
                ));
            }
        };
        let refresh_url = self
            .store
            .get(keys::REFRESH_URL)
            .await?
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                BridgeError::Credentials("Missing refresh_url in config store".into())
            })?;

        tracing::info!("Refreshing upstream access token");
        let resp = self
            .http
            .post(&refresh_url)
            .json(&serde_json::json!({
                "refresh_token": refresh_token,
                "grant_type": "refresh_token",
            }))
            .send()
            .await
            .map_err(|e| BridgeError::Credentials(format!("Failed to refresh token: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(BridgeError::Credentials(format!(
                "Failed to refresh token: {} - {}",
                status.as_u16(),
                crate::error::truncate(&text)
            )));
        }

        let data: RefreshResponse = resp.json().await.map_err(|e| {
            BridgeError::Credentials(format!("Failed to parse refresh response: {e}"))
        })?;
        let expires_at = now_secs() + data.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        self.store
            .put(keys::ACCESS_TOKEN, &data.access_token)
            .await?;
        self.store
            .put(keys::EXPIRES_AT, &expires_at.to_string())
            .await?;
        if let Some(rt) = data.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            self.store.put(keys::REFRESH_TOKEN, rt).await?;
        }
        tracing::debug!(expires_at, "access token refreshed");
        Ok(data.access_token)
    }
}

#[async_trait]
impl CredentialProvider for StoreCredentials {
    async fn token(&self) -> Result<String, BridgeError> {
        if let Some(key) = self.stored_api_key().await? {
            return Ok(key);
        }
        if let Some(token) = self.fresh_access_token().await? {
            return Ok(token);
        }

        // Concurrent requests wait for a single refresh, then reuse its result.
        let _guard = self.refresh_lock.lock().await;
        if let Some(token) = self.fresh_access_token().await? {
            return Ok(token);
        }
        self.refresh().await
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}
