use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{HttpSettings, Settings};
use crate::credentials::{CredentialProvider, StoreCredentials};
use crate::error::BridgeError;
use crate::store::{keys, ConfigStore};

/// Initialize dotenv and structured tracing based on RUST_LOG.
///
/// - Explicit env file paths are honoured via ENV_FILE or DOTENV_PATH
/// - Falls back to `.env` discovery in the working directory
/// - Logs the source used
pub fn init_tracing() {
    let mut env_source: String = "none".into();
    for key in ["ENV_FILE", "DOTENV_PATH"] {
        if let Ok(p) = std::env::var(key) {
            let p = p.trim();
            if !p.is_empty()
                && std::path::Path::new(p).is_file()
                && dotenvy::from_filename(p).is_ok()
            {
                env_source = format!("{p} ({key})");
                break;
            }
        }
    }
    if env_source == "none" && dotenvy::dotenv().is_ok() {
        env_source = ".env".into();
    }

    // RUST_LOG may come from the env file loaded above.
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=info".into());
    let subscriber = fmt().with_env_filter(EnvFilter::new(filter)).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    tracing::info!("Environment loaded from: {}", env_source);
}

/// `<prefix>_<32 hex chars>`, e.g. `msg_…` or `toolu_…`.
pub fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

/// Shared application state used by the HTTP server and handlers.
#[derive(Clone)]
pub struct AppState {
    pub http: reqwest::Client,
    pub store: Arc<dyn ConfigStore>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Wire up state with store-backed credentials. `UPSTREAM_API_KEY` is the fallback
    /// bearer token when the store holds neither an api key nor a refresh token.
    pub fn new(settings: Settings, store: Arc<dyn ConfigStore>) -> Self {
        let http = build_http_client(&settings.http);
        let credentials = Arc::new(StoreCredentials::new(
            store.clone(),
            http.clone(),
            settings.upstream_api_key.clone(),
        ));
        Self {
            http,
            store,
            credentials,
            settings: Arc::new(settings),
        }
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Upstream base URL: the store wins, the environment is the fallback.
    pub async fn upstream_base_url(&self) -> Result<Option<String>, BridgeError> {
        Ok(self
            .store
            .get(keys::UPSTREAM_BASE_URL)
            .await?
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.settings.upstream_base_url.clone()))
    }

    pub async fn upstream_path(&self) -> Result<String, BridgeError> {
        Ok(self
            .store
            .get(keys::UPSTREAM_PATH)
            .await?
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.settings.upstream_path.clone()))
    }

    /// Full Chat Completions endpoint, or `NotConfigured` when no base URL is known.
    pub async fn upstream_url(&self) -> Result<String, BridgeError> {
        let base = self
            .upstream_base_url()
            .await?
            .ok_or(BridgeError::NotConfigured)?;
        let path = self.upstream_path().await?;
        Ok(join_url(&base, &path))
    }

    /// Verify an `Authorization: Bearer` header against `ADMIN_KEY`. Always fails when no
    /// admin key is configured.
    pub fn verify_admin(&self, headers: &http::HeaderMap) -> Result<(), BridgeError> {
        let Some(admin_key) = self.settings.admin_key.as_deref() else {
            return Err(BridgeError::Unauthorized);
        };
        let presented = headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented == Some(admin_key) {
            Ok(())
        } else {
            Err(BridgeError::Unauthorized)
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() || path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Build an HTTP client honoring proxy and timeout settings.
pub fn build_http_client(settings: &HttpSettings) -> reqwest::Client {
    let mut builder = reqwest::Client::builder();

    if let Some(timeout) = settings.timeout {
        builder = builder.timeout(timeout);
    }

    if settings.no_proxy {
        builder = builder.no_proxy();
    } else {
        if let Some(u) = settings.proxy_url.as_deref() {
            match reqwest::Proxy::all(u) {
                Ok(p) => builder = builder.proxy(p),
                Err(e) => tracing::warn!("Ignoring invalid BRIDGE_PROXY_URL: {}", e),
            }
        }
        if let Some(u) = settings.http_proxy.as_deref() {
            if let Ok(p) = reqwest::Proxy::http(u) {
                builder = builder.proxy(p);
            }
        }
        if let Some(u) = settings.https_proxy.as_deref() {
            if let Ok(p) = reqwest::Proxy::https(u) {
                builder = builder.proxy(p);
            }
        }
    }

    builder = builder.user_agent(format!("messages2chat/{}", env!("CARGO_PKG_VERSION")));

    builder.build().unwrap_or_else(|e| {
        tracing::warn!("Falling back to default HTTP client: {}", e);
        reqwest::Client::new()
    })
}

/// Build a CORS layer from environment variables.
///
/// Environment:
/// - CORS_ALLOWED_ORIGINS: comma-separated list or "*"
/// - CORS_ALLOWED_METHODS: comma-separated list or "*"
/// - CORS_ALLOWED_HEADERS: comma-separated list or "*"
/// - CORS_MAX_AGE: max age in seconds (u64)
///
/// Unset means permissive (Any).
pub fn cors_layer_from_env() -> tower_http::cors::CorsLayer {
    use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};

    let list = |key: &str| -> Option<Vec<String>> {
        let raw = std::env::var(key).ok()?;
        let raw = raw.trim();
        if raw.is_empty() || raw == "*" {
            return None;
        }
        let items: Vec<String> = raw
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        (!items.is_empty()).then_some(items)
    };

    let mut layer = CorsLayer::new();

    let origins: Vec<http::HeaderValue> = list("CORS_ALLOWED_ORIGINS")
        .unwrap_or_default()
        .iter()
        .filter_map(|o| http::HeaderValue::from_str(o).ok())
        .collect();
    layer = if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    };

    let methods: Vec<http::Method> = list("CORS_ALLOWED_METHODS")
        .unwrap_or_default()
        .iter()
        .filter_map(|m| http::Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
        .collect();
    layer = if methods.is_empty() {
        layer.allow_methods(Any)
    } else {
        layer.allow_methods(AllowMethods::list(methods))
    };

    let headers: Vec<http::HeaderName> = list("CORS_ALLOWED_HEADERS")
        .unwrap_or_default()
        .iter()
        .filter_map(|h| http::HeaderName::try_from(h.as_str()).ok())
        .collect();
    layer = if headers.is_empty() {
        layer.allow_headers(Any)
    } else {
        layer.allow_headers(AllowHeaders::list(headers))
    };

    if let Ok(secs) = std::env::var("CORS_MAX_AGE") {
        if let Ok(n) = secs.trim().parse::<u64>() {
            layer = layer.max_age(std::time::Duration::from_secs(n));
        }
    }

    layer
}
