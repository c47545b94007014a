//! Process configuration: environment settings and store seed files.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::error::BridgeError;
use crate::store::{keys, ConfigStore};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8088";
pub const DEFAULT_UPSTREAM_PATH: &str = "/chat/completions";
pub const DEFAULT_MODEL: &str = "Qwen3-Max";

/// Outbound HTTP client options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpSettings {
    pub timeout: Option<Duration>,
    /// Disable every proxy, including the `HTTP(S)_PROXY` ones.
    pub no_proxy: bool,
    /// Proxy for all schemes.
    pub proxy_url: Option<String>,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
}

/// Settings read once at startup.
///
/// Values in the config store take precedence over the upstream settings here; these act as
/// fallbacks for deployments that configure everything through the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bind_addr: String,
    pub upstream_base_url: Option<String>,
    pub upstream_path: String,
    pub upstream_api_key: Option<String>,
    pub admin_key: Option<String>,
    pub default_model: String,
    pub store_path: Option<String>,
    pub http: HttpSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            upstream_base_url: None,
            upstream_path: DEFAULT_UPSTREAM_PATH.to_string(),
            upstream_api_key: None,
            admin_key: None,
            default_model: DEFAULT_MODEL.to_string(),
            store_path: None,
            http: HttpSettings::default(),
        }
    }
}

impl Settings {
    /// Environment:
    /// - BIND_ADDR                      -> listen address (default 0.0.0.0:8088)
    /// - UPSTREAM_BASE_URL              -> upstream base URL
    /// - UPSTREAM_PATH                  -> upstream path (default /chat/completions)
    /// - UPSTREAM_API_KEY               -> static bearer token
    /// - ADMIN_KEY                      -> bearer token for /admin/config
    /// - DEFAULT_MODEL                  -> model reported when a request names none
    /// - BRIDGE_STORE_PATH              -> sled database directory
    /// - BRIDGE_HTTP_TIMEOUT_SECONDS    -> overall upstream request timeout (u64)
    /// - BRIDGE_NO_PROXY = 1|true|yes|on -> disable all proxies
    /// - BRIDGE_PROXY_URL               -> proxy for all schemes
    /// - HTTP_PROXY / HTTPS_PROXY (or lowercase) -> scheme-specific proxies
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let admin_key = get("ADMIN_KEY").filter(|k| k != "your-admin-key-here");

        Self {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            upstream_base_url: get("UPSTREAM_BASE_URL"),
            upstream_path: get("UPSTREAM_PATH").unwrap_or(defaults.upstream_path),
            upstream_api_key: get("UPSTREAM_API_KEY"),
            admin_key,
            default_model: get("DEFAULT_MODEL").unwrap_or(defaults.default_model),
            store_path: get("BRIDGE_STORE_PATH"),
            http: HttpSettings {
                timeout: get("BRIDGE_HTTP_TIMEOUT_SECONDS")
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs),
                no_proxy: get("BRIDGE_NO_PROXY")
                    .map(|v| is_truthy(&v))
                    .unwrap_or(false),
                proxy_url: get("BRIDGE_PROXY_URL"),
                http_proxy: get("HTTP_PROXY").or_else(|| get("http_proxy")),
                https_proxy: get("HTTPS_PROXY").or_else(|| get("https_proxy")),
            },
        }
    }
}

fn is_truthy(v: &str) -> bool {
    matches!(
        v.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Convert a JSON value into its stored text form: strings verbatim, objects and arrays as
/// JSON text, scalars via their JSON rendering. `null` means "leave untouched".
pub fn store_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Initial store contents loaded from a JSON file passed with `--config=<file>`.
///
/// ```json
/// {
///   "upstream_base_url": "https://apis.example.com/v1",
///   "api_key": "sk-...",
///   "model_mapping": { "claude-sonnet-4-5": "Qwen3-Max" }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSeed {
    pub entries: Vec<(String, String)>,
    /// Keys present in the file that are not writable store keys.
    pub ignored: Vec<String>,
}

impl ConfigSeed {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config seed file: {}", path.as_ref().display())
        })?;
        let value: Value =
            serde_json::from_str(&content).with_context(|| "Failed to parse config seed JSON")?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .context("Config seed must be a JSON object")?;
        let mut seed = ConfigSeed::default();
        for (k, v) in obj {
            if !keys::WRITABLE.contains(&k.as_str()) {
                seed.ignored.push(k.clone());
                continue;
            }
            if let Some(text) = store_value(v) {
                seed.entries.push((k.clone(), text));
            }
        }
        Ok(seed)
    }

    /// Write every entry into `store`. Returns the number of keys written.
    pub async fn apply(&self, store: &dyn ConfigStore) -> Result<usize, BridgeError> {
        for (k, v) in &self.entries {
            store.put(k, v).await?;
        }
        if !self.ignored.is_empty() {
            tracing::warn!(keys = ?self.ignored, "ignoring unknown config seed keys");
        }
        Ok(self.entries.len())
    }
}
