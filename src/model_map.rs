use std::collections::HashMap;

use crate::store::{keys, ConfigStore};

/// Maps the model a client asked for to the model name the upstream understands.
pub trait ModelResolver {
    /// Total: unmapped names resolve to themselves.
    fn resolve(&self, requested: &str) -> String;
}

/// Identity resolver.
impl ModelResolver for () {
    fn resolve(&self, requested: &str) -> String {
        requested.to_string()
    }
}

/// Alias table loaded from the `model_mapping` store key (a JSON object of
/// `requested -> upstream` names).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelMapping {
    aliases: HashMap<String, String>,
}

impl ModelMapping {
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self { aliases }
    }

    /// Parse the stored JSON text. Non-string values are skipped.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text)?;
        let aliases = raw
            .into_iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
            .collect();
        Ok(Self { aliases })
    }

    /// Load from the store. A missing key, a store failure or malformed JSON all yield an
    /// empty mapping so that model names pass through unchanged.
    pub async fn load(store: &dyn ConfigStore) -> Self {
        let text = match store.get(keys::MODEL_MAPPING).await {
            Ok(Some(t)) => t,
            Ok(None) => return Self::default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read model_mapping; using identity");
                return Self::default();
            }
        };
        match Self::parse(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(error = %e, "failed to parse model_mapping");
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

impl ModelResolver for ModelMapping {
    fn resolve(&self, requested: &str) -> String {
        self.aliases
            .get(requested)
            .cloned()
            .unwrap_or_else(|| requested.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn mapping_with_identity_fallback() {
        let m = ModelMapping::parse(r#"{"claude-3-5-sonnet": "Qwen3-Max", "bad": 3}"#).unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m.resolve("claude-3-5-sonnet"), "Qwen3-Max");
        assert_eq!(m.resolve("GLM-4.6"), "GLM-4.6");
        assert_eq!(().resolve("anything"), "anything");
    }

    #[tokio::test]
    async fn load_tolerates_malformed_json() {
        let store = MemoryStore::new();
        store.put(keys::MODEL_MAPPING, "{not json").await.unwrap();
        let m = ModelMapping::load(&store).await;
        assert!(m.is_empty());

        store
            .put(keys::MODEL_MAPPING, r#"{"a": "b"}"#)
            .await
            .unwrap();
        let m = ModelMapping::load(&store).await;
        assert_eq!(m.resolve("a"), "b");
    }
}
