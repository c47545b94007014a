use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Maximum number of characters of an upstream body echoed back in error documents.
pub const UPSTREAM_BODY_LIMIT: usize = 1000;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Invalid JSON: {0}")]
    InvalidBody(String),
    #[error("unsupported or malformed content block of type `{0}`")]
    UnsupportedContent(String),
    #[error("{0}")]
    Credentials(String),
    #[error("Upstream API not configured")]
    NotConfigured,
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Upstream error")]
    Upstream { status: StatusCode, body: String },
    #[error("Failed to parse upstream response")]
    UpstreamUnparsable { body: String },
    #[error("Invalid upstream response format")]
    UpstreamFormat { body: Value },
    #[error("Unauthorized")]
    Unauthorized,
    #[error("config store error: {0}")]
    Store(String),
}

impl BridgeError {
    pub fn status(&self) -> StatusCode {
        match self {
            BridgeError::InvalidBody(_) | BridgeError::UnsupportedContent(_) => {
                StatusCode::BAD_REQUEST
            }
            BridgeError::Credentials(_) | BridgeError::NotConfigured | BridgeError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            BridgeError::Transport(_)
            | BridgeError::UpstreamUnparsable { .. }
            | BridgeError::UpstreamFormat { .. } => StatusCode::BAD_GATEWAY,
            BridgeError::Upstream { status, .. } => *status,
            BridgeError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            BridgeError::InvalidBody(_) | BridgeError::UnsupportedContent(_) => {
                "invalid_request_error"
            }
            BridgeError::Credentials(_) | BridgeError::Unauthorized => "authentication_error",
            BridgeError::Upstream { status, .. } if *status == StatusCode::TOO_MANY_REQUESTS => {
                "rate_limit_error"
            }
            _ => "api_error",
        }
    }

    /// The JSON error document returned to the client.
    pub fn to_body(&self) -> Value {
        let mut message = self.to_string();
        let mut root = Map::new();
        root.insert("type".into(), json!("error"));

        match self {
            BridgeError::NotConfigured => {
                root.insert(
                    "hint".into(),
                    json!("Use /debug endpoint to check configuration status"),
                );
            }
            BridgeError::Upstream { status, body } => {
                let upstream = parse_or_truncate(body);
                if let Some(detail) = upstream_message(&upstream) {
                    message = detail;
                }
                root.insert("upstream_status".into(), json!(status.as_u16()));
                root.insert("upstream_response".into(), upstream);
            }
            BridgeError::UpstreamUnparsable { body } => {
                root.insert("upstream_body".into(), json!(truncate(body)));
            }
            BridgeError::UpstreamFormat { body } => {
                root.insert("upstream_response".into(), body.clone());
            }
            _ => {}
        }

        root.insert(
            "error".into(),
            json!({ "type": self.error_type(), "message": message }),
        );
        Value::Object(root)
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "request failed");
        } else {
            tracing::warn!(status = %status, error = %self, "request rejected");
        }
        (status, axum::Json(self.to_body())).into_response()
    }
}

/// Truncate to at most `UPSTREAM_BODY_LIMIT` characters.
pub fn truncate(s: &str) -> String {
    s.chars().take(UPSTREAM_BODY_LIMIT).collect()
}

fn parse_or_truncate(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(truncate(body)))
}

/// Best-effort extraction of a human readable message from an upstream error payload.
fn upstream_message(v: &Value) -> Option<String> {
    let err = v.get("error").or_else(|| v.get("msg"))?;
    match err {
        Value::String(s) => Some(s.clone()),
        Value::Object(o) => o
            .get("message")
            .and_then(|m| m.as_str())
            .map(|s| s.to_string()),
        _ => None,
    }
}
