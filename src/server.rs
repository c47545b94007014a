use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};
use tower_http::trace::TraceLayer;

use crate::config::store_value;
use crate::conversion::{to_chat_request, to_messages_response};
use crate::error::BridgeError;
use crate::model_map::ModelMapping;
use crate::models::chat::ChatCompletionResponse;
use crate::models::messages::MessagesRequest;
use crate::store::keys;
use crate::stream::translate_sse_stream;
use crate::util::{cors_layer_from_env, AppState};

const SSE_CONTENT_TYPE: &str = "text/event-stream; charset=utf-8";

static MODEL_IDS: [&str; 8] = [
    "Qwen3-Max",
    "Qwen3-Max-Preview",
    "Kimi-K2",
    "Kimi-K2-Instruct-0905",
    "GLM-4.6",
    "Qwen3-VL-Plus",
    "Qwen3-235B-A22B-Thinking",
    "Qwen3-235B-A22B-Instruct",
];

static MODEL_LIST: Lazy<Value> = Lazy::new(|| {
    let data: Vec<Value> = MODEL_IDS
        .iter()
        .map(|id| json!({"id": id, "object": "model", "created": 1700000000, "owned_by": "iflow"}))
        .collect();
    json!({"object": "list", "data": data})
});

/// Build the Axum router.
///
/// Routes:
/// - `POST /v1/messages`: translate, forward upstream, translate back (JSON or SSE)
/// - `GET /v1/models`: static model list
/// - `GET|POST|PUT /admin/config`: inspect or update the config store (bearer `ADMIN_KEY`)
/// - `GET /debug`: which parts of the upstream configuration are present
/// - `GET /`, `GET /health`: service status
pub fn build_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/debug", get(debug))
        .route("/v1/models", get(models))
        .route("/v1/messages", post(messages))
        .route(
            "/admin/config",
            get(admin_get_config).post(admin_put_config).put(admin_put_config),
        )
        .with_state(state)
        .layer(cors_layer_from_env())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "messages2chat",
        "version": env!("CARGO_PKG_VERSION"),
        "features": ["tools", "streaming", "multimodal"],
    }))
}

async fn models() -> impl IntoResponse {
    Json(MODEL_LIST.clone())
}

async fn debug(State(state): State<Arc<AppState>>) -> Result<Json<Value>, BridgeError> {
    let has_api_key = state
        .store
        .get(keys::API_KEY)
        .await?
        .is_some_and(|k| !k.is_empty())
        || state.settings.upstream_api_key.is_some();
    let base_url = state.upstream_base_url().await?;
    let path = state.upstream_path().await?;
    let upstream_url = match state.upstream_url().await {
        Ok(url) => url,
        Err(_) => "(incomplete)".to_string(),
    };
    Ok(Json(json!({
        "status": "ok",
        "config": {
            "has_api_key": has_api_key,
            "base_url": base_url.unwrap_or_else(|| "(not set)".to_string()),
            "path": path,
            "upstream_url": upstream_url,
        }
    })))
}

/// Handle a Messages request end to end.
async fn messages(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match forward_messages(&state, &body).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn forward_messages(state: &AppState, body: &[u8]) -> Result<Response, BridgeError> {
    let mut req: MessagesRequest =
        serde_json::from_slice(body).map_err(|e| BridgeError::InvalidBody(e.to_string()))?;
    if req.model.trim().is_empty() {
        req.model = state.settings.default_model.clone();
    }
    let requested_model = req.model.clone();

    let mapping = ModelMapping::load(state.store.as_ref()).await;
    let chat_req = to_chat_request(&req, &mapping)?;
    let url = state.upstream_url().await?;
    let token = state.credentials.token().await?;

    tracing::info!(
        model = %requested_model,
        upstream_model = %chat_req.model,
        stream = chat_req.stream,
        messages = chat_req.messages.len(),
        "forwarding messages request"
    );
    tracing::debug!(url = %url, "upstream endpoint");

    let mut rb = state
        .http
        .post(&url)
        .header(header::CONTENT_TYPE, "application/json")
        .json(&chat_req);
    if chat_req.stream {
        rb = rb.header(header::ACCEPT, "text/event-stream");
    }
    if !token.is_empty() {
        rb = rb.bearer_auth(&token);
    }
    let resp = rb.send().await?;
    let status = resp.status();

    if chat_req.stream {
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BridgeError::Upstream { status, body });
        }
        let stream = translate_sse_stream(resp.bytes_stream(), requested_model);
        return Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, SSE_CONTENT_TYPE),
                (header::CACHE_CONTROL, "no-cache, no-transform"),
                (header::CONNECTION, "keep-alive"),
            ],
            Body::from_stream(stream),
        )
            .into_response());
    }

    let text = resp.text().await?;
    if !status.is_success() {
        return Err(BridgeError::Upstream { status, body: text });
    }
    let value: Value = serde_json::from_str(&text)
        .map_err(|_| BridgeError::UpstreamUnparsable { body: text.clone() })?;
    let chat_resp: ChatCompletionResponse = serde_json::from_value(value.clone())
        .map_err(|_| BridgeError::UpstreamFormat { body: value })?;
    let out = to_messages_response(&chat_resp, &requested_model)?;
    Ok(Json(out).into_response())
}

fn masked(value: Option<String>) -> Value {
    match value.filter(|v| !v.is_empty()) {
        Some(_) => json!("***"),
        None => Value::Null,
    }
}

async fn admin_get_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, BridgeError> {
    state.verify_admin(&headers)?;
    let store = &state.store;
    Ok(Json(json!({
        "upstream_base_url": store.get(keys::UPSTREAM_BASE_URL).await?,
        "upstream_path": store.get(keys::UPSTREAM_PATH).await?,
        "api_key": masked(store.get(keys::API_KEY).await?),
        "access_token": masked(store.get(keys::ACCESS_TOKEN).await?),
        "refresh_token": masked(store.get(keys::REFRESH_TOKEN).await?),
        "expires_at": store.get(keys::EXPIRES_AT).await?,
        "refresh_url": store.get(keys::REFRESH_URL).await?,
        "model_mapping": store.get(keys::MODEL_MAPPING).await?,
    })))
}

async fn admin_put_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, BridgeError> {
    state.verify_admin(&headers)?;
    let value: Value =
        serde_json::from_slice(&body).map_err(|e| BridgeError::InvalidBody(e.to_string()))?;
    let Value::Object(obj) = value else {
        return Err(BridgeError::InvalidBody("expected a JSON object".into()));
    };

    let mut updated = Vec::new();
    for key in keys::WRITABLE {
        if let Some(text) = obj.get(key).and_then(store_value) {
            state.store.put(key, &text).await?;
            updated.push(key);
        }
    }
    let ignored: Vec<&String> = obj
        .keys()
        .filter(|k| !keys::WRITABLE.contains(&k.as_str()))
        .collect();
    tracing::info!(updated = ?updated, ignored = ?ignored, "admin config updated");

    let mut out = Map::new();
    out.insert("success".into(), json!(true));
    out.insert("updated".into(), json!(updated));
    Ok(Json(Value::Object(out)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::store::MemoryStore;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app(store: MemoryStore, settings: Settings) -> Router {
        build_router(AppState::new(settings, Arc::new(store)))
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_and_models() {
        let router = app(MemoryStore::new(), Settings::default());
        let resp = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");

        let resp = router
            .oneshot(Request::get("/v1/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let v = body_json(resp).await;
        assert_eq!(v["object"], "list");
        assert_eq!(v["data"].as_array().unwrap().len(), 8);
        assert_eq!(v["data"][0]["id"], "Qwen3-Max");
    }

    #[tokio::test]
    async fn invalid_json_is_400() {
        let router = app(MemoryStore::new(), Settings::default());
        let resp = router
            .oneshot(
                Request::post("/v1/messages")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let v = body_json(resp).await;
        assert_eq!(v["type"], "error");
        assert_eq!(v["error"]["type"], "invalid_request_error");
    }

    #[tokio::test]
    async fn missing_upstream_is_500_with_hint() {
        let store = MemoryStore::with_entries([(keys::API_KEY, "sk")]);
        let router = app(store, Settings::default());
        let resp = router
            .oneshot(
                Request::post("/v1/messages")
                    .body(Body::from(
                        r#"{"model":"m","messages":[{"role":"user","content":"hi"}]}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let v = body_json(resp).await;
        assert!(v["hint"].as_str().unwrap().contains("/debug"));
    }

    #[tokio::test]
    async fn admin_requires_bearer_and_masks_secrets() {
        let store = MemoryStore::with_entries([(keys::API_KEY, "sk-secret")]);
        let settings = Settings {
            admin_key: Some("admin".into()),
            ..Settings::default()
        };
        let router = app(store.clone(), settings);

        let resp = router
            .clone()
            .oneshot(Request::get("/admin/config").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = router
            .clone()
            .oneshot(
                Request::post("/admin/config")
                    .header("authorization", "Bearer admin")
                    .body(Body::from(
                        r#"{"upstream_base_url":"http://up","model_mapping":{"a":"b"},"nope":1}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["success"], true);
        assert_eq!(v["updated"], json!(["upstream_base_url", "model_mapping"]));

        let resp = router
            .oneshot(
                Request::get("/admin/config")
                    .header("authorization", "Bearer admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let v = body_json(resp).await;
        assert_eq!(v["api_key"], "***");
        assert_eq!(v["access_token"], Value::Null);
        assert_eq!(v["upstream_base_url"], "http://up");
        assert_eq!(v["model_mapping"], r#"{"a":"b"}"#);
    }

    #[tokio::test]
    async fn debug_reports_configuration_presence() {
        let router = app(MemoryStore::new(), Settings::default());
        let resp = router
            .oneshot(Request::get("/debug").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let v = body_json(resp).await;
        assert_eq!(v["config"]["has_api_key"], false);
        assert_eq!(v["config"]["base_url"], "(not set)");
        assert_eq!(v["config"]["path"], "/chat/completions");
        assert_eq!(v["config"]["upstream_url"], "(incomplete)");
    }
}
