#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use messages2chat::config::{HttpSettings, Settings};
use messages2chat::server::build_router;
use messages2chat::store::MemoryStore;
use messages2chat::util::AppState;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// What the mock upstream answers on `POST /v1/chat/completions`.
#[derive(Clone, Debug)]
pub enum UpstreamReply {
    Json { status: StatusCode, body: Value },
    Text { status: StatusCode, body: String },
    /// SSE body, sent as one network chunk per element.
    Sse(Vec<String>),
}

impl UpstreamReply {
    pub fn ok(body: Value) -> Self {
        UpstreamReply::Json {
            status: StatusCode::OK,
            body,
        }
    }
}

/// A request captured by the mock upstream.
#[derive(Clone, Debug)]
pub struct Recorded {
    pub path: String,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct MockState {
    reply: UpstreamReply,
    recorded: Arc<Mutex<Vec<Recorded>>>,
}

/// Chat Completions upstream stub bound to an ephemeral port. Also serves a token refresh
/// endpoint at `/oauth/token` that always issues `tok-refreshed`.
pub struct MockUpstream {
    pub origin: String,
    pub base_url: String,
    recorded: Arc<Mutex<Vec<Recorded>>>,
    join: JoinHandle<()>,
}

impl MockUpstream {
    pub async fn start(reply: UpstreamReply) -> Self {
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            reply,
            recorded: recorded.clone(),
        };
        let router = Router::new()
            .route("/v1/chat/completions", post(chat_handler))
            .route("/oauth/token", post(token_handler))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock upstream");
        let addr = listener.local_addr().expect("mock upstream local addr");
        let join = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router.into_make_service()).await {
                eprintln!("Mock upstream error: {e:?}");
            }
        });

        Self {
            origin: format!("http://{addr}"),
            base_url: format!("http://{addr}/v1"),
            recorded,
            join,
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.origin)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.recorded.lock().unwrap().clone()
    }

    pub fn chat_requests(&self) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == "/v1/chat/completions")
            .collect()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.join.abort();
    }
}

fn record(state: &MockState, path: &str, headers: &HeaderMap, body: &Bytes) {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let body = serde_json::from_slice(body).unwrap_or(Value::Null);
    state.recorded.lock().unwrap().push(Recorded {
        path: path.to_string(),
        authorization,
        body,
    });
}

async fn chat_handler(State(state): State<MockState>, headers: HeaderMap, body: Bytes) -> Response {
    record(&state, "/v1/chat/completions", &headers, &body);
    match state.reply.clone() {
        UpstreamReply::Json { status, body } => (status, Json(body)).into_response(),
        UpstreamReply::Text { status, body } => (status, body).into_response(),
        UpstreamReply::Sse(chunks) => {
            let stream = futures_util::stream::iter(
                chunks
                    .into_iter()
                    .map(|c| Ok::<_, Infallible>(Bytes::from(c))),
            );
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/event-stream")],
                Body::from_stream(stream),
            )
                .into_response()
        }
    }
}

async fn token_handler(State(state): State<MockState>, headers: HeaderMap, body: Bytes) -> Response {
    record(&state, "/oauth/token", &headers, &body);
    Json(json!({
        "access_token": "tok-refreshed",
        "expires_in": 3600,
        "refresh_token": "rt-rotated"
    }))
    .into_response()
}

/// The bridge itself, spawned on an ephemeral port with an explicit store and settings.
pub struct TestServer {
    pub base_url: String,
    pub addr: SocketAddr,
    pub store: MemoryStore,
    join: JoinHandle<()>,
    client: reqwest::Client,
}

impl TestServer {
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("GET failed")
    }

    pub async fn post_json(&self, path: &str, body: &Value, bearer: Option<&str>) -> reqwest::Response {
        let mut rb = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(b) = bearer {
            rb = rb.bearer_auth(b);
        }
        rb.json(body).send().await.expect("POST failed")
    }

    pub async fn post_raw(&self, path: &str, body: &'static str) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .expect("POST failed")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.join.abort();
    }
}

pub const ADMIN_KEY: &str = "admin-test-key";

/// Settings pointing at `upstream` with an admin key and a static api key.
pub fn settings_for(upstream: &MockUpstream) -> Settings {
    Settings {
        upstream_base_url: Some(upstream.base_url.clone()),
        upstream_api_key: Some("sk-env".into()),
        admin_key: Some(ADMIN_KEY.into()),
        http: HttpSettings {
            no_proxy: true,
            ..HttpSettings::default()
        },
        ..Settings::default()
    }
}

pub async fn spawn_app(store: MemoryStore, settings: Settings) -> TestServer {
    let state = AppState::new(settings, Arc::new(store.clone()));
    spawn_state(store, state).await
}

/// Spawn the bridge around a prepared state; `store` must be the one inside `state`.
pub async fn spawn_state(store: MemoryStore, state: AppState) -> TestServer {
    let app = build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let server = axum::serve(listener, app.into_make_service());
    let join = tokio::spawn(async move {
        if let Err(e) = server.await {
            eprintln!("Test server error: {e:?}");
        }
    });

    TestServer {
        base_url: format!("http://{addr}"),
        addr,
        store,
        join,
        client: reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .no_proxy()
            .build()
            .expect("failed building reqwest client"),
    }
}

/// Spawn a mock upstream replying with `reply` and a bridge pointed at it.
pub async fn spawn_with_upstream(reply: UpstreamReply) -> (MockUpstream, TestServer) {
    let upstream = MockUpstream::start(reply).await;
    let app = spawn_app(MemoryStore::new(), settings_for(&upstream)).await;
    (upstream, app)
}

pub fn hello_request() -> Value {
    json!({
        "model": "claude-sonnet-4-5",
        "max_tokens": 256,
        "messages": [{"role": "user", "content": "Say hello"}]
    })
}

pub fn sse(chunk: Value) -> String {
    format!("data: {chunk}\n\n")
}

/// Split an SSE response body into `(event, data)` pairs.
pub fn parse_sse(text: &str) -> Vec<(String, Value)> {
    text.split("\n\n")
        .filter(|frame| !frame.trim().is_empty())
        .map(|frame| {
            let mut event = String::new();
            let mut data = Value::Null;
            for line in frame.lines() {
                if let Some(e) = line.strip_prefix("event: ") {
                    event = e.to_string();
                } else if let Some(d) = line.strip_prefix("data: ") {
                    data = serde_json::from_str(d).expect("event data is JSON");
                }
            }
            (event, data)
        })
        .collect()
}
