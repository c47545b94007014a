#![forbid(unsafe_code)]
#![doc = r#"
Messages2Chat

Serve Anthropic-style Messages API requests (`/v1/messages`) against an upstream that speaks the
OpenAI Chat Completions dialect, translating requests, complete responses and SSE streams in
both directions.

Crate highlights
- Library: pure conversion via `to_chat_request(&MessagesRequest, &impl ModelResolver)` and
  `to_messages_response(&ChatCompletionResponse, model)`.
- Streaming: `StreamTranslator` turns Chat Completions SSE bytes into Messages SSE events while
  keeping block start/stop pairing and indices consistent under arbitrary chunk boundaries.
- HTTP server (in `server`): `/v1/messages`, `/v1/models`, `/admin/config`, `/debug`, `/health`.

Modules
- `models`: Data structures for the Messages and Chat Completions APIs.
- `content`: Content block <-> content part conversion.
- `conversion`: Request and non-streaming response mapping.
- `stream`: Incremental SSE translation.
- `store`, `credentials`, `model_map`: Configuration storage, upstream tokens, model aliases.
- `config`: Environment settings and store seed files.
- `server`: Axum router/handlers (the binary uses this).
- `util`: Shared helpers (tracing, HTTP client, CORS, app state).
"#]

pub mod config;
pub mod content;
pub mod conversion;
pub mod credentials;
pub mod error;
pub mod model_map;
pub mod models;
pub mod server;
pub mod store;
pub mod stream;
pub mod util;

pub use crate::conversion::{map_finish_reason, to_chat_request, to_messages_response};
pub use crate::error::BridgeError;
pub use crate::model_map::{ModelMapping, ModelResolver};
pub use crate::stream::{translate_sse_stream, StreamTranslator};

// Re-export model namespaces for convenience (downstream users can do `use messages2chat::chat`).
pub use crate::models::{chat, messages};
