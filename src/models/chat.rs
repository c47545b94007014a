use serde::{Deserialize, Serialize};
use serde_with::{serde_as, skip_serializing_none, DefaultOnNull};

/// Chat Completions role enumeration.
///
/// Uses lowercase serialization to match the Chat API:
/// "system" | "user" | "assistant" | "tool"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One part of array-form message content.
///
/// Part types other than `text` and `image_url` are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: ImageUrl,
    },
    #[serde(untagged)]
    Other(serde_json::Value),
}

/// Chat API message content: a string or an array of parts (for multimodal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// Chat message sent upstream.
///
/// Notes:
/// - `content` is always serialized; assistant turns that only carry tool calls send
///   `"content": null`, which the Chat API requires in place of an empty string.
/// - `tool_call_id` correlates a `tool` message with the assistant tool call it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<ChatContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(ChatContent::Text(text.into())),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// JSON Schema for a function tool definition in Chat Completions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    /// JSON Schema object describing the function parameters.
    pub parameters: serde_json::Value,
}

/// Chat Completions tool definition (subset).
///
/// Example:
/// {
///   "type": "function",
///   "function": { "name": "...", "description": "...", "parameters": { ... } }
/// }
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDefinition {
    Function { function: FunctionDef },
}

/// Chat Completions request as sent upstream.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,

    // Sampling / decoding
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    /// Accepts a single string or an array of strings.
    #[serde(default)]
    pub stop: Option<serde_json::Value>,

    // Tools
    #[serde(default)]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(default)]
    pub tool_choice: Option<serde_json::Value>,
}

// ============================================================================
// Chat Completions Response Models
// ============================================================================
//
// Upstream payloads are parsed permissively: every field is optional, unknown fields are
// ignored and `null` reads as the field's default, so dialect drift on the upstream side never
// fails a request.

fn function_type() -> String {
    "function".to_string()
}

/// Tool call in a Chat Completions request or response.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub id: String,
    /// "function"; an explicit `null` reads as "".
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub function: FunctionCall,
}

impl ToolCall {
    /// Untyped calls count as function calls.
    pub fn is_function(&self) -> bool {
        self.call_type.is_empty() || self.call_type == "function"
    }
}

/// Function call details.
///
/// `arguments` is normally a JSON-encoded string, but some upstreams send the object itself.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Message in a Chat Completions response
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponseMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<ChatContent>,
    /// Separate reasoning channel emitted by some reasoning-capable models.
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// Choice in a Chat Completions response
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ChatResponseMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>, // "stop", "length", "tool_calls", "content_filter"
}

/// Usage statistics in Chat Completions responses and stream chunks
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
}

/// Complete Chat Completions API response
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ChatUsage>,
}

impl ChatCompletionResponse {
    /// The message of the first choice, if the upstream supplied one.
    pub fn first_message(&self) -> Option<&ChatResponseMessage> {
        self.choices.first().and_then(|c| c.message.as_ref())
    }
}

// ============================================================================
// Chat Completions Streaming Response Models
// ============================================================================

/// Delta in a streaming chunk
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Tool call delta in streaming
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionCallDelta>,
}

/// Function call delta
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Choice in a streaming chunk
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatStreamChoice {
    #[serde(default)]
    pub delta: Option<ChatDelta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Streaming chunk response
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub choices: Vec<ChatStreamChoice>,
    /// Only in the final chunk for most upstreams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ChatUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assistant_tool_call_message_serializes_null_content() {
        let msg = ChatMessage {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(vec![ToolCall {
                id: "call_1".into(),
                call_type: "function".into(),
                function: FunctionCall {
                    name: "lookup".into(),
                    arguments: serde_json::Value::String("{}".into()),
                },
            }]),
            tool_call_id: None,
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert!(v.get("content").unwrap().is_null());
        assert!(v.get("tool_call_id").is_none());
        assert_eq!(v["tool_calls"][0]["type"], "function");
    }

    #[test]
    fn request_omits_absent_optionals() {
        let req = ChatCompletionRequest {
            model: "m".into(),
            messages: vec![ChatMessage::text(Role::User, "hi")],
            stream: false,
            max_tokens: None,
            temperature: None,
            top_p: None,
            stop: None,
            tools: None,
            tool_choice: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(
            v,
            json!({"model": "m", "messages": [{"role": "user", "content": "hi"}], "stream": false})
        );
    }

    #[test]
    fn null_tool_call_fields_read_as_defaults() {
        let resp: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{
                "index": null,
                "message": {"tool_calls": [
                    {"id": null, "type": null, "function": {"name": null, "arguments": null}},
                    {"id": "c", "function": null}
                ]}
            }]
        }))
        .unwrap();
        let calls = resp.first_message().unwrap().tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "");
        assert!(calls[0].is_function());
        assert_eq!(calls[0].function.name, "");
        assert!(calls[0].function.arguments.is_null());
        assert_eq!(calls[1].function, FunctionCall::default());
        assert_eq!(resp.choices[0].index, 0);

        let empty: ChatCompletionResponse =
            serde_json::from_value(json!({"choices": null})).unwrap();
        assert!(empty.choices.is_empty());
    }

    #[test]
    fn chunk_parsing_tolerates_nulls_and_extra_fields() {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "id": "x",
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {"content": null, "role": "assistant"}, "finish_reason": null, "logprobs": null}],
            "usage": null
        }))
        .unwrap();
        assert_eq!(chunk.choices.len(), 1);
        assert!(chunk.usage.is_none());
        assert!(chunk.choices[0].delta.as_ref().unwrap().content.is_none());
    }

    #[test]
    fn response_parts_keep_unknown_types() {
        let msg: ChatResponseMessage = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "a"}, {"type": "audio", "data": "zz"}]
        }))
        .unwrap();
        let Some(ChatContent::Parts(parts)) = msg.content else {
            panic!("expected parts");
        };
        assert!(matches!(parts[1], ContentPart::Other(_)));
    }
}
