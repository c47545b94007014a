use serde_json::{json, Value};

use crate::content::{concat_text, to_block_form, to_delta_form, tool_result_text};
use crate::error::BridgeError;
use crate::model_map::ModelResolver;
use crate::models::chat::{
    self, ChatCompletionRequest, ChatCompletionResponse, ChatContent, ChatMessage, ContentPart,
};
use crate::models::messages::{
    ContentBlock, InputMessage, MessageContent, MessagesRequest, MessagesResponse, Role,
    StopReason, SystemPrompt, ToolChoice, ToolDefinition, Usage,
};
use crate::util::generate_id;

/// Map a Chat Completions `finish_reason` onto a Messages `stop_reason`.
///
/// Unknown and absent reasons map to `end_turn`.
pub fn map_finish_reason(finish_reason: Option<&str>) -> StopReason {
    match finish_reason {
        Some("length") => StopReason::MaxTokens,
        Some("tool_calls") | Some("function_call") => StopReason::ToolUse,
        Some("stop") | Some("content_filter") => StopReason::EndTurn,
        _ => StopReason::EndTurn,
    }
}

/// Convert a Messages request into a Chat Completions request.
///
/// Mapping highlights:
/// - model: resolved through `models` (identity when unmapped).
/// - system: a string or the `\n`-joined text segments become one leading system message.
/// - user: `tool_result` blocks become standalone `tool` messages ahead of the remaining
///   content, which goes through the content codec.
/// - assistant: text blocks are concatenated; `tool_use` blocks become `tool_calls`, and the
///   content is `null` when only tool calls are present.
/// - tool: forwarded as a `tool` message with `tool_call_id`, content stringified.
/// - max_tokens / temperature / top_p / stop: copied only when present.
/// - tools / tool_choice: see `map_tool` and `map_tool_choice`.
pub fn to_chat_request(
    src: &MessagesRequest,
    models: &impl ModelResolver,
) -> Result<ChatCompletionRequest, BridgeError> {
    let mut messages = Vec::with_capacity(src.messages.len() + 1);

    if let Some(system) = src.system.as_ref().and_then(system_text) {
        messages.push(ChatMessage::text(chat::Role::System, system));
    }

    for m in &src.messages {
        map_message(m, &mut messages)?;
    }

    let tools = src
        .tools
        .as_ref()
        .filter(|ts| !ts.is_empty())
        .map(|ts| ts.iter().map(map_tool).collect::<Vec<_>>());

    // tool_choice without tools is rejected by most upstreams.
    let tool_choice = if tools.is_some() {
        src.tool_choice.as_ref().and_then(map_tool_choice)
    } else {
        None
    };

    Ok(ChatCompletionRequest {
        model: models.resolve(&src.model),
        messages,
        stream: src.stream,
        max_tokens: src.max_tokens,
        temperature: src.temperature,
        top_p: src.top_p,
        stop: src.stop.clone(),
        tools,
        tool_choice,
    })
}

fn system_text(system: &SystemPrompt) -> Option<String> {
    let text = match system {
        SystemPrompt::Text(s) => s.clone(),
        SystemPrompt::Blocks(blocks) => blocks
            .iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n"),
    };
    (!text.is_empty()).then_some(text)
}

fn map_message(m: &InputMessage, out: &mut Vec<ChatMessage>) -> Result<(), BridgeError> {
    match m.role {
        Role::User => {
            if let MessageContent::Blocks(blocks) = &m.content {
                let mut results = 0;
                for block in blocks {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                    } = block
                    {
                        out.push(tool_message(tool_use_id.clone(), tool_result_text(content)));
                        results += 1;
                    }
                }
                // A turn made only of tool results has nothing left to say as the user.
                if results > 0 && results == blocks.len() {
                    return Ok(());
                }
            }
            out.push(ChatMessage {
                role: chat::Role::User,
                content: Some(to_delta_form(&m.content)?),
                tool_calls: None,
                tool_call_id: None,
            });
        }
        Role::Assistant => out.push(map_assistant(&m.content)?),
        Role::Tool => {
            let content = match &m.raw_content {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            out.push(tool_message(m.tool_use_id.clone().unwrap_or_default(), content));
        }
        Role::System => {
            let text = match &m.content {
                MessageContent::Text(s) => s.clone(),
                MessageContent::Blocks(blocks) => concat_text(blocks),
            };
            out.push(ChatMessage::text(chat::Role::System, text));
        }
    }
    Ok(())
}

fn tool_message(tool_call_id: String, content: String) -> ChatMessage {
    ChatMessage {
        role: chat::Role::Tool,
        content: Some(ChatContent::Text(content)),
        tool_calls: None,
        tool_call_id: Some(tool_call_id),
    }
}

fn map_assistant(content: &MessageContent) -> Result<ChatMessage, BridgeError> {
    let blocks = match content {
        MessageContent::Text(s) => return Ok(ChatMessage::text(chat::Role::Assistant, s.clone())),
        MessageContent::Blocks(blocks) => blocks,
    };

    if let Some(unknown) = blocks.iter().find(|b| matches!(b, ContentBlock::Unknown(_))) {
        return Err(BridgeError::UnsupportedContent(unknown.kind().to_string()));
    }

    let text = concat_text(blocks);
    let tool_calls: Vec<chat::ToolCall> = blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::ToolUse { id, name, input } => Some(chat::ToolCall {
                id: id.clone(),
                call_type: "function".to_string(),
                function: chat::FunctionCall {
                    name: name.clone(),
                    arguments: Value::String(tool_arguments(input)),
                },
            }),
            _ => None,
        })
        .collect();

    if tool_calls.is_empty() {
        return Ok(ChatMessage::text(chat::Role::Assistant, text));
    }

    Ok(ChatMessage {
        role: chat::Role::Assistant,
        content: (!text.is_empty()).then_some(ChatContent::Text(text)),
        tool_calls: Some(tool_calls),
        tool_call_id: None,
    })
}

fn tool_arguments(input: &Value) -> String {
    match input {
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}

fn map_tool(t: &ToolDefinition) -> chat::ToolDefinition {
    chat::ToolDefinition::Function {
        function: chat::FunctionDef {
            name: t.name.clone(),
            description: t.description.clone().unwrap_or_default(),
            parameters: t
                .input_schema
                .clone()
                .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
        },
    }
}

/// `auto` → "auto", `any` → "required", `none` → "none", `tool` → named function.
/// Everything else yields `None` so no `tool_choice` is sent.
pub fn map_tool_choice(choice: &ToolChoice) -> Option<Value> {
    match choice {
        ToolChoice::Auto {} => Some(json!("auto")),
        ToolChoice::Any {} => Some(json!("required")),
        ToolChoice::Disabled {} => Some(json!("none")),
        ToolChoice::Tool { name: Some(name) } if !name.is_empty() => {
            Some(json!({"type": "function", "function": {"name": name}}))
        }
        ToolChoice::Tool { .. } => None,
        ToolChoice::Unsupported(v) => {
            tracing::debug!(tool_choice = %v, "dropping unsupported tool_choice");
            None
        }
    }
}

/// Convert a complete Chat Completions response into a Messages response.
///
/// `model` is the name the client asked for, not the upstream alias it was resolved to.
/// Fails with `UpstreamFormat` when the first choice carries no message.
pub fn to_messages_response(
    src: &ChatCompletionResponse,
    model: &str,
) -> Result<MessagesResponse, BridgeError> {
    let message = src.first_message().ok_or_else(|| BridgeError::UpstreamFormat {
        body: serde_json::to_value(src).unwrap_or(Value::Null),
    })?;
    let finish_reason = src.choices.first().and_then(|c| c.finish_reason.as_deref());

    let mut content = Vec::new();

    // Primary text, falling back to the reasoning channel.
    let mut text = String::new();
    let mut extra_parts = Vec::new();
    match &message.content {
        Some(ChatContent::Text(s)) => text.push_str(s),
        Some(ChatContent::Parts(parts)) => {
            for part in parts {
                match part {
                    ContentPart::Text { text: t } => text.push_str(t),
                    other => extra_parts.push(other.clone()),
                }
            }
        }
        None => {}
    }
    if text.is_empty() {
        if let Some(reasoning) = &message.reasoning_content {
            text.push_str(reasoning);
        }
    }
    if !text.is_empty() {
        content.push(ContentBlock::Text { text });
    }
    if !extra_parts.is_empty() {
        content.extend(to_block_form(&ChatContent::Parts(extra_parts)));
    }

    for tc in message.tool_calls.iter().flatten() {
        if !tc.is_function() {
            continue;
        }
        let id = if tc.id.is_empty() {
            generate_id("toolu")
        } else {
            tc.id.clone()
        };
        content.push(ContentBlock::ToolUse {
            id,
            name: tc.function.name.clone(),
            input: parse_arguments(&tc.function.arguments),
        });
    }

    if content.is_empty() {
        content.push(ContentBlock::text(""));
    }

    let usage = src.usage.clone().unwrap_or_default();
    Ok(MessagesResponse {
        id: generate_id("msg"),
        kind: "message".to_string(),
        role: "assistant".to_string(),
        model: model.to_string(),
        content,
        stop_reason: Some(map_finish_reason(finish_reason)),
        stop_sequence: None,
        usage: Usage {
            input_tokens: usage.prompt_tokens.unwrap_or(0),
            output_tokens: usage.completion_tokens.unwrap_or(0),
        },
    })
}

/// Best-effort reading of tool arguments: a JSON-encoded object string or the object itself.
/// Anything else becomes `{}`.
fn parse_arguments(arguments: &Value) -> Value {
    match arguments {
        Value::Object(_) => arguments.clone(),
        Value::String(s) if s.trim().is_empty() => json!({}),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(v @ Value::Object(_)) => v,
            Ok(_) | Err(_) => {
                tracing::debug!(arguments = %s, "tool arguments are not a JSON object; using {{}}");
                json!({})
            }
        },
        Value::Null => json!({}),
        other => {
            tracing::debug!(arguments = %other, "tool arguments are not a JSON object; using {{}}");
            json!({})
        }
    }
}
