use messages2chat::models::chat::{ChatCompletionRequest, ChatContent, Role};
use messages2chat::models::messages::MessagesRequest;
use messages2chat::{to_chat_request, ModelMapping};
use serde_json::{json, Value};
use std::collections::HashMap;

fn convert(v: Value) -> ChatCompletionRequest {
    let req: MessagesRequest = serde_json::from_value(v).expect("valid request");
    to_chat_request(&req, &()).expect("conversion succeeds")
}

#[test]
fn multi_turn_conversation_keeps_order_and_roles() {
    let out = convert(json!({
        "model": "claude-3-5-sonnet",
        "system": "You are terse.",
        "messages": [
            {"role": "user", "content": "Hi"},
            {"role": "assistant", "content": "Hello."},
            {"role": "user", "content": [{"type": "text", "text": "How "}, {"type": "text", "text": "are you?"}]}
        ]
    }));

    let roles: Vec<Role> = out.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::User]
    );
    assert_eq!(
        out.messages[3].content,
        Some(ChatContent::Text("How are you?".into()))
    );
}

#[test]
fn multimodal_user_message_becomes_parts() {
    let out = convert(json!({
        "model": "Qwen3-VL-Plus",
        "messages": [{
            "role": "user",
            "content": [
                {"type": "text", "text": "Describe"},
                {"type": "image", "source": {"type": "base64", "media_type": "image/jpeg", "data": "/9j/4AAQ"}}
            ]
        }]
    }));
    let v = serde_json::to_value(&out).unwrap();
    assert_eq!(
        v["messages"][0]["content"],
        json!([
            {"type": "text", "text": "Describe"},
            {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,/9j/4AAQ"}}
        ])
    );
}

#[test]
fn absent_optional_fields_are_not_serialized() {
    let out = convert(json!({
        "model": "m",
        "messages": [{"role": "user", "content": "x"}]
    }));
    let v = serde_json::to_value(&out).unwrap();
    let obj = v.as_object().unwrap();
    for key in ["max_tokens", "temperature", "top_p", "stop", "tools", "tool_choice"] {
        assert!(!obj.contains_key(key), "{key} should be omitted");
    }
    assert_eq!(v["stream"], false);
}

#[test]
fn stop_sequences_alias_and_sampling_are_forwarded() {
    let out = convert(json!({
        "model": "m",
        "messages": [],
        "stop_sequences": ["\n\nHuman:"],
        "temperature": 0,
        "top_p": 1
    }));
    assert_eq!(out.stop, Some(json!(["\n\nHuman:"])));
    assert_eq!(out.temperature, Some(0.0));
    assert_eq!(out.top_p, Some(1.0));
}

#[test]
fn stream_flag_uses_truthiness() {
    assert!(convert(json!({"model": "m", "messages": [], "stream": 1})).stream);
    assert!(!convert(json!({"model": "m", "messages": [], "stream": null})).stream);
    assert!(!convert(json!({"model": "m", "messages": []})).stream);
}

#[test]
fn null_content_is_treated_as_empty_text() {
    let out = convert(json!({
        "model": "m",
        "messages": [{"role": "user", "content": null}]
    }));
    assert_eq!(out.messages[0].content, Some(ChatContent::Text(String::new())));
}

#[test]
fn model_mapping_resolves_and_falls_back() {
    let mapping = ModelMapping::new(HashMap::from([(
        "claude-opus-4".to_string(),
        "Kimi-K2".to_string(),
    )]));
    let req: MessagesRequest =
        serde_json::from_value(json!({"model": "claude-opus-4", "messages": []})).unwrap();
    assert_eq!(to_chat_request(&req, &mapping).unwrap().model, "Kimi-K2");

    let req: MessagesRequest =
        serde_json::from_value(json!({"model": "GLM-4.6", "messages": []})).unwrap();
    assert_eq!(to_chat_request(&req, &mapping).unwrap().model, "GLM-4.6");
}

#[test]
fn tool_choice_is_dropped_without_tools() {
    let out = convert(json!({
        "model": "m",
        "messages": [],
        "tool_choice": {"type": "tool", "name": "lookup"}
    }));
    assert!(out.tools.is_none());
    assert!(out.tool_choice.is_none());
}

#[test]
fn disabled_and_auto_tool_choice() {
    let tools = json!([{"name": "t", "input_schema": {"type": "object"}}]);
    let out = convert(json!({"model": "m", "messages": [], "tools": tools, "tool_choice": {"type": "none"}}));
    assert_eq!(out.tool_choice, Some(json!("none")));
    let out = convert(json!({"model": "m", "messages": [], "tools": tools, "tool_choice": {"type": "auto"}}));
    assert_eq!(out.tool_choice, Some(json!("auto")));
    let out = convert(json!({"model": "m", "messages": [], "tools": tools, "tool_choice": {"type": "mystery"}}));
    assert_eq!(out.tool_choice, None);
}

#[test]
fn tool_result_with_structured_content_is_stringified() {
    let out = convert(json!({
        "model": "m",
        "messages": [{
            "role": "user",
            "content": [{"type": "tool_result", "tool_use_id": "toolu_7", "content": {"rows": 3}}]
        }]
    }));
    assert_eq!(out.messages.len(), 1);
    assert_eq!(out.messages[0].role, Role::Tool);
    assert_eq!(
        out.messages[0].content,
        Some(ChatContent::Text(r#"{"rows":3}"#.into()))
    );
}
