//! Conversion between block-structured message content and Chat API content.

use crate::error::BridgeError;
use crate::models::chat::{ChatContent, ContentPart, ImageUrl};
use crate::models::messages::{ContentBlock, ImageSource, MessageContent};

/// Convert Messages content into Chat content.
///
/// - A string stays a string.
/// - A block list made only of `text` blocks is flattened into one string (concatenated,
///   no separator).
/// - Otherwise each block becomes a content part. `tool_result` and `tool_use` blocks are
///   elided: tool results travel as standalone `tool` messages and tool calls as
///   `tool_calls` on assistant messages, never inline.
/// - Unknown block types are rejected.
pub fn to_delta_form(content: &MessageContent) -> Result<ChatContent, BridgeError> {
    let blocks = match content {
        MessageContent::Text(s) => return Ok(ChatContent::Text(s.clone())),
        MessageContent::Blocks(blocks) => blocks,
    };

    if blocks.iter().all(|b| matches!(b, ContentBlock::Text { .. })) {
        return Ok(ChatContent::Text(concat_text(blocks)));
    }

    let mut parts = Vec::with_capacity(blocks.len());
    for block in blocks {
        match block {
            ContentBlock::Text { text } => parts.push(ContentPart::Text { text: text.clone() }),
            ContentBlock::Image { source } => parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image_url(source),
                },
            }),
            ContentBlock::ToolResult { .. } | ContentBlock::ToolUse { .. } => {}
            ContentBlock::Unknown(_) => {
                return Err(BridgeError::UnsupportedContent(block.kind().to_string()))
            }
        }
    }
    Ok(ChatContent::Parts(parts))
}

/// Convert Chat content into Messages content blocks.
///
/// `data:` image URLs are decoded back into base64 image sources. Part types with no
/// Messages counterpart pass through unchanged.
pub fn to_block_form(content: &ChatContent) -> Vec<ContentBlock> {
    match content {
        ChatContent::Text(s) => vec![ContentBlock::text(s.clone())],
        ChatContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => ContentBlock::text(text.clone()),
                ContentPart::ImageUrl { image_url } => ContentBlock::Image {
                    source: image_source(&image_url.url),
                },
                ContentPart::Other(v) => ContentBlock::Unknown(v.clone()),
            })
            .collect(),
    }
}

/// Concatenate the text of every `text` block, ignoring the rest.
pub fn concat_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// Flatten a `tool_result` payload into the string form the Chat API expects.
///
/// Strings are kept, lists of text blocks are concatenated, anything else is serialized
/// as JSON text.
pub fn tool_result_text(content: &serde_json::Value) -> String {
    use serde_json::Value;
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items)
            if !items.is_empty()
                && items
                    .iter()
                    .all(|i| i.get("type").and_then(|t| t.as_str()) == Some("text")) =>
        {
            items
                .iter()
                .filter_map(|i| i.get("text").and_then(|t| t.as_str()))
                .collect()
        }
        other => other.to_string(),
    }
}

fn image_url(source: &ImageSource) -> String {
    match source {
        ImageSource::Base64 { media_type, data } => format!("data:{media_type};base64,{data}"),
        ImageSource::Url { url } => url.clone(),
    }
}

fn image_source(url: &str) -> ImageSource {
    if let Some(rest) = url.strip_prefix("data:") {
        if let Some((media_type, data)) = rest.split_once(";base64,") {
            return ImageSource::Base64 {
                media_type: media_type.to_string(),
                data: data.to_string(),
            };
        }
    }
    ImageSource::Url {
        url: url.to_string(),
    }
}
