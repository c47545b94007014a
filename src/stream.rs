//! Streaming translation: Chat Completions SSE chunks in, Messages SSE events out.
//!
//! `StreamTranslator` is a plain state machine driven with byte slices, so it can be tested
//! without any I/O. `translate_sse_stream` wires it onto an upstream byte stream.

use std::collections::{HashMap, VecDeque};
use std::fmt::Display;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde_json::json;

use crate::conversion::map_finish_reason;
use crate::models::chat::{ChatCompletionChunk, ChatDelta, ToolCallDelta};
use crate::models::messages::{
    BlockDelta, ContentBlock, DeltaUsage, MessageDeltaBody, MessagesResponse, StreamEvent, Usage,
};
use crate::util::generate_id;

#[derive(Debug, Clone, PartialEq, Eq)]
enum OpenBlock {
    Text,
    ToolUse(String),
}

/// Per-stream translation state. One instance per upstream response.
#[derive(Debug)]
pub struct StreamTranslator {
    message_id: String,
    model: String,
    /// Bytes after the last newline seen so far.
    line_buffer: Vec<u8>,
    /// Index of the block currently open, or of the next block to open.
    block_index: usize,
    open_block: Option<OpenBlock>,
    /// Accumulated argument text per tool call id.
    tool_arguments: HashMap<String, String>,
    /// Upstream `tool_calls[].index` -> tool call id.
    tool_indices: HashMap<u32, String>,
    active_tool_call: Option<String>,
    usage: Usage,
    finished: bool,
    stopped: bool,
}

impl StreamTranslator {
    /// `model` is the name reported to the client.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            message_id: generate_id("msg"),
            model: model.into(),
            line_buffer: Vec::new(),
            block_index: 0,
            open_block: None,
            tool_arguments: HashMap::new(),
            tool_indices: HashMap::new(),
            active_tool_call: None,
            usage: Usage::default(),
            finished: false,
            stopped: false,
        }
    }

    /// The `message_start` event. Emitted before any upstream byte is read.
    pub fn start(&self) -> StreamEvent {
        StreamEvent::MessageStart {
            message: MessagesResponse {
                id: self.message_id.clone(),
                kind: "message".to_string(),
                role: "assistant".to_string(),
                model: self.model.clone(),
                content: Vec::new(),
                stop_reason: None,
                stop_sequence: None,
                usage: Usage::default(),
            },
        }
    }

    /// Feed raw upstream bytes. Returns the events produced by every complete line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        // The retained tail holds no newline, so only the new bytes need scanning.
        let mut scan_from = self.line_buffer.len();
        let mut line_start = 0;
        self.line_buffer.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(rel) = self.line_buffer[scan_from..].iter().position(|b| *b == b'\n') {
            let end = scan_from + rel;
            let line = String::from_utf8_lossy(&self.line_buffer[line_start..end]).into_owned();
            self.handle_line(&line, &mut out);
            line_start = end + 1;
            scan_from = line_start;
        }
        self.line_buffer.drain(..line_start);
        out
    }

    /// Close the stream. Yields `message_stop` exactly once; later calls return nothing.
    ///
    /// A partial trailing line is discarded.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.stopped {
            return Vec::new();
        }
        self.stopped = true;
        if !self.line_buffer.is_empty() {
            tracing::debug!(
                bytes = self.line_buffer.len(),
                "discarding incomplete trailing SSE line"
            );
            self.line_buffer.clear();
        }

        let mut out = Vec::new();
        if !self.finished {
            tracing::warn!("upstream stream ended without a finish_reason");
            // Leave no block dangling.
            self.close_block(&mut out);
        }
        out.push(StreamEvent::MessageStop);
        out
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    fn handle_line(&mut self, line: &str, out: &mut Vec<StreamEvent>) {
        let line = line.trim();
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            return;
        }
        match serde_json::from_str::<ChatCompletionChunk>(data) {
            Ok(chunk) => self.handle_chunk(chunk, out),
            Err(e) => tracing::debug!(error = %e, "skipping unparsable SSE payload"),
        }
    }

    fn handle_chunk(&mut self, chunk: ChatCompletionChunk, out: &mut Vec<StreamEvent>) {
        if let Some(usage) = chunk.usage {
            if let Some(prompt) = usage.prompt_tokens {
                self.usage.input_tokens = prompt;
            }
            if let Some(completion) = usage.completion_tokens {
                self.usage.output_tokens = completion;
            }
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };
        if let Some(delta) = choice.delta {
            self.handle_delta(delta, out);
        }
        if let Some(reason) = choice.finish_reason.filter(|r| !r.is_empty()) {
            self.handle_finish(&reason, out);
        }
    }

    fn handle_delta(&mut self, delta: ChatDelta, out: &mut Vec<StreamEvent>) {
        if self.finished {
            return;
        }

        let text = delta
            .content
            .filter(|t| !t.is_empty())
            .or(delta.reasoning_content.filter(|t| !t.is_empty()));
        if let Some(text) = text {
            if self.open_block != Some(OpenBlock::Text) {
                self.close_block(out);
                self.open(OpenBlock::Text, ContentBlock::text(""), out);
            }
            out.push(StreamEvent::ContentBlockDelta {
                index: self.block_index,
                delta: BlockDelta::TextDelta { text },
            });
        }

        for fragment in delta.tool_calls.into_iter().flatten() {
            self.handle_tool_fragment(fragment, out);
        }
    }

    fn handle_tool_fragment(&mut self, fragment: ToolCallDelta, out: &mut Vec<StreamEvent>) {
        let (name, arguments) = match fragment.function {
            Some(f) => (f.name, f.arguments),
            None => (None, None),
        };

        let known_id = fragment
            .id
            .as_ref()
            .filter(|id| !id.is_empty())
            .filter(|id| self.tool_arguments.contains_key(id.as_str()))
            .cloned();
        let call_id = match (fragment.id.filter(|id| !id.is_empty()), known_id) {
            (Some(_), Some(id)) => id,
            (Some(new_id), None) => {
                self.open_tool_call(new_id.clone(), fragment.index, name, out);
                new_id
            }
            (None, _) => {
                let bound = fragment
                    .index
                    .and_then(|i| self.tool_indices.get(&i).cloned())
                    .or_else(|| self.active_tool_call.clone());
                match bound {
                    Some(id) => id,
                    None => match name.filter(|n| !n.is_empty()) {
                        Some(name) => {
                            let id = generate_id("toolu");
                            self.open_tool_call(id.clone(), fragment.index, Some(name), out);
                            id
                        }
                        None => {
                            tracing::debug!("dropping tool call fragment with no id or binding");
                            return;
                        }
                    },
                }
            }
        };

        let Some(arguments) = arguments.filter(|a| !a.is_empty()) else {
            return;
        };
        self.tool_arguments
            .entry(call_id.clone())
            .or_default()
            .push_str(&arguments);
        if self.open_block == Some(OpenBlock::ToolUse(call_id.clone())) {
            out.push(StreamEvent::ContentBlockDelta {
                index: self.block_index,
                delta: BlockDelta::InputJsonDelta {
                    partial_json: arguments,
                },
            });
        } else {
            tracing::debug!(tool_call_id = %call_id, "arguments for a closed tool_use block");
        }
    }

    fn open_tool_call(
        &mut self,
        id: String,
        upstream_index: Option<u32>,
        name: Option<String>,
        out: &mut Vec<StreamEvent>,
    ) {
        self.close_block(out);
        self.tool_arguments.insert(id.clone(), String::new());
        if let Some(i) = upstream_index {
            self.tool_indices.insert(i, id.clone());
        }
        self.active_tool_call = Some(id.clone());
        let block = ContentBlock::ToolUse {
            id: id.clone(),
            name: name.unwrap_or_default(),
            input: json!({}),
        };
        self.open(OpenBlock::ToolUse(id), block, out);
    }

    fn handle_finish(&mut self, reason: &str, out: &mut Vec<StreamEvent>) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.close_block(out);
        out.push(StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: map_finish_reason(Some(reason)),
                stop_sequence: None,
            },
            usage: DeltaUsage {
                output_tokens: self.usage.output_tokens,
            },
        });
    }

    fn open(&mut self, block: OpenBlock, content_block: ContentBlock, out: &mut Vec<StreamEvent>) {
        out.push(StreamEvent::ContentBlockStart {
            index: self.block_index,
            content_block,
        });
        self.open_block = Some(block);
    }

    fn close_block(&mut self, out: &mut Vec<StreamEvent>) {
        if self.open_block.take().is_some() {
            out.push(StreamEvent::ContentBlockStop {
                index: self.block_index,
            });
            self.block_index += 1;
        }
    }
}

/// Encode one event as an SSE frame: `event: <type>\ndata: <json>\n\n`.
pub fn encode_sse(event: &StreamEvent) -> Bytes {
    let data = match serde_json::to_string(event) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize stream event");
            "{}".to_string()
        }
    };
    Bytes::from(format!("event: {}\ndata: {}\n\n", event.event_type(), data))
}

/// Translate an upstream Chat Completions SSE byte stream into a Messages SSE byte stream.
///
/// `message_start` is yielded before the upstream is polled and `message_stop` always ends
/// the output, including when the upstream fails mid-stream. Items are produced on demand;
/// dropping the returned stream drops `upstream`.
pub fn translate_sse_stream<S, E>(
    upstream: S,
    model: String,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let upstream = Box::pin(upstream);
    let translator = StreamTranslator::new(model);
    let mut pending = VecDeque::new();
    pending.push_back(encode_sse(&translator.start()));

    futures_util::stream::unfold(
        (upstream, translator, pending, false),
        |(mut upstream, mut translator, mut pending, mut done)| async move {
            loop {
                if let Some(frame) = pending.pop_front() {
                    return Some((Ok(frame), (upstream, translator, pending, done)));
                }
                if done {
                    return None;
                }
                match upstream.next().await {
                    Some(Ok(bytes)) => {
                        pending.extend(translator.push(&bytes).iter().map(encode_sse));
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "upstream stream failed");
                        pending.extend(translator.finish().iter().map(encode_sse));
                        done = true;
                    }
                    None => {
                        pending.extend(translator.finish().iter().map(encode_sse));
                        done = true;
                    }
                }
            }
        },
    )
}
