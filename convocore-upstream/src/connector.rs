use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use convocore_core::events::OutboundEvent;
use convocore_core::stores::ToolHandler;
use convocore_core::types::{MessagePart, NormalizedTurn, Role, UserId};
use futures::StreamExt;
use tokio::sync::mpsc::Sender;
use tokio::time::Instant;

use crate::credential::CredentialCache;
use crate::gemini::model::{GenerateContentRequest, WireContent, WireFunctionCall, WireFunctionResponse, WirePart};

pub const API_TIMEOUT: Duration = Duration::from_secs(60);
pub const MAX_RESPONSE_CHARS: usize = 50_000;
pub const MAX_TOOL_RESULT_CHARS: usize = 10_000;
pub const MAX_TOOL_CALLS_PER_MESSAGE: usize = 5;

/// Per-call context accompanying a [`UpstreamConnector::send_message`]
/// invocation (spec.md §4.5 `context`).
pub struct SendContext {
    pub user_id: UserId,
    pub credential: Option<String>,
}

/// Result of one `send_message` call (spec.md §4.5 `Outcome`).
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    pub text: String,
    pub blocked: bool,
    pub timed_out: bool,
    pub had_tool_calls: bool,
    pub tool_names: Vec<String>,
}

/// Streams a generation turn, bounding length and wall-clock, mediating
/// tool calls, and demultiplexing safety blocks (spec.md §4.5).
pub struct UpstreamConnector {
    credentials: Arc<CredentialCache>,
    tools: Arc<HashMap<String, Arc<dyn ToolHandler>>>,
}

enum StreamOutcome {
    Blocked(String),
    ToolCalls(Vec<WireFunctionCall>),
    TimedOut,
    Completed,
}

impl UpstreamConnector {
    pub fn new(credentials: Arc<CredentialCache>, tools: Arc<HashMap<String, Arc<dyn ToolHandler>>>) -> Self {
        Self { credentials, tools }
    }

    pub async fn send_message(
        &self,
        events: &Sender<OutboundEvent>,
        chat_id: &str,
        normalized_history: &[NormalizedTurn],
        message_parts: &[MessagePart],
        context: &SendContext,
    ) -> Outcome {
        let handle = match self.credentials.get(context.credential.as_deref()).await {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!(user_id = %context.user_id, error = %err, "failed to resolve upstream client");
                let _ = events.send(OutboundEvent::terminal(chat_id, apology())).await;
                return Outcome::default();
            }
        };

        let mut contents = wire_contents_from_history(normalized_history);
        contents.push(WireContent { role: "user".to_string(), parts: to_wire_parts(message_parts) });
        let deadline = Instant::now() + API_TIMEOUT;

        let stream = match tokio::time::timeout_at(deadline, handle.client.generate_content_stream(&GenerateContentRequest { contents: contents.clone() })).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                tracing::error!(error = %err, "failed to open upstream stream");
                let _ = events.send(OutboundEvent::terminal(chat_id, apology())).await;
                return Outcome::default();
            }
            Err(_) => {
                let _ = events.send(OutboundEvent::terminal(chat_id, timeout_message())).await;
                return Outcome { timed_out: true, ..Outcome::default() };
            }
        };

        let mut accumulator = String::new();
        match self.drain_stream(stream, deadline, events, chat_id, &mut accumulator).await {
            StreamOutcome::Blocked(reason) => {
                tracing::warn!(reason, "upstream generation blocked by safety filter");
                let _ = events.send(OutboundEvent::terminal(chat_id, blocked_message())).await;
                Outcome { blocked: true, ..Outcome::default() }
            }
            StreamOutcome::TimedOut => {
                let _ = events.send(OutboundEvent::terminal(chat_id, timeout_message())).await;
                Outcome { timed_out: true, ..Outcome::default() }
            }
            StreamOutcome::ToolCalls(calls) => self.handle_tool_calls(calls, contents, handle, deadline, events, chat_id, accumulator, context).await,
            StreamOutcome::Completed => {
                if accumulator.is_empty() {
                    let _ = events.send(OutboundEvent::terminal(chat_id, apology())).await;
                    return Outcome::default();
                }
                if accumulator.contains("[object Object]") {
                    tracing::error!(chat_id, "final response text contains the literal \"[object Object]\"; delivering anyway");
                }
                let _ = events.send(OutboundEvent::terminal(chat_id, String::new())).await;
                Outcome { text: accumulator, ..Outcome::default() }
            }
        }
    }

    /// Forwards chunks until the stream ends, a safety block fires, a
    /// tool call is detected, the response cap is hit, or the deadline
    /// expires.
    async fn drain_stream(
        &self,
        mut stream: futures::stream::BoxStream<'static, Result<crate::gemini::model::GenerateContentChunk, crate::gemini::error::Error>>,
        deadline: Instant,
        events: &Sender<OutboundEvent>,
        chat_id: &str,
        accumulator: &mut String,
    ) -> StreamOutcome {
        loop {
            let next = match tokio::time::timeout_at(deadline, stream.next()).await {
                Ok(next) => next,
                Err(_) => return StreamOutcome::TimedOut,
            };
            let Some(chunk) = next else {
                return StreamOutcome::Completed;
            };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    tracing::error!(error = %err, "error decoding upstream chunk");
                    continue;
                }
            };

            if let Some(reason) = chunk.block_reason() {
                return StreamOutcome::Blocked(reason.to_string());
            }
            if chunk.finish_reason() == Some("SAFETY") {
                return StreamOutcome::Blocked("SAFETY".to_string());
            }

            let calls = chunk.function_calls();
            if !calls.is_empty() {
                return StreamOutcome::ToolCalls(calls);
            }

            let text = chunk.text();
            if text.is_empty() {
                continue;
            }
            if accumulator.len() + text.len() > MAX_RESPONSE_CHARS {
                return StreamOutcome::Completed;
            }
            accumulator.push_str(&text);
            let _ = events.send(OutboundEvent::message_chunk(chat_id, text)).await;
        }
    }

    async fn handle_tool_calls(
        &self,
        calls: Vec<WireFunctionCall>,
        mut contents: Vec<WireContent>,
        handle: crate::credential::ClientHandle,
        deadline: Instant,
        events: &Sender<OutboundEvent>,
        chat_id: &str,
        mut accumulator: String,
        _context: &SendContext,
    ) -> Outcome {
        let mut calls = calls;
        if calls.len() > MAX_TOOL_CALLS_PER_MESSAGE {
            tracing::warn!(requested = calls.len(), "truncating tool calls to the per-message cap");
            calls.truncate(MAX_TOOL_CALLS_PER_MESSAGE);
        }

        let mut tool_names = Vec::with_capacity(calls.len());
        let mut response_parts = Vec::with_capacity(calls.len());

        for call in &calls {
            tool_names.push(call.name.clone());
            let remaining = deadline.saturating_duration_since(Instant::now()).max(Duration::from_secs(1));
            let result_text = match self.tools.get(&call.name) {
                Some(handler) => match tokio::time::timeout(remaining, handler.call(call.args.clone())).await {
                    Ok(Ok(value)) => stringify_result(&value),
                    Ok(Err(err)) => {
                        tracing::error!(tool = %call.name, error = %err, "tool handler returned an error");
                        "An error occurred while using this tool.".to_string()
                    }
                    Err(_) => {
                        tracing::error!(tool = %call.name, "tool handler timed out");
                        "This tool took too long to respond.".to_string()
                    }
                },
                None => format!("The tool \"{}\" is not available.", call.name),
            };
            let truncated = truncate_chars(&result_text, MAX_TOOL_RESULT_CHARS);
            response_parts.push(WirePart::FunctionResponse {
                function_response: WireFunctionResponse { name: call.name.clone(), response: serde_json::json!({ "result": truncated }) },
            });
        }

        contents.push(WireContent { role: "user".to_string(), parts: response_parts });

        let remaining = deadline.saturating_duration_since(Instant::now());
        let continuation = tokio::time::timeout(remaining, handle.client.generate_content_stream(&GenerateContentRequest { contents })).await;

        match continuation {
            Ok(Ok(stream)) => match self.drain_stream(stream, deadline, events, chat_id, &mut accumulator).await {
                StreamOutcome::Blocked(_) => {
                    let _ = events.send(OutboundEvent::terminal(chat_id, blocked_message())).await;
                    Outcome { blocked: true, had_tool_calls: true, tool_names, ..Outcome::default() }
                }
                StreamOutcome::TimedOut => {
                    let _ = events.send(OutboundEvent::terminal(chat_id, timeout_message())).await;
                    Outcome { timed_out: true, had_tool_calls: true, tool_names, ..Outcome::default() }
                }
                StreamOutcome::ToolCalls(_) | StreamOutcome::Completed => {
                    let _ = events.send(OutboundEvent::terminal(chat_id, String::new())).await;
                    Outcome { text: accumulator, had_tool_calls: true, tool_names, ..Outcome::default() }
                }
            },
            Ok(Err(err)) => {
                tracing::error!(error = %err, "failed to open continuation stream after tool call");
                let _ = events.send(OutboundEvent::terminal(chat_id, apology())).await;
                Outcome { had_tool_calls: true, tool_names, ..Outcome::default() }
            }
            Err(_) => {
                let _ = events.send(OutboundEvent::terminal(chat_id, timeout_message())).await;
                Outcome { timed_out: true, had_tool_calls: true, tool_names, ..Outcome::default() }
            }
        }
    }
}

fn wire_contents_from_history(history: &[NormalizedTurn]) -> Vec<WireContent> {
    history
        .iter()
        .map(|turn| WireContent {
            role: match turn.role {
                Role::User => "user".to_string(),
                Role::Model => "model".to_string(),
            },
            parts: to_wire_parts(&turn.parts),
        })
        .collect()
}

fn to_wire_parts(parts: &[MessagePart]) -> Vec<WirePart> {
    parts
        .iter()
        .map(|part| match part {
            MessagePart::Text { text } => WirePart::Text { text: text.clone() },
            MessagePart::InlineData { inline_data } => WirePart::InlineData {
                inline_data: crate::gemini::model::WireInlineData { mime_type: inline_data.mime.clone(), data: inline_data.base64_data.clone() },
            },
            MessagePart::FunctionResponse { function_response } => WirePart::FunctionResponse {
                function_response: WireFunctionResponse {
                    name: function_response.name.clone(),
                    response: serde_json::json!({ "result": function_response.result }),
                },
            },
        })
        .collect()
}

fn stringify_result(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

fn apology() -> &'static str {
    "Sorry, something went wrong while generating a response. Please try again."
}

fn timeout_message() -> &'static str {
    "This is taking longer than expected. Please try again in a moment."
}

fn blocked_message() -> &'static str {
    "I'm not able to respond to that request."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }

    #[test]
    fn stringify_passes_through_plain_strings() {
        assert_eq!(stringify_result(&serde_json::json!("sunny")), "sunny");
        assert_eq!(stringify_result(&serde_json::json!({"temp": 70})), "{\"temp\":70}");
    }
}
