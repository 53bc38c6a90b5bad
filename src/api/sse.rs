use crate::api::logging::emit_sse_parse_error;
use serde_json::Value;
use tracing::debug;

/// Normalized events decoded from the relay's SSE stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    TextDelta(String),
    ToolUseStart {
        id: String,
        name: String,
    },
    /// Raw `input_json_delta` fragment, as received. Consumers that want the
    /// early field view feed these into a `JsonFieldExtractor`.
    ToolInputDelta {
        fragment: String,
    },
    /// The tool block closed; `input` is the parsed accumulation, or
    /// `{"raw": <accumulated>}` when it was not valid JSON.
    ToolUseComplete {
        id: String,
        name: String,
        input: Value,
    },
    StopReason(String),
    Done,
    Error(String),
}

#[derive(Debug)]
struct OpenTool {
    id: String,
    name: String,
    input_json: String,
}

/// Incremental SSE decoder. Accepts network chunks of any size and returns
/// the complete events they produced, in arrival order. A trailing partial
/// line — and a trailing incomplete UTF-8 sequence — carry over to the next
/// call. After `Done` or `Error` the parser ignores further input.
///
/// Dispatch is driven by each `data:` payload's own `type` field; the SSE
/// `event:` line is not authoritative. Unparseable payloads are skipped.
#[derive(Default)]
pub struct SseParser {
    buffer: String,
    utf8_tail: Vec<u8>,
    open_tool: Option<OpenTool>,
    finished: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn process(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        let decoded = self.decode_utf8(chunk);
        self.buffer.push_str(&decoded);

        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            self.process_line(line.trim_end_matches(['\n', '\r']), &mut events);
            if self.finished {
                break;
            }
        }

        events
    }

    /// Decode as much of `chunk` as possible, holding back an incomplete
    /// trailing multi-byte sequence for the next call. Invalid bytes in the
    /// middle of the stream become replacement characters.
    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.utf8_tail);
        bytes.extend_from_slice(chunk);

        let mut out = String::new();
        let mut offset = 0;
        while offset < bytes.len() {
            match std::str::from_utf8(&bytes[offset..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    offset = bytes.len();
                }
                Err(error) => {
                    let valid_end = offset + error.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&bytes[offset..valid_end]));
                    match error.error_len() {
                        Some(invalid) => {
                            out.push('\u{FFFD}');
                            offset = valid_end + invalid;
                        }
                        None => {
                            self.utf8_tail = bytes[valid_end..].to_vec();
                            return out;
                        }
                    }
                }
            }
        }
        out
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<SseEvent>) {
        if line.starts_with("event: done") {
            events.push(SseEvent::Done);
            self.finished = true;
            return;
        }

        let Some(payload) = line.strip_prefix("data: ") else {
            return;
        };
        let payload = payload.trim();
        if payload == "[DONE]" {
            events.push(SseEvent::Done);
            self.finished = true;
            return;
        }

        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(error) => {
                // Malformed data lines are skipped, not fatal; upstream
                // providers occasionally emit glitches mid-stream.
                debug!(%error, "skipping unparseable SSE data line");
                emit_sse_parse_error(payload, &error);
                return;
            }
        };

        if let Some(error) = value.get("error") {
            events.push(SseEvent::Error(describe_error_payload(error)));
            self.finished = true;
            return;
        }

        match value.get("type").and_then(Value::as_str) {
            Some("content_block_start") => {
                let block = &value["content_block"];
                if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                    let id = string_field(block, "id");
                    let name = string_field(block, "name");
                    self.open_tool = Some(OpenTool {
                        id: id.clone(),
                        name: name.clone(),
                        input_json: String::new(),
                    });
                    events.push(SseEvent::ToolUseStart { id, name });
                }
            }
            Some("content_block_delta") => {
                let delta = &value["delta"];
                match delta.get("type").and_then(Value::as_str) {
                    Some("text_delta") => {
                        if let Some(text) = delta.get("text").and_then(Value::as_str) {
                            events.push(SseEvent::TextDelta(text.to_string()));
                        }
                    }
                    Some("input_json_delta") => {
                        let Some(open) = self.open_tool.as_mut() else {
                            return;
                        };
                        if let Some(fragment) = delta.get("partial_json").and_then(Value::as_str) {
                            open.input_json.push_str(fragment);
                            events.push(SseEvent::ToolInputDelta {
                                fragment: fragment.to_string(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            Some("content_block_stop") => {
                if let Some(open) = self.open_tool.take() {
                    events.push(SseEvent::ToolUseComplete {
                        id: open.id,
                        name: open.name,
                        input: parse_tool_input(&open.input_json),
                    });
                }
            }
            Some("message_delta") => {
                if let Some(stop_reason) = value
                    .get("delta")
                    .and_then(|d| d.get("stop_reason"))
                    .and_then(Value::as_str)
                {
                    events.push(SseEvent::StopReason(stop_reason.to_string()));
                }
            }
            _ => {}
        }
    }
}

fn parse_tool_input(accumulated: &str) -> Value {
    if accumulated.is_empty() {
        return serde_json::json!({});
    }
    // Malformed accumulations are wrapped, never propagated as failures.
    serde_json::from_str(accumulated)
        .unwrap_or_else(|_| serde_json::json!({ "raw": accumulated }))
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn describe_error_payload(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        other => other
            .get("message")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .unwrap_or_else(|| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tool_input_parses_to_empty_object() {
        assert_eq!(parse_tool_input(""), serde_json::json!({}));
    }

    #[test]
    fn test_malformed_tool_input_wraps_raw_accumulation() {
        let parsed = parse_tool_input("{\"path\": \"a.ts");
        assert_eq!(parsed["raw"], "{\"path\": \"a.ts");
    }

    #[test]
    fn test_error_payload_description_prefers_message_field() {
        let error = serde_json::json!({ "type": "overloaded_error", "message": "busy" });
        assert_eq!(describe_error_payload(&error), "busy");
        assert_eq!(
            describe_error_payload(&serde_json::json!("plain")),
            "plain"
        );
    }
}
