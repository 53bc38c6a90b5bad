use super::ChatSession;
use crate::api::{ChatRequest, ExtractorEvent, JsonFieldExtractor, SseEvent, SseParser};
use crate::events::{ToolRunStatus, UiEvent};
use crate::tools::builtin_tool_schemas;
use crate::types::{ApiMessage, Content, ContentBlock, ToolCallData};
use anyhow::Result;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Hard ceiling on request/stream/execute cycles within one user turn.
pub const MAX_TOOL_ROUNDS: usize = 20;

const ROUND_LIMIT_NOTICE: &str =
    "\n\nTool-use round limit reached; stopping here. Send a follow-up message to continue.";

const SYSTEM_PROMPT: &str = "You are a coding assistant embedded in an editor.\n\
Use the provided tools to read and modify files in the user's workspace.\n\
When creating or rewriting a file, send the complete file content through write_file.\n\
For small changes, prefer edit_file with an exact snippet of the current content.\n\
After each tool_result, continue the task or provide the final answer.";

/// Extractor wiring for one streaming `write_file` call: the early field
/// view drives the live file preview while the canonical input is still
/// accumulating in the SSE parser.
struct FileStreamState {
    tool_id: String,
    extractor: JsonFieldExtractor,
    path: Option<String>,
}

impl FileStreamState {
    fn new(tool_id: String) -> Self {
        Self {
            tool_id,
            extractor: JsonFieldExtractor::new(&["path", "content"], "content"),
            path: None,
        }
    }
}

/// What one round of streaming produced.
struct RoundOutcome {
    assistant_text: String,
    queued_calls: Vec<ToolCallData>,
    stop_reason: Option<String>,
    stream_failed: bool,
    cancelled: bool,
}

impl ChatSession {
    /// Process one user turn end to end: expand, stream, run tools, repeat
    /// until a terminal stop reason or the round ceiling. Returns the final
    /// assistant text. Failures surface as UI error events; the session
    /// always comes back in a usable state.
    pub async fn handle_user_message(&mut self, text: String) -> Result<String> {
        let cancel = self.begin_turn();

        let expanded = self.slash_commands.expand_input(&text);
        let processed = self.pipeline.apply_preprocessors(&expanded);

        self.emit(UiEvent::UserMessage { text: text.clone() });
        self.history.push(ApiMessage {
            role: "user".to_string(),
            content: Content::Text(processed),
        });
        self.emit(UiEvent::AssistantStart);

        let context = self.collect_workspace_context();

        match self.run_rounds(SYSTEM_PROMPT, context, 0, cancel).await {
            Ok(final_text) => Ok(final_text),
            Err(error) => {
                self.emit(UiEvent::Error {
                    message: error.to_string(),
                });
                self.emit(UiEvent::AssistantDone);
                Ok(String::new())
            }
        }
    }

    fn collect_workspace_context(&self) -> Option<serde_json::Value> {
        let scanner = self.scanner.as_ref()?;
        match scanner.scan() {
            Ok(context) => {
                self.emit(UiEvent::WorkspaceInfo {
                    message: format!(
                        "Workspace context: {}/{} files",
                        context.included_files, context.total_files
                    ),
                });
                Some(context.to_request_json())
            }
            Err(error) => {
                debug!(%error, "workspace scan failed; continuing without context");
                None
            }
        }
    }

    /// The round loop. Iterative rather than recursive: the counter makes
    /// the ceiling and cancellation checks explicit and keeps the stack
    /// flat across long tool conversations.
    pub(super) async fn run_rounds(
        &mut self,
        system_prompt: &str,
        context: Option<serde_json::Value>,
        start_round: usize,
        cancel: CancellationToken,
    ) -> Result<String> {
        let mut round = start_round;

        loop {
            if round >= MAX_TOOL_ROUNDS {
                self.emit(UiEvent::AssistantDelta {
                    text: ROUND_LIMIT_NOTICE.to_string(),
                });
                self.emit(UiEvent::AssistantDone);
                return Ok(ROUND_LIMIT_NOTICE.trim_start().to_string());
            }
            round += 1;

            self.trim_history();

            let mut tools = builtin_tool_schemas();
            tools.extend(self.tool_registry.schemas());
            let request = ChatRequest {
                messages: self.history.clone(),
                system_prompt: system_prompt.to_string(),
                codebase_context: context.clone(),
                tools,
            };

            let stream = self.client.post_chat_stream(&request).await?;
            let outcome = self.stream_one_round(stream, &cancel).await;

            if outcome.cancelled {
                // Superseded by a newer turn; its accumulators die here and
                // nothing more is appended to history.
                return Ok(outcome.assistant_text);
            }

            let tool_round = !outcome.stream_failed
                && outcome.stop_reason.as_deref() == Some("tool_use")
                && !outcome.queued_calls.is_empty();

            if !tool_round {
                let final_text = self.pipeline.apply_postprocessors(&outcome.assistant_text);
                if !final_text.is_empty() {
                    self.history.push(ApiMessage {
                        role: "assistant".to_string(),
                        content: Content::Text(final_text.clone()),
                    });
                }
                self.emit(UiEvent::AssistantDone);
                return Ok(final_text);
            }

            // One assistant message carrying the text so far plus every
            // tool_use block, then one user message with all results, in
            // call order. The provider rejects any other shape.
            let mut assistant_blocks = Vec::new();
            if !outcome.assistant_text.is_empty() {
                assistant_blocks.push(ContentBlock::Text {
                    text: outcome.assistant_text.clone(),
                });
            }
            for call in &outcome.queued_calls {
                assistant_blocks.push(ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.input.clone(),
                });
            }
            self.history.push(ApiMessage {
                role: "assistant".to_string(),
                content: Content::Blocks(assistant_blocks),
            });

            let mut result_blocks = Vec::new();
            for call in &outcome.queued_calls {
                self.emit(UiEvent::ToolStatus {
                    id: call.id.clone(),
                    status: ToolRunStatus::Running,
                });
                let (tool_outcome, status) = self.execute_tool(call).await;
                self.emit(UiEvent::ToolStatus {
                    id: call.id.clone(),
                    status,
                });
                result_blocks.push(ContentBlock::ToolResult {
                    tool_use_id: call.id.clone(),
                    content: tool_outcome.content,
                    is_error: tool_outcome.is_error,
                });
            }
            self.history.push(ApiMessage {
                role: "user".to_string(),
                content: Content::Blocks(result_blocks),
            });
        }
    }

    /// Consume one SSE stream to its end, surfacing deltas as they arrive
    /// and driving the progressive writer for streamed `write_file` input.
    /// All accumulators live in this frame; an aborted stream cannot leak
    /// into a later round.
    async fn stream_one_round(
        &mut self,
        mut stream: crate::api::client::ByteStream,
        cancel: &CancellationToken,
    ) -> RoundOutcome {
        let mut parser = SseParser::new();
        let mut outcome = RoundOutcome {
            assistant_text: String::new(),
            queued_calls: Vec::new(),
            stop_reason: None,
            stream_failed: false,
            cancelled: false,
        };
        let mut file_stream: Option<FileStreamState> = None;

        'stream: loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => {
                    outcome.cancelled = true;
                    break 'stream;
                }
                next = stream.next() => match next {
                    None => break 'stream,
                    Some(Ok(chunk)) => chunk,
                    Some(Err(error)) => {
                        self.emit(UiEvent::Error {
                            message: error.to_string(),
                        });
                        outcome.stream_failed = true;
                        break 'stream;
                    }
                }
            };

            for event in parser.process(&chunk) {
                match event {
                    SseEvent::TextDelta(text) => {
                        outcome.assistant_text.push_str(&text);
                        self.emit(UiEvent::AssistantDelta { text });
                    }
                    SseEvent::ToolUseStart { id, name } => {
                        self.emit(UiEvent::ToolCallStarted {
                            id: id.clone(),
                            name: name.clone(),
                        });
                        if name == "write_file" {
                            file_stream = Some(FileStreamState::new(id));
                        }
                    }
                    SseEvent::ToolInputDelta { fragment } => {
                        if let Some(state) = file_stream.as_mut() {
                            let events = state.extractor.feed(&fragment);
                            self.apply_extractor_events(state, events).await;
                        }
                    }
                    SseEvent::ToolUseComplete { id, name, input } => {
                        // The completed JSON is now authoritative; the
                        // extractor's streamed reconstruction is discarded.
                        if file_stream.as_ref().is_some_and(|s| s.tool_id == id) {
                            file_stream = None;
                        }
                        outcome.queued_calls.push(ToolCallData { id, name, input });
                    }
                    SseEvent::StopReason(reason) => {
                        outcome.stop_reason = Some(reason);
                    }
                    SseEvent::Done => break 'stream,
                    SseEvent::Error(message) => {
                        self.emit(UiEvent::Error { message });
                        outcome.stream_failed = true;
                        break 'stream;
                    }
                }
            }
        }

        // Never leave a dangling preview session behind, whatever ended the
        // stream.
        if file_stream.is_some() {
            self.writer.finalize().await;
        }

        outcome
    }

    async fn apply_extractor_events(
        &self,
        state: &mut FileStreamState,
        events: Vec<ExtractorEvent>,
    ) {
        for event in events {
            match event {
                ExtractorEvent::KeyValue { key, value } => {
                    if key == "path" && state.path.is_none() {
                        if self.writer.open_for_streaming(&value).await {
                            self.emit(UiEvent::ToolFilePathKnown {
                                id: state.tool_id.clone(),
                                path: value.clone(),
                            });
                            state.path = Some(value);
                        }
                    }
                }
                ExtractorEvent::ContentChunk { value } => {
                    self.writer.append_content(&value).await;
                }
                ExtractorEvent::ContentDone => {
                    self.writer.finalize().await;
                    if let Some(path) = &state.path {
                        self.emit(UiEvent::ToolFileContentComplete {
                            id: state.tool_id.clone(),
                            path: path.clone(),
                        });
                    }
                }
            }
        }
    }
}
