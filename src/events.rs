use serde::Serialize;
use tokio::sync::mpsc;

pub type UiEventSender = mpsc::UnboundedSender<UiEvent>;

/// Discrete events surfaced to the embedding chat UI. Within one turn they
/// arrive in the order the underlying stream produced them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    UserMessage {
        text: String,
    },
    AssistantStart,
    AssistantDelta {
        text: String,
    },
    ToolCallStarted {
        id: String,
        name: String,
    },
    /// The streamed `write_file` input revealed its target path.
    ToolFilePathKnown {
        id: String,
        path: String,
    },
    /// The streamed `write_file` content finished arriving.
    ToolFileContentComplete {
        id: String,
        path: String,
    },
    ToolStatus {
        id: String,
        status: ToolRunStatus,
    },
    /// Progressive writer flushed more bytes; the UI should reveal the end of
    /// the file.
    FileStreamProgress {
        path: String,
        written: u64,
    },
    ToolConfirmationRequest {
        tool_id: String,
        description: String,
    },
    ToolConfirmationExpired {
        tool_id: String,
    },
    AssistantDone,
    Error {
        message: String,
    },
    WorkspaceInfo {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolRunStatus {
    Running,
    Complete,
    Failed,
    Denied,
}

/// Send an event, ignoring a disconnected UI. The core never fails a turn
/// because nobody is listening.
pub fn emit(events: &UiEventSender, event: UiEvent) {
    let _ = events.send(event);
}
