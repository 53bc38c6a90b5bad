use super::confirm::ConfirmationGate;
use crate::api::RelayClient;
use crate::config::{Config, ConfirmationMode};
use crate::events::{emit, UiEvent, UiEventSender};
use crate::plugin::{MessagePipeline, SlashCommandRegistry};
use crate::tools::{ToolOperator, ToolRegistry};
use crate::types::ApiMessage;
use crate::workspace::WorkspaceScanner;
use crate::writer::FileStreamWriter;
#[cfg(test)]
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Composition root for one chat conversation. Owns the conversation
/// history, the relay client, the tool surfaces, and the progressive file
/// writer; everything is constructed here, nothing is module-global.
pub struct ChatSession {
    pub(super) client: RelayClient,
    pub(super) operator: ToolOperator,
    pub(super) writer: FileStreamWriter,
    pub(super) gate: ConfirmationGate,
    pub(super) tool_registry: ToolRegistry,
    pub(super) slash_commands: SlashCommandRegistry,
    pub(super) pipeline: MessagePipeline,
    pub(super) scanner: Option<WorkspaceScanner>,
    pub(super) confirmation_mode: ConfirmationMode,
    pub(super) events: UiEventSender,
    pub(super) history: Vec<ApiMessage>,
    pub(super) turn_cancel: CancellationToken,
}

impl ChatSession {
    pub fn new(config: &Config, events: UiEventSender) -> Self {
        let scanner = if config.workspace_context_enabled {
            WorkspaceScanner::new(config.working_dir.clone()).ok()
        } else {
            None
        };

        Self {
            client: RelayClient::new(config),
            operator: ToolOperator::new(config.working_dir.clone()),
            writer: FileStreamWriter::new(config.working_dir.clone(), events.clone()),
            gate: ConfirmationGate::new(events.clone()),
            tool_registry: ToolRegistry::new(),
            slash_commands: SlashCommandRegistry::new(),
            pipeline: MessagePipeline::new(),
            scanner,
            confirmation_mode: config.confirmation_mode,
            events,
            history: Vec::new(),
            turn_cancel: CancellationToken::new(),
        }
    }

    #[cfg(test)]
    pub fn new_mock(
        client: RelayClient,
        working_dir: PathBuf,
        confirmation_mode: ConfirmationMode,
        events: UiEventSender,
    ) -> Self {
        Self {
            client,
            operator: ToolOperator::new(working_dir.clone()),
            writer: FileStreamWriter::new(working_dir, events.clone()),
            gate: ConfirmationGate::new(events.clone()),
            tool_registry: ToolRegistry::new(),
            slash_commands: SlashCommandRegistry::new(),
            pipeline: MessagePipeline::new(),
            scanner: None,
            confirmation_mode,
            events,
            history: Vec::new(),
            turn_cancel: CancellationToken::new(),
        }
    }

    /// Gate handle for the UI task that delivers confirmation answers.
    pub fn confirmation_gate(&self) -> ConfirmationGate {
        self.gate.clone()
    }

    pub fn tool_registry(&self) -> &ToolRegistry {
        &self.tool_registry
    }

    pub fn slash_commands(&self) -> &SlashCommandRegistry {
        &self.slash_commands
    }

    pub fn message_pipeline(&self) -> &MessagePipeline {
        &self.pipeline
    }

    pub fn history(&self) -> &[ApiMessage] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Token that aborts the currently running turn; a new turn supersedes
    /// it with a fresh one.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.turn_cancel.clone()
    }

    /// Cancel whatever turn is in flight and arm a fresh token for the next
    /// one. An aborted turn's accumulators are scoped to its own call frame,
    /// so its late completions cannot touch the new turn's history.
    pub(super) fn begin_turn(&mut self) -> CancellationToken {
        self.turn_cancel.cancel();
        self.turn_cancel = CancellationToken::new();
        self.turn_cancel.clone()
    }

    pub(super) fn emit(&self, event: UiEvent) {
        emit(&self.events, event);
    }
}
