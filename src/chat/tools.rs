use super::ChatSession;
use crate::config::ConfirmationMode;
use crate::events::ToolRunStatus;
use crate::types::{ToolCallData, ToolOutcome};
use serde_json::Value;

impl ChatSession {
    /// Run one queued tool call. Never fails the loop: every outcome —
    /// success, filesystem error, denial, unknown tool — comes back as data
    /// for the `tool_result` block.
    pub(super) async fn execute_tool(&self, call: &ToolCallData) -> (ToolOutcome, ToolRunStatus) {
        let name = call.name.as_str();

        if self.requires_confirmation(name) {
            let description = describe_tool_action(name, &call.input);
            let approved = self.gate.request(&call.id, &description).await;
            if !approved {
                // A streamed write may already have previewed content on
                // disk; denial removes it.
                if name == "write_file" {
                    if let Some(path) = string_arg(&call.input, &["path", "file_path"]) {
                        self.writer.revert(path).await;
                    }
                }
                return (
                    ToolOutcome::error(format!("Tool call denied by user: {name}")),
                    ToolRunStatus::Denied,
                );
            }
        }

        let outcome = self.dispatch_tool(name, &call.input);
        let status = if outcome.is_error {
            ToolRunStatus::Failed
        } else {
            ToolRunStatus::Complete
        };
        (outcome, status)
    }

    fn requires_confirmation(&self, name: &str) -> bool {
        match self.confirmation_mode {
            ConfirmationMode::None => false,
            ConfirmationMode::WriteOnly => matches!(name, "write_file" | "edit_file"),
            ConfirmationMode::Always => true,
        }
    }

    fn dispatch_tool(&self, name: &str, input: &Value) -> ToolOutcome {
        match name {
            "read_file" => {
                let Some(path) = string_arg(input, &["path", "file_path"]) else {
                    return missing_arg(name, "path");
                };
                match self.operator.read_file(path) {
                    Ok(content) => ToolOutcome::ok(content),
                    Err(error) => ToolOutcome::error(error.to_string()),
                }
            }
            "write_file" => {
                let Some(path) = string_arg(input, &["path", "file_path"]) else {
                    return missing_arg(name, "path");
                };
                // The canonical content comes from the completed tool-call
                // JSON; the streamed preview is advisory only.
                let content = string_arg(input, &["content", "text"]).unwrap_or("");
                match self.operator.write_file(path, content) {
                    Ok(()) => {
                        let (chars, lines) = text_stats(content);
                        ToolOutcome::ok(format!(
                            "File written successfully: {path} ({chars} chars, {lines} lines)"
                        ))
                    }
                    Err(error) => ToolOutcome::error(error.to_string()),
                }
            }
            "edit_file" => {
                let Some(path) = string_arg(input, &["path", "file_path"]) else {
                    return missing_arg(name, "path");
                };
                let Some(old_text) = string_arg(input, &["old_text", "old_str"]) else {
                    return missing_arg(name, "old_text");
                };
                let new_text = string_arg(input, &["new_text", "new_str"]).unwrap_or("");
                match self.operator.edit_file(path, old_text, new_text) {
                    Ok(()) => ToolOutcome::ok(format!("File edited successfully: {path}")),
                    Err(error) => ToolOutcome::error(error.to_string()),
                }
            }
            "create_directory" => {
                let Some(path) = string_arg(input, &["path"]) else {
                    return missing_arg(name, "path");
                };
                match self.operator.create_directory(path) {
                    Ok(()) => ToolOutcome::ok(format!("Directory created: {path}")),
                    Err(error) => ToolOutcome::error(error.to_string()),
                }
            }
            "list_files" => {
                let path = string_arg(input, &["path"]);
                let pattern = string_arg(input, &["pattern"]);
                match self.operator.list_files(path, pattern) {
                    Ok(entries) if entries.is_empty() => ToolOutcome::ok("(no entries)"),
                    Ok(entries) => ToolOutcome::ok(entries.join("\n")),
                    Err(error) => ToolOutcome::error(error.to_string()),
                }
            }
            _ => match self.tool_registry.execute(name, input) {
                Some(outcome) => outcome,
                None => ToolOutcome::error(format!("Unknown tool: {name}")),
            },
        }
    }
}

fn string_arg<'a>(input: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| input.get(*key).and_then(Value::as_str))
        .filter(|value| !value.trim().is_empty())
}

fn missing_arg(tool: &str, key: &str) -> ToolOutcome {
    ToolOutcome::error(format!("Tool '{tool}' requires a non-empty '{key}' string"))
}

fn text_stats(text: &str) -> (usize, usize) {
    (text.chars().count(), text.lines().count())
}

pub(super) fn describe_tool_action(name: &str, input: &Value) -> String {
    match name {
        "write_file" => match string_arg(input, &["path", "file_path"]) {
            Some(path) => format!("Write file: {path}"),
            None => "Write file".to_string(),
        },
        "edit_file" => match string_arg(input, &["path", "file_path"]) {
            Some(path) => format!("Edit file: {path}"),
            None => "Edit file".to_string(),
        },
        _ => format!("Run tool: {name}"),
    }
}
