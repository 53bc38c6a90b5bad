use super::ChatSession;
use crate::types::{ApiMessage, Content, ContentBlock};

pub(super) const MAX_HISTORY_MESSAGES: usize = 50;
const TOOL_RESULT_RECENT_WINDOW: usize = 10;
const TOOL_RESULT_TRUNCATE_CHARS: usize = 500;
const TRUNCATION_MARKER: &str = " [...truncated]";

impl ChatSession {
    /// Bound memory and request size: evict the oldest messages once the
    /// history doubles the cap, and shrink tool-result payloads that fell
    /// out of the recency window. Runs at round entry, never against a
    /// request already in flight.
    pub(super) fn trim_history(&mut self) {
        if self.history.len() > MAX_HISTORY_MESSAGES * 2 {
            let keep_from = self.history.len() - MAX_HISTORY_MESSAGES;
            self.history.drain(..keep_from);

            // The provider requires history to open with a plain user
            // message; a leading tool_result without its assistant tool_use
            // is rejected.
            while let Some(first) = self.history.first() {
                if first.role == "user" && !message_contains_tool_result(first) {
                    break;
                }
                self.history.remove(0);
            }
        }

        if self.history.len() > TOOL_RESULT_RECENT_WINDOW {
            let cutoff = self.history.len() - TOOL_RESULT_RECENT_WINDOW;
            for message in &mut self.history[..cutoff] {
                truncate_tool_results(message);
            }
        }
    }
}

pub(super) fn message_contains_tool_result(message: &ApiMessage) -> bool {
    match &message.content {
        Content::Blocks(blocks) => blocks
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolResult { .. })),
        Content::Text(_) => false,
    }
}

fn truncate_tool_results(message: &mut ApiMessage) {
    let Content::Blocks(blocks) = &mut message.content else {
        return;
    };
    for block in blocks {
        if let ContentBlock::ToolResult { content, .. } = block {
            if content.chars().count() > TOOL_RESULT_TRUNCATE_CHARS {
                let mut shortened: String =
                    content.chars().take(TOOL_RESULT_TRUNCATE_CHARS).collect();
                shortened.push_str(TRUNCATION_MARKER);
                *content = shortened;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_text(text: &str) -> ApiMessage {
        ApiMessage {
            role: "user".to_string(),
            content: Content::Text(text.to_string()),
        }
    }

    fn user_tool_result(content: &str) -> ApiMessage {
        ApiMessage {
            role: "user".to_string(),
            content: Content::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: "toolu_1".to_string(),
                content: content.to_string(),
                is_error: false,
            }]),
        }
    }

    #[test]
    fn test_truncates_tool_results_beyond_recency_window() {
        let mut message = user_tool_result(&"x".repeat(3_000));
        truncate_tool_results(&mut message);
        let Content::Blocks(blocks) = &message.content else {
            panic!("expected blocks");
        };
        let ContentBlock::ToolResult { content, .. } = &blocks[0] else {
            panic!("expected tool_result");
        };
        assert!(content.ends_with(TRUNCATION_MARKER));
        assert!(content.chars().count() < 3_000);
    }

    #[test]
    fn test_short_tool_results_left_unchanged() {
        let mut message = user_tool_result("small");
        truncate_tool_results(&mut message);
        let Content::Blocks(blocks) = &message.content else {
            panic!("expected blocks");
        };
        let ContentBlock::ToolResult { content, .. } = &blocks[0] else {
            panic!("expected tool_result");
        };
        assert_eq!(content, "small");
    }

    #[test]
    fn test_message_contains_tool_result_detection() {
        assert!(message_contains_tool_result(&user_tool_result("x")));
        assert!(!message_contains_tool_result(&user_text("x")));
    }
}
