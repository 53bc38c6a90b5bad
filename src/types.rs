use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: String,
    pub content: Content,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// Provider content blocks. The serde shapes are the wire contract: a
/// `tool_use` block must be answered by a `tool_result` carrying the same id
/// in the immediately following user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// A completed tool invocation assembled from the stream. `input` is only
/// fully known at `content_block_stop`; the extractor provides an earlier
/// partial view of string fields for `write_file`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallData {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Outcome of one tool execution, before conversion into a `tool_result`
/// block. Failures are data here, never errors: every outcome goes back into
/// the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Tool description advertised to the model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_block_serializes_with_wire_tags() {
        let block = ContentBlock::ToolResult {
            tool_use_id: "toolu_1".to_string(),
            content: "ok".to_string(),
            is_error: false,
        };
        let json = serde_json::to_value(&block).expect("serialize block");
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["tool_use_id"], "toolu_1");
    }

    #[test]
    fn test_content_round_trips_text_and_blocks() {
        let message = ApiMessage {
            role: "assistant".to_string(),
            content: Content::Blocks(vec![ContentBlock::Text {
                text: "hello".to_string(),
            }]),
        };
        let json = serde_json::to_string(&message).expect("serialize message");
        let parsed: ApiMessage = serde_json::from_str(&json).expect("parse message");
        match parsed.content {
            Content::Blocks(blocks) => assert_eq!(blocks.len(), 1),
            Content::Text(_) => panic!("expected block content"),
        }
    }
}
