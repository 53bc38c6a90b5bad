use crate::types::ToolSchema;
use serde_json::json;

/// Names the model may always call; plugin tools may not shadow them.
pub const BUILT_IN_TOOLS: [&str; 5] = [
    "read_file",
    "write_file",
    "edit_file",
    "create_directory",
    "list_files",
];

/// Schemas for the built-in tools, in the provider's
/// `{name, description, input_schema}` shape.
pub fn builtin_tool_schemas() -> Vec<ToolSchema> {
    let raw = json!([
        {
            "name": "read_file",
            "description": "Read the content of a file in the workspace.",
            "input_schema": {
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"]
            }
        },
        {
            "name": "write_file",
            "description": "Create or overwrite a file with the given content. Always send the complete file content.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "content": { "type": "string" }
                },
                "required": ["path", "content"]
            }
        },
        {
            "name": "edit_file",
            "description": "Edit an existing file by replacing one exact snippet (old_text -> new_text).",
            "input_schema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "old_text": { "type": "string" },
                    "new_text": { "type": "string" }
                },
                "required": ["path", "old_text", "new_text"]
            }
        },
        {
            "name": "create_directory",
            "description": "Create a directory (and any missing parents) in the workspace.",
            "input_schema": {
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"]
            }
        },
        {
            "name": "list_files",
            "description": "List files and directories under a path, optionally filtered by a name pattern.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "pattern": { "type": "string" }
                }
            }
        }
    ]);

    serde_json::from_value(raw).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_builtin_schemas_cover_reserved_names() {
        let names: BTreeSet<String> = builtin_tool_schemas()
            .into_iter()
            .map(|schema| schema.name)
            .collect();
        let expected: BTreeSet<String> =
            BUILT_IN_TOOLS.iter().map(|name| name.to_string()).collect();
        assert_eq!(names, expected);
    }
}
