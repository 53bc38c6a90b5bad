use crate::plugin::RegistrationToken;
use crate::tools::schema::BUILT_IN_TOOLS;
use crate::types::{ToolOutcome, ToolSchema};
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

pub type ToolHandler = Arc<dyn Fn(&serde_json::Value) -> Result<String> + Send + Sync>;

pub struct RegisteredTool {
    pub schema: ToolSchema,
    pub handler: ToolHandler,
}

/// Registry for pluggable tools that extend the built-in set. Built-in names
/// are reserved; registration returns an explicit token that removes the
/// entry when revoked.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<Mutex<HashMap<String, RegisteredTool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: RegisteredTool) -> Result<RegistrationToken> {
        let name = tool.schema.name.clone();
        if BUILT_IN_TOOLS.contains(&name.as_str()) {
            bail!("Cannot register tool '{name}': name is reserved for built-in tools");
        }

        let mut tools = lock_tools(&self.tools);
        if tools.contains_key(&name) {
            bail!("Tool '{name}' is already registered");
        }
        tools.insert(name.clone(), tool);
        drop(tools);

        let entries: Weak<Mutex<HashMap<String, RegisteredTool>>> = Arc::downgrade(&self.tools);
        Ok(RegistrationToken::new(move || {
            if let Some(entries) = entries.upgrade() {
                lock_tools(&entries).remove(&name);
            }
        }))
    }

    pub fn has(&self, name: &str) -> bool {
        lock_tools(&self.tools).contains_key(name)
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        lock_tools(&self.tools)
            .values()
            .map(|tool| tool.schema.clone())
            .collect()
    }

    /// Run a registered tool. Returns `None` for unknown names; handler
    /// errors become error outcomes, never panics or propagation.
    pub fn execute(&self, name: &str, input: &serde_json::Value) -> Option<ToolOutcome> {
        let handler = lock_tools(&self.tools).get(name).map(|t| Arc::clone(&t.handler))?;
        Some(match handler(input) {
            Ok(content) => ToolOutcome::ok(content),
            Err(error) => ToolOutcome::error(format!("Error: {error}")),
        })
    }
}

fn lock_tools(
    tools: &Mutex<HashMap<String, RegisteredTool>>,
) -> std::sync::MutexGuard<'_, HashMap<String, RegisteredTool>> {
    // A poisoned lock only happens after a panic in another holder; the map
    // itself is still coherent for reads and removals.
    tools.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tool(name: &str) -> RegisteredTool {
        RegisteredTool {
            schema: ToolSchema {
                name: name.to_string(),
                description: "test tool".to_string(),
                input_schema: json!({ "type": "object", "properties": {} }),
            },
            handler: Arc::new(|_| Ok("ran".to_string())),
        }
    }

    #[test]
    fn test_register_rejects_reserved_builtin_names() {
        let registry = ToolRegistry::new();
        let result = registry.register(sample_tool("write_file"));
        assert!(result.is_err());
        assert!(result
            .expect_err("reserved name should be rejected")
            .to_string()
            .contains("reserved"));
    }

    #[test]
    fn test_register_rejects_duplicate_names() {
        let registry = ToolRegistry::new();
        let _token = registry
            .register(sample_tool("my_tool"))
            .expect("first registration");
        assert!(registry.register(sample_tool("my_tool")).is_err());
    }

    #[test]
    fn test_token_revoke_unregisters() {
        let registry = ToolRegistry::new();
        let token = registry
            .register(sample_tool("my_tool"))
            .expect("registration");
        assert!(registry.has("my_tool"));
        token.revoke();
        assert!(!registry.has("my_tool"));
    }

    #[test]
    fn test_dropping_token_keeps_registration() {
        let registry = ToolRegistry::new();
        let token = registry
            .register(sample_tool("my_tool"))
            .expect("registration");
        drop(token);
        assert!(registry.has("my_tool"));
    }

    #[test]
    fn test_execute_converts_handler_error_into_outcome() {
        let registry = ToolRegistry::new();
        let failing = RegisteredTool {
            schema: ToolSchema {
                name: "broken".to_string(),
                description: "always fails".to_string(),
                input_schema: json!({ "type": "object" }),
            },
            handler: Arc::new(|_| anyhow::bail!("boom")),
        };
        let _token = registry.register(failing).expect("registration");

        let outcome = registry
            .execute("broken", &json!({}))
            .expect("known tool executes");
        assert!(outcome.is_error);
        assert!(outcome.content.contains("boom"));
    }

    #[test]
    fn test_execute_unknown_tool_returns_none() {
        let registry = ToolRegistry::new();
        assert!(registry.execute("missing", &json!({})).is_none());
    }
}
