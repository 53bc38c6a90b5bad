//! Plugin surfaces: slash commands and the message pipeline. Both are
//! map-based registries whose entries are removed through an explicit
//! registration token.

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

/// Capability returned from `register` calls. Revoking it removes the entry;
/// dropping it without revoking keeps the registration alive — cleanup is
/// explicit, never garbage-collection-triggered.
pub struct RegistrationToken {
    revoke: Option<Box<dyn FnOnce() + Send>>,
}

impl std::fmt::Debug for RegistrationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationToken")
            .field("revoked", &self.revoke.is_none())
            .finish()
    }
}

impl RegistrationToken {
    pub(crate) fn new(revoke: impl FnOnce() + Send + 'static) -> Self {
        Self {
            revoke: Some(Box::new(revoke)),
        }
    }

    pub fn revoke(mut self) {
        if let Some(revoke) = self.revoke.take() {
            revoke();
        }
    }
}

pub type SlashCommandHandler = Arc<dyn Fn(&str) -> String + Send + Sync>;

struct SlashCommand {
    handler: SlashCommandHandler,
}

/// Maps `/command` prefixes to prompt expansions. The built-in commands turn
/// a short directive plus selection into a full instruction.
#[derive(Clone)]
pub struct SlashCommandRegistry {
    commands: Arc<Mutex<HashMap<String, SlashCommand>>>,
}

const BUILTIN_SLASH_COMMANDS: [(&str, &str); 4] = [
    ("/test", "Generate unit tests for this code:"),
    ("/doc", "Generate documentation for this code:"),
    ("/review", "Review this code for issues:"),
    ("/explain", "Explain this code in detail:"),
];

impl Default for SlashCommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SlashCommandRegistry {
    pub fn new() -> Self {
        let mut commands = HashMap::new();
        for (name, prompt) in BUILTIN_SLASH_COMMANDS {
            let prompt = prompt.to_string();
            commands.insert(
                name.to_string(),
                SlashCommand {
                    handler: Arc::new(move |args: &str| format!("{prompt}\n{args}")),
                },
            );
        }
        Self {
            commands: Arc::new(Mutex::new(commands)),
        }
    }

    pub fn register(
        &self,
        name: &str,
        handler: SlashCommandHandler,
    ) -> Result<RegistrationToken> {
        if !name.starts_with('/') {
            bail!("Slash command '{name}' must start with '/'");
        }
        let mut commands = lock(&self.commands);
        if commands.contains_key(name) {
            bail!("Slash command '{name}' is already registered");
        }
        commands.insert(name.to_string(), SlashCommand { handler });
        drop(commands);

        let name = name.to_string();
        let entries: Weak<Mutex<HashMap<String, SlashCommand>>> = Arc::downgrade(&self.commands);
        Ok(RegistrationToken::new(move || {
            if let Some(entries) = entries.upgrade() {
                lock(&entries).remove(&name);
            }
        }))
    }

    /// Expand a leading slash command; text without one passes through
    /// unchanged.
    pub fn expand_input(&self, text: &str) -> String {
        let trimmed = text.trim_start();
        if !trimmed.starts_with('/') {
            return text.to_string();
        }
        let command = trimmed.split_whitespace().next().unwrap_or(trimmed);
        let commands = lock(&self.commands);
        match commands.get(command) {
            Some(entry) => {
                let args = trimmed[command.len()..].trim();
                (entry.handler)(args)
            }
            None => text.to_string(),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        lock(&self.commands).contains_key(name)
    }
}

pub type MessageProcessor = Arc<dyn Fn(&str) -> String + Send + Sync>;

struct PipelineEntry {
    id: u64,
    priority: i32,
    processor: MessageProcessor,
}

#[derive(Default)]
struct PipelineState {
    next_id: u64,
    preprocessors: Vec<PipelineEntry>,
    postprocessors: Vec<PipelineEntry>,
}

/// Priority-ordered transforms applied to outgoing user text and to the
/// final assistant text of a turn. Lower priority runs first; ties keep
/// registration order.
#[derive(Clone, Default)]
pub struct MessagePipeline {
    state: Arc<Mutex<PipelineState>>,
}

impl MessagePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_preprocessor(
        &self,
        processor: MessageProcessor,
        priority: i32,
    ) -> RegistrationToken {
        self.register(processor, priority, true)
    }

    pub fn register_postprocessor(
        &self,
        processor: MessageProcessor,
        priority: i32,
    ) -> RegistrationToken {
        self.register(processor, priority, false)
    }

    fn register(
        &self,
        processor: MessageProcessor,
        priority: i32,
        preprocessor: bool,
    ) -> RegistrationToken {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = state.next_id;
        let entry = PipelineEntry {
            id,
            priority,
            processor,
        };
        let list = if preprocessor {
            &mut state.preprocessors
        } else {
            &mut state.postprocessors
        };
        list.push(entry);
        list.sort_by_key(|e| (e.priority, e.id));
        drop(state);

        let shared: Weak<Mutex<PipelineState>> = Arc::downgrade(&self.state);
        RegistrationToken::new(move || {
            if let Some(shared) = shared.upgrade() {
                let mut state = lock(&shared);
                let list = if preprocessor {
                    &mut state.preprocessors
                } else {
                    &mut state.postprocessors
                };
                list.retain(|e| e.id != id);
            }
        })
    }

    pub fn apply_preprocessors(&self, text: &str) -> String {
        let state = lock(&self.state);
        apply(&state.preprocessors, text)
    }

    pub fn apply_postprocessors(&self, text: &str) -> String {
        let state = lock(&self.state);
        apply(&state.postprocessors, text)
    }
}

fn apply(entries: &[PipelineEntry], text: &str) -> String {
    let mut current = text.to_string();
    for entry in entries {
        current = (entry.processor)(&current);
    }
    current
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_slash_command_expands_with_args() {
        let registry = SlashCommandRegistry::new();
        let expanded = registry.expand_input("/test fn add(a, b) { a + b }");
        assert!(expanded.starts_with("Generate unit tests for this code:"));
        assert!(expanded.contains("fn add"));
    }

    #[test]
    fn test_unknown_slash_command_passes_through() {
        let registry = SlashCommandRegistry::new();
        assert_eq!(registry.expand_input("/nope hello"), "/nope hello");
        assert_eq!(registry.expand_input("plain text"), "plain text");
    }

    #[test]
    fn test_registered_slash_command_and_revocation() {
        let registry = SlashCommandRegistry::new();
        let token = registry
            .register("/shout", Arc::new(|args: &str| args.to_uppercase()))
            .expect("register command");
        assert_eq!(registry.expand_input("/shout hi"), "HI");
        token.revoke();
        assert_eq!(registry.expand_input("/shout hi"), "/shout hi");
    }

    #[test]
    fn test_duplicate_slash_command_rejected() {
        let registry = SlashCommandRegistry::new();
        let result = registry.register("/test", Arc::new(|args: &str| args.to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_pipeline_applies_in_priority_order() {
        let pipeline = MessagePipeline::new();
        let _late = pipeline.register_preprocessor(Arc::new(|t: &str| format!("{t}b")), 10);
        let _early = pipeline.register_preprocessor(Arc::new(|t: &str| format!("{t}a")), 0);
        assert_eq!(pipeline.apply_preprocessors("x"), "xab");
    }

    #[test]
    fn test_pipeline_token_removes_processor() {
        let pipeline = MessagePipeline::new();
        let token = pipeline.register_postprocessor(Arc::new(|t: &str| format!("{t}!")), 0);
        assert_eq!(pipeline.apply_postprocessors("done"), "done!");
        token.revoke();
        assert_eq!(pipeline.apply_postprocessors("done"), "done");
    }
}
