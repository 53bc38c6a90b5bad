use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::util::{is_local_endpoint_url, parse_bool_flag};

/// When tool execution requires an inline user confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmationMode {
    /// Never ask; every tool runs immediately.
    None,
    /// Ask before tools that mutate files (`write_file`, `edit_file`).
    WriteOnly,
    /// Ask before every tool, reads included.
    Always,
}

impl ConfirmationMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Some(Self::None),
            "write-only" | "write_only" | "writes" => Some(Self::WriteOnly),
            "always" | "all" => Some(Self::Always),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub relay_url: String,
    pub auth_token: Option<String>,
    pub confirmation_mode: ConfirmationMode,
    pub workspace_context_enabled: bool,
    pub working_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let relay_url = std::env::var("RELAYCODE_PROXY_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());
        let auth_token = std::env::var("RELAYCODE_AUTH_TOKEN").ok().and_then(|v| {
            if v.trim().is_empty() {
                None
            } else {
                Some(v)
            }
        });
        let confirmation_mode = std::env::var("RELAYCODE_TOOL_CONFIRMATION")
            .ok()
            .and_then(|v| ConfirmationMode::parse(&v))
            .unwrap_or(ConfirmationMode::WriteOnly);
        let workspace_context_enabled = std::env::var("RELAYCODE_WORKSPACE_CONTEXT")
            .ok()
            .and_then(parse_bool_flag)
            .unwrap_or(true);

        Ok(Self {
            relay_url,
            auth_token,
            confirmation_mode,
            workspace_context_enabled,
            working_dir: std::env::current_dir()?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.relay_url.starts_with("http://") && !self.relay_url.starts_with("https://") {
            bail!(
                "Invalid RELAYCODE_PROXY_URL '{}': expected http:// or https:// URL",
                self.relay_url
            );
        }

        if !self.is_local_relay() && self.auth_token.is_none() {
            bail!(
                "RELAYCODE_AUTH_TOKEN must be set for non-local relay endpoints (url: '{}')",
                self.relay_url
            );
        }

        Ok(())
    }

    pub fn is_local_relay(&self) -> bool {
        is_local_endpoint_url(&self.relay_url)
    }
}
