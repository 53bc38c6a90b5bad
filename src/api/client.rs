use crate::api::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::types::{ApiMessage, ToolSchema};
use crate::util::is_local_endpoint_url;
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
#[cfg(test)]
use std::sync::Arc;
use std::pin::Pin;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Body of a streamed chat request to the relay.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ApiMessage>,
    pub system_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codebase_context: Option<serde_json::Value>,
    pub tools: Vec<ToolSchema>,
}

#[cfg(test)]
pub trait MockStreamProducer: Send + Sync {
    fn create_mock_stream(&self, request: &ChatRequest) -> Result<ByteStream>;
}

/// HTTP client for the backend relay. The relay owns provider selection and
/// authentication against the model provider; this client only carries the
/// conversation over and streams SSE bytes back.
#[derive(Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    relay_url: String,
    auth_token: Option<String>,
    #[cfg(test)]
    mock_stream_producer: Option<Arc<dyn MockStreamProducer>>,
}

impl RelayClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            relay_url: config.relay_url.clone(),
            auth_token: config.auth_token.clone(),
            #[cfg(test)]
            mock_stream_producer: None,
        }
    }

    #[cfg(test)]
    pub fn new_mock(mock_producer: Arc<dyn MockStreamProducer>) -> Self {
        Self {
            http: reqwest::Client::new(),
            relay_url: "http://localhost:3000".to_string(),
            auth_token: None,
            mock_stream_producer: Some(mock_producer),
        }
    }

    pub async fn post_chat_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                return producer.create_mock_stream(request);
            }
        }

        let request_url = format!("{}/api/v1/chat", self.relay_url.trim_end_matches('/'));

        if debug_payload_enabled() {
            if let Ok(payload) = serde_json::to_value(request) {
                emit_debug_payload(&request_url, &payload);
            }
        }

        let mut http_request = self
            .http
            .post(&request_url)
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .json(request);
        if let Some(token) = &self.auth_token {
            http_request = http_request.bearer_auth(token);
        }

        let response = http_request
            .send()
            .await
            .map_err(|error| map_relay_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_relay_request_error(error, &request_url))?;

        let request_url_for_stream = request_url.clone();
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| map_relay_request_error(error, &request_url_for_stream))
        });
        Ok(Box::pin(stream))
    }
}

fn map_relay_request_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return anyhow!(
            "cannot reach local relay '{}': {}. Start the relay or update RELAYCODE_PROXY_URL.",
            request_url,
            error
        );
    }
    if error.is_connect() {
        return anyhow!("cannot reach relay '{}': {}", request_url, error);
    }
    if error.is_timeout() {
        return anyhow!("relay request to '{}' timed out: {}", request_url, error);
    }
    if let Some(status) = error.status() {
        return anyhow!(
            "relay '{}' returned HTTP {}: {}",
            request_url,
            status,
            error
        );
    }
    anyhow!("relay request to '{}' failed: {}", request_url, error)
}
