//! Single-JSON Transport
//!
//! For backends that answer with one complete JSON document. The whole
//! answer becomes a single untagged delta followed by completion.

use async_trait::async_trait;
use futures::stream;
use serde_json::Value;

use super::http::{build_client, chat_payload, post_json};
use super::traits::{BackendConfig, BackendKind, EventStream, UpstreamRequest, UpstreamTransport};
use crate::config::ConfigError;
use crate::error::UpstreamFault;
use crate::events::CanonicalEvent;

/// Transport for backends that return the whole answer at once
#[derive(Clone, Debug)]
pub struct SingleJsonTransport {
    client: reqwest::Client,
    endpoint: String,
    bearer: Option<String>,
}

impl SingleJsonTransport {
    /// Build from configuration; requires an endpoint
    pub fn from_config(config: &BackendConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: build_client(config)
                .map_err(|e| ConfigError::ValidationError(format!("HTTP client: {e}")))?,
            endpoint: super::require_endpoint(config)?,
            bearer: config.bearer_token(),
        })
    }
}

#[async_trait]
impl UpstreamTransport for SingleJsonTransport {
    fn name(&self) -> &str {
        "single-json"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::SingleJson
    }

    async fn open(&self, request: &UpstreamRequest) -> Result<EventStream, UpstreamFault> {
        let body = chat_payload(&request.conversation_id, &request.history);
        let response =
            post_json(&self.client, &self.endpoint, self.bearer.as_deref(), &body).await?;

        let raw = response
            .text()
            .await
            .map_err(|e| UpstreamFault::connection(e.to_string()))?;

        let events = match serde_json::from_str::<Value>(&raw) {
            Ok(payload) => {
                let text = extract_text(&payload).unwrap_or_default();
                if text.is_empty() {
                    tracing::warn!(
                        conversation_id = %request.conversation_id,
                        "Upstream payload carried no recognizable text"
                    );
                    vec![Ok(CanonicalEvent::StreamCompleted)]
                } else {
                    vec![
                        Ok(CanonicalEvent::delta(text)),
                        Ok(CanonicalEvent::StreamCompleted),
                    ]
                }
            }
            Err(e) => vec![Ok(CanonicalEvent::StreamError {
                detail: format!("Malformed upstream payload: {e}"),
            })],
        };

        Ok(Box::pin(stream::iter(events)))
    }
}

/// Pull the answer text out of a completion payload
///
/// Checks, in order: `output_text`, `choices[0].message.content`, the text
/// parts of `output[*].content[*]` (concatenated), then `content`.
#[must_use]
pub fn extract_text(payload: &Value) -> Option<String> {
    if let Some(text) = payload.get("output_text").and_then(Value::as_str) {
        return Some(text.to_string());
    }

    if let Some(text) = payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    {
        return Some(text.to_string());
    }

    if let Some(output) = payload.get("output").and_then(Value::as_array) {
        let text: String = output
            .iter()
            .filter_map(|item| item.get("content").and_then(Value::as_array))
            .flatten()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect();
        if !text.is_empty() {
            return Some(text);
        }
    }

    payload
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string)
}
