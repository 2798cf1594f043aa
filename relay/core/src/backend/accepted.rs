//! Accept-and-Forget Transport
//!
//! For asynchronous backends that acknowledge a request and do the work
//! elsewhere. Any 2xx is taken as acceptance; the body is never read. The
//! turn's text is a fixed placeholder.

use async_trait::async_trait;
use futures::stream;

use super::http::{build_client, chat_payload, post_json};
use super::traits::{BackendConfig, BackendKind, EventStream, UpstreamRequest, UpstreamTransport};
use crate::config::ConfigError;
use crate::error::UpstreamFault;
use crate::events::CanonicalEvent;

/// Transport for backends that only acknowledge
#[derive(Clone, Debug)]
pub struct AcceptedTransport {
    client: reqwest::Client,
    endpoint: String,
    bearer: Option<String>,
    placeholder: String,
}

impl AcceptedTransport {
    /// Build from configuration; requires an endpoint
    pub fn from_config(config: &BackendConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: build_client(config)
                .map_err(|e| ConfigError::ValidationError(format!("HTTP client: {e}")))?,
            endpoint: super::require_endpoint(config)?,
            bearer: config.bearer_token(),
            placeholder: config.placeholder_message.clone(),
        })
    }

    /// The text every turn resolves to
    #[must_use]
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }
}

#[async_trait]
impl UpstreamTransport for AcceptedTransport {
    fn name(&self) -> &str {
        "accept-and-forget"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::AcceptAndForget
    }

    async fn open(&self, request: &UpstreamRequest) -> Result<EventStream, UpstreamFault> {
        let body = chat_payload(&request.conversation_id, &request.history);
        let response =
            post_json(&self.client, &self.endpoint, self.bearer.as_deref(), &body).await?;

        tracing::info!(
            conversation_id = %request.conversation_id,
            status = response.status().as_u16(),
            "Upstream accepted request"
        );
        drop(response);

        Ok(Box::pin(stream::iter([
            Ok(CanonicalEvent::delta(self.placeholder.clone())),
            Ok(CanonicalEvent::StreamCompleted),
        ])))
    }
}
