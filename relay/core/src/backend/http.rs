//! Shared HTTP plumbing for the transports

use serde_json::{json, Value};

use super::traits::BackendConfig;
use crate::error::UpstreamFault;
use crate::messages::ChatTurn;

/// Build the HTTP client for a transport
///
/// Only connection setup is bounded; streamed bodies may run as long as the
/// upstream keeps sending.
pub(crate) fn build_client(config: &BackendConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .build()
}

/// POST `body` as JSON and return the response if its status is a success
pub(crate) async fn post_json(
    client: &reqwest::Client,
    endpoint: &str,
    bearer: Option<&str>,
    body: &Value,
) -> Result<reqwest::Response, UpstreamFault> {
    let mut request = client.post(endpoint).json(body);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .map_err(|e| UpstreamFault::connection(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(UpstreamFault::from_status(status, body));
    }

    Ok(response)
}

/// Request body shared by the single-JSON and accept-and-forget backends
pub(crate) fn chat_payload(conversation_id: &str, history: &[ChatTurn]) -> Value {
    json!({
        "messages": history,
        "conversationId": conversation_id,
        "stream": false,
    })
}
