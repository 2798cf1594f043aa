//! Delta-Stream Transport
//!
//! Talks to a Responses-style endpoint that answers with an SSE stream of
//! fine-grained events. Each SSE `data:` payload goes through
//! [`normalize`](crate::normalizer::normalize); this transport then adds
//! the two things a single event cannot know on its own:
//!
//! - **Current item tracking**: an untagged delta belongs to the item most
//!   recently started.
//! - **Action narration**: a workflow action announcement is followed by a
//!   synthetic delta such as `[workflow_action] search status=in_progress`,
//!   so clients see actions as ordinary text.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};

use super::http::{build_client, post_json};
use super::traits::{BackendConfig, BackendKind, EventStream, UpstreamRequest, UpstreamTransport};
use crate::config::ConfigError;
use crate::error::UpstreamFault;
use crate::events::{CanonicalEvent, ItemId, ItemKind};
use crate::messages::{ChatTurn, MessageRole};
use crate::normalizer::normalize;

/// SSE transport for Responses-style backends
#[derive(Clone, Debug)]
pub struct DeltaStreamTransport {
    client: reqwest::Client,
    endpoint: String,
    bearer: Option<String>,
    agent_name: Option<String>,
}

impl DeltaStreamTransport {
    /// Build from configuration; requires an endpoint
    pub fn from_config(config: &BackendConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: build_client(config)
                .map_err(|e| ConfigError::ValidationError(format!("HTTP client: {e}")))?,
            endpoint: super::require_endpoint(config)?,
            bearer: config.bearer_token(),
            agent_name: config.agent_name.clone(),
        })
    }

    fn request_body(&self, conversation_id: &str, transcript: String) -> Value {
        let mut body = json!({
            "input": transcript,
            "stream": true,
            "metadata": { "conversation_id": conversation_id },
        });
        if let Some(agent) = &self.agent_name {
            body["agent"] = json!({ "name": agent, "type": "agent_reference" });
        }
        body
    }
}

#[async_trait]
impl UpstreamTransport for DeltaStreamTransport {
    fn name(&self) -> &str {
        "delta-stream"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::DeltaStream
    }

    async fn open(&self, request: &UpstreamRequest) -> Result<EventStream, UpstreamFault> {
        let transcript = build_transcript(&request.history);
        if transcript.is_empty() {
            tracing::warn!(
                conversation_id = %request.conversation_id,
                "Empty transcript, skipping upstream call"
            );
            return Ok(Box::pin(stream::empty()));
        }

        let body = self.request_body(&request.conversation_id, transcript);
        let response =
            post_json(&self.client, &self.endpoint, self.bearer.as_deref(), &body).await?;

        tracing::debug!(
            conversation_id = %request.conversation_id,
            status = response.status().as_u16(),
            "Upstream stream opened"
        );

        let events = response.bytes_stream().eventsource().map(|event| match event {
            Ok(event) => Ok(normalize(&event.data)),
            Err(e) => Err(UpstreamFault::connection(e.to_string())),
        });

        Ok(attach_items(events))
    }
}

/// Render history as a plain-text transcript
///
/// One `Role: content` line per turn, with a trailing `Assistant:` cue when
/// the last line is not already an assistant line. Empty history gives an
/// empty string.
#[must_use]
pub fn build_transcript(history: &[ChatTurn]) -> String {
    let mut lines: Vec<String> = history
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.content))
        .collect();

    if lines.is_empty() {
        return String::new();
    }

    if history.last().map(|t| t.role) != Some(MessageRole::Assistant) {
        lines.push(format!("{}:", MessageRole::Assistant.label()));
    }

    lines.join("\n")
}

/// Narration line for a workflow action
#[must_use]
pub fn action_narration(action_id: &str, status: &str) -> String {
    format!("[workflow_action] {action_id} status={status}")
}

/// Attach untagged deltas to the current item and narrate action items
///
/// Stops after the first terminal event or transport error. `Ignored`
/// events are dropped here.
pub(crate) fn attach_items<S>(events: S) -> EventStream
where
    S: Stream<Item = Result<CanonicalEvent, UpstreamFault>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut current: Option<ItemId> = None;
        let mut events = Box::pin(events);

        while let Some(event) = events.next().await {
            match event {
                Ok(CanonicalEvent::ItemStarted { item_id, kind }) => {
                    current = Some(item_id.clone());
                    let narration = match &kind {
                        ItemKind::Action { action_id, status } => {
                            Some(action_narration(action_id, status))
                        }
                        ItemKind::Content => None,
                    };
                    yield Ok(CanonicalEvent::ItemStarted { item_id: item_id.clone(), kind });
                    if let Some(text) = narration {
                        yield Ok(CanonicalEvent::TextDelta { item_id: Some(item_id), text });
                    }
                }
                Ok(CanonicalEvent::TextDelta { item_id, text }) => {
                    if let Some(id) = &item_id {
                        if current.is_none() {
                            current = Some(id.clone());
                        }
                    }
                    yield Ok(CanonicalEvent::TextDelta {
                        item_id: item_id.or_else(|| current.clone()),
                        text,
                    });
                }
                Ok(CanonicalEvent::Ignored) => {}
                Ok(event) => {
                    let terminal = event.is_terminal();
                    yield Ok(event);
                    if terminal {
                        break;
                    }
                }
                Err(fault) => {
                    tracing::error!(error = %fault, "Upstream stream failed");
                    yield Err(fault);
                    break;
                }
            }
        }
    })
}
