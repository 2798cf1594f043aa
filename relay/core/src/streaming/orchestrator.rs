//! Stream Orchestrator
//!
//! Drives one turn: resolves the conversation, records incoming messages,
//! forwards stored history through the configured transport, and turns the
//! resulting events into downstream frames.
//!
//! # Phases
//!
//! ```text
//! stream()                          TurnStream (lazy)
//! ├─ backend check                  ├─ conversation
//! ├─ resolve conversation           ├─ message_delta*        (per TextDelta)
//! ├─ persist incoming messages      ├─ persist final text    (if non-empty)
//! ├─ load history + context         ├─ completed_message
//! └─ open transport                 └─ stream_end
//! ```
//!
//! Anything that fails in the left column is returned as a [`RelayError`].
//! Anything that fails in the right column is folded into the
//! `completed_message` text, and `stream_end` still closes the stream.
//! A content-filter rejection at open time is folded in-band as well.
//!
//! # Cancellation
//!
//! A [`CancellationToken`] on the request stops the turn between events:
//! the transport stream is dropped (closing its connection), nothing is
//! persisted, and `stream_end` is the final frame. Dropping the
//! [`TurnStream`] itself has the same effect without the final frame.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::accumulator::{FinalTextPolicy, ItemAccumulator};
use crate::backend::{BackendKind, EventStream, UpstreamRequest, UpstreamTransport};
use crate::context::{build_system_prompt, ContextProvider, ContextQuery};
use crate::error::RelayError;
use crate::events::{CanonicalEvent, ItemId};
use crate::messages::{ChatTurn, DownstreamFrame, MessageRole};
use crate::presentation::{describe_fault, describe_stream_error};
use crate::store::{ConversationStore, Message, DEFAULT_MESSAGE_LIMIT};

/// Item id for deltas that arrive without one
pub const DEFAULT_ITEM_ID: &str = "default";

// ============================================================================
// Configuration
// ============================================================================

/// Orchestrator settings
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Newest stored messages forwarded upstream as history
    pub history_limit: usize,
    /// System prompt prepended to upstream input
    pub system_prompt: Option<String>,
    /// How the final text is chosen among items
    pub final_text_policy: FinalTextPolicy,
    /// Item id for untagged deltas
    pub default_item_id: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_MESSAGE_LIMIT,
            system_prompt: None,
            final_text_policy: FinalTextPolicy::default(),
            default_item_id: DEFAULT_ITEM_ID.to_string(),
        }
    }
}

// ============================================================================
// Requests and Streams
// ============================================================================

/// One client request
#[derive(Clone, Debug, Default)]
pub struct TurnRequest {
    /// Existing conversation to continue; a new one is created if `None`
    pub conversation_id: Option<String>,
    /// Messages sent with this request, in order
    pub messages: Vec<ChatTurn>,
    /// Backend the caller expects to serve the request
    pub backend: Option<BackendKind>,
    /// Title for a newly created conversation
    pub title: Option<String>,
    /// External cancellation
    pub cancel: Option<CancellationToken>,
}

impl TurnRequest {
    /// Create a request carrying `messages`
    pub fn new(messages: Vec<ChatTurn>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// Continue an existing conversation
    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Require a specific backend kind
    pub fn with_backend(mut self, kind: BackendKind) -> Self {
        self.backend = Some(kind);
        self
    }

    /// Title for a new conversation
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Attach a cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Lazy frame sequence for one turn
///
/// Nothing after the pre-stream phase happens until the stream is polled.
pub struct TurnStream {
    conversation_id: String,
    frames: BoxStream<'static, DownstreamFrame>,
}

impl TurnStream {
    /// Conversation this turn belongs to
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Take the underlying frame stream
    #[must_use]
    pub fn into_frames(self) -> BoxStream<'static, DownstreamFrame> {
        self.frames
    }
}

impl Stream for TurnStream {
    type Item = DownstreamFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.frames.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for TurnStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnStream")
            .field("conversation_id", &self.conversation_id)
            .finish_non_exhaustive()
    }
}

enum Upstream {
    Events(EventStream),
    Rejected(String),
}

struct PreparedTurn {
    conversation_id: String,
    upstream: Upstream,
    cancel: CancellationToken,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Turn driver shared by all requests
///
/// Holds no per-request state; each call to [`stream`](Self::stream) gets
/// its own accumulator and transport stream.
#[derive(Clone)]
pub struct StreamOrchestrator {
    store: Arc<dyn ConversationStore>,
    transport: Arc<dyn UpstreamTransport>,
    context: Option<Arc<dyn ContextProvider>>,
    config: OrchestratorConfig,
}

impl StreamOrchestrator {
    /// Create an orchestrator with default settings
    pub fn new(store: Arc<dyn ConversationStore>, transport: Arc<dyn UpstreamTransport>) -> Self {
        Self {
            store,
            transport,
            context: None,
            config: OrchestratorConfig::default(),
        }
    }

    /// Replace the settings
    #[must_use]
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Install a context retrieval hook
    #[must_use]
    pub fn with_context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context = Some(provider);
        self
    }

    /// Current settings
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Backend kind of the configured transport
    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.transport.kind()
    }

    /// The store this orchestrator persists to
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Start a turn
    ///
    /// # Errors
    ///
    /// - [`RelayError::BackendMismatch`] if the request names another backend
    /// - [`RelayError::NotFound`] if the conversation id is unknown
    /// - [`RelayError::Store`] if recording or loading messages fails
    /// - [`RelayError::Upstream`] if the transport rejects the request for
    ///   any reason other than content filtering
    pub async fn stream(&self, request: TurnRequest) -> Result<TurnStream, RelayError> {
        let span = tracing::info_span!(
            "turn",
            backend = %self.transport.kind(),
            conversation_id = tracing::field::Empty,
        );
        let prepared = self.prepare(request).instrument(span).await?;
        Ok(self.drive(prepared))
    }

    async fn prepare(&self, request: TurnRequest) -> Result<PreparedTurn, RelayError> {
        let TurnRequest {
            conversation_id,
            messages,
            backend,
            title,
            cancel,
        } = request;

        let configured = self.transport.kind();
        if let Some(requested) = backend {
            if requested != configured {
                return Err(RelayError::BackendMismatch {
                    requested,
                    configured,
                });
            }
        }

        let conversation_id = match conversation_id {
            Some(id) => {
                if !self.store.conversation_exists(&id).await? {
                    tracing::info!(conversation_id = %id, "Conversation not found");
                    return Err(RelayError::NotFound {
                        conversation_id: id,
                    });
                }
                id
            }
            None => {
                let conversation = self.store.create_conversation(title.as_deref()).await?;
                tracing::info!(conversation_id = %conversation.id, "Created conversation");
                conversation.id
            }
        };
        tracing::Span::current().record("conversation_id", conversation_id.as_str());

        for message in &messages {
            if !message.role.is_storable() {
                tracing::debug!(role = %message.role, "Skipping non-storable incoming message");
                continue;
            }
            self.store
                .append_message(&conversation_id, message.role, &message.content, None)
                .await?;
        }

        let history: Vec<ChatTurn> = self
            .store
            .get_recent_messages(&conversation_id, self.config.history_limit)
            .await?
            .iter()
            .map(Message::to_turn)
            .collect();

        let context = self.retrieve_context(&conversation_id, &history).await;
        let mut upstream_history = Vec::with_capacity(history.len() + 1);
        if let Some(system) =
            build_system_prompt(self.config.system_prompt.as_deref(), context.as_deref())
        {
            upstream_history.push(ChatTurn::system(system));
        }
        upstream_history.extend(history);

        let upstream_request = UpstreamRequest::new(conversation_id.clone(), upstream_history);
        tracing::info!(
            messages = upstream_request.history.len(),
            transport = self.transport.name(),
            "Opening upstream"
        );

        let upstream = match self.transport.open(&upstream_request).await {
            Ok(events) => Upstream::Events(events),
            Err(fault) if fault.is_content_filter() => {
                tracing::warn!(status = ?fault.status, "Upstream rejected request by content filter");
                Upstream::Rejected(describe_fault(&fault))
            }
            Err(fault) => {
                tracing::error!(error = %fault, "Upstream request failed");
                return Err(fault.into());
            }
        };

        Ok(PreparedTurn {
            conversation_id,
            upstream,
            cancel: cancel.unwrap_or_default(),
        })
    }

    async fn retrieve_context(&self, conversation_id: &str, history: &[ChatTurn]) -> Option<String> {
        let provider = self.context.as_ref()?;
        let query = ContextQuery {
            conversation_id: conversation_id.to_string(),
            history: history.to_vec(),
        };
        match provider.retrieve(&query).await {
            Ok(Some(context)) if !context.trim().is_empty() => Some(context),
            Ok(_) => {
                tracing::info!("No context found for request");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Context retrieval failed, continuing without context");
                None
            }
        }
    }

    fn drive(&self, turn: PreparedTurn) -> TurnStream {
        let store = Arc::clone(&self.store);
        let policy = self.config.final_text_policy;
        let default_item = ItemId::new(self.config.default_item_id.clone());
        let PreparedTurn {
            conversation_id,
            upstream,
            cancel,
        } = turn;
        let id = conversation_id.clone();

        let frames = async_stream::stream! {
            yield DownstreamFrame::Conversation {
                conversation_id: conversation_id.clone(),
            };

            let mut events = match upstream {
                Upstream::Events(events) => events,
                Upstream::Rejected(text) => {
                    yield DownstreamFrame::CompletedMessage { content: text };
                    yield DownstreamFrame::StreamEnd;
                    return;
                }
            };

            let mut accumulator = ItemAccumulator::new();
            let mut error_text: Option<String> = None;
            let mut cancelled = false;

            loop {
                let next = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    next = events.next() => next,
                };

                match next {
                    None => break,
                    Some(Ok(CanonicalEvent::TextDelta { item_id, text })) => {
                        let item_id = item_id.unwrap_or_else(|| default_item.clone());
                        accumulator.append(&item_id, &text);
                        yield DownstreamFrame::MessageDelta { item_id, content: text };
                    }
                    Some(Ok(CanonicalEvent::ItemStarted { item_id, kind })) => {
                        tracing::debug!(%conversation_id, %item_id, action = kind.is_action(), "Item started");
                        accumulator.register(&item_id, &kind);
                    }
                    Some(Ok(CanonicalEvent::ItemFinished { .. } | CanonicalEvent::Ignored)) => {}
                    Some(Ok(CanonicalEvent::StreamCompleted)) => break,
                    Some(Ok(CanonicalEvent::StreamError { detail })) => {
                        tracing::warn!(%conversation_id, %detail, "Upstream signaled an error");
                        error_text = Some(describe_stream_error(&detail));
                        break;
                    }
                    Some(Err(fault)) => {
                        tracing::error!(%conversation_id, error = %fault, "Upstream failed mid-stream");
                        error_text = Some(describe_fault(&fault));
                        break;
                    }
                }
            }
            drop(events);

            if cancelled {
                tracing::info!(%conversation_id, "Turn cancelled, discarding accumulated text");
                yield DownstreamFrame::StreamEnd;
                return;
            }

            let final_text = accumulator.final_text(policy);
            if !final_text.is_empty() {
                match store
                    .append_message(&conversation_id, MessageRole::Assistant, &final_text, None)
                    .await
                {
                    Ok(message_id) => tracing::info!(
                        %conversation_id,
                        message_id,
                        chars = final_text.len(),
                        "Persisted assistant message"
                    ),
                    Err(e) => tracing::error!(
                        %conversation_id,
                        error = %e,
                        "Failed to persist assistant message"
                    ),
                }
            }

            yield DownstreamFrame::CompletedMessage {
                content: error_text.unwrap_or(final_text),
            };
            yield DownstreamFrame::StreamEnd;
        };

        TurnStream {
            conversation_id: id,
            frames: Box::pin(frames),
        }
    }
}

impl std::fmt::Debug for StreamOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOrchestrator")
            .field("transport", &self.transport.name())
            .field("has_context", &self.context.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
