//! Relay Core - Streaming Conversation Relay
//!
//! This crate sits between a chat client and one of several LLM agent
//! backends. It records the conversation, forwards stored history upstream,
//! and converts whatever the backend returns into one uniform sequence of
//! downstream frames.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            Client                                │
//! │             TurnRequest ──►        ◄── DownstreamFrame*           │
//! └──────────────────┬──────────────────────────▲────────────────────┘
//!                    │                          │  wire::encode (SSE)
//! ┌──────────────────┼──────────────────────────┼────────────────────┐
//! │                  ▼      RELAY CORE          │                    │
//! │  ┌────────────────────────────────────────────────────────────┐  │
//! │  │                  StreamOrchestrator                        │  │
//! │  │  ┌──────────────┐  ┌────────────────┐  ┌────────────────┐  │  │
//! │  │  │ Conversation │  │ ItemAccumulator│  │ ContextProvider│  │  │
//! │  │  │    Store     │  │                │  │   (optional)   │  │  │
//! │  │  └──────────────┘  └────────────────┘  └────────────────┘  │  │
//! │  └───────────────────────────┬────────────────────────────────┘  │
//! │                              │ CanonicalEvent                    │
//! │  ┌───────────────┬───────────┴──────────┬─────────────────────┐  │
//! │  │ DeltaStream   │  SingleJson          │  AcceptAndForget    │  │
//! │  │ (SSE)         │  (one JSON body)     │  (placeholder)      │  │
//! │  └───────────────┴──────────────────────┴─────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`StreamOrchestrator`]: drives one turn from request to `stream_end`
//! - [`UpstreamTransport`]: one implementation per backend kind
//! - [`CanonicalEvent`]: backend events after normalization
//! - [`DownstreamFrame`]: what the client receives
//! - [`ConversationStore`]: durable conversations and messages
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use relay_core::{
//!     backend::build_transport, load_config, wire, ChatTurn, SqliteStore,
//!     StreamOrchestrator, TurnRequest,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     config.validate()?;
//!
//!     let store = Arc::new(SqliteStore::open(&config.store_path).await?);
//!     let transport = build_transport(&config.backend)?;
//!     let orchestrator = StreamOrchestrator::new(store, transport)
//!         .with_config(config.orchestrator.clone());
//!
//!     let mut turn = orchestrator
//!         .stream(TurnRequest::new(vec![ChatTurn::user("Hello")]))
//!         .await?;
//!     while let Some(frame) = turn.next().await {
//!         print!("{}", wire::encode(&frame, config.wire_dialect));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: upstream transports and their configuration
//! - [`config`]: TOML + environment configuration
//! - [`context`]: optional context retrieval hook
//! - [`error`]: relay, upstream, and storage errors
//! - [`events`]: canonical upstream events
//! - [`messages`]: roles, chat turns, and downstream frames
//! - [`normalizer`]: raw SSE payload to canonical event
//! - [`presentation`]: error text folded into `completed_message`
//! - [`store`]: conversation persistence (SQLite and in-memory)
//! - [`streaming`]: accumulator and orchestrator
//! - [`wire`]: SSE encoding of downstream frames

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod messages;
pub mod normalizer;
pub mod presentation;
pub mod store;
pub mod streaming;
pub mod wire;

// Re-exports for convenience
pub use backend::{
    build_transport, AcceptedTransport, BackendConfig, BackendKind, DeltaStreamTransport,
    EventStream, SingleJsonTransport, UpstreamRequest, UpstreamTransport,
};
pub use context::{ContextProvider, ContextQuery, StaticContext};
pub use error::{ContentFilterResult, RelayError, StoreError, UpstreamFault};
pub use events::{CanonicalEvent, ItemId, ItemKind};
pub use messages::{ChatTurn, DownstreamFrame, MessageRole};
pub use normalizer::normalize;
pub use store::{
    Conversation, ConversationStore, ConversationSummary, MemoryStore, Message, SqliteStore,
};
pub use streaming::{
    FinalTextPolicy, ItemAccumulator, OrchestratorConfig, StreamOrchestrator, TurnRequest,
    TurnStream,
};
pub use wire::WireDialect;

// Config exports
pub use config::{
    default_config_path, default_store_path, load_config, load_config_from_path, ConfigError,
    ConfigOverrides, ConfigSource, RelayConfig, RelayToml,
};
