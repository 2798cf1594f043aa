//! Turn Streaming
//!
//! The orchestration layer between a client request and an upstream
//! transport.
//!
//! # Architecture
//!
//! ```text
//! TurnRequest ──► StreamOrchestrator ──► UpstreamTransport
//!                     │      ▲                 │
//!                     │      └── CanonicalEvent┘
//!                     ▼
//!              ItemAccumulator ──► final text ──► ConversationStore
//!                     │
//!                     ▼
//!              TurnStream (DownstreamFrame*)
//! ```
//!
//! Each turn owns its accumulator and transport stream; nothing is shared
//! between concurrent turns except the store and transport handles.

mod accumulator;
mod orchestrator;

pub use accumulator::{FinalTextPolicy, ItemAccumulator};
pub use orchestrator::{
    OrchestratorConfig, StreamOrchestrator, TurnRequest, TurnStream, DEFAULT_ITEM_ID,
};
