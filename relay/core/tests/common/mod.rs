//! Shared helpers for relay integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;

use relay_core::{
    BackendKind, CanonicalEvent, DownstreamFrame, EventStream, TurnStream, UpstreamFault,
    UpstreamRequest, UpstreamTransport,
};

/// Sets a flag when the transport stream is dropped
struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Transport that replays a fixed event script
pub struct ScriptedTransport {
    kind: BackendKind,
    script: Vec<Result<CanonicalEvent, UpstreamFault>>,
    open_fault: Option<UpstreamFault>,
    hold_open: bool,
    requests: Mutex<Vec<UpstreamRequest>>,
    released: Arc<AtomicBool>,
    pulled: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<CanonicalEvent>) -> Self {
        Self::with_results(script.into_iter().map(Ok).collect())
    }

    pub fn with_results(script: Vec<Result<CanonicalEvent, UpstreamFault>>) -> Self {
        Self {
            kind: BackendKind::DeltaStream,
            script,
            open_fault: None,
            hold_open: false,
            requests: Mutex::new(Vec::new()),
            released: Arc::new(AtomicBool::new(false)),
            pulled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail `open` with `fault`
    pub fn failing(fault: UpstreamFault) -> Self {
        let mut transport = Self::new(Vec::new());
        transport.open_fault = Some(fault);
        transport
    }

    pub fn with_kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    /// Never finish after the script runs out
    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().clone()
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Number of events handed to the consumer so far
    pub fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn open(&self, request: &UpstreamRequest) -> Result<EventStream, UpstreamFault> {
        self.requests.lock().push(request.clone());
        if let Some(fault) = &self.open_fault {
            return Err(fault.clone());
        }

        let guard = ReleaseGuard(Arc::clone(&self.released));
        let pulled = Arc::clone(&self.pulled);
        let script = self.script.clone();
        let hold_open = self.hold_open;

        let events = async_stream::stream! {
            let _guard = guard;
            for event in script {
                pulled.fetch_add(1, Ordering::SeqCst);
                yield event;
            }
            if hold_open {
                futures::future::pending::<()>().await;
            }
        };
        Ok(events.boxed())
    }
}

/// Drain a turn into its frames
pub async fn collect(turn: TurnStream) -> Vec<DownstreamFrame> {
    turn.collect().await
}

/// Type names of `frames`, in order
pub fn frame_types(frames: &[DownstreamFrame]) -> Vec<&'static str> {
    frames.iter().map(DownstreamFrame::type_name).collect()
}

/// Content of the `completed_message` frame
pub fn completed_text(frames: &[DownstreamFrame]) -> Option<&str> {
    frames.iter().find_map(|frame| match frame {
        DownstreamFrame::CompletedMessage { content } => Some(content.as_str()),
        _ => None,
    })
}

/// Concatenated `message_delta` content
pub fn delta_text(frames: &[DownstreamFrame]) -> String {
    frames
        .iter()
        .filter_map(|frame| match frame {
            DownstreamFrame::MessageDelta { content, .. } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}
