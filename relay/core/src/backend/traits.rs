//! Upstream Transport Traits
//!
//! The one capability every backend implements. The orchestrator never knows
//! which wire protocol is behind a transport; it only sees a lazy sequence of
//! [`CanonicalEvent`]s or a single [`UpstreamFault`].
//!
//! # Design Philosophy
//!
//! Transports differ in how a response arrives:
//! - **Delta stream**: an open SSE stream of fine-grained events
//! - **Single JSON**: one complete payload when generation is done
//! - **Accept and forget**: an acknowledgement with no content at all
//!
//! Each one folds its wire shape into canonical events itself, so the
//! orchestrator's loop is the same for all three. Exactly one transport is
//! built per relay, chosen by [`BackendKind`] in configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::UpstreamFault;
use crate::events::CanonicalEvent;
use crate::messages::ChatTurn;

/// Lazy sequence of normalized upstream events
///
/// An `Err` item is a transport failure after streaming began; consumers
/// stop reading after the first one.
pub type EventStream = BoxStream<'static, Result<CanonicalEvent, UpstreamFault>>;

/// Default acknowledgement text for accept-and-forget backends
pub const DEFAULT_PLACEHOLDER_MESSAGE: &str =
    "Your request has been accepted and is being processed.";

/// Default connection setup timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Which transport variant reaches the upstream service
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// SSE stream of response events
    #[default]
    DeltaStream,
    /// Immediate acknowledgement, no content
    AcceptAndForget,
    /// One JSON payload on completion
    SingleJson,
}

impl BackendKind {
    /// Configuration name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeltaStream => "delta-stream",
            Self::AcceptAndForget => "accept-and-forget",
            Self::SingleJson => "single-json",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "delta-stream" => Ok(Self::DeltaStream),
            "accept-and-forget" => Ok(Self::AcceptAndForget),
            "single-json" => Ok(Self::SingleJson),
            other => Err(format!(
                "Unknown backend kind '{other}' (expected delta-stream, accept-and-forget, or single-json)"
            )),
        }
    }
}

/// Everything needed to build a transport
#[derive(Clone, Debug)]
pub struct BackendConfig {
    /// Transport variant
    pub kind: BackendKind,
    /// Upstream URL requests are POSTed to
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the bearer token
    pub api_key_env: Option<String>,
    /// Agent the delta-stream backend should route to
    pub agent_name: Option<String>,
    /// Bound on connection setup
    pub connect_timeout: Duration,
    /// Text synthesized by accept-and-forget backends
    pub placeholder_message: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            endpoint: None,
            api_key_env: None,
            agent_name: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            placeholder_message: DEFAULT_PLACEHOLDER_MESSAGE.to_string(),
        }
    }
}

impl BackendConfig {
    /// Create a configuration for `kind` posting to `endpoint`
    pub fn new(kind: BackendKind, endpoint: impl Into<String>) -> Self {
        Self {
            kind,
            endpoint: Some(endpoint.into()),
            ..Default::default()
        }
    }

    /// Set the credential variable name
    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    /// Set the agent name
    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = Some(name.into());
        self
    }

    /// Set the connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the accept-and-forget placeholder
    pub fn with_placeholder_message(mut self, message: impl Into<String>) -> Self {
        self.placeholder_message = message.into();
        self
    }

    /// Resolve the bearer token from the named environment variable
    ///
    /// A missing or empty variable means no `Authorization` header.
    #[must_use]
    pub fn bearer_token(&self) -> Option<String> {
        let var = self.api_key_env.as_deref()?;
        std::env::var(var).ok().filter(|v| !v.is_empty())
    }
}

/// One upstream call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamRequest {
    /// Conversation the turn belongs to
    pub conversation_id: String,
    /// Full ordered history, including any system turn
    pub history: Vec<ChatTurn>,
}

impl UpstreamRequest {
    /// Create a request
    pub fn new(conversation_id: impl Into<String>, history: Vec<ChatTurn>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            history,
        }
    }
}

/// Upstream transport trait
///
/// `open` returns once the upstream has accepted the request. A non-success
/// status is reported there as an [`UpstreamFault`] before any event exists.
/// Dropping the returned stream releases the underlying connection.
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    /// Human-readable transport name for logs
    fn name(&self) -> &str;

    /// The variant this transport implements
    fn kind(&self) -> BackendKind;

    /// Issue the request and return the event sequence
    async fn open(&self, request: &UpstreamRequest) -> Result<EventStream, UpstreamFault>;
}
