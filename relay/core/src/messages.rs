//! Relay Messages
//!
//! Messages flowing in both directions through the relay: the turns a client
//! sends in, and the frames the relay sends back out.
//!
//! # Frame Protocol
//!
//! Every turn produces frames in this order:
//!
//! ```text
//! conversation  message_delta*  completed_message  stream_end
//! ```
//!
//! `completed_message` is omitted only when the turn is cancelled; the stream
//! still closes with `stream_end`. Clients render deltas as they arrive and
//! treat `completed_message` as the authoritative final text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::ItemId;

// ============================================================================
// Roles and Turns
// ============================================================================

/// Who authored a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions that frame the conversation
    System,
    /// The human user
    User,
    /// The model
    Assistant,
}

impl MessageRole {
    /// Lowercase wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Capitalized label used in plain-text transcripts
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::System => "System",
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }

    /// Whether messages with this role are persisted
    #[must_use]
    pub fn is_storable(&self) -> bool {
        matches!(self, Self::User | Self::Assistant)
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role name that is not one of `system`, `user`, `assistant`
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown message role: {0}")]
pub struct ParseRoleError(pub String);

impl FromStr for MessageRole {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

/// One role-tagged message, as sent by a client or forwarded upstream
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Author
    pub role: MessageRole,
    /// Message text
    pub content: String,
}

impl ChatTurn {
    /// Create a turn
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// A user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// An assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// A system turn
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }
}

// ============================================================================
// Downstream Frames
// ============================================================================

/// A frame sent to the client
///
/// Serialized with a snake_case `type` tag. See [`crate::wire`] for the
/// on-the-wire encoding and the legacy dialect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownstreamFrame {
    /// First frame: the conversation this turn belongs to
    Conversation {
        /// Existing or newly created conversation id
        conversation_id: String,
    },

    /// Incremental text for one item
    MessageDelta {
        /// Item the fragment belongs to
        item_id: ItemId,
        /// The fragment
        content: String,
    },

    /// Authoritative final text for the turn, or a rendered error
    CompletedMessage {
        /// Final text
        content: String,
    },

    /// Last frame of every turn
    StreamEnd,
}

impl DownstreamFrame {
    /// Frame type name as it appears on the wire
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Conversation { .. } => "conversation",
            Self::MessageDelta { .. } => "message_delta",
            Self::CompletedMessage { .. } => "completed_message",
            Self::StreamEnd => "stream_end",
        }
    }

    /// Whether this frame closes the stream
    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::StreamEnd)
    }
}
