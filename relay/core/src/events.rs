//! Canonical Upstream Events
//!
//! The small event algebra every upstream transport is reduced to. The
//! orchestrator only ever sees these; backend-specific wire shapes stop at
//! the [`normalizer`](crate::normalizer) and the transports.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one logical output item within a turn
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Create an item id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// What kind of content an item carries
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemKind {
    /// Ordinary answer text
    Content,
    /// A workflow action the backend is running on the user's behalf
    Action {
        /// Backend identifier of the action
        action_id: String,
        /// Action status as reported when the item was announced
        status: String,
    },
}

impl ItemKind {
    /// Whether this is an auxiliary action item
    #[must_use]
    pub fn is_action(&self) -> bool {
        matches!(self, Self::Action { .. })
    }
}

/// A backend event after normalization
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CanonicalEvent {
    /// Incremental text for one item
    ///
    /// `item_id` is `None` when the backend did not tag the fragment; the
    /// transport attaches the current item, and the orchestrator falls back
    /// to its placeholder id if there is none.
    TextDelta {
        /// Item the fragment belongs to
        item_id: Option<ItemId>,
        /// The fragment
        text: String,
    },
    /// A new logical item begins
    ItemStarted {
        /// The new item
        item_id: ItemId,
        /// Content or action
        kind: ItemKind,
    },
    /// An item is complete (informational)
    ItemFinished {
        /// The finished item
        item_id: ItemId,
    },
    /// The backend signaled an error mid-stream
    StreamError {
        /// Human-readable description
        detail: String,
    },
    /// The backend signaled a natural end
    StreamCompleted,
    /// Recognized or unknown event with no client-visible effect
    Ignored,
}

impl CanonicalEvent {
    /// Untagged text fragment
    pub fn delta(text: impl Into<String>) -> Self {
        Self::TextDelta {
            item_id: None,
            text: text.into(),
        }
    }

    /// Text fragment for a specific item
    pub fn item_delta(item_id: impl Into<ItemId>, text: impl Into<String>) -> Self {
        Self::TextDelta {
            item_id: Some(item_id.into()),
            text: text.into(),
        }
    }

    /// Whether the event ends consumption of the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StreamCompleted | Self::StreamError { .. })
    }
}
