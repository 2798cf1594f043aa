//! Error Types
//!
//! Failures the relay reports to its caller before a turn's stream starts,
//! plus the typed fault every upstream transport returns.
//!
//! # Pre-stream vs in-band
//!
//! [`RelayError`] is only ever returned from
//! [`StreamOrchestrator::stream`](crate::streaming::StreamOrchestrator::stream).
//! Once the first frame exists, faults are folded into a `completed_message`
//! frame followed by `stream_end` instead.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::BackendKind;
use crate::messages::MessageRole;

// =============================================================================
// Relay Errors
// =============================================================================

/// Errors surfaced to the calling layer before any frame is produced
#[derive(Debug, Error)]
pub enum RelayError {
    /// The referenced conversation does not exist
    #[error("Conversation not found: {conversation_id}")]
    NotFound {
        /// The id the caller supplied
        conversation_id: String,
    },

    /// The upstream backend rejected the request or could not be reached
    #[error(transparent)]
    Upstream(#[from] UpstreamFault),

    /// The caller asked for a backend kind other than the configured one
    #[error("Backend mismatch: requested {requested}, configured {configured}")]
    BackendMismatch {
        /// Kind named in the request
        requested: BackendKind,
        /// Kind this relay was built with
        configured: BackendKind,
    },

    /// The conversation store failed
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl RelayError {
    /// HTTP status an outer layer should map this error to
    #[must_use]
    pub fn status_hint(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Upstream(_) => 502,
            Self::BackendMismatch { .. } => 400,
            Self::Store(_) => 500,
        }
    }
}

// =============================================================================
// Upstream Fault
// =============================================================================

/// A failure reported by an upstream transport
///
/// `status` is `None` when no HTTP response was received (connection setup
/// failed or the connection dropped mid-stream).
#[derive(Clone, Debug, Error, PartialEq)]
pub struct UpstreamFault {
    /// HTTP status code, if a response was received
    pub status: Option<u16>,
    /// Response body or transport error description
    pub body: String,
    /// Safety-filter verdict parsed from the body, if the backend sent one
    pub content_filter: Option<ContentFilterResult>,
}

impl UpstreamFault {
    /// Fault for a non-success HTTP response
    ///
    /// The body is inspected once here for a content-filter payload.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let content_filter = ContentFilterResult::from_error_body(&body);
        Self {
            status: Some(status),
            body,
            content_filter,
        }
    }

    /// Fault for a transport-level failure with no HTTP status
    pub fn connection(detail: impl Into<String>) -> Self {
        Self {
            status: None,
            body: detail.into(),
            content_filter: None,
        }
    }

    /// Whether this fault is a safety rejection
    #[must_use]
    pub fn is_content_filter(&self) -> bool {
        self.content_filter.is_some()
    }
}

impl fmt::Display for UpstreamFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "Upstream returned {status}: {}", self.body),
            None => write!(f, "Upstream connection failed: {}", self.body),
        }
    }
}

impl From<reqwest::Error> for UpstreamFault {
    fn from(e: reqwest::Error) -> Self {
        Self {
            status: e.status().map(|s| s.as_u16()),
            body: e.to_string(),
            content_filter: None,
        }
    }
}

// =============================================================================
// Content Filter
// =============================================================================

/// Verdict for one safety category
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCategory {
    /// Whether this category caused the rejection
    #[serde(default)]
    pub filtered: bool,
    /// Severity label (e.g. "low", "medium", "high"), when reported
    #[serde(default)]
    pub severity: Option<String>,
}

/// Safety-filter categories that rejected a request, keyed by category name
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentFilterResult {
    /// Every reported category, filtered or not
    pub categories: BTreeMap<String, FilterCategory>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    innererror: Option<InnerError>,
}

#[derive(Deserialize)]
struct InnerError {
    #[serde(default)]
    content_filter_result: Option<BTreeMap<String, serde_json::Value>>,
}

impl ContentFilterResult {
    /// Parse `error.innererror.content_filter_result` from an error body
    ///
    /// Returns `None` unless at least one category is marked `filtered`.
    /// Categories whose verdict has an unexpected shape are skipped.
    #[must_use]
    pub fn from_error_body(body: &str) -> Option<Self> {
        let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
        let raw = envelope.error.innererror?.content_filter_result?;

        let categories: BTreeMap<String, FilterCategory> = raw
            .into_iter()
            .filter_map(|(name, verdict)| {
                serde_json::from_value::<FilterCategory>(verdict)
                    .ok()
                    .map(|v| (name, v))
            })
            .collect();

        let result = Self { categories };
        if result.triggered().next().is_some() {
            Some(result)
        } else {
            None
        }
    }

    /// Categories that were filtered, in name order
    pub fn triggered(&self) -> impl Iterator<Item = (&str, &FilterCategory)> {
        self.categories
            .iter()
            .filter(|(_, v)| v.filtered)
            .map(|(k, v)| (k.as_str(), v))
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors from a [`ConversationStore`](crate::store::ConversationStore)
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Message metadata could not be encoded or decoded
    #[error("Failed to serialize message metadata: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Only user and assistant messages are stored
    #[error("Invalid message role for storage: {0}")]
    InvalidRole(MessageRole),

    /// Append targeted a conversation that does not exist
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    /// The blocking storage task panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The database directory could not be created
    #[error("Failed to prepare database directory {path}: {source}")]
    Io {
        /// Directory that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILTER_BODY: &str = r#"{
        "error": {
            "message": "The response was filtered due to the prompt triggering content management policy (content_filter)",
            "code": "content_filter",
            "status": 400,
            "innererror": {
                "code": "ResponsibleAIPolicyViolation",
                "content_filter_result": {
                    "hate": {"filtered": true, "severity": "medium"},
                    "jailbreak": {"filtered": false, "detected": false},
                    "self_harm": {"filtered": false, "severity": "safe"},
                    "violence": {"filtered": true}
                }
            }
        }
    }"#;

    #[test]
    fn test_content_filter_parsed_from_status_body() {
        let fault = UpstreamFault::from_status(400, FILTER_BODY);
        assert!(fault.is_content_filter());

        let filter = fault.content_filter.unwrap();
        let triggered: Vec<_> = filter.triggered().map(|(k, _)| k).collect();
        assert_eq!(triggered, vec!["hate", "violence"]);
        assert_eq!(
            filter.categories["hate"].severity.as_deref(),
            Some("medium")
        );
        assert_eq!(filter.categories["violence"].severity, None);
    }

    #[test]
    fn test_plain_error_body_has_no_filter() {
        let fault = UpstreamFault::from_status(500, r#"{"error":{"message":"boom"}}"#);
        assert!(!fault.is_content_filter());

        let fault = UpstreamFault::from_status(502, "Bad Gateway");
        assert!(!fault.is_content_filter());
    }

    #[test]
    fn test_filter_result_with_nothing_triggered_is_none() {
        let body = r#"{"error":{"innererror":{"content_filter_result":{"hate":{"filtered":false}}}}}"#;
        assert!(ContentFilterResult::from_error_body(body).is_none());
    }

    #[test]
    fn test_fault_display() {
        let fault = UpstreamFault::from_status(503, "busy");
        assert_eq!(fault.to_string(), "Upstream returned 503: busy");

        let fault = UpstreamFault::connection("connection reset");
        assert_eq!(
            fault.to_string(),
            "Upstream connection failed: connection reset"
        );
    }

    #[test]
    fn test_status_hint() {
        let err = RelayError::NotFound {
            conversation_id: "nope".to_string(),
        };
        assert_eq!(err.status_hint(), 404);

        let err = RelayError::from(UpstreamFault::connection("down"));
        assert_eq!(err.status_hint(), 502);
    }
}
