//! Event Normalizer
//!
//! Maps one raw delta-stream event (the `data:` payload of an SSE event from
//! a Responses-style endpoint) to a [`CanonicalEvent`]. Pure, no I/O.
//!
//! # Parsing
//!
//! Parsing happens in two steps so the two failure modes stay distinct:
//!
//! 1. The payload must be a JSON object with a string `type`. Anything else
//!    is malformed and becomes [`CanonicalEvent::StreamError`].
//! 2. The object is parsed into [`WireEvent`], which enumerates every field
//!    the relay reads. Unknown types, and known types whose fields do not
//!    match, become [`CanonicalEvent::Ignored`].
//!
//! | wire `type`                   | canonical event                      |
//! |-------------------------------|--------------------------------------|
//! | `response.output_text.delta`  | `TextDelta`                          |
//! | `response.output_item.added`  | `ItemStarted` (action for `workflow_action`) |
//! | `response.output_item.done`   | `ItemFinished`                       |
//! | `response.completed`, `[DONE]`| `StreamCompleted`                    |
//! | `response.failed`, `error`    | `StreamError`                        |
//! | `response.incomplete`         | `StreamError`                        |
//! | anything else                 | `Ignored`                            |

use serde::Deserialize;

use crate::events::{CanonicalEvent, ItemId, ItemKind};

/// Sentinel some backends send as the final SSE payload
pub const DONE_SENTINEL: &str = "[DONE]";

/// Item type the backend uses for workflow actions
pub const WORKFLOW_ACTION_TYPE: &str = "workflow_action";

/// Recognized wire events
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum WireEvent {
    /// Text fragment for an output item
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        /// Item the fragment belongs to
        #[serde(default)]
        item_id: Option<String>,
        /// The fragment
        #[serde(default)]
        delta: String,
    },

    /// All text for an output item has been sent
    #[serde(rename = "response.output_text.done")]
    OutputTextDone,

    /// A new output item was announced
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        /// The announced item
        item: WireItem,
    },

    /// An output item finished
    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        /// The finished item
        item: WireItem,
    },

    /// Response finished normally
    #[serde(rename = "response.completed")]
    Completed,

    /// Response failed
    #[serde(rename = "response.failed")]
    Failed {
        /// Final response object
        #[serde(default)]
        response: Option<WireResponse>,
    },

    /// Response stopped before completing (e.g. content filter, token limit)
    #[serde(rename = "response.incomplete")]
    Incomplete {
        /// Final response object
        #[serde(default)]
        response: Option<WireResponse>,
    },

    /// Stream-level error
    #[serde(rename = "error")]
    Error {
        /// Error message
        #[serde(default)]
        message: Option<String>,
        /// Error code
        #[serde(default)]
        code: Option<String>,
    },

    /// Any other event type
    #[serde(other)]
    Unknown,
}

/// An output item as announced on the wire
#[derive(Debug, Default, Deserialize)]
pub struct WireItem {
    /// Item id
    #[serde(default)]
    pub id: Option<String>,
    /// Item type (`message`, `workflow_action`, ...)
    #[serde(rename = "type", default)]
    pub item_type: Option<String>,
    /// Workflow action id (action items only)
    #[serde(default)]
    pub action_id: Option<String>,
    /// Item status
    #[serde(default)]
    pub status: Option<String>,
}

/// The response object carried by terminal events
#[derive(Debug, Default, Deserialize)]
pub struct WireResponse {
    /// Error reported by a failed response
    #[serde(default)]
    pub error: Option<WireError>,
    /// Reason reported by an incomplete response
    #[serde(default)]
    pub incomplete_details: Option<WireIncompleteDetails>,
}

/// Error object inside a failed response
#[derive(Debug, Default, Deserialize)]
pub struct WireError {
    /// Error code
    #[serde(default)]
    pub code: Option<String>,
    /// Error message
    #[serde(default)]
    pub message: Option<String>,
}

/// Details inside an incomplete response
#[derive(Debug, Default, Deserialize)]
pub struct WireIncompleteDetails {
    /// Why the response stopped
    #[serde(default)]
    pub reason: Option<String>,
}

/// Normalize one raw event payload
#[must_use]
pub fn normalize(raw: &str) -> CanonicalEvent {
    let raw = raw.trim();
    if raw.is_empty() {
        return CanonicalEvent::Ignored;
    }
    if raw == DONE_SENTINEL {
        return CanonicalEvent::StreamCompleted;
    }

    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            return CanonicalEvent::StreamError {
                detail: format!("Malformed upstream event: {e}"),
            }
        }
    };

    if value.get("type").and_then(serde_json::Value::as_str).is_none() {
        return CanonicalEvent::StreamError {
            detail: "Malformed upstream event: missing event type".to_string(),
        };
    }

    match serde_json::from_value::<WireEvent>(value) {
        Ok(event) => from_wire(event),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring upstream event with unexpected fields");
            CanonicalEvent::Ignored
        }
    }
}

/// Convert a parsed wire event
#[must_use]
pub fn from_wire(event: WireEvent) -> CanonicalEvent {
    match event {
        WireEvent::OutputTextDelta { item_id, delta } => {
            if delta.is_empty() {
                return CanonicalEvent::Ignored;
            }
            CanonicalEvent::TextDelta {
                item_id: item_id.filter(|id| !id.is_empty()).map(ItemId),
                text: delta,
            }
        }

        WireEvent::OutputItemAdded { item } => match item.id {
            Some(id) if !id.is_empty() => {
                let kind = if item.item_type.as_deref() == Some(WORKFLOW_ACTION_TYPE) {
                    ItemKind::Action {
                        action_id: item.action_id.unwrap_or_default(),
                        status: item.status.unwrap_or_default(),
                    }
                } else {
                    ItemKind::Content
                };
                CanonicalEvent::ItemStarted {
                    item_id: ItemId(id),
                    kind,
                }
            }
            _ => CanonicalEvent::Ignored,
        },

        WireEvent::OutputItemDone { item } => match item.id {
            Some(id) => CanonicalEvent::ItemFinished {
                item_id: ItemId(id),
            },
            None => CanonicalEvent::Ignored,
        },

        WireEvent::Completed => CanonicalEvent::StreamCompleted,

        WireEvent::Failed { response } => {
            let error = response.and_then(|r| r.error).unwrap_or_default();
            CanonicalEvent::StreamError {
                detail: describe(error.code, error.message, "response failed"),
            }
        }

        WireEvent::Incomplete { response } => {
            let reason = response
                .and_then(|r| r.incomplete_details)
                .and_then(|d| d.reason)
                .unwrap_or_else(|| "unknown".to_string());
            CanonicalEvent::StreamError {
                detail: format!("response incomplete: {reason}"),
            }
        }

        WireEvent::Error { message, code } => CanonicalEvent::StreamError {
            detail: describe(code, message, "error event"),
        },

        WireEvent::OutputTextDone | WireEvent::Unknown => CanonicalEvent::Ignored,
    }
}

fn describe(code: Option<String>, message: Option<String>, fallback: &str) -> String {
    match (code, message) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (None, Some(message)) => message,
        (Some(code), None) => code,
        (None, None) => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_delta() {
        let event = normalize(
            r#"{"type":"response.output_text.delta","item_id":"msg_1","output_index":0,"delta":"Hel"}"#,
        );
        assert_eq!(event, CanonicalEvent::item_delta("msg_1", "Hel"));
    }

    #[test]
    fn test_untagged_and_empty_deltas() {
        let event = normalize(r#"{"type":"response.output_text.delta","delta":"lo"}"#);
        assert_eq!(event, CanonicalEvent::delta("lo"));

        let event = normalize(r#"{"type":"response.output_text.delta","item_id":"msg_1","delta":""}"#);
        assert_eq!(event, CanonicalEvent::Ignored);
    }

    #[test]
    fn test_item_added_content_and_action() {
        let event = normalize(
            r#"{"type":"response.output_item.added","item":{"id":"msg_1","type":"message","status":"in_progress"}}"#,
        );
        assert_eq!(
            event,
            CanonicalEvent::ItemStarted {
                item_id: ItemId::new("msg_1"),
                kind: ItemKind::Content,
            }
        );

        let event = normalize(
            r#"{"type":"response.output_item.added","item":{"id":"wa_1","type":"workflow_action","action_id":"search","status":"in_progress"}}"#,
        );
        assert_eq!(
            event,
            CanonicalEvent::ItemStarted {
                item_id: ItemId::new("wa_1"),
                kind: ItemKind::Action {
                    action_id: "search".to_string(),
                    status: "in_progress".to_string(),
                },
            }
        );
    }

    #[test]
    fn test_item_added_without_id_is_ignored() {
        let event = normalize(r#"{"type":"response.output_item.added","item":{"type":"message"}}"#);
        assert_eq!(event, CanonicalEvent::Ignored);
    }

    #[test]
    fn test_item_done() {
        let event = normalize(r#"{"type":"response.output_item.done","item":{"id":"msg_1"}}"#);
        assert_eq!(
            event,
            CanonicalEvent::ItemFinished {
                item_id: ItemId::new("msg_1")
            }
        );
    }

    #[test]
    fn test_completion_signals() {
        assert_eq!(
            normalize(r#"{"type":"response.completed","response":{"id":"resp_1","status":"completed"}}"#),
            CanonicalEvent::StreamCompleted
        );
        assert_eq!(normalize("[DONE]"), CanonicalEvent::StreamCompleted);
    }

    #[test]
    fn test_error_events() {
        assert_eq!(
            normalize(r#"{"type":"error","code":"server_error","message":"overloaded"}"#),
            CanonicalEvent::StreamError {
                detail: "server_error: overloaded".to_string()
            }
        );
        assert_eq!(
            normalize(
                r#"{"type":"response.failed","response":{"error":{"message":"quota exhausted"}}}"#
            ),
            CanonicalEvent::StreamError {
                detail: "quota exhausted".to_string()
            }
        );
        assert_eq!(
            normalize(
                r#"{"type":"response.incomplete","response":{"incomplete_details":{"reason":"content_filter"}}}"#
            ),
            CanonicalEvent::StreamError {
                detail: "response incomplete: content_filter".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_and_informational_events_are_ignored() {
        assert_eq!(
            normalize(r#"{"type":"response.created","response":{"id":"resp_1"}}"#),
            CanonicalEvent::Ignored
        );
        assert_eq!(
            normalize(r#"{"type":"response.output_text.done","item_id":"msg_1","text":"Hello"}"#),
            CanonicalEvent::Ignored
        );
        assert_eq!(normalize("   "), CanonicalEvent::Ignored);
    }

    #[test]
    fn test_known_type_with_wrong_shape_is_ignored() {
        let event = normalize(r#"{"type":"response.output_item.added","item":"not-an-object"}"#);
        assert_eq!(event, CanonicalEvent::Ignored);
    }

    #[test]
    fn test_malformed_payloads_become_stream_errors() {
        let event = normalize("{not json");
        assert!(
            matches!(event, CanonicalEvent::StreamError { ref detail } if detail.starts_with("Malformed upstream event"))
        );

        let event = normalize(r#"{"delta":"orphan"}"#);
        assert!(matches!(event, CanonicalEvent::StreamError { .. }));

        let event = normalize("42");
        assert!(matches!(event, CanonicalEvent::StreamError { .. }));
    }
}
