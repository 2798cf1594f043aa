//! Wire Encoding
//!
//! Encodes [`DownstreamFrame`]s as server-sent events. Each frame becomes one
//! event of the form `data: <json>\n\n`; there are no `event:` or `id:`
//! fields.
//!
//! Two dialects exist. They differ only in how text fragments are tagged:
//!
//! | dialect    | fragment frame                                   |
//! |------------|--------------------------------------------------|
//! | `standard` | `{"type":"message_delta","item_id":…,"content":…}` |
//! | `legacy`   | `{"type":"message","content":…,"item_id":…}`       |

use std::fmt;
use std::str::FromStr;

use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::messages::DownstreamFrame;

/// Response headers an HTTP layer should send with an encoded stream
pub const SSE_HEADERS: [(&str, &str); 3] = [
    ("Content-Type", "text/event-stream"),
    ("Cache-Control", "no-cache"),
    ("Connection", "keep-alive"),
];

/// Client protocol flavour
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WireDialect {
    /// `message_delta` fragments
    #[default]
    Standard,
    /// `message` fragments for older clients
    Legacy,
}

impl fmt::Display for WireDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Legacy => write!(f, "legacy"),
        }
    }
}

impl FromStr for WireDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "legacy" => Ok(Self::Legacy),
            other => Err(format!(
                "Unknown wire dialect '{other}' (expected 'standard' or 'legacy')"
            )),
        }
    }
}

/// JSON form of a frame in the given dialect
#[must_use]
pub fn to_json(frame: &DownstreamFrame, dialect: WireDialect) -> Value {
    match frame {
        DownstreamFrame::Conversation { conversation_id } => json!({
            "type": "conversation",
            "conversation_id": conversation_id,
        }),
        DownstreamFrame::MessageDelta { item_id, content } => match dialect {
            WireDialect::Standard => json!({
                "type": "message_delta",
                "item_id": item_id,
                "content": content,
            }),
            WireDialect::Legacy => json!({
                "type": "message",
                "content": content,
                "item_id": item_id,
            }),
        },
        DownstreamFrame::CompletedMessage { content } => json!({
            "type": "completed_message",
            "content": content,
        }),
        DownstreamFrame::StreamEnd => json!({ "type": "stream_end" }),
    }
}

/// Encode one frame as an SSE event
#[must_use]
pub fn encode(frame: &DownstreamFrame, dialect: WireDialect) -> String {
    format!("data: {}\n\n", to_json(frame, dialect))
}

/// Encode a frame stream lazily
pub fn encode_stream<S>(frames: S, dialect: WireDialect) -> impl Stream<Item = String>
where
    S: Stream<Item = DownstreamFrame>,
{
    frames.map(move |frame| encode(&frame, dialect))
}
