//! Conversation Store
//!
//! The persistence seam the orchestrator talks to. A store owns
//! conversations and their messages; the orchestrator only creates
//! conversations, checks they exist, appends messages and reads history.
//!
//! # Ordering
//!
//! Messages are ordered by `(created_at, id)`. That ordering is the only
//! notion of history; there is no separate sequence counter. Messages are
//! immutable once appended.
//!
//! # Implementations
//!
//! - [`MemoryStore`]: process-local, for tests and embedding
//! - [`SqliteStore`]: file-backed, one connection per operation

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::messages::{ChatTurn, MessageRole};

/// Default page size for [`ConversationStore::get_messages`]
pub const DEFAULT_MESSAGE_LIMIT: usize = 200;

/// Default page size for [`ConversationStore::list_conversations`]
pub const DEFAULT_CONVERSATION_LIMIT: usize = 20;

/// A stored conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Opaque unique id
    pub id: String,
    /// Optional human-readable title
    pub title: Option<String>,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// When a message was last appended
    pub updated_at: DateTime<Utc>,
}

/// A conversation plus a preview of its newest message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// The conversation
    #[serde(flatten)]
    pub conversation: Conversation,
    /// Content of the newest message, if any
    pub last_message: Option<String>,
}

/// A stored message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned id, increasing with insertion
    pub id: i64,
    /// Owning conversation
    pub conversation_id: String,
    /// `user` or `assistant`
    pub role: MessageRole,
    /// Message text
    pub content: String,
    /// Optional structured metadata
    pub metadata: Option<serde_json::Value>,
    /// When the message was appended
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Role/content pair for building upstream input
    #[must_use]
    pub fn to_turn(&self) -> ChatTurn {
        ChatTurn::new(self.role, self.content.clone())
    }
}

/// Persistence interface for conversations and messages
///
/// Implementations must support concurrent callers. Uniqueness of ids is the
/// store's responsibility; callers do no locking of their own.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation with a fresh id
    async fn create_conversation(&self, title: Option<&str>) -> Result<Conversation, StoreError>;

    /// Whether a conversation with this id exists
    async fn conversation_exists(&self, conversation_id: &str) -> Result<bool, StoreError>;

    /// Fetch a conversation by id
    async fn get_conversation(&self, conversation_id: &str)
        -> Result<Option<Conversation>, StoreError>;

    /// Append a message and touch the conversation's `updated_at`
    ///
    /// Rejects roles other than `user` and `assistant`, and conversations
    /// that do not exist. Returns the new message id.
    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<i64, StoreError>;

    /// Read a page of messages, oldest first
    async fn get_messages(
        &self,
        conversation_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>, StoreError>;

    /// Read the newest `limit` messages, returned oldest first
    ///
    /// The window always ends with the most recently appended message.
    async fn get_recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError>;

    /// List conversations, most recently updated first
    async fn list_conversations(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ConversationSummary>, StoreError>;

    /// Delete a conversation and all of its messages
    ///
    /// Deleting an unknown id is not an error.
    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), StoreError>;
}

/// Reject roles that are never persisted
pub(crate) fn check_role(role: MessageRole) -> Result<(), StoreError> {
    if role.is_storable() {
        Ok(())
    } else {
        Err(StoreError::InvalidRole(role))
    }
}

/// Fresh conversation id
pub(crate) fn new_conversation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
