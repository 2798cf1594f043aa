//! In-memory conversation store

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::{
    check_role, new_conversation_id, Conversation, ConversationStore, ConversationSummary,
    Message,
};
use crate::error::StoreError;
use crate::messages::MessageRole;

#[derive(Default)]
struct Inner {
    conversations: HashMap<String, Conversation>,
    messages: Vec<Message>,
    next_id: i64,
}

/// Process-local store
///
/// Messages live in one vector in append order, so `(created_at, id)` order
/// is append order.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored messages across all conversations
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.inner.read().messages.len()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(&self, title: Option<&str>) -> Result<Conversation, StoreError> {
        let now = Utc::now();
        let conversation = Conversation {
            id: new_conversation_id(),
            title: title.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        self.inner
            .write()
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn conversation_exists(&self, conversation_id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.read().conversations.contains_key(conversation_id))
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, StoreError> {
        Ok(self.inner.read().conversations.get(conversation_id).cloned())
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<i64, StoreError> {
        check_role(role)?;

        let mut inner = self.inner.write();
        let now = Utc::now();
        let conversation = inner
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))?;
        conversation.updated_at = now;

        inner.next_id += 1;
        let id = inner.next_id;
        inner.messages.push(Message {
            id,
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            metadata: metadata.cloned(),
            created_at: now,
        });
        Ok(id)
    }

    async fn get_messages(
        &self,
        conversation_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .inner
            .read()
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.read();
        let matching: Vec<&Message> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .collect();
        let skip = matching.len().saturating_sub(limit);
        Ok(matching.into_iter().skip(skip).cloned().collect())
    }

    async fn list_conversations(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        let inner = self.inner.read();
        let mut conversations: Vec<&Conversation> = inner.conversations.values().collect();
        conversations.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        Ok(conversations
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|conversation| ConversationSummary {
                conversation: conversation.clone(),
                last_message: inner
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.conversation_id == conversation.id)
                    .map(|m| m.content.clone()),
            })
            .collect())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner.conversations.remove(conversation_id);
        inner.messages.retain(|m| m.conversation_id != conversation_id);
        Ok(())
    }
}
