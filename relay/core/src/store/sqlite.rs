//! SQLite conversation store
//!
//! Every operation opens its own connection on a blocking thread, so
//! concurrent turns never share a handle. Timestamps are stored as RFC 3339
//! text with fixed microsecond precision, which keeps lexical and
//! chronological order identical.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::task;

use super::{
    check_role, new_conversation_id, Conversation, ConversationStore, ConversationSummary,
    Message,
};
use crate::error::StoreError;
use crate::messages::MessageRole;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    title TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
    content TEXT NOT NULL,
    metadata TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_created
    ON messages (conversation_id, created_at, id);
"#;

/// File-backed store
#[derive(Clone, Debug)]
pub struct SqliteStore {
    path: Arc<PathBuf>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and ensure the schema
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let store = Self {
            path: Arc::new(path),
        };
        store
            .with_conn(|conn| {
                conn.query_row("PRAGMA journal_mode = WAL", [], |row| {
                    row.get::<_, String>(0)
                })?;
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;

        tracing::debug!(path = %store.path.display(), "Opened SQLite conversation store");
        Ok(store)
    }

    /// Database file location
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let path = Arc::clone(&self.path);
        task::spawn_blocking(move || {
            let mut conn = Connection::open(path.as_path())?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            f(&mut conn)
        })
        .await?
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let created_at: String = row.get(2)?;
    let updated_at: String = row.get(3)?;
    Ok(Conversation {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: parse_timestamp(2, &created_at)?,
        updated_at: parse_timestamp(3, &updated_at)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let role: String = row.get(2)?;
    let metadata: Option<String> = row.get(4)?;
    let created_at: String = row.get(5)?;

    let role = role.parse::<MessageRole>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let metadata = metadata
        .map(|m| serde_json::from_str::<serde_json::Value>(&m))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role,
        content: row.get(3)?,
        metadata,
        created_at: parse_timestamp(5, &created_at)?,
    })
}

fn to_sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn create_conversation(&self, title: Option<&str>) -> Result<Conversation, StoreError> {
        let now = Utc::now().trunc_subsecs(6);
        let conversation = Conversation {
            id: new_conversation_id(),
            title: title.map(str::to_string),
            created_at: now,
            updated_at: now,
        };

        let row = conversation.clone();
        self.with_conn(move |conn| {
            let stamp = timestamp(row.created_at);
            conn.execute(
                "INSERT INTO conversations (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![row.id, row.title, stamp, stamp],
            )?;
            Ok(())
        })
        .await?;

        Ok(conversation)
    }

    async fn conversation_exists(&self, conversation_id: &str) -> Result<bool, StoreError> {
        let id = conversation_id.to_string();
        self.with_conn(move |conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM conversations WHERE id = ?1 LIMIT 1",
                    params![id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, StoreError> {
        let id = conversation_id.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, title, created_at, updated_at FROM conversations WHERE id = ?1",
                    params![id],
                    conversation_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<i64, StoreError> {
        check_role(role)?;

        let id = conversation_id.to_string();
        let content = content.to_string();
        let metadata = metadata.map(serde_json::to_string).transpose()?;

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let stamp = timestamp(Utc::now());

            let touched = tx.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                params![stamp, id],
            )?;
            if touched == 0 {
                return Err(StoreError::ConversationNotFound(id));
            }

            tx.execute(
                "INSERT INTO messages (conversation_id, role, content, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, role.as_str(), content, metadata, stamp],
            )?;
            let message_id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(message_id)
        })
        .await
    }

    async fn get_messages(
        &self,
        conversation_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let id = conversation_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, content, metadata, created_at
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let messages = stmt
                .query_map(
                    params![id, to_sql_count(limit), to_sql_count(offset)],
                    message_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(messages)
        })
        .await
    }

    async fn get_recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let id = conversation_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, content, metadata, created_at
                 FROM (
                     SELECT id, conversation_id, role, content, metadata, created_at
                     FROM messages
                     WHERE conversation_id = ?1
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?2
                 )
                 ORDER BY created_at ASC, id ASC",
            )?;
            let messages = stmt
                .query_map(params![id, to_sql_count(limit)], message_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(messages)
        })
        .await
    }

    async fn list_conversations(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.title, c.created_at, c.updated_at,
                        (SELECT m.content FROM messages m
                         WHERE m.conversation_id = c.id
                         ORDER BY m.created_at DESC, m.id DESC
                         LIMIT 1) AS last_message
                 FROM conversations c
                 ORDER BY c.updated_at DESC, c.created_at DESC
                 LIMIT ?1 OFFSET ?2",
            )?;
            let summaries = stmt
                .query_map(params![to_sql_count(limit), to_sql_count(offset)], |row| {
                    Ok(ConversationSummary {
                        conversation: conversation_from_row(row)?,
                        last_message: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(summaries)
        })
        .await
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), StoreError> {
        let id = conversation_id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
    }
}
