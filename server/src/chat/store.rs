//! Persistence collaborator for the chat transport.
//!
//! The transport consumes persistence through the narrow [`MessageStore`]
//! trait so the socket layer never touches SQL directly and tests can inject
//! a failing store. The production implementation is SQLite behind the shared
//! connection mutex; callers on the async side go through
//! `tokio::task::spawn_blocking`.

use chrono::Utc;
use rusqlite::OptionalExtension;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

use crate::db::models::{Chat, ChatMessage};
use crate::db::DbPool;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("database connection lock poisoned")]
    Lock,
}

/// One page of message history, newest first.
#[derive(Debug)]
pub struct MessagePage {
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
}

/// System of record for chats and messages.
pub trait MessageStore: Send + Sync {
    /// Resolve the chat for a pair of users, creating it on first contact.
    /// The pair is normalized, so (a, b) and (b, a) yield the same chat.
    fn chat_for_pair(&self, user_a: &str, user_b: &str) -> Result<Chat, StoreError>;

    /// Full ordered backlog for a chat, oldest first. Used by history replay.
    fn messages_by_chat(&self, chat_id: &str) -> Result<Vec<ChatMessage>, StoreError>;

    /// Paginated history, newest first, for the REST surface.
    fn messages_page(
        &self,
        chat_id: &str,
        before: Option<i64>,
        limit: u32,
    ) -> Result<MessagePage, StoreError>;

    /// Persist a new message and return the stored row.
    fn append_message(
        &self,
        chat_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<ChatMessage, StoreError>;
}

/// SQLite-backed [`MessageStore`].
pub struct SqliteMessageStore {
    db: DbPool,
}

impl SqliteMessageStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

/// Order a participant pair so storage and lookup are direction-independent.
fn normalize_pair<'a>(user_a: &'a str, user_b: &'a str) -> (&'a str, &'a str) {
    if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

impl MessageStore for SqliteMessageStore {
    fn chat_for_pair(&self, user_a: &str, user_b: &str) -> Result<Chat, StoreError> {
        let (a, b) = normalize_pair(user_a, user_b);
        let conn = self.db.lock().map_err(|_| StoreError::Lock)?;

        let existing = conn
            .query_row(
                "SELECT id, participant_a, participant_b, created_at
                 FROM chats WHERE participant_a = ?1 AND participant_b = ?2",
                rusqlite::params![a, b],
                |row| {
                    Ok(Chat {
                        id: row.get(0)?,
                        participant_a: row.get(1)?,
                        participant_b: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;

        if let Some(chat) = existing {
            return Ok(chat);
        }

        let id = Uuid::now_v7().to_string();
        let created_at = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO chats (id, participant_a, participant_b, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, a, b, created_at],
        )?;

        Ok(Chat {
            id,
            participant_a: a.to_string(),
            participant_b: b.to_string(),
            created_at,
        })
    }

    fn messages_by_chat(&self, chat_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::Lock)?;
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, sender_id, content, media_url, timestamp, created_at
             FROM messages WHERE chat_id = ?1 ORDER BY id ASC",
        )?;

        let messages = stmt
            .query_map(rusqlite::params![chat_id], row_to_message)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    fn messages_page(
        &self,
        chat_id: &str,
        before: Option<i64>,
        limit: u32,
    ) -> Result<MessagePage, StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::Lock)?;
        let before = before.unwrap_or(i64::MAX);

        // Fetch one extra row to determine has_more without a COUNT query.
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, sender_id, content, media_url, timestamp, created_at
             FROM messages WHERE chat_id = ?1 AND id < ?2
             ORDER BY id DESC LIMIT ?3",
        )?;

        let mut messages = stmt
            .query_map(
                rusqlite::params![chat_id, before, i64::from(limit) + 1],
                row_to_message,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let has_more = messages.len() > limit as usize;
        messages.truncate(limit as usize);

        Ok(MessagePage { messages, has_more })
    }

    fn append_message(
        &self,
        chat_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::Lock)?;
        let timestamp = now_millis();
        let created_at = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO messages (chat_id, sender_id, content, media_url, timestamp, created_at)
             VALUES (?1, ?2, ?3, NULL, ?4, ?5)",
            rusqlite::params![chat_id, sender_id, content, timestamp, created_at],
        )?;

        Ok(ChatMessage {
            id: conn.last_insert_rowid(),
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            media_url: None,
            timestamp,
            created_at,
        })
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        media_url: row.get(4)?,
        timestamp: row.get(5)?,
        created_at: row.get(6)?,
    })
}
