//! Database module
//!
//! Provides persistence for conversations and messages.

mod schema;

pub use schema::*;

use crate::llm::MessageRole;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Conversation not found: {0}")]
    ConversationNotFound(i64),
    #[error("Database lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = Result<T, DbError>;

const CONVERSATION_COLUMNS: &str = "id, title, session_id, language, created_at";
const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, created_at";

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> DbResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    // ==================== Conversation Operations ====================

    /// Create a new conversation with a fresh session id
    pub fn create_conversation(&self, title: Option<&str>) -> DbResult<Conversation> {
        let conn = self.conn()?;
        let now = Utc::now();
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE)
            .to_string();
        let session_id = uuid::Uuid::new_v4().to_string();

        conn.execute(
            "INSERT INTO conversations (title, session_id, language, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![title, session_id, DEFAULT_LANGUAGE, now.to_rfc3339()],
        )?;

        Ok(Conversation {
            id: conn.last_insert_rowid(),
            title,
            session_id,
            language: DEFAULT_LANGUAGE.to_string(),
            created_at: now,
        })
    }

    /// Get conversation by ID
    pub fn get_conversation(&self, id: i64) -> DbResult<Conversation> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
            params![id],
            conversation_from_row,
        )
        .optional()?
        .ok_or(DbError::ConversationNotFound(id))
    }

    /// List all conversations, newest first
    pub fn list_conversations(&self) -> DbResult<Vec<Conversation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map([], conversation_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn update_title(&self, id: i64, title: &str) -> DbResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE conversations SET title = ?1 WHERE id = ?2",
            params![title, id],
        )?;
        if updated == 0 {
            return Err(DbError::ConversationNotFound(id));
        }
        Ok(())
    }

    /// Delete a conversation and, through the foreign key, its messages
    pub fn delete_conversation(&self, id: i64) -> DbResult<()> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DbError::ConversationNotFound(id));
        }
        Ok(())
    }

    // ==================== Message Operations ====================

    /// Append a message to a conversation
    pub fn add_message(
        &self,
        conversation_id: i64,
        role: MessageRole,
        content: &str,
    ) -> DbResult<Message> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?1)",
            params![conversation_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(DbError::ConversationNotFound(conversation_id));
        }

        let now = Utc::now();
        conn.execute(
            "INSERT INTO messages (conversation_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![conversation_id, role.as_str(), content, now.to_rfc3339()],
        )?;

        Ok(Message {
            id: conn.last_insert_rowid(),
            conversation_id,
            role,
            content: content.to_string(),
            created_at: now,
        })
    }

    /// Messages of a conversation, oldest first
    pub fn get_messages(&self, conversation_id: i64) -> DbResult<Vec<Message>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1 ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params![conversation_id], message_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Clear a conversation's history, returning how many messages were removed
    pub fn delete_messages(&self, conversation_id: i64) -> DbResult<usize> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
        )?)
    }
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        title: row.get(1)?,
        session_id: row.get(2)?,
        language: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let role: String = row.get(2)?;
    let role = MessageRole::parse(&role).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown message role: {role}").into(),
        )
    })?;
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role,
        content: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
