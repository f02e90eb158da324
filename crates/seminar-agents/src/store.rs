//! Message persistence for discussion sessions.
//!
//! The store is the channel the human gate polls: outer surfaces write the
//! participant's replies here, and the engine drains unread human messages
//! when the discussion is parked on them. Everything else written (personas,
//! topics, the running message log) is an observable transcript, not state
//! the graph reads back.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::error;

use crate::state::{Persona, Topic};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("store connection failed: {0}")]
    Connection(String),
}

/// One row of the session message log.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub persona_id: Option<String>,
    pub content: String,
    pub is_human: bool,
    pub awaiting_user_input: bool,
    pub created_at: DateTime<Utc>,
}

/// Persistence seam for one discussion session.
#[async_trait]
pub trait DiscussionStore: Send + Sync {
    async fn insert_persona(&self, session_id: &str, persona: &Persona) -> Result<(), StoreError>;

    async fn insert_topic(&self, session_id: &str, topic: &Topic) -> Result<(), StoreError>;

    async fn insert_message(
        &self,
        session_id: &str,
        persona_id: Option<&str>,
        content: &str,
        is_human: bool,
        awaiting_user_input: bool,
    ) -> Result<(), StoreError>;

    /// Unread human messages for the session, oldest first. Returned rows
    /// are marked read: each human reply is consumed exactly once.
    async fn fetch_unread_human_messages(
        &self,
        session_id: &str,
    ) -> Result<Vec<StoredMessage>, StoreError>;
}

// ---------------------------------------------------------------------------
// Postgres-backed store
// ---------------------------------------------------------------------------

pub struct PgStore {
    client: tokio_postgres::Client,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let (client, connection) = tokio_postgres::connect(database_url, tokio_postgres::NoTls)
            .await
            .map_err(|err| StoreError::Connection(err.to_string()))?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(error = %err, "postgres connection terminated");
            }
        });
        Ok(Self { client })
    }

    /// Create the session tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.client
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS personas (\
                     id BIGSERIAL PRIMARY KEY,\
                     started_case_id TEXT NOT NULL,\
                     persona_id TEXT NOT NULL,\
                     name TEXT NOT NULL,\
                     role TEXT NOT NULL,\
                     background TEXT NOT NULL,\
                     is_human BOOLEAN NOT NULL\
                 );\
                 CREATE TABLE IF NOT EXISTS topics (\
                     id BIGSERIAL PRIMARY KEY,\
                     started_case_id TEXT NOT NULL,\
                     title TEXT NOT NULL,\
                     expected_insights TEXT[] NOT NULL\
                 );\
                 CREATE TABLE IF NOT EXISTS messages (\
                     message_id BIGSERIAL PRIMARY KEY,\
                     started_case_id TEXT NOT NULL,\
                     persona_id TEXT,\
                     content TEXT NOT NULL,\
                     is_human BOOLEAN NOT NULL,\
                     awaiting_user_input BOOLEAN NOT NULL,\
                     sent_at TIMESTAMPTZ NOT NULL DEFAULT now(),\
                     read_at TIMESTAMPTZ\
                 );",
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DiscussionStore for PgStore {
    async fn insert_persona(&self, session_id: &str, persona: &Persona) -> Result<(), StoreError> {
        self.client
            .execute(
                "INSERT INTO personas (started_case_id, persona_id, name, role, background, is_human) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &session_id,
                    &persona.id,
                    &persona.name,
                    &persona.role,
                    &persona.background,
                    &persona.is_human,
                ],
            )
            .await?;
        Ok(())
    }

    async fn insert_topic(&self, session_id: &str, topic: &Topic) -> Result<(), StoreError> {
        self.client
            .execute(
                "INSERT INTO topics (started_case_id, title, expected_insights) VALUES ($1, $2, $3)",
                &[&session_id, &topic.title, &topic.expected_insights],
            )
            .await?;
        Ok(())
    }

    async fn insert_message(
        &self,
        session_id: &str,
        persona_id: Option<&str>,
        content: &str,
        is_human: bool,
        awaiting_user_input: bool,
    ) -> Result<(), StoreError> {
        self.client
            .execute(
                "INSERT INTO messages (started_case_id, persona_id, content, is_human, awaiting_user_input) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[&session_id, &persona_id, &content, &is_human, &awaiting_user_input],
            )
            .await?;
        Ok(())
    }

    async fn fetch_unread_human_messages(
        &self,
        session_id: &str,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT persona_id, content, is_human, awaiting_user_input, sent_at \
                 FROM messages \
                 WHERE started_case_id = $1 AND is_human = TRUE AND read_at IS NULL \
                 ORDER BY sent_at",
                &[&session_id],
            )
            .await?;

        let messages = rows
            .iter()
            .map(|row| StoredMessage {
                persona_id: row.get(0),
                content: row.get(1),
                is_human: row.get(2),
                awaiting_user_input: row.get(3),
                created_at: row.get(4),
            })
            .collect();

        self.client
            .execute(
                "UPDATE messages SET read_at = now() \
                 WHERE started_case_id = $1 AND is_human = TRUE AND read_at IS NULL",
                &[&session_id],
            )
            .await?;

        Ok(messages)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Store for single-process runs and tests. Same consume-once semantics as
/// the Postgres store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    personas: HashMap<String, Vec<Persona>>,
    topics: HashMap<String, Vec<Topic>>,
    messages: Vec<MemoryMessage>,
}

struct MemoryMessage {
    session_id: String,
    message: StoredMessage,
    read: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Full message log for a session, read or not. For transcript display.
    pub fn messages_for(&self, session_id: &str) -> Vec<StoredMessage> {
        self.lock()
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .map(|m| m.message.clone())
            .collect()
    }

    pub fn personas_for(&self, session_id: &str) -> Vec<Persona> {
        self.lock()
            .personas
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DiscussionStore for MemoryStore {
    async fn insert_persona(&self, session_id: &str, persona: &Persona) -> Result<(), StoreError> {
        self.lock()
            .personas
            .entry(session_id.to_string())
            .or_default()
            .push(persona.clone());
        Ok(())
    }

    async fn insert_topic(&self, session_id: &str, topic: &Topic) -> Result<(), StoreError> {
        self.lock()
            .topics
            .entry(session_id.to_string())
            .or_default()
            .push(topic.clone());
        Ok(())
    }

    async fn insert_message(
        &self,
        session_id: &str,
        persona_id: Option<&str>,
        content: &str,
        is_human: bool,
        awaiting_user_input: bool,
    ) -> Result<(), StoreError> {
        self.lock().messages.push(MemoryMessage {
            session_id: session_id.to_string(),
            message: StoredMessage {
                persona_id: persona_id.map(str::to_string),
                content: content.to_string(),
                is_human,
                awaiting_user_input,
                created_at: Utc::now(),
            },
            read: false,
        });
        Ok(())
    }

    async fn fetch_unread_human_messages(
        &self,
        session_id: &str,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let mut inner = self.lock();
        let mut unread = Vec::new();
        for entry in inner.messages.iter_mut() {
            if entry.session_id == session_id && entry.message.is_human && !entry.read {
                entry.read = true;
                unread.push(entry.message.clone());
            }
        }
        Ok(unread)
    }
}
