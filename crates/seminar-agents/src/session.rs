//! Session driver: the surface outer layers call.
//!
//! Translates between "start a discussion / submit a reply" calls and engine
//! runs. Live sessions are kept in an injected [`SessionStore`], cloned out
//! and written back whole; concurrent submits to the same session race and
//! the last write wins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::{DiscussionEngine, EngineStatus};
use crate::error::EngineError;
use crate::model::CompletionClient;
use crate::state::{DiscussionState, Summary, HUMAN_PERSONA_ID};
use crate::steps::acknowledger;
use crate::store::DiscussionStore;

// ---------------------------------------------------------------------------
// Session store
// ---------------------------------------------------------------------------

/// Keyed storage for in-flight sessions.
///
/// The driver is handed an implementation instead of owning a registry, so
/// the backing can be swapped (per-process map, shared cache, ...) without
/// touching the engine. Failed sessions are kept so a resume attempt gets a
/// precise error instead of "unknown session".
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Option<DiscussionState>;

    async fn put(&self, state: DiscussionState);

    async fn delete(&self, session_id: &str);
}

/// Per-process session store. The default backing when the embedder does not
/// supply one.
#[derive(Default)]
pub struct InMemorySessionStore {
    inner: RwLock<HashMap<String, DiscussionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Option<DiscussionState> {
        self.inner.read().await.get(session_id).cloned()
    }

    async fn put(&self, state: DiscussionState) {
        self.inner
            .write()
            .await
            .insert(state.session_id.clone(), state);
    }

    async fn delete(&self, session_id: &str) {
        self.inner.write().await.remove(session_id);
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// How a driver call left the session.
#[derive(Debug, Clone)]
pub enum DriverOutcome {
    /// The discussion is parked on the human participant.
    AwaitingHuman { prompt: String },
    /// Every topic was discussed and summarized.
    Complete { summaries: Vec<Summary> },
}

/// Returned by every successful driver call.
#[derive(Debug, Clone)]
pub struct DriverReply {
    pub session_id: String,
    pub outcome: DriverOutcome,
    /// Professor's brief acknowledgement of a submitted reply, when one was
    /// produced. Best-effort: absent if the acknowledger failed.
    pub acknowledgement: Option<String>,
}

pub struct SessionDriver {
    engine: DiscussionEngine,
    sessions: Arc<dyn SessionStore>,
    model: Arc<dyn CompletionClient>,
    store: Arc<dyn DiscussionStore>,
}

impl SessionDriver {
    /// Driver with a fresh per-process session store.
    pub fn new(
        config: EngineConfig,
        model: Arc<dyn CompletionClient>,
        store: Arc<dyn DiscussionStore>,
    ) -> Self {
        Self::with_session_store(config, model, store, Arc::new(InMemorySessionStore::new()))
    }

    /// Driver over an externally owned session store.
    pub fn with_session_store(
        config: EngineConfig,
        model: Arc<dyn CompletionClient>,
        store: Arc<dyn DiscussionStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            engine: DiscussionEngine::new(config, model.clone(), store.clone()),
            sessions,
            model,
            store,
        }
    }

    /// Begin a new discussion over `case_content` and run it until it parks
    /// on the human, completes, or fails. The session is stored either way,
    /// so a failed start remains inspectable.
    pub async fn start_discussion(
        &self,
        case_content: &str,
        human_name: &str,
    ) -> Result<DriverReply, EngineError> {
        let session_id = Uuid::new_v4().to_string();
        let mut state = DiscussionState::new(session_id.clone(), case_content, human_name);
        info!(session_id = %session_id, human_name, "starting discussion");

        match self.engine.run_until_blocked(&mut state).await {
            Ok(status) => {
                let outcome = outcome_from(&state, status);
                self.sessions.put(state).await;
                Ok(DriverReply {
                    session_id,
                    outcome,
                    acknowledgement: None,
                })
            }
            Err(err) => {
                self.sessions.put(state).await;
                Err(err)
            }
        }
    }

    /// Feed the human participant's reply into a parked session and resume.
    ///
    /// The reply goes into the message store, where the resumed gate absorbs
    /// it on its first poll without sleeping; a short professor
    /// acknowledgement is attempted but never blocks the discussion if it
    /// fails.
    pub async fn submit_human_response(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<DriverReply, EngineError> {
        let mut state = self
            .sessions
            .get(session_id)
            .await
            .ok_or_else(|| EngineError::UnknownSession(session_id.to_string()))?;
        info!(session_id, chars = text.len(), "human response submitted");

        let human_id = state
            .personas
            .as_ref()
            .map(|p| p.human_id().to_string())
            .unwrap_or_else(|| HUMAN_PERSONA_ID.to_string());
        self.store
            .insert_message(session_id, Some(&human_id), text, true, false)
            .await?;

        let acknowledgement =
            match acknowledger::run(self.model.as_ref(), &state.human_name, text).await {
                Ok(content) => {
                    if let Some(personas) = &state.personas {
                        self.store
                            .insert_message(
                                session_id,
                                Some(personas.professor_id()),
                                &content,
                                false,
                                false,
                            )
                            .await?;
                    }
                    Some(content)
                }
                Err(err) => {
                    warn!(session_id, error = %err, "acknowledgement failed, continuing");
                    None
                }
            };

        match self.engine.run_until_blocked(&mut state).await {
            Ok(status) => {
                let outcome = outcome_from(&state, status);
                self.sessions.put(state).await;
                Ok(DriverReply {
                    session_id: session_id.to_string(),
                    outcome,
                    acknowledgement,
                })
            }
            Err(err) => {
                self.sessions.put(state).await;
                Err(err)
            }
        }
    }

    /// Snapshot of a stored session, for transcript display.
    pub async fn session(&self, session_id: &str) -> Option<DiscussionState> {
        self.sessions.get(session_id).await
    }

    /// Drop a session from the store. Abandoning a discussion is exactly
    /// this: nothing drives the state machine any further.
    pub async fn discard_session(&self, session_id: &str) {
        self.sessions.delete(session_id).await;
    }
}

fn outcome_from(state: &DiscussionState, status: EngineStatus) -> DriverOutcome {
    match status {
        EngineStatus::AwaitingHuman { prompt } => DriverOutcome::AwaitingHuman { prompt },
        EngineStatus::Complete => DriverOutcome::Complete {
            summaries: state.summaries.clone(),
        },
    }
}
