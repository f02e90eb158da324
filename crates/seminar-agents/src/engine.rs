//! Discussion graph: explicit nodes, legal transition guards, and the
//! engine loop that drives a session through them.
//!
//! The graph gives the orchestration loop a typed shape so that:
//! 1. Every hop between nodes leaves a record on the session.
//! 2. Illegal edges are caught by `advance()` guards, not discovered as
//!    corrupted state three nodes later.
//! 3. A persisted session can be resumed at exactly the node it parked on.
//!
//! Nodes never route themselves: each step returns a [`StateUpdate`], the
//! engine merges it and picks the next edge. The engine is also the only
//! writer of the transition log.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::gate::{self, GateOutcome};
use crate::model::CompletionClient;
use crate::state::{
    DiscussionState, DiscussionTurn, EvaluationAction, StateUpdate, HUMAN_PERSONA_ID,
};
use crate::steps::{
    assigner, evaluator, executor, orchestrator, persona_creator, replanner, sequence_planner,
    summarizer, topic_planner, StepName,
};
use crate::store::DiscussionStore;

// ---------------------------------------------------------------------------
// Graph nodes
// ---------------------------------------------------------------------------

/// The set of discussion graph nodes.
///
/// Every session starts at `CreatePersonas` and terminates at either
/// `Complete` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphNode {
    /// Generating the professor and student roster from the case.
    CreatePersonas,
    /// Deriving the three discussion topics.
    CreateTopics,
    /// Building the initial per-topic speaking order.
    CreatePlan,
    /// Professor picks the next question and the persona to answer it.
    AssignDiscussion,
    /// The assigned AI persona speaks (or the human branch is taken).
    ExecuteDiscussion,
    /// Parked on the gate waiting for the human participant.
    HandleUserInput,
    /// Judging the discussion so far and choosing the next edge.
    EvaluateDiscussion,
    /// Closing out a finished topic with a summary.
    SummarizeDiscussion,
    /// Rebuilding the live sequence around a mandated next speaker.
    ReplanSequence,
    /// Deciding whether every topic has been covered.
    Orchestrate,
    /// Terminal node: all topics summarized.
    Complete,
    /// Terminal node: a hard error ended the session.
    Failed,
}

impl GraphNode {
    /// True for nodes the engine never leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreatePersonas => write!(f, "CreatePersonas"),
            Self::CreateTopics => write!(f, "CreateTopics"),
            Self::CreatePlan => write!(f, "CreatePlan"),
            Self::AssignDiscussion => write!(f, "AssignDiscussion"),
            Self::ExecuteDiscussion => write!(f, "ExecuteDiscussion"),
            Self::HandleUserInput => write!(f, "HandleUserInput"),
            Self::EvaluateDiscussion => write!(f, "EvaluateDiscussion"),
            Self::SummarizeDiscussion => write!(f, "SummarizeDiscussion"),
            Self::ReplanSequence => write!(f, "ReplanSequence"),
            Self::Orchestrate => write!(f, "Orchestrate"),
            Self::Complete => write!(f, "Complete"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Legal edges of the discussion graph:
/// ```text
/// CreatePersonas → CreateTopics
/// CreateTopics → CreatePlan
/// CreatePlan → AssignDiscussion
/// AssignDiscussion → ExecuteDiscussion
/// ExecuteDiscussion → HandleUserInput | EvaluateDiscussion
/// HandleUserInput → EvaluateDiscussion
/// EvaluateDiscussion → SummarizeDiscussion | ReplanSequence | AssignDiscussion
/// SummarizeDiscussion → Orchestrate
/// ReplanSequence → AssignDiscussion
/// Orchestrate → AssignDiscussion | Complete
/// ```
/// Any non-terminal node may transition to `Failed`.
fn is_legal_transition(from: GraphNode, to: GraphNode) -> bool {
    use GraphNode::*;

    if to == Failed && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (CreatePersonas, CreateTopics)
            | (CreateTopics, CreatePlan)
            | (CreatePlan, AssignDiscussion)
            | (AssignDiscussion, ExecuteDiscussion)
            // Execute branches: AI persona speaks, or the human holds the floor
            | (ExecuteDiscussion, EvaluateDiscussion)
            | (ExecuteDiscussion, HandleUserInput)
            | (HandleUserInput, EvaluateDiscussion)
            // Evaluate routes: topic done → summarize; redirect → replan; else continue
            | (EvaluateDiscussion, SummarizeDiscussion)
            | (EvaluateDiscussion, ReplanSequence)
            | (EvaluateDiscussion, AssignDiscussion)
            | (SummarizeDiscussion, Orchestrate)
            | (ReplanSequence, AssignDiscussion)
            // Orchestrate: next topic or done
            | (Orchestrate, AssignDiscussion)
            | (Orchestrate, Complete)
    )
}

/// One entry in a session's transition log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// The node transitioned from.
    pub from: GraphNode,
    /// The node transitioned to.
    pub to: GraphNode,
    /// Offset from session creation, in milliseconds.
    pub elapsed_ms: u64,
    /// Optional context about why this edge was taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Attempt to move the session to the next node.
///
/// Validates the edge against the transition table, records it in the
/// session's transition log, and updates `current_node`.
pub fn advance(
    state: &mut DiscussionState,
    to: GraphNode,
    reason: Option<&str>,
) -> Result<(), EngineError> {
    let from = state.current_node;
    if !is_legal_transition(from, to) {
        return Err(EngineError::IllegalTransition { from, to });
    }

    let elapsed_ms = (Utc::now() - state.created_at).num_milliseconds().max(0) as u64;
    debug!(
        session_id = %state.session_id,
        from = %from,
        to = %to,
        "Graph transition"
    );

    state.transitions.push(TransitionRecord {
        from,
        to,
        elapsed_ms,
        reason: reason.map(String::from),
    });
    state.current_node = to;
    Ok(())
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// How a call to [`DiscussionEngine::run_until_blocked`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    /// The session is parked on the human gate. `prompt` is what the human
    /// participant should be shown.
    AwaitingHuman { prompt: String },
    /// Every topic has been discussed and summarized.
    Complete,
}

/// Drives a [`DiscussionState`] through the graph.
///
/// The engine owns routing and persistence; the model and store are behind
/// trait objects so outer surfaces choose the implementations.
pub struct DiscussionEngine {
    config: EngineConfig,
    model: Arc<dyn CompletionClient>,
    store: Arc<dyn DiscussionStore>,
}

impl DiscussionEngine {
    pub fn new(
        config: EngineConfig,
        model: Arc<dyn CompletionClient>,
        store: Arc<dyn DiscussionStore>,
    ) -> Self {
        Self {
            config,
            model,
            store,
        }
    }

    /// Run the graph until the session completes, parks on the human gate,
    /// or fails.
    ///
    /// On a hard error the session is moved to `Failed` (with the error text
    /// as the transition reason) before the error propagates, so a persisted
    /// state always records how it died.
    pub async fn run_until_blocked(
        &self,
        state: &mut DiscussionState,
    ) -> Result<EngineStatus, EngineError> {
        match self.drive(state).await {
            Ok(status) => Ok(status),
            Err(err) => {
                if !state.current_node.is_terminal() {
                    // Always legal from a non-terminal node.
                    let _ = advance(state, GraphNode::Failed, Some(&err.to_string()));
                }
                Err(err)
            }
        }
    }

    async fn drive(&self, state: &mut DiscussionState) -> Result<EngineStatus, EngineError> {
        loop {
            match state.current_node {
                GraphNode::CreatePersonas => {
                    let update =
                        persona_creator::run(state, self.model.as_ref(), self.config.student_count)
                            .await?;
                    state.apply(update);
                    self.persist_roster(state).await?;
                    advance(state, GraphNode::CreateTopics, None)?;
                }
                GraphNode::CreateTopics => {
                    let update = topic_planner::run(state, self.model.as_ref()).await?;
                    state.apply(update);
                    self.persist_topics(state).await?;
                    advance(state, GraphNode::CreatePlan, None)?;
                }
                GraphNode::CreatePlan => {
                    let update = sequence_planner::run(state, self.model.as_ref()).await?;
                    state.apply(update);
                    advance(state, GraphNode::AssignDiscussion, None)?;
                }
                GraphNode::AssignDiscussion => {
                    let update = assigner::run(state, self.model.as_ref()).await?;
                    state.apply(update);
                    self.persist_assignment(state).await?;
                    advance(state, GraphNode::ExecuteDiscussion, None)?;
                }
                GraphNode::ExecuteDiscussion => {
                    if state.awaiting_user_input {
                        advance(
                            state,
                            GraphNode::HandleUserInput,
                            Some("assigned persona is human"),
                        )?;
                    } else {
                        let update = executor::run(state, self.model.as_ref()).await?;
                        state.apply(update);
                        self.persist_latest_turn(state).await?;
                        advance(state, GraphNode::EvaluateDiscussion, None)?;
                    }
                }
                GraphNode::HandleUserInput => {
                    let outcome = gate::await_human_reply(
                        self.store.as_ref(),
                        &state.session_id,
                        self.config.gate.budget(),
                    )
                    .await?;
                    match outcome {
                        GateOutcome::Received(msg) => {
                            let human_id = state
                                .personas
                                .as_ref()
                                .map(|p| p.human_id().to_string())
                                .unwrap_or_else(|| HUMAN_PERSONA_ID.to_string());
                            state.apply(StateUpdate {
                                turns: vec![DiscussionTurn::spoken(
                                    state.human_name.clone(),
                                    human_id,
                                    msg.content,
                                )],
                                awaiting_user_input: Some(false),
                                ..Default::default()
                            });
                            advance(
                                state,
                                GraphNode::EvaluateDiscussion,
                                Some("human reply received"),
                            )?;
                        }
                        GateOutcome::StillWaiting => {
                            // Stay parked; the caller persists state and hands
                            // the prompt to its own caller.
                            return Ok(EngineStatus::AwaitingHuman {
                                prompt: human_prompt(state),
                            });
                        }
                    }
                }
                GraphNode::EvaluateDiscussion => {
                    let update = evaluator::run(state, self.model.as_ref()).await?;
                    state.apply(update);
                    let verdict =
                        crate::steps::require_latest_evaluation(StepName::Evaluator, state)?;
                    let topic_done = verdict.current_topic_complete;
                    let replan =
                        verdict.sequence_complete || verdict.action == EvaluationAction::Replan;
                    if topic_done {
                        advance(state, GraphNode::SummarizeDiscussion, Some("topic complete"))?;
                    } else if replan {
                        advance(state, GraphNode::ReplanSequence, Some("redirect requested"))?;
                    } else {
                        advance(state, GraphNode::AssignDiscussion, None)?;
                    }
                }
                GraphNode::SummarizeDiscussion => {
                    let update = summarizer::run(state, self.model.as_ref()).await?;
                    state.apply(update);
                    self.persist_latest_summary(state).await?;
                    advance(state, GraphNode::Orchestrate, None)?;
                }
                GraphNode::ReplanSequence => {
                    let update = replanner::run(state, self.model.as_ref()).await?;
                    state.apply(update);
                    advance(state, GraphNode::AssignDiscussion, Some("sequence replanned"))?;
                }
                GraphNode::Orchestrate => {
                    let update = orchestrator::run(state);
                    state.apply(update);
                    if state.complete {
                        advance(state, GraphNode::Complete, Some("all topics summarized"))?;
                    } else {
                        advance(state, GraphNode::AssignDiscussion, Some("next topic"))?;
                    }
                }
                GraphNode::Complete => return Ok(EngineStatus::Complete),
                GraphNode::Failed => {
                    return Err(EngineError::SessionFailed(state.session_id.clone()))
                }
            }
        }
    }

    // -- persistence ---------------------------------------------------------
    //
    // Everything written here is transcript, not state the graph reads back;
    // the one exception is the human gate, which polls the store directly.

    async fn persist_roster(&self, state: &DiscussionState) -> Result<(), EngineError> {
        if let Some(personas) = &state.personas {
            for persona in personas.iter() {
                self.store.insert_persona(&state.session_id, persona).await?;
            }
            if let Some(intro) = &state.professor_introduction {
                self.store
                    .insert_message(
                        &state.session_id,
                        Some(personas.professor_id()),
                        intro,
                        false,
                        false,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn persist_topics(&self, state: &DiscussionState) -> Result<(), EngineError> {
        if let Some(plan) = &state.topics {
            for topic in &plan.topics {
                self.store.insert_topic(&state.session_id, topic).await?;
            }
        }
        Ok(())
    }

    async fn persist_assignment(&self, state: &DiscussionState) -> Result<(), EngineError> {
        if let (Some(assignment), Some(personas)) = (state.latest_assignment(), &state.personas) {
            let content = if state.awaiting_user_input {
                format!(
                    "{}\n\nPlease provide your response as {}.",
                    assignment.professor_statement, state.human_name
                )
            } else {
                assignment.professor_statement.clone()
            };
            self.store
                .insert_message(
                    &state.session_id,
                    Some(personas.professor_id()),
                    &content,
                    false,
                    state.awaiting_user_input,
                )
                .await?;
        }
        Ok(())
    }

    async fn persist_latest_turn(&self, state: &DiscussionState) -> Result<(), EngineError> {
        if let Some(turn) = state.current_discussion.last() {
            self.store
                .insert_message(
                    &state.session_id,
                    Some(&turn.persona_id),
                    &turn.message,
                    false,
                    false,
                )
                .await?;
        }
        Ok(())
    }

    async fn persist_latest_summary(&self, state: &DiscussionState) -> Result<(), EngineError> {
        if let (Some(summary), Some(personas)) = (state.summaries.last(), &state.personas) {
            self.store
                .insert_message(
                    &state.session_id,
                    Some(personas.professor_id()),
                    &summary.overall_summary,
                    false,
                    false,
                )
                .await?;
        }
        Ok(())
    }
}

/// What the parked session shows the human participant.
fn human_prompt(state: &DiscussionState) -> String {
    let statement = state
        .latest_assignment()
        .map(|a| a.professor_statement.as_str())
        .unwrap_or("The floor is yours.");
    format!(
        "{}\n\nPlease provide your response as {}.",
        statement, state.human_name
    )
}
