//! Canonical discussion records and the aggregate session state.
//!
//! Every value in here is the typed form produced by the single
//! normalization pass at the state-merge boundary: model-facing parse
//! shapes live with their steps, get validated there, and are converted
//! into these records before entering `DiscussionState`. Downstream code
//! never sees loosely-shaped data.
//!
//! Merge semantics (owned by the engine, implemented in `apply`):
//! scalar fields overwrite, the discussion/assignments/summaries logs
//! append, and the evaluations log and discussion plan are replaced
//! wholesale. The replace is a deliberate asymmetry: the newest evaluation
//! is the sole routing authority, so the Evaluator emits the full
//! replacement list (history plus newest) each cycle.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::engine::{GraphNode, TransitionRecord};

/// Reserved id for the single human participant. AI personas must never
/// claim it.
pub const HUMAN_PERSONA_ID: &str = "persona-human";

/// Number of topics in every session.
pub const TOPIC_COUNT: usize = 3;

// ---------------------------------------------------------------------------
// Participants
// ---------------------------------------------------------------------------

/// A discussion participant, simulated or human.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub background: String,
    pub expertise: String,
    pub personality: String,
    pub role: String,
    pub is_human: bool,
    pub voice: String,
}

/// The full persona roster for one session, with the name → id index built
/// exactly once at creation.
///
/// Invariant: exactly one professor (never sequenced) and exactly one human
/// persona holding [`HUMAN_PERSONA_ID`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaSet {
    by_id: BTreeMap<String, Persona>,
    id_by_name: HashMap<String, String>,
    professor_id: String,
    human_id: String,
}

impl PersonaSet {
    pub fn new(professor: Persona, participants: Vec<Persona>) -> Self {
        let professor_id = professor.id.clone();
        let human_id = participants
            .iter()
            .find(|p| p.is_human)
            .map(|p| p.id.clone())
            .unwrap_or_else(|| HUMAN_PERSONA_ID.to_string());

        let mut by_id = BTreeMap::new();
        let mut id_by_name = HashMap::new();
        id_by_name.insert(professor.name.clone(), professor.id.clone());
        by_id.insert(professor.id.clone(), professor);
        for persona in participants {
            id_by_name.insert(persona.name.clone(), persona.id.clone());
            by_id.insert(persona.id.clone(), persona);
        }

        Self {
            by_id,
            id_by_name,
            professor_id,
            human_id,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Persona> {
        self.by_id.get(id)
    }

    /// Resolve a model-produced reference that may be an id or a name.
    pub fn resolve(&self, name_or_id: &str) -> Option<&Persona> {
        if let Some(persona) = self.by_id.get(name_or_id) {
            return Some(persona);
        }
        self.id_by_name
            .get(name_or_id)
            .and_then(|id| self.by_id.get(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn professor_id(&self) -> &str {
        &self.professor_id
    }

    pub fn human_id(&self) -> &str {
        &self.human_id
    }

    pub fn iter(&self) -> impl Iterator<Item = &Persona> {
        self.by_id.values()
    }

    /// Participants eligible for sequencing (everyone but the professor).
    pub fn sequenceable(&self) -> impl Iterator<Item = &Persona> {
        self.by_id.values().filter(move |p| p.id != self.professor_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Topics and plans
// ---------------------------------------------------------------------------

/// One discussion segment covering a distinct aspect of the case.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Topic {
    pub title: String,
    pub expected_insights: Vec<String>,
}

/// The three topics plus the order they are visited in.
///
/// Invariant: exactly [`TOPIC_COUNT`] topics; `sequence` must be exactly
/// the index set {0, 1, 2}.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TopicPlan {
    pub topics: Vec<Topic>,
    pub sequence: Vec<usize>,
    pub status: String,
}

/// Per-topic speaking order.
///
/// Invariant: `persona_sequence` is non-empty and never contains the
/// professor.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlanSequence {
    pub topic_index: usize,
    pub persona_sequence: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_question: Option<String>,
}

/// The full discussion plan. Replaced wholesale by the Replanner; otherwise
/// immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiscussionPlan {
    pub sequences: Vec<PlanSequence>,
    pub status: String,
}

// ---------------------------------------------------------------------------
// Turn-by-turn records
// ---------------------------------------------------------------------------

/// The professor's question or transition paired with the persona chosen to
/// respond. Append-only history; only the last entry is live.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Assignment {
    pub professor_statement: String,
    pub assigned_persona: String,
}

/// One contributed message in the discussion log. Append-only, never edited.
///
/// `speaker` is the display name; `persona_id` is the canonical id. Both are
/// normalized at creation, so downstream code may trust either.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionTurn {
    pub speaker: String,
    pub persona_id: String,
    pub message: String,
    #[serde(default)]
    pub references_to_others: Vec<String>,
    #[serde(default)]
    pub questions_raised: Vec<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
}

impl DiscussionTurn {
    /// A plain turn with no cross-references, as human replies enter the log.
    pub fn spoken(
        speaker: impl Into<String>,
        persona_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            speaker: speaker.into(),
            persona_id: persona_id.into(),
            message: message.into(),
            references_to_others: Vec::new(),
            questions_raised: Vec::new(),
            key_points: Vec::new(),
        }
    }
}

/// What the Evaluator decided about the discussion so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationAction {
    /// Keep probing the current line of thinking.
    Continue,
    /// Redirect to a different speaker mid-sequence.
    Replan,
    /// The current topic is exhausted.
    NextTopic,
}

impl std::fmt::Display for EvaluationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continue => write!(f, "CONTINUE"),
            Self::Replan => write!(f, "REPLAN"),
            Self::NextTopic => write!(f, "NEXT_TOPIC"),
        }
    }
}

/// The Evaluator's verdict for one cycle.
///
/// Only the most recent evaluation is authoritative for routing; older
/// entries are retained as audit context for the Summarizer.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Evaluation {
    pub action: EvaluationAction,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_next_speaker: Option<String>,
    pub follow_up_question: Vec<String>,
    #[serde(default)]
    pub sequence_complete: bool,
    #[serde(default)]
    pub current_topic_complete: bool,
}

/// Per-topic summary produced when the topic completes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Summary {
    pub key_points: Vec<String>,
    pub insights: Vec<String>,
    pub evolving_perspectives: Vec<String>,
    pub next_steps: Vec<String>,
    pub overall_summary: String,
}

// ---------------------------------------------------------------------------
// Aggregate state
// ---------------------------------------------------------------------------

/// The mutable record threaded through the graph. Owned exclusively by the
/// engine; nodes receive a read view and return a partial [`StateUpdate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionState {
    pub session_id: String,
    pub case_content: String,
    /// Display name of the human participant, fixed at session start.
    pub human_name: String,
    pub personas: Option<PersonaSet>,
    /// How the professor opens the session, kept for transcript display.
    pub professor_introduction: Option<String>,
    pub topics: Option<TopicPlan>,
    pub plan: Option<DiscussionPlan>,
    pub current_discussion: Vec<DiscussionTurn>,
    pub assignments: Vec<Assignment>,
    pub evaluations: Vec<Evaluation>,
    pub summaries: Vec<Summary>,
    pub current_node: GraphNode,
    pub transitions: Vec<TransitionRecord>,
    pub complete: bool,
    pub awaiting_user_input: bool,
    pub created_at: DateTime<Utc>,
}

impl DiscussionState {
    pub fn new(
        session_id: impl Into<String>,
        case_content: impl Into<String>,
        human_name: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            case_content: case_content.into(),
            human_name: human_name.into(),
            personas: None,
            professor_introduction: None,
            topics: None,
            plan: None,
            current_discussion: Vec::new(),
            assignments: Vec::new(),
            evaluations: Vec::new(),
            summaries: Vec::new(),
            current_node: GraphNode::CreatePersonas,
            transitions: Vec::new(),
            complete: false,
            awaiting_user_input: false,
            created_at: Utc::now(),
        }
    }

    /// Merge a node's partial update into the aggregate.
    pub fn apply(&mut self, update: StateUpdate) {
        if let Some(personas) = update.personas {
            self.personas = Some(personas);
        }
        if let Some(introduction) = update.professor_introduction {
            self.professor_introduction = Some(introduction);
        }
        if let Some(topics) = update.topics {
            self.topics = Some(topics);
        }
        if let Some(plan) = update.plan {
            self.plan = Some(plan);
        }
        self.current_discussion.extend(update.turns);
        self.assignments.extend(update.assignments);
        if let Some(evaluations) = update.evaluations {
            self.evaluations = evaluations;
        }
        self.summaries.extend(update.summaries);
        if let Some(flag) = update.awaiting_user_input {
            self.awaiting_user_input = flag;
        }
        if let Some(flag) = update.complete {
            self.complete = flag;
        }
    }

    /// Only the last assignment is live.
    pub fn latest_assignment(&self) -> Option<&Assignment> {
        self.assignments.last()
    }

    /// The sole routing authority.
    pub fn latest_evaluation(&self) -> Option<&Evaluation> {
        self.evaluations.last()
    }

    /// Topics are visited in order; the index of the one under discussion is
    /// the number already summarized.
    pub fn current_topic_index(&self) -> usize {
        self.summaries.len()
    }

    /// The sequence governing the current topic. After a replan the first
    /// sequence of the replacement plan is live regardless of index.
    pub fn live_sequence(&self) -> Option<&PlanSequence> {
        let plan = self.plan.as_ref()?;
        let topic = self.current_topic_index();
        plan.sequences
            .iter()
            .find(|s| s.topic_index == topic)
            .or_else(|| plan.sequences.first())
    }

    pub fn topic_count(&self) -> usize {
        self.topics.as_ref().map_or(0, |t| t.topics.len())
    }
}

/// Partial update returned by every node, merged by the engine.
///
/// `plan` and `evaluations` replace wholesale; `turns`, `assignments`, and
/// `summaries` append; scalars overwrite when set.
#[derive(Debug, Default)]
pub struct StateUpdate {
    pub personas: Option<PersonaSet>,
    pub professor_introduction: Option<String>,
    pub topics: Option<TopicPlan>,
    pub plan: Option<DiscussionPlan>,
    pub turns: Vec<DiscussionTurn>,
    pub assignments: Vec<Assignment>,
    pub evaluations: Option<Vec<Evaluation>>,
    pub summaries: Vec<Summary>,
    pub awaiting_user_input: Option<bool>,
    pub complete: Option<bool>,
}
