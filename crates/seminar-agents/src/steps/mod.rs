//! Discussion graph steps.
//!
//! One module per step. Each exposes a `run` function that reads the state
//! it needs, calls the model at most once, schema-validates the reply, and
//! returns a partial [`StateUpdate`](crate::state::StateUpdate). Steps never
//! mutate state and never route; the engine owns both. The orchestrator and
//! the assigner's human shortcut make no model call at all.

pub mod acknowledger;
pub mod assigner;
pub mod evaluator;
pub mod executor;
pub mod orchestrator;
pub mod persona_creator;
pub mod replanner;
pub mod sequence_planner;
pub mod summarizer;
pub mod topic_planner;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::state::{Assignment, DiscussionState, Evaluation, PersonaSet, PlanSequence, Topic};

/// Names every step for error attribution and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    PersonaCreator,
    TopicPlanner,
    SequencePlanner,
    Assigner,
    Executor,
    Evaluator,
    Replanner,
    Summarizer,
    Orchestrator,
    Acknowledger,
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PersonaCreator => "persona_creator",
            Self::TopicPlanner => "topic_planner",
            Self::SequencePlanner => "sequence_planner",
            Self::Assigner => "assigner",
            Self::Executor => "executor",
            Self::Evaluator => "evaluator",
            Self::Replanner => "replanner",
            Self::Summarizer => "summarizer",
            Self::Orchestrator => "orchestrator",
            Self::Acknowledger => "acknowledger",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// Prerequisite accessors
// ---------------------------------------------------------------------------
// A step reaching for state an upstream node should have produced is a
// wiring bug, reported as MissingPrerequisite against the step that noticed.

pub(crate) fn require_personas<'a>(
    step: StepName,
    state: &'a DiscussionState,
) -> Result<&'a PersonaSet, EngineError> {
    state.personas.as_ref().ok_or(EngineError::MissingPrerequisite {
        step,
        missing: "personas",
    })
}

pub(crate) fn require_current_topic<'a>(
    step: StepName,
    state: &'a DiscussionState,
) -> Result<&'a Topic, EngineError> {
    state
        .topics
        .as_ref()
        .and_then(|plan| plan.topics.get(state.current_topic_index()))
        .ok_or(EngineError::MissingPrerequisite {
            step,
            missing: "current topic",
        })
}

pub(crate) fn require_live_sequence<'a>(
    step: StepName,
    state: &'a DiscussionState,
) -> Result<&'a PlanSequence, EngineError> {
    state
        .live_sequence()
        .ok_or(EngineError::MissingPrerequisite {
            step,
            missing: "live plan sequence",
        })
}

pub(crate) fn require_latest_assignment<'a>(
    step: StepName,
    state: &'a DiscussionState,
) -> Result<&'a Assignment, EngineError> {
    state
        .latest_assignment()
        .ok_or(EngineError::MissingPrerequisite {
            step,
            missing: "assignment",
        })
}

pub(crate) fn require_latest_evaluation<'a>(
    step: StepName,
    state: &'a DiscussionState,
) -> Result<&'a Evaluation, EngineError> {
    state
        .latest_evaluation()
        .ok_or(EngineError::MissingPrerequisite {
            step,
            missing: "evaluation",
        })
}
