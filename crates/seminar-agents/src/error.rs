//! Error types for the discussion engine, grouped by fault class.
//!
//! `EngineError` is the single error surface of the orchestration layer;
//! `fault_class()` tells a caller where a failure originated without string
//! matching on messages. All of these are fatal to the session that raised
//! them; no step retries internally.
//!
//! ## Fault classes
//!
//! | Class        | Meaning                                           |
//! |--------------|---------------------------------------------------|
//! | ModelOutput  | model text could not be coerced into the schema   |
//! | StepContract | parsed output violated a step's validation rule   |
//! | GraphWiring  | a node ran without its prerequisites, or an edge  |
//! |              | outside the transition table was attempted        |
//! | Collaborator | the model-call or persistence collaborator failed |
//!
//! The human-input timeout is deliberately absent: "still waiting" is a gate
//! outcome, not an error (see `gate::GateOutcome`).

use std::fmt;

use thiserror::Error;

use crate::engine::GraphNode;
use crate::model::ModelError;
use crate::steps::StepName;
use crate::store::StoreError;

/// Where a session failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// The model produced text that failed coercion into the expected shape.
    ModelOutput,
    /// Coerced output broke a step-specific invariant (topic count, replan
    /// speaker, professor in a sequence, ...).
    StepContract,
    /// The graph asked a step to run without required upstream state, or
    /// attempted an edge that is not in the transition table.
    GraphWiring,
    /// An external collaborator (model call, store, config) failed.
    Collaborator,
}

impl FaultClass {
    /// Whether this class indicates a bug in the engine's own wiring rather
    /// than bad input from outside.
    pub fn is_wiring_bug(self) -> bool {
        matches!(self, Self::GraphWiring)
    }
}

impl fmt::Display for FaultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelOutput => write!(f, "model_output"),
            Self::StepContract => write!(f, "step_contract"),
            Self::GraphWiring => write!(f, "graph_wiring"),
            Self::Collaborator => write!(f, "collaborator"),
        }
    }
}

/// Unified error type for the discussion engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Model output could not be reduced to valid structured data after
    /// cleanup. Carries both the original and the cleaned text so a bad
    /// response can always be diagnosed from the error alone.
    #[error("Malformed {step} response: {detail}")]
    MalformedResponse {
        step: StepName,
        raw: String,
        cleaned: String,
        detail: String,
    },

    /// Parsed output violated a step-specific validation rule.
    #[error("Validation failed in {step}: {reason}")]
    Validation { step: StepName, reason: String },

    /// A step was invoked without required upstream state. Indicates a
    /// graph-wiring bug, not a recoverable runtime condition.
    #[error("Missing prerequisite for {step}: {missing}")]
    MissingPrerequisite {
        step: StepName,
        missing: &'static str,
    },

    /// The replanned sequence does not start with the mandated next speaker.
    #[error("Replan invariant violated: next speaker should be {expected}, but got {found}")]
    ReplanInvariant { expected: String, found: String },

    /// An edge outside the transition table was attempted.
    #[error("Illegal state transition: {from} → {to}")]
    IllegalTransition { from: GraphNode, to: GraphNode },

    /// The model-call collaborator failed.
    #[error("Model call failed: {0}")]
    Model(#[from] ModelError),

    /// The persistence collaborator failed.
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),

    /// A required configuration field is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The session driver was handed an id it does not know.
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// A session that already reached the failed terminal was asked to run.
    #[error("Session {0} has already failed")]
    SessionFailed(String),
}

impl EngineError {
    /// Classify this error by fault origin.
    pub fn fault_class(&self) -> FaultClass {
        match self {
            Self::MalformedResponse { .. } => FaultClass::ModelOutput,
            Self::Validation { .. } | Self::ReplanInvariant { .. } => FaultClass::StepContract,
            Self::MissingPrerequisite { .. }
            | Self::IllegalTransition { .. }
            | Self::SessionFailed(_) => FaultClass::GraphWiring,
            Self::Model(_) | Self::Store(_) | Self::Config(_) | Self::UnknownSession(_) => {
                FaultClass::Collaborator
            }
        }
    }

    /// The step this error is attributed to, when one applies.
    pub fn step(&self) -> Option<StepName> {
        match self {
            Self::MalformedResponse { step, .. }
            | Self::Validation { step, .. }
            | Self::MissingPrerequisite { step, .. } => Some(*step),
            Self::ReplanInvariant { .. } => Some(StepName::Replanner),
            _ => None,
        }
    }

    /// Build a `Validation` variant conveniently.
    pub fn validation(step: StepName, reason: impl Into<String>) -> Self {
        Self::Validation {
            step,
            reason: reason.into(),
        }
    }
}
