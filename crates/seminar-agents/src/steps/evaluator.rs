//! Judges the discussion after each contribution and decides how it
//! proceeds.
//!
//! The verdict is appended to the evaluation history and the whole list is
//! emitted as a wholesale replacement: the newest entry routes, the older
//! entries stay available as audit context for the summarizer.

use crate::coerce::coerce;
use crate::error::EngineError;
use crate::model::CompletionClient;
use crate::prompts::{evaluator_prompt, EVALUATOR_PREAMBLE};
use crate::state::{DiscussionState, Evaluation, EvaluationAction, StateUpdate};
use crate::steps::StepName;

pub async fn run(
    state: &DiscussionState,
    model: &dyn CompletionClient,
) -> Result<StateUpdate, EngineError> {
    let step = StepName::Evaluator;
    let personas = super::require_personas(step, state)?;
    let topic = super::require_current_topic(step, state)?;
    let sequence = super::require_live_sequence(step, state)?;
    if state.current_discussion.is_empty() {
        return Err(EngineError::MissingPrerequisite {
            step,
            missing: "discussion turns",
        });
    }

    let raw = model
        .complete(
            EVALUATOR_PREAMBLE,
            &evaluator_prompt(topic, sequence, personas, &state.current_discussion),
        )
        .await?;
    let mut verdict: Evaluation = coerce(step, &raw)?;

    if verdict.action == EvaluationAction::Replan && verdict.suggested_next_speaker.is_none() {
        return Err(EngineError::validation(
            step,
            "REPLAN verdict without a suggested_next_speaker",
        ));
    }
    // Moving on implies the topic is done, whatever the flag said.
    if verdict.action == EvaluationAction::NextTopic {
        verdict.current_topic_complete = true;
    }

    let mut evaluations = state.evaluations.clone();
    evaluations.push(verdict);

    Ok(StateUpdate {
        evaluations: Some(evaluations),
        ..Default::default()
    })
}
