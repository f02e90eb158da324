//! Produces the professor's next statement and the persona assigned to
//! respond.
//!
//! When the live sequence carries a replan follow-up and its first speaker
//! is the human participant, the assignment is fully determined and no model
//! call is made: the follow-up becomes the professor's statement verbatim
//! and the discussion parks on the human gate.

use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

use crate::coerce::coerce;
use crate::error::EngineError;
use crate::model::CompletionClient;
use crate::prompts::{assigner_prompt, ASSIGNER_PREAMBLE};
use crate::state::{Assignment, DiscussionState, StateUpdate};
use crate::steps::StepName;

#[derive(Debug, Deserialize, JsonSchema)]
struct AssignReply {
    assignment: WireAssignment,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct WireAssignment {
    professor_statement: String,
    assigned_persona: String,
}

pub async fn run(
    state: &DiscussionState,
    model: &dyn CompletionClient,
) -> Result<StateUpdate, EngineError> {
    let step = StepName::Assigner;
    let personas = super::require_personas(step, state)?;
    let topic = super::require_current_topic(step, state)?;
    let sequence = super::require_live_sequence(step, state)?;

    if let Some(question) = &sequence.follow_up_question {
        let first = sequence
            .persona_sequence
            .first()
            .and_then(|id| personas.get(id));
        if let Some(persona) = first.filter(|p| p.is_human) {
            debug!(persona = %persona.name, "follow-up addressed to the human, skipping model");
            return Ok(StateUpdate {
                assignments: vec![Assignment {
                    professor_statement: question.clone(),
                    assigned_persona: persona.id.clone(),
                }],
                awaiting_user_input: Some(true),
                ..Default::default()
            });
        }
    }

    let raw = model
        .complete(
            ASSIGNER_PREAMBLE,
            &assigner_prompt(topic, sequence, personas, &state.current_discussion),
        )
        .await?;
    let reply: AssignReply = coerce(step, &raw)?;

    if reply.assignment.professor_statement.trim().is_empty() {
        return Err(EngineError::validation(step, "empty professor statement"));
    }
    let assigned = personas
        .resolve(&reply.assignment.assigned_persona)
        .ok_or_else(|| {
            EngineError::validation(
                step,
                format!("assigned persona {} is not in the roster", reply.assignment.assigned_persona),
            )
        })?;
    if assigned.id == personas.professor_id() {
        return Err(EngineError::validation(
            step,
            "the professor cannot be assigned to respond",
        ));
    }

    Ok(StateUpdate {
        assignments: vec![Assignment {
            professor_statement: reply.assignment.professor_statement,
            assigned_persona: assigned.id.clone(),
        }],
        awaiting_user_input: Some(assigned.is_human),
        ..Default::default()
    })
}
