//! Speaks as the assigned persona and appends their turn to the discussion.
//!
//! The engine never routes here while the discussion is parked on the human
//! gate; this step only voices simulated personas. Whatever speaker the
//! model claims, the turn is normalized to the persona that was assigned.

use schemars::JsonSchema;
use serde::Deserialize;
use tracing::warn;

use crate::coerce::coerce;
use crate::error::EngineError;
use crate::model::CompletionClient;
use crate::prompts::{executor_prompt, EXECUTOR_PREAMBLE};
use crate::state::{DiscussionState, DiscussionTurn, StateUpdate};
use crate::steps::StepName;

#[derive(Debug, Deserialize, JsonSchema)]
struct ExecutorReply {
    response: WireTurn,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct WireTurn {
    message: String,
    #[serde(default)]
    speaker: String,
    #[serde(default)]
    uuid: String,
    #[serde(default)]
    references_to_others: Vec<String>,
    #[serde(default)]
    questions_raised: Vec<String>,
    #[serde(default)]
    key_points: Vec<String>,
}

pub async fn run(
    state: &DiscussionState,
    model: &dyn CompletionClient,
) -> Result<StateUpdate, EngineError> {
    let step = StepName::Executor;
    let personas = super::require_personas(step, state)?;
    let topic = super::require_current_topic(step, state)?;
    let assignment = super::require_latest_assignment(step, state)?;

    let persona = personas.get(&assignment.assigned_persona).ok_or_else(|| {
        EngineError::validation(
            step,
            format!("assigned persona {} vanished from the roster", assignment.assigned_persona),
        )
    })?;
    if persona.is_human {
        // The human speaks through the gate, never through simulation.
        return Err(EngineError::validation(
            step,
            "refusing to simulate the human participant",
        ));
    }

    let raw = model
        .complete(
            EXECUTOR_PREAMBLE,
            &executor_prompt(persona, assignment, topic, &state.case_content, &state.current_discussion),
        )
        .await?;
    let reply: ExecutorReply = coerce(step, &raw)?;

    if reply.response.message.trim().is_empty() {
        return Err(EngineError::validation(step, "empty discussion message"));
    }
    if !reply.response.uuid.is_empty() && reply.response.uuid != persona.id {
        warn!(
            claimed = %reply.response.uuid,
            assigned = %persona.id,
            "model spoke as the wrong persona, normalizing"
        );
    }

    let turn = DiscussionTurn {
        speaker: persona.name.clone(),
        persona_id: persona.id.clone(),
        message: reply.response.message,
        references_to_others: reply.response.references_to_others,
        questions_raised: reply.response.questions_raised,
        key_points: reply.response.key_points,
    };

    Ok(StateUpdate {
        turns: vec![turn],
        ..Default::default()
    })
}
