//! Rebuilds the speaking order around the evaluator's mandated next
//! speaker.
//!
//! Two hard rules carried from the evaluator's verdict: the replanned
//! sequence must open with the mandated persona, and the follow-up question
//! is copied onto the live sequence verbatim rather than trusted to the
//! model's rendition.

use schemars::JsonSchema;
use serde::Deserialize;

use crate::coerce::coerce;
use crate::error::EngineError;
use crate::model::CompletionClient;
use crate::prompts::{replanner_prompt, REPLANNER_PREAMBLE};
use crate::state::{DiscussionPlan, DiscussionState, StateUpdate};
use crate::steps::sequence_planner::normalize_sequences;
use crate::steps::StepName;

#[derive(Debug, Deserialize, JsonSchema)]
struct ReplanReply {
    plan: DiscussionPlan,
}

pub async fn run(
    state: &DiscussionState,
    model: &dyn CompletionClient,
) -> Result<StateUpdate, EngineError> {
    let step = StepName::Replanner;
    let personas = super::require_personas(step, state)?;
    let latest = super::require_latest_evaluation(step, state)?;

    let suggested = latest.suggested_next_speaker.as_deref().ok_or(
        EngineError::MissingPrerequisite {
            step,
            missing: "suggested_next_speaker",
        },
    )?;
    let follow_up = latest
        .follow_up_question
        .first()
        .ok_or(EngineError::MissingPrerequisite {
            step,
            missing: "follow_up_question",
        })?;

    let mandated = personas.resolve(suggested).ok_or_else(|| {
        EngineError::validation(step, format!("suggested speaker {suggested} is not in the roster"))
    })?;
    if mandated.id == personas.professor_id() {
        return Err(EngineError::validation(
            step,
            "the professor cannot be mandated to speak",
        ));
    }

    let raw = model
        .complete(
            REPLANNER_PREAMBLE,
            &replanner_prompt(
                mandated,
                latest,
                state.current_topic_index(),
                personas,
                &state.current_discussion,
            ),
        )
        .await?;
    let reply: ReplanReply = coerce(step, &raw)?;
    let mut plan = reply.plan;

    normalize_sequences(step, &mut plan, personas, state.topic_count())?;

    // normalize_sequences guarantees a non-empty first sequence with
    // canonical ids, so the invariant check is a straight comparison.
    if let Some(live) = plan.sequences.first_mut() {
        let first = live.persona_sequence[0].clone();
        if first != mandated.id {
            return Err(EngineError::ReplanInvariant {
                expected: mandated.id.clone(),
                found: first,
            });
        }
        live.follow_up_question = Some(follow_up.clone());
    }

    Ok(StateUpdate {
        plan: Some(plan),
        ..Default::default()
    })
}
