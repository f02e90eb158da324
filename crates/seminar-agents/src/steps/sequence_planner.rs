//! Plans the speaking order for each topic.

use schemars::JsonSchema;
use serde::Deserialize;

use crate::coerce::coerce;
use crate::error::EngineError;
use crate::model::CompletionClient;
use crate::prompts::{sequence_planner_prompt, SEQUENCE_PLANNER_PREAMBLE};
use crate::state::{DiscussionPlan, DiscussionState, PersonaSet, StateUpdate};
use crate::steps::StepName;

#[derive(Debug, Deserialize, JsonSchema)]
struct SequencePlanReply {
    plan: DiscussionPlan,
}

/// Shared structural checks for planned and replanned speaking orders.
/// Entries may arrive as ids or names; they leave as canonical ids.
pub(crate) fn normalize_sequences(
    step: StepName,
    plan: &mut DiscussionPlan,
    personas: &PersonaSet,
    topic_count: usize,
) -> Result<(), EngineError> {
    if plan.sequences.is_empty() {
        return Err(EngineError::validation(step, "plan has no sequences"));
    }
    for sequence in &mut plan.sequences {
        if sequence.topic_index >= topic_count {
            return Err(EngineError::validation(
                step,
                format!("sequence topic_index {} out of range", sequence.topic_index),
            ));
        }
        if sequence.persona_sequence.is_empty() {
            return Err(EngineError::validation(
                step,
                format!("empty persona_sequence for topic {}", sequence.topic_index),
            ));
        }
        for entry in &mut sequence.persona_sequence {
            let persona = personas.resolve(entry).ok_or_else(|| {
                EngineError::validation(step, format!("unknown persona in sequence: {entry}"))
            })?;
            if persona.id == personas.professor_id() {
                return Err(EngineError::validation(
                    step,
                    "the professor moderates and is never sequenced",
                ));
            }
            *entry = persona.id.clone();
        }
    }
    Ok(())
}

pub async fn run(
    state: &DiscussionState,
    model: &dyn CompletionClient,
) -> Result<StateUpdate, EngineError> {
    let step = StepName::SequencePlanner;
    let personas = super::require_personas(step, state)?;
    let topics = state
        .topics
        .as_ref()
        .ok_or(EngineError::MissingPrerequisite {
            step,
            missing: "topic plan",
        })?;

    let raw = model
        .complete(
            SEQUENCE_PLANNER_PREAMBLE,
            &sequence_planner_prompt(&state.case_content, topics, personas),
        )
        .await?;
    let reply: SequencePlanReply = coerce(step, &raw)?;
    let mut plan = reply.plan;

    normalize_sequences(step, &mut plan, personas, topics.topics.len())?;

    Ok(StateUpdate {
        plan: Some(plan),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::{seeded_state, CannedClient};

    fn plan_json(sequences: &[(usize, &[&str])], status: &str) -> String {
        let entries: Vec<serde_json::Value> = sequences
            .iter()
            .map(|(topic_index, ids)| {
                serde_json::json!({ "topic_index": topic_index, "persona_sequence": ids })
            })
            .collect();
        serde_json::json!({ "plan": { "sequences": entries, "status": status } }).to_string()
    }

    #[tokio::test]
    async fn test_full_plan_accepted() {
        let client = CannedClient::new([plan_json(
            &[
                (0, &["persona-a", "persona-b", "persona-human"][..]),
                (1, &["persona-b", "persona-a"][..]),
                (2, &["persona-human", "persona-a"][..]),
            ],
            "created",
        )]);
        let update = run(&seeded_state(), &client).await.unwrap();
        let plan = update.plan.unwrap();
        assert_eq!(plan.sequences.len(), 3);
        assert_eq!(plan.sequences[0].persona_sequence.len(), 3);
    }

    #[tokio::test]
    async fn test_names_normalized_to_canonical_ids() {
        let client = CannedClient::new([plan_json(
            &[(0, &["Alice", "persona-b", "Sam"][..])],
            "created",
        )]);
        let update = run(&seeded_state(), &client).await.unwrap();
        assert_eq!(
            update.plan.unwrap().sequences[0].persona_sequence,
            vec!["persona-a", "persona-b", "persona-human"]
        );
    }

    #[tokio::test]
    async fn test_professor_in_sequence_rejected() {
        let client = CannedClient::new([plan_json(
            &[(0, &["persona-prof", "persona-a"][..])],
            "created",
        )]);
        let err = run(&seeded_state(), &client).await.unwrap_err();
        assert!(err.to_string().contains("professor"));
    }

    #[tokio::test]
    async fn test_unknown_persona_rejected() {
        let client = CannedClient::new([plan_json(&[(0, &["persona-zz"][..])], "created")]);
        let err = run(&seeded_state(), &client).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation {
                step: StepName::SequencePlanner,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_sequence_rejected() {
        let client = CannedClient::new([plan_json(&[(0, &[][..])], "created")]);
        assert!(run(&seeded_state(), &client).await.is_err());
    }

    #[tokio::test]
    async fn test_topic_index_out_of_range_rejected() {
        let client = CannedClient::new([plan_json(&[(7, &["persona-a"][..])], "created")]);
        assert!(run(&seeded_state(), &client).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_personas_is_wiring_bug() {
        let mut state = seeded_state();
        state.personas = None;
        let client = CannedClient::new([plan_json(&[(0, &["persona-a"][..])], "created")]);
        let err = run(&state, &client).await.unwrap_err();
        assert!(err.fault_class().is_wiring_bug());
        // The model must not have been consulted.
        assert_eq!(client.call_count(), 0);
    }
}
