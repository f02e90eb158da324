//! Closes out a completed topic with a structured summary.

use schemars::JsonSchema;
use serde::Deserialize;

use crate::coerce::coerce;
use crate::error::EngineError;
use crate::model::CompletionClient;
use crate::prompts::{summarizer_prompt, SUMMARIZER_PREAMBLE};
use crate::state::{DiscussionState, StateUpdate, Summary};
use crate::steps::StepName;

#[derive(Debug, Deserialize, JsonSchema)]
struct SummaryReply {
    summary: Summary,
}

pub async fn run(
    state: &DiscussionState,
    model: &dyn CompletionClient,
) -> Result<StateUpdate, EngineError> {
    let step = StepName::Summarizer;
    let topic = super::require_current_topic(step, state)?;
    if state.current_discussion.is_empty() {
        return Err(EngineError::MissingPrerequisite {
            step,
            missing: "discussion turns",
        });
    }

    let raw = model
        .complete(
            SUMMARIZER_PREAMBLE,
            &summarizer_prompt(topic, &state.current_discussion, &state.evaluations),
        )
        .await?;
    let reply: SummaryReply = coerce(step, &raw)?;

    if reply.summary.overall_summary.trim().is_empty() {
        return Err(EngineError::validation(step, "empty overall_summary"));
    }

    Ok(StateUpdate {
        summaries: vec![reply.summary],
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DiscussionTurn;
    use crate::steps::testing::{seeded_state, CannedClient};

    fn summary_json(overall: &str) -> String {
        serde_json::json!({
            "summary": {
                "key_points": ["Alice pinned the loss on price"],
                "insights": ["share loss is price-driven"],
                "evolving_perspectives": ["Bob came around on churn"],
                "next_steps": ["quantify the margin impact"],
                "overall_summary": overall,
            }
        })
        .to_string()
    }

    fn discussed_state() -> DiscussionState {
        let mut state = seeded_state();
        state
            .current_discussion
            .push(DiscussionTurn::spoken("Alice", "persona-a", "Price is the problem."));
        state
    }

    #[tokio::test]
    async fn test_summary_appended() {
        let client = CannedClient::new([summary_json("The room settled on price.")]);
        let update = run(&discussed_state(), &client).await.unwrap();

        assert_eq!(update.summaries.len(), 1);
        assert_eq!(update.summaries[0].overall_summary, "The room settled on price.");
    }

    #[tokio::test]
    async fn test_summary_prompt_carries_verdict_history() {
        let mut state = discussed_state();
        state.evaluations.push(crate::state::Evaluation {
            action: crate::state::EvaluationAction::NextTopic,
            reasoning: "insights surfaced".into(),
            suggested_next_speaker: None,
            follow_up_question: vec!["q".into()],
            sequence_complete: true,
            current_topic_complete: true,
        });
        let client = CannedClient::new([summary_json("Done.")]);

        run(&state, &client).await.unwrap();

        let calls = client.calls.lock().unwrap();
        assert!(calls[0].1.contains("insights surfaced"));
    }

    #[tokio::test]
    async fn test_blank_summary_rejected() {
        let client = CannedClient::new([summary_json("  ")]);
        let err = run(&discussed_state(), &client).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation {
                step: StepName::Summarizer,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_summarizing_silence_is_wiring_bug() {
        let state = seeded_state();
        let client = CannedClient::new(Vec::<String>::new());
        let err = run(&state, &client).await.unwrap_err();
        assert!(err.fault_class().is_wiring_bug());
    }
}
