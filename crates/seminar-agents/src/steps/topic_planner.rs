//! Splits the case into exactly three topics with a visiting order.

use schemars::JsonSchema;
use serde::Deserialize;

use crate::coerce::coerce;
use crate::error::EngineError;
use crate::model::CompletionClient;
use crate::prompts::{topic_planner_prompt, TOPIC_PLANNER_PREAMBLE};
use crate::state::{DiscussionState, StateUpdate, TopicPlan, TOPIC_COUNT};
use crate::steps::StepName;

#[derive(Debug, Deserialize, JsonSchema)]
struct TopicPlanReply {
    plan: TopicPlan,
}

pub async fn run(
    state: &DiscussionState,
    model: &dyn CompletionClient,
) -> Result<StateUpdate, EngineError> {
    let step = StepName::TopicPlanner;
    let raw = model
        .complete(
            TOPIC_PLANNER_PREAMBLE,
            &topic_planner_prompt(&state.case_content),
        )
        .await?;
    let reply: TopicPlanReply = coerce(step, &raw)?;
    let plan = reply.plan;

    if plan.topics.len() != TOPIC_COUNT {
        return Err(EngineError::validation(
            step,
            format!("expected {TOPIC_COUNT} topics, got {}", plan.topics.len()),
        ));
    }
    // Any visiting order is fine as long as it covers each index once.
    let mut indices = plan.sequence.clone();
    indices.sort_unstable();
    if indices != (0..TOPIC_COUNT).collect::<Vec<_>>() {
        return Err(EngineError::validation(
            step,
            format!("sequence must cover indices 0..{TOPIC_COUNT} exactly once, got {:?}", plan.sequence),
        ));
    }
    if let Some(bare) = plan.topics.iter().find(|t| t.expected_insights.is_empty()) {
        return Err(EngineError::validation(
            step,
            format!("topic \"{}\" has no expected insights", bare.title),
        ));
    }

    Ok(StateUpdate {
        topics: Some(plan),
        ..Default::default()
    })
}
