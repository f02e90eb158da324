//! Decides whether the session is finished. Deterministic, never calls a model.

use crate::state::{DiscussionState, StateUpdate, TOPIC_COUNT};

/// A session is complete once every planned topic carries a summary.
/// This is the only place the `complete` flag is set.
pub fn run(state: &DiscussionState) -> StateUpdate {
    StateUpdate {
        complete: Some(state.summaries.len() >= TOPIC_COUNT),
        ..Default::default()
    }
}
