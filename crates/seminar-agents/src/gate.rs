//! Polling gate for human participation.
//!
//! When the assigner hands the floor to the human participant, the engine
//! parks on this gate instead of calling a model. The gate polls the message
//! store for an unread human reply, up to a bounded number of attempts.
//! Exhausting the budget is a normal outcome (the caller persists state and
//! returns control to its own caller), never an error.

use std::time::Duration;

use tracing::{debug, warn};

use crate::store::{DiscussionStore, StoreError, StoredMessage};

// ---------------------------------------------------------------------------
// Budget
// ---------------------------------------------------------------------------

/// How long the gate is willing to block before yielding back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateBudget {
    /// Number of store polls before giving up for this pass.
    pub max_attempts: u32,
    /// Pause between consecutive polls.
    pub interval: Duration,
}

impl GateBudget {
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum GateOutcome {
    /// A human reply arrived; the message has been marked read in the store.
    Received(StoredMessage),
    /// The budget ran out with no reply. The session stays parked and the
    /// gate can be re-entered later.
    StillWaiting,
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Poll `store` for an unread human message in `session_id`.
///
/// The first poll happens before any sleep, so a reply inserted just before
/// re-entry is picked up immediately. If several replies queued up while the
/// session was parked, the oldest is absorbed and the rest stay consumed by
/// the store fetch; a warning records the discard.
pub async fn await_human_reply(
    store: &dyn DiscussionStore,
    session_id: &str,
    budget: GateBudget,
) -> Result<GateOutcome, StoreError> {
    for attempt in 0..budget.max_attempts {
        let mut unread = store.fetch_unread_human_messages(session_id).await?;
        if !unread.is_empty() {
            if unread.len() > 1 {
                warn!(
                    session_id,
                    discarded = unread.len() - 1,
                    "multiple pending human messages, absorbing the oldest"
                );
            }
            debug!(session_id, attempt, "human reply received");
            return Ok(GateOutcome::Received(unread.remove(0)));
        }
        if attempt + 1 < budget.max_attempts {
            tokio::time::sleep(budget.interval).await;
        }
    }
    debug!(session_id, attempts = budget.max_attempts, "gate budget exhausted");
    Ok(GateOutcome::StillWaiting)
}
