//! End-to-end discussion graph slices over a scripted model.
//!
//! Drives `DiscussionEngine::run_until_blocked` through full sessions and
//! verifies the behavioral contracts:
//!
//! - A session visits all three topics and terminates at `Complete`.
//! - The professor moderates but never takes a discussion turn.
//! - Model-produced persona references are normalized to canonical ids.
//! - A REPLAN verdict rebuilds the live sequence around the mandated speaker,
//!   and a replan that ignores the mandate fails the session.
//! - Assigning the human parks the engine on the gate without consuming any
//!   model replies, and a stored reply resumes it.
//!
//! All tests are deterministic: replies come from a scripted client and time
//! is paused.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use seminar_agents::config::{EngineConfig, GateBudgetConfig, ModelEndpoint};
use seminar_agents::engine::{DiscussionEngine, EngineStatus, GraphNode};
use seminar_agents::error::EngineError;
use seminar_agents::model::{CompletionClient, ModelError};
use seminar_agents::state::DiscussionState;
use seminar_agents::store::{DiscussionStore, MemoryStore};

// ── Scripted model ───────────────────────────────────────────────────────────

/// Replays canned replies in order and records every call.
struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedModel {
    fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn user_prompt(&self, index: usize) -> String {
        self.calls.lock().unwrap()[index].1.clone()
    }

    fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionClient for ScriptedModel {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ModelError> {
        self.calls
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), user_prompt.to_string()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(ModelError::EmptyCompletion)
    }
}

// ── Canned replies ───────────────────────────────────────────────────────────

fn roster_json() -> String {
    serde_json::json!({
        "professor": {
            "name": "Dr. Osei",
            "background": "teaches competitive strategy",
            "expertise": "case method",
            "personality": "probing",
            "voice": "warm",
            "introduction_statement": "Welcome. Today we take apart Acme Corp."
        },
        "students": [
            {
                "name": "Alice",
                "background": "ten years in consulting",
                "expertise": "pricing",
                "personality": "skeptical",
                "voice": "blunt"
            },
            {
                "name": "Bob",
                "background": "ran a plant floor",
                "expertise": "operations",
                "personality": "methodical",
                "voice": "calm"
            }
        ]
    })
    .to_string()
}

fn topics_json() -> String {
    serde_json::json!({
        "plan": {
            "topics": [
                { "title": "Market position", "expected_insights": ["share loss is price-driven"] },
                { "title": "Cost structure", "expected_insights": ["fixed costs dominate"] },
                { "title": "The decision", "expected_insights": ["reprice or reposition"] }
            ],
            "sequence": [0, 1, 2],
            "status": "created"
        }
    })
    .to_string()
}

/// Initial plan referencing personas by display name, which the engine must
/// normalize to ids.
fn plan_json(sequences: &[(usize, &[&str])], status: &str) -> String {
    let entries: Vec<serde_json::Value> = sequences
        .iter()
        .map(|(topic_index, order)| {
            serde_json::json!({
                "topic_index": topic_index,
                "persona_sequence": order,
            })
        })
        .collect();
    serde_json::json!({ "plan": { "sequences": entries, "status": status } }).to_string()
}

fn assign_json(statement: &str, persona: &str) -> String {
    serde_json::json!({
        "assignment": { "professor_statement": statement, "assigned_persona": persona }
    })
    .to_string()
}

fn turn_json(speaker: &str, message: &str) -> String {
    serde_json::json!({
        "response": {
            "message": message,
            "speaker": speaker,
            "uuid": "",
            "references_to_others": [],
            "questions_raised": [],
            "key_points": [message]
        }
    })
    .to_string()
}

fn eval_json(
    action: &str,
    suggested: Option<&str>,
    follow_up: &str,
    sequence_complete: bool,
    topic_complete: bool,
) -> String {
    let mut value = serde_json::json!({
        "action": action,
        "reasoning": "the discussion warrants it",
        "follow_up_question": [follow_up],
        "sequence_complete": sequence_complete,
        "current_topic_complete": topic_complete,
    });
    if let Some(speaker) = suggested {
        value["suggested_next_speaker"] = serde_json::json!(speaker);
    }
    value.to_string()
}

fn close_topic_json() -> String {
    eval_json("NEXT_TOPIC", None, "Shall we move on?", true, true)
}

fn summary_json(overall: &str) -> String {
    serde_json::json!({
        "summary": {
            "key_points": ["price pressure"],
            "insights": ["margins are the lever"],
            "evolving_perspectives": ["the room converged"],
            "next_steps": ["quantify impact"],
            "overall_summary": overall,
        }
    })
    .to_string()
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn test_config() -> EngineConfig {
    EngineConfig {
        endpoint: ModelEndpoint {
            base_url: "http://localhost:9".into(),
            api_key: String::new(),
            model: "scripted".into(),
        },
        gate: GateBudgetConfig {
            max_attempts: 1,
            interval_ms: 1,
        },
        student_count: 2,
        database_url: None,
    }
}

fn engine_with(
    replies: Vec<String>,
) -> (DiscussionEngine, Arc<ScriptedModel>, Arc<MemoryStore>) {
    let model = Arc::new(ScriptedModel::new(replies));
    let store = Arc::new(MemoryStore::new());
    let engine = DiscussionEngine::new(test_config(), model.clone(), store.clone());
    (engine, model, store)
}

fn fresh_state() -> DiscussionState {
    DiscussionState::new(
        "case-session",
        "Acme Corp has lost a third of its market share in two years.",
        "Sam",
    )
}

/// One topic discussed by a single AI speaker and closed.
fn ai_topic_cycle(speaker: &str, statement: &str, overall: &str) -> Vec<String> {
    vec![
        assign_json(statement, speaker),
        turn_json(speaker, "The numbers say this is a pricing problem."),
        close_topic_json(),
        summary_json(overall),
    ]
}

// ── Full session ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_full_session_reaches_complete() {
    let mut replies = vec![
        roster_json(),
        topics_json(),
        plan_json(
            &[(0, &["Alice", "Bob"]), (1, &["Bob", "Alice"]), (2, &["Alice", "Bob"])],
            "created",
        ),
    ];
    replies.extend(ai_topic_cycle("Alice", "Alice, where does Acme stand?", "Position settled."));
    replies.extend(ai_topic_cycle("Bob", "Bob, walk us through the costs.", "Costs settled."));
    replies.extend(ai_topic_cycle("Alice", "Alice, what should they do?", "Decision settled."));

    let (engine, model, store) = engine_with(replies);
    let mut state = fresh_state();

    let status = engine.run_until_blocked(&mut state).await.unwrap();

    assert_eq!(status, EngineStatus::Complete);
    assert!(state.complete);
    assert_eq!(state.current_node, GraphNode::Complete);
    assert_eq!(state.summaries.len(), 3);
    assert_eq!(state.summaries[2].overall_summary, "Decision settled.");
    assert_eq!(model.remaining(), 0, "every scripted reply should be consumed");

    // The professor moderates but never takes a discussion turn.
    let personas = state.personas.as_ref().unwrap();
    assert!(state
        .current_discussion
        .iter()
        .all(|turn| turn.persona_id != personas.professor_id()));
    assert_eq!(state.current_discussion.len(), 3);
    assert_eq!(state.current_discussion[0].speaker, "Alice");
    assert_eq!(state.current_discussion[1].speaker, "Bob");

    // Name references were normalized to canonical ids at the merge boundary.
    let plan = state.plan.as_ref().unwrap();
    for sequence in &plan.sequences {
        for entry in &sequence.persona_sequence {
            assert!(entry.starts_with("persona-"), "unnormalized entry {entry}");
            assert!(personas.get(entry).is_some());
        }
    }

    // Each topic ran one assign → execute → evaluate cycle, and summarize
    // was only ever entered off a topic-complete verdict.
    let cycles = state
        .transitions
        .iter()
        .filter(|t| t.from == GraphNode::AssignDiscussion && t.to == GraphNode::ExecuteDiscussion)
        .count();
    assert_eq!(cycles, 3);
    let summarize_edges: Vec<_> = state
        .transitions
        .iter()
        .filter(|t| t.to == GraphNode::SummarizeDiscussion)
        .collect();
    assert_eq!(summarize_edges.len(), 3);
    assert!(summarize_edges.iter().all(|t| {
        t.from == GraphNode::EvaluateDiscussion && t.reason.as_deref() == Some("topic complete")
    }));

    // Terminal edge carries its reason.
    let last = state.transitions.last().unwrap();
    assert_eq!(last.from, GraphNode::Orchestrate);
    assert_eq!(last.to, GraphNode::Complete);
    assert_eq!(last.reason.as_deref(), Some("all topics summarized"));

    // Transcript: intro + (assignment + turn + summary) per topic, no human rows.
    let messages = store.messages_for("case-session");
    assert_eq!(messages.len(), 10);
    assert!(messages.iter().all(|m| !m.is_human));
    assert_eq!(messages[0].content, "Welcome. Today we take apart Acme Corp.");
    assert_eq!(store.personas_for("case-session").len(), 4);
}

// ── Replanning ───────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_replan_redirects_to_mandated_speaker_and_completes() {
    let mut replies = vec![
        roster_json(),
        topics_json(),
        plan_json(
            &[(0, &["Alice", "Bob"]), (1, &["Alice", "Bob"]), (2, &["Bob", "Alice"])],
            "created",
        ),
        assign_json("Alice, where does Acme stand?", "Alice"),
        turn_json("Alice", "I think this is purely a price war."),
        // The evaluator wants Bob's operations view next.
        eval_json("REPLAN", Some("Bob"), "How do costs factor in?", false, false),
        plan_json(
            &[(0, &["Bob", "Alice"]), (1, &["Alice", "Bob"]), (2, &["Bob", "Alice"])],
            "replanned",
        ),
        assign_json("Bob, how do costs factor in?", "Bob"),
        turn_json("Bob", "Our plants run at sixty percent utilization."),
        close_topic_json(),
        summary_json("Position settled."),
    ];
    replies.extend(ai_topic_cycle("Alice", "Alice, the cost side?", "Costs settled."));
    replies.extend(ai_topic_cycle("Bob", "Bob, the decision?", "Decision settled."));

    let (engine, model, _store) = engine_with(replies);
    let mut state = fresh_state();

    let status = engine.run_until_blocked(&mut state).await.unwrap();

    assert_eq!(status, EngineStatus::Complete);
    assert_eq!(model.remaining(), 0);

    // The replacement plan survived, normalized, with the mandated speaker
    // first and the evaluator's question attached verbatim.
    let personas = state.personas.as_ref().unwrap();
    let bob = personas.resolve("Bob").unwrap();
    let plan = state.plan.as_ref().unwrap();
    assert_eq!(plan.status, "replanned");
    assert_eq!(plan.sequences[0].persona_sequence[0], bob.id);
    assert_eq!(
        plan.sequences[0].follow_up_question.as_deref(),
        Some("How do costs factor in?")
    );

    // The post-replan assignment consulted the model with the follow-up.
    let assigner_prompt = model.user_prompt(7);
    assert!(assigner_prompt.contains("How do costs factor in?"));

    // The replan edge is in the audit log.
    assert!(state
        .transitions
        .iter()
        .any(|t| t.from == GraphNode::EvaluateDiscussion && t.to == GraphNode::ReplanSequence));

    // Evaluations accumulate: the redirect plus three topic closes.
    assert_eq!(state.evaluations.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_replan_ignoring_mandate_fails_session() {
    let replies = vec![
        roster_json(),
        topics_json(),
        plan_json(&[(0, &["Alice", "Bob"]), (1, &["Alice", "Bob"]), (2, &["Alice", "Bob"])], "created"),
        assign_json("Alice, open us up.", "Alice"),
        turn_json("Alice", "Price war, plain and simple."),
        eval_json("REPLAN", Some("Bob"), "How do costs factor in?", false, false),
        // Mandate says Bob, but the replanned sequence leads with Alice.
        plan_json(&[(0, &["Alice", "Bob"]), (1, &["Alice", "Bob"]), (2, &["Alice", "Bob"])], "replanned"),
    ];

    let (engine, _model, _store) = engine_with(replies);
    let mut state = fresh_state();

    let err = engine.run_until_blocked(&mut state).await.unwrap_err();

    assert!(matches!(err, EngineError::ReplanInvariant { .. }));
    assert_eq!(state.current_node, GraphNode::Failed);
    let last = state.transitions.last().unwrap();
    assert!(last.reason.as_deref().unwrap_or_default().contains("Replan invariant"));
}

// ── Human participation ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_human_assignment_parks_then_stored_reply_resumes() {
    let mut replies = vec![
        roster_json(),
        topics_json(),
        plan_json(
            &[(0, &["Sam", "Alice"]), (1, &["Alice", "Bob"]), (2, &["Bob", "Alice"])],
            "created",
        ),
        assign_json("Sam, what would you do here?", "Sam"),
        // Resumption: evaluator closes the topic on the human's answer.
        close_topic_json(),
        summary_json("Position settled."),
    ];
    replies.extend(ai_topic_cycle("Alice", "Alice, the cost side?", "Costs settled."));
    replies.extend(ai_topic_cycle("Bob", "Bob, the decision?", "Decision settled."));

    let (engine, model, store) = engine_with(replies);
    let mut state = fresh_state();

    // First run parks on the gate.
    let status = engine.run_until_blocked(&mut state).await.unwrap();
    match status {
        EngineStatus::AwaitingHuman { prompt } => {
            assert!(prompt.contains("Sam, what would you do here?"));
            assert!(prompt.contains("Please provide your response as Sam."));
        }
        EngineStatus::Complete => panic!("session should be parked on the human"),
    }
    assert_eq!(state.current_node, GraphNode::HandleUserInput);
    assert!(state.awaiting_user_input);
    // Roster, topics, plan, assignment, and nothing for the human's turn.
    assert_eq!(model.call_count(), 4);

    // The parked question is in the transcript with the gate flag.
    let parked = store.messages_for("case-session");
    assert!(parked.last().unwrap().awaiting_user_input);

    // A reply lands in the store (as an outer surface would write it).
    store
        .insert_message(
            "case-session",
            Some("persona-human"),
            "Hold price, cut the long tail of SKUs.",
            true,
            false,
        )
        .await
        .unwrap();

    // Second run absorbs the reply and finishes the session.
    let status = engine.run_until_blocked(&mut state).await.unwrap();
    assert_eq!(status, EngineStatus::Complete);
    assert!(!state.awaiting_user_input);
    assert_eq!(state.summaries.len(), 3);

    let human_turn = &state.current_discussion[0];
    assert_eq!(human_turn.speaker, "Sam");
    assert_eq!(human_turn.persona_id, "persona-human");
    assert_eq!(human_turn.message, "Hold price, cut the long tail of SKUs.");

    // The reply was consumed exactly once.
    let unread = store.fetch_unread_human_messages("case-session").await.unwrap();
    assert!(unread.is_empty());
}
