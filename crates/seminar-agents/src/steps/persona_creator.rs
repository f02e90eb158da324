//! Invents the persona roster: one professor, a fixed number of simulated
//! students, plus the human participant under the reserved id.

use schemars::JsonSchema;
use serde::Deserialize;
use uuid::Uuid;

use crate::coerce::coerce;
use crate::error::EngineError;
use crate::model::CompletionClient;
use crate::prompts::{persona_creator_prompt, PERSONA_CREATOR_PREAMBLE};
use crate::state::{DiscussionState, Persona, PersonaSet, StateUpdate, HUMAN_PERSONA_ID};
use crate::steps::StepName;

#[derive(Debug, Deserialize, JsonSchema)]
struct RosterReply {
    professor: ProfessorSeed,
    students: Vec<StudentSeed>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ProfessorSeed {
    name: String,
    background: String,
    expertise: String,
    personality: String,
    voice: String,
    introduction_statement: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct StudentSeed {
    name: String,
    background: String,
    expertise: String,
    personality: String,
    voice: String,
    #[serde(default)]
    is_human: bool,
}

fn fresh_id() -> String {
    format!("persona-{}", Uuid::new_v4())
}

pub async fn run(
    state: &DiscussionState,
    model: &dyn CompletionClient,
    student_count: usize,
) -> Result<StateUpdate, EngineError> {
    let step = StepName::PersonaCreator;
    let raw = model
        .complete(
            PERSONA_CREATOR_PREAMBLE,
            &persona_creator_prompt(&state.case_content, student_count, &state.human_name),
        )
        .await?;
    let reply: RosterReply = coerce(step, &raw)?;

    if reply.students.len() != student_count {
        return Err(EngineError::validation(
            step,
            format!(
                "expected {student_count} student personas, got {}",
                reply.students.len()
            ),
        ));
    }
    if let Some(claimed) = reply.students.iter().find(|s| s.is_human) {
        return Err(EngineError::validation(
            step,
            format!("persona {} claims to be human; only the participant is", claimed.name),
        ));
    }
    if reply.professor.introduction_statement.trim().is_empty() {
        return Err(EngineError::validation(
            step,
            "professor introduction_statement is empty",
        ));
    }

    let mut names: Vec<&str> = reply.students.iter().map(|s| s.name.as_str()).collect();
    names.push(&reply.professor.name);
    names.push(&state.human_name);
    for (i, name) in names.iter().enumerate() {
        if name.trim().is_empty() {
            return Err(EngineError::validation(step, "persona with empty name"));
        }
        if names[..i].contains(name) {
            return Err(EngineError::validation(
                step,
                format!("duplicate persona name: {name}"),
            ));
        }
    }

    let professor = Persona {
        id: fresh_id(),
        name: reply.professor.name,
        background: reply.professor.background,
        expertise: reply.professor.expertise,
        personality: reply.professor.personality,
        role: "Professor".to_string(),
        is_human: false,
        voice: reply.professor.voice,
    };

    let mut participants: Vec<Persona> = reply
        .students
        .into_iter()
        .map(|seed| Persona {
            id: fresh_id(),
            name: seed.name,
            background: seed.background,
            expertise: seed.expertise,
            personality: seed.personality,
            role: "Student".to_string(),
            is_human: false,
            voice: seed.voice,
        })
        .collect();

    participants.push(Persona {
        id: HUMAN_PERSONA_ID.to_string(),
        name: state.human_name.clone(),
        background: "The participant joining this seminar live".to_string(),
        expertise: "their own experience".to_string(),
        personality: "authentic".to_string(),
        role: "Student".to_string(),
        is_human: true,
        voice: "natural".to_string(),
    });

    Ok(StateUpdate {
        personas: Some(PersonaSet::new(professor, participants)),
        professor_introduction: Some(reply.professor.introduction_statement),
        ..Default::default()
    })
}
