//! Brief professor acknowledgement of a human reply. Runs outside the
//! discussion loop; callers treat a failure here as non-fatal.

use schemars::JsonSchema;
use serde::Deserialize;

use crate::coerce::coerce;
use crate::error::EngineError;
use crate::model::CompletionClient;
use crate::prompts::{acknowledger_prompt, ACKNOWLEDGER_PREAMBLE};
use crate::steps::StepName;

#[derive(Debug, Deserialize, JsonSchema)]
struct AckReply {
    answer: AckAnswer,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct AckAnswer {
    content: String,
    #[serde(default)]
    #[allow(dead_code)]
    status: String,
}

pub async fn run(
    model: &dyn CompletionClient,
    human_name: &str,
    reply_text: &str,
) -> Result<String, EngineError> {
    let step = StepName::Acknowledger;
    let raw = model
        .complete(ACKNOWLEDGER_PREAMBLE, &acknowledger_prompt(human_name, reply_text))
        .await?;
    let reply: AckReply = coerce(step, &raw)?;

    if reply.answer.content.trim().is_empty() {
        return Err(EngineError::validation(step, "empty acknowledgement"));
    }
    Ok(reply.answer.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::CannedClient;

    #[tokio::test]
    async fn test_acknowledgement_extracted() {
        let client = CannedClient::new([serde_json::json!({
            "answer": { "content": "Thank you, Sam. Noted.", "status": "acknowledged" }
        })
        .to_string()]);

        let content = run(&client, "Sam", "I think we should exit the segment.")
            .await
            .unwrap();
        assert_eq!(content, "Thank you, Sam. Noted.");

        let calls = client.calls.lock().unwrap();
        assert!(calls[0].1.contains("exit the segment"));
    }

    #[tokio::test]
    async fn test_blank_acknowledgement_rejected() {
        let client = CannedClient::new([serde_json::json!({
            "answer": { "content": "", "status": "acknowledged" }
        })
        .to_string()]);

        let err = run(&client, "Sam", "fine").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation {
                step: StepName::Acknowledger,
                ..
            }
        ));
    }
}
