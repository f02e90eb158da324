//! Response coercion: the single chokepoint between raw model text and
//! typed state.
//!
//! Every non-deterministic model output passes through `coerce` before it
//! can enter `DiscussionState`. Models wrap JSON in code fences, prepend
//! whitespace, and occasionally emit stray control characters; the cleanup
//! pipeline here reduces all of that to a parseable body, then deserializes
//! into the step's expected shape. Anything that survives cleanup but fails
//! the schema is rejected fail-closed with both the original and cleaned
//! text preserved for diagnostics.

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::EngineError;
use crate::steps::StepName;

/// Reduce raw model output to a parse-ready body.
///
/// Cleanup stages, in order:
/// 1. trim leading/trailing whitespace
/// 2. if the content opens with a code fence (with or without a language
///    tag), keep only the fenced body
/// 3. strip a trailing fence if one remains
/// 4. strip control characters, keeping `\n`, `\r`, `\t`
pub fn clean_response_text(raw: &str) -> String {
    let mut text = raw.trim();

    if text.starts_with("```") {
        // Drop the opening fence line; a language tag lives on the same line.
        text = match text.find('\n') {
            Some(idx) => &text[idx + 1..],
            None => "",
        };
        if let Some(end) = text.rfind("```") {
            text = &text[..end];
        }
    }

    text.trim()
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

/// Coerce raw model text into a typed record.
///
/// Missing required fields and wrong types are schema violations; both
/// produce `MalformedResponse` carrying the original raw text and the
/// cleaned text. No information needed to debug a bad response is dropped.
pub fn coerce<T: DeserializeOwned>(step: StepName, raw: &str) -> Result<T, EngineError> {
    let cleaned = clean_response_text(raw);
    serde_json::from_str(&cleaned).map_err(|err| {
        warn!(%step, error = %err, raw_chars = raw.len(), "response failed coercion");
        EngineError::MalformedResponse {
            step,
            raw: raw.to_string(),
            cleaned,
            detail: err.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Probe {
        action: String,
        count: u32,
    }

    const BODY: &str = r#"{"action": "continue", "count": 2}"#;

    #[test]
    fn test_bare_json_passes_through() {
        let parsed: Probe = coerce(StepName::Evaluator, BODY).unwrap();
        assert_eq!(parsed.action, "continue");
        assert_eq!(parsed.count, 2);
    }

    #[test]
    fn test_fenced_with_language_tag_equals_bare_parse() {
        let fenced = format!("```json\n{BODY}\n```");
        let direct: Probe = coerce(StepName::Evaluator, BODY).unwrap();
        let stripped: Probe = coerce(StepName::Evaluator, &fenced).unwrap();
        assert_eq!(direct, stripped);
    }

    #[test]
    fn test_fenced_without_language_tag_equals_bare_parse() {
        let fenced = format!("```\n{BODY}\n```");
        let direct: Probe = coerce(StepName::Evaluator, BODY).unwrap();
        let stripped: Probe = coerce(StepName::Evaluator, &fenced).unwrap();
        assert_eq!(direct, stripped);
    }

    #[test]
    fn test_surrounding_whitespace_stripped() {
        let padded = format!("\n\n   {BODY}   \n");
        let parsed: Probe = coerce(StepName::Evaluator, &padded).unwrap();
        assert_eq!(parsed.count, 2);
    }

    #[test]
    fn test_missing_trailing_fence_still_parses() {
        let truncated = format!("```json\n{BODY}");
        let parsed: Probe = coerce(StepName::Evaluator, &truncated).unwrap();
        assert_eq!(parsed.count, 2);
    }

    #[test]
    fn test_control_characters_stripped() {
        let dirty = "{\"action\": \"continue\",\u{0} \"count\": 2}";
        let parsed: Probe = coerce(StepName::Evaluator, dirty).unwrap();
        assert_eq!(parsed.count, 2);
    }

    #[test]
    fn test_newlines_inside_body_survive() {
        let multiline = "{\"action\": \"continue\",\n\t\"count\": 2}";
        let parsed: Probe = coerce(StepName::Evaluator, multiline).unwrap();
        assert_eq!(parsed.count, 2);
    }

    #[test]
    fn test_garbage_fails_with_raw_and_cleaned() {
        let raw = "```json\nthis is not json\n```";
        let err = coerce::<Probe>(StepName::TopicPlanner, raw).unwrap_err();
        match err {
            EngineError::MalformedResponse {
                step,
                raw: kept_raw,
                cleaned,
                ..
            } => {
                assert_eq!(step, StepName::TopicPlanner);
                assert_eq!(kept_raw, raw);
                assert_eq!(cleaned, "this is not json");
            }
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_type_rejected() {
        let raw = r#"{"action": "continue", "count": "two"}"#;
        let err = coerce::<Probe>(StepName::Evaluator, raw).unwrap_err();
        assert!(matches!(err, EngineError::MalformedResponse { .. }));
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let raw = r#"{"action": "continue"}"#;
        let err = coerce::<Probe>(StepName::Evaluator, raw).unwrap_err();
        assert!(matches!(err, EngineError::MalformedResponse { .. }));
    }

    #[test]
    fn test_empty_input_rejected() {
        let err = coerce::<Probe>(StepName::Evaluator, "").unwrap_err();
        assert!(matches!(err, EngineError::MalformedResponse { .. }));
    }

    #[test]
    fn test_fence_only_input_cleans_to_empty() {
        assert_eq!(clean_response_text("```json\n```"), "");
        assert_eq!(clean_response_text("```"), "");
    }
}
