//! Defensive parsing of provider replies.
//!
//! Provider output is untrusted: it may be valid JSON, JSON wrapped in a
//! Markdown code fence, or unrelated prose. [`sanitize`] strips fences and
//! [`validate`] / [`validate_as`] deserialize into a declared shape. Missing
//! fields, wrong types, and object/array mismatches are a [`ParseFailure`];
//! unknown fields are ignored.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::schema::{BookAnalysis, Contract, Recommendation, Refinement, SchemaKind};

const FENCE: &str = "```";

/// A reply that does not match the requested shape.
#[derive(Debug, Clone, Error)]
#[error("payload does not match {kind:?} schema: {reason}")]
pub struct ParseFailure {
    pub kind: SchemaKind,
    pub reason: String,
}

/// Parsed value for a [`SchemaKind`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParsedValue {
    BookAnalysis(BookAnalysis),
    Recommendations(Vec<Recommendation>),
    Refinement(Refinement),
}

/// Removes enclosing code-fence markers and surrounding whitespace.
///
/// Repeats until no leading or trailing fence remains, so applying it twice
/// is the same as applying it once.
pub fn sanitize(payload: &str) -> String {
    let mut current = payload.trim();
    loop {
        let before = current.len();
        if let Some(rest) = current.strip_prefix(FENCE) {
            // Drop the language tag (```json) if present.
            let tag_len = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '+'))
                .unwrap_or(rest.len());
            current = rest[tag_len..].trim();
        }
        if let Some(rest) = current.strip_suffix(FENCE) {
            current = rest.trim();
        }
        if current.len() == before {
            return current.to_string();
        }
    }
}

/// Parses a sanitized payload into the shape named by `kind`.
pub fn validate(payload: &str, kind: SchemaKind) -> Result<ParsedValue, ParseFailure> {
    match kind {
        SchemaKind::BookAnalysis => validate_as::<BookAnalysis>(payload).map(ParsedValue::BookAnalysis),
        SchemaKind::Recommendations => {
            validate_as::<Vec<Recommendation>>(payload).map(ParsedValue::Recommendations)
        }
        SchemaKind::Refinement => validate_as::<Refinement>(payload).map(ParsedValue::Refinement),
    }
}

/// Typed form of [`validate`]; applies the contract's normalization.
pub fn validate_as<T: Contract>(payload: &str) -> Result<T, ParseFailure> {
    let failure = |reason: String| ParseFailure {
        kind: T::KIND,
        reason,
    };
    let value: Value = serde_json::from_str(payload).map_err(|e| failure(e.to_string()))?;

    // serde accepts a positional array for a struct; the schema does not.
    let expects_array = T::schema().is_array();
    if expects_array {
        match value.as_array() {
            None => return Err(failure("expected a JSON array".to_string())),
            Some(items) if items.iter().any(|item| !item.is_object()) => {
                return Err(failure("expected an array of JSON objects".to_string()))
            }
            Some(_) => {}
        }
    }
    if !expects_array && !value.is_object() {
        return Err(failure("expected a JSON object".to_string()));
    }

    serde_json::from_value::<T>(value)
        .map(T::normalize)
        .map_err(|e| failure(e.to_string()))
}

/// Sanitizes then validates a raw provider reply.
pub fn parse_reply<T: Contract>(raw: &str) -> Result<T, ParseFailure> {
    validate_as::<T>(&sanitize(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANALYSIS: &str = r#"{"problemSolved":"p","limitations":"l","audienceFit":"a","recommendedDepth":"d","confidence":80}"#;

    #[test]
    fn sanitize_strips_language_tagged_fence() {
        let fenced = format!("```json\n{}\n```", ANALYSIS);
        assert_eq!(sanitize(&fenced), ANALYSIS);
    }

    #[test]
    fn sanitize_strips_bare_and_inline_fences() {
        assert_eq!(sanitize("```\n[1]\n```"), "[1]");
        assert_eq!(sanitize("```{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(sanitize("  plain  "), "plain");
        assert_eq!(sanitize("```"), "");
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let samples = [
            "```json\n```json\n{}\n```\n```",
            "``` ```",
            "text with ``` inside",
            "```rust\nfn main() {}\n```",
            "````",
            "\n\n```json{}",
        ];
        for s in samples {
            let once = sanitize(s);
            assert_eq!(sanitize(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn sanitize_keeps_inner_backticks() {
        assert_eq!(sanitize("use `x` here"), "use `x` here");
    }

    #[test]
    fn fenced_and_plain_analysis_parse_identically() {
        let plain = validate(ANALYSIS, SchemaKind::BookAnalysis).unwrap();
        let fenced = validate(
            &sanitize(&format!("```json\n{}\n```", ANALYSIS)),
            SchemaKind::BookAnalysis,
        )
        .unwrap();
        assert_eq!(plain, fenced);
        match plain {
            ParsedValue::BookAnalysis(a) => assert_eq!(a.confidence, 80),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_field_is_failure() {
        let err = validate(r#"{"problemSolved":"p"}"#, SchemaKind::BookAnalysis).unwrap_err();
        assert_eq!(err.kind, SchemaKind::BookAnalysis);
    }

    #[test]
    fn wrong_type_is_failure() {
        assert!(validate(r#"{"refined": 42}"#, SchemaKind::Refinement).is_err());
        let bad_confidence = ANALYSIS.replace("80", "\"high\"");
        assert!(validate(&bad_confidence, SchemaKind::BookAnalysis).is_err());
    }

    #[test]
    fn container_mismatch_is_failure() {
        assert!(validate(r#"{"id":"1"}"#, SchemaKind::Recommendations).is_err());
        assert!(validate(r#"[{"refined":"x"}]"#, SchemaKind::Refinement).is_err());
        assert!(validate(r#"["positional"]"#, SchemaKind::Refinement).is_err());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let value = validate(r#"{"refined":"ok","mood":"calm"}"#, SchemaKind::Refinement).unwrap();
        assert_eq!(
            value,
            ParsedValue::Refinement(Refinement {
                refined: "ok".into()
            })
        );
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let high = ANALYSIS.replace("80", "130");
        let parsed: BookAnalysis = validate_as(&high).unwrap();
        assert_eq!(parsed.confidence, 100);
    }

    #[test]
    fn prose_is_failure() {
        assert!(parse_reply::<Refinement>("Sure! Here is your answer.").is_err());
    }
}
