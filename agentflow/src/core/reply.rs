//! Deterministic parsing of free-form decision-backend replies.

use serde::Deserialize;
use serde_json::Value;

use crate::core::types::Verdict;

/// Return the span from the first `{` to the last `}` in `text`.
///
/// Backends often wrap JSON in prose or code fences; this strips both.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Parse the first JSON object embedded in `text`.
pub fn parse_json_object(text: &str) -> Option<Value> {
    let raw = extract_json_object(text)?;
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

#[derive(Deserialize)]
struct RawVerdict {
    #[serde(default, alias = "passed")]
    valid: Option<bool>,
    #[serde(default)]
    score: Option<Value>,
    #[serde(default)]
    feedback: Option<String>,
}

/// Parse a scorer reply of the shape `{"valid": bool, "score": number, "feedback": str}`.
///
/// Returns `None` when the reply has no JSON object or the object has no
/// verdict fields at all. Missing fields default to `false`, `0.0`, and `""`.
pub fn parse_verdict(text: &str) -> Option<Verdict> {
    let value = parse_json_object(text)?;
    let raw: RawVerdict = serde_json::from_value(value).ok()?;
    if raw.valid.is_none() && raw.score.is_none() && raw.feedback.is_none() {
        return None;
    }
    let score = match raw.score {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    Some(Verdict::new(
        raw.valid.unwrap_or(false),
        score,
        raw.feedback.unwrap_or_default(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_from_fenced_reply() {
        let reply = "Here you go:\n```json\n{\"a\": {\"b\": 1}}\n```\n";
        assert_eq!(extract_json_object(reply), Some("{\"a\": {\"b\": 1}}"));
    }

    #[test]
    fn extract_rejects_text_without_braces() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[test]
    fn parses_full_verdict() {
        let verdict = parse_verdict(r#"{"valid": true, "score": 0.92, "feedback": "good"}"#)
            .expect("verdict");
        assert!(verdict.passed);
        assert_eq!(verdict.score, 0.92);
        assert_eq!(verdict.feedback, "good");
    }

    #[test]
    fn accepts_string_scores_and_passed_alias() {
        let verdict =
            parse_verdict(r#"{"passed": false, "score": "0.4"}"#).expect("verdict");
        assert!(!verdict.passed);
        assert_eq!(verdict.score, 0.4);
        assert_eq!(verdict.feedback, "");
    }

    #[test]
    fn malformed_reply_is_none() {
        assert_eq!(parse_verdict("looks fine to me"), None);
        assert_eq!(parse_verdict("{not json}"), None);
        assert_eq!(parse_verdict(r#"{"unrelated": 1}"#), None);
    }

    #[test]
    fn out_of_range_score_is_clamped() {
        let verdict = parse_verdict(r#"{"valid": true, "score": 7}"#).expect("verdict");
        assert_eq!(verdict.score, 1.0);
    }
}
