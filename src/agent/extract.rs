//! Fallback structured-result recovery from raw agent output.
//!
//! When an invocation captured no `structured_output` from a `result`
//! event, the structured outcome is recovered from whatever the agent
//! printed:
//!
//! 1. Detect the shape: a multi-line stream of JSON objects (first line
//!    parses as JSON and more than one line exists) versus a plain blob.
//! 2. In the streaming case, collect every assistant text message in order
//!    and keep only the last one — the most recent response wins.
//! 3. Strip the first fenced code block if present, regardless of tag.
//! 4. Locate the first top-level `{...}` object and parse it.
//!
//! A failure at the final step is a parse error, deliberately distinct
//! from transport errors: the agent ran, but said nothing usable.

use crate::agent::events::{AgentEvent, parse_event};
use crate::error::{PrdflowError, Result};
use regex::Regex;
use serde_json::Value;

/// Recover a structured result object from raw agent output.
pub fn extract(raw_text: &str) -> Result<Value> {
    let candidate = candidate_text(raw_text)?;
    let candidate = strip_fenced_block(&candidate);
    let object_text = locate_object(&candidate).ok_or_else(|| {
        PrdflowError::Parse(format!(
            "no JSON object found in agent output ({} chars)",
            raw_text.len()
        ))
    })?;

    serde_json::from_str(object_text)
        .map_err(|e| PrdflowError::Parse(format!("located object is not valid JSON: {}", e)))
}

/// Pick the text to search: the last assistant message in stream form, or
/// the whole blob otherwise.
fn candidate_text(raw_text: &str) -> Result<String> {
    let mut lines = raw_text.lines();
    let first = lines.next().unwrap_or("");
    let is_stream = lines.next().is_some()
        && serde_json::from_str::<Value>(first.trim()).is_ok();

    if !is_stream {
        return Ok(raw_text.to_string());
    }

    let mut last_assistant_text: Option<String> = None;
    for line in raw_text.lines() {
        if let Some(AgentEvent::Assistant { texts, .. }) = parse_event(line) {
            let text = texts.join("\n");
            if !text.trim().is_empty() {
                last_assistant_text = Some(text);
            }
        }
    }

    last_assistant_text.ok_or_else(|| {
        PrdflowError::Parse("stream output contains no assistant text messages".to_string())
    })
}

/// Strip the first fenced code block, returning its body; the input is
/// returned unchanged when no fence is present.
fn strip_fenced_block(text: &str) -> String {
    // First fence wins, whatever the language tag
    let fence = Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").unwrap();
    match fence.captures(text) {
        Some(captures) => captures[1].to_string(),
        None => text.to_string(),
    }
}

/// Locate the first top-level `{...}` object, honoring strings and escapes.
fn locate_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_fenced_json_block() {
        let raw = "```json\n{\"a\":1}\n```";
        let value = extract(raw).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn extracts_fenced_block_without_language_tag() {
        let raw = "Here you go:\n```\n{\"status\": \"completed\"}\n```\nDone.";
        let value = extract(raw).unwrap();
        assert_eq!(value["status"], "completed");
    }

    #[test]
    fn first_fenced_block_wins() {
        let raw = "```json\n{\"first\": true}\n```\n```json\n{\"second\": true}\n```";
        let value = extract(raw).unwrap();
        assert_eq!(value, json!({"first": true}));
    }

    #[test]
    fn extracts_object_from_plain_text() {
        let raw = "The result is {\"passes\": true, \"notes\": \"ok\"} as requested.";
        let value = extract(raw).unwrap();
        assert_eq!(value["passes"], true);
    }

    #[test]
    fn stream_form_uses_last_assistant_message() {
        let first = json!({
            "type": "assistant",
            "message": {"content": [{"type": "text", "text": "thinking about it"}]}
        })
        .to_string();
        let second = json!({
            "type": "assistant",
            "message": {"content": [{"type": "text", "text": "{\"status\":\"completed\",\"passes\":true}"}]}
        })
        .to_string();
        let result_line = json!({"type": "result"}).to_string();

        let raw = format!("{}\n{}\n{}", first, second, result_line);
        let value = extract(&raw).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["passes"], true);
    }

    #[test]
    fn stream_with_fenced_final_message() {
        let line = json!({
            "type": "assistant",
            "message": {"content": [{"type": "text",
                "text": "```json\n{\"status\": \"failed\"}\n```"}]}
        })
        .to_string();
        let raw = format!("{}\n{}", json!({"type":"system"}), line);

        let value = extract(&raw).unwrap();
        assert_eq!(value["status"], "failed");
    }

    #[test]
    fn nested_objects_and_strings_are_matched() {
        let raw = r#"prefix {"outer": {"inner": "has } brace"}, "n": 1} suffix"#;
        let value = extract(raw).unwrap();
        assert_eq!(value["outer"]["inner"], "has } brace");
        assert_eq!(value["n"], 1);
    }

    #[test]
    fn no_object_is_parse_error() {
        let err = extract("nothing structured here").unwrap_err();
        assert!(matches!(err, PrdflowError::Parse(_)));
    }

    #[test]
    fn stream_without_assistant_text_is_parse_error() {
        let raw = format!(
            "{}\n{}",
            json!({"type": "system"}),
            json!({"type": "result"})
        );
        let err = extract(&raw).unwrap_err();
        assert!(err.to_string().contains("no assistant text"));
    }

    #[test]
    fn single_json_line_is_treated_as_blob() {
        // one line only: not stream form, parsed directly
        let value = extract(r#"{"status": "completed", "passes": true}"#).unwrap();
        assert_eq!(value["status"], "completed");
    }

    #[test]
    fn unbalanced_object_is_parse_error() {
        let err = extract(r#"broken {"status": "completed""#).unwrap_err();
        assert!(matches!(err, PrdflowError::Parse(_)));
    }
}
