//! Agent event-stream protocol.
//!
//! The agent process emits newline-delimited JSON objects on stdout, each
//! discriminated by a `type` field:
//!
//! - `system` / `init` — initialization signal, no state extracted
//! - `user` — echoed input, ignored
//! - `assistant` — may carry partial token usage (a live progress
//!   estimate) and a context-compaction signal, which always means the
//!   session exceeded its context budget and must fail the phase
//! - `result` — terminal; final usage, cost, per-model context window, and
//!   an optional directly-provided structured result
//!
//! Consumption is pull-based: an [`EventSource`] yields parsed events plus
//! their raw lines. Production wires a process stdout through
//! [`ReadEventSource`]; tests inject canned sequences. Reads may split a
//! line anywhere, so [`LineAssembler`] buffers the undelimited remainder
//! and prepends it to the next read.

use crate::error::{PrdflowError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;

/// Final token usage reported by a `result` event.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
pub struct AgentUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
}

/// One parsed event from the agent stream.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// `system` or `init`: initialization only.
    System,
    /// Echoed user message.
    User,
    /// Assistant progress message.
    Assistant {
        /// Partial usage (input + cache-creation tokens) for live estimates.
        estimate_tokens: Option<u64>,
        /// Text content blocks, in order.
        texts: Vec<String>,
        /// Context-compaction signal: the session exceeded its budget.
        compaction: bool,
    },
    /// Terminal result event.
    ResultEvent {
        usage: Option<AgentUsage>,
        total_cost_usd: Option<f64>,
        context_window: Option<u64>,
        structured_output: Option<Value>,
    },
    /// Unrecognized event type, tolerated and skipped.
    Other,
}

/// Parse one stream line into an event.
///
/// Returns `None` for lines that are not JSON objects; the raw line still
/// contributes to the invocation's raw output.
pub fn parse_event(line: &str) -> Option<AgentEvent> {
    let value: Value = serde_json::from_str(line).ok()?;
    let event_type = value.get("type")?.as_str()?;

    let event = match event_type {
        "system" | "init" => AgentEvent::System,
        "user" => AgentEvent::User,
        "assistant" => {
            let message = value.get("message");
            let estimate_tokens = message
                .and_then(|m| m.get("usage"))
                .map(|usage| {
                    let input = usage
                        .get("input_tokens")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0);
                    let cache = usage
                        .get("cache_creation_input_tokens")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0);
                    input + cache
                });
            let texts = message
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_array())
                .map(|blocks| {
                    blocks
                        .iter()
                        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                        .map(|t| t.to_string())
                        .collect()
                })
                .unwrap_or_default();
            let compaction = value.get("compaction").is_some();

            AgentEvent::Assistant {
                estimate_tokens,
                texts,
                compaction,
            }
        }
        "result" => {
            let usage = value
                .get("usage")
                .and_then(|u| serde_json::from_value(u.clone()).ok());
            let total_cost_usd = value.get("total_cost_usd").and_then(|v| v.as_f64());
            let context_window = value
                .get("modelUsage")
                .and_then(|m| m.as_object())
                .and_then(|models| models.values().next())
                .and_then(|model| model.get("contextWindow"))
                .and_then(|w| w.as_u64());
            let structured_output = value.get("structured_output").cloned();

            AgentEvent::ResultEvent {
                usage,
                total_cost_usd,
                context_window,
                structured_output,
            }
        }
        _ => AgentEvent::Other,
    };

    Some(event)
}

/// Assembles complete lines from arbitrary byte chunks.
///
/// A read boundary can fall mid-line (or mid-codepoint); the undelimited
/// remainder is buffered and prepended to the next chunk.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buffer: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every complete line it closed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            lines.push(text.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Drain the final unterminated line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let remainder = String::from_utf8_lossy(&self.buffer).to_string();
        self.buffer.clear();
        Some(remainder)
    }
}

/// One pulled item: the raw line and its parsed event, if it was JSON.
#[derive(Debug, Clone)]
pub struct StreamItem {
    pub raw: String,
    pub event: Option<AgentEvent>,
}

/// A finite, non-restartable sequence of agent stream items.
pub trait EventSource {
    /// Pull the next item; `None` at end of stream.
    fn next_item(&mut self) -> Result<Option<StreamItem>>;
}

/// Event source backed by any byte reader (production: process stdout).
pub struct ReadEventSource<R: Read> {
    reader: R,
    assembler: LineAssembler,
    pending: std::collections::VecDeque<String>,
    eof: bool,
}

impl<R: Read> ReadEventSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            assembler: LineAssembler::new(),
            pending: std::collections::VecDeque::new(),
            eof: false,
        }
    }
}

impl<R: Read> EventSource for ReadEventSource<R> {
    fn next_item(&mut self) -> Result<Option<StreamItem>> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                let event = parse_event(&line);
                return Ok(Some(StreamItem { raw: line, event }));
            }
            if self.eof {
                return Ok(None);
            }

            let mut chunk = [0u8; 8192];
            let read = self.reader.read(&mut chunk).map_err(|e| {
                PrdflowError::Transport(format!("failed to read agent output: {}", e))
            })?;

            if read == 0 {
                self.eof = true;
                if let Some(remainder) = self.assembler.finish() {
                    self.pending.push_back(remainder);
                }
            } else {
                for line in self.assembler.push(&chunk[..read]) {
                    self.pending.push_back(line);
                }
            }
        }
    }
}

/// Canned event source for tests.
#[cfg(test)]
pub struct CannedEventSource {
    lines: std::collections::VecDeque<String>,
}

#[cfg(test)]
impl CannedEventSource {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }
}

#[cfg(test)]
impl EventSource for CannedEventSource {
    fn next_item(&mut self) -> Result<Option<StreamItem>> {
        Ok(self.lines.pop_front().map(|raw| {
            let event = parse_event(&raw);
            StreamItem { raw, event }
        }))
    }
}

/// Everything extracted from one full event stream.
#[derive(Debug, Clone, Default)]
pub struct StreamOutcome {
    /// Full raw stdout text, line-joined.
    pub raw_output: String,
    /// Final usage from the `result` event.
    pub usage: Option<AgentUsage>,
    /// Monetary cost from the `result` event.
    pub total_cost_usd: Option<f64>,
    /// Context-window size of the first reported model.
    pub context_window: Option<u64>,
    /// Latest live token estimate from assistant events.
    pub estimate_tokens: Option<u64>,
    /// A context-compaction signal was seen. Always a hard failure for the
    /// phase, even if a later result reports success.
    pub context_overflow: bool,
    /// Directly-provided structured result, if the agent supplied one.
    pub structured_result: Option<Value>,
}

/// Consume a source to exhaustion, folding events into a [`StreamOutcome`].
pub fn consume<S: EventSource>(source: &mut S) -> Result<StreamOutcome> {
    let mut outcome = StreamOutcome::default();

    while let Some(item) = source.next_item()? {
        if !outcome.raw_output.is_empty() {
            outcome.raw_output.push('\n');
        }
        outcome.raw_output.push_str(&item.raw);

        match item.event {
            Some(AgentEvent::Assistant {
                estimate_tokens,
                compaction,
                ..
            }) => {
                if estimate_tokens.is_some() {
                    outcome.estimate_tokens = estimate_tokens;
                }
                if compaction {
                    outcome.context_overflow = true;
                }
            }
            Some(AgentEvent::ResultEvent {
                usage,
                total_cost_usd,
                context_window,
                structured_output,
            }) => {
                outcome.usage = usage;
                outcome.total_cost_usd = total_cost_usd;
                outcome.context_window = context_window;
                outcome.structured_result = structured_output;
            }
            _ => {}
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assembler_buffers_partial_final_line() {
        let mut assembler = LineAssembler::new();

        let lines = assembler.push(b"{\"type\":\"system\"}\n{\"type\":\"assi");
        assert_eq!(lines, vec!["{\"type\":\"system\"}"]);

        let lines = assembler.push(b"stant\"}\n");
        assert_eq!(lines, vec!["{\"type\":\"assistant\"}"]);

        assert!(assembler.finish().is_none());
    }

    #[test]
    fn assembler_yields_unterminated_remainder_on_finish() {
        let mut assembler = LineAssembler::new();
        assert!(assembler.push(b"tail without newline").is_empty());
        assert_eq!(assembler.finish().as_deref(), Some("tail without newline"));
        assert!(assembler.finish().is_none());
    }

    #[test]
    fn assembler_strips_carriage_returns() {
        let mut assembler = LineAssembler::new();
        let lines = assembler.push(b"one\r\ntwo\n");
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn parse_system_and_init_events() {
        assert!(matches!(
            parse_event(r#"{"type":"system","subtype":"init"}"#),
            Some(AgentEvent::System)
        ));
        assert!(matches!(
            parse_event(r#"{"type":"init"}"#),
            Some(AgentEvent::System)
        ));
    }

    #[test]
    fn parse_assistant_event_with_usage_and_text() {
        let line = json!({
            "type": "assistant",
            "message": {
                "usage": {"input_tokens": 100, "cache_creation_input_tokens": 50},
                "content": [
                    {"type": "text", "text": "working on it"},
                    {"type": "tool_use", "name": "Bash"}
                ]
            }
        })
        .to_string();

        match parse_event(&line) {
            Some(AgentEvent::Assistant {
                estimate_tokens,
                texts,
                compaction,
            }) => {
                assert_eq!(estimate_tokens, Some(150));
                assert_eq!(texts, vec!["working on it"]);
                assert!(!compaction);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parse_assistant_compaction_signal() {
        let line = json!({
            "type": "assistant",
            "compaction": {"reason": "context_budget"},
            "message": {"content": []}
        })
        .to_string();

        match parse_event(&line) {
            Some(AgentEvent::Assistant { compaction, .. }) => assert!(compaction),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parse_result_event() {
        let line = json!({
            "type": "result",
            "usage": {
                "input_tokens": 1000,
                "output_tokens": 200,
                "cache_read_input_tokens": 300,
                "cache_creation_input_tokens": 50
            },
            "total_cost_usd": 0.42,
            "modelUsage": {"sonnet": {"contextWindow": 200000}},
            "structured_output": {"status": "completed", "passes": true}
        })
        .to_string();

        match parse_event(&line) {
            Some(AgentEvent::ResultEvent {
                usage,
                total_cost_usd,
                context_window,
                structured_output,
            }) => {
                let usage = usage.unwrap();
                assert_eq!(usage.input_tokens, 1000);
                assert_eq!(usage.output_tokens, 200);
                assert_eq!(total_cost_usd, Some(0.42));
                assert_eq!(context_window, Some(200000));
                assert_eq!(structured_output.unwrap()["status"], "completed");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parse_tolerates_non_json_lines() {
        assert!(parse_event("plain text progress").is_none());
        assert!(matches!(
            parse_event(r#"{"type":"telemetry"}"#),
            Some(AgentEvent::Other)
        ));
    }

    #[test]
    fn consume_collects_raw_and_result_state() {
        let mut source = CannedEventSource::new(&[
            r#"{"type":"system","subtype":"init"}"#,
            r#"{"type":"assistant","message":{"usage":{"input_tokens":10},"content":[{"type":"text","text":"hi"}]}}"#,
            r#"{"type":"result","usage":{"input_tokens":10,"output_tokens":5},"total_cost_usd":0.01,"structured_output":{"a":1}}"#,
        ]);

        let outcome = consume(&mut source).unwrap();
        assert_eq!(outcome.raw_output.lines().count(), 3);
        assert_eq!(outcome.estimate_tokens, Some(10));
        assert_eq!(outcome.usage.unwrap().output_tokens, 5);
        assert_eq!(outcome.structured_result.unwrap()["a"], 1);
        assert!(!outcome.context_overflow);
    }

    #[test]
    fn consume_flags_context_overflow_despite_success_result() {
        let mut source = CannedEventSource::new(&[
            r#"{"type":"assistant","compaction":{},"message":{"content":[]}}"#,
            r#"{"type":"result","structured_output":{"status":"completed"}}"#,
        ]);

        let outcome = consume(&mut source).unwrap();
        assert!(outcome.context_overflow);
        // the structured result is still captured; the engine decides
        assert!(outcome.structured_result.is_some());
    }

    #[test]
    fn read_event_source_handles_split_reads() {
        struct ChunkedReader {
            chunks: std::collections::VecDeque<Vec<u8>>,
        }
        impl Read for ChunkedReader {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                match self.chunks.pop_front() {
                    Some(chunk) => {
                        buf[..chunk.len()].copy_from_slice(&chunk);
                        Ok(chunk.len())
                    }
                    None => Ok(0),
                }
            }
        }

        let full = r#"{"type":"system"}
{"type":"result","usage":{"input_tokens":7}}"#;
        let bytes = full.as_bytes();
        let reader = ChunkedReader {
            chunks: vec![bytes[..10].to_vec(), bytes[10..30].to_vec(), bytes[30..].to_vec()]
                .into(),
        };

        let mut source = ReadEventSource::new(reader);
        let outcome = consume(&mut source).unwrap();
        assert_eq!(outcome.usage.unwrap().input_tokens, 7);
        assert_eq!(outcome.raw_output, full);
    }
}
