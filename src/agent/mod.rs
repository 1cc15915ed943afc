//! Agent invocation: prompt construction, process spawning, event-stream
//! consumption, and structured-result recovery.
//!
//! The [`AgentRunner`] trait is the seam between the execution engine and
//! the outside world. [`ProcessRunner`] is the production implementation;
//! engine tests substitute a scripted runner and never spawn processes.

pub mod args;
pub mod events;
pub mod extract;
pub mod prompt;

use crate::error::{PrdflowError, Result};
use crate::toolset::{Phase, ToolConfig};
use events::{AgentUsage, ReadEventSource, consume};
use regex::Regex;
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// One agent invocation to perform.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub prompt: String,
    pub working_dir: PathBuf,
    pub tool: ToolConfig,
    pub phase: Phase,
    pub system_prompt: Option<String>,
}

/// What came back from one invocation, before interpretation.
///
/// Transport failure and structured result can coexist: some agent
/// versions exit nonzero after emitting a complete result event. The
/// engine decides which wins.
#[derive(Debug, Clone, Default)]
pub struct InvocationOutcome {
    pub raw_output: String,
    pub transport_error: Option<String>,
    pub usage: Option<AgentUsage>,
    pub total_cost_usd: Option<f64>,
    pub context_overflow: bool,
    pub structured_result: Option<Value>,
    pub network_failure: bool,
}

/// The engine's view of an agent: hand over a request, get an outcome.
pub trait AgentRunner {
    fn invoke(&mut self, request: &InvocationRequest) -> Result<InvocationOutcome>;
}

/// Stderr patterns that indicate a network-level failure rather than an
/// agent-level one.
const NETWORK_PATTERN: &str = "(?i)(ECONNREFUSED|ECONNRESET|ETIMEDOUT|ENOTFOUND|getaddrinfo|\
                               fetch failed|network error|connection refused)";

/// Spawns the configured tool as a child process and consumes its
/// stream-json stdout.
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        ProcessRunner
    }

    /// Write the system prompt to a temp file the tool can read. The file
    /// is pid-suffixed so concurrent runs on the same host cannot collide.
    fn write_system_prompt(&self, text: &str) -> Result<PathBuf> {
        let path = std::env::temp_dir().join(format!(
            "prdflow-system-prompt-{}.md",
            std::process::id()
        ));
        std::fs::write(&path, text).map_err(|e| {
            PrdflowError::Transport(format!(
                "failed to write system prompt file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(path)
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRunner for ProcessRunner {
    fn invoke(&mut self, request: &InvocationRequest) -> Result<InvocationOutcome> {
        let system_prompt_file = match &request.system_prompt {
            Some(text) => Some(self.write_system_prompt(text)?),
            None => None,
        };

        let command = args::build_invocation(
            &request.tool,
            &request.prompt,
            system_prompt_file.as_deref(),
        )?;

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                PrdflowError::Transport(format!(
                    "failed to launch '{}' for {} phase: {}\n\
                     Fix: ensure the tool is installed and on PATH, or set \
                     options.command in the template set.",
                    command.program,
                    request.phase.key(),
                    e
                ))
            })?;

        // stdout is owned by the event consumer; stderr drains on its own
        // thread so a chatty tool cannot deadlock the pipe.
        let stdout = child.stdout.take().ok_or_else(|| {
            PrdflowError::Transport("child process stdout was not captured".to_string())
        })?;
        let stderr = child.stderr.take();
        let stderr_handle = std::thread::spawn(move || {
            let mut text = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut text);
            }
            text
        });

        let mut source = ReadEventSource::new(stdout);
        let stream = consume(&mut source)?;

        let status = child.wait().map_err(|e| {
            PrdflowError::Transport(format!("failed to wait for agent process: {}", e))
        })?;
        let stderr_text = stderr_handle.join().unwrap_or_default();

        if let Some(path) = system_prompt_file {
            let _ = std::fs::remove_file(path);
        }

        let transport_error = if status.success() {
            None
        } else {
            let excerpt: String = stderr_text.chars().take(2000).collect();
            Some(format!(
                "agent process exited with {}: {}",
                status,
                excerpt.trim()
            ))
        };

        let network_re = Regex::new(NETWORK_PATTERN).map_err(|e| {
            PrdflowError::Unknown(format!("invalid network pattern: {}", e))
        })?;
        let network_failure =
            transport_error.is_some() && network_re.is_match(&stderr_text);

        Ok(InvocationOutcome {
            raw_output: stream.raw_output,
            transport_error,
            usage: stream.usage,
            total_cost_usd: stream.total_cost_usd,
            context_overflow: stream.context_overflow,
            structured_result: stream.structured_result,
            network_failure,
        })
    }
}
