//! Invocation argument construction.
//!
//! Arguments are built from a [`ToolConfig`]: a registry maps the tool name
//! to its base argv, the option bag is mirrored into `--kebab-case` flags,
//! a serialized output schema and an optional system-prompt file path are
//! appended. An `options.command` string (parsed with shell-words)
//! overrides the base argv so wrappers and test doubles can stand in for
//! the real binary.

use crate::error::{PrdflowError, Result};
use crate::toolset::ToolConfig;
use serde_json::Value;
use std::path::Path;

/// A fully constructed invocation: program plus arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    /// Render for logging.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Build the argv for one agent invocation.
pub fn build_invocation(
    tool: &ToolConfig,
    prompt: &str,
    system_prompt_file: Option<&Path>,
) -> Result<ToolCommand> {
    let mut argv = base_argv(tool)?;
    argv.push("-p".to_string());
    argv.push(prompt.to_string());
    argv.push("--output-format".to_string());
    argv.push("stream-json".to_string());
    argv.push("--verbose".to_string());

    // Options become flags in sorted key order so invocations are
    // reproducible for a given configuration.
    let mut keys: Vec<&String> = tool.options.keys().collect();
    keys.sort();
    for key in keys {
        if key == "command" {
            continue;
        }
        push_option_flag(&mut argv, key, &tool.options[key])?;
    }

    if let Some(schema) = &tool.output_schema {
        argv.push("--output-schema".to_string());
        argv.push(serde_json::to_string(schema).map_err(|e| {
            PrdflowError::Configuration(format!("failed to serialize output schema: {}", e))
        })?);
    }

    if let Some(path) = system_prompt_file {
        argv.push("--system-prompt-file".to_string());
        argv.push(path.display().to_string());
    }

    let program = argv.remove(0);
    Ok(ToolCommand {
        program,
        args: argv,
    })
}

/// Base argv for a tool: the `command` override when present, otherwise
/// the registry entry for the tool name.
fn base_argv(tool: &ToolConfig) -> Result<Vec<String>> {
    if let Some(command) = tool.options.get("command") {
        let command = command.as_str().ok_or_else(|| {
            PrdflowError::Configuration("options.command must be a command string".to_string())
        })?;
        let parts = shell_words::split(command).map_err(|e| {
            PrdflowError::Configuration(format!(
                "failed to parse command override '{}': {}\n\
                 Fix: check for unmatched quotes or invalid escape sequences.",
                command, e
            ))
        })?;
        if parts.is_empty() {
            return Err(PrdflowError::Configuration(format!(
                "command override is empty after parsing: '{}'",
                command
            )));
        }
        return Ok(parts);
    }

    match tool.tool.as_str() {
        "claude-code" => Ok(vec!["claude".to_string()]),
        other => Err(PrdflowError::Configuration(format!(
            "no base command registered for tool '{}'",
            other
        ))),
    }
}

/// Mirror one option-bag entry into flag arguments.
fn push_option_flag(argv: &mut Vec<String>, key: &str, value: &Value) -> Result<()> {
    let flag = format!("--{}", kebab_case(key));
    match value {
        Value::Bool(true) => argv.push(flag),
        Value::Bool(false) => {}
        Value::String(s) => {
            argv.push(flag);
            argv.push(s.clone());
        }
        Value::Number(n) => {
            argv.push(flag);
            argv.push(n.to_string());
        }
        Value::Array(items) => {
            let strings: Option<Vec<&str>> = items.iter().map(|i| i.as_str()).collect();
            let strings = strings.ok_or_else(|| {
                PrdflowError::Configuration(format!(
                    "option '{}' must be a list of strings",
                    key
                ))
            })?;
            argv.push(flag);
            argv.push(strings.join(","));
        }
        other => {
            return Err(PrdflowError::Configuration(format!(
                "option '{}' has unsupported value {}",
                key, other
            )));
        }
    }
    Ok(())
}

/// Convert a camelCase option key to a kebab-case flag name.
fn kebab_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
