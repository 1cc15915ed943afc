//! Template-set configuration for agent invocations.
//!
//! A template set is a named, versioned bundle selecting which external
//! tool and options drive each phase of a run. Documents may be YAML or
//! JSON:
//!
//! ```yaml
//! name: default
//! version: "1"
//! systemPrompt: |
//!   You are a careful engineer...
//! conversion:
//!   - tool: claude-code
//!     options:
//!       model: sonnet
//! task:
//!   - tool: claude-code
//!     options:
//!       model: sonnet
//!     skipContext: false
//! ```
//!
//! Loading runs legacy migrations first (`migrations`), then rule-ordered
//! validation (`validation`), then deserializes into typed structs.

use crate::error::{PrdflowError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;

pub mod migrations;
pub mod validation;

/// Name of the built-in template set used when none is specified.
pub const DEFAULT_SET_NAME: &str = "default";

/// Phase of a run an invocation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// PRD-to-work-item conversion.
    Conversion,
    /// Single user story execution.
    Task,
}

impl Phase {
    /// The document key for this phase.
    pub fn key(&self) -> &'static str {
        match self {
            Phase::Conversion => "conversion",
            Phase::Task => "task",
        }
    }
}

/// Configuration for one tool invocation within a phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    /// Tool name, dispatched against the known-tool registry.
    pub tool: String,

    /// Option bag mirrored into command-line flags.
    #[serde(default)]
    pub options: serde_json::Map<String, Value>,

    /// Output schema serialized into the invocation arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,

    /// Skip prior-task context when building the task prompt.
    #[serde(default)]
    pub skip_context: bool,
}

/// A named, versioned template set with one tool list per phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSet {
    /// Set name (pinned into the progress record at creation).
    pub name: String,

    /// Document version string.
    pub version: String,

    /// System prompt passed to the agent via a prompt file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Conversion-phase tool configurations, in order.
    pub conversion: Vec<ToolConfig>,

    /// Task-phase tool configurations, in order.
    pub task: Vec<ToolConfig>,
}

impl TemplateSet {
    /// The first tool configuration for a phase.
    ///
    /// Validation guarantees each phase list is non-empty.
    pub fn tool_for(&self, phase: Phase) -> &ToolConfig {
        match phase {
            Phase::Conversion => &self.conversion[0],
            Phase::Task => &self.task[0],
        }
    }
}

/// A template set loaded from disk, with any migration advisories.
#[derive(Debug, Clone)]
pub struct LoadedTemplateSet {
    /// The validated set.
    pub set: TemplateSet,
    /// Non-fatal advisories raised by legacy migrations.
    pub advisories: Vec<String>,
}

/// Load, migrate, validate, and deserialize a template-set document.
pub fn load_template_set<P: AsRef<Path>>(path: P) -> Result<LoadedTemplateSet> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        PrdflowError::FileNotFound(format!(
            "failed to read template set '{}': {}",
            path.display(),
            e
        ))
    })?;

    let mut value = parse_document(path, &content)?;
    let advisories = migrations::apply(&mut value);
    validation::validate(&value)?;

    let set: TemplateSet = serde_json::from_value(value).map_err(|e| {
        PrdflowError::Configuration(format!(
            "template set '{}' failed to deserialize: {}",
            path.display(),
            e
        ))
    })?;

    Ok(LoadedTemplateSet { set, advisories })
}

/// Parse a document as JSON or YAML based on extension.
fn parse_document(path: &Path, content: &str) -> Result<Value> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(content).map_err(|e| {
            PrdflowError::Configuration(format!(
                "template set '{}' is not valid JSON: {}",
                path.display(),
                e
            ))
        })
    } else {
        serde_yaml::from_str(content).map_err(|e| {
            PrdflowError::Configuration(format!(
                "template set '{}' is not valid YAML: {}",
                path.display(),
                e
            ))
        })
    }
}

/// The built-in default template set.
///
/// Used when no configuration path is supplied; both phases run
/// `claude-code` with the built-in output schemas.
pub fn builtin_default() -> TemplateSet {
    TemplateSet {
        name: DEFAULT_SET_NAME.to_string(),
        version: "1".to_string(),
        system_prompt: None,
        conversion: vec![ToolConfig {
            tool: "claude-code".to_string(),
            options: serde_json::Map::new(),
            output_schema: Some(conversion_output_schema()),
            skip_context: false,
        }],
        task: vec![ToolConfig {
            tool: "claude-code".to_string(),
            options: serde_json::Map::new(),
            output_schema: Some(task_output_schema()),
            skip_context: false,
        }],
    }
}

/// Output schema for the conversion phase (work-item document).
pub fn conversion_output_schema() -> Value {
    json!({
        "type": "object",
        "required": ["id", "title", "branchName", "workingDir", "userStories"],
        "properties": {
            "id": {"type": "string"},
            "prdId": {"type": "string"},
            "title": {"type": "string"},
            "branchName": {"type": "string"},
            "workingDir": {"type": "string"},
            "targetDirs": {"type": "array"},
            "userStories": {"type": "array"}
        }
    })
}

/// Output schema for the task phase (story outcome object).
pub fn task_output_schema() -> Value {
    json!({
        "type": "object",
        "required": ["status", "passes"],
        "properties": {
            "status": {"enum": ["completed", "failed", "blocked"]},
            "passes": {"type": "boolean"},
            "securityCheck": {"enum": ["passed", "failed"]},
            "commits": {"type": "array"},
            "notes": {"type": "string"}
        }
    })
}
