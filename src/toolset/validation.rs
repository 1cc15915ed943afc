//! Template-set document validation.
//!
//! Rules are applied in a fixed order, short-circuiting on structural
//! failure so the first error a user sees is the most fundamental one:
//!
//! 1. required top-level keys (`name`, `version`, `conversion`, `task`)
//! 2. each phase is a non-empty list of objects carrying `tool`
//! 3. each element dispatches to a tool-specific validator by `tool` name
//! 4. an `outputSchema`, if present, is a well-formed schema object
//!
//! Errors always carry the concrete violation plus the expected document
//! structure so a user can fix the file without reading source code.

use crate::error::{PrdflowError, Result};
use serde_json::{Map, Value};

/// The expected document structure, included verbatim in structural errors.
pub const EXPECTED_STRUCTURE: &str = r#"expected template set structure:
{
  "name": "<set name>",
  "version": "<version>",
  "systemPrompt": "<optional system prompt>",
  "conversion": [{ "tool": "<tool name>", "options": {}, "outputSchema": {} }],
  "task": [{ "tool": "<tool name>", "options": {}, "skipContext": false }]
}"#;

/// Validator for one tool's configuration element.
type ToolValidator = fn(location: &str, element: &Map<String, Value>) -> Result<()>;

/// Registry of known tools. Unknown names are reported with this list.
fn known_tools() -> Vec<(&'static str, ToolValidator)> {
    vec![("claude-code", validate_claude_code)]
}

/// Names of all known tools, for error messages.
pub fn known_tool_names() -> Vec<&'static str> {
    known_tools().iter().map(|(name, _)| *name).collect()
}

/// Validate a migrated template-set document.
pub fn validate(value: &Value) -> Result<()> {
    let doc = value.as_object().ok_or_else(|| {
        PrdflowError::Configuration(format!(
            "template set must be an object\n{}",
            EXPECTED_STRUCTURE
        ))
    })?;

    let missing: Vec<&str> = ["name", "version", "conversion", "task"]
        .into_iter()
        .filter(|key| !doc.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(PrdflowError::Configuration(format!(
            "template set is missing required keys: {}\n{}",
            missing.join(", "),
            EXPECTED_STRUCTURE
        )));
    }

    for phase in ["conversion", "task"] {
        validate_phase(phase, &doc[phase])?;
    }

    Ok(())
}

/// Validate one phase list: non-empty, objects with `tool`, dispatched to
/// tool validators, schema shape checked.
fn validate_phase(phase: &str, value: &Value) -> Result<()> {
    let list = value.as_array().ok_or_else(|| {
        PrdflowError::Configuration(format!(
            "'{}' must be a list of tool configurations\n{}",
            phase, EXPECTED_STRUCTURE
        ))
    })?;

    if list.is_empty() {
        return Err(PrdflowError::Configuration(format!(
            "'{}' must contain at least one tool configuration\n{}",
            phase, EXPECTED_STRUCTURE
        )));
    }

    for (index, element) in list.iter().enumerate() {
        let location = format!("{}[{}]", phase, index);

        let element = element.as_object().ok_or_else(|| {
            PrdflowError::Configuration(format!(
                "{} must be an object carrying a 'tool' key\n{}",
                location, EXPECTED_STRUCTURE
            ))
        })?;

        let tool = element
            .get("tool")
            .and_then(|t| t.as_str())
            .ok_or_else(|| {
                PrdflowError::Configuration(format!(
                    "{} must carry a string 'tool' key\n{}",
                    location, EXPECTED_STRUCTURE
                ))
            })?;

        if let Some(skip) = element.get("skipContext")
            && !skip.is_boolean()
        {
            return Err(PrdflowError::Configuration(format!(
                "{}.skipContext must be a boolean",
                location
            )));
        }

        let validator = known_tools()
            .into_iter()
            .find(|(name, _)| *name == tool)
            .map(|(_, validator)| validator)
            .ok_or_else(|| {
                PrdflowError::Configuration(format!(
                    "unknown tool '{}' at {}; known tools: {}",
                    tool,
                    location,
                    known_tool_names().join(", ")
                ))
            })?;
        validator(&location, element)?;

        if let Some(schema) = element.get("outputSchema") {
            validate_output_schema(&location, schema)?;
        }
    }

    Ok(())
}

/// Tool-specific validation for `claude-code`.
fn validate_claude_code(location: &str, element: &Map<String, Value>) -> Result<()> {
    let Some(options) = element.get("options") else {
        return Ok(());
    };

    let options = options.as_object().ok_or_else(|| {
        PrdflowError::Configuration(format!("{}.options must be an object", location))
    })?;

    for (key, value) in options {
        let scalar_or_string_list = value.is_string()
            || value.is_boolean()
            || value.is_number()
            || value
                .as_array()
                .is_some_and(|items| items.iter().all(|item| item.is_string()));
        if !scalar_or_string_list {
            return Err(PrdflowError::Configuration(format!(
                "{}.options.{} must be a string, boolean, number, or list of strings",
                location, key
            )));
        }
    }

    if let Some(command) = options.get("command")
        && !command.is_string()
    {
        return Err(PrdflowError::Configuration(format!(
            "{}.options.command must be a command string",
            location
        )));
    }

    Ok(())
}

/// An output schema must be an object; `required` (if present) must be a
/// list and `properties` (if present) an object.
fn validate_output_schema(location: &str, schema: &Value) -> Result<()> {
    let schema = schema.as_object().ok_or_else(|| {
        PrdflowError::Configuration(format!("{}.outputSchema must be an object", location))
    })?;

    if let Some(required) = schema.get("required")
        && !required.is_array()
    {
        return Err(PrdflowError::Configuration(format!(
            "{}.outputSchema.required must be a list",
            location
        )));
    }

    if let Some(properties) = schema.get("properties")
        && !properties.is_object()
    {
        return Err(PrdflowError::Configuration(format!(
            "{}.outputSchema.properties must be an object",
            location
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_doc() -> Value {
        json!({
            "name": "default",
            "version": "1",
            "conversion": [{"tool": "claude-code"}],
            "task": [{"tool": "claude-code"}]
        })
    }

    #[test]
    fn accepts_valid_document() {
        validate(&valid_doc()).unwrap();
    }

    #[test]
    fn missing_keys_are_reported_together_with_expected_structure() {
        let doc = json!({"name": "x", "conversion": [{"tool": "claude-code"}]});
        let err = validate(&doc).unwrap_err().to_string();

        assert!(err.contains("missing required keys"));
        assert!(err.contains("version"));
        assert!(err.contains("task"));
        assert!(err.contains(EXPECTED_STRUCTURE));
    }

    #[test]
    fn missing_task_key_reports_task() {
        let doc = json!({
            "name": "x", "version": "1",
            "conversion": [{"tool": "claude-code"}]
        });
        let err = validate(&doc).unwrap_err().to_string();
        assert!(err.contains("task"));
        assert!(err.contains(EXPECTED_STRUCTURE));
    }

    #[test]
    fn non_list_phase_is_structural_error() {
        let mut doc = valid_doc();
        doc["task"] = json!("claude-code");
        let err = validate(&doc).unwrap_err().to_string();
        assert!(err.contains("'task' must be a list"));
    }

    #[test]
    fn empty_phase_list_is_rejected() {
        let mut doc = valid_doc();
        doc["conversion"] = json!([]);
        let err = validate(&doc).unwrap_err().to_string();
        assert!(err.contains("'conversion' must contain at least one"));
    }

    #[test]
    fn element_without_tool_key_is_rejected() {
        let mut doc = valid_doc();
        doc["task"] = json!([{"options": {}}]);
        let err = validate(&doc).unwrap_err().to_string();
        assert!(err.contains("task[0] must carry a string 'tool' key"));
    }

    #[test]
    fn unknown_tool_lists_known_names() {
        let mut doc = valid_doc();
        doc["task"] = json!([{"tool": "codegen-9000"}]);
        let err = validate(&doc).unwrap_err().to_string();
        assert!(err.contains("unknown tool 'codegen-9000' at task[0]"));
        assert!(err.contains("known tools: claude-code"));
    }

    #[test]
    fn options_must_be_object_of_flag_values() {
        let mut doc = valid_doc();
        doc["task"] = json!([{"tool": "claude-code", "options": "fast"}]);
        let err = validate(&doc).unwrap_err().to_string();
        assert!(err.contains("task[0].options must be an object"));

        let mut doc = valid_doc();
        doc["task"] = json!([{
            "tool": "claude-code",
            "options": {"model": {"nested": true}}
        }]);
        let err = validate(&doc).unwrap_err().to_string();
        assert!(err.contains("task[0].options.model"));
    }

    #[test]
    fn output_schema_shape_is_checked() {
        let mut doc = valid_doc();
        doc["task"] = json!([{
            "tool": "claude-code",
            "outputSchema": {"required": "status"}
        }]);
        let err = validate(&doc).unwrap_err().to_string();
        assert!(err.contains("outputSchema.required must be a list"));

        let mut doc = valid_doc();
        doc["task"] = json!([{
            "tool": "claude-code",
            "outputSchema": {"properties": ["status"]}
        }]);
        let err = validate(&doc).unwrap_err().to_string();
        assert!(err.contains("outputSchema.properties must be an object"));
    }

    #[test]
    fn skip_context_must_be_boolean() {
        let mut doc = valid_doc();
        doc["task"] = json!([{"tool": "claude-code", "skipContext": "yes"}]);
        let err = validate(&doc).unwrap_err().to_string();
        assert!(err.contains("task[0].skipContext must be a boolean"));
    }

    #[test]
    fn string_list_options_are_allowed() {
        let mut doc = valid_doc();
        doc["task"] = json!([{
            "tool": "claude-code",
            "options": {"allowedTools": ["Read", "Write"]}
        }]);
        validate(&doc).unwrap();
    }
}
