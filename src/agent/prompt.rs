//! Prompt construction for agent invocations.
//!
//! Prompts are built from `{variable}` templates. The engine is fail-safe:
//! an undefined variable is an error, never a silent empty substitution,
//! so a typo in a template cannot ship a truncated prompt to the agent.
//!
//! Syntax: `{name}` substitutes, `{{` and `}}` render literal braces.

use crate::error::{PrdflowError, Result};
use crate::prd::{Subtask, WorkItem};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Template for the PRD-to-work-item conversion prompt.
const CONVERSION_TEMPLATE: &str = "\
You are converting a product requirements document into an executable work item.

Produce a single JSON object matching the provided output schema: a work item \
with id \"{work_item_id}\", a branch name, working directory \"{working_dir}\", \
target directories, and an ordered list of user stories. Every story needs a \
unique id, a title, dependency ids that reference only stories in this work \
item, affected repo names, and concrete acceptance criteria.

PRD source: {prd_path}

--- PRD ---
{prd_text}
";

/// Template for a single user-story execution prompt.
const TASK_TEMPLATE: &str = "\
You are executing one user story of work item \"{work_item_id}\" on branch \
\"{branch_name}\".

Story {story_id}: {story_title}
Affected repos: {repos}
Acceptance criteria:
{acceptance_criteria}
{context_section}
When finished, report a single JSON object matching the provided output \
schema: status (completed|failed|blocked), passes, securityCheck, commits, \
and notes. Use idempotent commit messages and check for existing files \
before creating them; this story may be re-executed after an interruption.
";

/// Error type for template rendering failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A variable was referenced but not provided.
    UndefinedVariable { name: String, position: usize },
    /// A `{` was found without a matching `}`.
    UnmatchedBrace { position: usize },
    /// An empty variable name was found (`{}`).
    EmptyVariableName { position: usize },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::UndefinedVariable { name, position } => {
                write!(f, "undefined variable '{}' at position {}", name, position)
            }
            TemplateError::UnmatchedBrace { position } => {
                write!(f, "unmatched '{{' at position {}", position)
            }
            TemplateError::EmptyVariableName { position } => {
                write!(f, "empty variable name at position {}", position)
            }
        }
    }
}

impl std::error::Error for TemplateError {}

impl From<TemplateError> for PrdflowError {
    fn from(e: TemplateError) -> Self {
        PrdflowError::Unknown(format!("prompt template error: {}", e))
    }
}

/// Render a template string by substituting `{variable}` placeholders.
pub fn render_template(
    template: &str,
    variables: &HashMap<String, String>,
) -> std::result::Result<String, TemplateError> {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            '{' => {
                if let Some((_, '{')) = chars.peek() {
                    chars.next();
                    result.push('{');
                    continue;
                }

                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, c)) => name.push(c),
                        None => return Err(TemplateError::UnmatchedBrace { position: pos }),
                    }
                }

                if name.is_empty() {
                    return Err(TemplateError::EmptyVariableName { position: pos });
                }

                match variables.get(&name) {
                    Some(value) => result.push_str(value),
                    None => {
                        return Err(TemplateError::UndefinedVariable {
                            name,
                            position: pos,
                        });
                    }
                }
            }
            '}' => {
                if let Some((_, '}')) = chars.peek() {
                    chars.next();
                }
                result.push('}');
            }
            c => result.push(c),
        }
    }

    Ok(result)
}

/// Build the conversion-phase prompt for a PRD.
pub fn conversion_prompt(
    prd_path: &Path,
    prd_text: &str,
    work_item_id: &str,
    working_dir: &str,
) -> Result<String> {
    let mut vars = HashMap::new();
    vars.insert("work_item_id".to_string(), work_item_id.to_string());
    vars.insert("working_dir".to_string(), working_dir.to_string());
    vars.insert("prd_path".to_string(), prd_path.display().to_string());
    vars.insert("prd_text".to_string(), prd_text.to_string());

    Ok(render_template(CONVERSION_TEMPLATE, &vars)?)
}

/// Build the task-phase prompt for one story.
///
/// `completed` holds the stories already finished, in completion order;
/// their titles and notes are included as context unless the tool
/// configuration sets `skipContext`.
pub fn task_prompt(
    work_item: &WorkItem,
    story: &Subtask,
    completed: &[&Subtask],
    include_context: bool,
) -> Result<String> {
    let repos = if story.repos.is_empty() {
        "(unspecified)".to_string()
    } else {
        story.repos.join(", ")
    };

    let criteria = if story.acceptance_criteria.is_empty() {
        "- (none declared)".to_string()
    } else {
        story
            .acceptance_criteria
            .iter()
            .map(|c| format!("- {}", c))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let context_section = if include_context && !completed.is_empty() {
        let mut section = String::from("\nPreviously completed stories:\n");
        for done in completed {
            section.push_str(&format!("- {} ({})", done.id, done.title));
            if !done.notes.is_empty() {
                section.push_str(&format!(": {}", done.notes));
            }
            section.push('\n');
        }
        section
    } else {
        String::new()
    };

    let mut vars = HashMap::new();
    vars.insert("work_item_id".to_string(), work_item.id.clone());
    vars.insert("branch_name".to_string(), work_item.branch_name.clone());
    vars.insert("story_id".to_string(), story.id.clone());
    vars.insert("story_title".to_string(), story.title.clone());
    vars.insert("repos".to_string(), repos);
    vars.insert("acceptance_criteria".to_string(), criteria);
    vars.insert("context_section".to_string(), context_section);

    Ok(render_template(TASK_TEMPLATE, &vars)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prd::SubtaskStatus;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn story(id: &str) -> Subtask {
        Subtask {
            id: id.to_string(),
            title: format!("Story {}", id),
            status: SubtaskStatus::Pending,
            dependencies: Vec::new(),
            repos: Vec::new(),
            acceptance_criteria: Vec::new(),
            commits: Vec::new(),
            passes: false,
            notes: String::new(),
        }
    }

    fn work_item() -> WorkItem {
        WorkItem {
            id: "auth".to_string(),
            prd_id: None,
            title: "Auth".to_string(),
            branch_name: "feature/auth".to_string(),
            working_dir: "/repos/app".to_string(),
            target_dirs: Vec::new(),
            user_stories: vec![story("US-1"), story("US-2")],
        }
    }

    #[test]
    fn render_substitutes_variables() {
        let result =
            render_template("Hello {name}, run {task}.", &vars(&[("name", "A"), ("task", "B")]))
                .unwrap();
        assert_eq!(result, "Hello A, run B.");
    }

    #[test]
    fn render_escapes_double_braces() {
        let result = render_template("JSON uses {{...}}", &vars(&[])).unwrap();
        assert_eq!(result, "JSON uses {...}");
    }

    #[test]
    fn render_rejects_undefined_variable() {
        let err = render_template("{missing}", &vars(&[])).unwrap_err();
        assert!(matches!(err, TemplateError::UndefinedVariable { .. }));
    }

    #[test]
    fn render_rejects_unmatched_brace() {
        let err = render_template("start {oops", &vars(&[])).unwrap_err();
        assert!(matches!(err, TemplateError::UnmatchedBrace { .. }));
    }

    #[test]
    fn render_rejects_empty_name() {
        let err = render_template("{}", &vars(&[])).unwrap_err();
        assert!(matches!(err, TemplateError::EmptyVariableName { .. }));
    }

    #[test]
    fn conversion_prompt_embeds_prd_text() {
        let prompt = conversion_prompt(
            Path::new("/work/auth.prd.md"),
            "# Auth\nUsers can log in.",
            "auth",
            "/repos/app",
        )
        .unwrap();

        assert!(prompt.contains("id \"auth\""));
        assert!(prompt.contains("/work/auth.prd.md"));
        assert!(prompt.contains("Users can log in."));
    }

    #[test]
    fn task_prompt_includes_criteria_and_context() {
        let item = work_item();
        let mut target = story("US-2");
        target.acceptance_criteria = vec!["Sessions persist".to_string()];

        let mut done = story("US-1");
        done.notes = "login form lives in src/auth".to_string();

        let prompt = task_prompt(&item, &target, &[&done], true).unwrap();
        assert!(prompt.contains("Story US-2"));
        assert!(prompt.contains("- Sessions persist"));
        assert!(prompt.contains("Previously completed stories:"));
        assert!(prompt.contains("login form lives in src/auth"));
    }

    #[test]
    fn task_prompt_omits_context_when_skipped() {
        let item = work_item();
        let target = story("US-2");
        let done = story("US-1");

        let prompt = task_prompt(&item, &target, &[&done], false).unwrap();
        assert!(!prompt.contains("Previously completed stories:"));
    }
}
