//! Work-item document model for prdflow.
//!
//! A work item is the structured form of a PRD: identity and branch
//! metadata plus an ordered list of user stories (subtasks). It is produced
//! once by the conversion phase and then mutated only by the execution
//! engine as stories complete.
//!
//! # Document Format
//!
//! Work items are stored as JSON with camelCase keys:
//!
//! ```json
//! {
//!   "id": "auth-feature",
//!   "title": "Add authentication",
//!   "branchName": "feature/auth",
//!   "workingDir": "/repos/app",
//!   "targetDirs": [{"path": "src/auth", "name": "auth", "description": "..."}],
//!   "userStories": [{"id": "US-1", "title": "...", "dependencies": []}]
//! }
//! ```

use crate::error::{PrdflowError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Status of a single user story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    /// Not yet executed.
    #[default]
    Pending,
    /// Executed successfully.
    Completed,
    /// Executed and failed.
    Failed,
    /// Reported blocked by the agent.
    Blocked,
}

impl SubtaskStatus {
    /// Whether this status is terminal for selection purposes.
    ///
    /// Terminal stories are never selected again; a `blocked` story is
    /// deliberately non-terminal so a later resume can retry it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubtaskStatus::Completed | SubtaskStatus::Failed)
    }
}

/// A directory a work item targets within the working tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetDir {
    /// Path relative to the working directory.
    pub path: String,
    /// Short name used in prompts.
    pub name: String,
    /// What lives there, for agent context.
    #[serde(default)]
    pub description: String,
}

/// One atomic, dependency-gated step within a work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    /// Story identifier, unique within the work item (e.g., "US-1").
    pub id: String,

    /// Story title.
    pub title: String,

    /// Execution status.
    #[serde(default)]
    pub status: SubtaskStatus,

    /// Ids of stories that must complete before this one is eligible.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Names of repositories/target dirs this story touches.
    #[serde(default)]
    pub repos: Vec<String>,

    /// Acceptance criteria the agent must satisfy.
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,

    /// Commit messages recorded by completed executions.
    #[serde(default)]
    pub commits: Vec<String>,

    /// Whether the story's own checks passed.
    #[serde(default)]
    pub passes: bool,

    /// Free-form notes from the agent (carried into later prompts).
    #[serde(default)]
    pub notes: String,
}

/// A structured work item decomposed into dependent user stories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    /// Work-item identifier (derived from the PRD file stem).
    pub id: String,

    /// Optional explicit PRD identifier from the source document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prd_id: Option<String>,

    /// Human-readable title.
    pub title: String,

    /// Git branch name the work happens on.
    pub branch_name: String,

    /// Working directory agent invocations run in.
    pub working_dir: String,

    /// Ordered target-directory descriptors.
    #[serde(default)]
    pub target_dirs: Vec<TargetDir>,

    /// Ordered user stories.
    pub user_stories: Vec<Subtask>,
}

impl WorkItem {
    /// Build a work item from a JSON value produced by the conversion phase.
    ///
    /// Shape violations (missing required fields, wrong types) are reported
    /// as schema errors, distinct from transport/parse failures.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let item: WorkItem = serde_json::from_value(value)
            .map_err(|e| PrdflowError::Schema(format!("work item document invalid: {}", e)))?;
        item.validate()?;
        Ok(item)
    }

    /// Validate structural invariants of the work item.
    ///
    /// Rules:
    /// - at least one user story
    /// - story ids unique within the work item
    /// - every dependency references a story id declared in this work item
    pub fn validate(&self) -> Result<()> {
        if self.user_stories.is_empty() {
            return Err(PrdflowError::Schema(format!(
                "work item '{}' has no user stories",
                self.id
            )));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for story in &self.user_stories {
            if !seen.insert(story.id.as_str()) {
                return Err(PrdflowError::Schema(format!(
                    "duplicate user story id '{}' in work item '{}'",
                    story.id, self.id
                )));
            }
        }

        for story in &self.user_stories {
            for dep in &story.dependencies {
                if !seen.contains(dep.as_str()) {
                    return Err(PrdflowError::Schema(format!(
                        "user story '{}' depends on '{}', which is not declared in work item '{}'",
                        story.id, dep, self.id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Look up a user story by id.
    pub fn story(&self, id: &str) -> Option<&Subtask> {
        self.user_stories.iter().find(|s| s.id == id)
    }

    /// Look up a user story mutably by id.
    pub fn story_mut(&mut self, id: &str) -> Option<&mut Subtask> {
        self.user_stories.iter_mut().find(|s| s.id == id)
    }
}
