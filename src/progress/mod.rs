//! Progress record model and run-status state machine.
//!
//! The progress record is the durable heartbeat of a run: it is rewritten
//! after every mutation (story start, story completion, terminal
//! transition) and is the sole resumability mechanism. There is no separate
//! write-ahead log.
//!
//! # Document Format
//!
//! ```json
//! {
//!   "prdId": "auth-feature",
//!   "status": "running",
//!   "startedAt": "2026-08-28T10:00:00Z",
//!   "completedAt": null,
//!   "completedTasks": ["US-1"],
//!   "currentTask": "US-2",
//!   "totalTasks": 3,
//!   "lastError": null,
//!   "templateSet": "default",
//!   "configPath": null
//! }
//! ```

use crate::error::{PrdflowError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall status of a work-item run.
///
/// This is a closed set with an explicit transition table; any transition
/// outside the table is rejected so state-machine corruption cannot be
/// persisted silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Work item created, no story executed yet.
    Initialized,
    /// Engine is actively executing stories.
    Running,
    /// A story failed without an explicit block; resumable.
    Paused,
    /// A story reported blocked, or dependencies are unsatisfiable; resumable.
    Blocked,
    /// Every story reached a terminal state. Final.
    Completed,
}

impl RunStatus {
    /// Allowed transitions. Self-transitions are no-ops and always allowed.
    pub fn can_transition(self, to: RunStatus) -> bool {
        use RunStatus::*;
        if self == to {
            return true;
        }
        matches!(
            (self, to),
            (Initialized, Running)
                | (Running, Completed)
                | (Running, Paused)
                | (Running, Blocked)
                | (Paused, Running)
                | (Blocked, Running)
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Initialized => "initialized",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Blocked => "blocked",
            RunStatus::Completed => "completed",
        };
        write!(f, "{}", s)
    }
}

/// Descriptor of the most recent error in a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastError {
    /// Story id the error occurred on, if any.
    pub task_id: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// When the error was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Durable progress document for one work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    /// Owning work-item id.
    pub prd_id: String,

    /// Overall run status.
    pub status: RunStatus,

    /// When the run was first created.
    pub started_at: DateTime<Utc>,

    /// When the run reached `completed`, if it has.
    pub completed_at: Option<DateTime<Utc>>,

    /// Ids of completed stories, in completion order. Invariant: a subset
    /// of the work item's story ids, without duplicates.
    pub completed_tasks: Vec<String>,

    /// Story currently in flight, if any.
    pub current_task: Option<String>,

    /// Total number of stories in the work item.
    pub total_tasks: usize,

    /// Most recent error, if any.
    pub last_error: Option<LastError>,

    /// Template set pinned at creation time.
    pub template_set: String,

    /// Configuration path pinned at creation time, if one was supplied.
    pub config_path: Option<String>,
}

impl ProgressRecord {
    /// Create a fresh record at `initialized`.
    pub fn new(
        prd_id: impl Into<String>,
        total_tasks: usize,
        template_set: impl Into<String>,
        config_path: Option<String>,
    ) -> Self {
        Self {
            prd_id: prd_id.into(),
            status: RunStatus::Initialized,
            started_at: Utc::now(),
            completed_at: None,
            completed_tasks: Vec::new(),
            current_task: None,
            total_tasks,
            last_error: None,
            template_set: template_set.into(),
            config_path,
        }
    }

    /// Transition to a new status, rejecting anything outside the table.
    pub fn transition(&mut self, to: RunStatus) -> Result<()> {
        if !self.status.can_transition(to) {
            return Err(PrdflowError::Consistency(format!(
                "illegal status transition {} -> {} for work item '{}'",
                self.status, to, self.prd_id
            )));
        }
        self.status = to;
        if to == RunStatus::Completed {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Record a story as completed and clear the in-flight marker.
    ///
    /// A duplicate completion indicates an engine bug and is rejected
    /// rather than corrupting the completed-tasks invariant.
    pub fn record_completed(&mut self, story_id: &str) -> Result<()> {
        if self.completed_tasks.iter().any(|id| id == story_id) {
            return Err(PrdflowError::Consistency(format!(
                "story '{}' recorded as completed twice",
                story_id
            )));
        }
        self.completed_tasks.push(story_id.to_string());
        self.current_task = None;
        Ok(())
    }

    /// Record an error descriptor.
    pub fn record_error(&mut self, task_id: Option<&str>, message: &str) {
        self.last_error = Some(LastError {
            task_id: task_id.map(|s| s.to_string()),
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }
}
