//! Durable state store for work items.
//!
//! State for a PRD at path `P` lives in a sibling directory named after
//! `P`'s filename stem (the text before the first `.`). For
//! `features/auth.prd.md` that is `features/auth/`, containing:
//!
//! - `prd.json` — the work-item document
//! - `progress.json` — the progress record
//! - `task-log.json` — story execution log
//! - `error-log.json` — error log
//!
//! The work item and progress record are always written together in one
//! logical save; a work item without its matching progress record cannot be
//! trusted, so a half-present or unparseable pair loads as `Invalid` and is
//! treated like a cold start by callers.
//!
//! The log files are not true append logs: each write reads the existing
//! list, appends one record, and rewrites the whole list. This is only safe
//! under the engine's single-writer model; concurrent writers would race
//! and could lose entries.

use crate::error::{PrdflowError, Result};
use crate::fs::atomic_write_file;
use crate::prd::WorkItem;
use crate::progress::ProgressRecord;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Work-item document filename.
const PRD_FILE: &str = "prd.json";
/// Progress record filename.
const PROGRESS_FILE: &str = "progress.json";
/// Story execution log filename.
const TASK_LOG_FILE: &str = "task-log.json";
/// Error log filename.
const ERROR_LOG_FILE: &str = "error-log.json";

/// Derive the state directory for a PRD path.
///
/// The directory is a sibling of the PRD named after the stem before the
/// first `.` — `auth.prd.md` maps to `auth/`.
pub fn state_dir_for<P: AsRef<Path>>(prd_path: P) -> Result<PathBuf> {
    let prd_path = prd_path.as_ref();
    let file_name = prd_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            PrdflowError::InvalidArgs(format!("invalid PRD path '{}'", prd_path.display()))
        })?;

    let stem = file_name.split('.').next().unwrap_or(file_name);
    if stem.is_empty() {
        return Err(PrdflowError::InvalidArgs(format!(
            "PRD filename '{}' has no usable stem",
            file_name
        )));
    }

    let parent = prd_path.parent().unwrap_or(Path::new("."));
    Ok(parent.join(stem))
}

/// Outcome of loading persisted state.
#[derive(Debug)]
pub enum LoadOutcome {
    /// No state directory or no documents.
    Absent,
    /// Both documents present and parseable.
    Valid {
        work_item: WorkItem,
        progress: ProgressRecord,
    },
    /// Documents present but unusable (parse failure or half a pair).
    /// Callers treat this like `Absent`.
    Invalid(String),
}

/// One entry in the story execution log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLogEntry {
    /// RFC3339 timestamp.
    pub ts: DateTime<Utc>,
    /// What happened: started, completed, failed, blocked.
    pub event: String,
    /// Who ran the engine (`user@host`).
    pub actor: String,
    /// Story id.
    pub task: String,
    /// Freeform event details.
    pub details: Value,
}

/// One entry in the error log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    /// RFC3339 timestamp.
    pub ts: DateTime<Utc>,
    /// Who ran the engine (`user@host`).
    pub actor: String,
    /// Story id the error occurred on, if any.
    pub task: Option<String>,
    /// Error message.
    pub message: String,
}

/// Handle to one work item's durable state directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Create a store handle for the given PRD path.
    ///
    /// Does not touch the filesystem; the directory is created lazily on
    /// first save.
    pub fn for_prd<P: AsRef<Path>>(prd_path: P) -> Result<Self> {
        Ok(Self {
            dir: state_dir_for(prd_path)?,
        })
    }

    /// The state directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn prd_path(&self) -> PathBuf {
        self.dir.join(PRD_FILE)
    }

    fn progress_path(&self) -> PathBuf {
        self.dir.join(PROGRESS_FILE)
    }

    fn task_log_path(&self) -> PathBuf {
        self.dir.join(TASK_LOG_FILE)
    }

    fn error_log_path(&self) -> PathBuf {
        self.dir.join(ERROR_LOG_FILE)
    }

    /// Load the work-item/progress pair.
    ///
    /// Existence probes are the one place errors are deliberately
    /// swallowed: they only decide cold-start vs resume.
    pub fn load(&self) -> LoadOutcome {
        let prd_path = self.prd_path();
        let progress_path = self.progress_path();

        let prd_exists = prd_path.exists();
        let progress_exists = progress_path.exists();

        if !prd_exists && !progress_exists {
            return LoadOutcome::Absent;
        }
        if prd_exists != progress_exists {
            return LoadOutcome::Invalid(format!(
                "state directory '{}' holds only half the work-item/progress pair",
                self.dir.display()
            ));
        }

        let work_item = match read_json::<WorkItem>(&prd_path) {
            Ok(item) => item,
            Err(e) => return LoadOutcome::Invalid(e.to_string()),
        };
        let progress = match read_json::<ProgressRecord>(&progress_path) {
            Ok(progress) => progress,
            Err(e) => return LoadOutcome::Invalid(e.to_string()),
        };

        LoadOutcome::Valid {
            work_item,
            progress,
        }
    }

    /// Persist the work item and progress record together.
    ///
    /// Each document is written atomically; the pair is one logical
    /// operation under the single-writer model.
    pub fn save(&self, work_item: &WorkItem, progress: &ProgressRecord) -> Result<()> {
        write_json(&self.prd_path(), work_item)?;
        write_json(&self.progress_path(), progress)?;
        Ok(())
    }

    /// Append an entry to the story execution log.
    pub fn append_task_log(&self, event: &str, task: &str, details: Value) -> Result<()> {
        let entry = TaskLogEntry {
            ts: Utc::now(),
            event: event.to_string(),
            actor: actor_string(),
            task: task.to_string(),
            details,
        };
        append_list(&self.task_log_path(), entry)
    }

    /// Append an entry to the error log.
    pub fn append_error_log(&self, task: Option<&str>, message: &str) -> Result<()> {
        let entry = ErrorLogEntry {
            ts: Utc::now(),
            actor: actor_string(),
            task: task.map(|s| s.to_string()),
            message: message.to_string(),
        };
        append_list(&self.error_log_path(), entry)
    }

    /// Read the full story execution log.
    pub fn read_task_log(&self) -> Result<Vec<TaskLogEntry>> {
        read_list(&self.task_log_path())
    }

    /// Read the full error log.
    pub fn read_error_log(&self) -> Result<Vec<ErrorLogEntry>> {
        read_list(&self.error_log_path())
    }
}

/// Build the actor string from the environment (`user@host`).
fn actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string());

    format!("{}@{}", user, host)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PrdflowError::Unknown(format!("failed to read '{}': {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        PrdflowError::Unknown(format!("failed to parse '{}': {}", path.display(), e))
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| PrdflowError::Unknown(format!("failed to serialize document: {}", e)))?;
    atomic_write_file(path, &content)
}

/// Read-append-rewrite a whole log list. Single-writer only.
fn append_list<T: Serialize + DeserializeOwned>(path: &Path, entry: T) -> Result<()> {
    let mut entries: Vec<T> = read_list(path)?;
    entries.push(entry);
    write_json(path, &entries)
}

fn read_list<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    read_json(path)
}
