//! Sequential execution engine.
//!
//! One engine run takes a PRD from its current durable state to the
//! furthest point it can reach: a cold start converts the PRD into a work
//! item first, a resume picks up from the persisted progress record, and
//! both then execute eligible stories one at a time until the work item
//! completes, a story fails, or no story is eligible.
//!
//! Durability rule: state is saved before and after every story attempt,
//! and every failure path persists its error before returning, so a crash
//! or abort at any point leaves a resumable state directory behind.

pub mod batch;
pub mod usage;


use crate::agent::{AgentRunner, InvocationOutcome, InvocationRequest, extract, prompt};
use crate::error::{PrdflowError, Result};
use crate::prd::{Subtask, SubtaskStatus, WorkItem};
use crate::progress::{ProgressRecord, RunStatus};
use crate::resolver;
use crate::store::{LoadOutcome, StateStore};
use crate::toolset::{
    Phase, TemplateSet, ToolConfig, conversion_output_schema, task_output_schema,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use usage::UsageAccumulator;

/// What one engine run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub work_item_id: String,
    pub prd_path: PathBuf,
    pub status: RunStatus,
    pub completed_tasks: usize,
    pub total_tasks: usize,
    /// Set when unusable persisted state was found and discarded.
    pub state_warning: Option<String>,
}

/// The structured object a task-phase invocation must produce.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskOutcome {
    status: String,
    #[serde(default)]
    passes: bool,
    #[serde(default)]
    security_check: Option<String>,
    #[serde(default)]
    commits: Vec<String>,
    #[serde(default)]
    notes: String,
}

/// Drives one PRD at a time against an [`AgentRunner`].
pub struct Engine<'a, R: AgentRunner> {
    runner: &'a mut R,
    set: &'a TemplateSet,
    config_path: Option<String>,
    /// True when the user asked for no set, or for "default" explicitly;
    /// such runs accept whatever set is pinned in the progress record.
    requested_default: bool,
}

impl<'a, R: AgentRunner> Engine<'a, R> {
    pub fn new(
        runner: &'a mut R,
        set: &'a TemplateSet,
        config_path: Option<String>,
        requested_default: bool,
    ) -> Self {
        Self {
            runner,
            set,
            config_path,
            requested_default,
        }
    }

    /// Run one PRD to completion or to its first failure.
    pub fn run(&mut self, prd_path: &Path, acc: &mut UsageAccumulator) -> Result<RunReport> {
        let store = StateStore::for_prd(prd_path)?;

        let mut state_warning = None;
        let (mut work_item, mut progress) = match store.load() {
            LoadOutcome::Valid {
                work_item,
                progress,
            } => {
                if progress.status == RunStatus::Completed {
                    return Ok(RunReport {
                        work_item_id: work_item.id,
                        prd_path: prd_path.to_path_buf(),
                        status: RunStatus::Completed,
                        completed_tasks: progress.completed_tasks.len(),
                        total_tasks: progress.total_tasks,
                        state_warning: None,
                    });
                }
                // A resume must use the set the run was started with.
                // "default" requests defer to whatever is pinned.
                if !self.requested_default && self.set.name != progress.template_set {
                    return Err(PrdflowError::Consistency(format!(
                        "work item '{}' was started with template set '{}' but \
                         '{}' was requested\n\
                         Fix: rerun without --template-set, or with \
                         --template-set {}.",
                        work_item.id, progress.template_set, self.set.name,
                        progress.template_set
                    )));
                }
                (work_item, progress)
            }
            LoadOutcome::Invalid(message) => {
                state_warning = Some(message);
                self.convert(prd_path, &store, acc)?
            }
            LoadOutcome::Absent => self.convert(prd_path, &store, acc)?,
        };

        self.execute(prd_path, &store, &mut work_item, &mut progress, acc)
            .map(|mut report| {
                report.state_warning = state_warning;
                report
            })
    }

    /// Cold start: invoke the conversion phase and persist the initial
    /// state pair.
    fn convert(
        &mut self,
        prd_path: &Path,
        store: &StateStore,
        acc: &mut UsageAccumulator,
    ) -> Result<(WorkItem, ProgressRecord)> {
        let prd_text = std::fs::read_to_string(prd_path).map_err(|e| {
            PrdflowError::FileNotFound(format!(
                "failed to read PRD '{}': {}",
                prd_path.display(),
                e
            ))
        })?;

        let item_id = work_item_id_for(prd_path)?;
        let working_dir = prd_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();

        let request = InvocationRequest {
            prompt: prompt::conversion_prompt(
                prd_path,
                &prd_text,
                &item_id,
                &working_dir.display().to_string(),
            )?,
            working_dir,
            tool: tool_with_schema(self.set, Phase::Conversion),
            phase: Phase::Conversion,
            system_prompt: self.set.system_prompt.clone(),
        };

        let value = self
            .runner
            .invoke(&request)
            .and_then(|outcome| resolve_structured(outcome, acc))
            .map_err(|e| {
                let e = match e {
                    PrdflowError::Transport(m) | PrdflowError::Parse(m) => {
                        PrdflowError::Init(format!("PRD conversion failed: {}", m))
                    }
                    other => other,
                };
                let _ = store.append_error_log(None, &e.to_string());
                e
            })?;

        let mut work_item = WorkItem::from_value(value)?;
        // The directory-derived id is authoritative; an agent-chosen id is
        // kept as the PRD reference.
        if work_item.id != item_id {
            if work_item.prd_id.is_none() {
                work_item.prd_id = Some(work_item.id.clone());
            }
            work_item.id = item_id;
        }
        work_item.validate()?;

        let progress = ProgressRecord::new(
            work_item.id.clone(),
            work_item.user_stories.len(),
            self.set.name.clone(),
            self.config_path.clone(),
        );
        store.save(&work_item, &progress)?;

        Ok((work_item, progress))
    }

    /// The story loop: select, invoke, interpret, persist, repeat.
    fn execute(
        &mut self,
        prd_path: &Path,
        store: &StateStore,
        work_item: &mut WorkItem,
        progress: &mut ProgressRecord,
        acc: &mut UsageAccumulator,
    ) -> Result<RunReport> {
        progress.transition(RunStatus::Running)?;
        store.save(work_item, progress)?;

        let mut completed: HashSet<String> =
            progress.completed_tasks.iter().cloned().collect();

        loop {
            let Some(story_id) = resolver::select_next(&work_item.user_stories, &completed)
                .map(|story| story.id.clone())
            else {
                if resolver::all_terminal(&work_item.user_stories, &completed) {
                    progress.transition(RunStatus::Completed)?;
                    store.save(work_item, progress)?;
                    return Ok(self.report(prd_path, work_item, progress));
                }
                let message = format!(
                    "no story is eligible but {} of {} remain unfinished; a \
                     failed dependency is blocking the rest",
                    work_item.user_stories.len() - completed_or_terminal(work_item, &completed),
                    work_item.user_stories.len()
                );
                return Err(self.fail(
                    store,
                    work_item,
                    progress,
                    None,
                    RunStatus::Blocked,
                    PrdflowError::DependencyUnsatisfiable(message),
                ));
            };

            progress.current_task = Some(story_id.clone());
            store.save(work_item, progress)?;
            store.append_task_log("started", &story_id, json!({}))?;

            let request = match self.task_request(work_item, progress, &story_id) {
                Ok(request) => request,
                Err(e) => {
                    return Err(self.fail(
                        store,
                        work_item,
                        progress,
                        Some(&story_id),
                        RunStatus::Paused,
                        e,
                    ));
                }
            };

            let value = match self
                .runner
                .invoke(&request)
                .and_then(|outcome| resolve_structured(outcome, acc))
            {
                Ok(value) => value,
                Err(e) => {
                    return Err(self.fail(
                        store,
                        work_item,
                        progress,
                        Some(&story_id),
                        RunStatus::Paused,
                        e,
                    ));
                }
            };

            let outcome: TaskOutcome = match serde_json::from_value(value) {
                Ok(outcome) => outcome,
                Err(e) => {
                    return Err(self.fail(
                        store,
                        work_item,
                        progress,
                        Some(&story_id),
                        RunStatus::Paused,
                        PrdflowError::Parse(format!(
                            "story '{}' result does not match the task schema: {}",
                            story_id, e
                        )),
                    ));
                }
            };

            if outcome.security_check.as_deref() == Some("failed") {
                set_story(work_item, &story_id, SubtaskStatus::Failed, &outcome);
                store.append_task_log("failed", &story_id, json!({"securityCheck": "failed"}))?;
                return Err(self.fail(
                    store,
                    work_item,
                    progress,
                    Some(&story_id),
                    RunStatus::Paused,
                    PrdflowError::SecurityPolicy(format!(
                        "story '{}' failed its security check: {}",
                        story_id, outcome.notes
                    )),
                ));
            }

            match outcome.status.as_str() {
                "completed" => {
                    set_story(work_item, &story_id, SubtaskStatus::Completed, &outcome);
                    progress.record_completed(&story_id)?;
                    completed.insert(story_id.clone());
                    store.save(work_item, progress)?;
                    store.append_task_log(
                        "completed",
                        &story_id,
                        json!({"passes": outcome.passes, "commits": outcome.commits}),
                    )?;
                }
                "blocked" => {
                    set_story(work_item, &story_id, SubtaskStatus::Blocked, &outcome);
                    store.append_task_log("blocked", &story_id, json!({"notes": outcome.notes}))?;
                    return Err(self.fail(
                        store,
                        work_item,
                        progress,
                        Some(&story_id),
                        RunStatus::Blocked,
                        PrdflowError::TaskBlocked(format!(
                            "story '{}' reported itself blocked: {}",
                            story_id, outcome.notes
                        )),
                    ));
                }
                "failed" => {
                    set_story(work_item, &story_id, SubtaskStatus::Failed, &outcome);
                    store.append_task_log("failed", &story_id, json!({"notes": outcome.notes}))?;
                    return Err(self.fail(
                        store,
                        work_item,
                        progress,
                        Some(&story_id),
                        RunStatus::Paused,
                        PrdflowError::TaskFailed(format!(
                            "story '{}' failed: {}",
                            story_id, outcome.notes
                        )),
                    ));
                }
                other => {
                    return Err(self.fail(
                        store,
                        work_item,
                        progress,
                        Some(&story_id),
                        RunStatus::Paused,
                        PrdflowError::Parse(format!(
                            "story '{}' reported unknown status '{}'",
                            story_id, other
                        )),
                    ));
                }
            }
        }
    }

    /// Build the task-phase invocation for one story.
    fn task_request(
        &self,
        work_item: &WorkItem,
        progress: &ProgressRecord,
        story_id: &str,
    ) -> Result<InvocationRequest> {
        let story = work_item.story(story_id).ok_or_else(|| {
            PrdflowError::Consistency(format!(
                "selected story '{}' is missing from work item '{}'",
                story_id, work_item.id
            ))
        })?;

        // Context stories in completion order, not declaration order.
        let completed_refs: Vec<&Subtask> = progress
            .completed_tasks
            .iter()
            .filter_map(|id| work_item.story(id))
            .collect();

        let tool = tool_with_schema(self.set, Phase::Task);
        let prompt =
            prompt::task_prompt(work_item, story, &completed_refs, !tool.skip_context)?;

        Ok(InvocationRequest {
            prompt,
            working_dir: PathBuf::from(&work_item.working_dir),
            tool,
            phase: Phase::Task,
            system_prompt: self.set.system_prompt.clone(),
        })
    }

    /// Persist a failure before surfacing it: error descriptor on the
    /// progress record, status transition, documents, error log.
    fn fail(
        &self,
        store: &StateStore,
        work_item: &WorkItem,
        progress: &mut ProgressRecord,
        task: Option<&str>,
        to: RunStatus,
        err: PrdflowError,
    ) -> PrdflowError {
        progress.record_error(task, &err.to_string());
        progress.current_task = None;
        let _ = progress.transition(to);
        // Best-effort: the original error stays the one reported.
        let _ = store.save(work_item, progress);
        let _ = store.append_error_log(task, &err.to_string());
        err
    }

    fn report(
        &self,
        prd_path: &Path,
        work_item: &WorkItem,
        progress: &ProgressRecord,
    ) -> RunReport {
        RunReport {
            work_item_id: work_item.id.clone(),
            prd_path: prd_path.to_path_buf(),
            status: progress.status,
            completed_tasks: progress.completed_tasks.len(),
            total_tasks: progress.total_tasks,
            state_warning: None,
        }
    }
}

/// Derive the work-item id from the PRD filename stem before the first `.`.
pub fn work_item_id_for(prd_path: &Path) -> Result<String> {
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
    Ok(stem.to_string())
}

/// The phase's first tool configuration, with the built-in output schema
/// filled in when the set declares none.
fn tool_with_schema(set: &TemplateSet, phase: Phase) -> ToolConfig {
    let mut tool = set.tool_for(phase).clone();
    if tool.output_schema.is_none() {
        tool.output_schema = Some(match phase {
            Phase::Conversion => conversion_output_schema(),
            Phase::Task => task_output_schema(),
        });
    }
    tool
}

/// Interpret one invocation outcome into a structured result value.
///
/// Precedence: a context-overflow signal fails the invocation outright; a
/// structured result wins even when the process also reported a transport
/// error (some agent versions exit nonzero after emitting a complete
/// result); otherwise transport errors surface, and as a last resort the
/// structured object is recovered from the raw output.
fn resolve_structured(
    outcome: InvocationOutcome,
    acc: &mut UsageAccumulator,
) -> Result<Value> {
    acc.add(outcome.usage.as_ref(), outcome.total_cost_usd);

    if outcome.context_overflow {
        return Err(PrdflowError::Transport(
            "agent session exceeded its context budget".to_string(),
        ));
    }
    if let Some(value) = outcome.structured_result {
        return Ok(value);
    }
    if let Some(message) = outcome.transport_error {
        if outcome.network_failure {
            return Err(PrdflowError::Network(message));
        }
        return Err(PrdflowError::Transport(message));
    }
    extract::extract(&outcome.raw_output)
}

/// Count stories that are finished from the resolver's point of view.
fn completed_or_terminal(work_item: &WorkItem, completed: &HashSet<String>) -> usize {
    work_item
        .user_stories
        .iter()
        .filter(|story| story.status.is_terminal() || completed.contains(&story.id))
        .count()
}

/// Apply a task outcome to the story record.
fn set_story(
    work_item: &mut WorkItem,
    story_id: &str,
    status: SubtaskStatus,
    outcome: &TaskOutcome,
) {
    if let Some(story) = work_item.story_mut(story_id) {
        story.status = status;
        story.passes = outcome.passes;
        if !outcome.commits.is_empty() {
            story.commits = outcome.commits.clone();
        }
        if !outcome.notes.is_empty() {
            story.notes = outcome.notes.clone();
        }
    }
}
