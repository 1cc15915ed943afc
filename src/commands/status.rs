//! Implementation of the `prdflow status` command.
//!
//! Reads the persisted state pair and prints a progress summary without
//! invoking any agent.

use crate::cli::StatusArgs;
use crate::error::Result;
use crate::prd::SubtaskStatus;
use crate::store::{LoadOutcome, StateStore};

/// Execute the `prdflow status` command.
pub fn cmd_status(args: StatusArgs) -> Result<()> {
    let store = StateStore::for_prd(&args.prd)?;

    let (work_item, progress) = match store.load() {
        LoadOutcome::Absent => {
            println!(
                "No run state for '{}'; run `prdflow run` to start it.",
                args.prd.display()
            );
            return Ok(());
        }
        LoadOutcome::Invalid(message) => {
            println!(
                "State for '{}' is unusable and will be rebuilt on the next run:",
                args.prd.display()
            );
            println!("  {}", message);
            return Ok(());
        }
        LoadOutcome::Valid {
            work_item,
            progress,
        } => (work_item, progress),
    };

    println!("Work item: {} ({})", work_item.id, work_item.title);
    println!("Branch:    {}", work_item.branch_name);
    println!("Status:    {}", progress.status);
    println!(
        "Stories:   {}/{} completed",
        progress.completed_tasks.len(),
        progress.total_tasks
    );
    println!("Template:  {}", progress.template_set);
    if let Some(current) = &progress.current_task {
        println!("In flight: {}", current);
    }
    if let Some(last_error) = &progress.last_error {
        match &last_error.task_id {
            Some(task) => println!("Last error ({}): {}", task, last_error.message),
            None => println!("Last error: {}", last_error.message),
        }
    }

    println!();
    for story in &work_item.user_stories {
        let marker = match story.status {
            SubtaskStatus::Completed => "x",
            SubtaskStatus::Failed => "!",
            SubtaskStatus::Blocked => "?",
            SubtaskStatus::Pending => " ",
        };
        println!("  [{}] {} {}", marker, story.id, story.title);
    }

    Ok(())
}
