//! Implementation of the `prdflow run` command.
//!
//! Resolves the template set, runs the PRD batch sequentially, and prints
//! a per-PRD report plus an aggregate usage summary.

use crate::agent::ProcessRunner;
use crate::cli::RunArgs;
use crate::engine::batch;
use crate::engine::usage::UsageAccumulator;
use crate::error::{PrdflowError, Result};
use crate::toolset::{self, DEFAULT_SET_NAME, TemplateSet};

/// Execute the `prdflow run` command.
pub fn cmd_run(args: RunArgs) -> Result<()> {
    let (set, config_path) = resolve_set(&args)?;

    // A run without an explicit non-default set accepts whatever set a
    // resumed PRD was started with.
    let requested_default = args
        .template_set
        .as_deref()
        .is_none_or(|name| name == DEFAULT_SET_NAME);

    let mut runner = ProcessRunner::new();
    let mut acc = UsageAccumulator::new();

    let outcome = batch::run_all(
        &mut runner,
        &set,
        config_path,
        requested_default,
        &args.prds,
        &mut acc,
    );

    for report in &outcome.reports {
        if let Some(warning) = &report.state_warning {
            eprintln!("Warning: {}", warning);
        }
        println!(
            "{}: {} ({}/{} stories)",
            report.work_item_id, report.status, report.completed_tasks, report.total_tasks
        );
    }
    println!("Usage: {}", acc.summary());

    match outcome.failure {
        Some((prd_path, err)) => {
            eprintln!("Stopped at '{}'", prd_path.display());
            Err(err)
        }
        None => Ok(()),
    }
}

/// Resolve the template set and pinned config path for this run.
///
/// With `--config`, the document is loaded and its advisories printed;
/// otherwise the built-in default set is used. An explicit
/// `--template-set` must name the resolved set.
fn resolve_set(args: &RunArgs) -> Result<(TemplateSet, Option<String>)> {
    let (set, config_path) = match &args.config {
        Some(path) => {
            let loaded = toolset::load_template_set(path)?;
            for advisory in &loaded.advisories {
                eprintln!("Warning: {}", advisory);
            }
            (loaded.set, Some(path.display().to_string()))
        }
        None => (toolset::builtin_default(), None),
    };

    if let Some(requested) = &args.template_set
        && requested != &set.name
    {
        return Err(PrdflowError::InvalidArgs(format!(
            "--template-set '{}' does not match the configured set '{}'\n\
             Fix: pass a --config document whose name is '{}', or drop \
             --template-set.",
            requested, set.name, requested
        )));
    }

    Ok((set, config_path))
}
