//! Sequential multi-PRD execution.
//!
//! PRDs run in the order given and the batch stops at the first failure;
//! reports for already-finished PRDs are retained so the caller can still
//! print what succeeded before the stop.

use super::{Engine, RunReport, usage::UsageAccumulator};
use crate::agent::AgentRunner;
use crate::error::PrdflowError;
use crate::toolset::TemplateSet;
use std::path::PathBuf;

/// The result of running a batch: reports in input order, plus the failure
/// that stopped the batch, if any.
#[derive(Debug)]
pub struct BatchOutcome {
    pub reports: Vec<RunReport>,
    pub failure: Option<(PathBuf, PrdflowError)>,
}

/// Run each PRD in order, stopping at the first failure.
pub fn run_all<R: AgentRunner>(
    runner: &mut R,
    set: &TemplateSet,
    config_path: Option<String>,
    requested_default: bool,
    prd_paths: &[PathBuf],
    acc: &mut UsageAccumulator,
) -> BatchOutcome {
    let mut reports = Vec::with_capacity(prd_paths.len());

    for prd_path in prd_paths {
        let mut engine =
            Engine::new(runner, set, config_path.clone(), requested_default);
        match engine.run(prd_path, acc) {
            Ok(report) => reports.push(report),
            Err(e) => {
                return BatchOutcome {
                    reports,
                    failure: Some((prd_path.clone(), e)),
                };
            }
        }
    }

    BatchOutcome {
        reports,
        failure: None,
    }
}
