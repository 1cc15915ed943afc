//! CLI argument parsing for prdflow.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Prdflow: Sequential PRD-to-subtask orchestrator for agentic coding pipelines.
///
/// Each PRD file becomes a work item of dependent user stories, executed
/// one at a time by a code-generation agent:
/// - A sibling state directory holds the durable JSON documents
/// - Runs resume from that state after interruption
/// - Template sets configure which tool runs each phase
#[derive(Parser, Debug)]
#[command(name = "prdflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for prdflow.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one or more PRDs to completion.
    ///
    /// Converts each PRD into a work item on first run, then executes
    /// eligible user stories sequentially. Already-started PRDs resume
    /// from their persisted state. Stops at the first failing PRD.
    Run(RunArgs),

    /// Show the persisted progress of a PRD.
    ///
    /// Prints the run status, completed stories, and last error without
    /// invoking any agent.
    Status(StatusArgs),

    /// Configuration commands.
    ///
    /// Validate template-set documents.
    Config(ConfigCommand),
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// PRD files to run, in order.
    #[arg(required = true)]
    pub prds: Vec<PathBuf>,

    /// Template set name to run with. A resumed PRD must match the set it
    /// was started with; "default" accepts whatever is pinned.
    #[arg(long)]
    pub template_set: Option<String>,

    /// Path to a template-set document (JSON or YAML).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the `status` command.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// PRD file to report on.
    pub prd: PathBuf,
}

/// Config subcommands.
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Available config actions.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate a template-set document.
    ///
    /// Loads, migrates, and validates the document, printing any
    /// migration advisories.
    Validate(ConfigValidateArgs),
}

/// Arguments for the `config validate` command.
#[derive(Parser, Debug)]
pub struct ConfigValidateArgs {
    /// Template-set document to validate (JSON or YAML).
    pub path: PathBuf,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
