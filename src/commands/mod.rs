//! Command implementations for prdflow.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations.

mod config;
mod run;
mod status;

use crate::cli::{Command, ConfigAction, ConfigCommand};
use crate::error::Result;

/// Dispatch a command to its implementation.
///
/// This is the main entry point for command execution. Each command
/// is routed to its handler function.
pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Run(args) => run::cmd_run(args),
        Command::Status(args) => status::cmd_status(args),
        Command::Config(cmd) => dispatch_config(cmd),
    }
}

/// Dispatch config subcommands.
fn dispatch_config(cmd: ConfigCommand) -> Result<()> {
    match cmd.action {
        ConfigAction::Validate(args) => config::cmd_validate(args),
    }
}
