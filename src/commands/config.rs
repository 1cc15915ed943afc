//! Implementation of the `prdflow config validate` command.

use crate::cli::ConfigValidateArgs;
use crate::error::Result;
use crate::toolset;

/// Execute the `prdflow config validate` command.
///
/// Loads, migrates, and validates the document; advisories from legacy
/// migrations are printed as warnings but do not fail validation.
pub fn cmd_validate(args: ConfigValidateArgs) -> Result<()> {
    let loaded = toolset::load_template_set(&args.path)?;

    for advisory in &loaded.advisories {
        eprintln!("Warning: {}", advisory);
    }

    println!(
        "Template set '{}' (version {}) is valid.",
        loaded.set.name, loaded.set.version
    );
    println!(
        "  conversion: {}",
        loaded
            .set
            .conversion
            .iter()
            .map(|t| t.tool.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!(
        "  task:       {}",
        loaded
            .set
            .task
            .iter()
            .map(|t| t.tool.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(())
}
