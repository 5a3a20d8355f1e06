//! Clean command implementation.
//!
//! Sweeps `epg-*` directories whose owning process is gone.

use crate::error::CliError;
use crate::utils::GlobalOptions;
use clap::Args;
use epg::DataDirectoryManager;
use std::path::PathBuf;

/// Remove data directories left behind by crashed runs.
#[derive(Args)]
pub struct CleanCommand {
    /// Directory to sweep (default: the system temp directory)
    #[arg(long, value_name = "PATH")]
    pub temp_root: Option<PathBuf>,
}

impl CleanCommand {
    /// Execute the clean command.
    pub fn execute(self, global: &GlobalOptions) -> Result<(), CliError> {
        let manager = match self.temp_root {
            Some(root) => DataDirectoryManager::new(root),
            None => DataDirectoryManager::system(),
        };
        let report = manager.sweep_stale()?;

        if !global.quiet {
            for path in &report.removed {
                println!("Removed {}", path.display());
            }
            if global.verbose {
                for path in &report.skipped {
                    eprintln!("Skipped {} (in use or not locked)", path.display());
                }
            }
            eprintln!(
                "Removed {} stale director{}",
                report.removed.len(),
                if report.removed.len() == 1 { "y" } else { "ies" }
            );
        }

        if report.failed.is_empty() {
            return Ok(());
        }
        for (path, reason) in &report.failed {
            eprintln!("Failed to remove {}: {reason}", path.display());
        }
        Err(CliError::SemanticFailure(format!(
            "{} stale director{} could not be removed",
            report.failed.len(),
            if report.failed.len() == 1 { "y" } else { "ies" }
        )))
    }
}
