//! Output formatting for connection parameters.
//!
//! The same parameters can be printed as shell export statements, a dotenv
//! file, JSON or human-readable text. Variable names follow libpq
//! (`PGHOST`, `PGPORT`, ...) plus `DATABASE_URL`.

mod formatters;
mod shell;

use crate::connection::ConnectionParams;
use crate::Result;

pub use formatters::{
    env_vars, DotenvFormatter, ExportFormatter, HumanFormatter, JsonFormatter,
};
pub use shell::ShellType;

/// Renders connection parameters.
pub trait OutputFormatter {
    /// Formats `params` into a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters cannot be rendered, e.g. a
    /// connection URL cannot be built.
    fn format(&self, params: &ConnectionParams) -> Result<String>;
}

/// Available output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Shell-specific export statements.
    Export(ShellType),
    /// Pretty-printed JSON object.
    Json,
    /// Dotenv (`.env` file) format.
    Dotenv,
    /// Human-readable format.
    Human,
}

impl OutputFormat {
    /// Parses `export`, `json`, `dotenv` or `human`. Exports target
    /// `shell`, or the detected shell when `None`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown format name.
    pub fn parse(name: &str, shell: Option<ShellType>) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "export" => Ok(Self::Export(shell.unwrap_or_else(ShellType::detect))),
            "json" => Ok(Self::Json),
            "dotenv" | "env" => Ok(Self::Dotenv),
            "human" => Ok(Self::Human),
            _ => Err(crate::Error::configuration(
                "format",
                format!("unknown output format '{name}': expected export, json, dotenv or human"),
            )),
        }
    }

    /// A formatter for this format.
    #[must_use]
    pub fn create_formatter(&self) -> Box<dyn OutputFormatter> {
        match self {
            Self::Export(shell) => Box::new(ExportFormatter::new(*shell)),
            Self::Json => Box::new(JsonFormatter),
            Self::Dotenv => Box::new(DotenvFormatter),
            Self::Human => Box::new(HumanFormatter),
        }
    }
}
