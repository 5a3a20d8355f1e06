//! Output formatter implementations.

use serde::Serialize;

use crate::connection::ConnectionParams;
use crate::{Error, Result};

use super::{OutputFormatter, ShellType};

/// libpq-style environment variables for `params`, in a fixed order.
///
/// # Errors
///
/// Returns an error if the connection URL cannot be built.
pub fn env_vars(params: &ConnectionParams) -> Result<Vec<(&'static str, String)>> {
    Ok(vec![
        ("PGHOST", params.host.clone()),
        ("PGPORT", params.port.to_string()),
        ("PGDATABASE", params.database.clone()),
        ("PGUSER", params.username.clone()),
        ("PGPASSWORD", params.password.clone()),
        ("DATABASE_URL", params.url()?.to_string()),
    ])
}

/// Formatter for shell-specific export statements.
#[derive(Debug, Clone, Copy)]
pub struct ExportFormatter {
    shell: ShellType,
}

impl ExportFormatter {
    /// Exports for `shell`.
    #[must_use]
    pub fn new(shell: ShellType) -> Self {
        Self { shell }
    }
}

impl OutputFormatter for ExportFormatter {
    fn format(&self, params: &ConnectionParams) -> Result<String> {
        Ok(env_vars(params)?
            .iter()
            .map(|(var, value)| self.shell.format_export(var, value))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    #[serde(flatten)]
    params: &'a ConnectionParams,
    url: String,
}

/// Formatter for JSON output.
#[derive(Debug, Clone, Copy)]
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn format(&self, params: &ConnectionParams) -> Result<String> {
        let output = JsonOutput {
            params,
            url: params.url()?.to_string(),
        };
        serde_json::to_string_pretty(&output).map_err(|e| {
            Error::configuration("json_output", format!("failed to serialize to JSON: {e}"))
        })
    }
}

/// Formatter for dotenv (`.env` file) format.
#[derive(Debug, Clone, Copy)]
pub struct DotenvFormatter;

impl OutputFormatter for DotenvFormatter {
    fn format(&self, params: &ConnectionParams) -> Result<String> {
        Ok(env_vars(params)?
            .iter()
            .map(|(var, value)| format!("{var}={}", dotenv_quote(value)))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

fn dotenv_quote(value: &str) -> String {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || "\"'#$\\".contains(c)) {
        format!("\"{}\"", value.replace('\\', r"\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// Formatter for human-readable output.
#[derive(Debug, Clone, Copy)]
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn format(&self, params: &ConnectionParams) -> Result<String> {
        let mut lines = vec![
            "PostgreSQL is ready:".to_string(),
            format!("  host:     {}", params.host),
            format!("  port:     {}", params.port),
            format!("  database: {}", params.database),
            format!("  user:     {}", params.username),
            format!("  password: {}", params.password),
            format!("  url:      {}", params.url()?),
        ];
        if params.pooled {
            lines.push("  pooling:  enabled".to_string());
        }
        Ok(lines.join("\n"))
    }
}
