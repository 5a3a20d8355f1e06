//! Utility functions for CLI operations.
//!
//! Configuration loading shared by every command, plus small argument
//! parsers for clap.

use crate::error::CliError;
use epg::config::{ConfigBuilder, InstanceOptions};
use epg::InstanceConfig;
use std::path::PathBuf;

/// Global CLI options shared across all commands.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Enable verbose output.
    pub verbose: bool,

    /// Suppress non-essential output.
    pub quiet: bool,

    /// Directory holding the user `config.yaml`.
    pub config_dir: Option<PathBuf>,
}

/// A config builder with the global options applied and `overrides` as
/// the highest layer.
pub fn config_builder(global: &GlobalOptions, overrides: InstanceOptions) -> ConfigBuilder {
    let mut builder = ConfigBuilder::new();
    if let Some(ref dir) = global.config_dir {
        builder = builder.with_config_dir(dir);
    }
    builder.with_options(overrides)
}

/// Load hierarchical configuration.
///
/// Configuration is merged from multiple sources with precedence:
/// 1. Command-line flags (highest priority)
/// 2. Environment variables
/// 3. Configuration files
/// 4. Built-in defaults (lowest priority)
pub fn load_configuration(
    global: &GlobalOptions,
    overrides: InstanceOptions,
) -> Result<InstanceConfig, CliError> {
    config_builder(global, overrides)
        .build()
        .map_err(CliError::from)
}

/// Parses `key=value` for repeated `--set` flags.
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("work_mem=8MB").unwrap(),
            ("work_mem".to_string(), "8MB".to_string())
        );
        assert_eq!(
            parse_key_value("search_path = a,b").unwrap(),
            ("search_path".to_string(), "a,b".to_string())
        );
        assert!(parse_key_value("no_equals").is_err());
        assert!(parse_key_value("=value").is_err());
    }
}
