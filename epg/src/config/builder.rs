//! Layered configuration assembly.

use std::path::{Path, PathBuf};

use crate::config::environment::EnvironmentConfig;
use crate::config::instance::InstanceConfig;
use crate::config::loader::ConfigLoader;
use crate::config::merger::ConfigMerger;
use crate::config::schema::InstanceOptions;
use crate::error::Result;

/// Collects configuration layers and produces an [`InstanceConfig`].
///
/// Layers apply lowest to highest: files, then `EPG_*` variables, then the
/// options passed to [`with_options`](Self::with_options).
///
/// # Examples
///
/// ```
/// use epg::config::{ConfigBuilder, InstanceOptions};
///
/// let config = ConfigBuilder::new()
///     .skip_files()
///     .skip_env()
///     .with_options(InstanceOptions {
///         database: Some("first_db".into()),
///         ..Default::default()
///     })
///     .build()
///     .unwrap();
/// assert_eq!(config.database(), "first_db");
/// ```
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    working_dir: Option<PathBuf>,
    config_dir: Option<PathBuf>,
    skip_files: bool,
    skip_env: bool,
    overrides: Vec<InstanceOptions>,
}

impl ConfigBuilder {
    /// Starts with every layer enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory project files are searched from (default: current dir).
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Directory holding the user `config.yaml` (default: `~/.config/epg`).
    #[must_use]
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    /// Ignore configuration files.
    #[must_use]
    pub fn skip_files(mut self) -> Self {
        self.skip_files = true;
        self
    }

    /// Ignore `EPG_*` environment variables.
    #[must_use]
    pub fn skip_env(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Adds a programmatic layer above everything added before it.
    #[must_use]
    pub fn with_options(mut self, options: InstanceOptions) -> Self {
        self.overrides.push(options);
        self
    }

    /// Merges all layers without validating.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file cannot be read or parsed,
    /// or an environment variable cannot be parsed.
    pub fn load_options(&self) -> Result<InstanceOptions> {
        let mut options = InstanceOptions::default();

        if !self.skip_files {
            let working_dir = match self.working_dir {
                Some(ref dir) => dir.clone(),
                None => std::env::current_dir()?,
            };
            let sources = ConfigLoader::load_all(&working_dir, self.config_dir.as_deref())?;
            options = ConfigMerger::merge(&sources);
        }

        if !self.skip_env {
            EnvironmentConfig::apply_overrides(&mut options)?;
        }

        for layer in &self.overrides {
            ConfigMerger::merge_into(&mut options, layer);
        }

        Ok(options)
    }

    /// Merges all layers and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails or the merged options are invalid.
    pub fn build(&self) -> Result<InstanceConfig> {
        InstanceConfig::new(self.load_options()?)
    }

    /// Working directory used for project file discovery, if set.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }
}
