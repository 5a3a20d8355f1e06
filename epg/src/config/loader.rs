//! Configuration file discovery and loading.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::InstanceOptions;
use crate::error::{Error, Result};

/// Name of the project configuration file.
pub const PROJECT_CONFIG_FILE: &str = "epg.yaml";

/// Name of the uncommitted, developer-local project file.
pub const LOCAL_CONFIG_FILE: &str = "epg.local.yaml";

/// A configuration file with its precedence.
///
/// Lower precedence values are overridden by higher ones.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the configuration file.
    pub path: PathBuf,
    /// Precedence level (higher values take priority).
    pub precedence: u8,
    /// Parsed options.
    pub options: InstanceOptions,
}

/// Discovers and loads configuration files.
///
/// # Examples
///
/// ```no_run
/// use epg::config::ConfigLoader;
/// use std::path::Path;
///
/// let sources = ConfigLoader::load_all(Path::new("."), None).unwrap();
/// println!("found {} configuration file(s)", sources.len());
/// ```
pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads every configuration file that applies to `working_dir`:
    ///
    /// 1. user file `config.yaml` in `config_dir` or `~/.config/epg` (precedence 1)
    /// 2. the nearest `epg.yaml` walking up from `working_dir` (precedence 2)
    /// 3. `epg.local.yaml` next to it (precedence 3)
    ///
    /// The result is sorted lowest precedence first.
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be read or parsed.
    pub fn load_all(working_dir: &Path, config_dir: Option<&Path>) -> Result<Vec<ConfigSource>> {
        let mut sources = Vec::new();

        if let Some(user) = Self::load_user_config(config_dir)? {
            sources.push(user);
        }
        sources.extend(Self::discover_project_configs(working_dir)?);
        sources.sort_by_key(|s| s.precedence);

        Ok(sources)
    }

    fn load_user_config(config_dir: Option<&Path>) -> Result<Option<ConfigSource>> {
        let path = match config_dir {
            Some(dir) => dir.join("config.yaml"),
            None => match Self::user_config_dir() {
                Some(dir) => dir.join("config.yaml"),
                None => return Ok(None),
            },
        };

        if !path.exists() {
            return Ok(None);
        }

        let options = Self::load_file(&path)?;
        Ok(Some(ConfigSource {
            path,
            precedence: 1,
            options,
        }))
    }

    /// Walks up from `start_dir` and loads the project files of the first
    /// directory that has any.
    ///
    /// # Errors
    ///
    /// Returns an error if a discovered file cannot be read or parsed.
    pub fn discover_project_configs(start_dir: &Path) -> Result<Vec<ConfigSource>> {
        let mut configs = Vec::new();
        let mut current = start_dir.to_path_buf();

        loop {
            for (name, precedence) in [(PROJECT_CONFIG_FILE, 2), (LOCAL_CONFIG_FILE, 3)] {
                let path = current.join(name);
                if path.is_file() {
                    let options = Self::load_file(&path)?;
                    log::debug!("loaded configuration from {}", path.display());
                    configs.push(ConfigSource {
                        path,
                        precedence,
                        options,
                    });
                }
            }

            if !configs.is_empty() || !current.pop() {
                break;
            }
        }

        Ok(configs)
    }

    /// Reads and parses one YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigFile`] if the file cannot be read or the YAML
    /// is invalid (including unknown keys).
    pub fn load_file(path: &Path) -> Result<InstanceOptions> {
        let contents = fs::read_to_string(path).map_err(|e| Error::ConfigFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        // An empty file is a valid, empty layer.
        if contents.trim().is_empty() {
            return Ok(InstanceOptions::default());
        }

        serde_yaml::from_str(&contents).map_err(|e| Error::ConfigFile {
            path: path.to_path_buf(),
            message: format!("invalid YAML: {e}"),
        })
    }

    /// `~/.config/epg`, if a home directory is known.
    #[must_use]
    pub fn user_config_dir() -> Option<PathBuf> {
        home::home_dir().map(|home| home.join(".config").join("epg"))
    }
}
