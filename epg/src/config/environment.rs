//! `EPG_*` environment variable overrides.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use crate::config::schema::{AuthMethod, InstanceOptions};
use crate::error::{Error, Result};

/// Applies `EPG_*` environment variables on top of file configuration.
///
/// | Variable | Option |
/// |---|---|
/// | `EPG_USERNAME` | `username` |
/// | `EPG_PASSWORD` | `password` |
/// | `EPG_DATABASE` | `database` |
/// | `EPG_DATA_DIR` | `data_dir` |
/// | `EPG_PORT` | `port` |
/// | `EPG_POOLING` | `pooling` |
/// | `EPG_BIN_DIR` | `bin_dir` |
/// | `EPG_STARTUP_TIMEOUT_MS` | `startup_timeout_ms` |
/// | `EPG_SHUTDOWN_TIMEOUT_MS` | `shutdown_timeout_ms` |
/// | `EPG_CLEAN_DATA_DIR` | `clean_data_dir` |
/// | `EPG_AUTH_METHOD` | `auth_method` |
/// | `EPG_SERVER_CONFIG` | `server_config` (comma-separated `key=value`, merged) |
///
/// # Examples
///
/// ```no_run
/// use epg::config::{EnvironmentConfig, InstanceOptions};
///
/// let mut options = InstanceOptions::default();
/// EnvironmentConfig::apply_overrides(&mut options).unwrap();
/// ```
pub struct EnvironmentConfig;

impl EnvironmentConfig {
    /// Reads the process environment and applies it to `options`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the variable if a value cannot
    /// be parsed.
    pub fn apply_overrides(options: &mut InstanceOptions) -> Result<()> {
        Self::apply_with(options, |name| env::var(name).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the variable if a value cannot
    /// be parsed.
    pub fn apply_with<F>(options: &mut InstanceOptions, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("EPG_USERNAME") {
            options.username = Some(val);
        }
        if let Some(val) = lookup("EPG_PASSWORD") {
            options.password = Some(val);
        }
        if let Some(val) = lookup("EPG_DATABASE") {
            options.database = Some(val);
        }
        if let Some(val) = lookup("EPG_DATA_DIR") {
            options.data_dir = Some(PathBuf::from(val));
        }
        if let Some(val) = lookup("EPG_BIN_DIR") {
            options.bin_dir = Some(PathBuf::from(val));
        }
        if let Some(val) = lookup("EPG_PORT") {
            options.port = Some(Self::parse_number("EPG_PORT", &val)?);
        }
        if let Some(val) = lookup("EPG_POOLING") {
            options.pooling = Some(Self::parse_bool("EPG_POOLING", &val)?);
        }
        if let Some(val) = lookup("EPG_STARTUP_TIMEOUT_MS") {
            options.startup_timeout_ms = Some(Self::parse_number("EPG_STARTUP_TIMEOUT_MS", &val)?);
        }
        if let Some(val) = lookup("EPG_SHUTDOWN_TIMEOUT_MS") {
            options.shutdown_timeout_ms =
                Some(Self::parse_number("EPG_SHUTDOWN_TIMEOUT_MS", &val)?);
        }
        if let Some(val) = lookup("EPG_CLEAN_DATA_DIR") {
            options.clean_data_dir = Some(Self::parse_bool("EPG_CLEAN_DATA_DIR", &val)?);
        }
        if let Some(val) = lookup("EPG_AUTH_METHOD") {
            let method: AuthMethod = val
                .parse()
                .map_err(|message: String| Error::configuration("EPG_AUTH_METHOD", message))?;
            options.auth_method = Some(method);
        }
        if let Some(val) = lookup("EPG_SERVER_CONFIG") {
            let entries = Self::parse_key_values("EPG_SERVER_CONFIG", &val)?;
            options
                .server_config
                .get_or_insert_with(BTreeMap::new)
                .extend(entries);
        }

        Ok(())
    }

    /// Accepts true/1/yes/on and false/0/no/off, case-insensitively.
    fn parse_bool(field: &str, s: &str) -> Result<bool> {
        match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(Error::configuration(
                field,
                format!("invalid boolean value: '{s}' (expected true/false/1/0/yes/no/on/off)"),
            )),
        }
    }

    fn parse_number<T: std::str::FromStr>(field: &str, s: &str) -> Result<T> {
        s.trim()
            .parse()
            .map_err(|_| Error::configuration(field, format!("invalid number: '{s}'")))
    }

    /// Parses `a=1, b=2` into pairs. Empty segments are ignored.
    fn parse_key_values(field: &str, s: &str) -> Result<BTreeMap<String, String>> {
        let mut entries = BTreeMap::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part.split_once('=').ok_or_else(|| {
                Error::configuration(field, format!("expected key=value, got '{part}'"))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::configuration(field, format!("empty key in '{part}'")));
            }
            entries.insert(key.to_string(), value.trim().to_string());
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serial_test::serial;

    use super::*;

    fn apply(vars: &[(&str, &str)]) -> Result<InstanceOptions> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut options = InstanceOptions::default();
        EnvironmentConfig::apply_with(&mut options, |name| vars.get(name).cloned())?;
        Ok(options)
    }

    #[test]
    fn test_parse_bool_variants() {
        for input in ["true", "TRUE", "1", "yes", "On"] {
            assert!(EnvironmentConfig::parse_bool("test", input).unwrap());
        }
        for input in ["false", "0", "NO", "off"] {
            assert!(!EnvironmentConfig::parse_bool("test", input).unwrap());
        }
        assert!(EnvironmentConfig::parse_bool("test", "maybe").is_err());
    }

    #[test]
    fn test_string_overrides() {
        let options = apply(&[
            ("EPG_USERNAME", "alice"),
            ("EPG_PASSWORD", "pw"),
            ("EPG_DATABASE", "first_db"),
            ("EPG_DATA_DIR", "/tmp/pg"),
        ])
        .unwrap();
        assert_eq!(options.username.as_deref(), Some("alice"));
        assert_eq!(options.password.as_deref(), Some("pw"));
        assert_eq!(options.database.as_deref(), Some("first_db"));
        assert_eq!(options.data_dir, Some(PathBuf::from("/tmp/pg")));
    }

    #[test]
    fn test_numeric_and_bool_overrides() {
        let options = apply(&[
            ("EPG_PORT", "55432"),
            ("EPG_POOLING", "yes"),
            ("EPG_STARTUP_TIMEOUT_MS", "1500"),
            ("EPG_CLEAN_DATA_DIR", "0"),
            ("EPG_AUTH_METHOD", "password"),
        ])
        .unwrap();
        assert_eq!(options.port, Some(55432));
        assert_eq!(options.pooling, Some(true));
        assert_eq!(options.startup_timeout_ms, Some(1500));
        assert_eq!(options.clean_data_dir, Some(false));
        assert_eq!(options.auth_method, Some(AuthMethod::Password));
    }

    #[test]
    fn test_invalid_port_names_variable() {
        let err = apply(&[("EPG_PORT", "70000")]).unwrap_err();
        assert!(err.to_string().contains("EPG_PORT"));
    }

    #[test]
    fn test_server_config_merges_into_existing() {
        let mut options = InstanceOptions {
            server_config: Some(BTreeMap::from([
                ("fsync".to_string(), "off".to_string()),
                ("log_statement".to_string(), "none".to_string()),
            ])),
            ..Default::default()
        };
        EnvironmentConfig::apply_with(&mut options, |name| {
            (name == "EPG_SERVER_CONFIG").then(|| "log_statement=all, work_mem = 8MB".to_string())
        })
        .unwrap();

        let config = options.server_config.unwrap();
        assert_eq!(config["fsync"], "off");
        assert_eq!(config["log_statement"], "all");
        assert_eq!(config["work_mem"], "8MB");
    }

    #[test]
    fn test_parse_key_values_rejects_garbage() {
        assert!(EnvironmentConfig::parse_key_values("f", "novalue").is_err());
        assert!(EnvironmentConfig::parse_key_values("f", "=x").is_err());
        assert!(EnvironmentConfig::parse_key_values("f", " , ").unwrap().is_empty());
    }

    #[test]
    #[serial]
    fn test_apply_overrides_reads_process_env() {
        env::set_var("EPG_DATABASE", "from_env");
        let mut options = InstanceOptions::default();
        let result = EnvironmentConfig::apply_overrides(&mut options);
        env::remove_var("EPG_DATABASE");

        result.unwrap();
        assert_eq!(options.database.as_deref(), Some("from_env"));
    }
}
