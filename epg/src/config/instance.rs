//! The validated, immutable configuration of one instance.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::schema::{AuthMethod, InstanceOptions, PortRangeConfig};
use crate::config::validator::ConfigValidator;
use crate::error::{Error, Result};
use crate::{Port, PortRange};

/// Bootstrap superuser created by initdb.
pub const SUPERUSER: &str = "postgres";

/// Role used when none is configured.
pub const DEFAULT_USERNAME: &str = "postgres";

/// Password used when none is configured.
pub const DEFAULT_PASSWORD: &str = "postgres";

/// Database used when none is configured.
pub const DEFAULT_DATABASE: &str = "postgres";

/// Readiness deadline used when none is configured.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Shutdown grace period used when none is configured.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Server settings applied before the caller's own `server_config`.
#[must_use]
pub fn default_server_config() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("timezone".to_string(), "UTC".to_string()),
        ("synchronous_commit".to_string(), "off".to_string()),
        ("max_connections".to_string(), "300".to_string()),
    ])
}

/// How the instance's port is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSelection {
    /// Search this range for a free port.
    Auto(PortRange),
    /// Use exactly this port.
    Fixed(Port),
}

/// Validated configuration for one instance.
///
/// Built once through [`InstanceConfig::new`] and read-only afterwards.
///
/// # Examples
///
/// ```
/// use epg::config::{InstanceConfig, InstanceOptions};
///
/// let config = InstanceConfig::new(InstanceOptions {
///     username: Some("alice".into()),
///     database: Some("first_db".into()),
///     ..Default::default()
/// })
/// .unwrap();
///
/// assert_eq!(config.username(), "alice");
/// assert_eq!(config.password(), "postgres");
/// assert_eq!(config.server_config()["timezone"], "UTC");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceConfig {
    username: String,
    password: String,
    database: String,
    data_dir: Option<PathBuf>,
    pooling: bool,
    port: PortSelection,
    server_config: BTreeMap<String, String>,
    connect_options: BTreeMap<String, String>,
    bin_dir: Option<PathBuf>,
    startup_timeout: Duration,
    shutdown_timeout: Duration,
    clean_data_dir: bool,
    auth_method: AuthMethod,
}

impl InstanceConfig {
    /// Validates `options` and fills in defaults.
    ///
    /// Relative `data_dir` and `bin_dir` paths are resolved against the
    /// current working directory.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any option is malformed or options
    /// conflict. Nothing outside the process is touched.
    pub fn new(options: InstanceOptions) -> Result<Self> {
        ConfigValidator::validate(&options)?;

        let port = match (options.port.filter(|&p| p != 0), options.port_range) {
            (Some(port), _) => PortSelection::Fixed(Port::try_from(port)?),
            (None, Some(range)) => PortSelection::Auto(range.to_range()?),
            (None, None) => PortSelection::Auto(PortRange::DYNAMIC),
        };

        let mut server_config = default_server_config();
        // setting names are case-insensitive to the server
        for (key, value) in options.server_config.unwrap_or_default() {
            server_config.insert(key.to_ascii_lowercase(), value);
        }

        Ok(Self {
            username: options
                .username
                .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            password: options
                .password
                .unwrap_or_else(|| DEFAULT_PASSWORD.to_string()),
            database: options
                .database
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            data_dir: options
                .data_dir
                .map(|dir| absolutize("data_dir", dir))
                .transpose()?,
            pooling: options.pooling.unwrap_or(false),
            port,
            server_config,
            connect_options: options.connect_options.unwrap_or_default(),
            bin_dir: options
                .bin_dir
                .map(|dir| absolutize("bin_dir", dir))
                .transpose()?,
            startup_timeout: options
                .startup_timeout_ms
                .map_or(DEFAULT_STARTUP_TIMEOUT, Duration::from_millis),
            shutdown_timeout: options
                .shutdown_timeout_ms
                .map_or(DEFAULT_SHUTDOWN_TIMEOUT, Duration::from_millis),
            clean_data_dir: options.clean_data_dir.unwrap_or(true),
            auth_method: options.auth_method.unwrap_or_default(),
        })
    }

    /// Role the caller connects as.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Password of that role.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Database the caller connects to.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Caller-owned data directory, if any.
    #[must_use]
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Whether the connection is advertised for pooled use.
    #[must_use]
    pub fn pooling(&self) -> bool {
        self.pooling
    }

    /// Port choice.
    #[must_use]
    pub fn port(&self) -> PortSelection {
        self.port
    }

    /// Effective server settings, defaults included.
    #[must_use]
    pub fn server_config(&self) -> &BTreeMap<String, String> {
        &self.server_config
    }

    /// Extra client connection options.
    #[must_use]
    pub fn connect_options(&self) -> &BTreeMap<String, String> {
        &self.connect_options
    }

    /// Explicit binary directory, if any.
    #[must_use]
    pub fn bin_dir(&self) -> Option<&Path> {
        self.bin_dir.as_deref()
    }

    /// Readiness deadline.
    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        self.startup_timeout
    }

    /// Grace period before a stuck server is killed.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Whether an internal data directory is removed on close.
    #[must_use]
    pub fn clean_data_dir(&self) -> bool {
        self.clean_data_dir
    }

    /// Cluster authentication method.
    #[must_use]
    pub fn auth_method(&self) -> AuthMethod {
        self.auth_method
    }

    /// Whether the caller's role is the bootstrap superuser.
    #[must_use]
    pub fn uses_superuser(&self) -> bool {
        self.username == SUPERUSER
    }

    /// Expands back into fully populated options, e.g. for display.
    #[must_use]
    pub fn to_options(&self) -> InstanceOptions {
        let (port, port_range) = match self.port {
            PortSelection::Fixed(port) => (Some(port.value()), None),
            PortSelection::Auto(range) => (
                None,
                Some(PortRangeConfig {
                    min: range.min().value(),
                    max: Some(range.max().value()),
                    max_offset: None,
                }),
            ),
        };
        InstanceOptions {
            username: Some(self.username.clone()),
            password: Some(self.password.clone()),
            database: Some(self.database.clone()),
            data_dir: self.data_dir.clone(),
            pooling: Some(self.pooling),
            port,
            port_range,
            server_config: Some(self.server_config.clone()),
            connect_options: Some(self.connect_options.clone()),
            bin_dir: self.bin_dir.clone(),
            startup_timeout_ms: Some(duration_ms(self.startup_timeout)),
            shutdown_timeout_ms: Some(duration_ms(self.shutdown_timeout)),
            clean_data_dir: self.data_dir.is_none().then_some(self.clean_data_dir),
            auth_method: Some(self.auth_method),
        }
    }
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            data_dir: None,
            pooling: false,
            port: PortSelection::Auto(PortRange::DYNAMIC),
            server_config: default_server_config(),
            connect_options: BTreeMap::new(),
            bin_dir: None,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            clean_data_dir: true,
            auth_method: AuthMethod::Trust,
        }
    }
}

fn absolutize(field: &str, path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().map_err(|e| {
        Error::configuration(field, format!("cannot resolve relative path: {e}"))
    })?;
    Ok(cwd.join(path))
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
