//! Configuration schema definitions.
//!
//! [`InstanceOptions`] is the shape of every configuration layer: YAML
//! files, environment variables and programmatic overrides all produce one,
//! and the layers are merged field by field before validation.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// User-facing options for one instance. Every field is optional; unset
/// fields fall back to the next-lower layer and finally to built-in
/// defaults.
///
/// # Examples
///
/// ```
/// use epg::config::InstanceOptions;
///
/// let options: InstanceOptions = serde_yaml::from_str(
///     "username: alice\ndatabase: first_db\npooling: true\n",
/// )
/// .unwrap();
/// assert_eq!(options.username.as_deref(), Some("alice"));
/// assert_eq!(options.pooling, Some(true));
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InstanceOptions {
    /// Role the caller connects as.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password for that role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Database the caller connects to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Caller-owned data directory; never deleted by epg.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Advertise the connection as intended for a pool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pooling: Option<bool>,

    /// Fixed port; `0` or unset means auto-allocate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Range searched by auto-allocation (conflicts with a fixed port).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_range: Option<PortRangeConfig>,

    /// Server settings passed as `-c key=value`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_config: Option<BTreeMap<String, String>>,

    /// Extra client connection options, rendered into the connection URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_options: Option<BTreeMap<String, String>>,

    /// Directory holding `initdb` and `postgres`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin_dir: Option<PathBuf>,

    /// Readiness deadline in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_timeout_ms: Option<u64>,

    /// Grace period before a stuck server is killed, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutdown_timeout_ms: Option<u64>,

    /// Delete internally created data directories on close.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean_data_dir: Option<bool>,

    /// Authentication method configured by initdb.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<AuthMethod>,
}

/// Port range for auto-allocation. Either `max` or `max_offset` can be
/// given, not both; with neither the range runs to 65535.
///
/// # Examples
///
/// ```
/// use epg::config::PortRangeConfig;
///
/// let config = PortRangeConfig {
///     min: 50000,
///     max: None,
///     max_offset: Some(99),
/// };
/// assert_eq!(config.to_range().unwrap().max().value(), 50099);
/// ```
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PortRangeConfig {
    /// Lowest port in the range.
    pub min: u16,

    /// Highest port in the range (mutually exclusive with `max_offset`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<u16>,

    /// Offset from `min` to the highest port (mutually exclusive with `max`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_offset: Option<u16>,
}

impl PortRangeConfig {
    /// Resolves to a concrete [`PortRange`](crate::PortRange).
    ///
    /// # Errors
    ///
    /// Returns a configuration error if both `max` and `max_offset` are set,
    /// the offset overflows, or the bounds are invalid.
    pub fn to_range(&self) -> crate::Result<crate::PortRange> {
        let max = match (self.max, self.max_offset) {
            (Some(_), Some(_)) => {
                return Err(crate::Error::configuration(
                    "port_range",
                    "max and max_offset are mutually exclusive",
                ))
            }
            (Some(max), None) => max,
            (None, Some(offset)) => self.min.checked_add(offset).ok_or_else(|| {
                crate::Error::configuration("port_range", "min + max_offset exceeds 65535")
            })?,
            (None, None) => u16::MAX,
        };
        crate::PortRange::from_bounds(self.min, max)
    }
}

/// How the cluster authenticates local TCP connections.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// Any local connection is accepted.
    #[default]
    Trust,
    /// Passwords are checked (scram-sha-256).
    Password,
}

impl AuthMethod {
    /// The value initdb expects for `--auth`.
    #[must_use]
    pub fn initdb_value(self) -> &'static str {
        match self {
            Self::Trust => "trust",
            Self::Password => "scram-sha-256",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trust => write!(f, "trust"),
            Self::Password => write!(f, "password"),
        }
    }
}

impl FromStr for AuthMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trust" => Ok(Self::Trust),
            "password" | "scram" | "scram-sha-256" => Ok(Self::Password),
            other => Err(format!(
                "unknown auth method '{other}' (expected trust or password)"
            )),
        }
    }
}
