//! Configuration validation.
//!
//! Everything here is checked before a port, directory or process is
//! touched, so a rejected configuration leaves nothing behind.

use std::collections::BTreeMap;

use crate::config::schema::{AuthMethod, InstanceOptions};
use crate::error::{Error, Result};

/// PostgreSQL truncates identifiers longer than this (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Server settings epg controls itself.
const RESERVED_SERVER_SETTINGS: &[&str] = &[
    "port",
    "listen_addresses",
    "unix_socket_directories",
    "data_directory",
    "config_file",
    "hba_file",
    "ident_file",
];

/// Validates merged [`InstanceOptions`].
///
/// # Examples
///
/// ```
/// use epg::config::{ConfigValidator, InstanceOptions};
///
/// ConfigValidator::validate(&InstanceOptions::default()).unwrap();
///
/// let bad = InstanceOptions { database: Some("no spaces".into()), ..Default::default() };
/// assert!(ConfigValidator::validate(&bad).is_err());
/// ```
pub struct ConfigValidator;

impl ConfigValidator {
    /// Checks every option and every cross-option constraint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] (or [`Error::InvalidPortRange`]) for
    /// the first problem found.
    pub fn validate(options: &InstanceOptions) -> Result<()> {
        if let Some(ref username) = options.username {
            Self::validate_identifier("username", username)?;
            if username.starts_with("pg_") {
                return Err(Error::configuration(
                    "username",
                    "names starting with pg_ are reserved by PostgreSQL",
                ));
            }
        }
        if let Some(ref database) = options.database {
            Self::validate_identifier("database", database)?;
        }
        if let Some(ref password) = options.password {
            if password.contains('\0') {
                return Err(Error::configuration("password", "cannot contain null bytes"));
            }
        }
        if options.auth_method == Some(AuthMethod::Password)
            && options.password.as_deref().map_or(true, str::is_empty)
        {
            return Err(Error::configuration(
                "password",
                "password authentication requires a non-empty password",
            ));
        }

        Self::validate_ports(options)?;

        if let Some(ref dir) = options.data_dir {
            if dir.as_os_str().is_empty() {
                return Err(Error::configuration("data_dir", "cannot be empty"));
            }
            if options.clean_data_dir == Some(true) {
                return Err(Error::configuration(
                    "clean_data_dir",
                    "a caller-supplied data_dir is never deleted; drop clean_data_dir or data_dir",
                ));
            }
        }
        if let Some(ref dir) = options.bin_dir {
            if dir.as_os_str().is_empty() {
                return Err(Error::configuration("bin_dir", "cannot be empty"));
            }
        }

        if options.startup_timeout_ms == Some(0) {
            return Err(Error::configuration(
                "startup_timeout_ms",
                "must be greater than 0",
            ));
        }
        if options.shutdown_timeout_ms == Some(0) {
            return Err(Error::configuration(
                "shutdown_timeout_ms",
                "must be greater than 0",
            ));
        }

        if let Some(ref settings) = options.server_config {
            Self::validate_server_config(settings)?;
        }
        if let Some(ref connect) = options.connect_options {
            for key in connect.keys() {
                if key.trim().is_empty() {
                    return Err(Error::configuration("connect_options", "empty option name"));
                }
            }
        }

        Ok(())
    }

    /// Role and database names: 1-63 ASCII letters, digits or underscores,
    /// not starting with a digit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming `field` if `value` is not a
    /// plain identifier.
    pub fn validate_identifier(field: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            return Err(Error::configuration(field, "cannot be empty"));
        }
        if value.len() > MAX_IDENTIFIER_LEN {
            return Err(Error::configuration(
                field,
                format!("cannot exceed {MAX_IDENTIFIER_LEN} characters"),
            ));
        }
        if value.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(Error::configuration(field, "cannot start with a digit"));
        }
        if let Some(bad) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
        {
            return Err(Error::configuration(
                field,
                format!("invalid character {bad:?} (use letters, digits and underscores)"),
            ));
        }
        Ok(())
    }

    fn validate_ports(options: &InstanceOptions) -> Result<()> {
        let fixed = options.port.filter(|&p| p != 0);
        if fixed.is_some() && options.port_range.is_some() {
            return Err(Error::configuration(
                "port",
                "a fixed port and an auto-allocation port_range are mutually exclusive",
            ));
        }
        if let Some(ref range) = options.port_range {
            range.to_range()?;
        }
        Ok(())
    }

    fn validate_server_config(settings: &BTreeMap<String, String>) -> Result<()> {
        for (key, value) in settings {
            let lowered = key.to_ascii_lowercase();
            if RESERVED_SERVER_SETTINGS.contains(&lowered.as_str()) {
                return Err(Error::configuration(
                    "server_config",
                    format!("'{key}' is managed by epg and cannot be overridden"),
                ));
            }
            let valid_key = !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
            if !valid_key {
                return Err(Error::configuration(
                    "server_config",
                    format!("invalid setting name '{key}'"),
                ));
            }
            if value.contains('\0') {
                return Err(Error::configuration(
                    "server_config",
                    format!("value of '{key}' contains a null byte"),
                ));
            }
        }
        Ok(())
    }
}
