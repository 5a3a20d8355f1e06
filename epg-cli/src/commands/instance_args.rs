//! Instance options shared by `start` and `show-config`.

use crate::utils::parse_key_value;
use clap::Args;
use epg::config::{AuthMethod, InstanceOptions};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

/// Flags that override configuration files and `EPG_*` variables.
#[derive(Args, Debug, Default, Clone)]
pub struct InstanceArgs {
    /// Role to create and connect as
    #[arg(long, short = 'u')]
    pub username: Option<String>,

    /// Password for that role
    #[arg(long)]
    pub password: Option<String>,

    /// Database to create and connect to
    #[arg(long, short = 'd')]
    pub database: Option<String>,

    /// Use (and keep) this data directory instead of a temporary one
    #[arg(long, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Listen on this port instead of allocating one
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Mark the connection as intended for a pool
    #[arg(long)]
    pub pooling: bool,

    /// Directory holding initdb and postgres
    #[arg(long, value_name = "PATH")]
    pub bin_dir: Option<PathBuf>,

    /// Readiness deadline in milliseconds
    #[arg(long, value_name = "MS")]
    pub startup_timeout_ms: Option<u64>,

    /// Grace period before a stuck server is killed, in milliseconds
    #[arg(long, value_name = "MS")]
    pub shutdown_timeout_ms: Option<u64>,

    /// Keep the temporary data directory after the server stops
    #[arg(long)]
    pub keep_data_dir: bool,

    /// Authentication method (trust or password)
    #[arg(long, value_name = "METHOD", value_parser = AuthMethod::from_str)]
    pub auth: Option<AuthMethod>,

    /// Server setting passed as `-c key=value` (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub settings: Vec<(String, String)>,
}

impl InstanceArgs {
    /// The flags as a configuration layer; unset flags stay `None`.
    pub fn to_options(&self) -> InstanceOptions {
        InstanceOptions {
            username: self.username.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            data_dir: self.data_dir.clone(),
            pooling: self.pooling.then_some(true),
            port: self.port,
            bin_dir: self.bin_dir.clone(),
            startup_timeout_ms: self.startup_timeout_ms,
            shutdown_timeout_ms: self.shutdown_timeout_ms,
            clean_data_dir: self.keep_data_dir.then_some(false),
            auth_method: self.auth,
            server_config: (!self.settings.is_empty())
                .then(|| self.settings.iter().cloned().collect::<BTreeMap<_, _>>()),
            ..InstanceOptions::default()
        }
    }
}
