//! Configuration for embedded PostgreSQL instances.
//!
//! Options come from several layers, merged field by field (highest wins):
//!
//! 1. Programmatic overrides (via [`ConfigBuilder::with_options`])
//! 2. Environment variables (`EPG_*`)
//! 3. Private project config (`epg.local.yaml`)
//! 4. Project config (`epg.yaml`, nearest one walking up)
//! 5. User config (`~/.config/epg/config.yaml`)
//! 6. Built-in defaults
//!
//! The merged [`InstanceOptions`] are validated once by
//! [`InstanceConfig::new`]; the resulting [`InstanceConfig`] never changes.
//!
//! # Examples
//!
//! Loading every layer for the current directory:
//!
//! ```no_run
//! use epg::config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new().build().unwrap();
//! println!("connecting as {}", config.username());
//! ```
//!
//! Purely programmatic:
//!
//! ```
//! use epg::config::{InstanceConfig, InstanceOptions};
//!
//! let config = InstanceConfig::new(InstanceOptions {
//!     username: Some("user1".into()),
//!     database: Some("db1".into()),
//!     pooling: Some(true),
//!     ..Default::default()
//! })
//! .unwrap();
//! assert!(config.pooling());
//! ```

pub mod builder;
pub mod environment;
pub mod instance;
pub mod loader;
pub mod merger;
pub mod schema;
pub mod validator;

pub use builder::ConfigBuilder;
pub use environment::EnvironmentConfig;
pub use instance::{
    default_server_config, InstanceConfig, PortSelection, DEFAULT_DATABASE, DEFAULT_PASSWORD,
    DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_STARTUP_TIMEOUT, DEFAULT_USERNAME, SUPERUSER,
};
pub use loader::{ConfigLoader, ConfigSource, LOCAL_CONFIG_FILE, PROJECT_CONFIG_FILE};
pub use merger::ConfigMerger;
pub use schema::{AuthMethod, InstanceOptions, PortRangeConfig};
pub use validator::ConfigValidator;
