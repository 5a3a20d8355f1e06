#![deny(missing_docs, unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # epg
//!
//! Embedded PostgreSQL for tests: start a real, throwaway PostgreSQL server
//! per test or per process, connect to it, and have every trace of it
//! removed on close.
//!
//! ## Core Types
//!
//! - [`Provisioner`]: starts instances; owns the shared [`PortRegistry`]
//! - [`Instance`]: a running server; hands out [`ConnectionParams`] and
//!   closes idempotently
//! - [`InstanceConfig`]: validated options, built from
//!   [`config::InstanceOptions`] or the layered [`ConfigBuilder`]
//! - [`Port`] and [`PortRange`]: network port types with validation
//! - [`Error`] and [`Result`]: error handling types
//! - [`Logger`] and [`LogLevel`]: logging infrastructure
//!
//! ## Examples
//!
//! ```no_run
//! use epg::config::InstanceOptions;
//! use epg::Provisioner;
//!
//! let provisioner = Provisioner::default();
//! let mut instance = provisioner
//!     .start_with(InstanceOptions {
//!         username: Some("alice".into()),
//!         database: Some("first_db".into()),
//!         ..Default::default()
//!     })
//!     .unwrap();
//!
//! let params = instance.connection_params().unwrap();
//! println!("{}", params.url().unwrap());
//!
//! instance.close().into_result().unwrap();
//! ```
//!
//! Only Unix platforms are supported.

pub mod bootstrap;
pub mod config;
pub mod connection;
pub mod data_dir;
pub mod error;
pub mod instance;
pub mod logging;
pub mod output;
pub mod port;
pub mod provisioner;
pub mod server;

// Re-export key types at crate root for convenience
pub use bootstrap::BootstrapOutcome;
pub use config::{ConfigBuilder, InstanceConfig, PortSelection};
pub use connection::ConnectionParams;
pub use data_dir::{DataDirectoryManager, DirectoryDisposition, KeepReason, Ownership, SweepReport};
pub use error::{Error, ErrorKind, Result};
pub use instance::{CloseReport, Instance};
pub use logging::{init_logger, LogLevel, Logger};
pub use port::{Port, PortAllocator, PortRange, PortRegistry, PortReservation};
pub use provisioner::Provisioner;
pub use server::{InitOutcome, PgBinaries, ServerProcess, ServerState};
