//! Library exports for epg-cli.
//!
//! The CLI structure is exposed so integration tests and documentation
//! tooling can inspect it.

pub mod cli;
pub mod commands;
pub mod error;
pub mod utils;

pub use cli::Cli;
