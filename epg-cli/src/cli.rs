//! CLI structure and command definitions.
//!
//! Global options come first, then one subcommand per operation.

use crate::commands::{
    CleanCommand, CompletionsCommand, InitCommand, PortCommand, ShowConfigCommand, StartCommand,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Start throwaway PostgreSQL servers.
#[derive(Parser)]
#[command(name = "epg")]
#[command(version, about = "Start throwaway PostgreSQL servers", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Directory holding the user config.yaml (default: ~/.config/epg)
    #[arg(long, value_name = "PATH", global = true, env = "EPG_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand)]
pub enum Command {
    /// Start a server and print how to connect to it
    Start(StartCommand),

    /// Initialize a cluster in a directory without starting it
    Init(InitCommand),

    /// Allocate and print a free port
    Port(PortCommand),

    /// Remove data directories left behind by crashed runs
    Clean(CleanCommand),

    /// Print the merged configuration as YAML
    ShowConfig(ShowConfigCommand),

    /// Generate shell completion scripts
    Completions(CompletionsCommand),
}
