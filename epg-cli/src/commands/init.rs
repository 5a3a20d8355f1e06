//! Init command implementation.
//!
//! Runs initdb in a directory without starting a server, so later `start
//! --data-dir` runs reuse the cluster.

use crate::error::CliError;
use crate::utils::{load_configuration, GlobalOptions};
use clap::Args;
use epg::config::{AuthMethod, InstanceOptions};
use epg::server::initdb::initialize_cluster;
use epg::{InitOutcome, PgBinaries};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

/// Initialize a cluster in a directory without starting it.
#[derive(Args)]
pub struct InitCommand {
    /// Directory to initialize (created if missing)
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Directory holding initdb and postgres
    #[arg(long, value_name = "PATH")]
    pub bin_dir: Option<PathBuf>,

    /// Authentication method (trust or password)
    #[arg(long, value_name = "METHOD", value_parser = AuthMethod::from_str)]
    pub auth: Option<AuthMethod>,

    /// Superuser password when using password authentication
    #[arg(long)]
    pub password: Option<String>,

    /// Preview actions without executing
    #[arg(long)]
    pub dry_run: bool,
}

impl InitCommand {
    /// Execute the init command.
    pub fn execute(self, global: &GlobalOptions) -> Result<(), CliError> {
        let config = load_configuration(
            global,
            InstanceOptions {
                data_dir: Some(self.dir),
                bin_dir: self.bin_dir,
                auth_method: self.auth,
                password: self.password,
                ..InstanceOptions::default()
            },
        )?;
        let dir = config
            .data_dir()
            .ok_or_else(|| CliError::InvalidArguments("a directory is required".to_string()))?
            .to_path_buf();
        let binaries = PgBinaries::locate(config.bin_dir())?;

        if self.dry_run {
            println!("Dry-run mode: no changes will be made");
            println!();
            println!("Would initialize a cluster in: {}", dir.display());
            println!("  - initdb: {}", binaries.initdb.display());
            println!("  - authentication: {}", config.auth_method());
            if epg::server::initdb::has_cluster(&dir) {
                println!("  - Cluster already present, nothing to do");
            } else if !dir.exists() {
                println!("  - Create directory: {}", dir.display());
            }
            return Ok(());
        }

        if dir.exists() && !dir.is_dir() {
            return Err(CliError::InvalidArguments(format!(
                "{} exists and is not a directory",
                dir.display()
            )));
        }
        fs::create_dir_all(&dir)?;

        match initialize_cluster(&binaries, &dir, &config)? {
            InitOutcome::Initialized => println!("Initialized cluster in: {}", dir.display()),
            InitOutcome::Reused => println!("Cluster already present in: {}", dir.display()),
        }
        Ok(())
    }
}
