//! Port command implementation.
//!
//! Prints a port that is free on this host right now. The port is not held
//! once the command exits.

use crate::error::CliError;
use crate::utils::{load_configuration, GlobalOptions};
use clap::Args;
use epg::config::{InstanceOptions, PortRangeConfig};
use epg::Provisioner;

/// Allocate and print a free port.
#[derive(Args)]
pub struct PortCommand {
    /// Lowest acceptable port (uses configuration if not specified)
    #[arg(long)]
    pub min: Option<u16>,

    /// Highest acceptable port
    #[arg(long, requires = "min")]
    pub max: Option<u16>,
}

impl PortCommand {
    /// Execute the port command.
    pub fn execute(self, global: &GlobalOptions) -> Result<(), CliError> {
        let overrides = InstanceOptions {
            port_range: self.min.map(|min| PortRangeConfig {
                min,
                max: self.max,
                max_offset: None,
            }),
            ..InstanceOptions::default()
        };
        let config = load_configuration(global, overrides)?;

        let reservation = Provisioner::default().reserve_port(config.port())?;
        println!("{}", reservation.port());
        Ok(())
    }
}
