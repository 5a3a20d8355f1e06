//! Show-config command implementation.

use crate::commands::InstanceArgs;
use crate::error::CliError;
use crate::utils::{config_builder, GlobalOptions};
use clap::Args;

/// Print the merged configuration as YAML.
#[derive(Args)]
pub struct ShowConfigCommand {
    #[command(flatten)]
    pub instance: InstanceArgs,

    /// Validate and include built-in defaults
    #[arg(long)]
    pub resolved: bool,
}

impl ShowConfigCommand {
    /// Execute the show-config command.
    pub fn execute(self, global: &GlobalOptions) -> Result<(), CliError> {
        let builder = config_builder(global, self.instance.to_options());
        let options = if self.resolved {
            builder.build()?.to_options()
        } else {
            builder.load_options()?
        };

        let yaml = serde_yaml::to_string(&options)
            .map_err(|e| CliError::Config(format!("Failed to serialize config: {e}")))?;
        print!("{yaml}");
        Ok(())
    }
}
