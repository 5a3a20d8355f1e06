//! Main entry point for the epg CLI.
//!
//! - `start`: start a server, print its connection parameters, stop it on
//!   stdin EOF
//! - `init`: initialize a cluster without starting it
//! - `port`: allocate a free port
//! - `clean`: sweep stale data directories
//! - `show-config`: print the merged configuration

use clap::Parser;
use epg_cli::cli::{self, Cli};
use epg_cli::utils::GlobalOptions;

fn main() {
    let cli = Cli::parse();

    epg::init_logger(cli.verbose, cli.quiet);

    let global = GlobalOptions {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config_dir: cli.config_dir,
    };

    let result = match cli.command {
        cli::Command::Start(cmd) => cmd.execute(&global),
        cli::Command::Init(cmd) => cmd.execute(&global),
        cli::Command::Port(cmd) => cmd.execute(&global),
        cli::Command::Clean(cmd) => cmd.execute(&global),
        cli::Command::ShowConfig(cmd) => cmd.execute(&global),
        cli::Command::Completions(cmd) => cmd.execute(&global),
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
