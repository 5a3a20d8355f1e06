//! Start command implementation.
//!
//! Starts one server, prints its connection parameters and keeps it up
//! until stdin reaches EOF or the process receives SIGINT, SIGTERM or
//! SIGHUP. The server is always closed before the command returns.

use crate::commands::InstanceArgs;
use crate::error::CliError;
use crate::utils::{load_configuration, GlobalOptions};
use clap::Args;
use epg::output::{OutputFormat, ShellType};
use epg::{DirectoryDisposition, Provisioner};
use nix::sys::signal::{SigSet, Signal};
use std::io::{self, Write};
use std::sync::mpsc;
use std::thread;

/// Start a server and print how to connect to it.
#[derive(Args)]
pub struct StartCommand {
    #[command(flatten)]
    pub instance: InstanceArgs,

    /// Output format: export, json, dotenv or human
    #[arg(long, short = 'f', default_value = "human")]
    pub format: String,

    /// Shell for `--format export` (default: detected from $SHELL)
    #[arg(long, value_name = "SHELL")]
    pub shell: Option<String>,
}

/// Why the command stopped waiting.
enum StopReason {
    Eof,
    Signal(Signal),
}

impl StartCommand {
    /// Execute the start command.
    pub fn execute(self, global: &GlobalOptions) -> Result<(), CliError> {
        let shell = self
            .shell
            .as_deref()
            .map(str::parse::<ShellType>)
            .transpose()
            .map_err(|e| CliError::InvalidArguments(e.to_string()))?;
        let format = OutputFormat::parse(&self.format, shell)
            .map_err(|e| CliError::InvalidArguments(e.to_string()))?;
        let config = load_configuration(global, self.instance.to_options())?;

        // Blocked before any thread exists so every thread inherits the mask
        // and the signals are only ever consumed by the waiter below.
        let mut signals = SigSet::empty();
        signals.add(Signal::SIGINT);
        signals.add(Signal::SIGTERM);
        signals.add(Signal::SIGHUP);
        signals.thread_block().map_err(io::Error::from)?;

        let mut instance = Provisioner::default().start(config)?;

        let params = instance
            .connection_params()
            .ok_or(epg::Error::InstanceClosed)?;
        let rendered = format.create_formatter().format(params)?;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{rendered}")?;
        stdout.flush()?;
        drop(stdout);

        if !global.quiet {
            eprintln!(
                "Server running (pid {}). Close stdin or press Ctrl-C to stop.",
                instance.pid().unwrap_or_default()
            );
        }

        let reason = wait_for_stop(signals);
        match reason {
            StopReason::Eof => log::info!("stdin closed, stopping server"),
            StopReason::Signal(signal) => log::info!("received {signal}, stopping server"),
        }

        let data_dir = instance.data_dir().to_path_buf();
        let report = instance.close();
        if !global.quiet {
            match report.data_dir {
                Some(DirectoryDisposition::Removed) => {
                    eprintln!("Server stopped; removed {}", data_dir.display());
                }
                Some(DirectoryDisposition::Kept(_)) => {
                    eprintln!("Server stopped; data kept in {}", data_dir.display());
                }
                None => {}
            }
        }
        report.into_result().map_err(CliError::from)
    }
}

/// Blocks until stdin hits EOF or one of `signals` arrives.
fn wait_for_stop(signals: SigSet) -> StopReason {
    let (tx, rx) = mpsc::channel();

    let eof_tx = tx.clone();
    thread::spawn(move || {
        // read errors count as EOF
        let _ = io::copy(&mut io::stdin().lock(), &mut io::sink());
        let _ = eof_tx.send(StopReason::Eof);
    });

    thread::spawn(move || {
        if let Ok(signal) = signals.wait() {
            let _ = tx.send(StopReason::Signal(signal));
        }
    });

    rx.recv().unwrap_or(StopReason::Eof)
}
