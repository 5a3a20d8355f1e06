//! Build script for epg-cli.
//!
//! Renders the `epg.1` man page into `OUT_DIR` with clap_mangen. Build
//! scripts cannot depend on the crate being built, so the command tree is
//! declared here again.

use clap::{Arg, Command};
use clap_mangen::Man;
use std::fs;
use std::path::PathBuf;

/// Keep in sync with src/cli.rs.
fn build_cli() -> Command {
    Command::new("epg")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Start throwaway PostgreSQL servers")
        .long_about(
            "Start a real, throwaway PostgreSQL server, print how to connect to it, \
             and remove every trace of it when done",
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .help("Enable verbose output")
                .global(true)
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .help("Suppress non-essential output")
                .global(true)
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-dir")
                .long("config-dir")
                .help("Directory holding the user config.yaml")
                .value_name("PATH")
                .global(true)
                .env("EPG_CONFIG_DIR"),
        )
        .subcommands(vec![
            Command::new("start")
                .about("Start a server and print how to connect to it")
                .long_about(
                    "Start a server, print its connection parameters, and stop it when \
                     stdin closes or on SIGINT/SIGTERM/SIGHUP",
                ),
            Command::new("init")
                .about("Initialize a cluster in a directory without starting it")
                .long_about("Run initdb in a directory so later starts can reuse the cluster"),
            Command::new("port")
                .about("Allocate and print a free port")
                .long_about("Print a port that is currently free on this host"),
            Command::new("clean")
                .about("Remove data directories left behind by crashed runs")
                .long_about("Sweep stale epg-* data directories whose owner is gone"),
            Command::new("show-config")
                .about("Print the merged configuration as YAML")
                .long_about("Merge configuration files, EPG_* variables and flags, then print"),
            Command::new("completions")
                .about("Generate shell completion scripts")
                .long_about("Generate shell completion scripts for bash, zsh, fish, or PowerShell"),
        ])
}

fn main() {
    let out_dir = PathBuf::from(std::env::var("OUT_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).unwrap();

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).unwrap();
    fs::write(man_dir.join("epg.1"), buffer).unwrap();

    println!("cargo:rerun-if-changed=src/cli.rs");
    println!("cargo:rerun-if-changed=src/commands/");
}
