//! Common test utilities for CLI integration tests.
//!
//! Every command runs with an isolated user config directory, a private
//! `TMPDIR`, the temp directory as working directory and no inherited
//! `EPG_*` variables.

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const EPG_VARS: &[&str] = &[
    "EPG_USERNAME",
    "EPG_PASSWORD",
    "EPG_DATABASE",
    "EPG_DATA_DIR",
    "EPG_PORT",
    "EPG_POOLING",
    "EPG_STARTUP_TIMEOUT_MS",
    "EPG_SHUTDOWN_TIMEOUT_MS",
    "EPG_CLEAN_DATA_DIR",
    "EPG_AUTH_METHOD",
    "EPG_SERVER_CONFIG",
    "EPG_CONFIG_DIR",
    "EPG_LOG_MODE",
];

/// Test environment with isolated configuration and temp directories.
pub struct TestEnv {
    /// Temporary directory (kept alive for the duration of the test)
    #[allow(dead_code)]
    temp_dir: TempDir,
    /// Path to the temporary directory
    pub temp_path: PathBuf,
    /// User configuration directory passed via `--config-dir`
    pub config_dir: PathBuf,
    /// `TMPDIR` for the child, where internal data directories land
    pub tmp: PathBuf,
}

#[allow(dead_code)]
impl TestEnv {
    /// Create a new test environment.
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let temp_path = temp_dir.path().to_path_buf();
        let config_dir = temp_path.join("user-config");
        let tmp = temp_path.join("tmp");
        std::fs::create_dir_all(&tmp).expect("Failed to create tmp dir");

        Self {
            temp_dir,
            temp_path,
            config_dir,
            tmp,
        }
    }

    /// The epg binary with the isolation applied.
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("epg").expect("Failed to find epg binary");
        for var in EPG_VARS {
            cmd.env_remove(var);
        }
        cmd.env("TMPDIR", &self.tmp)
            .current_dir(&self.temp_path)
            .arg("--config-dir")
            .arg(&self.config_dir);
        cmd
    }

    /// Get the temp path.
    pub fn path(&self) -> &Path {
        &self.temp_path
    }

    /// Create a subdirectory in the test environment.
    pub fn create_dir(&self, name: &str) -> PathBuf {
        let path = self.temp_path.join(name);
        std::fs::create_dir_all(&path).expect("Failed to create test directory");
        path
    }

    /// Write a file relative to the temp path.
    pub fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_path.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&path, contents).expect("Failed to write file");
        path
    }

    /// Entries left in the child's `TMPDIR`.
    pub fn leftover_tmp_entries(&self) -> usize {
        std::fs::read_dir(&self.tmp)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Directory of a usable PostgreSQL installation, or `None` (with a note on
/// stderr) when servers cannot run here.
#[allow(dead_code)]
pub fn postgres_bin_dir() -> Option<PathBuf> {
    if nix::unistd::geteuid().is_root() {
        eprintln!("skipping: PostgreSQL refuses to run as root");
        return None;
    }
    let configured = std::env::var_os("EPG_BIN_DIR").map(PathBuf::from);
    match epg::PgBinaries::locate(configured.as_deref()) {
        Ok(binaries) => binaries.bin_dir().map(Path::to_path_buf),
        Err(e) => {
            eprintln!("skipping: {e}");
            None
        }
    }
}

/// Helper to parse a port number from command output.
#[allow(dead_code)]
pub fn parse_port(output: &str) -> u16 {
    output
        .trim()
        .parse()
        .expect("Output is not a valid port number")
}
