//! Common test utilities for integration tests.
//!
//! Tests that need a real server get a [`PgEnv`] through [`PgEnv::new`],
//! which returns `None` (after a note on stderr) when PostgreSQL is not
//! installed or the tests run as root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use epg::config::InstanceOptions;
use epg::{Instance, PgBinaries, PortRegistry, Provisioner, Result};
use tempfile::TempDir;

/// Isolated provisioner with its own registry and temp root.
#[allow(dead_code)]
pub struct PgEnv {
    /// Kept alive for the duration of the test.
    temp_dir: TempDir,
    /// Provisioner creating internal directories under `temp_root()`.
    pub provisioner: Provisioner,
    bin_dir: PathBuf,
}

#[allow(dead_code)]
impl PgEnv {
    /// A fresh environment, or `None` if servers cannot run here.
    pub fn new() -> Option<Self> {
        Self::with_registry(PortRegistry::shared())
    }

    /// Like [`PgEnv::new`] but sharing `registry`.
    pub fn with_registry(registry: Arc<PortRegistry>) -> Option<Self> {
        if nix::unistd::geteuid().is_root() {
            eprintln!("skipping: PostgreSQL refuses to run as root");
            return None;
        }
        let configured = std::env::var_os("EPG_BIN_DIR").map(PathBuf::from);
        let binaries = match PgBinaries::locate(configured.as_deref()) {
            Ok(binaries) => binaries,
            Err(e) => {
                eprintln!("skipping: {e}");
                return None;
            }
        };
        let bin_dir = binaries.bin_dir()?.to_path_buf();

        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let provisioner = Provisioner::new(registry).with_temp_root(temp_dir.path().join("tmp"));
        Some(Self {
            temp_dir,
            provisioner,
            bin_dir,
        })
    }

    /// Options pointing at the located binaries.
    pub fn options(&self) -> InstanceOptions {
        InstanceOptions {
            bin_dir: Some(self.bin_dir.clone()),
            ..InstanceOptions::default()
        }
    }

    /// Starts an instance with `options` on top of [`PgEnv::options`].
    pub fn start(&self, options: InstanceOptions) -> Result<Instance> {
        self.provisioner.start_with(InstanceOptions {
            bin_dir: Some(self.bin_dir.clone()),
            ..options
        })
    }

    /// Root of the test's scratch space.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Where internal data directories are created.
    pub fn temp_root(&self) -> PathBuf {
        self.temp_dir.path().join("tmp")
    }

    /// Number of entries left under the temp root.
    pub fn leftover_dirs(&self) -> usize {
        std::fs::read_dir(self.temp_root())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Database names visible to `instance`'s role.
#[allow(dead_code)]
pub fn database_names(instance: &Instance) -> Vec<String> {
    let mut client = instance.connect().expect("connect");
    client
        .query(
            "SELECT datname FROM pg_database WHERE NOT datistemplate ORDER BY datname",
            &[],
        )
        .expect("list databases")
        .iter()
        .map(|row| row.get(0))
        .collect()
}
