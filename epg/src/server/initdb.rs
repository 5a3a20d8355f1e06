//! One-time cluster creation with `initdb`.

use std::io::Write;
use std::path::Path;
use std::process::Command;

use tempfile::NamedTempFile;

use super::binaries::PgBinaries;
use crate::config::{AuthMethod, InstanceConfig, SUPERUSER};
use crate::data_dir::VERSION_FILE;
use crate::error::{Error, Result};

/// Whether a cluster was created or an existing one adopted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// `initdb` ran.
    Initialized,
    /// The directory already held a cluster.
    Reused,
}

/// Whether `dir` already holds a cluster.
#[must_use]
pub fn has_cluster(dir: &Path) -> bool {
    dir.join(VERSION_FILE).is_file()
}

/// Runs `initdb` in `dir` unless it already holds a cluster.
///
/// The superuser is always `postgres`. With password authentication its
/// password is the configured one, handed over through a temporary
/// `--pwfile` that is removed afterwards.
///
/// # Errors
///
/// Returns [`Error::Launch`] if `initdb` cannot be spawned and
/// [`Error::Initialization`] with its output if it exits unsuccessfully.
pub fn initialize_cluster(
    binaries: &PgBinaries,
    dir: &Path,
    config: &InstanceConfig,
) -> Result<InitOutcome> {
    if has_cluster(dir) {
        log::info!("reusing existing cluster in {}", dir.display());
        return Ok(InitOutcome::Reused);
    }

    let mut cmd = Command::new(&binaries.initdb);
    cmd.arg("-D")
        .arg(dir)
        .args(["-U", SUPERUSER, "-E", "UTF8", "--no-locale", "--no-sync"])
        .arg(format!("--auth={}", config.auth_method().initdb_value()));

    // must outlive the initdb run
    let _pwfile = match config.auth_method() {
        AuthMethod::Password => {
            let mut file = NamedTempFile::new()?;
            writeln!(file, "{}", config.password())?;
            file.flush()?;
            cmd.arg("--pwfile").arg(file.path());
            Some(file)
        }
        AuthMethod::Trust => None,
    };

    log::info!("initializing cluster in {}", dir.display());
    let output = cmd.output().map_err(|source| Error::Launch {
        program: binaries.initdb.clone(),
        source,
    })?;

    if !output.status.success() {
        let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
        captured.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(Error::Initialization {
            status: output.status.to_string(),
            output: captured.trim_end().to_string(),
        });
    }

    log::debug!("initdb finished in {}", dir.display());
    Ok(InitOutcome::Initialized)
}
