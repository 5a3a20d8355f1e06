//! Removal of internal data directories left behind by crashed runs.

use std::fs;
use std::path::{Path, PathBuf};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use super::lock::DirectoryLock;
use super::INTERNAL_PREFIX;
use crate::error::{Error, Result};

/// What a sweep did with each candidate directory.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Directories that were deleted.
    pub removed: Vec<PathBuf>,
    /// Directories still in use, or without a lock file.
    pub skipped: Vec<PathBuf>,
    /// Directories that looked stale but could not be deleted.
    pub failed: Vec<(PathBuf, String)>,
}

/// Deletes `epg-*` directories directly under `root` whose lock is not held
/// by any process and whose server is no longer running.
///
/// Directories without a lock file are left alone: they may belong to an
/// instance that is still initializing.
///
/// # Errors
///
/// Returns [`Error::Directory`] only if `root` exists but cannot be listed;
/// per-directory problems go into [`SweepReport::failed`].
pub fn cleanup_stale_directories(root: &Path) -> Result<SweepReport> {
    let mut report = SweepReport::default();

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
        Err(e) => return Err(Error::directory(root, format!("cannot list: {e}"))),
    };

    for entry in entries.flatten() {
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let name = entry.file_name();
        if !is_dir || !name.to_string_lossy().starts_with(INTERNAL_PREFIX) {
            continue;
        }
        let path = entry.path();

        let lock = match DirectoryLock::try_acquire_existing(&path) {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                report.skipped.push(path);
                continue;
            }
            Err(e) => {
                report.failed.push((path, e.to_string()));
                continue;
            }
        };

        if server_alive(&path) {
            log::debug!("skipping {}: server still running", path.display());
            report.skipped.push(path);
            continue;
        }

        // keep the lock while deleting so nobody adopts the directory
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                log::info!("removed stale data directory {}", path.display());
                report.removed.push(path);
            }
            Err(e) => report.failed.push((path, e.to_string())),
        }
        drop(lock);
    }

    Ok(report)
}

/// Whether `postmaster.pid` names a live process.
fn server_alive(dir: &Path) -> bool {
    let Ok(contents) = fs::read_to_string(dir.join("postmaster.pid")) else {
        return false;
    };
    contents
        .lines()
        .next()
        .and_then(|line| line.trim().parse::<i32>().ok())
        .filter(|&pid| pid > 0)
        .is_some_and(|pid| kill(Pid::from_raw(pid), None::<Signal>).is_ok())
}
