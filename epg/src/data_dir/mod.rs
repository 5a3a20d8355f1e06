//! Data directory resolution, locking and cleanup.
//!
//! A data directory is either *external* (supplied by the caller, never
//! deleted) or *internal* (a fresh `epg-*` directory under the temp root,
//! deleted on close unless the caller asked to keep it).

pub mod lock;
pub mod stale;

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::config::InstanceConfig;
use crate::error::{Error, Result};

pub use lock::{DirectoryLock, LOCK_FILE};
pub use stale::{cleanup_stale_directories, SweepReport};

/// Name prefix of internally created directories.
pub const INTERNAL_PREFIX: &str = "epg-";

/// File whose presence marks an initialized cluster.
pub const VERSION_FILE: &str = "PG_VERSION";

/// Who owns a data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Supplied by the caller; epg never deletes it.
    External,
    /// Created by epg.
    Internal,
}

/// Why a directory survived cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepReason {
    /// The caller owns it.
    External,
    /// `clean_data_dir` was off.
    Requested,
    /// The server could not be confirmed stopped.
    ServerNotStopped,
}

/// What cleanup did with a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryDisposition {
    /// Deleted.
    Removed,
    /// Left on disk.
    Kept(KeepReason),
}

/// A resolved data directory held by one instance.
///
/// Cleanup happens at most once: through [`cleanup`](Self::cleanup) or
/// [`retain`](Self::retain), or best-effort on drop.
#[derive(Debug)]
pub struct DataDirectory {
    path: PathBuf,
    ownership: Ownership,
    remove_on_cleanup: bool,
    lock: Option<DirectoryLock>,
    finished: bool,
}

impl DataDirectory {
    fn new(path: PathBuf, ownership: Ownership, remove_on_cleanup: bool) -> Self {
        Self {
            path,
            ownership,
            remove_on_cleanup,
            lock: None,
            finished: false,
        }
    }

    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Who owns the directory.
    #[must_use]
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Whether a cluster has been initialized here.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.path.join(VERSION_FILE).is_file()
    }

    /// Whether this handle holds the directory lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    /// Takes the exclusive directory lock. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryLocked`] if another instance holds it.
    pub fn lock(&mut self) -> Result<()> {
        if self.lock.is_none() {
            self.lock = Some(DirectoryLock::acquire(&self.path)?);
        }
        Ok(())
    }

    /// Releases the lock and deletes the directory if it is internal and
    /// cleaning is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Directory`] if deletion fails.
    pub fn cleanup(mut self) -> Result<DirectoryDisposition> {
        self.finish()
    }

    /// Releases the lock and leaves the directory on disk.
    pub fn retain(mut self, reason: KeepReason) -> DirectoryDisposition {
        self.finished = true;
        self.lock = None;
        log::warn!("leaving data directory {} in place", self.path.display());
        DirectoryDisposition::Kept(reason)
    }

    fn finish(&mut self) -> Result<DirectoryDisposition> {
        self.finished = true;
        self.lock = None;

        match (self.ownership, self.remove_on_cleanup) {
            (Ownership::External, _) => Ok(DirectoryDisposition::Kept(KeepReason::External)),
            (Ownership::Internal, false) => {
                log::info!("keeping data directory {}", self.path.display());
                Ok(DirectoryDisposition::Kept(KeepReason::Requested))
            }
            (Ownership::Internal, true) => match fs::remove_dir_all(&self.path) {
                Ok(()) => {
                    log::debug!("removed data directory {}", self.path.display());
                    Ok(DirectoryDisposition::Removed)
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Ok(DirectoryDisposition::Removed)
                }
                Err(e) => Err(Error::directory(&self.path, format!("cannot remove: {e}"))),
            },
        }
    }
}

impl Drop for DataDirectory {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.finish() {
                log::warn!("{e}");
            }
        }
    }
}

/// Resolves data directories and sweeps the temp root.
#[derive(Debug, Clone)]
pub struct DataDirectoryManager {
    temp_root: PathBuf,
}

impl DataDirectoryManager {
    /// Creates internal directories under `temp_root`.
    #[must_use]
    pub fn new(temp_root: impl Into<PathBuf>) -> Self {
        Self {
            temp_root: temp_root.into(),
        }
    }

    /// Creates internal directories under the system temp directory.
    #[must_use]
    pub fn system() -> Self {
        Self::new(std::env::temp_dir())
    }

    /// Where internal directories are created.
    #[must_use]
    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// Picks the data directory for an instance.
    ///
    /// A configured `data_dir` is created if missing and checked for
    /// writability; otherwise a fresh `epg-*` directory is created under the
    /// temp root.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Directory`] if the directory cannot be created or
    /// written.
    pub fn resolve(&self, config: &InstanceConfig) -> Result<DataDirectory> {
        if let Some(dir) = config.data_dir() {
            Self::prepare_external(dir)?;
            log::debug!("using caller data directory {}", dir.display());
            return Ok(DataDirectory::new(
                dir.to_path_buf(),
                Ownership::External,
                false,
            ));
        }

        fs::create_dir_all(&self.temp_root)
            .map_err(|e| Error::directory(&self.temp_root, format!("cannot create: {e}")))?;
        let path = tempfile::Builder::new()
            .prefix(INTERNAL_PREFIX)
            .tempdir_in(&self.temp_root)
            .map_err(|e| Error::directory(&self.temp_root, format!("cannot create: {e}")))?
            .keep();
        log::debug!("created data directory {}", path.display());
        Ok(DataDirectory::new(
            path,
            Ownership::Internal,
            config.clean_data_dir(),
        ))
    }

    /// Removes stale internal directories under the temp root.
    ///
    /// # Errors
    ///
    /// See [`cleanup_stale_directories`].
    pub fn sweep_stale(&self) -> Result<SweepReport> {
        cleanup_stale_directories(&self.temp_root)
    }

    fn prepare_external(dir: &Path) -> Result<()> {
        if dir.exists() && !dir.is_dir() {
            return Err(Error::directory(dir, "exists and is not a directory"));
        }
        fs::create_dir_all(dir).map_err(|e| Error::directory(dir, format!("cannot create: {e}")))?;

        let marker = dir.join(".epg-write-check");
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&marker)
            .map_err(|e| Error::directory(dir, format!("not writable: {e}")))?;
        fs::remove_file(&marker).map_err(|e| Error::directory(dir, format!("not writable: {e}")))
    }
}

impl Default for DataDirectoryManager {
    fn default() -> Self {
        Self::system()
    }
}
