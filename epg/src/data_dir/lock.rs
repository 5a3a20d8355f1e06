//! Exclusive `flock` on a data directory.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use crate::error::{Error, Result};

/// Lock file kept inside every data directory in use.
pub const LOCK_FILE: &str = "epg-lock";

/// Holds the exclusive lock on `<dir>/epg-lock` until dropped.
///
/// The kernel drops the lock when the process dies, so a lock file whose
/// lock can be taken belongs to nobody.
pub struct DirectoryLock {
    _lock: Flock<File>,
    path: PathBuf,
}

impl DirectoryLock {
    /// Locks the directory, creating the lock file if needed.
    ///
    /// A new lock file is locked under a temporary name and then renamed
    /// into place, so `epg-lock` is never visible unlocked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryLocked`] if another instance holds the
    /// lock, or [`Error::Directory`] if the file cannot be created or opened.
    pub fn acquire(dir: &Path) -> Result<Self> {
        loop {
            match Self::open_existing(dir)? {
                Existing::Locked(lock) => return Ok(lock),
                Existing::Held => {
                    return Err(Error::DirectoryLocked {
                        path: dir.to_path_buf(),
                    })
                }
                Existing::Missing => {}
            }
            if let Some(lock) = Self::create_locked(dir)? {
                return Ok(lock);
            }
            log::trace!("lock file appeared in {}, retrying", dir.display());
        }
    }

    /// Locks an existing lock file. Returns `Ok(None)` if the file is
    /// missing or the lock is held elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Directory`] if the file exists but cannot be opened
    /// or locked for another reason.
    pub fn try_acquire_existing(dir: &Path) -> Result<Option<Self>> {
        Ok(match Self::open_existing(dir)? {
            Existing::Locked(lock) => Some(lock),
            Existing::Held | Existing::Missing => None,
        })
    }

    fn open_existing(dir: &Path) -> Result<Existing> {
        let path = dir.join(LOCK_FILE);
        let file = match OpenOptions::new().write(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Existing::Missing),
            Err(e) => {
                return Err(Error::directory(
                    &path,
                    format!("cannot open lock file: {e}"),
                ))
            }
        };
        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => {
                log::debug!("locked data directory {}", dir.display());
                Ok(Existing::Locked(Self { _lock: lock, path }))
            }
            Err((_, Errno::EWOULDBLOCK)) => Ok(Existing::Held),
            Err((_, errno)) => Err(Error::directory(dir, format!("cannot lock: {errno}"))),
        }
    }

    /// `Ok(None)` if another process published a lock file first.
    fn create_locked(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(LOCK_FILE);
        let (file, temp_path) = tempfile::Builder::new()
            .prefix(".epg-lock.")
            .tempfile_in(dir)
            .map_err(|e| Error::directory(dir, format!("cannot create lock file: {e}")))?
            .into_parts();
        let lock = Flock::lock(file, FlockArg::LockExclusiveNonblock)
            .map_err(|(_, errno)| Error::directory(dir, format!("cannot lock: {errno}")))?;

        match temp_path.persist_noclobber(&path) {
            Ok(()) => {
                log::debug!("locked data directory {}", dir.display());
                Ok(Some(Self { _lock: lock, path }))
            }
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(Error::directory(
                &path,
                format!("cannot create lock file: {}", e.error),
            )),
        }
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

enum Existing {
    Missing,
    Held,
    Locked(DirectoryLock),
}

impl fmt::Debug for DirectoryLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryLock")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
