//! Error types for the epg library.
//!
//! Every failure an instance can hit on its way up or down is expressed as a
//! variant of [`Error`]. Callers that only care about the broad category can
//! match on [`Error::kind`] instead of destructuring.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::port::{Port, PortRange};

/// Result type alias for operations that may fail with an epg error.
///
/// # Examples
///
/// ```
/// use epg::{Error, Result};
///
/// fn example_operation() -> Result<u16> {
///     Ok(5432)
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the epg library.
#[derive(Debug, Error)]
pub enum Error {
    /// An invalid port number was provided.
    #[error("invalid port {value}: {reason}")]
    InvalidPort {
        /// The invalid port value.
        value: u16,
        /// The reason the port is invalid.
        reason: String,
    },

    /// An invalid port range was provided.
    #[error("invalid port range {min}-{max}: {reason}")]
    InvalidPortRange {
        /// Lower bound as given.
        min: u16,
        /// Upper bound as given.
        max: u16,
        /// The reason the range is invalid.
        reason: String,
    },

    /// An option is malformed or conflicts with another option.
    #[error("configuration error for '{field}': {message}")]
    Configuration {
        /// The offending option.
        field: String,
        /// A description of the problem.
        message: String,
    },

    /// A configuration file could not be read or parsed.
    #[error("failed to load configuration file {}: {message}", path.display())]
    ConfigFile {
        /// The file that failed to load.
        path: PathBuf,
        /// The parse or read error.
        message: String,
    },

    /// No free port could be found.
    #[error("no free port in {range} after {attempts} attempt(s)")]
    PortExhausted {
        /// The range that was searched.
        range: PortRange,
        /// How many candidates were tried.
        attempts: usize,
    },

    /// The data directory could not be created, written or removed.
    #[error("data directory {}: {reason}", path.display())]
    Directory {
        /// The directory involved.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Another instance holds the lock on the data directory.
    #[error("data directory {} is in use by another instance", path.display())]
    DirectoryLocked {
        /// The locked directory.
        path: PathBuf,
    },

    /// A PostgreSQL executable could not be located.
    #[error("PostgreSQL executable '{name}' not found (searched: {})", display_paths(searched))]
    BinaryNotFound {
        /// Executable name, e.g. `initdb`.
        name: String,
        /// Locations that were searched.
        searched: Vec<PathBuf>,
    },

    /// A child process could not be spawned.
    #[error("failed to launch {}: {source}", program.display())]
    Launch {
        /// The program that failed to start.
        program: PathBuf,
        /// The underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// Cluster initialization (initdb) failed.
    #[error("cluster initialization failed ({status}){}", tail(output))]
    Initialization {
        /// Exit status of initdb.
        status: String,
        /// Captured initdb output.
        output: String,
    },

    /// The server did not accept connections before the deadline.
    #[error("server on port {port} not ready after {}ms{}", waited.as_millis(), tail(output))]
    StartupTimeout {
        /// The port the server was told to listen on.
        port: Port,
        /// How long readiness was awaited.
        waited: Duration,
        /// Tail of the server log.
        output: String,
    },

    /// The server exited before it became ready.
    #[error("server exited before becoming ready ({status}){}", tail(output))]
    ServerExited {
        /// Exit status of the server process.
        status: String,
        /// Tail of the server log.
        output: String,
    },

    /// A bootstrap statement failed.
    #[error("bootstrap statement failed: {statement}: {}", client_reason(.source))]
    Bootstrap {
        /// The statement (or step) that failed.
        statement: String,
        /// The client error.
        #[source]
        source: postgres::Error,
    },

    /// The server process could not be stopped.
    #[error("failed to stop server process {pid}: {reason}")]
    Termination {
        /// Process id of the server.
        pid: u32,
        /// What went wrong.
        reason: String,
    },

    /// A controller operation was called in the wrong lifecycle state.
    #[error("cannot {operation} while server is {state}")]
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// The state the controller was in.
        state: String,
    },

    /// The instance has been closed and is no longer usable.
    #[error("instance is closed")]
    InstanceClosed,

    /// A PostgreSQL client error outside of bootstrap.
    #[error("PostgreSQL client error: {}", client_reason(.0))]
    Client(#[from] postgres::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid or conflicting options; nothing was acquired.
    Configuration,
    /// No usable port.
    PortExhausted,
    /// Data directory problems, including a held lock.
    Directory,
    /// Binaries missing, initdb failure or launch failure.
    Initialization,
    /// The server never became ready.
    StartupTimeout,
    /// Role or database creation failed.
    Bootstrap,
    /// The server could not be stopped.
    Termination,
    /// Anything else (I/O, client, misuse).
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::PortExhausted => "port exhausted",
            Self::Directory => "directory",
            Self::Initialization => "initialization",
            Self::StartupTimeout => "startup timeout",
            Self::Bootstrap => "bootstrap",
            Self::Termination => "termination",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPort { .. }
            | Self::InvalidPortRange { .. }
            | Self::Configuration { .. }
            | Self::ConfigFile { .. } => ErrorKind::Configuration,
            Self::PortExhausted { .. } => ErrorKind::PortExhausted,
            Self::Directory { .. } | Self::DirectoryLocked { .. } => ErrorKind::Directory,
            Self::BinaryNotFound { .. }
            | Self::Launch { .. }
            | Self::Initialization { .. } => ErrorKind::Initialization,
            Self::StartupTimeout { .. } | Self::ServerExited { .. } => ErrorKind::StartupTimeout,
            Self::Bootstrap { .. } => ErrorKind::Bootstrap,
            Self::Termination { .. } => ErrorKind::Termination,
            Self::InvalidState { .. } | Self::InstanceClosed | Self::Client(_) | Self::Io(_) => {
                ErrorKind::Other
            }
        }
    }

    /// Shorthand for a [`Error::Configuration`].
    pub(crate) fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::Directory`].
    pub(crate) fn directory(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::Directory {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "nothing".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// The server's own message for database errors; the bare client error
/// only says "db error".
fn client_reason(err: &postgres::Error) -> String {
    if let Some(db) = err.as_db_error() {
        let mut reason = format!("{}: {}", db.severity(), db.message());
        if let Some(detail) = db.detail() {
            reason.push_str(&format!(" ({detail})"));
        }
        return reason;
    }
    let text = err.to_string();
    match std::error::Error::source(err) {
        Some(cause) if !text.contains(&cause.to_string()) => format!("{text}: {cause}"),
        _ => text,
    }
}

fn tail(output: &str) -> String {
    let trimmed = output.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(":\n{trimmed}")
    }
}
