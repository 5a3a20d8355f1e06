//! CLI-specific error types with exit codes.
//!
//! Library errors are wrapped as-is; the exit code is derived from their
//! [`ErrorKind`].

use epg::{Error as LibError, ErrorKind};
use std::fmt;

/// CLI-specific error type with exit code mapping.
#[derive(Debug)]
pub enum CliError {
    /// Library error (wrapped).
    Library(LibError),

    /// Invalid command-line arguments.
    InvalidArguments(String),

    /// I/O error.
    Io(std::io::Error),

    /// Configuration error.
    Config(String),

    /// The command ran but the answer is "no" (e.g. a sweep left failures).
    SemanticFailure(String),
}

impl CliError {
    /// Get the appropriate exit code for this error.
    ///
    /// Exit codes:
    /// - 0: Success (not an error)
    /// - 1: Semantic failure
    /// - 3: Data directory problem (including a held lock)
    /// - 4: Invalid arguments
    /// - 5: I/O error
    /// - 6: Other library error
    /// - 7: Configuration error
    /// - 8: Server failed to initialize or start
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::SemanticFailure(_) => 1,
            CliError::Library(lib_err) => match lib_err.kind() {
                ErrorKind::Directory => 3,
                ErrorKind::Configuration => 7,
                ErrorKind::Initialization | ErrorKind::StartupTimeout | ErrorKind::Bootstrap => 8,
                ErrorKind::Other if matches!(lib_err, LibError::Io(_)) => 5,
                _ => 6,
            },
            CliError::InvalidArguments(_) => 4,
            CliError::Io(_) => 5,
            CliError::Config(_) => 7,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Library(e) => write!(f, "{e}"),
            CliError::InvalidArguments(msg) => write!(f, "Invalid arguments: {msg}"),
            CliError::Io(e) => write!(f, "I/O error: {e}"),
            CliError::Config(msg) => write!(f, "Configuration error: {msg}"),
            CliError::SemanticFailure(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Library(e) => Some(e),
            CliError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LibError> for CliError {
    fn from(e: LibError) -> Self {
        CliError::Library(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_exit_codes_follow_error_kind() {
        let locked = CliError::from(LibError::DirectoryLocked {
            path: PathBuf::from("/tmp/pgdata"),
        });
        assert_eq!(locked.exit_code(), 3);

        let io = CliError::from(LibError::Io(std::io::Error::other("boom")));
        assert_eq!(io.exit_code(), 5);

        let missing = CliError::from(LibError::BinaryNotFound {
            name: "initdb".to_string(),
            searched: Vec::new(),
        });
        assert_eq!(missing.exit_code(), 8);

        assert_eq!(CliError::from(LibError::InstanceClosed).exit_code(), 6);
    }

    #[test]
    fn test_cli_only_exit_codes() {
        assert_eq!(CliError::SemanticFailure("no".into()).exit_code(), 1);
        assert_eq!(CliError::InvalidArguments("bad".into()).exit_code(), 4);
        assert_eq!(CliError::Config("bad".into()).exit_code(), 7);
    }
}
