//! Logging for the epg library and CLI.
//!
//! The library emits through the `log` facade. [`init_logger`] installs a
//! stderr [`Logger`] behind it with one of three verbosity levels.

use std::env;
use std::fmt;

use log::{LevelFilter, Log, Metadata, Record};

/// Environment variable consulted when no CLI flag picks a level.
pub const LOG_MODE_ENV: &str = "EPG_LOG_MODE";

/// Output verbosity, ordered from least to most verbose.
///
/// # Examples
///
/// ```
/// use epg::LogLevel;
///
/// assert!(LogLevel::Quiet < LogLevel::Normal);
/// assert!(LogLevel::Normal < LogLevel::Verbose);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Nothing but the command's own output.
    Quiet,
    /// Errors and warnings.
    Normal,
    /// Everything down to debug messages.
    Verbose,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quiet => write!(f, "quiet"),
            Self::Normal => write!(f, "normal"),
            Self::Verbose => write!(f, "verbose"),
        }
    }
}

impl LogLevel {
    /// Parses "quiet", "normal" or "verbose" (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not recognized.
    ///
    /// # Examples
    ///
    /// ```
    /// use epg::LogLevel;
    ///
    /// assert_eq!(LogLevel::parse("VERBOSE").unwrap(), LogLevel::Verbose);
    /// assert!(LogLevel::parse("loud").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "quiet" => Ok(Self::Quiet),
            "normal" => Ok(Self::Normal),
            "verbose" => Ok(Self::Verbose),
            _ => Err(format!("invalid log level: {s}")),
        }
    }

    /// The `log` filter this level lets through.
    #[must_use]
    pub const fn filter(self) -> LevelFilter {
        match self {
            Self::Quiet => LevelFilter::Off,
            Self::Normal => LevelFilter::Warn,
            Self::Verbose => LevelFilter::Debug,
        }
    }
}

/// A stderr logger behind the `log` facade.
#[derive(Debug)]
pub struct Logger {
    level: LogLevel,
}

impl Logger {
    /// Creates a logger with the given level.
    #[must_use]
    pub const fn new(level: LogLevel) -> Self {
        Self { level }
    }

    /// The configured level.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(LogLevel::Normal)
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level.filter()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("{}: {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Picks a level: CLI flags first (verbose beats quiet), then
/// `EPG_LOG_MODE`, then [`LogLevel::Normal`].
#[must_use]
pub fn resolve_level(verbose: bool, quiet: bool) -> LogLevel {
    if verbose {
        return LogLevel::Verbose;
    }
    if quiet {
        return LogLevel::Quiet;
    }
    env::var(LOG_MODE_ENV)
        .ok()
        .and_then(|value| LogLevel::parse(&value).ok())
        .unwrap_or(LogLevel::Normal)
}

/// Installs the stderr logger and returns the chosen level.
///
/// Only the first call installs a logger; later calls still adjust the
/// global maximum level.
///
/// # Examples
///
/// ```
/// use epg::{init_logger, LogLevel};
///
/// assert_eq!(init_logger(true, false), LogLevel::Verbose);
/// log::debug!("visible on stderr");
/// ```
pub fn init_logger(verbose: bool, quiet: bool) -> LogLevel {
    let level = resolve_level(verbose, quiet);
    // a logger is already installed when this fails
    let _ = log::set_boxed_logger(Box::new(Logger::new(level)));
    log::set_max_level(level.filter());
    level
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn test_log_level_display_and_parse() {
        for level in [LogLevel::Quiet, LogLevel::Normal, LogLevel::Verbose] {
            assert_eq!(LogLevel::parse(&level.to_string()).unwrap(), level);
        }
        assert_eq!(LogLevel::parse("Normal").unwrap(), LogLevel::Normal);
        assert!(LogLevel::parse("").is_err());
    }

    #[test]
    fn test_filters() {
        assert_eq!(LogLevel::Quiet.filter(), LevelFilter::Off);
        assert_eq!(LogLevel::Normal.filter(), LevelFilter::Warn);
        assert_eq!(LogLevel::Verbose.filter(), LevelFilter::Debug);
    }

    #[test]
    fn test_logger_enabled() {
        let logger = Logger::new(LogLevel::Normal);
        let warn = Metadata::builder().level(log::Level::Warn).build();
        let info = Metadata::builder().level(log::Level::Info).build();
        assert!(logger.enabled(&warn));
        assert!(!logger.enabled(&info));
        assert!(!Logger::new(LogLevel::Quiet).enabled(&warn));
    }

    #[test]
    fn test_flags_take_precedence() {
        assert_eq!(resolve_level(true, false), LogLevel::Verbose);
        assert_eq!(resolve_level(false, true), LogLevel::Quiet);
        assert_eq!(resolve_level(true, true), LogLevel::Verbose);
    }

    #[test]
    #[serial]
    fn test_env_level() {
        let saved = env::var(LOG_MODE_ENV).ok();

        env::set_var(LOG_MODE_ENV, "verbose");
        assert_eq!(resolve_level(false, false), LogLevel::Verbose);
        env::set_var(LOG_MODE_ENV, "invalid");
        assert_eq!(resolve_level(false, false), LogLevel::Normal);
        env::remove_var(LOG_MODE_ENV);
        assert_eq!(resolve_level(false, false), LogLevel::Normal);

        if let Some(val) = saved {
            env::set_var(LOG_MODE_ENV, val);
        }
    }
}
