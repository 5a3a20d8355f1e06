//! Shell detection and export formatting.

use std::env;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Supported shell types for export formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellType {
    /// Bourne Again Shell (bash), also used for plain `sh`.
    Bash,
    /// Z Shell (zsh).
    Zsh,
    /// Friendly Interactive Shell (fish).
    Fish,
    /// `PowerShell`.
    PowerShell,
}

impl ShellType {
    /// Detects the current shell from environment variables.
    ///
    /// Checks `ZSH_VERSION`, `FISH_VERSION` and `PSModulePath`, then the
    /// `SHELL` path, and falls back to bash.
    #[must_use]
    pub fn detect() -> Self {
        Self::detect_with(|name| env::var(name).ok())
    }

    fn detect_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        if lookup("ZSH_VERSION").is_some() {
            return Self::Zsh;
        }
        if lookup("FISH_VERSION").is_some() {
            return Self::Fish;
        }
        if lookup("PSModulePath").is_some() {
            return Self::PowerShell;
        }
        match lookup("SHELL") {
            Some(path) if path.contains("zsh") => Self::Zsh,
            Some(path) if path.contains("fish") => Self::Fish,
            Some(path) if path.contains("pwsh") || path.contains("powershell") => {
                Self::PowerShell
            }
            _ => Self::Bash,
        }
    }

    /// Formats an export statement, quoting `value` when it holds anything
    /// but safe characters.
    ///
    /// # Examples
    ///
    /// ```
    /// use epg::output::ShellType;
    ///
    /// assert_eq!(ShellType::Bash.format_export("PGPORT", "5432"), "export PGPORT=5432");
    /// assert_eq!(ShellType::Fish.format_export("PGPORT", "5432"), "set -gx PGPORT 5432");
    /// assert_eq!(
    ///     ShellType::Bash.format_export("PGPASSWORD", "it's"),
    ///     r"export PGPASSWORD='it'\''s'"
    /// );
    /// ```
    #[must_use]
    pub fn format_export(&self, var: &str, value: &str) -> String {
        match self {
            Self::Bash | Self::Zsh => format!("export {var}={}", posix_quote(value)),
            Self::Fish => format!("set -gx {var} {}", fish_quote(value)),
            Self::PowerShell => format!("$env:{var} = '{}'", value.replace('\'', "''")),
        }
    }
}

impl fmt::Display for ShellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bash => "bash",
            Self::Zsh => "zsh",
            Self::Fish => "fish",
            Self::PowerShell => "powershell",
        };
        f.write_str(name)
    }
}

impl FromStr for ShellType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bash" | "sh" => Ok(Self::Bash),
            "zsh" => Ok(Self::Zsh),
            "fish" => Ok(Self::Fish),
            "powershell" | "pwsh" | "ps" => Ok(Self::PowerShell),
            _ => Err(Error::configuration(
                "shell",
                format!("unknown shell type '{s}': supported shells are bash, zsh, fish, powershell"),
            )),
        }
    }
}

fn is_safe(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-.,:/@%+=".contains(c))
}

fn posix_quote(value: &str) -> String {
    if is_safe(value) {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

fn fish_quote(value: &str) -> String {
    if is_safe(value) {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\\', r"\\").replace('\'', r"\'"))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn detect(vars: &[(&str, &str)]) -> ShellType {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ShellType::detect_with(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_from_str() {
        assert_eq!("bash".parse::<ShellType>().unwrap(), ShellType::Bash);
        assert_eq!("BASH".parse::<ShellType>().unwrap(), ShellType::Bash);
        assert_eq!("sh".parse::<ShellType>().unwrap(), ShellType::Bash);
        assert_eq!("zsh".parse::<ShellType>().unwrap(), ShellType::Zsh);
        assert_eq!("fish".parse::<ShellType>().unwrap(), ShellType::Fish);
        assert_eq!("pwsh".parse::<ShellType>().unwrap(), ShellType::PowerShell);
        assert!("tcsh".parse::<ShellType>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for shell in [
            ShellType::Bash,
            ShellType::Zsh,
            ShellType::Fish,
            ShellType::PowerShell,
        ] {
            assert_eq!(shell.to_string().parse::<ShellType>().unwrap(), shell);
        }
    }

    #[test]
    fn test_detection_precedence() {
        assert_eq!(detect(&[]), ShellType::Bash);
        assert_eq!(detect(&[("SHELL", "/bin/sh")]), ShellType::Bash);
        assert_eq!(detect(&[("SHELL", "/usr/bin/zsh")]), ShellType::Zsh);
        assert_eq!(detect(&[("SHELL", "/usr/local/bin/fish")]), ShellType::Fish);
        assert_eq!(
            detect(&[("ZSH_VERSION", "5.9"), ("SHELL", "/bin/bash")]),
            ShellType::Zsh
        );
        assert_eq!(
            detect(&[("FISH_VERSION", "3.7"), ("PSModulePath", "x")]),
            ShellType::Fish
        );
        assert_eq!(detect(&[("PSModulePath", "C:\\x")]), ShellType::PowerShell);
    }

    #[test]
    fn test_plain_values_unquoted() {
        assert_eq!(
            ShellType::Zsh.format_export("PGHOST", "127.0.0.1"),
            "export PGHOST=127.0.0.1"
        );
        assert_eq!(
            ShellType::Bash.format_export(
                "DATABASE_URL",
                "postgresql://u:p@127.0.0.1:5432/db"
            ),
            "export DATABASE_URL=postgresql://u:p@127.0.0.1:5432/db"
        );
    }

    #[test]
    fn test_quoting() {
        assert_eq!(
            ShellType::Bash.format_export("PGPASSWORD", "a b"),
            "export PGPASSWORD='a b'"
        );
        assert_eq!(
            ShellType::Bash.format_export("PGPASSWORD", ""),
            "export PGPASSWORD=''"
        );
        assert_eq!(
            ShellType::Fish.format_export("PGPASSWORD", "it's"),
            r"set -gx PGPASSWORD 'it\'s'"
        );
        assert_eq!(
            ShellType::PowerShell.format_export("PGPASSWORD", "it's"),
            "$env:PGPASSWORD = 'it''s'"
        );
        assert_eq!(
            ShellType::Bash.format_export("PGPASSWORD", "$(rm -rf /)"),
            "export PGPASSWORD='$(rm -rf /)'"
        );
    }
}
