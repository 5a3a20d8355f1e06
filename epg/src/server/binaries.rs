//! Locating the PostgreSQL executables.

use std::cmp::Reverse;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

/// Install roots whose children are versioned PostgreSQL installs, with the
/// prefix each child directory name starts with.
const VERSIONED_ROOTS: &[(&str, &str, &str)] = &[
    ("/usr/lib/postgresql", "", "bin"),
    ("/usr", "pgsql-", "bin"),
    ("/opt/homebrew/opt", "postgresql", "bin"),
    ("/usr/local/opt", "postgresql", "bin"),
    ("/Applications/Postgres.app/Contents/Versions", "", "bin"),
];

/// Unversioned install locations.
const FIXED_DIRS: &[&str] = &["/usr/local/pgsql/bin", "/usr/local/bin", "/opt/homebrew/bin"];

/// `initdb` and `postgres` from one installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgBinaries {
    /// Cluster initialization tool.
    pub initdb: PathBuf,
    /// Server executable.
    pub postgres: PathBuf,
}

impl PgBinaries {
    /// Uses both executables from `dir`, if both are present.
    #[must_use]
    pub fn from_dir(dir: &Path) -> Option<Self> {
        let initdb = dir.join("initdb");
        let postgres = dir.join("postgres");
        (initdb.is_file() && postgres.is_file()).then_some(Self { initdb, postgres })
    }

    /// Finds an installation.
    ///
    /// A configured `bin_dir` is the only place searched when given.
    /// Otherwise `initdb` is looked up on `PATH`, then in well-known install
    /// roots, newest version first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BinaryNotFound`] listing every searched location.
    pub fn locate(bin_dir: Option<&Path>) -> Result<Self> {
        if let Some(dir) = bin_dir {
            return Self::from_dir(dir).ok_or_else(|| Error::BinaryNotFound {
                name: missing_name(dir).to_string(),
                searched: vec![dir.to_path_buf()],
            });
        }

        let mut searched = Vec::new();
        for dir in candidate_dirs() {
            if let Some(found) = Self::from_dir(&dir) {
                log::debug!("using PostgreSQL binaries in {}", dir.display());
                return Ok(found);
            }
            searched.push(dir);
        }

        Err(Error::BinaryNotFound {
            name: "initdb".to_string(),
            searched,
        })
    }

    /// Directory the binaries live in.
    #[must_use]
    pub fn bin_dir(&self) -> Option<&Path> {
        self.postgres.parent()
    }

    /// Output of `postgres --version`, e.g. `postgres (PostgreSQL) 16.2`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Launch`] if the server binary cannot be run.
    pub fn version(&self) -> Result<String> {
        let output = Command::new(&self.postgres)
            .arg("--version")
            .output()
            .map_err(|source| Error::Launch {
                program: self.postgres.clone(),
                source,
            })?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn missing_name(dir: &Path) -> &'static str {
    if dir.join("initdb").is_file() {
        "postgres"
    } else {
        "initdb"
    }
}

/// Search order without a configured directory.
fn candidate_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(initdb) = which::which("initdb") {
        // follow symlinks so postgres is looked for next to the real initdb
        let resolved = fs::canonicalize(&initdb).unwrap_or(initdb);
        if let Some(parent) = resolved.parent() {
            dirs.push(parent.to_path_buf());
        }
    }

    for (root, prefix, bin) in VERSIONED_ROOTS {
        dirs.extend(versioned_dirs(Path::new(root), prefix, bin));
    }
    dirs.extend(FIXED_DIRS.iter().map(PathBuf::from));
    dirs.dedup();
    dirs
}

/// `<root>/<prefix><version>/<bin>` for every child of `root`, highest
/// version first.
fn versioned_dirs(root: &Path, prefix: &str, bin: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };
    let mut found: Vec<(Vec<u32>, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let rest = name.strip_prefix(prefix)?;
            let version = parse_version(rest.trim_start_matches('@'));
            Some((version, entry.path().join(bin)))
        })
        .collect();
    found.sort_by_key(|(version, _)| Reverse(version.clone()));
    found.into_iter().map(|(_, dir)| dir).collect()
}

/// Leading dotted numeric components: `"16"`, `"9.6"`, `"15.4-1"`.
fn parse_version(s: &str) -> Vec<u32> {
    s.split(|c: char| !c.is_ascii_digit())
        .take_while(|part| !part.is_empty())
        .filter_map(|part| part.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use tempfile::TempDir;

    use super::*;
    use crate::error::ErrorKind;

    fn touch_executable(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_from_dir_needs_both() {
        let dir = TempDir::new().unwrap();
        touch_executable(&dir.path().join("initdb"));
        assert!(PgBinaries::from_dir(dir.path()).is_none());

        touch_executable(&dir.path().join("postgres"));
        let found = PgBinaries::from_dir(dir.path()).unwrap();
        assert_eq!(found.initdb, dir.path().join("initdb"));
        assert_eq!(found.bin_dir(), Some(dir.path()));
    }

    #[test]
    fn test_locate_with_configured_dir() {
        let dir = TempDir::new().unwrap();
        let err = PgBinaries::locate(Some(dir.path())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Initialization);
        match err {
            Error::BinaryNotFound { name, searched } => {
                assert_eq!(name, "initdb");
                assert_eq!(searched, vec![dir.path().to_path_buf()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        touch_executable(&dir.path().join("initdb"));
        touch_executable(&dir.path().join("postgres"));
        assert!(PgBinaries::locate(Some(dir.path())).is_ok());
    }

    #[test]
    fn test_versioned_dirs_newest_first() {
        let root = TempDir::new().unwrap();
        for version in ["9.6", "16", "13", "not-a-version"] {
            fs::create_dir_all(root.path().join(version).join("bin")).unwrap();
        }
        let dirs = versioned_dirs(root.path(), "", "bin");
        let names: Vec<String> = dirs
            .iter()
            .map(|d| {
                d.parent()
                    .unwrap()
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(&names[..3], &["16", "13", "9.6"]);
    }

    #[test]
    fn test_versioned_dirs_with_prefix() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("postgresql@14")).unwrap();
        fs::create_dir_all(root.path().join("postgresql@16")).unwrap();
        fs::create_dir_all(root.path().join("redis")).unwrap();
        let dirs = versioned_dirs(root.path(), "postgresql", "bin");
        assert_eq!(dirs.len(), 2);
        assert!(dirs[0].starts_with(root.path().join("postgresql@16")));
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("16"), vec![16]);
        assert_eq!(parse_version("9.6"), vec![9, 6]);
        assert_eq!(parse_version("15.4-1"), vec![15, 4, 1]);
        assert!(parse_version("abc").is_empty());
    }
}
