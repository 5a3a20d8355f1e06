//! Creates instances.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{InstanceConfig, InstanceOptions, PortSelection};
use crate::data_dir::{DataDirectoryManager, SweepReport};
use crate::error::Result;
use crate::instance::Instance;
use crate::port::{
    PortAllocator, PortOccupancyChecker, PortRange, PortRegistry, PortReservation,
    SystemOccupancyChecker,
};
use crate::server::PgBinaries;

/// Starts instances that share one port registry and one temp root.
///
/// Instances from provisioners sharing a registry never get the same port.
///
/// # Examples
///
/// ```no_run
/// use epg::config::InstanceOptions;
/// use epg::{PortRegistry, Provisioner};
///
/// let provisioner = Provisioner::new(PortRegistry::shared());
/// let first = provisioner
///     .start_with(InstanceOptions {
///         username: Some("user1".into()),
///         database: Some("db1".into()),
///         ..Default::default()
///     })
///     .unwrap();
/// let second = provisioner.start_with(InstanceOptions::default()).unwrap();
/// assert_ne!(first.port(), second.port());
/// ```
#[derive(Debug)]
pub struct Provisioner<C: PortOccupancyChecker = SystemOccupancyChecker> {
    registry: Arc<PortRegistry>,
    directories: DataDirectoryManager,
    checker: C,
}

impl Provisioner {
    /// A provisioner probing ports on the host, with data directories under
    /// the system temp directory.
    #[must_use]
    pub fn new(registry: Arc<PortRegistry>) -> Self {
        Self::with_checker(registry, SystemOccupancyChecker)
    }
}

/// A provisioner with a private registry of its own.
///
/// Two default provisioners do not see each other's reservations and may
/// hand out the same port. Code starting instances from several places
/// should build each provisioner with [`Provisioner::new`] from one shared
/// [`PortRegistry`].
impl Default for Provisioner {
    fn default() -> Self {
        Self::new(PortRegistry::shared())
    }
}

impl<C: PortOccupancyChecker> Provisioner<C> {
    /// A provisioner with a custom occupancy checker.
    pub fn with_checker(registry: Arc<PortRegistry>, checker: C) -> Self {
        Self {
            registry,
            directories: DataDirectoryManager::system(),
            checker,
        }
    }

    /// Creates internal data directories under `root` instead.
    #[must_use]
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.directories = DataDirectoryManager::new(root);
        self
    }

    /// The shared port registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<PortRegistry> {
        &self.registry
    }

    /// The data directory manager.
    #[must_use]
    pub fn directories(&self) -> &DataDirectoryManager {
        &self.directories
    }

    /// An allocator over `range` using this provisioner's registry.
    #[must_use]
    pub fn allocator(&self, range: PortRange) -> PortAllocator<&C> {
        PortAllocator::new(&self.checker, Arc::clone(&self.registry), range)
    }

    /// Reserves a port according to `selection`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PortExhausted`](crate::Error::PortExhausted) if no
    /// port is free, or a configuration error if a fixed port is taken by
    /// another instance.
    pub fn reserve_port(&self, selection: PortSelection) -> Result<PortReservation> {
        match selection {
            PortSelection::Auto(range) => self.allocator(range).allocate(),
            PortSelection::Fixed(port) => self.allocator(PortRange::single(port)).reserve(port),
        }
    }

    /// Removes internal data directories left behind by crashed processes.
    ///
    /// # Errors
    ///
    /// Returns a directory error if the temp root cannot be listed.
    pub fn sweep_stale_directories(&self) -> Result<SweepReport> {
        self.directories.sweep_stale()
    }

    /// Validates `options` and starts an instance.
    ///
    /// # Errors
    ///
    /// See [`InstanceConfig::new`] and [`Self::start`].
    pub fn start_with(&self, options: InstanceOptions) -> Result<Instance> {
        self.start(InstanceConfig::new(options)?)
    }

    /// Starts a server and returns once it accepts the configured role.
    ///
    /// Steps run in order: locate binaries, reserve a port, resolve the data
    /// directory, initialize the cluster, launch, await readiness,
    /// bootstrap. If any step fails, everything acquired so far is released
    /// before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step.
    pub fn start(&self, config: InstanceConfig) -> Result<Instance> {
        let binaries = PgBinaries::locate(config.bin_dir())?;
        let port = self.reserve_port(config.port())?;
        log::debug!("reserved port {}", port.port());
        let data_dir = self.directories.resolve(&config)?;

        let mut instance = Instance::new(config, binaries, port, data_dir);
        if let Err(e) = instance.bring_up() {
            log::warn!("instance startup failed, rolling back: {e}");
            for failure in instance.close().failures {
                log::warn!("rollback: {failure}");
            }
            return Err(e);
        }
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    use tempfile::TempDir;

    use super::*;
    use crate::error::{Error, ErrorKind};
    use crate::port::{MockOccupancyChecker, Port};

    fn provisioner(root: &TempDir) -> Provisioner<MockOccupancyChecker> {
        Provisioner::with_checker(PortRegistry::shared(), MockOccupancyChecker::empty())
            .with_temp_root(root.path().join("tmp"))
    }

    /// A bin dir whose `initdb` always fails.
    fn failing_bin_dir(root: &TempDir) -> PathBuf {
        let bin = root.path().join("bin");
        fs::create_dir_all(&bin).unwrap();
        for name in ["initdb", "postgres"] {
            let path = bin.join(name);
            fs::write(&path, "#!/bin/sh\necho 'initdb: broken' >&2\nexit 1\n").unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        bin
    }

    #[test]
    fn test_reserve_port_selection() {
        let root = TempDir::new().unwrap();
        let provisioner = provisioner(&root);
        let port = Port::try_from(50_001).unwrap();

        let fixed = provisioner
            .reserve_port(PortSelection::Fixed(port))
            .unwrap();
        assert_eq!(fixed.port(), port);

        let err = provisioner
            .reserve_port(PortSelection::Fixed(port))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let range = PortRange::from_bounds(50_000, 50_002).unwrap();
        let auto = provisioner
            .reserve_port(PortSelection::Auto(range))
            .unwrap();
        assert!(range.contains(auto.port()));
        assert_ne!(auto.port(), port);
        assert_eq!(provisioner.registry().len(), 2);
    }

    #[test]
    fn test_provisioners_sharing_a_registry_never_collide() {
        let root = TempDir::new().unwrap();
        let registry = PortRegistry::shared();
        let first =
            Provisioner::with_checker(Arc::clone(&registry), MockOccupancyChecker::empty())
                .with_temp_root(root.path().join("a"));
        let second =
            Provisioner::with_checker(Arc::clone(&registry), MockOccupancyChecker::empty())
                .with_temp_root(root.path().join("b"));
        let port = Port::try_from(50_011).unwrap();

        let _held = first.reserve_port(PortSelection::Fixed(port)).unwrap();
        let err = second
            .reserve_port(PortSelection::Fixed(port))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let range = PortRange::from_bounds(50_011, 50_012).unwrap();
        let other = second.reserve_port(PortSelection::Auto(range)).unwrap();
        assert_ne!(other.port(), port);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_default_provisioners_have_private_registries() {
        let a = Provisioner::default();
        let b = Provisioner::default();
        assert!(!Arc::ptr_eq(a.registry(), b.registry()));
    }

    #[test]
    fn test_missing_binaries_acquire_nothing() {
        let root = TempDir::new().unwrap();
        let provisioner = provisioner(&root);
        let empty_bin = root.path().join("empty");
        fs::create_dir_all(&empty_bin).unwrap();

        let err = provisioner
            .start_with(InstanceOptions {
                bin_dir: Some(empty_bin),
                ..InstanceOptions::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::BinaryNotFound { .. }));
        assert!(provisioner.registry().is_empty());
        assert!(!root.path().join("tmp").exists());
    }

    #[test]
    fn test_failed_start_rolls_back() {
        let root = TempDir::new().unwrap();
        let provisioner = provisioner(&root);

        let err = provisioner
            .start_with(InstanceOptions {
                bin_dir: Some(failing_bin_dir(&root)),
                ..InstanceOptions::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Initialization);
        assert!(err.to_string().contains("initdb: broken"));

        assert!(provisioner.registry().is_empty());
        let leftovers: Vec<_> = fs::read_dir(root.path().join("tmp")).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_failed_start_keeps_external_dir() {
        let root = TempDir::new().unwrap();
        let provisioner = provisioner(&root);
        let external = root.path().join("a").join("b").join("data");

        let err = provisioner
            .start_with(InstanceOptions {
                bin_dir: Some(failing_bin_dir(&root)),
                data_dir: Some(external.clone()),
                ..InstanceOptions::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Initialization);
        assert!(external.is_dir());
        assert!(provisioner.registry().is_empty());
    }

    #[test]
    fn test_invalid_options_fail_before_anything() {
        let root = TempDir::new().unwrap();
        let provisioner = provisioner(&root);
        let err = provisioner
            .start_with(InstanceOptions {
                username: Some(String::new()),
                ..InstanceOptions::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!root.path().join("tmp").exists());
    }

    #[test]
    fn test_sweep_through_provisioner() {
        let root = TempDir::new().unwrap();
        let provisioner = provisioner(&root);
        let stale = root.path().join("tmp").join("epg-old");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join(crate::data_dir::LOCK_FILE), "").unwrap();

        let report = provisioner.sweep_stale_directories().unwrap();
        assert_eq!(report.removed, vec![stale]);
    }
}
