//! The handle to a running embedded server.

use std::path::{Path, PathBuf};

use postgres::Client;

use crate::bootstrap::{bootstrap, BootstrapOutcome};
use crate::config::InstanceConfig;
use crate::connection::ConnectionParams;
use crate::data_dir::{DataDirectory, DirectoryDisposition, KeepReason, Ownership};
use crate::error::{Error, Result};
use crate::port::{Port, PortReservation};
use crate::server::{
    has_cluster, ClientProbe, InitOutcome, PgBinaries, ServerProcess, ServerState,
};

/// What [`Instance::close`] did.
#[derive(Debug, Default)]
pub struct CloseReport {
    /// The instance had been closed before; nothing was done.
    pub already_closed: bool,
    /// The server process is confirmed gone.
    pub server_stopped: bool,
    /// The port reservation was returned to the registry by this call.
    pub port_released: bool,
    /// What happened to the data directory, if cleanup got that far.
    pub data_dir: Option<DirectoryDisposition>,
    /// Every step that failed, in close order.
    pub failures: Vec<Error>,
}

impl CloseReport {
    fn already_closed() -> Self {
        Self {
            already_closed: true,
            ..Self::default()
        }
    }

    /// True when no step failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Converts into the first failure, if any. Later failures are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns the first error recorded during close.
    pub fn into_result(self) -> Result<()> {
        match self.failures.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// One running PostgreSQL server with its port and data directory.
///
/// Created by [`Provisioner::start`](crate::Provisioner::start). Closing
/// stops the server, returns the port and removes an internal data
/// directory. [`close`](Self::close) may be called any number of times;
/// dropping an open instance closes it.
///
/// # Examples
///
/// ```no_run
/// use epg::{InstanceConfig, Provisioner};
///
/// let provisioner = Provisioner::default();
/// let mut instance = provisioner.start(InstanceConfig::default()).unwrap();
///
/// let mut client = instance.connect().unwrap();
/// let row = client.query_one("SELECT 1", &[]).unwrap();
/// assert_eq!(row.get::<_, i32>(0), 1);
///
/// assert!(instance.close().is_clean());
/// assert!(instance.connection_params().is_none());
/// ```
#[derive(Debug)]
pub struct Instance {
    config: InstanceConfig,
    params: ConnectionParams,
    admin: ConnectionParams,
    server: ServerProcess,
    port: PortReservation,
    data_dir: Option<DataDirectory>,
    data_dir_path: PathBuf,
    ownership: Ownership,
    bootstrap: Option<BootstrapOutcome>,
    closed: bool,
}

impl Instance {
    /// Assembles an instance that has not started anything yet.
    pub(crate) fn new(
        config: InstanceConfig,
        binaries: PgBinaries,
        port: PortReservation,
        data_dir: DataDirectory,
    ) -> Self {
        let port_number = port.port();
        let data_dir_path = data_dir.path().to_path_buf();
        Self {
            params: ConnectionParams::from_config(&config, port_number),
            admin: ConnectionParams::admin(&config, port_number),
            server: ServerProcess::new(binaries, &data_dir_path, port_number),
            ownership: data_dir.ownership(),
            data_dir: Some(data_dir),
            data_dir_path,
            port,
            config,
            bootstrap: None,
            closed: false,
        }
    }

    /// Initializes, locks, launches, waits for readiness and bootstraps.
    pub(crate) fn bring_up(&mut self) -> Result<()> {
        let Some(dir) = self.data_dir.as_mut() else {
            return Err(Error::InstanceClosed);
        };
        // an existing cluster can be locked before anything touches it
        if has_cluster(dir.path()) {
            dir.lock()?;
        }
        self.server.initialize(&self.config)?;
        dir.lock()?;

        self.server.launch(&self.config)?;
        let probe = ClientProbe::superuser(self.config.password());
        self.server.await_ready(self.config.startup_timeout(), &probe)?;

        self.bootstrap = Some(bootstrap(&self.admin, &self.config)?);
        log::info!(
            "instance ready on port {} (database {}, user {})",
            self.port(),
            self.params.database,
            self.params.username
        );
        Ok(())
    }

    /// Connection parameters for the configured role and database, or
    /// `None` once closed.
    #[must_use]
    pub fn connection_params(&self) -> Option<&ConnectionParams> {
        (!self.closed).then_some(&self.params)
    }

    /// Superuser parameters on the `postgres` database, or `None` once
    /// closed.
    #[must_use]
    pub fn admin_params(&self) -> Option<&ConnectionParams> {
        (!self.closed).then_some(&self.admin)
    }

    /// Connects with [`connection_params`](Self::connection_params).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstanceClosed`] after close, or [`Error::Client`]
    /// if the connection fails.
    pub fn connect(&self) -> Result<Client> {
        self.connection_params()
            .ok_or(Error::InstanceClosed)?
            .connect()
    }

    /// The reserved port.
    #[must_use]
    pub fn port(&self) -> Port {
        self.port.port()
    }

    /// Whether the caller asked for pooled connections.
    #[must_use]
    pub fn is_pooled(&self) -> bool {
        self.config.pooling()
    }

    /// The resolved configuration.
    #[must_use]
    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    /// The data directory path.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir_path
    }

    /// Whether the data directory belongs to the caller.
    #[must_use]
    pub fn data_dir_ownership(&self) -> Ownership {
        self.ownership
    }

    /// Whether an existing cluster was adopted instead of initialized.
    #[must_use]
    pub fn cluster_reused(&self) -> bool {
        self.server.init_outcome() == Some(InitOutcome::Reused)
    }

    /// What bootstrap created, once it has run.
    #[must_use]
    pub fn bootstrap_outcome(&self) -> Option<BootstrapOutcome> {
        self.bootstrap
    }

    /// Lifecycle state of the server process.
    #[must_use]
    pub fn server_state(&self) -> ServerState {
        self.server.state()
    }

    /// PID of the server while it runs.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.server.pid()
    }

    /// Path of the server log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.server.log_path()
    }

    /// Whether [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stops the server, releases the port, then cleans up the data
    /// directory.
    ///
    /// Every step runs even if an earlier one failed; failures are
    /// collected in the report. If the server could not be confirmed
    /// stopped, the data directory is kept. Calling this again returns a
    /// report with `already_closed` set.
    pub fn close(&mut self) -> CloseReport {
        if self.closed {
            return CloseReport::already_closed();
        }
        self.closed = true;
        let mut report = CloseReport::default();
        log::debug!("closing instance on port {}", self.port());

        match self.server.terminate(self.config.shutdown_timeout()) {
            Ok(()) => report.server_stopped = true,
            Err(e) => {
                log::warn!("{e}");
                report.failures.push(e);
            }
        }

        report.port_released = self.port.release();

        if let Some(dir) = self.data_dir.take() {
            report.data_dir = if report.server_stopped {
                match dir.cleanup() {
                    Ok(disposition) => Some(disposition),
                    Err(e) => {
                        log::warn!("{e}");
                        report.failures.push(e);
                        None
                    }
                }
            } else {
                Some(dir.retain(KeepReason::ServerNotStopped))
            };
        }

        report
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if !self.closed {
            for failure in self.close().failures {
                log::warn!("while dropping instance: {failure}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::config::InstanceOptions;
    use crate::data_dir::DataDirectoryManager;
    use crate::port::PortRegistry;

    type Parts = (InstanceConfig, Arc<PortRegistry>, PortReservation, DataDirectory);

    fn parts(root: &TempDir) -> Parts {
        let config = InstanceConfig::default();
        let registry = PortRegistry::shared();
        let port = Port::try_from(55_432).unwrap();
        assert!(registry.try_reserve(port));
        let reservation = PortReservation::new(port, Arc::clone(&registry));
        let dir = DataDirectoryManager::new(root.path())
            .resolve(&config)
            .unwrap();
        (config, registry, reservation, dir)
    }

    fn no_binaries() -> PgBinaries {
        PgBinaries {
            initdb: PathBuf::from("/nonexistent/initdb"),
            postgres: PathBuf::from("/nonexistent/postgres"),
        }
    }

    #[test]
    fn test_close_never_started_instance() {
        let root = TempDir::new().unwrap();
        let (config, registry, reservation, dir) = parts(&root);
        let mut instance = Instance::new(config, no_binaries(), reservation, dir);
        let path = instance.data_dir().to_path_buf();
        assert!(path.exists());
        assert!(instance.connection_params().is_some());

        let report = instance.close();
        assert!(report.is_clean());
        assert!(report.server_stopped);
        assert!(report.port_released);
        assert_eq!(report.data_dir, Some(DirectoryDisposition::Removed));
        assert!(!path.exists());
        assert!(registry.is_empty());

        assert!(instance.connection_params().is_none());
        assert!(instance.admin_params().is_none());
        assert!(matches!(instance.connect(), Err(Error::InstanceClosed)));
    }

    #[test]
    fn test_double_close_is_noop() {
        let root = TempDir::new().unwrap();
        let (config, _registry, reservation, dir) = parts(&root);
        let mut instance = Instance::new(config, no_binaries(), reservation, dir);

        assert!(instance.close().is_clean());
        let second = instance.close();
        assert!(second.already_closed);
        assert!(!second.port_released);
        assert!(second.data_dir.is_none());
        assert!(second.into_result().is_ok());
    }

    #[test]
    fn test_failed_bring_up_then_close() {
        let root = TempDir::new().unwrap();
        let (config, _registry, reservation, dir) = parts(&root);
        let mut instance = Instance::new(config, no_binaries(), reservation, dir);

        let err = instance.bring_up().unwrap_err();
        assert!(matches!(err, Error::Launch { .. }));
        assert_eq!(instance.server_state(), ServerState::Failed);

        let report = instance.close();
        assert!(report.is_clean());
        assert_eq!(report.data_dir, Some(DirectoryDisposition::Removed));
    }

    #[test]
    fn test_external_dir_survives_drop() {
        let root = TempDir::new().unwrap();
        let external = root.path().join("nested").join("pgdata");
        let config = InstanceConfig::new(InstanceOptions {
            data_dir: Some(external.clone()),
            ..InstanceOptions::default()
        })
        .unwrap();
        let registry = PortRegistry::shared();
        let port = Port::try_from(55_433).unwrap();
        assert!(registry.try_reserve(port));
        let dir = DataDirectoryManager::new(root.path())
            .resolve(&config)
            .unwrap();
        fs::write(external.join("marker"), "keep me").unwrap();

        let instance = Instance::new(
            config,
            no_binaries(),
            PortReservation::new(port, Arc::clone(&registry)),
            dir,
        );
        assert_eq!(instance.data_dir_ownership(), Ownership::External);
        drop(instance);

        assert!(external.join("marker").exists());
        assert!(!registry.is_reserved(port));
    }

    #[test]
    fn test_into_result_returns_first_failure() {
        let report = CloseReport {
            failures: vec![
                Error::Termination {
                    pid: 1,
                    reason: "stuck".to_string(),
                },
                Error::InstanceClosed,
            ],
            ..CloseReport::default()
        };
        assert!(!report.is_clean());
        assert!(matches!(
            report.into_result(),
            Err(Error::Termination { pid: 1, .. })
        ));
    }
}
