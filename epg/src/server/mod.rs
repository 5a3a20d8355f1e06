//! The PostgreSQL server process controller.
//!
//! A [`ServerProcess`] walks one server through its lifecycle:
//!
//! ```text
//! Uninitialized -> Initializing -> Starting -> Ready -> Stopping -> Stopped
//! ```
//!
//! Any step can end in `Failed`. [`ServerProcess::terminate`] is valid from
//! every state and safe to repeat.

pub mod binaries;
pub mod initdb;
pub mod readiness;

use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use wait_timeout::ChildExt;

pub use binaries::PgBinaries;
pub use initdb::{has_cluster, initialize_cluster, InitOutcome};
pub use readiness::{Backoff, ClientProbe, ReadinessProbe, TcpProbe};

use crate::config::{InstanceConfig, DEFAULT_SHUTDOWN_TIMEOUT};
use crate::error::{Error, Result};
use crate::port::Port;
use readiness::WaitFailure;

/// Server log written inside the data directory.
pub const LOG_FILE: &str = "epg-server.log";

/// How much of the server log is attached to errors.
pub const LOG_TAIL_BYTES: u64 = 4096;

/// How long to wait for exit after SIGKILL.
const KILL_WAIT: Duration = Duration::from_secs(5);

/// How long an aborted startup gets to exit after SIGQUIT.
const ABORT_WAIT: Duration = Duration::from_secs(2);

/// Lifecycle state of a [`ServerProcess`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Nothing has run yet.
    Uninitialized,
    /// `initdb` is running.
    Initializing,
    /// A cluster exists; the server is launching or awaiting readiness.
    Starting,
    /// The server accepts clients.
    Ready,
    /// Shutdown is in progress.
    Stopping,
    /// The server has exited, or never ran.
    Stopped,
    /// A step failed.
    Failed,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One PostgreSQL server bound to one data directory and one port.
#[derive(Debug)]
pub struct ServerProcess {
    binaries: PgBinaries,
    data_dir: PathBuf,
    port: Port,
    state: ServerState,
    child: Option<Child>,
    init_outcome: Option<InitOutcome>,
}

impl ServerProcess {
    /// A controller that has not touched the filesystem yet.
    #[must_use]
    pub fn new(binaries: PgBinaries, data_dir: impl Into<PathBuf>, port: Port) -> Self {
        Self {
            binaries,
            data_dir: data_dir.into(),
            port,
            state: ServerState::Uninitialized,
            child: None,
            init_outcome: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// The port the server listens on.
    #[must_use]
    pub fn port(&self) -> Port {
        self.port
    }

    /// The data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// PID of the running server, if any.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Result of [`Self::initialize`], once it has run.
    #[must_use]
    pub fn init_outcome(&self) -> Option<InitOutcome> {
        self.init_outcome
    }

    /// Path of the server log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(LOG_FILE)
    }

    /// Creates the cluster, or adopts an existing one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless uninitialized, otherwise the
    /// error from [`initialize_cluster`].
    pub fn initialize(&mut self, config: &InstanceConfig) -> Result<InitOutcome> {
        self.expect_state("initialize", ServerState::Uninitialized)?;
        self.state = ServerState::Initializing;
        match initialize_cluster(&self.binaries, &self.data_dir, config) {
            Ok(outcome) => {
                self.init_outcome = Some(outcome);
                self.state = ServerState::Starting;
                Ok(outcome)
            }
            Err(e) => {
                self.state = ServerState::Failed;
                Err(e)
            }
        }
    }

    /// Spawns the server on loopback with the configured settings.
    ///
    /// Unix sockets are disabled so the server only listens on
    /// `127.0.0.1:<port>`. Output goes to [`LOG_FILE`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the cluster is initialized and
    /// no server runs yet, or [`Error::Launch`] if spawning fails.
    pub fn launch(&mut self, config: &InstanceConfig) -> Result<()> {
        let mut cmd = Command::new(&self.binaries.postgres);
        cmd.arg("-D")
            .arg(&self.data_dir)
            .arg("-p")
            .arg(self.port.to_string())
            .args(["-h", "127.0.0.1", "-F", "-c", "unix_socket_directories="]);
        for (key, value) in config.server_config() {
            cmd.arg("-c").arg(format!("{key}={value}"));
        }
        log::info!(
            "launching server on port {} in {}",
            self.port,
            self.data_dir.display()
        );
        self.spawn(cmd)
    }

    /// Spawns `cmd` as this controller's server process.
    pub(crate) fn spawn(&mut self, mut cmd: Command) -> Result<()> {
        self.expect_state("launch", ServerState::Starting)?;
        if self.child.is_some() {
            return Err(self.invalid_state("launch"));
        }

        let log = File::create(self.log_path())?;
        let log_err = log.try_clone()?;
        // own process group: a terminal Ctrl-C reaches us, not the server
        cmd.stdin(Stdio::null())
            .stdout(log)
            .stderr(log_err)
            .process_group(0);

        let program = PathBuf::from(cmd.get_program());
        match cmd.spawn() {
            Ok(child) => {
                log::debug!("server pid {}", child.id());
                self.child = Some(child);
                Ok(())
            }
            Err(source) => {
                self.state = ServerState::Failed;
                Err(Error::Launch { program, source })
            }
        }
    }

    /// Blocks until `probe` reports the server ready.
    ///
    /// On timeout the half-started server gets an immediate shutdown
    /// (SIGQUIT), then SIGKILL for its whole process group, and is reaped
    /// before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StartupTimeout`] or [`Error::ServerExited`] with the
    /// tail of the server log attached.
    pub fn await_ready(&mut self, timeout: Duration, probe: &dyn ReadinessProbe) -> Result<()> {
        self.expect_state("await_ready", ServerState::Starting)?;
        let port = self.port;
        let state = self.state.to_string();
        let Some(child) = self.child.as_mut() else {
            return Err(Error::InvalidState {
                operation: "await_ready",
                state,
            });
        };

        match readiness::wait_until_ready(child, port, timeout, probe) {
            Ok(attempts) => {
                log::info!("server on port {port} ready after {attempts} probe(s)");
                self.state = ServerState::Ready;
                Ok(())
            }
            Err(WaitFailure::TimedOut(waited)) => {
                log::warn!("server on port {port} not ready after {waited:?}, killing it");
                self.abort_child();
                self.state = ServerState::Failed;
                Err(Error::StartupTimeout {
                    port,
                    waited,
                    output: self.log_tail(),
                })
            }
            Err(WaitFailure::Exited(status)) => {
                self.child = None;
                self.state = ServerState::Failed;
                Err(Error::ServerExited {
                    status: status.to_string(),
                    output: self.log_tail(),
                })
            }
            Err(WaitFailure::Io(e)) => {
                self.abort_child();
                self.state = ServerState::Failed;
                Err(Error::Io(e))
            }
        }
    }

    /// Stops the server: SIGINT (fast shutdown), then SIGKILL after
    /// `grace`. Always waits for the process to exit.
    ///
    /// Without a running process this only settles the state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Termination`] if the process cannot be signalled or
    /// reaped. The process is kept so a later call can retry.
    pub fn terminate(&mut self, grace: Duration) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            if self.state != ServerState::Failed {
                self.state = ServerState::Stopped;
            }
            return Ok(());
        };
        self.state = ServerState::Stopping;
        let pid = child.id();

        match child.try_wait() {
            Ok(Some(status)) => {
                log::debug!("server pid {pid} had already exited ({status})");
                self.state = ServerState::Stopped;
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => return Err(self.termination_failed(child, &e.to_string())),
        }

        match send_signal(pid, Signal::SIGINT) {
            Ok(()) => match child.wait_timeout(grace) {
                Ok(Some(status)) => {
                    log::info!("server pid {pid} stopped ({status})");
                    self.state = ServerState::Stopped;
                    return Ok(());
                }
                Ok(None) => {
                    log::warn!("server pid {pid} still running after {grace:?}, killing it");
                }
                Err(e) => log::warn!("waiting for server pid {pid}: {e}"),
            },
            Err(reason) => log::warn!("cannot signal server pid {pid}: {reason}"),
        }

        let _ = signal_group(pid, Signal::SIGKILL);
        if let Err(e) = child.kill() {
            return Err(self.termination_failed(child, &format!("SIGKILL failed: {e}")));
        }
        match child.wait_timeout(KILL_WAIT) {
            Ok(Some(status)) => {
                log::info!("server pid {pid} killed ({status})");
                self.state = ServerState::Stopped;
                Ok(())
            }
            Ok(None) => Err(self.termination_failed(child, "still running after SIGKILL")),
            Err(e) => Err(self.termination_failed(child, &e.to_string())),
        }
    }

    /// The last [`LOG_TAIL_BYTES`] of the server log, empty if unreadable.
    #[must_use]
    pub fn log_tail(&self) -> String {
        read_tail(&self.log_path(), LOG_TAIL_BYTES).unwrap_or_default()
    }

    fn termination_failed(&mut self, child: Child, reason: &str) -> Error {
        let pid = child.id();
        self.child = Some(child);
        self.state = ServerState::Failed;
        let tail = self.log_tail();
        let reason = if tail.is_empty() {
            reason.to_string()
        } else {
            format!("{reason}:\n{tail}")
        };
        Error::Termination { pid, reason }
    }

    fn abort_child(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        let pid = child.id();
        let _ = send_signal(pid, Signal::SIGQUIT);
        if let Ok(Some(_)) = child.wait_timeout(ABORT_WAIT) {
            return;
        }
        let _ = signal_group(pid, Signal::SIGKILL);
        let _ = child.kill();
        let _ = child.wait();
    }

    fn expect_state(&self, operation: &'static str, expected: ServerState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn invalid_state(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            operation,
            state: self.state.to_string(),
        }
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        if self.child.is_some() {
            if let Err(e) = self.terminate(DEFAULT_SHUTDOWN_TIMEOUT) {
                log::warn!("failed to stop server on drop: {e}");
            }
        }
    }
}

fn send_signal(pid: u32, signal: Signal) -> std::result::Result<(), String> {
    let raw = i32::try_from(pid).map_err(|_| format!("pid {pid} out of range"))?;
    match kill(Pid::from_raw(raw), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(errno.to_string()),
    }
}

/// Signals the process group led by `pid`.
fn signal_group(pid: u32, signal: Signal) -> std::result::Result<(), String> {
    let raw = i32::try_from(pid).map_err(|_| format!("pid {pid} out of range"))?;
    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(errno.to_string()),
    }
}

/// Last `max` bytes of `path`, starting at a line boundary when cut.
fn read_tail(path: &Path, max: u64) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let len = fs::metadata(path)?.len();
    let start = len.saturating_sub(max);
    file.seek(SeekFrom::Start(start))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    let text = String::from_utf8_lossy(&buf);
    let text = if start > 0 {
        text.split_once('\n').map_or(&*text, |(_, rest)| rest)
    } else {
        &text
    };
    Ok(text.trim_end().to_string())
}
