//! Readiness probing for a freshly launched server.
//!
//! The server counts as ready once a client can log in and run a query. A
//! bound TCP socket is not enough: PostgreSQL accepts connections during
//! recovery and rejects them with "the database system is starting up".

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::process::{Child, ExitStatus};
use std::time::{Duration, Instant};

use postgres::NoTls;
use wait_timeout::ChildExt;

use crate::config::{DEFAULT_DATABASE, SUPERUSER};
use crate::port::Port;

/// First delay between probe attempts.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(10);

/// Upper bound on the delay between probe attempts.
pub const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// Per-attempt connect timeout.
pub const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// A check that the server on `port` accepts clients.
pub trait ReadinessProbe {
    /// Returns true once the server is usable.
    fn is_ready(&self, port: Port) -> bool;
}

/// Logs in with the PostgreSQL client and runs `SELECT 1`.
#[derive(Debug, Clone)]
pub struct ClientProbe {
    user: String,
    password: String,
    database: String,
    connect_timeout: Duration,
}

impl ClientProbe {
    /// Probes as the superuser against the `postgres` database.
    #[must_use]
    pub fn superuser(password: &str) -> Self {
        Self {
            user: SUPERUSER.to_string(),
            password: password.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            connect_timeout: PROBE_CONNECT_TIMEOUT,
        }
    }

    /// Overrides the per-attempt connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl ReadinessProbe for ClientProbe {
    fn is_ready(&self, port: Port) -> bool {
        let result = postgres::Config::new()
            .host(&Ipv4Addr::LOCALHOST.to_string())
            .port(port.value())
            .user(&self.user)
            .password(&self.password)
            .dbname(&self.database)
            .connect_timeout(self.connect_timeout)
            .connect(NoTls);
        match result {
            Ok(mut client) => client.simple_query("SELECT 1").is_ok(),
            Err(e) => {
                log::trace!("readiness probe on port {port}: {e}");
                false
            }
        }
    }
}

/// Succeeds as soon as the port accepts a TCP connection.
#[derive(Debug, Clone, Copy)]
pub struct TcpProbe {
    connect_timeout: Duration,
}

impl TcpProbe {
    /// A probe with the given connect timeout.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(PROBE_CONNECT_TIMEOUT)
    }
}

impl ReadinessProbe for TcpProbe {
    fn is_ready(&self, port: Port) -> bool {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port.value()));
        TcpStream::connect_timeout(&addr, self.connect_timeout).is_ok()
    }
}

/// Doubling delays from [`INITIAL_BACKOFF`] up to [`MAX_BACKOFF`].
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    /// Starts at `initial`, never exceeding `max`.
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            next: initial.min(max),
            max,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_BACKOFF, MAX_BACKOFF)
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = (current * 2).min(self.max);
        Some(current)
    }
}

/// Why waiting for readiness stopped without success.
#[derive(Debug)]
pub(crate) enum WaitFailure {
    TimedOut(Duration),
    Exited(ExitStatus),
    Io(io::Error),
}

/// Polls `probe` until it succeeds, the child exits or `timeout` passes.
///
/// The child is watched between attempts, so a crashing server is noticed
/// without waiting out the deadline.
pub(crate) fn wait_until_ready(
    child: &mut Child,
    port: Port,
    timeout: Duration,
    probe: &dyn ReadinessProbe,
) -> Result<u32, WaitFailure> {
    let start = Instant::now();
    let mut backoff = Backoff::default();
    let mut attempts = 0u32;

    loop {
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(WaitFailure::TimedOut(elapsed));
        }

        attempts += 1;
        if probe.is_ready(port) {
            return Ok(attempts);
        }

        let remaining = timeout.saturating_sub(start.elapsed());
        let delay = backoff.next().unwrap_or(MAX_BACKOFF).min(remaining);
        match child.wait_timeout(delay) {
            Ok(Some(status)) => return Err(WaitFailure::Exited(status)),
            Ok(None) => {}
            Err(e) => return Err(WaitFailure::Io(e)),
        }
    }
}
