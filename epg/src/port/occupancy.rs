//! Port occupancy checking.
//!
//! The registry only knows about ports this process handed out. Anything
//! else on the machine (a developer's local PostgreSQL, another test run)
//! is detected by probing the port itself through a [`PortOccupancyChecker`].

use std::collections::HashSet;
use std::sync::Mutex;

use crate::{Port, Result};

/// Checks whether a port is already in use on the system.
///
/// # Examples
///
/// ```
/// use epg::port::{PortOccupancyChecker, SystemOccupancyChecker};
/// use epg::Port;
///
/// let checker = SystemOccupancyChecker;
/// let port = Port::try_from(55432).unwrap();
/// match checker.is_occupied(port) {
///     Ok(occupied) => println!("55432 occupied: {occupied}"),
///     Err(e) => eprintln!("check failed: {e}"),
/// }
/// ```
pub trait PortOccupancyChecker: Send + Sync {
    /// Returns `Ok(true)` if something is bound to `port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe itself could not be performed.
    fn is_occupied(&self, port: Port) -> Result<bool>;
}

/// Bind probe backed by the `port-selector` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOccupancyChecker;

impl PortOccupancyChecker for SystemOccupancyChecker {
    fn is_occupied(&self, port: Port) -> Result<bool> {
        Ok(!port_selector::is_free(port.value()))
    }
}

/// In-memory checker for tests.
///
/// Ports can be marked occupied or free at any time, including from other
/// threads while an allocation is in progress.
#[derive(Debug, Default)]
pub struct MockOccupancyChecker {
    occupied: Mutex<HashSet<Port>>,
}

impl MockOccupancyChecker {
    /// Creates a checker reporting the given ports as occupied.
    #[must_use]
    pub fn new(occupied: impl IntoIterator<Item = Port>) -> Self {
        Self {
            occupied: Mutex::new(occupied.into_iter().collect()),
        }
    }

    /// Creates a checker that reports every port as free.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Marks a port as occupied.
    pub fn mark_occupied(&self, port: Port) {
        self.ports().insert(port);
    }

    /// Marks a port as free.
    pub fn mark_free(&self, port: Port) {
        self.ports().remove(&port);
    }

    fn ports(&self) -> std::sync::MutexGuard<'_, HashSet<Port>> {
        self.occupied
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl PortOccupancyChecker for MockOccupancyChecker {
    fn is_occupied(&self, port: Port) -> Result<bool> {
        Ok(self.ports().contains(&port))
    }
}

impl<C: PortOccupancyChecker + ?Sized> PortOccupancyChecker for &C {
    fn is_occupied(&self, port: Port) -> Result<bool> {
        (**self).is_occupied(port)
    }
}
