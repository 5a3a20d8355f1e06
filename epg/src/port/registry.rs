//! Process-wide record of ports held by live instances.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::Port;

/// Set of ports currently held by instances created in this process.
///
/// Inserting into the registry is the commit point of an allocation: a port
/// belongs to whoever inserted it first. Share one registry between
/// provisioners through an [`Arc`].
///
/// # Examples
///
/// ```
/// use epg::{Port, PortRegistry};
///
/// let registry = PortRegistry::shared();
/// let port = Port::try_from(55000).unwrap();
/// assert!(registry.try_reserve(port));
/// assert!(!registry.try_reserve(port));
/// assert!(registry.release(port));
/// ```
#[derive(Debug, Default)]
pub struct PortRegistry {
    reserved: Mutex<HashSet<Port>>,
}

impl PortRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry behind an [`Arc`].
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Inserts `port`, returning `false` if it was already held.
    pub fn try_reserve(&self, port: Port) -> bool {
        self.ports().insert(port)
    }

    /// Removes `port`, returning `false` if it was not held.
    pub fn release(&self, port: Port) -> bool {
        self.ports().remove(&port)
    }

    /// Whether `port` is currently held.
    #[must_use]
    pub fn is_reserved(&self, port: Port) -> bool {
        self.ports().contains(&port)
    }

    /// Number of held ports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ports().len()
    }

    /// Whether no port is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ports().is_empty()
    }

    /// Snapshot of held ports in ascending order.
    #[must_use]
    pub fn reserved_ports(&self) -> Vec<Port> {
        let mut ports: Vec<Port> = self.ports().iter().copied().collect();
        ports.sort_unstable();
        ports
    }

    // A panic while holding the lock cannot leave the set half-updated.
    fn ports(&self) -> MutexGuard<'_, HashSet<Port>> {
        self.reserved.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A port held in a [`PortRegistry`] on behalf of one instance.
///
/// The port goes back to the registry exactly once: on [`release`] or, if
/// that never happens, on drop.
///
/// [`release`]: PortReservation::release
#[derive(Debug)]
pub struct PortReservation {
    port: Port,
    registry: Arc<PortRegistry>,
    released: bool,
}

impl PortReservation {
    /// Wraps a port that the caller has already inserted into `registry`.
    pub(crate) fn new(port: Port, registry: Arc<PortRegistry>) -> Self {
        Self {
            port,
            registry,
            released: false,
        }
    }

    /// The reserved port.
    #[must_use]
    pub fn port(&self) -> Port {
        self.port
    }

    /// Whether the port has been handed back.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Returns the port to the registry. Returns `false` on repeat calls.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        if !self.registry.release(self.port) {
            log::warn!("port {} was not in the registry on release", self.port);
        }
        log::debug!("released port {}", self.port);
        true
    }
}

impl Drop for PortReservation {
    fn drop(&mut self) {
        self.release();
    }
}
