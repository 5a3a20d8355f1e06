//! Port allocation.
//!
//! A candidate port is handed out only when it is absent from the
//! [`PortRegistry`], the occupancy probe reports it free, and the registry
//! insert succeeds. The insert is the commit point; losing a race on it just
//! moves the scan on to the next candidate.

use std::sync::Arc;

use rand::Rng;

use crate::error::Error;
use crate::{Port, PortRange, Result};

use super::occupancy::{PortOccupancyChecker, SystemOccupancyChecker};
use super::registry::{PortRegistry, PortReservation};

/// Default number of candidates tried before giving up.
pub const DEFAULT_MAX_ATTEMPTS: usize = 128;

/// Hands out ports from a range, recording them in a shared registry.
///
/// # Examples
///
/// ```
/// use epg::port::{MockOccupancyChecker, PortAllocator, PortRegistry};
/// use epg::PortRange;
///
/// let registry = PortRegistry::shared();
/// let range = PortRange::from_bounds(56000, 56009).unwrap();
/// let allocator = PortAllocator::new(MockOccupancyChecker::empty(), registry.clone(), range);
///
/// let reservation = allocator.allocate().unwrap();
/// assert!(range.contains(reservation.port()));
/// assert!(registry.is_reserved(reservation.port()));
/// ```
#[derive(Debug)]
pub struct PortAllocator<C: PortOccupancyChecker = SystemOccupancyChecker> {
    checker: C,
    registry: Arc<PortRegistry>,
    range: PortRange,
    max_attempts: usize,
}

impl<C: PortOccupancyChecker> PortAllocator<C> {
    /// Creates an allocator over `range`.
    #[must_use]
    pub fn new(checker: C, registry: Arc<PortRegistry>, range: PortRange) -> Self {
        Self {
            checker,
            registry,
            range,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Caps how many candidates a single allocation tries (at least one).
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// The range searched by [`allocate`](Self::allocate).
    #[must_use]
    pub fn range(&self) -> PortRange {
        self.range
    }

    /// The registry ports are recorded in.
    #[must_use]
    pub fn registry(&self) -> &Arc<PortRegistry> {
        &self.registry
    }

    /// Candidate cap per allocation.
    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Allocates a port, starting the scan at a random point in the range.
    ///
    /// Random starting points keep concurrent test processes from all
    /// fighting over the bottom of the range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PortExhausted`] if no candidate is usable within
    /// the attempt cap.
    pub fn allocate(&self) -> Result<PortReservation> {
        let offset = rand::thread_rng().gen_range(0..self.range.len());
        self.allocate_from(offset)
    }

    /// Allocates a port, starting the scan `offset` ports above the range
    /// minimum and wrapping around.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PortExhausted`] if no candidate is usable within
    /// the attempt cap.
    pub fn allocate_from(&self, offset: u32) -> Result<PortReservation> {
        let mut attempts = 0;
        for port in self.range.iter_from(offset).take(self.max_attempts) {
            attempts += 1;
            if self.availability(port) != PortAvailability::Available {
                continue;
            }
            if self.registry.try_reserve(port) {
                log::debug!("allocated port {port} after {attempts} attempt(s)");
                return Ok(PortReservation::new(port, Arc::clone(&self.registry)));
            }
            log::trace!("lost race for port {port}");
        }
        Err(Error::PortExhausted {
            range: self.range,
            attempts,
        })
    }

    /// Reserves a specific port chosen by the caller.
    ///
    /// The port does not have to lie inside the allocator's range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if another live instance holds the
    /// port, or [`Error::PortExhausted`] if something else is bound to it.
    pub fn reserve(&self, port: Port) -> Result<PortReservation> {
        let in_use = || {
            Error::configuration(
                "port",
                format!("port {port} is already used by another instance"),
            )
        };
        match self.availability(port) {
            PortAvailability::Reserved => return Err(in_use()),
            PortAvailability::Occupied => {
                return Err(Error::PortExhausted {
                    range: PortRange::single(port),
                    attempts: 1,
                })
            }
            PortAvailability::Available => {}
        }
        if !self.registry.try_reserve(port) {
            return Err(in_use());
        }
        log::debug!("reserved requested port {port}");
        Ok(PortReservation::new(port, Arc::clone(&self.registry)))
    }

    /// Classifies a single port.
    pub(super) fn availability(&self, port: Port) -> PortAvailability {
        if self.registry.is_reserved(port) {
            return PortAvailability::Reserved;
        }
        // A probe that fails counts as occupied.
        let occupied = self.checker.is_occupied(port).unwrap_or(true);
        if occupied {
            PortAvailability::Occupied
        } else {
            PortAvailability::Available
        }
    }
}

/// Why a port can or cannot be handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PortAvailability {
    /// Free to allocate.
    Available,
    /// Held by an instance in this process.
    Reserved,
    /// Bound by something on the system.
    Occupied,
}
