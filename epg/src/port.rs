//! Port and port range types, plus the allocator that hands out ports to
//! instances.
//!
//! A port handed to an instance is held in the process-wide
//! [`PortRegistry`] until the instance releases it, so no two live instances
//! ever share a port even when they race for the same candidate.

pub mod allocator;
pub mod occupancy;
pub mod registry;

#[cfg(test)]
mod allocator_proptests;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use allocator::PortAllocator;
pub use occupancy::{MockOccupancyChecker, PortOccupancyChecker, SystemOccupancyChecker};
pub use registry::{PortRegistry, PortReservation};

/// A valid TCP port number (1-65535).
///
/// Port 0 is rejected: in configuration it means "pick one for me" and is
/// represented by the absence of a `Port`.
///
/// # Examples
///
/// ```
/// use epg::Port;
///
/// let port = Port::try_from(5432).unwrap();
/// assert_eq!(port.value(), 5432);
/// assert!(Port::try_from(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Port(u16);

impl Port {
    /// Lowest valid port.
    pub const MIN: Self = Self(1);

    /// Highest valid port.
    pub const MAX: Self = Self(u16::MAX);

    /// Returns the numeric port value.
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for Port {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        if value == 0 {
            return Err(Error::InvalidPort {
                value,
                reason: "port 0 is not a concrete port".into(),
            });
        }
        Ok(Self(value))
    }
}

impl From<Port> for u16 {
    fn from(port: Port) -> Self {
        port.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An inclusive range of ports that auto-allocation searches.
///
/// # Examples
///
/// ```
/// use epg::{Port, PortRange};
///
/// let range = PortRange::from_bounds(5000, 5010).unwrap();
/// assert_eq!(range.len(), 11);
/// assert!(range.contains(Port::try_from(5005).unwrap()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortRange {
    min: Port,
    max: Port,
}

impl PortRange {
    /// The IANA dynamic/private range, 49152-65535.
    pub const DYNAMIC: Self = Self {
        min: Port(49152),
        max: Port::MAX,
    };

    /// Creates a new range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPortRange`] if `max` is below `min`.
    pub fn new(min: Port, max: Port) -> Result<Self> {
        if max < min {
            return Err(Error::InvalidPortRange {
                min: min.value(),
                max: max.value(),
                reason: "max must be greater than or equal to min".into(),
            });
        }
        Ok(Self { min, max })
    }

    /// A range holding only `port`.
    #[must_use]
    pub const fn single(port: Port) -> Self {
        Self {
            min: port,
            max: port,
        }
    }

    /// Creates a range from raw bounds, validating both ends.
    ///
    /// # Errors
    ///
    /// Returns an error if either bound is 0 or `max < min`.
    pub fn from_bounds(min: u16, max: u16) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidPortRange {
            min,
            max,
            reason: reason.into(),
        };
        let lo = Port::try_from(min).map_err(|_| invalid("min must be at least 1"))?;
        let hi = Port::try_from(max).map_err(|_| invalid("max must be at least 1"))?;
        Self::new(lo, hi)
    }

    /// Lower bound (inclusive).
    #[must_use]
    pub const fn min(&self) -> Port {
        self.min
    }

    /// Upper bound (inclusive).
    #[must_use]
    pub const fn max(&self) -> Port {
        self.max
    }

    /// Whether `port` falls inside the range.
    #[must_use]
    pub const fn contains(&self, port: Port) -> bool {
        port.0 >= self.min.0 && port.0 <= self.max.0
    }

    /// Number of ports in the range.
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.max.0 as u32 - self.min.0 as u32 + 1
    }

    /// A range always holds at least one port.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Iterates every port in ascending order.
    #[must_use]
    pub fn iter(self) -> PortRangeIter {
        self.iter_from(0)
    }

    /// Iterates every port exactly once, starting `offset` ports above `min`
    /// and wrapping back to `min` after `max`.
    ///
    /// ```
    /// use epg::PortRange;
    ///
    /// let range = PortRange::from_bounds(10, 13).unwrap();
    /// let ports: Vec<u16> = range.iter_from(2).map(|p| p.value()).collect();
    /// assert_eq!(ports, vec![12, 13, 10, 11]);
    /// ```
    #[must_use]
    pub fn iter_from(self, offset: u32) -> PortRangeIter {
        PortRangeIter {
            range: self,
            start: offset % self.len(),
            yielded: 0,
        }
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::DYNAMIC
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

impl IntoIterator for PortRange {
    type Item = Port;
    type IntoIter = PortRangeIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over ports in a [`PortRange`], possibly wrapping around.
#[derive(Debug, Clone)]
pub struct PortRangeIter {
    range: PortRange,
    start: u32,
    yielded: u32,
}

impl Iterator for PortRangeIter {
    type Item = Port;

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.range.len();
        if self.yielded >= len {
            return None;
        }
        let offset = (self.start + self.yielded) % len;
        self.yielded += 1;
        // offset < len, so min + offset never exceeds max
        let value = u32::from(self.range.min.0) + offset;
        u16::try_from(value).ok().map(Port)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.range.len() - self.yielded) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PortRangeIter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_validation() {
        assert!(Port::try_from(0).is_err());
        assert!(Port::try_from(1).is_ok());
        assert!(Port::try_from(65535).is_ok());
    }

    #[test]
    fn test_port_zero_error_message() {
        let err = Port::try_from(0).unwrap_err();
        assert_eq!(err.to_string(), "invalid port 0: port 0 is not a concrete port");
    }

    #[test]
    fn test_port_ordering() {
        let a = Port::try_from(5000).unwrap();
        let b = Port::try_from(5001).unwrap();
        assert!(a < b);
        assert_eq!(Port::MIN.value(), 1);
        assert_eq!(Port::MAX.value(), 65535);
    }

    #[test]
    fn test_port_serde_rejects_zero() {
        let port: Port = serde_json::from_str("5432").unwrap();
        assert_eq!(port.value(), 5432);
        assert_eq!(serde_json::to_string(&port).unwrap(), "5432");
        assert!(serde_json::from_str::<Port>("0").is_err());
    }

    #[test]
    fn test_port_range_invalid() {
        assert!(PortRange::from_bounds(5010, 5000).is_err());
        assert!(PortRange::from_bounds(0, 5000).is_err());
        assert!(PortRange::from_bounds(5000, 5000).is_ok());
    }

    #[test]
    fn test_dynamic_range() {
        let range = PortRange::default();
        assert_eq!(range.min().value(), 49152);
        assert_eq!(range.max().value(), 65535);
        assert_eq!(range.len(), 16384);
        assert_eq!(range.to_string(), "49152-65535");
    }

    #[test]
    fn test_full_range_len_does_not_overflow() {
        let range = PortRange::from_bounds(1, 65535).unwrap();
        assert_eq!(range.len(), 65535);
    }

    #[test]
    fn test_iterator_reaches_max_port() {
        let range = PortRange::from_bounds(65533, 65535).unwrap();
        let ports: Vec<u16> = range.iter().map(Port::value).collect();
        assert_eq!(ports, vec![65533, 65534, 65535]);
    }

    #[test]
    fn test_iter_from_wraps_and_covers_range_once() {
        let range = PortRange::from_bounds(100, 104).unwrap();
        let ports: Vec<u16> = range.iter_from(3).map(Port::value).collect();
        assert_eq!(ports, vec![103, 104, 100, 101, 102]);

        let wrapped: Vec<u16> = range.iter_from(8).map(Port::value).collect();
        assert_eq!(wrapped, vec![103, 104, 100, 101, 102]);
    }

    #[test]
    fn test_iterator_exact_size() {
        let range = PortRange::from_bounds(5000, 5009).unwrap();
        let mut iter = range.iter_from(4);
        assert_eq!(iter.len(), 10);
        iter.next();
        assert_eq!(iter.len(), 9);
        assert_eq!(iter.count(), 9);
    }
}
