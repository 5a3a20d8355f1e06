//! Property-based tests for port allocation.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use crate::port::allocator::PortAllocator;
    use crate::port::occupancy::MockOccupancyChecker;
    use crate::port::registry::{PortRegistry, PortReservation};
    use crate::{Error, Port, PortRange};

    /// Small ranges so exhaustion is actually reachable.
    fn port_range_strategy() -> impl Strategy<Value = PortRange> {
        (20000u16..=60000u16, 0u16..=40u16).prop_map(|(min, size)| {
            PortRange::from_bounds(min, min + size).unwrap()
        })
    }

    fn range_with_occupied() -> impl Strategy<Value = (PortRange, HashSet<Port>)> {
        port_range_strategy().prop_flat_map(|range| {
            let ports: Vec<Port> = range.into_iter().collect();
            let max = ports.len();
            (
                Just(range),
                proptest::sample::subsequence(ports, 0..=max)
                    .prop_map(|v| v.into_iter().collect::<HashSet<_>>()),
            )
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Ports handed out while all reservations are live are pairwise
        /// distinct, never occupied, and always inside the range.
        #[test]
        fn prop_allocations_distinct_and_free(
            (range, occupied) in range_with_occupied(),
            requests in 1usize..60,
        ) {
            let allocator = PortAllocator::new(
                MockOccupancyChecker::new(occupied.iter().copied()),
                PortRegistry::shared(),
                range,
            )
            .with_max_attempts(range.len() as usize);

            let mut held: Vec<PortReservation> = Vec::new();
            for _ in 0..requests {
                match allocator.allocate() {
                    Ok(reservation) => held.push(reservation),
                    Err(Error::PortExhausted { .. }) => break,
                    Err(other) => prop_assert!(false, "unexpected error: {other}"),
                }
            }

            let ports: HashSet<Port> = held.iter().map(PortReservation::port).collect();
            prop_assert_eq!(ports.len(), held.len());
            for port in &ports {
                prop_assert!(range.contains(*port));
                prop_assert!(!occupied.contains(port));
            }
        }

        /// Exhaustion happens exactly when every free port is held.
        #[test]
        fn prop_exhaustion_never_over_allocates(
            (range, occupied) in range_with_occupied(),
        ) {
            let registry = PortRegistry::shared();
            let allocator = PortAllocator::new(
                MockOccupancyChecker::new(occupied.iter().copied()),
                registry.clone(),
                range,
            )
            .with_max_attempts(range.len() as usize);

            let free = range.len() as usize - occupied.len();
            let mut held = Vec::new();
            while let Ok(reservation) = allocator.allocate() {
                held.push(reservation);
                prop_assert!(held.len() <= free);
            }
            prop_assert_eq!(held.len(), free);
            prop_assert_eq!(registry.len(), free);

            drop(held);
            prop_assert!(registry.is_empty());
        }

        /// The scan never tries more candidates than allowed.
        #[test]
        fn prop_attempts_bounded(
            range in port_range_strategy(),
            cap in 1usize..20,
        ) {
            let occupied: Vec<Port> = range.into_iter().collect();
            let allocator = PortAllocator::new(
                MockOccupancyChecker::new(occupied),
                PortRegistry::shared(),
                range,
            )
            .with_max_attempts(cap);

            match allocator.allocate() {
                Err(Error::PortExhausted { attempts, .. }) => {
                    prop_assert!(attempts <= cap);
                    prop_assert!(attempts <= range.len() as usize);
                }
                other => prop_assert!(false, "expected exhaustion, got {other:?}"),
            }
        }
    }
}
