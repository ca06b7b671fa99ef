//! Property-based tests for the savings backend.
//!
//! # Invariants tested
//!
//! - **Coverage:** every non-depot row appears in exactly one route.
//! - **Capacity:** running loads with mixed pickups and deliveries never
//!   exceed the vehicle capacity.
//! - **Determinism:** the same problem always yields the same routes.

#![expect(
    clippy::expect_used,
    reason = "property tests use expect for readable failures"
)]

use std::time::Duration;

use proptest::prelude::*;
use totefleet_core::test_support::line_matrix;
use totefleet_core::{
    Objective, RouteSolverAdapter, RoutingProblem, ServiceKind, StopLoad, VehicleKind,
};
use totefleet_solver_savings::SavingsSolver;

/// Per-vehicle capacity for generated instances.
const CAPACITY: u32 = 12;

fn loads_strategy() -> impl Strategy<Value = Vec<StopLoad>> {
    prop::collection::vec((0_u32..=6, 0_u32..=6), 1..=12).prop_map(|stops| {
        std::iter::once(StopLoad::default())
            .chain(
                stops
                    .into_iter()
                    .map(|(pickup, delivery)| StopLoad::new(pickup, delivery)),
            )
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Property: with one vehicle per stop the backend always succeeds and
    /// every route respects capacity.
    #[test]
    fn routes_cover_stops_within_capacity(loads in loads_strategy()) {
        let matrix = line_matrix(loads.len());
        let problem = RoutingProblem {
            matrix: &matrix,
            loads: &loads,
            depot: 0,
            vehicle: VehicleKind::Bike,
            service: ServiceKind::Combined,
            capacity: CAPACITY,
            vehicle_count: loads.len(),
            cost_per_unit: 1.0,
            objective: Objective::Distance,
            time_limit: Duration::from_secs(1),
            seed: 0,
        };
        let adapter = RouteSolverAdapter::new(SavingsSolver::new());

        let routes = adapter.solve(&problem).expect("one vehicle per stop always fits");
        let again = adapter.solve(&problem).expect("deterministic");

        let mut visited: Vec<_> = routes.iter().flat_map(|route| route.visits().to_vec()).collect();
        visited.sort_unstable();
        let expected: Vec<u64> = (1..).take(loads.len() - 1).collect();
        prop_assert_eq!(visited, expected);
        prop_assert!(routes.iter().all(|route| route.peak_load() <= u64::from(CAPACITY)));
        prop_assert_eq!(routes, again);
    }
}
