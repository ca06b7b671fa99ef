//! Property-based tests for the routing invariants.
//!
//! # Invariants tested
//!
//! - **Prefix capacity:** the running load never exceeds the vehicle's
//!   capacity at any stop.
//! - **Depot endpoints:** every route starts and ends at the depot.
//! - **Coverage:** each site is visited by exactly one route.
//! - **Bike ceiling:** no site heavier than the bike ceiling is converted.
//! - **Serviceable anchors:** converted totes only land on aggregation points
//!   a bike may serve.
//! - **Loop preservation:** combining reorders a loop but never changes its
//!   stops.

use std::collections::HashMap;
use std::time::Duration;

use geo::Coord;
use proptest::prelude::*;
use totefleet_core::test_support::{NearestNeighbourBackend, StubCostProvider};
use totefleet_core::{
    BikeConversion, CombineMode, CombineRequest, Eligibility, Location, LocationId, MatrixBuilder, Objective,
    Route, RouteSolverAdapter, RoutingProblem, ServiceKind, SiteRecord, StopLoad, TravelMode,
    VehicleKind, VehicleProfile, combine_loops, extract_demand, segment_by_vehicle_type,
    segment_loops,
};

/// Depot at the origin followed by sites with the generated demands.
fn site_strategy(max_sites: usize) -> impl Strategy<Value = Vec<SiteRecord>> {
    proptest::collection::vec((-50.0_f64..50.0, -50.0_f64..50.0, 1_u32..=9, 0_u32..=3), 1..=max_sites)
        .prop_map(|specs| {
            std::iter::once(SiteRecord::new(0, Coord { x: 0.0, y: 0.0 }).depot())
                .chain(specs.into_iter().enumerate().map(|(offset, (x, y, pickup, dropoff))| {
                    SiteRecord::new(offset as LocationId + 1, Coord { x, y })
                        .with_volumes(f64::from(pickup), f64::from(dropoff))
                }))
                .collect()
        })
}

fn locations_for(sites: &[SiteRecord]) -> (Vec<Location>, totefleet_core::DistanceMatrix) {
    let builder = MatrixBuilder::new(StubCostProvider::planar());
    let matrix = builder
        .build(sites, TravelMode::Driving)
        .expect("planar matrix");
    let locations = extract_demand(sites, &matrix).expect("aligned sites");
    (locations, matrix)
}

fn solve_pickups(
    locations: &[Location],
    matrix: &totefleet_core::DistanceMatrix,
    capacity: u32,
) -> Vec<Route> {
    let loads: Vec<StopLoad> = locations
        .iter()
        .map(|l| StopLoad::pickup(l.pickup_demand))
        .collect();
    let problem = RoutingProblem {
        matrix,
        loads: &loads,
        depot: 0,
        vehicle: VehicleKind::Truck,
        service: ServiceKind::Pickup,
        capacity,
        vehicle_count: locations.len(),
        cost_per_unit: 1.0,
        objective: Objective::Distance,
        time_limit: Duration::from_secs(1),
        seed: 0,
    };
    RouteSolverAdapter::new(NearestNeighbourBackend)
        .solve(&problem)
        .expect("one site per vehicle always fits")
}

fn sorted(stops: &[LocationId]) -> Vec<LocationId> {
    let mut stops = stops.to_vec();
    stops.sort_unstable();
    stops
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: pickup routes respect capacity at every prefix, start and
    /// end at the depot and cover every site exactly once.
    #[test]
    fn pickup_routes_are_feasible(
        sites in site_strategy(12),
        capacity in 9_u32..=20,
    ) {
        let (locations, matrix) = locations_for(&sites);
        let routes = solve_pickups(&locations, &matrix, capacity);

        let mut visits: HashMap<LocationId, usize> = HashMap::new();
        for route in &routes {
            prop_assert_eq!(route.stops.first(), Some(&0));
            prop_assert_eq!(route.stops.last(), Some(&0));
            prop_assert_eq!(route.loads.len(), route.stops.len());
            prop_assert!(
                route.loads.iter().all(|&load| load <= u64::from(capacity)),
                "loads {:?} exceed {}", route.loads, capacity
            );
            for &id in route.visits() {
                *visits.entry(id).or_default() += 1;
            }
        }
        prop_assert_eq!(visits.len(), sites.len() - 1);
        prop_assert!(visits.values().all(|&count| count == 1));
    }

    /// Property: a site whose demand exceeds the bike ceiling never moves to
    /// bike service, however close it is to an aggregation point.
    #[test]
    fn heavy_sites_stay_on_trucks(
        mut sites in site_strategy(10),
        ceiling in 0_u32..=10,
        threshold in 0.0_f64..150.0,
    ) {
        if let Some(anchor) = sites.get_mut(1) {
            anchor.is_aggregation_point = true;
        }
        let (locations, matrix) = locations_for(&sites);
        let config = BikeConversion {
            enabled: true,
            distance_threshold: threshold,
            bike_capacity_ceiling: ceiling,
        };
        let split = segment_by_vehicle_type(&locations, &matrix, &config)
            .expect("one depot");

        for conversion in split.conversions() {
            let original = locations
                .iter()
                .find(|l| l.id == conversion.location)
                .expect("converted site exists");
            prop_assert!(original.total_demand() <= u64::from(ceiling));
            prop_assert!(conversion.distance < threshold);
        }
        for &index in split.indices(VehicleKind::Bike).iter().skip(1) {
            let location = &locations[index];
            prop_assert!(
                location.is_bike_only() || location.total_demand() <= u64::from(ceiling)
            );
        }
        let converted: u64 = split.conversions().iter().map(|c| u64::from(c.totes)).sum();
        let anchor_gain = u64::from(split.locations()[1].pickup_demand)
            - u64::from(locations[1].pickup_demand);
        prop_assert_eq!(anchor_gain, converted);
    }

    /// Property: every conversion names a bike-serviceable aggregation point
    /// as its anchor, and truck-only aggregation points keep their demand.
    #[test]
    fn conversion_anchors_are_bike_serviceable(
        mut sites in site_strategy(10),
        eligibilities in proptest::collection::vec(
            prop_oneof![
                Just(Eligibility::Truck),
                Just(Eligibility::Bike),
                Just(Eligibility::Both),
            ],
            3,
        ),
        threshold in 0.0_f64..150.0,
    ) {
        for (site, eligibility) in sites.iter_mut().skip(1).zip(eligibilities) {
            site.is_aggregation_point = true;
            site.eligibility = eligibility;
        }
        let (locations, matrix) = locations_for(&sites);
        let config = BikeConversion {
            enabled: true,
            distance_threshold: threshold,
            bike_capacity_ceiling: 12,
        };
        let split = segment_by_vehicle_type(&locations, &matrix, &config)
            .expect("one depot");

        for conversion in split.conversions() {
            let anchor = locations
                .iter()
                .find(|l| l.id == conversion.anchor)
                .expect("anchor exists");
            prop_assert!(anchor.is_aggregation_point);
            prop_assert!(anchor.is_bike_serviceable(), "anchor {} is truck-only", anchor.id);
        }
        for (before, after) in locations.iter().zip(split.locations()) {
            if before.is_aggregation_point && !before.is_bike_serviceable() {
                prop_assert_eq!(before.pickup_demand, after.pickup_demand);
            }
        }
    }

    /// Property: every combined route visits exactly the stops of its loop,
    /// and every excluded loop keeps its stops for reporting.
    #[test]
    fn combining_preserves_loop_stops(
        sites in site_strategy(10),
        capacity in 9_u32..=14,
        headroom in 0_u32..=10,
        depart_loaded in any::<bool>(),
    ) {
        let (locations, matrix) = locations_for(&sites);
        let routes = solve_pickups(&locations, &matrix, capacity);
        let loops = segment_loops(&routes);
        let profile = VehicleProfile::new(VehicleKind::Truck, capacity, routes.len())
            .with_combined_capacity(capacity + headroom);
        let request = CombineRequest {
            locations: &locations,
            matrix: &matrix,
            profile: &profile,
            mode: if depart_loaded { CombineMode::DepartLoaded } else { CombineMode::Additive },
            objective: Objective::Distance,
            time_limit: Duration::from_secs(1),
            seed: 0,
        };
        let adapter = RouteSolverAdapter::new(NearestNeighbourBackend);
        let outcome = combine_loops(&adapter, &loops, &request).expect("no backend faults");

        prop_assert_eq!(outcome.routes.len() + outcome.exclusions.len(), loops.len());
        for route in &outcome.routes {
            let origin = loops
                .iter()
                .find(|l| l.vehicle_index == route.vehicle_index)
                .expect("route comes from a loop");
            prop_assert_eq!(sorted(&origin.stops), sorted(route.visits()));
            prop_assert!(route.loads.iter().all(|&load| load <= u64::from(route.capacity)));
        }
        for exclusion in &outcome.exclusions {
            let origin = loops
                .iter()
                .find(|l| l.index == exclusion.loop_index)
                .expect("exclusion comes from a loop");
            prop_assert_eq!(&origin.stops, &exclusion.stops);
        }
    }
}
