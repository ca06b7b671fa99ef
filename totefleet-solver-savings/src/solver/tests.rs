//! Tests for the `SavingsSolver`.

use std::time::Duration;

use super::*;
use rstest::{fixture, rstest};
use totefleet_core::test_support::line_matrix;
use totefleet_core::{DistanceMatrix, Objective, RouteSolverAdapter, ServiceKind, StopLoad, VehicleKind};

struct Instance {
    matrix: DistanceMatrix,
    loads: Vec<StopLoad>,
}

impl Instance {
    fn problem(&self, capacity: u32, vehicle_count: usize) -> RoutingProblem<'_> {
        RoutingProblem {
            matrix: &self.matrix,
            loads: &self.loads,
            depot: 0,
            vehicle: VehicleKind::Truck,
            service: ServiceKind::Pickup,
            capacity,
            vehicle_count,
            cost_per_unit: 1.0,
            objective: Objective::Distance,
            time_limit: Duration::from_secs(1),
            seed: 0,
        }
    }
}

#[fixture]
fn five_stops() -> Instance {
    Instance {
        matrix: line_matrix(6),
        loads: vec![
            StopLoad::default(),
            StopLoad::pickup(3),
            StopLoad::pickup(3),
            StopLoad::pickup(2),
            StopLoad::pickup(4),
            StopLoad::pickup(1),
        ],
    }
}

#[rstest]
fn tours_cover_every_stop_once(five_stops: Instance) {
    let tours = SavingsSolver::new()
        .solve_tours(&five_stops.problem(7, 3))
        .expect("feasible instance");
    let mut visited: Vec<usize> = tours.concat();
    visited.sort_unstable();
    assert_eq!(visited, vec![1, 2, 3, 4, 5]);
}

#[rstest]
fn adapter_accepts_savings_tours(five_stops: Instance) {
    let routes = RouteSolverAdapter::new(SavingsSolver::new())
        .solve(&five_stops.problem(7, 2))
        .expect("13 totes fit in two vehicles of 7");
    assert_eq!(routes.len(), 2);
    assert!(routes.iter().all(|route| route.peak_load() <= 7));
}

#[rstest]
fn equal_problems_give_equal_tours(five_stops: Instance) {
    let solver = SavingsSolver::new();
    let first = solver.solve_tours(&five_stops.problem(7, 3)).expect("feasible");
    let second = solver.solve_tours(&five_stops.problem(7, 3)).expect("feasible");
    assert_eq!(first, second);
}

#[rstest]
fn unpackable_fleet_is_not_found_in_budget() {
    let instance = Instance {
        matrix: line_matrix(4),
        loads: vec![
            StopLoad::default(),
            StopLoad::pickup(4),
            StopLoad::pickup(4),
            StopLoad::pickup(4),
        ],
    };
    let err = SavingsSolver::new()
        .solve_tours(&instance.problem(6, 2))
        .expect_err("three stops of 4 cannot share vehicles of 6");
    assert_eq!(
        err,
        SolveError::NoFeasibleSolution(Infeasibility::NotFoundInBudget)
    );
}

#[rstest]
#[case(true)]
#[case(false)]
fn improvement_never_lengthens_tours(five_stops: Instance, #[case] improve: bool) {
    let improved = RouteSolverAdapter::new(SavingsSolver::with_config(SavingsConfig { improve }))
        .solve(&five_stops.problem(20, 1))
        .expect("one vehicle holds everything");
    let route = improved.first().expect("one route");
    assert_eq!(route.total_distance(), 10.0);
}

#[rstest]
fn backend_reports_its_name() {
    assert_eq!(SavingsSolver::new().name(), "savings");
}
