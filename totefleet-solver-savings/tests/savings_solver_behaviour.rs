//! Behavioural tests for `SavingsSolver` using rstest-bdd.

use std::cell::RefCell;
use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use totefleet_core::test_support::line_matrix;
use totefleet_core::{
    Infeasibility, Objective, Route, RouteSolverAdapter, RoutingProblem, ServiceKind, SolveError,
    StopLoad, VehicleKind,
};
use totefleet_solver_savings::SavingsSolver;

#[derive(Debug)]
struct SavingsWorld {
    loads: RefCell<Vec<StopLoad>>,
    fleet: RefCell<(usize, u32)>,
    outcome: RefCell<Option<Result<Vec<Route>, SolveError>>>,
}

impl SavingsWorld {
    #[expect(
        clippy::expect_used,
        reason = "behaviour tests use expect for readable failures"
    )]
    fn expect_outcome(&self) -> Result<Vec<Route>, SolveError> {
        self.outcome
            .borrow()
            .as_ref()
            .cloned()
            .expect("outcome should be recorded before assertions")
    }
}

#[fixture]
fn world() -> SavingsWorld {
    SavingsWorld {
        loads: RefCell::new(vec![StopLoad::default()]),
        fleet: RefCell::new((1, 1)),
        outcome: RefCell::new(None),
    }
}

#[given("{count} stops on a line each needing {totes} totes")]
fn given_stops(world: &SavingsWorld, count: usize, totes: u32) {
    let loads = std::iter::once(StopLoad::default())
        .chain(std::iter::repeat_n(StopLoad::pickup(totes), count))
        .collect();
    world.loads.replace(loads);
}

#[given("{count} bikes of capacity {capacity}")]
fn given_fleet(world: &SavingsWorld, count: usize, capacity: u32) {
    world.fleet.replace((count, capacity));
}

#[when("the savings backend solves the fleet")]
fn when_solver_runs(world: &SavingsWorld) {
    let loads = world.loads.borrow().clone();
    let (vehicle_count, capacity) = *world.fleet.borrow();
    let matrix = line_matrix(loads.len());
    let problem = RoutingProblem {
        matrix: &matrix,
        loads: &loads,
        depot: 0,
        vehicle: VehicleKind::Bike,
        service: ServiceKind::Pickup,
        capacity,
        vehicle_count,
        cost_per_unit: 1.0,
        objective: Objective::Distance,
        time_limit: Duration::from_secs(1),
        seed: 0,
    };
    let outcome = RouteSolverAdapter::new(SavingsSolver::new()).solve(&problem);
    world.outcome.replace(Some(outcome));
}

#[then("{count} routes are returned")]
#[expect(
    clippy::expect_used,
    reason = "behaviour tests use expect for readable failures"
)]
fn then_route_count(world: &SavingsWorld, count: usize) {
    let routes = world.expect_outcome().expect("expected solve success");
    assert_eq!(routes.len(), count);
}

#[then("every route returns to the depot")]
#[expect(
    clippy::expect_used,
    reason = "behaviour tests use expect for readable failures"
)]
fn then_closed_routes(world: &SavingsWorld) {
    let routes = world.expect_outcome().expect("expected solve success");
    for route in &routes {
        assert_eq!(route.stops.first(), Some(&0));
        assert_eq!(route.stops.last(), Some(&0));
    }
}

#[then("no solution is found within budget")]
#[expect(
    clippy::expect_used,
    reason = "behaviour tests use expect for readable failures"
)]
fn then_not_found(world: &SavingsWorld) {
    let err = world.expect_outcome().expect_err("expected budget exhaustion");
    assert_eq!(
        err,
        SolveError::NoFeasibleSolution(Infeasibility::NotFoundInBudget)
    );
}

#[scenario(path = "tests/features/savings_solver.feature", index = 0)]
fn nearby_stops(world: SavingsWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/savings_solver.feature", index = 1)]
fn surplus_tours(world: SavingsWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/savings_solver.feature", index = 2)]
fn packing_gap(world: SavingsWorld) {
    let _ = world;
}
