//! Tests for the `VrpSolver`.

use std::time::Duration;

use super::*;
use rstest::{fixture, rstest};
use totefleet_core::test_support::line_matrix;
use totefleet_core::{
    DistanceMatrix, Infeasibility, Objective, RouteSolverAdapter, ServiceKind, StopLoad,
    VehicleKind,
};

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
            seed: 11,
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

#[fixture]
fn solver() -> VrpSolver {
    VrpSolver::with_config(VrpSolverConfig {
        max_generations: 100,
    })
}

#[rstest]
fn tours_cover_every_stop_once(five_stops: Instance, solver: VrpSolver) {
    let tours = solver
        .solve_tours(&five_stops.problem(7, 3))
        .expect("feasible instance");
    let mut visited: Vec<usize> = tours.iter().flatten().copied().collect();
    visited.sort_unstable();
    assert_eq!(visited, vec![1, 2, 3, 4, 5]);
    assert!(tours.iter().all(|tour| !tour.contains(&0)));
}

#[rstest]
fn adapter_accepts_vrp_tours(five_stops: Instance, solver: VrpSolver) {
    let routes = RouteSolverAdapter::new(solver)
        .solve(&five_stops.problem(7, 3))
        .expect("feasible instance");
    assert!(routes.len() >= 2);
    assert!(routes.iter().all(|route| route.peak_load() <= 7));
}

#[rstest]
fn single_vehicle_without_room_is_not_found(five_stops: Instance, solver: VrpSolver) {
    let err = solver
        .solve_tours(&five_stops.problem(7, 1))
        .expect_err("13 totes cannot fit in one vehicle of 7");
    assert_eq!(
        err,
        SolveError::NoFeasibleSolution(Infeasibility::NotFoundInBudget)
    );
}

#[rstest]
fn mixed_loads_respect_departure_load(solver: VrpSolver) {
    let instance = Instance {
        matrix: line_matrix(4),
        loads: vec![
            StopLoad::default(),
            StopLoad::new(2, 3),
            StopLoad::new(3, 1),
            StopLoad::new(1, 2),
        ],
    };
    let routes = RouteSolverAdapter::new(solver)
        .solve(&instance.problem(6, 2))
        .expect("feasible instance");
    assert!(routes.iter().all(|route| route.peak_load() <= 6));
}

#[rstest]
fn duration_objective_is_supported(five_stops: Instance, solver: VrpSolver) {
    let mut problem = five_stops.problem(7, 3);
    problem.objective = Objective::Duration;
    let tours = solver.solve_tours(&problem).expect("feasible instance");
    assert_eq!(tours.iter().map(Vec::len).sum::<usize>(), 5);
}

#[rstest]
fn backend_reports_its_name() {
    assert_eq!(VrpSolver::new().name(), "vrp");
    assert_eq!(VrpSolver::new().config(), &VrpSolverConfig::default());
}
