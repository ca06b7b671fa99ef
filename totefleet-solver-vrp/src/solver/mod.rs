//! `VrpSolver` implementation backed by `vrp-core`.

use std::time::Instant;

use log::debug;
use totefleet_core::{RoutingProblem, SolveError, SolverBackend};

use crate::vrp;

/// Configuration for [`VrpSolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrpSolverConfig {
    /// Upper bound on `vrp-core` generations per solve.
    pub max_generations: usize,
}

impl Default for VrpSolverConfig {
    fn default() -> Self {
        Self {
            max_generations: 3000,
        }
    }
}

/// Metaheuristic backend using `vrp-core`.
///
/// Each call builds a fresh `vrp-core` problem, so one instance can serve
/// parallel sweeps. Search runs on a single thread seeded from
/// [`RoutingProblem::seed`]; the problem's time limit bounds wall-clock time
/// and [`VrpSolverConfig::max_generations`] bounds iterations, whichever is
/// reached first.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use totefleet_core::test_support::line_matrix;
/// use totefleet_core::{
///     Objective, RouteSolverAdapter, RoutingProblem, ServiceKind, StopLoad, VehicleKind,
/// };
/// use totefleet_solver_vrp::{VrpSolver, VrpSolverConfig};
///
/// let matrix = line_matrix(4);
/// let loads = [
///     StopLoad::default(),
///     StopLoad::pickup(2),
///     StopLoad::pickup(2),
///     StopLoad::pickup(2),
/// ];
/// let problem = RoutingProblem {
///     matrix: &matrix,
///     loads: &loads,
///     depot: 0,
///     vehicle: VehicleKind::Truck,
///     service: ServiceKind::Pickup,
///     capacity: 4,
///     vehicle_count: 2,
///     cost_per_unit: 1.0,
///     objective: Objective::Distance,
///     time_limit: Duration::from_secs(1),
///     seed: 1,
/// };
/// let solver = VrpSolver::with_config(VrpSolverConfig { max_generations: 50 });
/// let routes = RouteSolverAdapter::new(solver).solve(&problem)?;
/// assert_eq!(routes.len(), 2);
/// # Ok::<(), totefleet_core::SolveError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct VrpSolver {
    config: VrpSolverConfig,
}

impl VrpSolver {
    /// Construct a solver using default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a solver with explicit configuration.
    #[must_use]
    pub const fn with_config(config: VrpSolverConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &VrpSolverConfig {
        &self.config
    }
}

impl SolverBackend for VrpSolver {
    fn name(&self) -> &'static str {
        "vrp"
    }

    fn solve_tours(&self, problem: &RoutingProblem<'_>) -> Result<Vec<Vec<usize>>, SolveError> {
        let started_at = Instant::now();
        let tours = vrp::solve(&self.config, problem)?;
        debug!(
            "vrp-core solved {} {} jobs with {} vehicles in {:?}",
            problem.customers().count(),
            problem.vehicle,
            tours.len(),
            started_at.elapsed()
        );
        Ok(tours)
    }
}

#[cfg(test)]
mod tests;
