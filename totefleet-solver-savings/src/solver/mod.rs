//! `SavingsSolver` implementation.

use std::time::Instant;

use log::debug;
use totefleet_core::{Infeasibility, RoutingProblem, SolveError, SolverBackend};

use crate::{repair, savings, two_opt};

/// Configuration for [`SavingsSolver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavingsConfig {
    /// Run 2-opt on every tour after construction.
    pub improve: bool,
}

impl Default for SavingsConfig {
    fn default() -> Self {
        Self { improve: true }
    }
}

/// Deterministic savings backend.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use totefleet_core::test_support::line_matrix;
/// use totefleet_core::{
///     Objective, RouteSolverAdapter, RoutingProblem, ServiceKind, StopLoad, VehicleKind,
/// };
/// use totefleet_solver_savings::SavingsSolver;
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
///     vehicle: VehicleKind::Bike,
///     service: ServiceKind::Pickup,
///     capacity: 6,
///     vehicle_count: 1,
///     cost_per_unit: 1.0,
///     objective: Objective::Distance,
///     time_limit: Duration::from_secs(1),
///     seed: 0,
/// };
/// let routes = RouteSolverAdapter::new(SavingsSolver::new()).solve(&problem)?;
/// assert_eq!(routes.len(), 1);
/// assert_eq!(routes[0].total_distance(), 6.0);
/// # Ok::<(), totefleet_core::SolveError>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SavingsSolver {
    config: SavingsConfig,
}

impl SavingsSolver {
    /// Construct a solver using default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a solver with explicit configuration.
    #[must_use]
    pub const fn with_config(config: SavingsConfig) -> Self {
        Self { config }
    }
}

impl SolverBackend for SavingsSolver {
    fn name(&self) -> &'static str {
        "savings"
    }

    fn solve_tours(&self, problem: &RoutingProblem<'_>) -> Result<Vec<Vec<usize>>, SolveError> {
        let started_at = Instant::now();
        let deadline = started_at.checked_add(problem.time_limit);

        let constructed = savings::construct(problem);
        let built = constructed.len();
        let mut tours = repair::repair(problem, constructed)
            .ok_or(SolveError::NoFeasibleSolution(Infeasibility::NotFoundInBudget))?;

        let moves: usize = if self.config.improve {
            tours
                .iter_mut()
                .map(|rows| two_opt::improve(problem, rows, deadline))
                .sum()
        } else {
            0
        };
        debug!(
            "savings built {built} {} tours, kept {} after repair, applied {moves} 2-opt moves in {:?}",
            problem.vehicle,
            tours.len(),
            started_at.elapsed()
        );
        Ok(tours)
    }
}

#[cfg(test)]
mod tests;
