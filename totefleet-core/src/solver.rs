//! Capacitated routing problems and the adapter that guards every backend.
//!
//! A [`SolverBackend`] only proposes tours. [`RouteSolverAdapter`] owns the
//! contract around it: it rejects problems that are provably infeasible
//! before the backend runs, checks that whatever comes back visits each
//! location exactly once without overloading a vehicle, and turns the tours
//! into [`Route`] values with running loads and distances.

use std::time::{Duration, Instant};

use log::{debug, warn};
use thiserror::Error;

use crate::{DistanceMatrix, Objective, Route, ServiceKind, StopLoad, VehicleKind, load_profile};

/// Why no feasible solution was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Infeasibility {
    /// The problem cannot be solved under any ordering.
    ProvenInfeasible {
        /// Human-readable cause.
        reason: String,
    },
    /// The backend ran out of time or iterations before covering every
    /// location within capacity.
    NotFoundInBudget,
}

impl std::fmt::Display for Infeasibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProvenInfeasible { reason } => write!(f, "proven infeasible: {reason}"),
            Self::NotFoundInBudget => f.write_str("no feasible solution found within budget"),
        }
    }
}

/// Errors returned by [`RouteSolverAdapter::solve`] and backends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolveError {
    /// No solution satisfies the constraints.
    #[error("no feasible solution: {0}")]
    NoFeasibleSolution(Infeasibility),
    /// The problem itself is malformed, e.g. misaligned loads.
    #[error("invalid problem: {message}")]
    InvalidProblem {
        /// Error detail.
        message: String,
    },
    /// The backend failed or broke its contract.
    #[error("solver backend failed: {message}")]
    Backend {
        /// Error detail.
        message: String,
    },
}

impl SolveError {
    /// Shorthand for a proven-infeasible outcome.
    pub fn proven(reason: impl Into<String>) -> Self {
        Self::NoFeasibleSolution(Infeasibility::ProvenInfeasible {
            reason: reason.into(),
        })
    }

    /// Whether the error reports infeasibility rather than a fault.
    #[must_use]
    pub const fn is_infeasible(&self) -> bool {
        matches!(self, Self::NoFeasibleSolution(_))
    }
}

/// A single-depot capacitated routing problem over one fleet.
///
/// `loads[i]` is the demand at row `i` of `matrix`; the depot row must carry
/// no demand. Every other row is a location the fleet must visit exactly
/// once.
#[derive(Debug, Clone)]
pub struct RoutingProblem<'a> {
    /// Travel costs between all locations including the depot.
    pub matrix: &'a DistanceMatrix,
    /// Demand per matrix row.
    pub loads: &'a [StopLoad],
    /// Row of the depot.
    pub depot: usize,
    /// Vehicle type of the fleet.
    pub vehicle: VehicleKind,
    /// Work done at the stops.
    pub service: ServiceKind,
    /// Per-vehicle capacity.
    pub capacity: u32,
    /// Vehicles available.
    pub vehicle_count: usize,
    /// Cost per distance unit.
    pub cost_per_unit: f64,
    /// Leg component to minimise.
    pub objective: Objective,
    /// Wall-clock budget for the backend.
    pub time_limit: Duration,
    /// Seed for backends with stochastic search.
    pub seed: u64,
}

impl RoutingProblem<'_> {
    /// Rows other than the depot, in ascending order.
    pub fn customers(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.matrix.len()).filter(move |&index| index != self.depot)
    }

    /// Demand at `index`.
    #[must_use]
    pub fn load(&self, index: usize) -> StopLoad {
        self.loads.get(index).copied().unwrap_or_default()
    }

    /// Cost of travelling from `from` to `to` under the objective.
    #[must_use]
    pub fn cost(&self, from: usize, to: usize) -> f64 {
        self.matrix
            .cost(from, to, self.objective)
            .unwrap_or(f64::INFINITY)
    }

    /// Total totes the fleet can carry.
    #[must_use]
    pub const fn fleet_capacity(&self) -> u64 {
        self.capacity as u64 * self.vehicle_count as u64
    }
}

/// Propose tours for a [`RoutingProblem`].
///
/// Each tour lists customer rows in visiting order; the depot may be
/// included at either end or omitted. Backends must be `Send + Sync` so a
/// single instance can serve parallel parameter sweeps.
pub trait SolverBackend: Send + Sync {
    /// Short identifier used in logs and reports.
    fn name(&self) -> &'static str;

    /// Solve `problem`, returning one tour per vehicle used.
    ///
    /// # Errors
    ///
    /// Returns [`SolveError::NoFeasibleSolution`] when the search gives up
    /// and [`SolveError::Backend`] for internal failures.
    fn solve_tours(&self, problem: &RoutingProblem<'_>) -> Result<Vec<Vec<usize>>, SolveError>;
}

impl<B: SolverBackend + ?Sized> SolverBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn solve_tours(&self, problem: &RoutingProblem<'_>) -> Result<Vec<Vec<usize>>, SolveError> {
        (**self).solve_tours(problem)
    }
}

impl<B: SolverBackend + ?Sized> SolverBackend for &B {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn solve_tours(&self, problem: &RoutingProblem<'_>) -> Result<Vec<Vec<usize>>, SolveError> {
        (**self).solve_tours(problem)
    }
}

/// Runs a backend and enforces the routing contract on its answer.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use totefleet_core::{
///     DistanceMatrix, Objective, RouteSolverAdapter, RoutingProblem, ServiceKind, StopLoad,
///     VehicleKind,
/// };
/// use totefleet_core::test_support::NearestNeighbourBackend;
///
/// let matrix = DistanceMatrix::from_distances(
///     vec![0, 1, 2],
///     vec![vec![0.0, 1.0, 1.0], vec![1.0, 0.0, 1.0], vec![1.0, 1.0, 0.0]],
/// )?;
/// let loads = [StopLoad::default(), StopLoad::pickup(2), StopLoad::pickup(3)];
/// let problem = RoutingProblem {
///     matrix: &matrix,
///     loads: &loads,
///     depot: 0,
///     vehicle: VehicleKind::Truck,
///     service: ServiceKind::Pickup,
///     capacity: 5,
///     vehicle_count: 1,
///     cost_per_unit: 1.0,
///     objective: Objective::Distance,
///     time_limit: Duration::from_secs(1),
///     seed: 0,
/// };
/// let routes = RouteSolverAdapter::new(NearestNeighbourBackend).solve(&problem)?;
/// assert_eq!(routes.len(), 1);
/// assert_eq!(routes[0].peak_load(), 5);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct RouteSolverAdapter<B> {
    backend: B,
}

impl<B: SolverBackend> RouteSolverAdapter<B> {
    /// Wrap `backend`.
    pub const fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Borrow the wrapped backend.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Solve `problem` and return its routes sorted by first stop.
    ///
    /// A problem with no customers yields no routes.
    ///
    /// # Errors
    ///
    /// - [`SolveError::InvalidProblem`] when loads and matrix disagree or the
    ///   depot is out of range or carries demand.
    /// - [`SolveError::NoFeasibleSolution`] with
    ///   [`Infeasibility::ProvenInfeasible`] when one location or the total
    ///   demand exceeds what the fleet can carry, and with
    ///   [`Infeasibility::NotFoundInBudget`] when the backend leaves
    ///   locations unserved or needs more vehicles than exist.
    /// - [`SolveError::Backend`] when the backend fails or returns
    ///   duplicate, unknown or overloaded stops.
    pub fn solve(&self, problem: &RoutingProblem<'_>) -> Result<Vec<Route>, SolveError> {
        validate_shape(problem)?;
        if problem.customers().next().is_none() {
            return Ok(Vec::new());
        }
        prove_feasible_bounds(problem)?;

        let started = Instant::now();
        let raw = self.backend.solve_tours(problem)?;
        debug!(
            "{} backend returned {} tours for {} {} locations in {:?}",
            self.backend.name(),
            raw.len(),
            problem.matrix.len().saturating_sub(1),
            problem.vehicle,
            started.elapsed()
        );

        let mut tours = normalise_tours(problem, raw)?;
        check_coverage(problem, &tours)?;
        if tours.len() > problem.vehicle_count {
            warn!(
                "{} backend used {} {} routes; only {} vehicles exist",
                self.backend.name(),
                tours.len(),
                problem.vehicle,
                problem.vehicle_count
            );
            return Err(SolveError::NoFeasibleSolution(
                Infeasibility::NotFoundInBudget,
            ));
        }
        tours.sort_by_key(|tour| tour.first().copied());
        tours
            .iter()
            .enumerate()
            .map(|(vehicle_index, tour)| build_route(problem, vehicle_index, tour))
            .collect()
    }
}

fn validate_shape(problem: &RoutingProblem<'_>) -> Result<(), SolveError> {
    if problem.loads.len() != problem.matrix.len() {
        return Err(SolveError::InvalidProblem {
            message: format!(
                "{} loads supplied for a matrix of {} locations",
                problem.loads.len(),
                problem.matrix.len()
            ),
        });
    }
    if problem.depot >= problem.matrix.len() {
        return Err(SolveError::InvalidProblem {
            message: format!(
                "depot row {} is outside a matrix of {} locations",
                problem.depot,
                problem.matrix.len()
            ),
        });
    }
    if problem.load(problem.depot) != StopLoad::default() {
        return Err(SolveError::InvalidProblem {
            message: "the depot must not carry demand".to_owned(),
        });
    }
    Ok(())
}

fn prove_feasible_bounds(problem: &RoutingProblem<'_>) -> Result<(), SolveError> {
    if problem.vehicle_count == 0 {
        return Err(SolveError::proven(format!(
            "no {} vehicles are available",
            problem.vehicle
        )));
    }
    let capacity = problem.capacity;
    for index in problem.customers() {
        let load = problem.load(index);
        let largest = load.pickup.max(load.delivery);
        if largest > capacity {
            let id = problem.matrix.id(index).unwrap_or_default();
            return Err(SolveError::proven(format!(
                "location {id} needs {largest} totes but a {} holds {capacity}",
                problem.vehicle
            )));
        }
    }
    let pickup: u64 = problem.loads.iter().map(|load| u64::from(load.pickup)).sum();
    let delivery: u64 = problem.loads.iter().map(|load| u64::from(load.delivery)).sum();
    let fleet = problem.fleet_capacity();
    if pickup.max(delivery) > fleet {
        return Err(SolveError::proven(format!(
            "total demand of {} totes exceeds fleet capacity {fleet}",
            pickup.max(delivery)
        )));
    }
    Ok(())
}

fn normalise_tours(
    problem: &RoutingProblem<'_>,
    raw: Vec<Vec<usize>>,
) -> Result<Vec<Vec<usize>>, SolveError> {
    let mut tours = Vec::with_capacity(raw.len());
    for mut tour in raw {
        if tour.first() == Some(&problem.depot) {
            tour.remove(0);
        }
        if tour.last() == Some(&problem.depot) {
            tour.pop();
        }
        if let Some(&bad) = tour
            .iter()
            .find(|&&index| index == problem.depot || index >= problem.matrix.len())
        {
            return Err(SolveError::Backend {
                message: format!("tour contains invalid stop {bad}"),
            });
        }
        if !tour.is_empty() {
            tours.push(tour);
        }
    }
    Ok(tours)
}

fn check_coverage(problem: &RoutingProblem<'_>, tours: &[Vec<usize>]) -> Result<(), SolveError> {
    let mut seen = vec![false; problem.matrix.len()];
    for &index in tours.iter().flatten() {
        match seen.get_mut(index) {
            Some(flag) if !*flag => *flag = true,
            _ => {
                return Err(SolveError::Backend {
                    message: format!("stop {index} is visited more than once"),
                });
            }
        }
    }
    let missing = problem
        .customers()
        .filter(|&index| !seen.get(index).copied().unwrap_or(false))
        .count();
    if missing > 0 {
        warn!("backend left {missing} {} locations unserved", problem.vehicle);
        return Err(SolveError::NoFeasibleSolution(
            Infeasibility::NotFoundInBudget,
        ));
    }
    Ok(())
}

fn build_route(
    problem: &RoutingProblem<'_>,
    vehicle_index: usize,
    tour: &[usize],
) -> Result<Route, SolveError> {
    let stop_loads: Vec<StopLoad> = tour.iter().map(|&index| problem.load(index)).collect();
    let mut loads = load_profile(&stop_loads);
    if let Some(overload) = loads.iter().find(|&&load| load > u64::from(problem.capacity)) {
        return Err(SolveError::Backend {
            message: format!(
                "tour carries {overload} totes on a {} of capacity {}",
                problem.vehicle, problem.capacity
            ),
        });
    }
    loads.push(loads.last().copied().unwrap_or_default());

    let path: Vec<usize> = std::iter::once(problem.depot)
        .chain(tour.iter().copied())
        .chain(std::iter::once(problem.depot))
        .collect();
    let mut stops = Vec::with_capacity(path.len());
    let mut cumulative_distance = Vec::with_capacity(path.len());
    let mut cumulative_duration = Vec::with_capacity(path.len());
    let (mut distance, mut duration) = (0.0, 0.0);
    let mut previous = problem.depot;
    for &index in &path {
        let leg = problem
            .matrix
            .leg(previous, index)
            .ok_or_else(|| SolveError::Backend {
                message: format!("no leg from {previous} to {index}"),
            })?;
        distance += leg.distance;
        duration += leg.duration;
        stops.push(problem.matrix.id(index).unwrap_or_default());
        cumulative_distance.push(distance);
        cumulative_duration.push(duration);
        previous = index;
    }

    Ok(Route {
        vehicle: problem.vehicle,
        vehicle_index,
        service: problem.service,
        capacity: problem.capacity,
        stops,
        loads,
        cumulative_distance,
        cumulative_duration,
        pickup: stop_loads.iter().map(|load| u64::from(load.pickup)).sum(),
        dropoff: stop_loads.iter().map(|load| u64::from(load.delivery)).sum(),
        cost: distance * problem.cost_per_unit,
    })
}
