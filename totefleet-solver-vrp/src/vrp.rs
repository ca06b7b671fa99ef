//! `vrp-core` modelling helpers for `VrpSolver`.
//!
//! This module converts a [`RoutingProblem`] into a `vrp-core` capacitated
//! problem, runs the evolutionary search under the problem's time budget and
//! seed, and translates the resulting tours back into matrix rows.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use totefleet_core::{Infeasibility, Objective, RoutingProblem, SolveError, StopLoad};
use vrp_core::models::common::{Location, Profile};
use vrp_core::models::problem::TravelTime;
use vrp_core::models::solution::Route as VrpRoute;
use vrp_core::prelude::*;
use vrp_core::utils::{DefaultRandom, Environment, Parallelism};

use crate::solver::VrpSolverConfig;

/// Matrix-backed transport costs for one fleet solve.
struct MatrixTransportCost {
    distances: Vec<Vec<f64>>,
    durations: Vec<Vec<f64>>,
}

impl MatrixTransportCost {
    fn new(problem: &RoutingProblem<'_>) -> Self {
        Self {
            distances: problem.matrix.table(Objective::Distance),
            durations: problem.matrix.table(Objective::Duration),
        }
    }

    fn lookup(table: &[Vec<f64>], from: Location, to: Location) -> f64 {
        let result = table.get(from).and_then(|row| row.get(to)).copied();
        debug_assert!(result.is_some(), "matrix lookup failed: from={from}, to={to}");
        result.unwrap_or(0.0)
    }
}

impl TransportCost for MatrixTransportCost {
    fn distance(
        &self,
        _route: &VrpRoute,
        from: Location,
        to: Location,
        _departure: TravelTime,
    ) -> Cost {
        Self::lookup(&self.distances, from, to)
    }

    fn duration(
        &self,
        _route: &VrpRoute,
        from: Location,
        to: Location,
        _departure: TravelTime,
    ) -> f64 {
        Self::lookup(&self.durations, from, to)
    }

    fn distance_approx(&self, _profile: &Profile, from: usize, to: usize) -> f64 {
        Self::lookup(&self.distances, from, to)
    }

    fn duration_approx(&self, _profile: &Profile, from: usize, to: usize) -> f64 {
        Self::lookup(&self.durations, from, to)
    }
}

fn totes(count: u32) -> GenericResult<SingleDimLoad> {
    i32::try_from(count)
        .map(SingleDimLoad::new)
        .map_err(|_| format!("{count} totes exceed the solver's load range").into())
}

/// Static demand: deliveries are loaded at the depot, pickups ride home.
fn demand(load: StopLoad) -> GenericResult<Demand<SingleDimLoad>> {
    Ok(Demand {
        pickup: (totes(load.pickup)?, SingleDimLoad::default()),
        delivery: (totes(load.delivery)?, SingleDimLoad::default()),
    })
}

fn define_goal(
    transport: Arc<dyn TransportCost + Send + Sync>,
    objective: Objective,
) -> GenericResult<GoalContext> {
    let minimize_unassigned = MinimizeUnassignedBuilder::new("min-unassigned").build()?;
    let capacity_feature = CapacityFeatureBuilder::<SingleDimLoad>::new("capacity").build()?;
    let transport_builder = TransportFeatureBuilder::new("min-transport")
        .set_transport_cost(transport)
        .set_time_constrained(false);
    let transport_feature = match objective {
        Objective::Distance => transport_builder.build_minimize_distance()?,
        Objective::Duration => transport_builder.build_minimize_duration()?,
    };

    GoalContextBuilder::with_features(&[minimize_unassigned, transport_feature, capacity_feature])?
        .build()
}

fn define_problem(
    problem: &RoutingProblem<'_>,
    goal: GoalContext,
    transport: Arc<dyn TransportCost + Send + Sync>,
) -> GenericResult<Problem> {
    let jobs = problem
        .customers()
        .map(|row| {
            SingleBuilder::default()
                .id(format!("site{}", problem.matrix.id(row).unwrap_or_default()).as_str())
                .demand(demand(problem.load(row))?)
                .location(row)?
                .build_as_job()
        })
        .collect::<Result<Vec<_>, _>>()?;

    let capacity = totes(problem.capacity)?;
    let vehicles = (0..problem.vehicle_count)
        .map(|index| {
            VehicleBuilder::default()
                .id(format!("{}{index}", problem.vehicle).as_str())
                .add_detail(
                    VehicleDetailBuilder::default()
                        .set_start_location(problem.depot)
                        .set_end_location(problem.depot)
                        .build()?,
                )
                .capacity(capacity)
                .build()
        })
        .collect::<Result<Vec<_>, _>>()?;

    ProblemBuilder::default()
        .add_jobs(jobs.into_iter())
        .add_vehicles(vehicles.into_iter())
        .with_goal(goal)
        .with_transport_cost(transport)
        .build()
}

/// Whole seconds `vrp-core` may search for. Partial seconds round up.
fn time_budget_secs(limit: Duration) -> usize {
    let secs = if limit.subsec_nanos() > 0 {
        limit.as_secs().saturating_add(1)
    } else {
        limit.as_secs()
    };
    usize::try_from(secs.max(1)).unwrap_or(usize::MAX)
}

/// Search environment pinned to one thread so equal seeds give equal tours.
fn define_environment(problem: &RoutingProblem<'_>) -> Arc<Environment> {
    let quota = time_budget_secs(problem.time_limit);
    Arc::new(Environment {
        random: Arc::new(DefaultRandom::new_with_seed(problem.seed)),
        parallelism: Parallelism::new_with_cpus(1),
        ..Environment::new_with_time_quota(Some(quota))
    })
}

fn backend_error(err: impl std::fmt::Display) -> SolveError {
    SolveError::Backend {
        message: err.to_string(),
    }
}

/// Solve `problem` with `vrp-core` and return one row list per used vehicle.
pub(super) fn solve(
    config: &VrpSolverConfig,
    problem: &RoutingProblem<'_>,
) -> Result<Vec<Vec<usize>>, SolveError> {
    let transport: Arc<dyn TransportCost + Send + Sync> =
        Arc::new(MatrixTransportCost::new(problem));
    let goal = define_goal(transport.clone(), problem.objective).map_err(backend_error)?;
    let vrp_problem = Arc::new(define_problem(problem, goal, transport).map_err(backend_error)?);

    let max_time = time_budget_secs(problem.time_limit);
    let vrp_config = VrpConfigBuilder::new(vrp_problem.clone())
        .set_environment(define_environment(problem))
        .prebuild()
        .map_err(backend_error)?
        .with_max_time(Some(max_time))
        .with_max_generations(Some(config.max_generations))
        .build()
        .map_err(backend_error)?;

    let solution = Solver::new(vrp_problem, vrp_config)
        .solve()
        .map_err(backend_error)?;

    if !solution.unassigned.is_empty() {
        debug!(
            "vrp-core left {} {} jobs unassigned",
            solution.unassigned.len(),
            problem.vehicle
        );
        return Err(SolveError::NoFeasibleSolution(
            Infeasibility::NotFoundInBudget,
        ));
    }

    let depot = problem.depot;
    Ok(solution
        .get_locations()
        .map(|tour| tour.filter(|&location| location != depot).collect::<Vec<_>>())
        .filter(|tour| !tour.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Duration::from_secs(5), 5)]
    #[case(Duration::from_millis(2500), 3)]
    #[case(Duration::from_millis(1001), 2)]
    #[case(Duration::from_millis(300), 1)]
    fn budgets_round_up_to_whole_seconds(#[case] limit: Duration, #[case] expected: usize) {
        assert_eq!(time_budget_secs(limit), expected);
    }
}
