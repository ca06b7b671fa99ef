//! Fold dropoffs into solved pickup loops.
//!
//! Each pickup route is frozen as a loop of stops. Dropoffs are then added
//! loop by loop: the stops of one loop are re-solved as a single-vehicle
//! problem with the combined capacity, so stops may be reordered within a
//! loop but never move between loops. A loop that cannot carry its combined
//! load in any order is excluded from the run and reported rather than
//! failing the run.

use std::time::Duration;

use log::{info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    DistanceMatrix, Location, LocationId, Objective, Route, RouteSolverAdapter, RoutingProblem,
    ServiceKind, SolveError, SolverBackend, StopLoad, VehicleKind, VehicleProfile,
};

/// How dropoff totes occupy a vehicle on a combined loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CombineMode {
    /// Each stop's pickup and dropoff both add to the running load, so the
    /// loop must fit the sum of all pickups and dropoffs.
    #[default]
    Additive,
    /// Clean totes leave the depot on board and come off at their stop,
    /// freeing room for collected totes.
    DepartLoaded,
}

impl CombineMode {
    /// Load contributed by `location` under this mode.
    #[must_use]
    pub const fn stop_load(self, location: &Location) -> StopLoad {
        match self {
            Self::Additive => {
                StopLoad::pickup(location.pickup_demand.saturating_add(location.dropoff_demand))
            }
            Self::DepartLoaded => StopLoad::new(location.pickup_demand, location.dropoff_demand),
        }
    }
}

/// The stops of one pickup route, frozen for combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickupLoop {
    /// Position of the loop within its run.
    pub index: usize,
    /// Vehicle type serving the loop.
    pub vehicle: VehicleKind,
    /// Vehicle serving the loop.
    pub vehicle_index: usize,
    /// Non-depot stops in pickup order.
    pub stops: Vec<LocationId>,
}

/// A loop dropped from the final route set.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Exclusion {
    /// Position of the loop within its run.
    pub loop_index: usize,
    /// Vehicle type of the loop.
    pub vehicle: VehicleKind,
    /// Vehicle serving the loop.
    pub vehicle_index: usize,
    /// Stops left without a combined route.
    pub stops: Vec<LocationId>,
    /// Totes collected across the loop.
    pub pickup: u64,
    /// Totes delivered across the loop.
    pub dropoff: u64,
    /// Combined capacity the loop had to fit.
    pub capacity: u32,
    /// Why no combined route exists.
    pub reason: String,
}

/// Routes and exclusions from [`combine_loops`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CombineOutcome {
    /// Combined routes, one per surviving loop.
    pub routes: Vec<Route>,
    /// Loops over the combined capacity.
    pub exclusions: Vec<Exclusion>,
}

/// Inputs shared by every loop of one fleet.
#[derive(Debug, Clone)]
pub struct CombineRequest<'a> {
    /// Fleet locations including the depot.
    pub locations: &'a [Location],
    /// Costs aligned with `locations`.
    pub matrix: &'a DistanceMatrix,
    /// Fleet profile supplying the combined capacity and cost.
    pub profile: &'a VehicleProfile,
    /// Load model.
    pub mode: CombineMode,
    /// Leg component to minimise.
    pub objective: Objective,
    /// Budget per loop.
    pub time_limit: Duration,
    /// Search seed.
    pub seed: u64,
}

/// Freeze each route's stops as a loop.
#[must_use]
pub fn segment_loops(routes: &[Route]) -> Vec<PickupLoop> {
    routes
        .iter()
        .enumerate()
        .map(|(index, route)| PickupLoop {
            index,
            vehicle: route.vehicle,
            vehicle_index: route.vehicle_index,
            stops: route.visits().to_vec(),
        })
        .collect()
}

/// Re-solve every loop with dropoffs under the combined capacity.
///
/// # Errors
///
/// Loops that cannot be served are reported in
/// [`CombineOutcome::exclusions`]. An error is returned only when a loop
/// names a stop missing from `request.locations` or `request.matrix`
/// ([`SolveError::InvalidProblem`]) or the backend fails
/// ([`SolveError::Backend`]).
pub fn combine_loops<B: SolverBackend>(
    adapter: &RouteSolverAdapter<B>,
    loops: &[PickupLoop],
    request: &CombineRequest<'_>,
) -> Result<CombineOutcome, SolveError> {
    let ids: Vec<LocationId> = request.locations.iter().map(|l| l.id).collect();
    crate::ensure_aligned(&ids, request.matrix).map_err(|err| SolveError::InvalidProblem {
        message: err.to_string(),
    })?;
    let depot = request
        .locations
        .iter()
        .position(|l| l.is_depot)
        .ok_or_else(|| SolveError::InvalidProblem {
            message: "no depot among the fleet's locations".to_owned(),
        })?;

    let mut outcome = CombineOutcome::default();
    for pickup_loop in loops.iter().filter(|l| !l.stops.is_empty()) {
        match combine_one(adapter, pickup_loop, depot, request)? {
            Ok(route) => outcome.routes.push(route),
            Err(exclusion) => {
                warn!(
                    "excluding {} loop {}: {}",
                    exclusion.vehicle, exclusion.loop_index, exclusion.reason
                );
                outcome.exclusions.push(exclusion);
            }
        }
    }
    info!(
        "combined {} {} loops, {} excluded",
        outcome.routes.len(),
        request.profile.kind,
        outcome.exclusions.len()
    );
    Ok(outcome)
}

fn combine_one<B: SolverBackend>(
    adapter: &RouteSolverAdapter<B>,
    pickup_loop: &PickupLoop,
    depot: usize,
    request: &CombineRequest<'_>,
) -> Result<Result<Route, Exclusion>, SolveError> {
    let mut indices = Vec::with_capacity(pickup_loop.stops.len() + 1);
    indices.push(depot);
    for &id in &pickup_loop.stops {
        let index = request
            .matrix
            .position(id)
            .ok_or_else(|| SolveError::InvalidProblem {
                message: format!("loop {} visits unknown location {id}", pickup_loop.index),
            })?;
        indices.push(index);
    }
    let matrix = request
        .matrix
        .project(&indices)
        .map_err(|err| SolveError::InvalidProblem {
            message: err.to_string(),
        })?;
    let members: Vec<&Location> = indices
        .iter()
        .filter_map(|&index| request.locations.get(index))
        .collect();
    let loads: Vec<StopLoad> = members
        .iter()
        .map(|l| {
            if l.is_depot {
                StopLoad::default()
            } else {
                request.mode.stop_load(l)
            }
        })
        .collect();
    let capacity = request.profile.combined_capacity();
    let problem = RoutingProblem {
        matrix: &matrix,
        loads: &loads,
        depot: 0,
        vehicle: request.profile.kind,
        service: ServiceKind::Combined,
        capacity,
        vehicle_count: 1,
        cost_per_unit: request.profile.cost_per_unit,
        objective: request.objective,
        time_limit: request.time_limit,
        seed: request.seed,
    };

    match adapter.solve(&problem) {
        Ok(mut routes) => {
            let Some(mut route) = routes.pop().filter(|_| routes.is_empty()) else {
                return Err(SolveError::Backend {
                    message: format!("loop {} did not yield one route", pickup_loop.index),
                });
            };
            ensure_same_stops(pickup_loop, &route)?;
            route.vehicle_index = pickup_loop.vehicle_index;
            route.pickup = members.iter().map(|l| u64::from(l.pickup_demand)).sum();
            route.dropoff = members.iter().map(|l| u64::from(l.dropoff_demand)).sum();
            Ok(Ok(route))
        }
        Err(SolveError::NoFeasibleSolution(why)) => Ok(Err(Exclusion {
            loop_index: pickup_loop.index,
            vehicle: pickup_loop.vehicle,
            vehicle_index: pickup_loop.vehicle_index,
            stops: pickup_loop.stops.clone(),
            pickup: members.iter().map(|l| u64::from(l.pickup_demand)).sum(),
            dropoff: members.iter().map(|l| u64::from(l.dropoff_demand)).sum(),
            capacity,
            reason: format!("loop over capacity: {why}"),
        })),
        Err(other) => Err(other),
    }
}

fn ensure_same_stops(pickup_loop: &PickupLoop, route: &Route) -> Result<(), SolveError> {
    let mut expected = pickup_loop.stops.clone();
    let mut actual = route.visits().to_vec();
    expected.sort_unstable();
    actual.sort_unstable();
    if expected == actual {
        Ok(())
    } else {
        Err(SolveError::Backend {
            message: format!("combined route for loop {} changed its stops", pickup_loop.index),
        })
    }
}
