//! Append-only feasibility reporting across runs.
//!
//! Every run appends one [`FeasibilityRecord`] per vehicle type: the run
//! parameters, whether a complete route set was found, aggregate totals and
//! per-vehicle metric lists index-aligned by route. Stores serialise appends
//! behind a mutex so parallel sweep runs never interleave writes.

mod memory;
#[cfg(feature = "store-sqlite")]
mod sqlite;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use memory::MemoryFeasibilityStore;
#[cfg(feature = "store-sqlite")]
pub use sqlite::SqliteFeasibilityStore;

use crate::{Exclusion, Infeasibility, Route, ServiceKind, VehicleKind};

/// How a run ended for one vehicle type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RunOutcome {
    /// Every location is on a route.
    Complete,
    /// Some loops were excluded for exceeding the combined capacity.
    Partial,
    /// No feasible pickup solution exists or none was found.
    Infeasible,
}

impl RunOutcome {
    /// Return the outcome as a lowercase `&str`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Infeasible => "infeasible",
        }
    }
}

impl std::str::FromStr for RunOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "complete" => Ok(Self::Complete),
            "partial" => Ok(Self::Partial),
            "infeasible" => Ok(Self::Infeasible),
            _ => Err(format!("unknown run outcome '{s}'")),
        }
    }
}

/// Parameters a record is filed under.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunContext {
    /// Free-form run label, e.g. the sweep point.
    pub label: String,
    /// Vehicle type the record describes.
    pub vehicle: VehicleKind,
    /// Service of the final route set.
    pub service: ServiceKind,
    /// Solver backend name.
    pub solver: String,
    /// Cost provider name.
    pub provider: String,
    /// Vehicles available.
    pub vehicle_count: usize,
    /// Pickup capacity per vehicle.
    pub capacity: u32,
    /// Combined capacity per vehicle.
    pub combined_capacity: u32,
    /// Solver budget per solve, in seconds.
    pub time_limit_secs: u64,
}

/// One row of the feasibility report.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeasibilityRecord {
    /// Identifier assigned by the store on append.
    pub run_id: Option<u64>,
    /// Parameters of the run.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub context: RunContext,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Notes on exclusions or infeasibility.
    pub description: String,
    /// Routes in the final set.
    pub route_count: usize,
    /// Metres over all routes.
    pub total_distance: f64,
    /// Seconds over all routes.
    pub total_duration: f64,
    /// Cost over all routes.
    pub total_cost: f64,
    /// Totes collected over all routes.
    pub total_pickup: u64,
    /// Totes delivered over all routes.
    pub total_dropoff: u64,
    /// Seconds per route.
    pub time_per_vehicle: Vec<f64>,
    /// Cost per route.
    pub cost_per_vehicle: Vec<f64>,
    /// Peak load per route.
    pub load_per_vehicle: Vec<u64>,
    /// Totes collected per route.
    pub pickup_per_vehicle: Vec<u64>,
    /// Totes delivered per route.
    pub dropoff_per_vehicle: Vec<u64>,
    /// Metres per route.
    pub distance_per_vehicle: Vec<f64>,
    /// Stops per route.
    pub locations_per_vehicle: Vec<usize>,
    /// Loops dropped for exceeding the combined capacity.
    pub excluded_loops: Vec<usize>,
}

/// Errors raised by [`FeasibilityStore`] implementations.
#[derive(Debug, Error)]
pub enum ReportError {
    /// SQLite failed.
    #[cfg(feature = "store-sqlite")]
    #[error("feasibility store database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// A stored list could not be encoded or decoded.
    #[cfg(feature = "serde")]
    #[error("failed to encode feasibility metrics: {0}")]
    Encoding(#[from] serde_json::Error),
    /// A stored value could not be interpreted.
    #[error("corrupt feasibility record {run_id}: {message}")]
    Corrupt {
        /// Row identifier.
        run_id: u64,
        /// Error detail.
        message: String,
    },
}

/// Append-only sink for feasibility records.
///
/// Implementations must serialise concurrent appends.
pub trait FeasibilityStore: Send + Sync {
    /// Append `record`, returning its assigned run identifier.
    ///
    /// # Errors
    ///
    /// Returns a [`ReportError`] when the record cannot be persisted.
    fn append(&self, record: FeasibilityRecord) -> Result<u64, ReportError>;

    /// All records in append order.
    ///
    /// # Errors
    ///
    /// Returns a [`ReportError`] when stored records cannot be read.
    fn records(&self) -> Result<Vec<FeasibilityRecord>, ReportError>;
}

/// Summarises route sets and files them in a [`FeasibilityStore`].
#[derive(Clone, Copy)]
pub struct FeasibilityAggregator<'a> {
    store: &'a dyn FeasibilityStore,
}

impl std::fmt::Debug for FeasibilityAggregator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeasibilityAggregator").finish_non_exhaustive()
    }
}

impl<'a> FeasibilityAggregator<'a> {
    /// Aggregate into `store`.
    #[must_use]
    pub const fn new(store: &'a dyn FeasibilityStore) -> Self {
        Self { store }
    }

    /// Append the record for a solved run.
    ///
    /// Excluded loops add nothing to the totals and are listed in the
    /// description.
    ///
    /// # Errors
    ///
    /// Returns a [`ReportError`] when the store rejects the record.
    pub fn record(
        &self,
        context: RunContext,
        routes: &[Route],
        exclusions: &[Exclusion],
    ) -> Result<FeasibilityRecord, ReportError> {
        self.file(summarise(context, routes, exclusions))
    }

    /// Append the record for a run without a feasible pickup solution.
    ///
    /// # Errors
    ///
    /// Returns a [`ReportError`] when the store rejects the record.
    pub fn record_infeasible(
        &self,
        context: RunContext,
        why: &Infeasibility,
    ) -> Result<FeasibilityRecord, ReportError> {
        let mut record = summarise(context, &[], &[]);
        record.outcome = RunOutcome::Infeasible;
        record.description = why.to_string();
        self.file(record)
    }

    fn file(&self, mut record: FeasibilityRecord) -> Result<FeasibilityRecord, ReportError> {
        let run_id = self.store.append(record.clone())?;
        record.run_id = Some(run_id);
        Ok(record)
    }
}

/// Build the record for `routes` without storing it.
#[must_use]
pub fn summarise(
    context: RunContext,
    routes: &[Route],
    exclusions: &[Exclusion],
) -> FeasibilityRecord {
    let (outcome, description) = if exclusions.is_empty() {
        (
            RunOutcome::Complete,
            format!("{} routes cover every location", routes.len()),
        )
    } else {
        let notes: Vec<String> = exclusions
            .iter()
            .map(|e| {
                format!(
                    "loop {} ({} stops, {} pickup + {} dropoff > {}) excluded",
                    e.loop_index,
                    e.stops.len(),
                    e.pickup,
                    e.dropoff,
                    e.capacity
                )
            })
            .collect();
        (RunOutcome::Partial, notes.join("; "))
    };
    FeasibilityRecord {
        run_id: None,
        context,
        outcome,
        description,
        route_count: routes.len(),
        total_distance: routes.iter().map(Route::total_distance).sum(),
        total_duration: routes.iter().map(Route::total_duration).sum(),
        total_cost: routes.iter().map(|r| r.cost).sum(),
        total_pickup: routes.iter().map(|r| r.pickup).sum(),
        total_dropoff: routes.iter().map(|r| r.dropoff).sum(),
        time_per_vehicle: routes.iter().map(Route::total_duration).collect(),
        cost_per_vehicle: routes.iter().map(|r| r.cost).collect(),
        load_per_vehicle: routes.iter().map(Route::peak_load).collect(),
        pickup_per_vehicle: routes.iter().map(|r| r.pickup).collect(),
        dropoff_per_vehicle: routes.iter().map(|r| r.dropoff).collect(),
        distance_per_vehicle: routes.iter().map(Route::total_distance).collect(),
        locations_per_vehicle: routes.iter().map(Route::location_count).collect(),
        excluded_loops: exclusions.iter().map(|e| e.loop_index).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn context() -> RunContext {
        RunContext {
            label: "trucks=2".into(),
            vehicle: VehicleKind::Truck,
            service: ServiceKind::Combined,
            solver: "savings".into(),
            provider: "stub".into(),
            vehicle_count: 2,
            capacity: 10,
            combined_capacity: 12,
            time_limit_secs: 5,
        }
    }

    fn route(vehicle_index: usize, stops: Vec<u64>, distance: f64, peak: u64, dropoff: u64) -> Route {
        let n = stops.len();
        Route {
            vehicle: VehicleKind::Truck,
            vehicle_index,
            service: ServiceKind::Combined,
            capacity: 12,
            stops,
            loads: vec![peak; n],
            cumulative_distance: vec![distance; n],
            cumulative_duration: vec![distance / 2.0; n],
            pickup: peak,
            dropoff,
            cost: distance * 3.0,
        }
    }

    fn exclusion() -> Exclusion {
        Exclusion {
            loop_index: 0,
            vehicle: VehicleKind::Truck,
            vehicle_index: 0,
            stops: vec![1, 2, 3],
            pickup: 10,
            dropoff: 3,
            capacity: 12,
            reason: "loop over capacity".into(),
        }
    }

    #[rstest]
    fn complete_runs_sum_every_route(context: RunContext) {
        let routes = [
            route(0, vec![0, 1, 0], 10.0, 4, 1),
            route(1, vec![0, 2, 3, 0], 6.0, 7, 2),
        ];
        let record = summarise(context, &routes, &[]);
        assert_eq!(record.outcome, RunOutcome::Complete);
        assert_eq!(record.route_count, 2);
        assert!((record.total_distance - 16.0).abs() < f64::EPSILON);
        assert!((record.total_cost - 48.0).abs() < f64::EPSILON);
        assert_eq!(record.load_per_vehicle, vec![4, 7]);
        assert_eq!(record.locations_per_vehicle, vec![1, 2]);
        assert_eq!(record.time_per_vehicle, vec![5.0, 3.0]);
        assert_eq!(record.pickup_per_vehicle, vec![4, 7]);
        assert_eq!(record.dropoff_per_vehicle, vec![1, 2]);
        assert_eq!(record.total_dropoff, 3);
    }

    #[rstest]
    fn exclusions_mark_partial_runs(context: RunContext) {
        let routes = [route(1, vec![0, 4, 0], 8.0, 5, 1)];
        let record = summarise(context, &routes, &[exclusion()]);
        assert_eq!(record.outcome, RunOutcome::Partial);
        assert_eq!(record.excluded_loops, vec![0]);
        assert!(record.description.contains("loop 0"));
        assert_eq!(record.total_pickup, 5);
        assert_eq!(record.route_count, 1);
        assert_eq!(record.pickup_per_vehicle, vec![5]);
        assert_eq!(record.dropoff_per_vehicle, vec![1]);
    }

    #[rstest]
    fn aggregator_assigns_run_ids(context: RunContext) {
        let store = MemoryFeasibilityStore::default();
        let aggregator = FeasibilityAggregator::new(&store);
        let first = aggregator
            .record(context.clone(), &[], &[])
            .expect("append");
        let second = aggregator
            .record_infeasible(context, &Infeasibility::NotFoundInBudget)
            .expect("append");
        assert_eq!(first.run_id, Some(1));
        assert_eq!(second.run_id, Some(2));
        assert_eq!(second.outcome, RunOutcome::Infeasible);
        assert_eq!(store.records().expect("records").len(), 2);
    }

    #[rstest]
    fn outcomes_parse_from_their_names() {
        for outcome in [RunOutcome::Complete, RunOutcome::Partial, RunOutcome::Infeasible] {
            assert_eq!(outcome.as_str().parse::<RunOutcome>(), Ok(outcome));
        }
    }
}
