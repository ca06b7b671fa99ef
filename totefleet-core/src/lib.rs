//! Core domain types for the totefleet route planner.
//!
//! The crate models tote collection sites, the travel-cost matrices between
//! them, and the staged pipeline that turns site data into capacity-feasible
//! truck and bike routes: demand extraction, vehicle-type segmentation,
//! pickup-only solving, per-loop pickup/dropoff combination and feasibility
//! reporting.
//!
//! Solver backends and cost providers live in sibling crates and plug in
//! through the [`SolverBackend`] and [`CostProvider`] traits.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod demand;
mod location;
pub mod loops;
pub mod matrix;
pub mod pipeline;
mod profile;
pub mod report;
mod route;
pub mod segment;
pub mod solver;

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-support")))]
pub mod test_support;

pub use config::{
    ConfigError, DepotSettings, ParameterSweep, Range, RunConfig, SolverKind, SolverSettings,
};
pub use demand::{AlignmentError, ensure_aligned, extract_demand};
pub use location::{Eligibility, Location, LocationId, SiteRecord, SiteRole};
pub use loops::{
    CombineMode, CombineOutcome, CombineRequest, Exclusion, PickupLoop, combine_loops,
    segment_loops,
};
pub use matrix::{
    CacheStats, CostError, CostProvider, DistanceMatrix, Leg, MatrixBuilder, MatrixError,
    Objective,
};
pub use pipeline::{Pipeline, PipelineError, RunParameters, RunReport, VehicleRun};
pub use profile::{TravelMode, VehicleKind, VehicleProfile};
pub use report::{
    FeasibilityAggregator, FeasibilityRecord, FeasibilityStore, MemoryFeasibilityStore,
    ReportError, RunContext, RunOutcome, summarise,
};
pub use route::{Route, ServiceKind, StopLoad, first_overload, load_profile};
pub use segment::{
    BikeConversion, Conversion, SegmentError, Segmentation, VehicleSubset,
    segment_by_vehicle_type,
};
pub use solver::{Infeasibility, RouteSolverAdapter, RoutingProblem, SolveError, SolverBackend};

#[cfg(feature = "store-sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "store-sqlite")))]
pub use report::SqliteFeasibilityStore;
