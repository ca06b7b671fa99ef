//! Facade crate for the totefleet route planner.
//!
//! This crate re-exports the core domain types and exposes optional solver
//! backends and the SQLite feasibility store behind feature flags.

#![forbid(unsafe_code)]

pub use totefleet_core::{
    BikeConversion, CombineMode, CostError, CostProvider, DistanceMatrix, FeasibilityRecord,
    FeasibilityStore, Infeasibility, Leg, LocationId, MatrixBuilder, MatrixError,
    MemoryFeasibilityStore, Objective, Pipeline, PipelineError, Route, RouteSolverAdapter,
    RoutingProblem, RunConfig, RunParameters, RunReport, ServiceKind, SiteRecord, SolveError,
    SolverBackend, StopLoad, TravelMode, VehicleKind, VehicleProfile,
};

#[cfg(feature = "store-sqlite")]
pub use totefleet_core::SqliteFeasibilityStore;

#[cfg(feature = "solver-vrp")]
pub use totefleet_solver_vrp::{VrpSolver, VrpSolverConfig};

#[cfg(feature = "solver-savings")]
pub use totefleet_solver_savings::{SavingsConfig, SavingsSolver};
