//! Metaheuristic routing backend for totefleet.
//!
//! This crate provides [`VrpSolver`], a
//! [`SolverBackend`](totefleet_core::SolverBackend) that models each fleet
//! solve as a capacitated vehicle routing problem and searches it with the
//! `vrp-core` evolutionary solver.
//!
//! Every non-depot matrix row becomes one job carrying its static pickup and
//! delivery demand; every vehicle starts and ends at the depot. Unassigned
//! jobs are never dropped silently: a solution that leaves any job out is
//! reported as [`Infeasibility::NotFoundInBudget`](totefleet_core::Infeasibility).

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod solver;
mod vrp;

pub use solver::{VrpSolver, VrpSolverConfig};
