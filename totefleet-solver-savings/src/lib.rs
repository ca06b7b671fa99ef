//! Deterministic routing backend for totefleet.
//!
//! [`SavingsSolver`] builds tours with the Clarke-Wright savings heuristic,
//! folds surplus tours into the rest by first-fit decreasing when the fleet
//! is too small, then shortens each tour with 2-opt until no move helps or
//! the problem's time limit passes. Every merge, insertion and reversal is
//! checked against the running load, so tours with mixed pickups and
//! deliveries stay within capacity at every stop.
//!
//! The backend uses no randomness: equal problems give equal tours.

#![forbid(unsafe_code)]

mod repair;
mod savings;
mod solver;
mod tour;
mod two_opt;

pub use solver::{SavingsConfig, SavingsSolver};
