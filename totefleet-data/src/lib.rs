//! Data access for the totefleet planner.
//!
//! Responsibilities:
//! - Provide [`totefleet_core::CostProvider`] adapters: OSRM over HTTP and
//!   an offline great-circle estimate.
//! - Load location tables from disk.
//!
//! Boundaries:
//! - Do not encode planning rules (live in `totefleet-core`).
//! - Keep blocking I/O off async executors; prefer async-capable clients.
//!
//! Invariants:
//! - Providers return square, non-negative tables with a zero diagonal.
//! - No global mutable state.

mod great_circle;
pub mod routing;
mod sites;

pub use great_circle::{DEFAULT_DETOUR_FACTOR, GreatCircleCostProvider};
pub use sites::{SiteLoadError, load_sites};
