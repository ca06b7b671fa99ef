//! OSRM-backed travel-cost provider.
//!
//! This module provides [`OsrmCostProvider`], an implementation of
//! [`totefleet_core::CostProvider`] that fetches distance and duration
//! tables from an OSRM routing service.
//!
//! # Architecture
//!
//! The provider talks to the network through the [`TableSource`] seam.
//! [`HttpTableSource`] issues real HTTP requests; tests substitute
//! [`test_support::StubTableSource`]. Tables larger than the per-request
//! coordinate limit are fetched as blocks and reassembled.
//!
//! # Example
//!
//! ```no_run
//! use totefleet_data::routing::{OsrmConfig, OsrmCostProvider};
//! use totefleet_core::{CostProvider, MatrixBuilder};
//! use std::time::Duration;
//!
//! let config = OsrmConfig::new("http://localhost:5000")
//!     .with_timeout(Duration::from_secs(60))
//!     .with_user_agent("my-app/1.0");
//! let builder = MatrixBuilder::new(OsrmCostProvider::with_config(config)?);
//! assert_eq!(builder.provider().name(), "osrm");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod osrm;
mod provider;
mod source;
mod tiles;

#[doc(hidden)]
pub mod test_support;

pub use osrm::{NO_SEGMENT, TableRequest, TableResponse};
pub use provider::{DEFAULT_USER_AGENT, OsrmConfig, OsrmCostProvider, ProviderBuildError};
pub use source::{HttpTableSource, TableSource};
