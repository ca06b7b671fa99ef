//! Test utilities for the OSRM provider.
//!
//! [`StubTableSource`] answers Table requests without a running OSRM
//! service and can be scripted to rate-limit the first few calls.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use geo::Coord;
use totefleet_core::CostError;

use super::osrm::{TableRequest, TableResponse};
use super::source::TableSource;

#[derive(Debug, Clone)]
enum Reply {
    /// Straight-line costs computed from the request coordinates.
    Planar,
    Fixed(TableResponse),
    Error(CostError),
}

/// Deterministic `TableSource` for tests.
///
/// # Example
///
/// ```
/// use geo::Coord;
/// use totefleet_core::{CostProvider, TravelMode};
/// use totefleet_data::routing::test_support::StubTableSource;
/// use totefleet_data::routing::{OsrmConfig, OsrmCostProvider};
///
/// let provider =
///     OsrmCostProvider::with_source(StubTableSource::planar(), OsrmConfig::default())?;
/// let table = provider.resolve_costs(
///     &[Coord { x: 0.0, y: 0.0 }, Coord { x: 3.0, y: 4.0 }],
///     TravelMode::Driving,
/// )?;
/// assert_eq!(table[0][1].distance, 5.0);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct StubTableSource {
    reply: Reply,
    rate_limited: AtomicUsize,
    calls: AtomicUsize,
}

impl StubTableSource {
    fn with_reply(reply: Reply) -> Self {
        Self {
            reply,
            rate_limited: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer every request with Euclidean distances, one metre per second.
    #[must_use]
    pub fn planar() -> Self {
        Self::with_reply(Reply::Planar)
    }

    /// Answer every request with `response`.
    #[must_use]
    pub fn with_response(response: TableResponse) -> Self {
        Self::with_reply(Reply::Fixed(response))
    }

    /// Fail every request with `error`.
    #[must_use]
    pub fn with_error(error: CostError) -> Self {
        Self::with_reply(Reply::Error(error))
    }

    /// Reject the first `count` requests with HTTP 429 and no back-off hint.
    #[must_use]
    pub fn rate_limited_first(self, count: usize) -> Self {
        self.rate_limited.store(count, Ordering::SeqCst);
        self
    }

    /// Number of requests received, including rejected ones.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait(?Send)]
impl TableSource for StubTableSource {
    async fn fetch_table(&self, request: &TableRequest) -> Result<TableResponse, CostError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let limited = self
            .rate_limited
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if limited {
            return Err(CostError::RateLimitExceeded { retry_after: None });
        }
        match &self.reply {
            Reply::Planar => Ok(planar_table(request)),
            Reply::Fixed(response) => Ok(response.clone()),
            Reply::Error(error) => Err(error.clone()),
        }
    }
}

fn planar_table(request: &TableRequest) -> TableResponse {
    let all: Vec<usize> = (0..request.coordinates.len()).collect();
    let sources = if request.sources.is_empty() {
        &all
    } else {
        &request.sources
    };
    let destinations = if request.destinations.is_empty() {
        &all
    } else {
        &request.destinations
    };
    let cells: Vec<Vec<Option<f64>>> = sources
        .iter()
        .map(|&i| {
            destinations
                .iter()
                .map(|&j| Some(euclid(request.coordinates[i], request.coordinates[j])))
                .collect()
        })
        .collect();
    TableResponse {
        code: "Ok".into(),
        message: None,
        durations: Some(cells.clone()),
        distances: Some(cells),
    }
}

/// Full square response for `coordinates` with straight-line costs.
#[must_use]
pub fn planar_response(coordinates: &[Coord<f64>]) -> TableResponse {
    planar_table(&TableRequest::square(
        totefleet_core::TravelMode::Driving,
        coordinates.to_vec(),
    ))
}

fn euclid(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Drive `future` to completion on a fresh current-thread runtime.
///
/// # Panics
///
/// Panics if the runtime cannot be created.
pub fn block_on_for_tests<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|err| panic!("failed to build test runtime: {err}"))
        .block_on(future)
}
