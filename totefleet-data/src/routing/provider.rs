//! `CostProvider` backed by OSRM's Table API.
//!
//! # Architecture
//!
//! [`CostProvider`] is synchronous to keep the core library embeddable in
//! synchronous contexts. This provider bridges to its async [`TableSource`]
//! by blocking on a Tokio runtime internally.
//!
//! Large tables are split into blocks (see [`OsrmConfig::max_coordinates_per_request`])
//! that are fetched concurrently. The first HTTP 429 switches the provider
//! into serial mode: blocks that have not completed are retried one at a
//! time after the advertised back-off.
//!
//! # Example
//!
//! ```no_run
//! use geo::Coord;
//! use totefleet_core::{CostProvider, TravelMode};
//! use totefleet_data::routing::{OsrmConfig, OsrmCostProvider};
//!
//! let provider = OsrmCostProvider::with_config(
//!     OsrmConfig::new("http://localhost:5000").with_max_concurrent_requests(2),
//! )?;
//! let table = provider.resolve_costs(
//!     &[Coord { x: -0.1, y: 51.5 }, Coord { x: -0.2, y: 51.6 }],
//!     TravelMode::Cycling,
//! )?;
//! println!("{} m", table[0][1].distance);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::cell::Cell;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use geo::Coord;
use log::{debug, info, warn};
use reqwest::Client;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use totefleet_core::{CostError, CostProvider, Leg, TravelMode};

use super::osrm::TableResponse;
use super::source::{HttpTableSource, TableSource};
use super::tiles::{self, Tile};

/// Error type for [`OsrmCostProvider`] construction failures.
#[derive(Debug, Error)]
pub enum ProviderBuildError {
    /// Failed to build the HTTP client.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    /// Failed to build the Tokio runtime.
    #[error("failed to build Tokio runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Default user agent for OSRM requests.
pub const DEFAULT_USER_AGENT: &str = "totefleet-routing/0.1";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Coordinates per request accepted by a stock `osrm-routed`.
const DEFAULT_MAX_COORDINATES: usize = 100;

const DEFAULT_MAX_CONCURRENT: usize = 4;
const DEFAULT_MAX_RATE_LIMIT_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_SECS: u64 = 1;

/// Configuration for [`OsrmCostProvider`].
#[derive(Debug, Clone)]
pub struct OsrmConfig {
    /// Base URL for the OSRM service (e.g., `"http://localhost:5000"`).
    pub base_url: String,
    /// Request timeout duration.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Largest number of coordinates sent in one request.
    pub max_coordinates_per_request: usize,
    /// Requests in flight before throttling.
    pub max_concurrent_requests: usize,
    /// Consecutive HTTP 429 responses tolerated for one block.
    pub max_rate_limit_retries: u32,
    /// Wait applied when a 429 carries no `Retry-After` header.
    pub default_backoff: Duration,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_coordinates_per_request: DEFAULT_MAX_COORDINATES,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT,
            max_rate_limit_retries: DEFAULT_MAX_RATE_LIMIT_RETRIES,
            default_backoff: Duration::from_secs(DEFAULT_BACKOFF_SECS),
        }
    }
}

impl OsrmConfig {
    /// Create a new configuration with the given base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the per-request coordinate limit. Values below two are raised to two.
    #[must_use]
    pub fn with_max_coordinates_per_request(mut self, max: usize) -> Self {
        self.max_coordinates_per_request = max.max(2);
        self
    }

    /// Set the number of concurrent requests. Zero is treated as one.
    #[must_use]
    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max.max(1);
        self
    }

    /// Set the number of consecutive rate limits tolerated per block.
    #[must_use]
    pub fn with_max_rate_limit_retries(mut self, retries: u32) -> Self {
        self.max_rate_limit_retries = retries;
        self
    }

    /// Set the fallback back-off.
    #[must_use]
    pub fn with_default_backoff(mut self, backoff: Duration) -> Self {
        self.default_backoff = backoff;
        self
    }
}

/// Outcome of a block in the concurrent pass.
enum Attempt {
    Done(Result<TableResponse, CostError>),
    /// Skipped because another block was throttled.
    Deferred,
}

/// Travel-cost provider using the OSRM Table API.
///
/// # Runtime behaviour
///
/// When called from outside any Tokio runtime, the provider uses its own
/// stored runtime. When called from within an existing multi-threaded Tokio
/// runtime it uses that runtime's handle with
/// [`tokio::task::block_in_place`] to avoid nested runtime panics. Inside a
/// `current_thread` runtime it falls back to its own runtime.
pub struct OsrmCostProvider<S = HttpTableSource> {
    source: S,
    config: OsrmConfig,
    runtime: Runtime,
}

impl<S: std::fmt::Debug> std::fmt::Debug for OsrmCostProvider<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsrmCostProvider")
            .field("source", &self.source)
            .field("config", &self.config)
            .field("runtime", &"<tokio::runtime::Runtime>")
            .finish()
    }
}

impl OsrmCostProvider {
    /// Create a provider with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or Tokio runtime fails to build.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProviderBuildError> {
        Self::with_config(OsrmConfig::new(base_url))
    }

    /// Create a provider with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or Tokio runtime fails to build.
    pub fn with_config(config: OsrmConfig) -> Result<Self, ProviderBuildError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(ProviderBuildError::HttpClient)?;
        let source = HttpTableSource::new(client, config.base_url.clone(), config.timeout);
        Self::with_source(source, config)
    }
}

impl<S: TableSource> OsrmCostProvider<S> {
    /// Create a provider over any [`TableSource`].
    ///
    /// # Errors
    ///
    /// Returns an error if the Tokio runtime fails to build.
    pub fn with_source(source: S, config: OsrmConfig) -> Result<Self, ProviderBuildError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ProviderBuildError::Runtime)?;
        Ok(Self {
            source,
            config,
            runtime,
        })
    }

    /// Borrow the underlying table source.
    pub const fn source(&self) -> &S {
        &self.source
    }

    async fn fetch_all(
        &self,
        coordinates: &[Coord<f64>],
        mode: TravelMode,
    ) -> Result<Vec<Vec<Leg>>, CostError> {
        let n = coordinates.len();
        let blocks = tiles::plan(coordinates, mode, self.config.max_coordinates_per_request);
        info!("fetching {n}x{n} {mode} table in {} request(s)", blocks.len());

        let throttled = Cell::new(false);
        let hint: Cell<Option<Duration>> = Cell::new(None);
        let attempts: Vec<(usize, Attempt)> = stream::iter(blocks.iter().enumerate())
            .map(|(index, tile)| {
                let throttled = &throttled;
                let hint = &hint;
                async move {
                    if throttled.get() {
                        return (index, Attempt::Deferred);
                    }
                    let outcome = self.source.fetch_table(&tile.request).await;
                    if let Err(CostError::RateLimitExceeded { retry_after }) = &outcome {
                        if !throttled.replace(true) {
                            warn!("rate limited by routing service; switching to serial requests");
                        }
                        hint.set(hint.get().max(*retry_after));
                    }
                    (index, Attempt::Done(outcome))
                }
            })
            .buffer_unordered(self.config.max_concurrent_requests.max(1))
            .collect()
            .await;

        let mut table = vec![vec![Leg::ZERO; n]; n];
        let mut pending: Vec<(&Tile, u32)> = Vec::new();
        for (index, attempt) in attempts {
            let tile = &blocks[index];
            match attempt {
                Attempt::Done(Ok(response)) => tile.place(response, &mut table)?,
                Attempt::Done(Err(CostError::RateLimitExceeded { .. })) => pending.push((tile, 1)),
                Attempt::Done(Err(err)) => return Err(err),
                Attempt::Deferred => pending.push((tile, 0)),
            }
        }

        if !pending.is_empty() {
            let wait = hint.get().unwrap_or(self.config.default_backoff);
            debug!("retrying {} block(s) serially after {wait:?}", pending.len());
            tokio::time::sleep(wait).await;
            for (tile, limited) in pending {
                let response = self.fetch_serial(tile, limited).await?;
                tile.place(response, &mut table)?;
            }
        }
        Ok(table)
    }

    async fn fetch_serial(&self, tile: &Tile, mut limited: u32) -> Result<TableResponse, CostError> {
        loop {
            match self.source.fetch_table(&tile.request).await {
                Err(CostError::RateLimitExceeded { retry_after }) => {
                    limited += 1;
                    if limited > self.config.max_rate_limit_retries {
                        warn!("rate limit persisted after {limited} attempts; giving up");
                        return Err(CostError::RateLimitExceeded { retry_after });
                    }
                    let wait = retry_after.unwrap_or(self.config.default_backoff);
                    warn!("rate limited (attempt {limited}); waiting {wait:?}");
                    tokio::time::sleep(wait).await;
                }
                other => return other,
            }
        }
    }
}

impl<S: TableSource + Send + Sync> CostProvider for OsrmCostProvider<S> {
    fn name(&self) -> &'static str {
        "osrm"
    }

    /// Fetch the cost table for `coordinates`.
    ///
    /// # Runtime requirements
    ///
    /// When called from within an existing Tokio runtime, the runtime must be
    /// multi-threaded (`flavor = "multi_thread"`). Inside a `current_thread`
    /// runtime the provider blocks on its own runtime, which may deadlock if
    /// the caller's runtime drives IO this request depends on.
    fn resolve_costs(
        &self,
        coordinates: &[Coord<f64>],
        mode: TravelMode,
    ) -> Result<Vec<Vec<Leg>>, CostError> {
        if coordinates.is_empty() {
            return Err(CostError::EmptyInput);
        }

        let future = self.fetch_all(coordinates, mode);
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(future))
            }
            _ => self.runtime.block_on(future),
        }
    }
}
