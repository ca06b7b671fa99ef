//! Transport seam between the OSRM provider and the network.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use totefleet_core::CostError;

use super::osrm::{TableRequest, TableResponse};

/// Source of OSRM Table responses.
///
/// Implementations report an HTTP 429 as
/// [`CostError::RateLimitExceeded`] so the provider can throttle. Service
/// level failures such as `NoSegment` are returned as a [`TableResponse`]
/// and interpreted by the provider.
#[async_trait(?Send)]
pub trait TableSource {
    /// Fetch one table.
    async fn fetch_table(&self, request: &TableRequest) -> Result<TableResponse, CostError>;
}

/// `TableSource` issuing HTTP GET requests with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTableSource {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTableSource {
    /// Wrap a configured client.
    #[must_use]
    pub fn new(client: Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    fn convert_reqwest_error(&self, error: &reqwest::Error, url: &str) -> CostError {
        if error.is_timeout() {
            return CostError::Transport {
                message: format!(
                    "request to {url} timed out after {}s",
                    self.timeout.as_secs()
                ),
                transient: true,
            };
        }
        CostError::Transport {
            message: format!("request to {url} failed: {error}"),
            transient: error.is_connect(),
        }
    }
}

#[async_trait(?Send)]
impl TableSource for HttpTableSource {
    async fn fetch_table(&self, request: &TableRequest) -> Result<TableResponse, CostError> {
        let url = request.url(&self.base_url);
        debug!(
            "requesting {}x{} table",
            request.row_count(),
            request.column_count()
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, &url))?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CostError::RateLimitExceeded {
                retry_after: retry_after(response.headers()),
            });
        }
        let body = response
            .text()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, &url))?;
        interpret_body(status, &body, &url)
    }
}

/// Decode a Table body, keeping OSRM error payloads sent with 4xx statuses.
fn interpret_body(status: StatusCode, body: &str, url: &str) -> Result<TableResponse, CostError> {
    match serde_json::from_str::<TableResponse>(body) {
        Ok(table) => Ok(table),
        Err(err) if status.is_success() => Err(CostError::Malformed {
            message: err.to_string(),
        }),
        Err(_) => Err(CostError::Transport {
            message: format!("{url} returned HTTP {}", status.as_u16()),
            transient: status.is_server_error(),
        }),
    }
}

/// Parse a `Retry-After` header given in whole seconds.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
        .map(Duration::from_secs)
}
