use std::time::Duration;

use thiserror::Error;

use crate::LocationId;

/// Errors from [`crate::CostProvider::resolve_costs`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CostError {
    /// No coordinates were provided.
    #[error("at least one coordinate is required")]
    EmptyInput,
    /// The routing engine could not snap a coordinate to its network.
    #[error("coordinate {index} could not be resolved: {message}")]
    GeocodeFailure {
        /// Position of the offending coordinate in the request.
        index: usize,
        /// Engine-supplied detail.
        message: String,
    },
    /// The upstream service kept rejecting requests for exceeding its quota.
    #[error("rate limit exceeded")]
    RateLimitExceeded {
        /// Back-off advertised by the service, if any.
        retry_after: Option<Duration>,
    },
    /// The request could not reach the service or timed out.
    #[error("transport failure: {message}")]
    Transport {
        /// Error detail.
        message: String,
        /// Whether retrying the same request may succeed.
        transient: bool,
    },
    /// The service answered with a payload that could not be interpreted.
    #[error("malformed response: {message}")]
    Malformed {
        /// Error detail.
        message: String,
    },
}

impl CostError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimitExceeded { .. } => true,
            Self::Transport { transient, .. } => *transient,
            Self::EmptyInput | Self::GeocodeFailure { .. } | Self::Malformed { .. } => false,
        }
    }

    /// Back-off advertised by the service.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Errors raised while building or slicing a [`crate::DistanceMatrix`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatrixError {
    /// The cost provider failed.
    #[error(transparent)]
    Provider(#[from] CostError),
    /// The provider returned a different number of rows than requested.
    #[error("expected {expected} rows but received {found}")]
    RowCount {
        /// Requested size.
        expected: usize,
        /// Rows received.
        found: usize,
    },
    /// A row had the wrong number of entries.
    #[error("row {row} has {found} entries; expected {expected}")]
    NotSquare {
        /// Requested size.
        expected: usize,
        /// Offending row.
        row: usize,
        /// Entries received.
        found: usize,
    },
    /// A cost was negative or not finite.
    #[error("invalid cost {value} at ({row}, {col})")]
    InvalidCost {
        /// Row index.
        row: usize,
        /// Column index.
        col: usize,
        /// Offending value.
        value: f64,
    },
    /// A diagonal entry was not zero.
    #[error("diagonal entry {index} is {value}; expected 0")]
    NonZeroDiagonal {
        /// Diagonal position.
        index: usize,
        /// Offending value.
        value: f64,
    },
    /// A location identifier appeared twice.
    #[error("location {id} appears more than once")]
    DuplicateId {
        /// Repeated identifier.
        id: LocationId,
    },
    /// A projection referenced a row beyond the matrix.
    #[error("index {index} is out of range for a matrix of size {size}")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Matrix size.
        size: usize,
    },
}
