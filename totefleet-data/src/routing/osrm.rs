//! OSRM Table service request and response types.
//!
//! The Table service returns the fastest-route duration and distance between
//! every requested source and destination coordinate.
//!
//! See: <http://project-osrm.org/docs/v5.24.0/api/#table-service>

use geo::Coord;
use serde::Deserialize;
use totefleet_core::TravelMode;

/// Code returned when a coordinate cannot be snapped to the road network.
pub const NO_SEGMENT: &str = "NoSegment";

/// One Table service call.
///
/// `sources` and `destinations` index into `coordinates`. Empty lists mean
/// "every coordinate", matching the service default.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRequest {
    /// Routing profile.
    pub mode: TravelMode,
    /// Coordinates with `x = longitude`, `y = latitude`.
    pub coordinates: Vec<Coord<f64>>,
    /// Coordinate positions used as matrix rows.
    pub sources: Vec<usize>,
    /// Coordinate positions used as matrix columns.
    pub destinations: Vec<usize>,
}

impl TableRequest {
    /// Request the full square table for `coordinates`.
    #[must_use]
    pub const fn square(mode: TravelMode, coordinates: Vec<Coord<f64>>) -> Self {
        Self {
            mode,
            coordinates,
            sources: Vec::new(),
            destinations: Vec::new(),
        }
    }

    /// Number of rows the response should contain.
    #[must_use]
    pub fn row_count(&self) -> usize {
        if self.sources.is_empty() {
            self.coordinates.len()
        } else {
            self.sources.len()
        }
    }

    /// Number of columns each response row should contain.
    #[must_use]
    pub fn column_count(&self) -> usize {
        if self.destinations.is_empty() {
            self.coordinates.len()
        } else {
            self.destinations.len()
        }
    }

    /// Build the Table API URL below `base_url`.
    ///
    /// The format is `{base_url}/table/v1/{profile}/{lon,lat;...}` with both
    /// annotations requested.
    #[must_use]
    pub fn url(&self, base_url: &str) -> String {
        let coordinates = self
            .coordinates
            .iter()
            .map(|c| format!("{},{}", c.x, c.y))
            .collect::<Vec<_>>()
            .join(";");
        let mut url = format!(
            "{}/table/v1/{}/{}?annotations=duration,distance",
            base_url.trim_end_matches('/'),
            self.mode.as_str(),
            coordinates
        );
        if !self.sources.is_empty() {
            url.push_str("&sources=");
            url.push_str(&join_indices(&self.sources));
        }
        if !self.destinations.is_empty() {
            url.push_str("&destinations=");
            url.push_str(&join_indices(&self.destinations));
        }
        url
    }
}

fn join_indices(indices: &[usize]) -> String {
    indices
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(";")
}

/// OSRM Table API response.
///
/// The response contains either the annotation matrices on success or an
/// error message on failure. The `code` field indicates the response status.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TableResponse {
    /// Status code from OSRM.
    ///
    /// Common values:
    /// - `"Ok"` - Request was successful
    /// - `"InvalidQuery"` - Invalid query parameters
    /// - `"NoSegment"` - A coordinate could not be snapped to the network
    /// - `"NoTable"` - Table computation failed
    pub code: String,

    /// Optional error message when `code` is not `"Ok"`.
    #[serde(default)]
    pub message: Option<String>,

    /// Durations in seconds; `None` when no route exists.
    #[serde(default)]
    pub durations: Option<Vec<Vec<Option<f64>>>>,

    /// Distances in metres; `None` when no route exists.
    #[serde(default)]
    pub distances: Option<Vec<Vec<Option<f64>>>>,
}

impl TableResponse {
    /// Check if the response indicates success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code == "Ok"
    }

    /// Position of the unresolvable coordinate named by a `NoSegment` message.
    ///
    /// OSRM ends the message with the coordinate's index in the request.
    #[must_use]
    pub fn failed_coordinate(&self) -> Option<usize> {
        if self.code != NO_SEGMENT {
            return None;
        }
        self.message
            .as_deref()?
            .split_whitespace()
            .last()?
            .trim_end_matches('.')
            .parse()
            .ok()
    }
}
