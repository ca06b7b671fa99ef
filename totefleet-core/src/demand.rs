//! Integer tote demand from raw site volumes.
//!
//! Volumes arrive as fractional averages. Each is rounded half up to whole
//! totes; values that are negative or not finite are treated as zero and
//! logged. The depot never carries demand and outdoor bins never receive
//! dropoffs. The output keeps the input order, which must match the rows of
//! the matrix the locations will be routed over.

use log::warn;
use thiserror::Error;

use crate::{DistanceMatrix, Location, LocationId, SiteRecord, SiteRole};

/// Location list and matrix rows disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AlignmentError {
    /// Different numbers of locations and matrix rows.
    #[error("matrix has {matrix} rows but {locations} locations were supplied")]
    LengthMismatch {
        /// Matrix size.
        matrix: usize,
        /// Locations supplied.
        locations: usize,
    },
    /// Row `position` belongs to a different location.
    #[error(
        "matrix row {position} is location {matrix_id} but location {location_id} was supplied"
    )]
    IndexMisalignment {
        /// Offending position.
        position: usize,
        /// Identifier the matrix holds at `position`.
        matrix_id: LocationId,
        /// Identifier supplied at `position`.
        location_id: LocationId,
    },
}

/// Check that `ids` lists the matrix's locations in row order.
///
/// # Errors
///
/// Returns [`AlignmentError::LengthMismatch`] when the counts differ and
/// [`AlignmentError::IndexMisalignment`] at the first differing position.
pub fn ensure_aligned(ids: &[LocationId], matrix: &DistanceMatrix) -> Result<(), AlignmentError> {
    if ids.len() != matrix.len() {
        return Err(AlignmentError::LengthMismatch {
            matrix: matrix.len(),
            locations: ids.len(),
        });
    }
    match ids
        .iter()
        .zip(matrix.ids())
        .enumerate()
        .find(|(_, (supplied, held))| supplied != held)
    {
        Some((position, (&location_id, &matrix_id))) => Err(AlignmentError::IndexMisalignment {
            position,
            matrix_id,
            location_id,
        }),
        None => Ok(()),
    }
}

/// Convert `records` into routable [`Location`] values aligned with
/// `matrix`.
///
/// # Errors
///
/// Returns an [`AlignmentError`] when the records are not in the matrix's
/// row order.
///
/// # Examples
///
/// ```
/// use geo::Coord;
/// use totefleet_core::{DistanceMatrix, SiteRecord, SiteRole, extract_demand};
///
/// let records = vec![
///     SiteRecord::new(1, Coord { x: 0.0, y: 0.0 }).depot(),
///     SiteRecord::new(2, Coord { x: 1.0, y: 0.0 }).with_volumes(2.5, 3.4),
///     SiteRecord::new(3, Coord { x: 2.0, y: 0.0 })
///         .with_volumes(1.2, 6.0)
///         .with_role(SiteRole::Outdoor),
/// ];
/// let matrix = DistanceMatrix::from_distances(
///     vec![1, 2, 3],
///     vec![vec![0.0, 1.0, 2.0], vec![1.0, 0.0, 1.0], vec![2.0, 1.0, 0.0]],
/// )?;
/// let locations = extract_demand(&records, &matrix)?;
/// assert_eq!((locations[1].pickup_demand, locations[1].dropoff_demand), (3, 3));
/// assert_eq!((locations[2].pickup_demand, locations[2].dropoff_demand), (1, 0));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn extract_demand(
    records: &[SiteRecord],
    matrix: &DistanceMatrix,
) -> Result<Vec<Location>, AlignmentError> {
    let ids: Vec<LocationId> = records.iter().map(|record| record.id).collect();
    ensure_aligned(&ids, matrix)?;
    Ok(records.iter().map(to_location).collect())
}

fn to_location(record: &SiteRecord) -> Location {
    let mut pickup_demand = totes(record.daily_pickup_volume, record.id, "pickup");
    let mut dropoff_demand = totes(record.weekly_dropoff_volume, record.id, "dropoff");
    if record.is_depot && (pickup_demand > 0 || dropoff_demand > 0) {
        warn!("ignoring demand recorded at depot {}", record.id);
        pickup_demand = 0;
        dropoff_demand = 0;
    }
    if record.role == SiteRole::Outdoor {
        dropoff_demand = 0;
    }
    Location {
        id: record.id,
        location: record.location,
        role: record.role,
        eligibility: record.eligibility,
        pickup_demand,
        dropoff_demand,
        is_depot: record.is_depot,
        is_aggregation_point: record.is_aggregation_point,
    }
}

/// Round half up to whole totes; invalid volumes count as zero.
fn totes(volume: f64, id: LocationId, field: &str) -> u32 {
    if !volume.is_finite() || volume < 0.0 {
        warn!("location {id} has invalid {field} volume {volume}; treating as zero");
        return 0;
    }
    // Finite and non-negative here; the cast saturates at u32::MAX.
    volume.round() as u32
}
