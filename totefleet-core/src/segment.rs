//! Split locations between the truck and bike fleets.
//!
//! Bike-only sites always go to bikes. Any other site close enough to a
//! bike-serviceable aggregation point, and light enough for a bike, is
//! converted to bike service. Bike routes never visit the aggregation point;
//! its effective pickup grows by the converted totes so the truck that
//! visits it accounts for them. Everything else stays with trucks. This is
//! the only place the two fleets interact; after it each subset is routed on
//! its own.

use log::{debug, info};
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    AlignmentError, DistanceMatrix, Location, LocationId, MatrixError, Objective, VehicleKind,
    ensure_aligned,
};

/// Settings for moving truck sites onto bikes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BikeConversion {
    /// Whether conversion runs at all.
    #[cfg_attr(feature = "serde", serde(default = "enabled_by_default"))]
    pub enabled: bool,
    /// A site converts only when strictly closer than this to its nearest
    /// aggregation point, in metres.
    pub distance_threshold: f64,
    /// A site converts only when its total demand fits within this many
    /// totes.
    pub bike_capacity_ceiling: u32,
}

#[cfg(feature = "serde")]
const fn enabled_by_default() -> bool {
    true
}

impl BikeConversion {
    /// Conversion switched off.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            distance_threshold: 0.0,
            bike_capacity_ceiling: 0,
        }
    }
}

/// A site moved from truck to bike service.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Conversion {
    /// Converted site.
    pub location: LocationId,
    /// Aggregation point receiving its totes.
    pub anchor: LocationId,
    /// Distance from the site to the anchor.
    pub distance: f64,
    /// Totes added to the anchor's pickup.
    pub totes: u32,
}

/// Errors from [`segment_by_vehicle_type`] and [`Segmentation::subset`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegmentError {
    /// Locations and matrix rows disagree.
    #[error(transparent)]
    Alignment(#[from] AlignmentError),
    /// Slicing the matrix failed.
    #[error(transparent)]
    Matrix(#[from] MatrixError),
    /// The location list must contain exactly one depot.
    #[error("expected exactly one depot but found {found}")]
    DepotCount {
        /// Depots found.
        found: usize,
    },
}

/// The routing input for one vehicle type.
///
/// The depot is row `0`; `locations[i]` matches row `i` of `matrix`.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSubset {
    /// Vehicle type.
    pub kind: VehicleKind,
    /// Depot followed by the sites this fleet serves.
    pub locations: Vec<Location>,
    /// Costs between `locations`.
    pub matrix: DistanceMatrix,
}

impl VehicleSubset {
    /// Number of sites excluding the depot.
    #[must_use]
    pub fn site_count(&self) -> usize {
        self.locations.len().saturating_sub(1)
    }
}

/// Result of [`segment_by_vehicle_type`].
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    locations: Vec<Location>,
    truck: Vec<usize>,
    bike: Vec<usize>,
    conversions: Vec<Conversion>,
}

impl Segmentation {
    /// All locations in input order, with aggregation points carrying their
    /// effective pickup.
    #[must_use]
    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Input positions served by `kind`, depot first.
    #[must_use]
    pub fn indices(&self, kind: VehicleKind) -> &[usize] {
        match kind {
            VehicleKind::Truck => &self.truck,
            VehicleKind::Bike => &self.bike,
        }
    }

    /// Sites moved from trucks to bikes.
    #[must_use]
    pub fn conversions(&self) -> &[Conversion] {
        &self.conversions
    }

    /// Build the subset for `kind` over `matrix`.
    ///
    /// `matrix` may be any matrix aligned with the segmented locations, so
    /// each fleet can be sliced from the cost table of its own travel mode.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::Alignment`] when `matrix` does not list the
    /// locations in input order.
    pub fn subset(
        &self,
        kind: VehicleKind,
        matrix: &DistanceMatrix,
    ) -> Result<VehicleSubset, SegmentError> {
        let ids: Vec<LocationId> = self.locations.iter().map(|l| l.id).collect();
        ensure_aligned(&ids, matrix)?;
        let indices = self.indices(kind);
        let locations = indices
            .iter()
            .filter_map(|&index| self.locations.get(index).cloned())
            .collect();
        Ok(VehicleSubset {
            kind,
            locations,
            matrix: matrix.project(indices)?,
        })
    }
}

/// Partition `locations` into truck and bike service.
///
/// `proximity` supplies the distances used to find each site's nearest
/// aggregation point. Equidistant aggregation points resolve to the lowest
/// identifier. The depot is placed first in both subsets.
///
/// # Errors
///
/// Returns [`SegmentError::Alignment`] when `proximity` is not aligned with
/// `locations` and [`SegmentError::DepotCount`] unless exactly one depot is
/// present.
///
/// # Examples
///
/// ```
/// use geo::Coord;
/// use totefleet_core::{BikeConversion, DistanceMatrix, SiteRecord, VehicleKind};
/// use totefleet_core::{extract_demand, segment_by_vehicle_type};
///
/// let records = vec![
///     SiteRecord::new(0, Coord { x: 0.0, y: 0.0 }).depot(),
///     SiteRecord::new(1, Coord { x: 9.0, y: 0.0 }).aggregation_point().with_volumes(2.0, 0.0),
///     SiteRecord::new(2, Coord { x: 10.0, y: 0.0 }).with_volumes(3.0, 0.0),
/// ];
/// let matrix = DistanceMatrix::from_distances(
///     vec![0, 1, 2],
///     vec![vec![0.0, 9.0, 10.0], vec![9.0, 0.0, 1.0], vec![10.0, 1.0, 0.0]],
/// )?;
/// let locations = extract_demand(&records, &matrix)?;
/// let config = BikeConversion { enabled: true, distance_threshold: 2.0, bike_capacity_ceiling: 5 };
/// let split = segment_by_vehicle_type(&locations, &matrix, &config)?;
/// assert_eq!(split.indices(VehicleKind::Bike), &[0, 2]);
/// assert_eq!(split.locations()[1].pickup_demand, 5);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn segment_by_vehicle_type(
    locations: &[Location],
    proximity: &DistanceMatrix,
    config: &BikeConversion,
) -> Result<Segmentation, SegmentError> {
    let ids: Vec<LocationId> = locations.iter().map(|l| l.id).collect();
    ensure_aligned(&ids, proximity)?;
    let depot = find_depot(locations)?;

    let mut aggregation_points: Vec<(LocationId, usize)> = locations
        .iter()
        .enumerate()
        .filter(|(_, l)| l.is_aggregation_point && !l.is_depot)
        .map(|(index, l)| (l.id, index))
        .collect();
    aggregation_points.sort_unstable();
    let anchors: Vec<(LocationId, usize)> = aggregation_points
        .iter()
        .copied()
        .filter(|&(_, index)| locations.get(index).is_some_and(Location::is_bike_serviceable))
        .collect();

    let mut effective = locations.to_vec();
    let mut truck = vec![depot];
    let mut bike = vec![depot];
    let mut conversions = Vec::new();

    for (index, location) in locations.iter().enumerate() {
        if index == depot || location.is_aggregation_point {
            continue;
        }
        if location.is_bike_only() {
            bike.push(index);
            continue;
        }
        match convert(location, index, &anchors, proximity, config) {
            Some(conversion) => {
                if let Some(anchor) = effective.iter_mut().find(|l| l.id == conversion.anchor) {
                    anchor.pickup_demand = anchor.pickup_demand.saturating_add(conversion.totes);
                }
                debug!(
                    "location {} moves to bike service via aggregation point {}",
                    conversion.location, conversion.anchor
                );
                conversions.push(conversion);
                bike.push(index);
            }
            None => truck.push(index),
        }
    }
    truck.extend(aggregation_points.iter().map(|&(_, index)| index));
    truck[1..].sort_unstable();

    info!(
        "segmented {} sites: {} truck, {} bike, {} converted",
        locations.len().saturating_sub(1),
        truck.len() - 1,
        bike.len() - 1,
        conversions.len()
    );
    Ok(Segmentation {
        locations: effective,
        truck,
        bike,
        conversions,
    })
}

fn find_depot(locations: &[Location]) -> Result<usize, SegmentError> {
    let depots: Vec<usize> = locations
        .iter()
        .enumerate()
        .filter(|(_, l)| l.is_depot)
        .map(|(index, _)| index)
        .collect();
    match depots.as_slice() {
        [depot] => Ok(*depot),
        _ => Err(SegmentError::DepotCount {
            found: depots.len(),
        }),
    }
}

fn convert(
    location: &Location,
    index: usize,
    anchors: &[(LocationId, usize)],
    proximity: &DistanceMatrix,
    config: &BikeConversion,
) -> Option<Conversion> {
    if !config.enabled || location.total_demand() > u64::from(config.bike_capacity_ceiling) {
        return None;
    }
    let (anchor, distance) = nearest_anchor(index, anchors, proximity)?;
    (distance < config.distance_threshold).then_some(Conversion {
        location: location.id,
        anchor,
        distance,
        totes: location.pickup_demand,
    })
}

/// Anchors arrive sorted by id, so keeping the first strict minimum breaks
/// ties towards the lowest identifier.
fn nearest_anchor(
    index: usize,
    anchors: &[(LocationId, usize)],
    proximity: &DistanceMatrix,
) -> Option<(LocationId, f64)> {
    let mut best: Option<(LocationId, f64)> = None;
    for &(id, anchor) in anchors {
        let Some(distance) = proximity.cost(index, anchor, Objective::Distance) else {
            continue;
        };
        if best.is_none_or(|(_, current)| distance < current) {
            best = Some((id, distance));
        }
    }
    best
}
