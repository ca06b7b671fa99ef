//! Sites served by the fleet and their tote demand.

use geo::Coord;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::profile::VehicleKind;

/// Stable identifier of a site. Unique within a run.
pub type LocationId = u64;

/// Whether a site accepts deliveries of clean totes.
///
/// Only indoor venues receive dropoffs; outdoor bins are collection-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SiteRole {
    /// Venue with storage space for clean totes.
    #[default]
    Indoor,
    /// Street-side collection bin.
    Outdoor,
}

/// Vehicle type a site is assigned to by the source data.
///
/// Segmentation may move `Truck` and `Both` sites onto bikes when they sit
/// close to an aggregation point; `Bike` sites always stay with bikes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Eligibility {
    /// Served by trucks.
    Truck,
    /// Served by bikes only.
    Bike,
    /// Either vehicle type may serve the site.
    #[default]
    Both,
}

impl Eligibility {
    /// Return `true` when `kind` serves a site with this eligibility before
    /// any bike conversion.
    ///
    /// # Examples
    ///
    /// ```
    /// use totefleet_core::{Eligibility, VehicleKind};
    ///
    /// assert!(Eligibility::Both.allows(VehicleKind::Bike));
    /// assert!(!Eligibility::Truck.allows(VehicleKind::Bike));
    /// ```
    #[must_use]
    pub const fn allows(self, kind: VehicleKind) -> bool {
        matches!(
            (self, kind),
            (Self::Both, _)
                | (Self::Truck, VehicleKind::Truck)
                | (Self::Bike, VehicleKind::Bike)
        )
    }
}

/// Raw site record as supplied by the upstream data source.
///
/// Volumes are fractional averages; [`crate::extract_demand`] turns them
/// into whole totes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SiteRecord {
    /// Unique identifier.
    pub id: LocationId,
    /// Position with `x = longitude`, `y = latitude`.
    pub location: Coord<f64>,
    /// Indoor venue or outdoor bin.
    #[cfg_attr(feature = "serde", serde(default))]
    pub role: SiteRole,
    /// Vehicle types allowed to serve the site.
    #[cfg_attr(feature = "serde", serde(default))]
    pub eligibility: Eligibility,
    /// Average totes collected per day.
    #[cfg_attr(feature = "serde", serde(default))]
    pub daily_pickup_volume: f64,
    /// Average clean totes delivered per week.
    #[cfg_attr(feature = "serde", serde(default))]
    pub weekly_dropoff_volume: f64,
    /// Marks the single depot of the run.
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_depot: bool,
    /// Marks a consolidation hub where bikes unload for truck collection.
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_aggregation_point: bool,
}

impl SiteRecord {
    /// Construct a record with no demand and default role and eligibility.
    #[must_use]
    pub const fn new(id: LocationId, location: Coord<f64>) -> Self {
        Self {
            id,
            location,
            role: SiteRole::Indoor,
            eligibility: Eligibility::Both,
            daily_pickup_volume: 0.0,
            weekly_dropoff_volume: 0.0,
            is_depot: false,
            is_aggregation_point: false,
        }
    }

    /// Mark the record as the depot.
    #[must_use]
    pub const fn depot(mut self) -> Self {
        self.is_depot = true;
        self
    }

    /// Set the fractional pickup and dropoff volumes.
    #[must_use]
    pub const fn with_volumes(mut self, pickup: f64, dropoff: f64) -> Self {
        self.daily_pickup_volume = pickup;
        self.weekly_dropoff_volume = dropoff;
        self
    }

    /// Set the site role.
    #[must_use]
    pub const fn with_role(mut self, role: SiteRole) -> Self {
        self.role = role;
        self
    }

    /// Set the vehicle eligibility.
    #[must_use]
    pub const fn with_eligibility(mut self, eligibility: Eligibility) -> Self {
        self.eligibility = eligibility;
        self
    }

    /// Mark the record as an aggregation point.
    #[must_use]
    pub const fn aggregation_point(mut self) -> Self {
        self.is_aggregation_point = true;
        self
    }
}

/// A site with integer tote demand, ready for routing.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Location {
    /// Unique identifier.
    pub id: LocationId,
    /// Position with `x = longitude`, `y = latitude`.
    pub location: Coord<f64>,
    /// Indoor venue or outdoor bin.
    pub role: SiteRole,
    /// Vehicle types allowed to serve the site.
    pub eligibility: Eligibility,
    /// Totes to collect.
    pub pickup_demand: u32,
    /// Clean totes to deliver.
    pub dropoff_demand: u32,
    /// Marks the depot.
    pub is_depot: bool,
    /// Marks a consolidation hub.
    pub is_aggregation_point: bool,
}

impl Location {
    /// Combined number of totes handled at the site.
    #[must_use]
    pub const fn total_demand(&self) -> u64 {
        self.pickup_demand as u64 + self.dropoff_demand as u64
    }

    /// Whether only bikes may serve the site.
    #[must_use]
    pub const fn is_bike_only(&self) -> bool {
        matches!(self.eligibility, Eligibility::Bike)
    }

    /// Whether a bike may serve the site.
    #[must_use]
    pub const fn is_bike_serviceable(&self) -> bool {
        !matches!(self.eligibility, Eligibility::Truck)
    }
}
