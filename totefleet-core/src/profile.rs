//! Vehicle types, travel modes and per-type fleet profiles.
//!
//! # Examples
//! ```
//! use totefleet_core::{TravelMode, VehicleKind, VehicleProfile};
//!
//! let trucks = VehicleProfile::new(VehicleKind::Truck, 12, 3);
//! assert_eq!(trucks.travel_mode, TravelMode::Driving);
//! assert_eq!(trucks.fleet_capacity(), 36);
//! assert_eq!(VehicleKind::Bike.to_string(), "bike");
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Vehicle type operated by the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum VehicleKind {
    /// Large-capacity road vehicle.
    Truck,
    /// Cargo bike for short hops into dense areas.
    Bike,
}

impl VehicleKind {
    /// Return the kind as a lowercase `&str`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Truck => "truck",
            Self::Bike => "bike",
        }
    }

    /// Travel mode used when no explicit mode is configured.
    #[must_use]
    pub const fn default_travel_mode(self) -> TravelMode {
        match self {
            Self::Truck => TravelMode::Driving,
            Self::Bike => TravelMode::Cycling,
        }
    }
}

impl std::fmt::Display for VehicleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VehicleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "truck" => Ok(Self::Truck),
            "bike" => Ok(Self::Bike),
            _ => Err(format!("unknown vehicle kind '{s}'")),
        }
    }
}

/// Road network profile used to compute travel costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TravelMode {
    /// Motor vehicle routing.
    Driving,
    /// Bicycle routing.
    Cycling,
    /// Pedestrian routing.
    Walking,
}

impl TravelMode {
    /// Return the mode as a lowercase `&str`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Driving => "driving",
            Self::Cycling => "cycling",
            Self::Walking => "walking",
        }
    }
}

impl std::fmt::Display for TravelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fleet description for one vehicle type.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VehicleProfile {
    /// Vehicle type.
    pub kind: VehicleKind,
    /// Totes a vehicle may carry on a pickup-only loop.
    pub capacity: u32,
    /// Totes a vehicle may carry on a combined pickup/dropoff loop.
    ///
    /// Falls back to [`Self::capacity`] when unset.
    #[cfg_attr(feature = "serde", serde(default))]
    pub combined_capacity: Option<u32>,
    /// Number of vehicles available.
    pub count: usize,
    /// Monetary cost per distance unit travelled.
    #[cfg_attr(feature = "serde", serde(default = "default_cost_per_unit"))]
    pub cost_per_unit: f64,
    /// Road network profile.
    #[cfg_attr(feature = "serde", serde(default))]
    pub travel_mode: Option<TravelMode>,
}

#[cfg(feature = "serde")]
const fn default_cost_per_unit() -> f64 {
    1.0
}

impl VehicleProfile {
    /// Construct a profile with unit cost and the kind's default travel mode.
    #[must_use]
    pub const fn new(kind: VehicleKind, capacity: u32, count: usize) -> Self {
        Self {
            kind,
            capacity,
            combined_capacity: None,
            count,
            cost_per_unit: 1.0,
            travel_mode: Some(kind.default_travel_mode()),
        }
    }

    /// Set the combined-loop capacity.
    #[must_use]
    pub const fn with_combined_capacity(mut self, capacity: u32) -> Self {
        self.combined_capacity = Some(capacity);
        self
    }

    /// Set the cost per distance unit.
    #[must_use]
    pub const fn with_cost_per_unit(mut self, cost: f64) -> Self {
        self.cost_per_unit = cost;
        self
    }

    /// Override the travel mode.
    #[must_use]
    pub const fn with_travel_mode(mut self, mode: TravelMode) -> Self {
        self.travel_mode = Some(mode);
        self
    }

    /// Capacity applied to combined pickup/dropoff loops.
    #[must_use]
    pub fn combined_capacity(&self) -> u32 {
        self.combined_capacity.unwrap_or(self.capacity)
    }

    /// Travel mode used for this vehicle type's matrix.
    #[must_use]
    pub fn travel_mode(&self) -> TravelMode {
        self.travel_mode
            .unwrap_or_else(|| self.kind.default_travel_mode())
    }

    /// Total totes the whole fleet can carry in one pass.
    #[must_use]
    pub const fn fleet_capacity(&self) -> u64 {
        self.capacity as u64 * self.count as u64
    }
}
