//! Solved vehicle routes and the load arithmetic they must satisfy.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{LocationId, VehicleKind};

/// What a route does at its stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ServiceKind {
    /// Collect totes only.
    Pickup,
    /// Deliver clean totes only.
    Dropoff,
    /// Collect and deliver on the same loop.
    Combined,
}

impl ServiceKind {
    /// Return the service as a lowercase `&str`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pickup => "pickup",
            Self::Dropoff => "dropoff",
            Self::Combined => "combined",
        }
    }
}

/// Totes exchanged at one stop.
///
/// Deliveries are loaded at the depot before departure; pickups stay on
/// board until the vehicle returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StopLoad {
    /// Totes collected.
    pub pickup: u32,
    /// Totes delivered.
    pub delivery: u32,
}

impl StopLoad {
    /// Construct a stop load.
    #[must_use]
    pub const fn new(pickup: u32, delivery: u32) -> Self {
        Self { pickup, delivery }
    }

    /// A collection-only stop.
    #[must_use]
    pub const fn pickup(totes: u32) -> Self {
        Self::new(totes, 0)
    }

    /// Totes moved at the stop in either direction.
    #[must_use]
    pub const fn total(self) -> u64 {
        self.pickup as u64 + self.delivery as u64
    }
}

/// Load carried on each leg of a tour visiting `stops` in order.
///
/// Entry `0` is the load on departure from the depot (every delivery for
/// the tour). Entry `k` is the load on departure from stop `k`, which drops
/// that stop's delivery and adds its pickup. The final entry is the load
/// brought back to the depot.
///
/// # Examples
///
/// ```
/// use totefleet_core::{StopLoad, load_profile};
///
/// let profile = load_profile(&[StopLoad::new(2, 3), StopLoad::new(4, 1)]);
/// assert_eq!(profile, vec![4, 3, 6]);
/// ```
#[must_use]
pub fn load_profile(stops: &[StopLoad]) -> Vec<u64> {
    let start: u64 = stops.iter().map(|stop| u64::from(stop.delivery)).sum();
    let mut loads = Vec::with_capacity(stops.len() + 1);
    loads.push(start);
    let mut current = start;
    for stop in stops {
        current = current - u64::from(stop.delivery) + u64::from(stop.pickup);
        loads.push(current);
    }
    loads
}

/// Position in [`load_profile`] of the first leg exceeding `capacity`.
#[must_use]
pub fn first_overload(stops: &[StopLoad], capacity: u32) -> Option<usize> {
    load_profile(stops)
        .iter()
        .position(|&load| load > u64::from(capacity))
}

/// One vehicle's loop from the depot and back.
///
/// `stops`, `loads`, `cumulative_distance` and `cumulative_duration` are
/// index-aligned. The first and last stop are the depot.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Route {
    /// Vehicle type serving the loop.
    pub vehicle: VehicleKind,
    /// Position of the vehicle within its fleet.
    pub vehicle_index: usize,
    /// Work carried out at the stops.
    pub service: ServiceKind,
    /// Capacity the loop was planned against.
    pub capacity: u32,
    /// Visited locations, depot first and last.
    pub stops: Vec<LocationId>,
    /// Load on departure from each stop.
    pub loads: Vec<u64>,
    /// Metres travelled on arrival at each stop.
    pub cumulative_distance: Vec<f64>,
    /// Seconds travelled on arrival at each stop.
    pub cumulative_duration: Vec<f64>,
    /// Totes collected.
    pub pickup: u64,
    /// Totes delivered.
    pub dropoff: u64,
    /// Distance multiplied by the fleet's cost per unit.
    pub cost: f64,
}

impl Route {
    /// Metres travelled over the whole loop.
    #[must_use]
    pub fn total_distance(&self) -> f64 {
        self.cumulative_distance.last().copied().unwrap_or_default()
    }

    /// Seconds travelled over the whole loop.
    #[must_use]
    pub fn total_duration(&self) -> f64 {
        self.cumulative_duration.last().copied().unwrap_or_default()
    }

    /// Heaviest load carried on any leg.
    #[must_use]
    pub fn peak_load(&self) -> u64 {
        self.loads.iter().copied().max().unwrap_or_default()
    }

    /// Locations visited between leaving and re-entering the depot.
    #[must_use]
    pub fn visits(&self) -> &[LocationId] {
        match self.stops.as_slice() {
            [_, inner @ .., _] => inner,
            _ => &[],
        }
    }

    /// Number of non-depot stops.
    #[must_use]
    pub fn location_count(&self) -> usize {
        self.visits().len()
    }

    /// Human-readable itinerary.
    ///
    /// # Examples
    ///
    /// ```
    /// use totefleet_core::{Route, ServiceKind, VehicleKind};
    ///
    /// let route = Route {
    ///     vehicle: VehicleKind::Truck,
    ///     vehicle_index: 0,
    ///     service: ServiceKind::Pickup,
    ///     capacity: 8,
    ///     stops: vec![0, 5, 0],
    ///     loads: vec![0, 3, 3],
    ///     cumulative_distance: vec![0.0, 10.0, 20.0],
    ///     cumulative_duration: vec![0.0, 2.0, 4.0],
    ///     pickup: 3,
    ///     dropoff: 0,
    ///     cost: 20.0,
    /// };
    /// assert!(route.render().starts_with("truck 1 (pickup, capacity 8)"));
    /// ```
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {} ({}, capacity {})",
            self.vehicle,
            self.vehicle_index + 1,
            self.service.as_str(),
            self.capacity
        )?;
        let rows = self
            .stops
            .iter()
            .zip(&self.loads)
            .zip(&self.cumulative_distance);
        for ((stop, load), distance) in rows {
            writeln!(f, "  {stop:>8}  load {load:>4}  {distance:>10.1} m")?;
        }
        writeln!(
            f,
            "  distance {:.1} m, time {:.0} s, collected {}, delivered {}, cost {:.2}",
            self.total_distance(),
            self.total_duration(),
            self.pickup,
            self.dropoff,
            self.cost
        )
    }
}
