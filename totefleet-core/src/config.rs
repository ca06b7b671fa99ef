//! Run configuration.
//!
//! A [`RunConfig`] is read once at start-up, validated, and never mutated
//! while runs execute. The optional [`ParameterSweep`] expands it into one
//! [`RunParameters`] per point of a cartesian grid for sensitivity analysis.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use geo::Coord;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    BikeConversion, CombineMode, LocationId, Objective, RunParameters, VehicleKind,
    VehicleProfile,
};

/// Default solver budget in seconds.
pub const DEFAULT_TIME_LIMIT_SECS: u64 = 30;

/// Solver backend chosen at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SolverKind {
    /// Metaheuristic search via `vrp-core`.
    #[default]
    Vrp,
    /// Deterministic Clarke-Wright savings with local improvement.
    Savings,
}

impl SolverKind {
    /// Return the backend as a lowercase `&str`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vrp => "vrp",
            Self::Savings => "savings",
        }
    }
}

impl std::str::FromStr for SolverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vrp" => Ok(Self::Vrp),
            "savings" => Ok(Self::Savings),
            _ => Err(format!("unknown solver backend '{s}'")),
        }
    }
}

/// Solver settings shared by every solve in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SolverSettings {
    /// Backend to run.
    pub backend: SolverKind,
    /// Wall-clock budget per solve, in seconds.
    pub time_limit_secs: u64,
    /// Seed for stochastic backends.
    pub seed: u64,
    /// Iteration cap for metaheuristic backends.
    pub max_generations: Option<usize>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            backend: SolverKind::default(),
            time_limit_secs: DEFAULT_TIME_LIMIT_SECS,
            seed: 0,
            max_generations: None,
        }
    }
}

/// Depot to add when the site table has none.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DepotSettings {
    /// Identifier for the synthetic depot.
    pub id: LocationId,
    /// Position with `x = longitude`, `y = latitude`.
    pub location: Coord<f64>,
}

/// Inclusive integer range stepped by `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Range {
    /// First value.
    pub min: u64,
    /// Last value, included when reachable.
    pub max: u64,
    /// Increment; must be positive.
    #[cfg_attr(feature = "serde", serde(default = "unit_step"))]
    pub step: u64,
}

#[cfg(feature = "serde")]
const fn unit_step() -> u64 {
    1
}

impl Range {
    /// Construct a range.
    #[must_use]
    pub const fn new(min: u64, max: u64, step: u64) -> Self {
        Self { min, max, step }
    }

    /// A range holding one value.
    #[must_use]
    pub const fn single(value: u64) -> Self {
        Self::new(value, value, 1)
    }

    /// Values from `min` to `max` inclusive.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRange`] when `step` is zero or
    /// `min > max`.
    ///
    /// # Examples
    ///
    /// ```
    /// use totefleet_core::Range;
    ///
    /// assert_eq!(Range::new(2, 7, 2).values("count")?, vec![2, 4, 6]);
    /// # Ok::<(), totefleet_core::ConfigError>(())
    /// ```
    pub fn values(&self, name: &'static str) -> Result<Vec<u64>, ConfigError> {
        if self.step == 0 || self.min > self.max {
            return Err(ConfigError::InvalidRange {
                name,
                min: self.min,
                max: self.max,
                step: self.step,
            });
        }
        let mut values = Vec::new();
        let mut value = self.min;
        while value <= self.max {
            values.push(value);
            match value.checked_add(self.step) {
                Some(next) => value = next,
                None => break,
            }
        }
        Ok(values)
    }
}

/// Grid of parameter overrides for one vehicle type.
///
/// Unset ranges keep the base profile's value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterSweep {
    /// Vehicle type whose profile is varied.
    pub vehicle: VehicleKind,
    /// Vehicle counts to try.
    #[cfg_attr(feature = "serde", serde(default))]
    pub vehicle_count: Option<Range>,
    /// Pickup capacities to try.
    #[cfg_attr(feature = "serde", serde(default))]
    pub capacity: Option<Range>,
    /// Combined capacities to try.
    #[cfg_attr(feature = "serde", serde(default))]
    pub combined_capacity: Option<Range>,
    /// Solver budgets to try, in seconds.
    #[cfg_attr(feature = "serde", serde(default))]
    pub time_limit_secs: Option<Range>,
    /// Run grid points on a thread pool.
    #[cfg_attr(feature = "serde", serde(default))]
    pub parallel: bool,
}

impl ParameterSweep {
    /// Expand the grid over `base`.
    ///
    /// Points are ordered with vehicle count varying slowest, then
    /// capacity, combined capacity and time limit.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRange`] for an empty or unstepped range,
    /// [`ConfigError::ValueTooLarge`] when a value does not fit its field
    /// and [`ConfigError::SweepVehicleMissing`] when `base` has no profile
    /// for the swept vehicle.
    pub fn expand(&self, base: &RunParameters) -> Result<Vec<RunParameters>, ConfigError> {
        let profile = base
            .profiles
            .iter()
            .find(|p| p.kind == self.vehicle)
            .ok_or(ConfigError::SweepVehicleMissing {
                kind: self.vehicle,
            })?;
        let counts = axis(self.vehicle_count, profile.count as u64, "vehicle_count")?;
        let capacities = axis(self.capacity, u64::from(profile.capacity), "capacity")?;
        let combined = match self.combined_capacity {
            Some(range) => range.values("combined_capacity")?.into_iter().map(Some).collect(),
            None => vec![None],
        };
        let limits = axis(
            self.time_limit_secs,
            base.time_limit.as_secs(),
            "time_limit_secs",
        )?;

        let mut points = Vec::new();
        for &count in &counts {
            for &capacity in &capacities {
                for &combined_capacity in &combined {
                    for &limit in &limits {
                        points.push(self.point(
                            base,
                            count,
                            capacity,
                            combined_capacity,
                            limit,
                        )?);
                    }
                }
            }
        }
        Ok(points)
    }

    fn point(
        &self,
        base: &RunParameters,
        count: u64,
        capacity: u64,
        combined_capacity: Option<u64>,
        limit: u64,
    ) -> Result<RunParameters, ConfigError> {
        let count = usize::try_from(count).map_err(|_| ConfigError::ValueTooLarge {
            name: "vehicle_count",
            value: count,
        })?;
        let capacity = narrow(capacity, "capacity")?;
        let combined_capacity = combined_capacity
            .map(|value| narrow(value, "combined_capacity"))
            .transpose()?;
        let mut label = format!("{} count={count} capacity={capacity}", self.vehicle);
        if let Some(combined) = combined_capacity {
            label.push_str(&format!(" combined={combined}"));
        }
        label.push_str(&format!(" time_limit={limit}s"));

        let profiles = base
            .profiles
            .iter()
            .map(|p| {
                if p.kind != self.vehicle {
                    return p.clone();
                }
                let mut varied = p.clone();
                varied.count = count;
                varied.capacity = capacity;
                if combined_capacity.is_some() {
                    varied.combined_capacity = combined_capacity;
                }
                varied
            })
            .collect();
        Ok(RunParameters {
            label,
            profiles,
            time_limit: Duration::from_secs(limit),
            seed: base.seed,
        })
    }
}

fn axis(range: Option<Range>, fallback: u64, name: &'static str) -> Result<Vec<u64>, ConfigError> {
    match range {
        Some(range) => range.values(name),
        None => Ok(vec![fallback]),
    }
}

fn narrow(value: u64, name: &'static str) -> Result<u32, ConfigError> {
    u32::try_from(value).map_err(|_| ConfigError::ValueTooLarge { name, value })
}

/// Everything a planning run needs.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunConfig {
    /// JSON site table.
    pub locations_path: PathBuf,
    /// Directory receiving the report and route summaries.
    #[cfg_attr(feature = "serde", serde(default))]
    pub output_dir: Option<PathBuf>,
    /// Depot added when the site table has none.
    #[cfg_attr(feature = "serde", serde(default))]
    pub depot: Option<DepotSettings>,
    /// One profile per vehicle type.
    pub vehicles: Vec<VehicleProfile>,
    /// Solver settings.
    #[cfg_attr(feature = "serde", serde(default))]
    pub solver: SolverSettings,
    /// Truck-to-bike conversion.
    #[cfg_attr(feature = "serde", serde(default = "BikeConversion::disabled"))]
    pub bike_conversion: BikeConversion,
    /// Load model for combined loops.
    #[cfg_attr(feature = "serde", serde(default))]
    pub combine: CombineMode,
    /// Leg component to minimise.
    #[cfg_attr(feature = "serde", serde(default))]
    pub objective: Objective,
    /// Optional sensitivity sweep.
    #[cfg_attr(feature = "serde", serde(default))]
    pub sweep: Option<ParameterSweep>,
}

/// Rejected configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No vehicle profiles.
    #[error("at least one vehicle profile is required")]
    NoVehicles,
    /// Two profiles share a vehicle type.
    #[error("vehicle type {kind} is configured more than once")]
    DuplicateVehicle {
        /// Repeated type.
        kind: VehicleKind,
    },
    /// A profile has zero capacity.
    #[error("{kind} capacity must be positive")]
    ZeroCapacity {
        /// Offending type.
        kind: VehicleKind,
    },
    /// A profile has no vehicles.
    #[error("{kind} count must be positive")]
    ZeroVehicles {
        /// Offending type.
        kind: VehicleKind,
    },
    /// Combined capacity is below the pickup capacity.
    #[error("{kind} combined capacity {combined} is below pickup capacity {capacity}")]
    CombinedBelowPickup {
        /// Offending type.
        kind: VehicleKind,
        /// Pickup capacity.
        capacity: u32,
        /// Combined capacity.
        combined: u32,
    },
    /// The solver budget is zero.
    #[error("solver time limit must be positive")]
    ZeroTimeLimit,
    /// The conversion threshold is negative or not finite.
    #[error("bike conversion distance threshold must be finite and non-negative")]
    InvalidThreshold,
    /// A sweep range is empty or unstepped.
    #[error("invalid {name} range {min}..={max} step {step}")]
    InvalidRange {
        /// Swept field.
        name: &'static str,
        /// Lower bound.
        min: u64,
        /// Upper bound.
        max: u64,
        /// Step.
        step: u64,
    },
    /// A swept value does not fit its field.
    #[error("{name} value {value} is too large")]
    ValueTooLarge {
        /// Swept field.
        name: &'static str,
        /// Offending value.
        value: u64,
    },
    /// The sweep varies a vehicle type without a profile.
    #[error("sweep varies {kind} but no {kind} profile is configured")]
    SweepVehicleMissing {
        /// Swept type.
        kind: VehicleKind,
    },
}

impl RunConfig {
    /// Check the configuration before any run starts.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_profiles(&self.vehicles)?;
        if self.solver.time_limit_secs == 0 {
            return Err(ConfigError::ZeroTimeLimit);
        }
        let threshold = self.bike_conversion.distance_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold);
        }
        if let Some(sweep) = &self.sweep {
            for point in sweep.expand(&self.run_parameters())? {
                if point.time_limit.is_zero() {
                    return Err(ConfigError::ZeroTimeLimit);
                }
                validate_profiles(&point.profiles)?;
            }
        }
        Ok(())
    }

    /// Parameters for a single run with the configured profiles.
    #[must_use]
    pub fn run_parameters(&self) -> RunParameters {
        RunParameters {
            label: "base".to_owned(),
            profiles: self.vehicles.clone(),
            time_limit: Duration::from_secs(self.solver.time_limit_secs),
            seed: self.solver.seed,
        }
    }
}

/// Reject empty, duplicated or unusable vehicle profiles.
pub(crate) fn validate_profiles(profiles: &[VehicleProfile]) -> Result<(), ConfigError> {
    if profiles.is_empty() {
        return Err(ConfigError::NoVehicles);
    }
    let mut kinds = HashSet::new();
    for profile in profiles {
        validate_profile(profile)?;
        if !kinds.insert(profile.kind) {
            return Err(ConfigError::DuplicateVehicle { kind: profile.kind });
        }
    }
    Ok(())
}

fn validate_profile(profile: &VehicleProfile) -> Result<(), ConfigError> {
    if profile.capacity == 0 {
        return Err(ConfigError::ZeroCapacity { kind: profile.kind });
    }
    if profile.count == 0 {
        return Err(ConfigError::ZeroVehicles { kind: profile.kind });
    }
    let combined = profile.combined_capacity();
    if combined < profile.capacity {
        return Err(ConfigError::CombinedBelowPickup {
            kind: profile.kind,
            capacity: profile.capacity,
            combined,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn config() -> RunConfig {
        RunConfig {
            locations_path: PathBuf::from("sites.json"),
            output_dir: None,
            depot: None,
            vehicles: vec![
                VehicleProfile::new(VehicleKind::Truck, 10, 2).with_combined_capacity(12),
                VehicleProfile::new(VehicleKind::Bike, 4, 5),
            ],
            solver: SolverSettings::default(),
            bike_conversion: BikeConversion::disabled(),
            combine: CombineMode::Additive,
            objective: Objective::Distance,
            sweep: None,
        }
    }

    #[rstest]
    fn valid_config_passes(config: RunConfig) {
        assert_eq!(config.validate(), Ok(()));
    }

    #[rstest]
    fn duplicate_kinds_are_rejected(mut config: RunConfig) {
        config
            .vehicles
            .push(VehicleProfile::new(VehicleKind::Truck, 8, 1));
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateVehicle {
                kind: VehicleKind::Truck
            })
        );
    }

    #[rstest]
    fn combined_capacity_may_not_shrink(mut config: RunConfig) {
        if let Some(truck) = config.vehicles.first_mut() {
            truck.combined_capacity = Some(6);
        }
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CombinedBelowPickup { .. })
        ));
    }

    #[rstest]
    fn zero_time_limit_is_rejected(mut config: RunConfig) {
        config.solver.time_limit_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeLimit));
    }

    #[rstest]
    #[case(Range::new(3, 1, 1))]
    #[case(Range::new(1, 3, 0))]
    fn bad_ranges_are_rejected(#[case] range: Range) {
        assert!(matches!(
            range.values("count"),
            Err(ConfigError::InvalidRange { .. })
        ));
    }

    #[rstest]
    fn sweep_expands_cartesian_product(config: RunConfig) {
        let sweep = ParameterSweep {
            vehicle: VehicleKind::Truck,
            vehicle_count: Some(Range::new(1, 3, 1)),
            capacity: Some(Range::new(8, 10, 2)),
            combined_capacity: None,
            time_limit_secs: None,
            parallel: false,
        };
        let points = sweep.expand(&config.run_parameters()).expect("valid sweep");
        assert_eq!(points.len(), 6);
        let first = points.first().expect("six points");
        let truck = first.profiles.first().expect("truck profile");
        assert_eq!((truck.count, truck.capacity), (1, 8));
        assert_eq!(truck.combined_capacity(), 12);
        let bike = first.profiles.get(1).expect("bike profile");
        assert_eq!((bike.count, bike.capacity), (5, 4));
        assert_eq!(first.label, "truck count=1 capacity=8 time_limit=30s");
    }

    #[rstest]
    fn sweep_requires_matching_profile(mut config: RunConfig) {
        config.vehicles.truncate(1);
        config.sweep = Some(ParameterSweep {
            vehicle: VehicleKind::Bike,
            vehicle_count: Some(Range::single(2)),
            capacity: None,
            combined_capacity: None,
            time_limit_secs: None,
            parallel: true,
        });
        assert_eq!(
            config.validate(),
            Err(ConfigError::SweepVehicleMissing {
                kind: VehicleKind::Bike
            })
        );
    }

    #[cfg(feature = "serde")]
    #[rstest]
    fn json_config_fills_defaults() {
        let json = r#"{
            "locations_path": "sites.json",
            "vehicles": [{"kind": "truck", "capacity": 10, "count": 2}]
        }"#;
        let config: RunConfig = serde_json::from_str(json).expect("valid config");
        assert_eq!(config.solver.time_limit_secs, DEFAULT_TIME_LIMIT_SECS);
        assert_eq!(config.solver.backend, SolverKind::Vrp);
        assert!(!config.bike_conversion.enabled);
        assert_eq!(config.combine, CombineMode::Additive);
        let truck = config.vehicles.first().expect("one profile");
        assert!((truck.cost_per_unit - 1.0).abs() < f64::EPSILON);
        assert_eq!(truck.travel_mode(), crate::TravelMode::Driving);
        assert_eq!(config.validate(), Ok(()));
    }
}
