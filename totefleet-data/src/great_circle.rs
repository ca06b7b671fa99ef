//! Offline cost provider using great-circle distances.

use geo::{Coord, Distance, Haversine, Point};
use totefleet_core::{CostError, CostProvider, Leg, TravelMode};

/// Ratio between road and straight-line distance in dense urban grids.
pub const DEFAULT_DETOUR_FACTOR: f64 = 1.3;

/// Estimates costs without a routing service.
///
/// Distance is the haversine distance scaled by a detour factor; duration
/// divides it by a fixed speed for the travel mode. Useful for sizing runs
/// before an OSRM instance is available.
///
/// # Examples
///
/// ```
/// use geo::Coord;
/// use totefleet_core::{CostProvider, TravelMode};
/// use totefleet_data::GreatCircleCostProvider;
///
/// let provider = GreatCircleCostProvider::default();
/// let table = provider.resolve_costs(
///     &[Coord { x: -0.1, y: 51.5 }, Coord { x: -0.1, y: 51.51 }],
///     TravelMode::Walking,
/// )?;
/// assert!(table[0][1].distance > 1_000.0);
/// assert!(table[0][1].duration > table[0][1].distance);
/// # Ok::<(), totefleet_core::CostError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GreatCircleCostProvider {
    detour_factor: f64,
}

impl Default for GreatCircleCostProvider {
    fn default() -> Self {
        Self {
            detour_factor: DEFAULT_DETOUR_FACTOR,
        }
    }
}

impl GreatCircleCostProvider {
    /// Use `detour_factor` instead of [`DEFAULT_DETOUR_FACTOR`].
    ///
    /// Factors below one are raised to one.
    #[must_use]
    pub fn with_detour_factor(detour_factor: f64) -> Self {
        Self {
            detour_factor: detour_factor.max(1.0),
        }
    }

    /// Assumed average speed in metres per second.
    #[must_use]
    pub const fn speed(mode: TravelMode) -> f64 {
        match mode {
            TravelMode::Driving => 8.3,
            TravelMode::Cycling => 4.2,
            TravelMode::Walking => 1.4,
        }
    }

    fn leg(&self, from: Coord<f64>, to: Coord<f64>, mode: TravelMode) -> Leg {
        let distance = Haversine.distance(Point::from(from), Point::from(to)) * self.detour_factor;
        Leg::new(distance, distance / Self::speed(mode))
    }
}

impl CostProvider for GreatCircleCostProvider {
    fn name(&self) -> &'static str {
        "great-circle"
    }

    fn resolve_costs(
        &self,
        coordinates: &[Coord<f64>],
        mode: TravelMode,
    ) -> Result<Vec<Vec<Leg>>, CostError> {
        if coordinates.is_empty() {
            return Err(CostError::EmptyInput);
        }
        if let Some(index) = coordinates
            .iter()
            .position(|c| !(c.x.is_finite() && c.y.is_finite()) || c.y.abs() > 90.0)
        {
            return Err(CostError::GeocodeFailure {
                index,
                message: "coordinate is not a valid longitude/latitude pair".into(),
            });
        }
        Ok(coordinates
            .iter()
            .enumerate()
            .map(|(i, &from)| {
                coordinates
                    .iter()
                    .enumerate()
                    .map(|(j, &to)| if i == j { Leg::ZERO } else { self.leg(from, to, mode) })
                    .collect()
            })
            .collect())
    }
}
