//! Cost-provider trait and the per-pair leg record it returns.

use geo::Coord;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::error::CostError;
use crate::TravelMode;

/// Travel cost of a single directed hop.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Leg {
    /// Network distance in metres.
    pub distance: f64,
    /// Travel time in seconds.
    pub duration: f64,
}

impl Leg {
    /// Construct a leg.
    #[must_use]
    pub const fn new(distance: f64, duration: f64) -> Self {
        Self { distance, duration }
    }

    /// A zero-length hop, used on the diagonal.
    pub const ZERO: Self = Self::new(0.0, 0.0);
}

/// Fetch pairwise travel costs for a set of coordinates.
///
/// Implementers must return a square `n×n` table where
/// `n == coordinates.len()`. `table[i][j]` is the cost of travelling from
/// `coordinates[i]` to `coordinates[j]`. The table need not be symmetric.
///
/// # Examples
///
/// ```rust
/// use geo::Coord;
/// use totefleet_core::{CostError, CostProvider, Leg, TravelMode};
///
/// struct UnitProvider;
///
/// impl CostProvider for UnitProvider {
///     fn resolve_costs(
///         &self,
///         coordinates: &[Coord<f64>],
///         _mode: TravelMode,
///     ) -> Result<Vec<Vec<Leg>>, CostError> {
///         if coordinates.is_empty() {
///             return Err(CostError::EmptyInput);
///         }
///         let n = coordinates.len();
///         Ok((0..n)
///             .map(|i| {
///                 (0..n)
///                     .map(|j| if i == j { Leg::ZERO } else { Leg::new(1.0, 1.0) })
///                     .collect()
///             })
///             .collect())
///     }
/// }
///
/// let table = UnitProvider.resolve_costs(&[Coord { x: 0.0, y: 0.0 }], TravelMode::Driving)?;
/// assert_eq!(table.len(), 1);
/// # Ok::<(), CostError>(())
/// ```
pub trait CostProvider: Send + Sync {
    /// Short identifier recorded with each run.
    fn name(&self) -> &'static str {
        "custom"
    }

    /// Return the cost table for `coordinates` under `mode`.
    ///
    /// Implementations must return `Err(CostError::EmptyInput)` when
    /// `coordinates` is empty.
    fn resolve_costs(
        &self,
        coordinates: &[Coord<f64>],
        mode: TravelMode,
    ) -> Result<Vec<Vec<Leg>>, CostError>;
}

impl<P: CostProvider + ?Sized> CostProvider for &P {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resolve_costs(
        &self,
        coordinates: &[Coord<f64>],
        mode: TravelMode,
    ) -> Result<Vec<Vec<Leg>>, CostError> {
        (**self).resolve_costs(coordinates, mode)
    }
}

impl<P: CostProvider + ?Sized> CostProvider for Box<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resolve_costs(
        &self,
        coordinates: &[Coord<f64>],
        mode: TravelMode,
    ) -> Result<Vec<Vec<Leg>>, CostError> {
        (**self).resolve_costs(coordinates, mode)
    }
}
