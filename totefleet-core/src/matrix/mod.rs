//! Pairwise travel-cost matrices between sites.
//!
//! A [`CostProvider`] resolves raw cost tables for a list of coordinates and
//! a [`TravelMode`](crate::TravelMode). [`MatrixBuilder`] wraps a provider,
//! validates what it returns and memoises results so that repeated runs over
//! the same sites do not hit the network twice. Downstream stages read costs
//! through [`DistanceMatrix`], which keeps the location identifier of every
//! row so index alignment can be checked rather than assumed.

mod builder;
mod error;
mod provider;

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use builder::{CacheStats, MatrixBuilder};
pub use error::{CostError, MatrixError};
pub use provider::{CostProvider, Leg};

use crate::LocationId;

/// Diagonal entries within this tolerance are normalised to zero.
const DIAGONAL_TOLERANCE: f64 = 1e-6;

/// Which leg component a solver minimises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Objective {
    /// Minimise metres travelled.
    #[default]
    Distance,
    /// Minimise seconds travelled.
    Duration,
}

impl Objective {
    /// Select this objective's component of `leg`.
    #[must_use]
    pub const fn of(self, leg: Leg) -> f64 {
        match self {
            Self::Distance => leg.distance,
            Self::Duration => leg.duration,
        }
    }
}

/// Square, validated table of travel costs keyed by location identifier.
///
/// Row and column `i` both refer to the location with identifier
/// `ids()[i]`. Entries are finite and non-negative and the diagonal is zero.
///
/// # Examples
///
/// ```
/// use totefleet_core::{DistanceMatrix, Objective};
///
/// let matrix = DistanceMatrix::from_distances(
///     vec![10, 20],
///     vec![vec![0.0, 5.0], vec![7.0, 0.0]],
/// )?;
/// assert_eq!(matrix.position(20), Some(1));
/// assert_eq!(matrix.cost(1, 0, Objective::Distance), Some(7.0));
/// # Ok::<(), totefleet_core::MatrixError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    ids: Vec<LocationId>,
    positions: HashMap<LocationId, usize>,
    legs: Vec<Leg>,
}

impl DistanceMatrix {
    /// Validate `rows` against `ids` and build a matrix.
    ///
    /// # Errors
    ///
    /// Returns a [`MatrixError`] when identifiers repeat, the table is not
    /// `ids.len()` square, or any entry is negative, non-finite or a
    /// non-zero diagonal.
    pub fn new(ids: Vec<LocationId>, rows: Vec<Vec<Leg>>) -> Result<Self, MatrixError> {
        let size = ids.len();
        let positions = index_ids(&ids)?;
        if rows.len() != size {
            return Err(MatrixError::RowCount {
                expected: size,
                found: rows.len(),
            });
        }
        let mut legs = Vec::with_capacity(size * size);
        for (row_index, row) in rows.into_iter().enumerate() {
            if row.len() != size {
                return Err(MatrixError::NotSquare {
                    expected: size,
                    row: row_index,
                    found: row.len(),
                });
            }
            for (col, leg) in row.into_iter().enumerate() {
                legs.push(validate_leg(row_index, col, leg)?);
            }
        }
        Ok(Self {
            ids,
            positions,
            legs,
        })
    }

    /// Build a matrix whose durations equal its distances.
    ///
    /// Convenient for fixtures and precomputed tables that carry a single
    /// cost figure.
    ///
    /// # Errors
    ///
    /// See [`DistanceMatrix::new`].
    pub fn from_distances(
        ids: Vec<LocationId>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, MatrixError> {
        let legs = rows
            .into_iter()
            .map(|row| row.into_iter().map(|value| Leg::new(value, value)).collect())
            .collect();
        Self::new(ids, legs)
    }

    /// Number of locations.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the matrix has no locations.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Location identifiers in row order.
    #[must_use]
    pub fn ids(&self) -> &[LocationId] {
        &self.ids
    }

    /// Identifier of the location at `index`.
    #[must_use]
    pub fn id(&self, index: usize) -> Option<LocationId> {
        self.ids.get(index).copied()
    }

    /// Row index of `id`.
    #[must_use]
    pub fn position(&self, id: LocationId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Leg from row `from` to column `to`.
    #[must_use]
    pub fn leg(&self, from: usize, to: usize) -> Option<Leg> {
        if from >= self.len() || to >= self.len() {
            return None;
        }
        self.legs.get(from * self.len() + to).copied()
    }

    /// Cost from `from` to `to` under `objective`.
    #[must_use]
    pub fn cost(&self, from: usize, to: usize, objective: Objective) -> Option<f64> {
        self.leg(from, to).map(|leg| objective.of(leg))
    }

    /// Copy out the full table for one objective.
    #[must_use]
    pub fn table(&self, objective: Objective) -> Vec<Vec<f64>> {
        self.legs
            .chunks(self.len().max(1))
            .map(|row| row.iter().map(|leg| objective.of(*leg)).collect())
            .collect()
    }

    /// Build the sub-matrix over `indices`, in the given order.
    ///
    /// Row `k` of the result is row `indices[k]` of `self`, so pairwise costs
    /// between retained locations are preserved exactly.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::IndexOutOfRange`] for an index beyond the
    /// matrix and [`MatrixError::DuplicateId`] when an index repeats.
    pub fn project(&self, indices: &[usize]) -> Result<Self, MatrixError> {
        let size = self.len();
        let mut ids = Vec::with_capacity(indices.len());
        for &index in indices {
            let id = self
                .id(index)
                .ok_or(MatrixError::IndexOutOfRange { index, size })?;
            ids.push(id);
        }
        let positions = index_ids(&ids)?;
        let mut legs = Vec::with_capacity(indices.len() * indices.len());
        for &from in indices {
            for &to in indices {
                legs.push(
                    self.leg(from, to)
                        .ok_or(MatrixError::IndexOutOfRange { index: to, size })?,
                );
            }
        }
        Ok(Self {
            ids,
            positions,
            legs,
        })
    }

    /// Return the same costs under a new set of identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::RowCount`] when `ids` has the wrong length and
    /// [`MatrixError::DuplicateId`] when an identifier repeats.
    pub fn relabel(&self, ids: Vec<LocationId>) -> Result<Self, MatrixError> {
        if ids.len() != self.len() {
            return Err(MatrixError::RowCount {
                expected: self.len(),
                found: ids.len(),
            });
        }
        let positions = index_ids(&ids)?;
        Ok(Self {
            ids,
            positions,
            legs: self.legs.clone(),
        })
    }
}

fn index_ids(ids: &[LocationId]) -> Result<HashMap<LocationId, usize>, MatrixError> {
    let mut positions = HashMap::with_capacity(ids.len());
    for (index, &id) in ids.iter().enumerate() {
        if positions.insert(id, index).is_some() {
            return Err(MatrixError::DuplicateId { id });
        }
    }
    Ok(positions)
}

fn validate_leg(row: usize, col: usize, leg: Leg) -> Result<Leg, MatrixError> {
    for value in [leg.distance, leg.duration] {
        if !value.is_finite() || value < 0.0 {
            return Err(MatrixError::InvalidCost { row, col, value });
        }
        if row == col && value > DIAGONAL_TOLERANCE {
            return Err(MatrixError::NonZeroDiagonal { index: row, value });
        }
    }
    if row == col {
        return Ok(Leg::ZERO);
    }
    Ok(leg)
}
