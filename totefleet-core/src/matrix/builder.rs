//! Validating, memoising front end for a [`CostProvider`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use geo::Coord;
use log::{debug, info};

use super::{CostError, CostProvider, DistanceMatrix, MatrixError};
use crate::{LocationId, SiteRecord, TravelMode};

/// Cache counters reported by [`MatrixBuilder::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Requests served from the cache.
    pub hits: u64,
    /// Requests forwarded to the provider.
    pub misses: u64,
    /// Distinct tables held.
    pub entries: usize,
}

/// Builds validated [`DistanceMatrix`] values and caches them by input.
///
/// The cache key is a BLAKE3 digest of the travel mode and the ordered
/// coordinates, so the same site list in the same order never reaches the
/// provider twice. Location identifiers are not part of the key: a cached
/// table is relabelled for each caller. The cache lock is held across the
/// provider call, which serialises concurrent misses for the same builder.
///
/// # Examples
///
/// ```
/// use geo::Coord;
/// use totefleet_core::{MatrixBuilder, SiteRecord, TravelMode};
/// use totefleet_core::test_support::StubCostProvider;
///
/// let builder = MatrixBuilder::new(StubCostProvider::planar());
/// let sites = vec![
///     SiteRecord::new(1, Coord { x: 0.0, y: 0.0 }).depot(),
///     SiteRecord::new(2, Coord { x: 3.0, y: 4.0 }),
/// ];
/// let first = builder.build(&sites, TravelMode::Driving)?;
/// let second = builder.build(&sites, TravelMode::Driving)?;
/// assert_eq!(first, second);
/// assert_eq!(builder.stats().hits, 1);
/// assert_eq!(builder.provider().calls(), 1);
/// # Ok::<(), totefleet_core::MatrixError>(())
/// ```
#[derive(Debug)]
pub struct MatrixBuilder<P> {
    provider: P,
    cache: Mutex<HashMap<blake3::Hash, DistanceMatrix>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<P: CostProvider> MatrixBuilder<P> {
    /// Wrap `provider` with an empty cache.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            cache: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Borrow the wrapped provider.
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Build the matrix for `sites` in their given order.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::Provider`] when the provider fails and the
    /// validation errors of [`DistanceMatrix::new`] when its output is not a
    /// well-formed table.
    pub fn build(
        &self,
        sites: &[SiteRecord],
        mode: TravelMode,
    ) -> Result<DistanceMatrix, MatrixError> {
        let ids: Vec<LocationId> = sites.iter().map(|site| site.id).collect();
        let coordinates: Vec<Coord<f64>> = sites.iter().map(|site| site.location).collect();
        self.build_for(ids, &coordinates, mode)
    }

    /// Build the matrix for parallel `ids` and `coordinates`.
    ///
    /// # Errors
    ///
    /// See [`MatrixBuilder::build`]. A length mismatch between `ids` and
    /// `coordinates` yields [`MatrixError::RowCount`].
    pub fn build_for(
        &self,
        ids: Vec<LocationId>,
        coordinates: &[Coord<f64>],
        mode: TravelMode,
    ) -> Result<DistanceMatrix, MatrixError> {
        if coordinates.is_empty() {
            return Err(CostError::EmptyInput.into());
        }
        if ids.len() != coordinates.len() {
            return Err(MatrixError::RowCount {
                expected: coordinates.len(),
                found: ids.len(),
            });
        }
        let key = fingerprint(coordinates, mode);
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("matrix cache hit for {} {mode} locations", coordinates.len());
            return cached.relabel(ids);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        info!(
            "resolving {mode} costs for {} locations",
            coordinates.len()
        );
        let rows = self.provider.resolve_costs(coordinates, mode)?;
        let matrix = DistanceMatrix::new(ids, rows)?;
        cache.insert(key, matrix.clone());
        Ok(matrix)
    }

    /// Current cache counters.
    pub fn stats(&self) -> CacheStats {
        let entries = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries,
        }
    }

    /// Drop all cached tables.
    pub fn clear(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

fn fingerprint(coordinates: &[Coord<f64>], mode: TravelMode) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(mode.as_str().as_bytes());
    for coord in coordinates {
        // Debug formatting round-trips f64 exactly.
        hasher.update(format!(";{:?},{:?}", coord.x, coord.y).as_bytes());
    }
    hasher.finalize()
}
