//! Split a square table into blocks that respect the per-request limit.

use geo::Coord;
use totefleet_core::{CostError, Leg, TravelMode};

use super::osrm::{TableRequest, TableResponse};

/// One block of the full table: rows `sources` by columns `destinations`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Tile {
    /// Global row indices.
    pub sources: Vec<usize>,
    /// Global column indices.
    pub destinations: Vec<usize>,
    /// Global index of each coordinate sent in the request.
    pub coordinates: Vec<usize>,
    pub request: TableRequest,
}

impl Tile {
    fn new(
        sources: Vec<usize>,
        destinations: Vec<usize>,
        all: &[Coord<f64>],
        mode: TravelMode,
        whole: bool,
    ) -> Self {
        let diagonal = sources == destinations;
        let coordinates: Vec<usize> = if diagonal {
            sources.clone()
        } else {
            sources.iter().chain(&destinations).copied().collect()
        };
        let points = coordinates.iter().map(|&index| all[index]).collect();
        let request = if whole {
            TableRequest::square(mode, points)
        } else {
            let local_sources: Vec<usize> = (0..sources.len()).collect();
            let local_destinations: Vec<usize> = if diagonal {
                local_sources.clone()
            } else {
                (sources.len()..sources.len() + destinations.len()).collect()
            };
            TableRequest {
                mode,
                coordinates: points,
                sources: local_sources,
                destinations: local_destinations,
            }
        };
        Self {
            sources,
            destinations,
            coordinates,
            request,
        }
    }

    /// Copy a successful response into `table`.
    ///
    /// # Errors
    ///
    /// `NoSegment` and unroutable pairs become [`CostError::GeocodeFailure`]
    /// naming the global coordinate. Other service codes and unusable
    /// payloads become [`CostError::Malformed`] or [`CostError::Transport`].
    pub fn place(&self, response: TableResponse, table: &mut [Vec<Leg>]) -> Result<(), CostError> {
        if !response.is_ok() {
            return Err(self.service_error(&response));
        }
        let (Some(durations), Some(distances)) = (response.durations, response.distances) else {
            return Err(CostError::Malformed {
                message: "response lacks durations or distances".into(),
            });
        };
        if durations.len() != self.sources.len() || distances.len() != self.sources.len() {
            return Err(CostError::Malformed {
                message: format!(
                    "expected {} rows, received {} durations and {} distances",
                    self.sources.len(),
                    durations.len(),
                    distances.len()
                ),
            });
        }
        for ((&row, duration_row), distance_row) in self.sources.iter().zip(durations).zip(distances) {
            if duration_row.len() != self.destinations.len()
                || distance_row.len() != self.destinations.len()
            {
                return Err(CostError::Malformed {
                    message: format!("row for coordinate {row} has the wrong width"),
                });
            }
            for ((&column, duration), distance) in
                self.destinations.iter().zip(duration_row).zip(distance_row)
            {
                table[row][column] = if row == column {
                    Leg::ZERO
                } else {
                    leg(row, column, duration, distance)?
                };
            }
        }
        Ok(())
    }

    fn service_error(&self, response: &TableResponse) -> CostError {
        let message = response.message.clone().unwrap_or_default();
        if let Some(local) = response.failed_coordinate() {
            let index = self.coordinates.get(local).copied().unwrap_or(local);
            return CostError::GeocodeFailure { index, message };
        }
        if response.code == super::osrm::NO_SEGMENT {
            let index = self.coordinates.first().copied().unwrap_or_default();
            return CostError::GeocodeFailure { index, message };
        }
        CostError::Transport {
            message: format!("{}: {message}", response.code),
            transient: false,
        }
    }
}

fn leg(row: usize, column: usize, duration: Option<f64>, distance: Option<f64>) -> Result<Leg, CostError> {
    let (Some(duration), Some(distance)) = (duration, distance) else {
        return Err(CostError::GeocodeFailure {
            index: column,
            message: format!("no route from coordinate {row} to coordinate {column}"),
        });
    };
    if !(duration.is_finite() && distance.is_finite()) || duration < 0.0 || distance < 0.0 {
        return Err(CostError::Malformed {
            message: format!(
                "invalid cost {distance} m / {duration} s from coordinate {row} to {column}"
            ),
        });
    }
    Ok(Leg::new(distance, duration))
}

/// Cover the `n x n` table for `coordinates` with requests of at most
/// `max_coordinates` coordinates each.
///
/// A table that fits is fetched whole. Otherwise indices are chunked into
/// blocks of half the limit and every source block is paired with every
/// destination block.
pub(crate) fn plan(coordinates: &[Coord<f64>], mode: TravelMode, max_coordinates: usize) -> Vec<Tile> {
    let n = coordinates.len();
    if n <= max_coordinates {
        let all: Vec<usize> = (0..n).collect();
        return vec![Tile::new(all.clone(), all, coordinates, mode, true)];
    }
    let chunk = (max_coordinates / 2).max(1);
    let blocks: Vec<Vec<usize>> = (0..n)
        .collect::<Vec<_>>()
        .chunks(chunk)
        .map(<[usize]>::to_vec)
        .collect();
    blocks
        .iter()
        .flat_map(|sources| {
            blocks.iter().map(move |destinations| {
                Tile::new(sources.clone(), destinations.clone(), coordinates, mode, false)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    fn coords(n: usize) -> Vec<Coord<f64>> {
        (0..n)
            .map(|i| Coord {
                x: i as f64,
                y: 0.0,
            })
            .collect()
    }

    #[rstest]
    fn small_tables_are_fetched_whole() {
        let tiles = plan(&coords(4), TravelMode::Driving, 10);
        assert_eq!(tiles.len(), 1);
        let tile = &tiles[0];
        assert!(tile.request.sources.is_empty());
        assert_eq!(tile.request.coordinates.len(), 4);
    }

    #[rstest]
    #[case(5, 4)]
    #[case(11, 4)]
    #[case(7, 3)]
    fn tiles_cover_every_cell_once(#[case] n: usize, #[case] max: usize) {
        let tiles = plan(&coords(n), TravelMode::Driving, max);
        let mut cells = HashSet::new();
        for tile in &tiles {
            assert!(tile.request.coordinates.len() <= max);
            for &row in &tile.sources {
                for &column in &tile.destinations {
                    assert!(cells.insert((row, column)), "cell ({row}, {column}) repeated");
                }
            }
        }
        assert_eq!(cells.len(), n * n);
    }

    #[rstest]
    fn off_diagonal_blocks_index_destinations_after_sources() {
        let tiles = plan(&coords(4), TravelMode::Walking, 2);
        let tile = tiles
            .iter()
            .find(|t| t.sources == vec![0] && t.destinations == vec![3])
            .expect("block (0, 3)");
        assert_eq!(tile.coordinates, vec![0, 3]);
        assert_eq!(tile.request.sources, vec![0]);
        assert_eq!(tile.request.destinations, vec![1]);
    }

    #[rstest]
    fn no_segment_maps_to_global_index() {
        let tiles = plan(&coords(4), TravelMode::Walking, 2);
        let tile = tiles
            .iter()
            .find(|t| t.sources == vec![1] && t.destinations == vec![2])
            .expect("block (1, 2)");
        let response = TableResponse {
            code: "NoSegment".into(),
            message: Some("Could not find a matching segment for coordinate 1".into()),
            durations: None,
            distances: None,
        };
        let mut table = vec![vec![Leg::ZERO; 4]; 4];
        let err = tile.place(response, &mut table).expect_err("no segment");
        assert!(matches!(err, CostError::GeocodeFailure { index: 2, .. }));
    }

    #[rstest]
    fn null_cells_are_geocode_failures() {
        let tiles = plan(&coords(2), TravelMode::Driving, 10);
        let response = TableResponse {
            code: "Ok".into(),
            message: None,
            durations: Some(vec![vec![Some(0.0), None], vec![Some(5.0), Some(0.0)]]),
            distances: Some(vec![vec![Some(0.0), None], vec![Some(50.0), Some(0.0)]]),
        };
        let mut table = vec![vec![Leg::ZERO; 2]; 2];
        let err = tiles[0].place(response, &mut table).expect_err("unroutable");
        assert!(matches!(err, CostError::GeocodeFailure { index: 1, .. }));
    }

    #[rstest]
    fn negative_costs_are_malformed() {
        let tiles = plan(&coords(2), TravelMode::Driving, 10);
        let response = TableResponse {
            code: "Ok".into(),
            message: None,
            durations: Some(vec![vec![Some(0.0), Some(-1.0)], vec![Some(5.0), Some(0.0)]]),
            distances: Some(vec![vec![Some(0.0), Some(10.0)], vec![Some(50.0), Some(0.0)]]),
        };
        let mut table = vec![vec![Leg::ZERO; 2]; 2];
        let err = tiles[0].place(response, &mut table).expect_err("negative");
        assert!(matches!(err, CostError::Malformed { .. }));
    }

    #[rstest]
    fn diagonal_is_forced_to_zero() {
        let tiles = plan(&coords(2), TravelMode::Driving, 10);
        let response = TableResponse {
            code: "Ok".into(),
            message: None,
            durations: Some(vec![vec![Some(0.4), Some(6.0)], vec![Some(5.0), Some(0.2)]]),
            distances: Some(vec![vec![Some(3.0), Some(60.0)], vec![Some(50.0), Some(1.0)]]),
        };
        let mut table = vec![vec![Leg::ZERO; 2]; 2];
        tiles[0].place(response, &mut table).expect("valid table");
        assert_eq!(table[0][0], Leg::ZERO);
        assert_eq!(table[1][1], Leg::ZERO);
        assert_eq!(table[0][1], Leg::new(60.0, 6.0));
        assert_eq!(table[1][0], Leg::new(50.0, 5.0));
    }
}
