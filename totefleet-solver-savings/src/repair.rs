//! First-fit-decreasing repair for fleets smaller than the savings result.

use std::cmp::Reverse;

use log::debug;
use totefleet_core::RoutingProblem;

use crate::tour;

/// Cheapest capacity-feasible position for `row` in `rows`.
fn cheapest_insertion(problem: &RoutingProblem<'_>, rows: &[usize], row: usize) -> Option<usize> {
    (0..=rows.len())
        .filter_map(|position| {
            let mut candidate = rows.to_vec();
            candidate.insert(position, row);
            tour::fits(problem, &candidate).then(|| (tour::cost(problem, &candidate), position))
        })
        .min_by(|lhs, rhs| lhs.0.total_cmp(&rhs.0).then_with(|| lhs.1.cmp(&rhs.1)))
        .map(|(_, position)| position)
}

/// Dissolve the lightest tours until at most `vehicle_count` remain.
///
/// Stops of a dissolved tour are placed heaviest first, each into the first
/// tour with room, at its cheapest feasible position. Returns `None` when a
/// stop fits nowhere.
pub(crate) fn repair(
    problem: &RoutingProblem<'_>,
    mut tours: Vec<Vec<usize>>,
) -> Option<Vec<Vec<usize>>> {
    while tours.len() > problem.vehicle_count {
        let lightest = tours
            .iter()
            .enumerate()
            .min_by_key(|(index, rows)| (tour::load(problem, rows), *index))
            .map(|(index, _)| index)?;
        let mut stops = tours.remove(lightest);
        stops.sort_by_key(|&row| (Reverse(problem.load(row).total()), row));
        debug!(
            "folding a {} tour of {} stops into the remaining {}",
            problem.vehicle,
            stops.len(),
            tours.len()
        );
        for row in stops {
            let (rows, position) = tours.iter_mut().find_map(|rows| {
                cheapest_insertion(problem, rows, row).map(|position| (rows, position))
            })?;
            rows.insert(position, row);
        }
    }
    Some(tours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::time::Duration;
    use totefleet_core::test_support::line_matrix;
    use totefleet_core::{DistanceMatrix, Objective, ServiceKind, StopLoad, VehicleKind};

    struct Instance {
        matrix: DistanceMatrix,
        loads: Vec<StopLoad>,
    }

    impl Instance {
        fn problem(&self, capacity: u32, vehicle_count: usize) -> RoutingProblem<'_> {
            RoutingProblem {
                matrix: &self.matrix,
                loads: &self.loads,
                depot: 0,
                vehicle: VehicleKind::Truck,
                service: ServiceKind::Pickup,
                capacity,
                vehicle_count,
                cost_per_unit: 1.0,
                objective: Objective::Distance,
                time_limit: Duration::from_secs(1),
                seed: 0,
            }
        }
    }

    #[fixture]
    fn four_stops() -> Instance {
        Instance {
            matrix: line_matrix(5),
            loads: vec![
                StopLoad::default(),
                StopLoad::pickup(4),
                StopLoad::pickup(1),
                StopLoad::pickup(4),
                StopLoad::pickup(1),
            ],
        }
    }

    #[rstest]
    fn folds_surplus_tours(four_stops: Instance) {
        let tours = vec![vec![1], vec![2, 4], vec![3]];

        let repaired = repair(&four_stops.problem(5, 2), tours).expect("room for both stops");

        assert_eq!(repaired.len(), 2);
        assert!(repaired.iter().all(|rows| tour::load(&four_stops.problem(5, 2), rows) <= 5));
    }

    #[rstest]
    fn gives_up_when_no_tour_has_room(four_stops: Instance) {
        let tours = vec![vec![1], vec![3], vec![2, 4]];

        assert!(repair(&four_stops.problem(5, 1), tours).is_none());
    }

    #[rstest]
    fn leaves_small_enough_fleets_alone(four_stops: Instance) {
        let tours = vec![vec![1, 2], vec![3, 4]];

        let repaired = repair(&four_stops.problem(5, 2), tours.clone()).expect("unchanged");

        assert_eq!(repaired, tours);
    }
}
