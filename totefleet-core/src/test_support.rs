//! Deterministic providers, backends and fixtures for unit and behaviour
//! tests.

use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicUsize, Ordering};

use geo::Coord;

use crate::{
    CostError, CostProvider, DistanceMatrix, Infeasibility, Leg, LocationId, RoutingProblem,
    SiteRecord, SolveError, SolverBackend, StopLoad, TravelMode, first_overload,
};

#[derive(Debug, Clone)]
enum StubBehaviour {
    Planar,
    Fixed(Vec<Vec<Leg>>),
    Failing(CostError),
}

/// `CostProvider` that answers locally and counts how often it is called.
#[derive(Debug)]
pub struct StubCostProvider {
    behaviour: StubBehaviour,
    calls: AtomicUsize,
}

impl StubCostProvider {
    /// Straight-line distances between coordinates treated as planar metres.
    /// Durations equal distances.
    pub const fn planar() -> Self {
        Self::with(StubBehaviour::Planar)
    }

    /// Always return `rows`, whatever was asked for.
    pub const fn fixed(rows: Vec<Vec<Leg>>) -> Self {
        Self::with(StubBehaviour::Fixed(rows))
    }

    /// Always fail with `error`.
    pub const fn failing(error: CostError) -> Self {
        Self::with(StubBehaviour::Failing(error))
    }

    const fn with(behaviour: StubBehaviour) -> Self {
        Self {
            behaviour,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `resolve_costs` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CostProvider for StubCostProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn resolve_costs(
        &self,
        coordinates: &[Coord<f64>],
        _mode: TravelMode,
    ) -> Result<Vec<Vec<Leg>>, CostError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            StubBehaviour::Failing(error) => Err(error.clone()),
            StubBehaviour::Fixed(rows) => Ok(rows.clone()),
            StubBehaviour::Planar => {
                if coordinates.is_empty() {
                    return Err(CostError::EmptyInput);
                }
                Ok(coordinates
                    .iter()
                    .map(|from| {
                        coordinates
                            .iter()
                            .map(|to| {
                                let distance = (to.x - from.x).hypot(to.y - from.y);
                                Leg::new(distance, distance)
                            })
                            .collect()
                    })
                    .collect())
            }
        }
    }
}

/// Matrix over ids `0..n` where the cost between `i` and `j` is `|i - j|`.
///
/// # Panics
///
/// Never for `n` small enough to allocate.
pub fn line_matrix(n: usize) -> DistanceMatrix {
    let rows = (0..n)
        .map(|i| (0..n).map(|j| i.abs_diff(j) as f64).collect())
        .collect();
    DistanceMatrix::from_distances((0..n as LocationId).collect(), rows)
        .expect("line matrix is always valid")
}

/// Depot with id `0` at the origin followed by one indoor site per entry of
/// `volumes`, placed one unit apart along the x axis.
pub fn sites_on_line(volumes: &[(f64, f64)]) -> Vec<SiteRecord> {
    std::iter::once(SiteRecord::new(0, Coord { x: 0.0, y: 0.0 }).depot())
        .chain(volumes.iter().enumerate().map(|(offset, &(pickup, dropoff))| {
            let id = offset as LocationId + 1;
            SiteRecord::new(id, Coord { x: id as f64, y: 0.0 }).with_volumes(pickup, dropoff)
        }))
        .collect()
}

/// Greedy backend: each vehicle repeatedly visits the nearest remaining
/// location that still fits, ties broken by row.
#[derive(Debug, Default, Clone, Copy)]
pub struct NearestNeighbourBackend;

impl SolverBackend for NearestNeighbourBackend {
    fn name(&self) -> &'static str {
        "nearest-neighbour"
    }

    fn solve_tours(&self, problem: &RoutingProblem<'_>) -> Result<Vec<Vec<usize>>, SolveError> {
        let mut remaining: Vec<usize> = problem.customers().collect();
        let mut tours = Vec::new();
        while !remaining.is_empty() {
            let mut tour: Vec<usize> = Vec::new();
            let mut current = problem.depot;
            loop {
                let best = remaining
                    .iter()
                    .enumerate()
                    .filter(|&(_, &candidate)| fits(problem, &tour, candidate))
                    .min_by(|&(_, &a), &(_, &b)| {
                        problem
                            .cost(current, a)
                            .total_cmp(&problem.cost(current, b))
                            .then(a.cmp(&b))
                    })
                    .map(|(position, &candidate)| (position, candidate));
                let Some((position, candidate)) = best else {
                    break;
                };
                remaining.remove(position);
                tour.push(candidate);
                current = candidate;
            }
            if tour.is_empty() {
                return Err(SolveError::NoFeasibleSolution(
                    Infeasibility::NotFoundInBudget,
                ));
            }
            tours.push(tour);
        }
        Ok(tours)
    }
}

fn fits(problem: &RoutingProblem<'_>, tour: &[usize], candidate: usize) -> bool {
    let loads: Vec<StopLoad> = tour
        .iter()
        .chain(std::iter::once(&candidate))
        .map(|&index| problem.load(index))
        .collect();
    first_overload(&loads, problem.capacity).is_none()
}

/// Backend returning canned tours and recording each problem it sees.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    tours: Vec<Vec<usize>>,
    seen: Mutex<Vec<(usize, u32, usize)>>,
}

impl ScriptedBackend {
    /// Always answer with `tours`.
    pub fn new(tours: Vec<Vec<usize>>) -> Self {
        Self {
            tours,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// `(locations, capacity, vehicle_count)` for each problem received.
    pub fn seen(&self) -> Vec<(usize, u32, usize)> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SolverBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn solve_tours(&self, problem: &RoutingProblem<'_>) -> Result<Vec<Vec<usize>>, SolveError> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((problem.matrix.len(), problem.capacity, problem.vehicle_count));
        Ok(self.tours.clone())
    }
}

/// Backend that always fails with the given error.
#[derive(Debug, Clone)]
pub struct FailingBackend(pub SolveError);

impl SolverBackend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn solve_tours(&self, _problem: &RoutingProblem<'_>) -> Result<Vec<Vec<usize>>, SolveError> {
        Err(self.0.clone())
    }
}
