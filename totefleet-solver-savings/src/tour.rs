//! Cost and load helpers shared by the construction and improvement steps.

use totefleet_core::{RoutingProblem, StopLoad, first_overload};

/// Whether visiting `rows` in order keeps every leg within capacity.
pub(crate) fn fits(problem: &RoutingProblem<'_>, rows: &[usize]) -> bool {
    let loads: Vec<StopLoad> = rows.iter().map(|&row| problem.load(row)).collect();
    first_overload(&loads, problem.capacity).is_none()
}

/// Objective cost of the closed tour depot, `rows`, depot.
#[expect(clippy::float_arithmetic, reason = "tour cost sums matrix entries")]
pub(crate) fn cost(problem: &RoutingProblem<'_>, rows: &[usize]) -> f64 {
    let mut total = 0.0;
    let mut previous = problem.depot;
    for &row in rows.iter().chain(std::iter::once(&problem.depot)) {
        total += problem.cost(previous, row);
        previous = row;
    }
    total
}

/// Totes moved along the tour in either direction.
pub(crate) fn load(problem: &RoutingProblem<'_>, rows: &[usize]) -> u64 {
    rows.iter().map(|&row| problem.load(row).total()).sum()
}
