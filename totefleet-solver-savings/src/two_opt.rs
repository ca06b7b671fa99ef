//! Intra-tour 2-opt improvement under a deadline.

use std::time::Instant;

use totefleet_core::RoutingProblem;

use crate::tour;

/// Relative gain a reversal must achieve to count as an improvement.
const MIN_GAIN: f64 = 1e-9;

#[expect(clippy::float_arithmetic, reason = "gain threshold compares costs")]
fn improves(candidate: f64, incumbent: f64) -> bool {
    candidate < incumbent - MIN_GAIN * incumbent.abs().max(1.0)
}

/// Reverse segments of `rows` while that lowers the tour cost.
///
/// Only reversals that keep the tour within capacity are accepted. Stops at
/// a local optimum or once `deadline` passes and returns the number of
/// accepted moves.
pub(crate) fn improve(
    problem: &RoutingProblem<'_>,
    rows: &mut Vec<usize>,
    deadline: Option<Instant>,
) -> usize {
    let expired = || deadline.is_some_and(|limit| Instant::now() >= limit);
    let mut best = tour::cost(problem, rows);
    let mut moves = 0;
    let mut improved = true;
    'search: while improved {
        improved = false;
        for start in 0..rows.len() {
            for end in start + 1..rows.len() {
                if expired() {
                    break 'search;
                }
                let mut candidate = rows.clone();
                if let Some(segment) = candidate.get_mut(start..=end) {
                    segment.reverse();
                }
                if !tour::fits(problem, &candidate) {
                    continue;
                }
                let cost = tour::cost(problem, &candidate);
                if improves(cost, best) {
                    *rows = candidate;
                    best = cost;
                    moves += 1;
                    improved = true;
                }
            }
        }
    }
    moves
}
