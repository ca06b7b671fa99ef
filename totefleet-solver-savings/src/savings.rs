//! Clarke-Wright savings construction.
//!
//! Every customer starts on its own tour. Pairs are considered in order of
//! decreasing saving `c(i, depot) + c(depot, j) - c(i, j)`; the tour ending
//! at `i` is joined to the tour starting at `j` when the result still fits.

use totefleet_core::RoutingProblem;

use crate::tour;

#[derive(Debug, Clone, Copy)]
struct Saving {
    value: f64,
    from: usize,
    to: usize,
}

#[expect(clippy::float_arithmetic, reason = "savings combine matrix costs")]
fn saving(problem: &RoutingProblem<'_>, from: usize, to: usize) -> f64 {
    problem.cost(from, problem.depot) + problem.cost(problem.depot, to) - problem.cost(from, to)
}

fn ranked_savings(problem: &RoutingProblem<'_>, customers: &[usize]) -> Vec<Saving> {
    let mut savings: Vec<Saving> = customers
        .iter()
        .flat_map(|&from| {
            customers
                .iter()
                .filter(move |&&to| to != from)
                .map(move |&to| Saving {
                    value: saving(problem, from, to),
                    from,
                    to,
                })
        })
        .filter(|candidate| candidate.value.is_finite() && candidate.value > 0.0)
        .collect();
    savings.sort_by(|lhs, rhs| {
        rhs.value
            .total_cmp(&lhs.value)
            .then_with(|| (lhs.from, lhs.to).cmp(&(rhs.from, rhs.to)))
    });
    savings
}

/// Build capacity-feasible tours by merging on savings.
pub(crate) fn construct(problem: &RoutingProblem<'_>) -> Vec<Vec<usize>> {
    let customers: Vec<usize> = problem.customers().collect();
    let mut slot_of: Vec<Option<usize>> = vec![None; problem.matrix.len()];
    let mut tours: Vec<Option<Vec<usize>>> = Vec::with_capacity(customers.len());
    for (slot, &row) in customers.iter().enumerate() {
        if let Some(entry) = slot_of.get_mut(row) {
            *entry = Some(slot);
        }
        tours.push(Some(vec![row]));
    }

    for Saving { from, to, .. } in ranked_savings(problem, &customers) {
        let (Some(left), Some(right)) = (
            slot_of.get(from).copied().flatten(),
            slot_of.get(to).copied().flatten(),
        ) else {
            continue;
        };
        if left == right {
            continue;
        }
        let (Some(head), Some(tail)) = (
            tours.get(left).and_then(Option::as_ref),
            tours.get(right).and_then(Option::as_ref),
        ) else {
            continue;
        };
        if head.last() != Some(&from) || tail.first() != Some(&to) {
            continue;
        }
        let head_len = head.len();
        let merged: Vec<usize> = head.iter().chain(tail).copied().collect();
        if !tour::fits(problem, &merged) {
            continue;
        }
        for &row in merged.iter().skip(head_len) {
            if let Some(entry) = slot_of.get_mut(row) {
                *entry = Some(left);
            }
        }
        if let Some(entry) = tours.get_mut(right) {
            *entry = None;
        }
        if let Some(entry) = tours.get_mut(left) {
            *entry = Some(merged);
        }
    }

    tours.into_iter().flatten().collect()
}
