use ordered_float::OrderedFloat;
use tracing::trace;

use crate::repair;
use crate::solution::Solution;

/// Residents of a full archive must keep at least this much pairwise
/// distance for the quality-only replacement rule to apply.
pub const MIN_DISTANCE: f64 = 0.2;

const DIVERSITY_WEIGHT: f64 = 0.3;
const ORDER_DISTANCE_WEIGHT: f64 = 0.4;
const AISLE_DISTANCE_WEIGHT: f64 = 0.6;

fn jaccard_delta(a: &[usize], b: &[usize], b_contains: impl Fn(usize) -> bool, a_contains: impl Fn(usize) -> bool) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 0.0;
    }
    let only_a = a.iter().filter(|&&id| !b_contains(id)).count();
    let only_b = b.iter().filter(|&&id| !a_contains(id)).count();
    #[allow(clippy::cast_precision_loss)]
    {
        (only_a + only_b) as f64 / total as f64
    }
}

/// Jaccard-style distance over the chosen sets, weighting aisle differences
/// heavier than order differences.
pub fn solution_distance(a: &Solution, b: &Solution) -> f64 {
    let orders = jaccard_delta(
        a.orders().as_slice(),
        b.orders().as_slice(),
        |id| b.contains_order(id),
        |id| a.contains_order(id),
    );
    let aisles = jaccard_delta(
        a.aisles().as_slice(),
        b.aisles().as_slice(),
        |id| b.contains_aisle(id),
        |id| a.contains_aisle(id),
    );
    ORDER_DISTANCE_WEIGHT * orders + AISLE_DISTANCE_WEIGHT * aisles
}

/// Bounded archive of high-quality, mutually diverse solutions, kept sorted
/// by cost ascending. Admission balances quality against diversity once the
/// archive is full.
pub struct EliteArchive {
    capacity: usize,
    entries: Vec<Solution>,
}

impl EliteArchive {
    pub fn new(capacity: usize) -> Self {
        EliteArchive {
            capacity: capacity.max(1),
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn solutions(&self) -> &[Solution] {
        &self.entries
    }

    /// Lowest-cost resident.
    pub fn best(&self) -> Option<&Solution> {
        self.entries.first()
    }

    fn quality(sol: &Solution) -> f64 {
        let cost = sol.cost();
        if !cost.is_finite() || cost <= 0.0 {
            return 0.0;
        }
        1.0 / cost
    }

    fn min_distance_to_others(&self, sol: &Solution, skip: Option<usize>) -> f64 {
        self.entries
            .iter()
            .enumerate()
            .filter(|&(i, _)| Some(i) != skip)
            .map(|(_, other)| solution_distance(sol, other))
            .fold(f64::INFINITY, f64::min)
    }

    fn combined_score(&self, sol: &Solution, skip: Option<usize>) -> f64 {
        let diversity = self.min_distance_to_others(sol, skip);
        (1.0 - DIVERSITY_WEIGHT) * Self::quality(sol) + DIVERSITY_WEIGHT * diversity
    }

    /// Offer a candidate. Infeasible solutions and duplicates are rejected;
    /// a full archive replaces its worst resident only when the candidate
    /// wins on the combined quality/diversity score, or strictly improves
    /// quality while staying diverse enough.
    pub fn try_insert(&mut self, cand: &Solution) -> bool {
        if cand.cached_cost().is_none()
            || !repair::is_covered(cand)
            || cand.orders().is_empty()
            || cand.aisles().is_empty()
        {
            return false;
        }
        if self.entries.iter().any(|e| e == cand) {
            return false;
        }

        if !self.is_full() {
            self.insert_sorted(cand.clone());
            return true;
        }

        let worst_idx = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|&(i, e)| OrderedFloat(self.combined_score(e, Some(i))))
            .map(|(i, _)| i)
            .unwrap();

        let cand_score = self.combined_score(cand, None);
        let worst_score = self.combined_score(&self.entries[worst_idx], Some(worst_idx));

        let beats_combined = cand_score > worst_score;
        let improves_quality = Self::quality(cand) > Self::quality(&self.entries[worst_idx])
            && self.min_distance_to_others(cand, Some(worst_idx)) >= MIN_DISTANCE;

        if beats_combined || improves_quality {
            self.entries.remove(worst_idx);
            self.insert_sorted(cand.clone());
            trace!(cost = cand.cost(), "elite archive admitted a candidate");
            return true;
        }
        false
    }

    fn insert_sorted(&mut self, sol: Solution) {
        let at = self
            .entries
            .partition_point(|e| OrderedFloat(e.cost()) <= OrderedFloat(sol.cost()));
        self.entries.insert(at, sol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{CostWeights, Evaluator};
    use crate::instance::Instance;
    use std::sync::Arc;

    fn instance() -> Arc<Instance> {
        Arc::new(
            Instance::parse(
                "4 4 4\n\
                 1 0 1\n1 1 1\n1 2 1\n1 3 1\n\
                 1 0 5\n1 1 5\n1 2 5\n1 3 5\n\
                 0 100\n",
            )
            .unwrap(),
        )
    }

    fn wave(orders: &[usize], aisles: &[usize]) -> Solution {
        let ev = Evaluator::new(CostWeights::default());
        let mut sol = Solution::new(instance(), orders.iter().copied(), aisles.iter().copied());
        sol.set_cost(ev.evaluate(&sol));
        sol
    }

    #[test]
    fn rejects_uncovered_and_duplicate_candidates() {
        let mut archive = EliteArchive::new(3);
        let uncovered = wave(&[0], &[1]);
        assert!(!archive.try_insert(&uncovered));

        let good = wave(&[0], &[0]);
        assert!(archive.try_insert(&good));
        assert!(!archive.try_insert(&good));
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn keeps_entries_sorted_by_cost() {
        let mut archive = EliteArchive::new(3);
        // more aisles = worse surrogate cost
        archive.try_insert(&wave(&[0, 1], &[0, 1]));
        archive.try_insert(&wave(&[0], &[0]));
        let costs: Vec<f64> = archive.solutions().iter().map(Solution::cost).collect();
        assert!(costs.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(archive.best().unwrap().cost(), costs[0]);
    }

    #[test]
    fn capacity_is_a_hard_cap() {
        let mut archive = EliteArchive::new(2);
        archive.try_insert(&wave(&[0], &[0]));
        archive.try_insert(&wave(&[1], &[1]));
        archive.try_insert(&wave(&[2], &[2]));
        archive.try_insert(&wave(&[3], &[3]));
        assert_eq!(archive.len(), 2);
    }

    #[test]
    fn distance_is_zero_for_equal_sets_and_grows_with_difference() {
        let a = wave(&[0, 1], &[0, 1]);
        let b = wave(&[0, 1], &[0, 1]);
        let c = wave(&[2, 3], &[2, 3]);
        assert_eq!(solution_distance(&a, &b), 0.0);
        assert!((solution_distance(&a, &c) - 1.0).abs() <= 1e-9);
    }

    #[test]
    fn full_archive_prefers_diverse_improvements() {
        let mut archive = EliteArchive::new(2);
        archive.try_insert(&wave(&[0, 1], &[0, 1]));
        archive.try_insert(&wave(&[0, 2], &[0, 2]));
        // cheaper and disjoint from both residents
        let strong = wave(&[3], &[3]);
        assert!(archive.try_insert(&strong));
        assert!(archive.solutions().iter().any(|e| e.contains_order(3)));
    }
}
