use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::solution::Solution;

/// Weights of the surrogate penalty cost steering the search. The true
/// objective (units over aisles) is only computed for reporting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostWeights {
    /// penalty per chosen order that is not fully covered
    pub p_missing: f64,
    /// cost per visited aisle
    pub c_aisle: f64,
    /// weight of the aisles-per-order ratio term
    pub w_ratio: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        CostWeights {
            p_missing: 1000.0,
            c_aisle: 10.0,
            w_ratio: 50.0,
        }
    }
}

/// Delta evaluator over a [`Solution`]. Holds the cost weights and small
/// per-(op, id) memo tables guarded by the solution's version counters: any
/// mutation bumps a version and the stale cache rows are dropped wholesale.
pub struct Evaluator {
    pub weights: CostWeights,
    add_order: HashMap<usize, f64>,
    remove_order: HashMap<usize, f64>,
    add_aisle: HashMap<usize, f64>,
    remove_aisle: HashMap<usize, f64>,
    stamp: (u64, u64),
}

impl Evaluator {
    pub fn new(weights: CostWeights) -> Self {
        Evaluator {
            weights,
            add_order: HashMap::new(),
            remove_order: HashMap::new(),
            add_aisle: HashMap::new(),
            remove_aisle: HashMap::new(),
            stamp: (u64::MAX, u64::MAX),
        }
    }

    /// Surrogate cost from the solution's maintained counters.
    pub fn evaluate(&self, sol: &Solution) -> f64 {
        self.surrogate(
            sol.orders().len(),
            sol.aisles().len(),
            sol.uncovered_chosen(),
        )
    }

    /// Full recompute: restore the coverage invariant from scratch, then
    /// evaluate and store the result. The antidote to accumulated drift.
    pub fn evaluate_full(&self, sol: &mut Solution) -> f64 {
        sol.update_coverage();
        let cost = self.evaluate(sol);
        sol.set_cost(cost);
        cost
    }

    fn surrogate(&self, n_orders: usize, n_aisles: usize, uncovered: usize) -> f64 {
        if n_orders == 0 {
            return f64::INFINITY;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.weights.p_missing * uncovered as f64
                + self.weights.c_aisle * n_aisles as f64
                + self.weights.w_ratio * (n_aisles as f64 / n_orders.max(1) as f64)
        }
    }

    fn refresh(&mut self, sol: &Solution) {
        let now = (sol.order_version(), sol.aisle_version());
        if self.stamp != now {
            self.add_order.clear();
            self.remove_order.clear();
            self.add_aisle.clear();
            self.remove_aisle.clear();
            self.stamp = now;
        }
    }

    // *********** cached deltas ***********

    pub fn delta_add_order(&mut self, sol: &Solution, o: usize) -> f64 {
        self.refresh(sol);
        if let Some(&d) = self.add_order.get(&o) {
            return d;
        }
        let d = self.compute_delta_add_order(sol, o);
        self.add_order.insert(o, d);
        d
    }

    pub fn delta_remove_order(&mut self, sol: &Solution, o: usize) -> f64 {
        self.refresh(sol);
        if let Some(&d) = self.remove_order.get(&o) {
            return d;
        }
        let d = self.compute_delta_remove_order(sol, o);
        self.remove_order.insert(o, d);
        d
    }

    pub fn delta_add_aisle(&mut self, sol: &Solution, a: usize) -> f64 {
        self.refresh(sol);
        if let Some(&d) = self.add_aisle.get(&a) {
            return d;
        }
        let d = self.compute_delta_add_aisle(sol, a);
        self.add_aisle.insert(a, d);
        d
    }

    pub fn delta_remove_aisle(&mut self, sol: &Solution, a: usize) -> f64 {
        self.refresh(sol);
        if let Some(&d) = self.remove_aisle.get(&a) {
            return d;
        }
        let d = self.compute_delta_remove_aisle(sol, a);
        self.remove_aisle.insert(a, d);
        d
    }

    // *********** uncached / simulated deltas ***********

    /// Change in surrogate cost if order `o` were added. Reads the coverage
    /// counters, which are maintained for unchosen orders too.
    pub fn compute_delta_add_order(&self, sol: &Solution, o: usize) -> f64 {
        if sol.contains_order(o) {
            return 0.0;
        }
        let n_o = sol.orders().len();
        if n_o == 0 {
            // finite cost replaces the empty-wave infinity
            return f64::NEG_INFINITY;
        }
        let n_a = sol.aisles().len();
        #[allow(clippy::cast_precision_loss)]
        let ratio_change =
            self.weights.w_ratio * n_a as f64 * (1.0 / (n_o + 1) as f64 - 1.0 / n_o as f64);
        let penalty = if sol.missing_of(o) > 0 {
            self.weights.p_missing
        } else {
            0.0
        };
        penalty + ratio_change
    }

    pub fn compute_delta_remove_order(&self, sol: &Solution, o: usize) -> f64 {
        if !sol.contains_order(o) {
            return 0.0;
        }
        let n_o = sol.orders().len();
        if n_o == 1 {
            return f64::INFINITY;
        }
        let n_a = sol.aisles().len();
        #[allow(clippy::cast_precision_loss)]
        let ratio_change =
            self.weights.w_ratio * n_a as f64 * (1.0 / (n_o - 1) as f64 - 1.0 / n_o as f64);
        let penalty = if sol.missing_of(o) > 0 {
            -self.weights.p_missing
        } else {
            0.0
        };
        penalty + ratio_change
    }

    /// Change in surrogate cost if aisle `a` were added: the aisle and ratio
    /// terms, minus a missing-penalty for each affected chosen order that
    /// would flip from uncovered to covered.
    pub fn compute_delta_add_aisle(&self, sol: &Solution, a: usize) -> f64 {
        if sol.contains_aisle(a) {
            return 0.0;
        }
        let n_o = sol.orders().len();
        if n_o == 0 {
            return 0.0;
        }
        let flips = sol
            .instance
            .adjacency()
            .aisle_orders[a]
            .iter()
            .filter(|&&o| {
                sol.contains_order(o) && sol.missing_of(o) > 0 && would_cover(sol, o, a)
            })
            .count();
        #[allow(clippy::cast_precision_loss)]
        {
            self.weights.c_aisle + self.weights.w_ratio / n_o as f64
                - self.weights.p_missing * flips as f64
        }
    }

    pub fn compute_delta_remove_aisle(&self, sol: &Solution, a: usize) -> f64 {
        if !sol.contains_aisle(a) {
            return 0.0;
        }
        let n_o = sol.orders().len();
        if n_o == 0 {
            return 0.0;
        }
        let flips = sol
            .instance
            .adjacency()
            .aisle_orders[a]
            .iter()
            .filter(|&&o| {
                sol.contains_order(o) && sol.missing_of(o) == 0 && would_uncover(sol, o, a)
            })
            .count();
        #[allow(clippy::cast_precision_loss)]
        {
            -self.weights.c_aisle - self.weights.w_ratio / n_o as f64
                + self.weights.p_missing * flips as f64
        }
    }

    /// Remove `a_remove` then add `a_add`, evaluated against a simulated
    /// post-removal coverage that never leaks back into the solution. The
    /// aisle-count and ratio terms cancel, so only penalty flips remain on
    /// the add side.
    pub fn delta_swap_aisle(&self, sol: &Solution, a_remove: usize, a_add: usize) -> f64 {
        if a_remove == a_add || !sol.contains_aisle(a_remove) || sol.contains_aisle(a_add) {
            return 0.0;
        }
        let n_o = sol.orders().len();
        if n_o == 0 {
            return 0.0;
        }
        let removal = self.compute_delta_remove_aisle(sol, a_remove);

        let flips = sol
            .instance
            .adjacency()
            .aisle_orders[a_add]
            .iter()
            .filter(|&&o| {
                if !sol.contains_order(o) {
                    return false;
                }
                let sim_missing = missing_without(sol, o, a_remove);
                sim_missing > 0 && covers_simulated(sol, o, a_add, a_remove, sim_missing)
            })
            .count();
        #[allow(clippy::cast_precision_loss)]
        {
            removal + self.weights.c_aisle + self.weights.w_ratio / n_o as f64
                - self.weights.p_missing * flips as f64
        }
    }

    /// Swap is only meaningful when exactly one of the two orders is chosen.
    /// Order count and aisle set are unchanged, so only the missing penalty
    /// moves.
    pub fn delta_swap_orders(&self, sol: &Solution, o1: usize, o2: usize) -> f64 {
        let in1 = sol.contains_order(o1);
        let in2 = sol.contains_order(o2);
        if in1 == in2 {
            return 0.0;
        }
        let (out, inn) = if in1 { (o1, o2) } else { (o2, o1) };
        let mut delta = 0.0;
        if sol.missing_of(out) > 0 {
            delta -= self.weights.p_missing;
        }
        if sol.missing_of(inn) > 0 {
            delta += self.weights.p_missing;
        }
        delta
    }

    // *********** batched read-only evaluation ***********
    //
    // Each delta only reads the solution, so a candidate list can be scanned
    // in parallel. Callers must not mutate the solution during the batch.

    pub fn batch_delta_add_order(&self, sol: &Solution, ids: &[usize]) -> Vec<f64> {
        ids.par_iter()
            .map(|&o| self.compute_delta_add_order(sol, o))
            .collect()
    }

    pub fn batch_delta_remove_order(&self, sol: &Solution, ids: &[usize]) -> Vec<f64> {
        ids.par_iter()
            .map(|&o| self.compute_delta_remove_order(sol, o))
            .collect()
    }

    pub fn batch_delta_add_aisle(&self, sol: &Solution, ids: &[usize]) -> Vec<f64> {
        ids.par_iter()
            .map(|&a| self.compute_delta_add_aisle(sol, a))
            .collect()
    }

    pub fn batch_delta_remove_aisle(&self, sol: &Solution, ids: &[usize]) -> Vec<f64> {
        ids.par_iter()
            .map(|&a| self.compute_delta_remove_aisle(sol, a))
            .collect()
    }
}

/// Would adding `a` flip order `o` from uncovered to covered? True iff every
/// demand slot currently at zero coverage is stocked by `a`.
fn would_cover(sol: &Solution, o: usize, a: usize) -> bool {
    let demand = &sol.instance.orders[o];
    let mut hit = 0u32;
    for (slot, &(item, _)) in demand.iter().enumerate() {
        if sol.coverage_of(o, slot) == 0 && sol.instance.aisle_stocks(a, item) {
            hit += 1;
        }
    }
    hit == sol.missing_of(o)
}

/// Would removing `a` flip order `o` from covered to uncovered? True iff some
/// demand slot is covered by `a` alone.
fn would_uncover(sol: &Solution, o: usize, a: usize) -> bool {
    let demand = &sol.instance.orders[o];
    for (slot, &(item, _)) in demand.iter().enumerate() {
        if sol.coverage_of(o, slot) == 1 && sol.instance.aisle_stocks(a, item) {
            return true;
        }
    }
    false
}

/// Missing count of `o` in the simulated state where chosen aisle `removed`
/// is gone.
fn missing_without(sol: &Solution, o: usize, removed: usize) -> u32 {
    let demand = &sol.instance.orders[o];
    let mut missing = 0u32;
    for (slot, &(item, _)) in demand.iter().enumerate() {
        let mut c = sol.coverage_of(o, slot);
        if c > 0 && sol.instance.aisle_stocks(removed, item) {
            c -= 1;
        }
        if c == 0 {
            missing += 1;
        }
    }
    missing
}

/// Does `added` cover all of `o`'s simulated-missing slots (with `removed`
/// already subtracted)?
fn covers_simulated(
    sol: &Solution,
    o: usize,
    added: usize,
    removed: usize,
    sim_missing: u32,
) -> bool {
    let demand = &sol.instance.orders[o];
    let mut hit = 0u32;
    for (slot, &(item, _)) in demand.iter().enumerate() {
        let mut c = sol.coverage_of(o, slot);
        if c > 0 && sol.instance.aisle_stocks(removed, item) {
            c -= 1;
        }
        if c == 0 && sol.instance.aisle_stocks(added, item) {
            hit += 1;
        }
    }
    hit == sim_missing
}
