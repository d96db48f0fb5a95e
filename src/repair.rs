use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::debug;

use crate::eval::Evaluator;
use crate::solution::Solution;

/// Presence feasibility: every demanded item of every chosen order is stocked
/// by at least one chosen aisle. This is the condition the search maintains;
/// the stricter per-unit gate lives in [`final_feasible`].
pub fn is_covered(sol: &Solution) -> bool {
    sol.uncovered_chosen() == 0
}

/// Fraction of chosen orders that are fully covered.
pub fn coverage_quality(sol: &Solution) -> f64 {
    let chosen = sol.orders().len();
    if chosen == 0 {
        return 1.0;
    }
    let covered = sol
        .orders()
        .iter()
        .filter(|&o| sol.is_fully_covered(o))
        .count();
    #[allow(clippy::cast_precision_loss)]
    {
        covered as f64 / chosen as f64
    }
}

/// Uncovered (order, slot) pairs of chosen orders that adding `a` would cover.
fn cover_gain(sol: &Solution, a: usize) -> usize {
    let adj = sol.instance.adjacency();
    let mut gain = 0;
    for &o in &adj.aisle_orders[a] {
        if !sol.contains_order(o) || sol.missing_of(o) == 0 {
            continue;
        }
        for (slot, &(item, _)) in sol.instance.orders[o].iter().enumerate() {
            if sol.coverage_of(o, slot) == 0 && sol.instance.aisle_stocks(a, item) {
                gain += 1;
            }
        }
    }
    gain
}

/// Greedy set-cover repair: add the aisle covering the most still-uncovered
/// (order, item) pairs until every chosen order is covered or no aisle
/// contributes. Stale heap entries are re-scored lazily. On success a prune
/// pass drops redundant aisles. Returns false (leaving the partial cover in
/// place) when the chosen orders cannot be covered.
pub fn repair(sol: &mut Solution, eval: &Evaluator) -> bool {
    if sol.uncovered_chosen() == 0 {
        prune_redundant_aisles(sol, eval);
        return true;
    }

    // max-heap of (gain, Reverse(aisle)) so ties break on the lowest id
    let mut heap: BinaryHeap<(usize, Reverse<usize>)> = (0..sol.instance.num_aisles())
        .filter(|&a| !sol.contains_aisle(a))
        .filter_map(|a| {
            let g = cover_gain(sol, a);
            (g > 0).then_some((g, Reverse(a)))
        })
        .collect();

    while sol.uncovered_chosen() > 0 {
        let Some((claimed, Reverse(a))) = heap.pop() else {
            break;
        };
        if sol.contains_aisle(a) {
            continue;
        }
        let current = cover_gain(sol, a);
        if current != claimed {
            if current > 0 {
                heap.push((current, Reverse(a)));
            }
            continue;
        }
        if current == 0 {
            break;
        }
        let delta = eval.compute_delta_add_aisle(sol, a);
        sol.apply_add_aisle(a, delta);
    }

    if sol.uncovered_chosen() > 0 {
        debug!(
            uncovered = sol.uncovered_chosen(),
            "repair left chosen orders uncoverable"
        );
        return false;
    }
    prune_redundant_aisles(sol, eval);
    true
}

/// Tentatively remove each chosen aisle in ascending id order and keep the
/// removal whenever coverage survives. Only called on covered solutions.
pub fn prune_redundant_aisles(sol: &mut Solution, eval: &Evaluator) -> usize {
    let mut removed = 0;
    for a in sol.aisles().sorted() {
        let delta = eval.compute_delta_remove_aisle(sol, a);
        sol.apply_remove_aisle(a, delta);
        if sol.uncovered_chosen() > 0 {
            let back = eval.compute_delta_add_aisle(sol, a);
            sol.apply_add_aisle(a, back);
        } else {
            removed += 1;
        }
    }
    removed
}

/// Evict chosen orders whose demand cannot be met by the currently chosen
/// aisles even in total units. This is the per-unit reading: an order
/// demanding 10 units of an item of which the chosen aisles stock 3 can never
/// be part of a feasible wave with this aisle set. Returns the number evicted.
pub fn remove_infeasible_orders(sol: &mut Solution, eval: &Evaluator) -> usize {
    let mut stocked = vec![0u64; sol.instance.num_items];
    for a in sol.aisles().iter() {
        for &(item, units) in &sol.instance.aisles[a] {
            stocked[item] += u64::from(units);
        }
    }

    let mut removed = 0;
    for o in sol.orders().sorted() {
        let unmeetable = sol.instance.orders[o]
            .iter()
            .any(|&(item, units)| u64::from(units) > stocked[item]);
        if !unmeetable {
            continue;
        }
        let delta = eval.compute_delta_remove_order(sol, o);
        if delta.is_finite() {
            sol.apply_remove_order(o, delta);
        } else {
            // evicting the last order leaves an empty (infinite-cost) wave
            sol.apply_remove_order(o, 0.0);
            sol.set_cost(f64::INFINITY);
        }
        removed += 1;
    }
    if removed > 0 {
        debug!(removed, "evicted infeasible orders");
    }
    removed
}

/// The final feasibility gate: presence coverage, per-item units
/// (chosen aisles stock at least what chosen orders demand), and the wave
/// bounds LB <= picked units <= UB.
pub fn final_feasible(sol: &Solution) -> bool {
    if sol.orders().is_empty() || sol.aisles().is_empty() {
        return false;
    }
    if sol.uncovered_chosen() > 0 {
        return false;
    }
    let units = sol.picked_units();
    if units < sol.instance.wave_lb || units > sol.instance.wave_ub {
        return false;
    }

    let mut balance = vec![0i64; sol.instance.num_items];
    for a in sol.aisles().iter() {
        for &(item, u) in &sol.instance.aisles[a] {
            balance[item] += i64::from(u);
        }
    }
    for o in sol.orders().iter() {
        for &(item, u) in &sol.instance.orders[o] {
            balance[item] -= i64::from(u);
        }
    }
    balance.iter().all(|&b| b >= 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::CostWeights;
    use crate::instance::Instance;
    use std::sync::Arc;

    fn eval() -> Evaluator {
        Evaluator::new(CostWeights::default())
    }

    #[test]
    fn repair_adds_the_missing_aisle() {
        // order 0 needs items 0 and 1; aisle 0 has item 0, aisle 1 has item 1
        let inst = Arc::new(Instance::parse("1 2 2\n2 0 2 1 2\n1 0 2\n1 1 2\n4 4\n").unwrap());
        let ev = eval();
        let mut sol = Solution::new(inst, [0], [0]);
        sol.set_cost(ev.evaluate(&sol));

        assert!(repair(&mut sol, &ev));
        assert!(sol.contains_aisle(0));
        assert!(sol.contains_aisle(1));
        assert!(is_covered(&sol));
        assert!(final_feasible(&sol));
        assert!((sol.objective() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn repair_prunes_redundant_aisles() {
        // both aisles stock the single demanded item
        let inst = Arc::new(Instance::parse("1 1 2\n1 0 1\n1 0 5\n1 0 5\n1 1\n").unwrap());
        let ev = eval();
        let mut sol = Solution::new(inst, [0], [0, 1]);
        sol.set_cost(ev.evaluate(&sol));

        assert!(repair(&mut sol, &ev));
        assert_eq!(sol.aisles().len(), 1);
        assert!((sol.objective() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn greedy_cover_prefers_the_widest_aisle() {
        // one aisle covers all three items; the singles should never be used
        let inst = Arc::new(
            Instance::parse(
                "3 3 4\n1 0 1\n1 1 1\n1 2 1\n\
                 1 0 5\n1 1 5\n1 2 5\n3 0 5 1 5 2 5\n0 10\n",
            )
            .unwrap(),
        );
        let ev = eval();
        let mut sol = Solution::new(inst, [0, 1, 2], []);
        sol.set_cost(ev.evaluate(&sol));

        assert!(repair(&mut sol, &ev));
        assert_eq!(sol.aisles().len(), 1);
        assert!(sol.contains_aisle(3));
    }

    #[test]
    fn repair_reports_uncoverable_orders() {
        // item 1 is stocked nowhere
        let inst = Arc::new(Instance::parse("1 2 1\n2 0 1 1 1\n1 0 5\n0 10\n").unwrap());
        let ev = eval();
        let mut sol = Solution::new(inst, [0], []);
        sol.set_cost(ev.evaluate(&sol));

        assert!(!repair(&mut sol, &ev));
        assert!(!is_covered(&sol));
        // the partial cover is kept
        assert!(sol.contains_aisle(0));
    }

    #[test]
    fn evicts_orders_beyond_stocked_units() {
        // aisle stocks 3 units; order 1 demands 10
        let inst =
            Arc::new(Instance::parse("2 1 1\n1 0 1\n1 0 10\n1 0 3\n1 10\n").unwrap());
        let ev = eval();
        let mut sol = Solution::new(inst, [0, 1], [0]);
        sol.set_cost(ev.evaluate(&sol));

        assert_eq!(remove_infeasible_orders(&mut sol, &ev), 1);
        assert!(sol.contains_order(0));
        assert!(!sol.contains_order(1));
        assert!(final_feasible(&sol));
        assert!((sol.objective() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn coverage_quality_counts_covered_fraction() {
        let inst = Arc::new(Instance::parse("2 2 1\n1 0 1\n1 1 1\n1 0 5\n0 10\n").unwrap());
        let ev = eval();
        let mut sol = Solution::new(inst, [0, 1], []);
        sol.set_cost(ev.evaluate(&sol));
        assert_eq!(coverage_quality(&sol), 0.0);

        sol.apply_add_aisle(0, ev.compute_delta_add_aisle(&sol, 0));
        assert!((coverage_quality(&sol) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn final_gate_enforces_wave_bounds() {
        let inst = Arc::new(Instance::parse("1 1 1\n1 0 3\n1 0 5\n4 9\n").unwrap());
        let sol = Solution::new(inst, [0], [0]);
        // 3 picked units < LB 4
        assert!(!final_feasible(&sol));
    }

    #[test]
    fn final_gate_enforces_per_unit_stock() {
        // presence-covered but 4 demanded units vs 3 stocked
        let inst = Arc::new(Instance::parse("2 1 1\n1 0 2\n1 0 2\n1 0 3\n0 10\n").unwrap());
        let sol = Solution::new(inst, [0, 1], [0]);
        assert!(is_covered(&sol));
        assert!(!final_feasible(&sol));
    }
}
