use std::collections::HashMap;

use ordered_float::OrderedFloat;
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use tracing::trace;

use crate::budget::TimeBudget;
use crate::config::FlsConfig;
use crate::eval::Evaluator;
use crate::ops;
use crate::repair;
use crate::solution::Solution;

/// How the VND walks a neighborhood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImprovementMode {
    Best,
    First,
}

/// A single candidate move inside a neighborhood scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cand {
    AddOrder(usize),
    RemoveOrder(usize),
    SwapOrder(usize, usize),
    AddAisle(usize),
    RemoveAisle(usize),
    SwapAisle(usize, usize),
}

const NEIGHBORHOODS: usize = 2;
const SWAP_SAMPLE_CAP: usize = 256;

/// Neighbor lists memoized per solution identity (its version pair). Lives
/// outside the solution and is dropped wholesale when it grows past its cap.
pub struct NeighborhoodMemo {
    map: HashMap<(u64, u64, usize), Vec<Cand>>,
    cap: usize,
}

impl NeighborhoodMemo {
    pub fn new() -> Self {
        NeighborhoodMemo {
            map: HashMap::new(),
            cap: 64,
        }
    }

    fn get_or_build(
        &mut self,
        sol: &Solution,
        which: usize,
        rng: &mut StdRng,
    ) -> Vec<Cand> {
        let key = (sol.order_version(), sol.aisle_version(), which);
        if let Some(cands) = self.map.get(&key) {
            return cands.clone();
        }
        if self.map.len() >= self.cap {
            self.map.clear();
        }
        let cands = build_neighborhood(sol, which, rng);
        self.map.insert(key, cands.clone());
        cands
    }
}

impl Default for NeighborhoodMemo {
    fn default() -> Self {
        Self::new()
    }
}

fn build_neighborhood(sol: &Solution, which: usize, rng: &mut StdRng) -> Vec<Cand> {
    let mut cands = Vec::new();
    match which {
        0 => {
            for o in sol.orders().complement() {
                cands.push(Cand::AddOrder(o));
            }
            if sol.orders().len() > 1 {
                for o in sol.orders().iter() {
                    cands.push(Cand::RemoveOrder(o));
                }
            }
            push_swaps(
                sol.orders().as_slice(),
                &sol.orders().complement(),
                rng,
                &mut cands,
                Cand::SwapOrder,
            );
        }
        _ => {
            for a in sol.aisles().complement() {
                cands.push(Cand::AddAisle(a));
            }
            for a in sol.aisles().iter() {
                cands.push(Cand::RemoveAisle(a));
            }
            push_swaps(
                sol.aisles().as_slice(),
                &sol.aisles().complement(),
                rng,
                &mut cands,
                Cand::SwapAisle,
            );
        }
    }
    cands
}

/// All (chosen, unchosen) swap pairs when the product is small, otherwise a
/// uniform sample of them.
fn push_swaps(
    chosen: &[usize],
    unchosen: &[usize],
    rng: &mut StdRng,
    out: &mut Vec<Cand>,
    make: fn(usize, usize) -> Cand,
) {
    if chosen.is_empty() || unchosen.is_empty() {
        return;
    }
    let product = chosen.len().saturating_mul(unchosen.len());
    if product <= SWAP_SAMPLE_CAP {
        for &c in chosen {
            for &u in unchosen {
                out.push(make(c, u));
            }
        }
    } else {
        for _ in 0..SWAP_SAMPLE_CAP {
            let c = chosen[rng.random_range(0..chosen.len())];
            let u = unchosen[rng.random_range(0..unchosen.len())];
            out.push(make(c, u));
        }
    }
}

fn estimate(eval: &Evaluator, sol: &Solution, cand: Cand) -> f64 {
    match cand {
        Cand::AddOrder(o) => eval.compute_delta_add_order(sol, o),
        Cand::RemoveOrder(o) => eval.compute_delta_remove_order(sol, o),
        Cand::SwapOrder(out, inn) => eval.delta_swap_orders(sol, out, inn),
        Cand::AddAisle(a) => eval.compute_delta_add_aisle(sol, a),
        Cand::RemoveAisle(a) => eval.compute_delta_remove_aisle(sol, a),
        Cand::SwapAisle(out, inn) => eval.delta_swap_aisle(sol, out, inn),
    }
}

/// Commit a candidate and return the realized cost change (repair included).
fn commit(sol: &mut Solution, eval: &Evaluator, cand: Cand) -> f64 {
    let before = sol.cost();
    match cand {
        Cand::AddOrder(o) => ops::commit_add_order(sol, eval, o),
        Cand::RemoveOrder(o) => {
            ops::commit_remove_order(sol, eval, o);
        }
        Cand::SwapOrder(out, inn) => {
            ops::commit_add_order(sol, eval, inn);
            ops::commit_remove_order(sol, eval, out);
        }
        Cand::AddAisle(a) => ops::commit_add_aisle(sol, eval, a),
        Cand::RemoveAisle(a) => ops::commit_remove_aisle(sol, eval, a),
        Cand::SwapAisle(out, inn) => {
            ops::commit_remove_aisle(sol, eval, out);
            ops::commit_add_aisle(sol, eval, inn);
        }
    }
    if sol.uncovered_chosen() > 0 {
        repair::repair(sol, eval);
    }
    sol.cost() - before
}

/// Variable neighborhood descent over the order and aisle neighborhoods.
/// Mutates `sol` towards the best solution found and returns the realized
/// change in cost (non-positive unless a repair was forced).
#[allow(clippy::too_many_lines)]
pub fn focused_local_search(
    sol: &mut Solution,
    eval: &mut Evaluator,
    cfg: &FlsConfig,
    mode: ImprovementMode,
    budget: &TimeBudget,
    memo: &mut NeighborhoodMemo,
    rng: &mut StdRng,
) -> f64 {
    let start_cost = sol.cost();
    let local_budget = cfg
        .timeout_millis
        .map(|ms| TimeBudget::new(std::time::Duration::from_millis(ms)));
    let expired =
        |b: &Option<TimeBudget>| budget.expired() || b.as_ref().is_some_and(TimeBudget::expired);

    let mut best = sol.clone();
    let mut improvements = 0u32;
    let mut no_improve = 0usize;
    let mut mutations = 0usize;

    #[allow(clippy::cast_precision_loss)]
    let base_patience =
        cfg.patience_factor * (sol.orders().len() + sol.aisles().len()) as f64;

    for _iter in 0..cfg.max_iterations {
        if expired(&local_budget) {
            break;
        }
        if cfg
            .target_cost
            .is_some_and(|target| best.cost() <= target)
        {
            break;
        }
        // patience shrinks geometrically as improvements accumulate
        let patience = (base_patience * 0.9f64.powi(i32::try_from(improvements).unwrap_or(i32::MAX)))
            .max(10.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        if no_improve >= (patience as usize).min(cfg.max_no_improvement) {
            break;
        }

        let moved = match mode {
            ImprovementMode::Best => best_improvement_step(sol, eval, cfg, memo, rng),
            ImprovementMode::First => first_improvement_step(sol, eval, cfg, memo, rng),
        };

        if moved {
            no_improve = 0;
            if sol.cost() + cfg.improvement_epsilon < best.cost() {
                best.clone_from(sol);
                improvements += 1;
            }
        } else if cfg.allow_restart && mutations < 3 {
            // local optimum: kick once and descend again from the best known
            no_improve += 1;
            mutations += 1;
            light_mutation(sol, eval, &best, rng);
        } else {
            // no improving neighbor in any neighborhood
            break;
        }
    }

    if best.cost() < sol.cost() {
        sol.clone_from(&best);
    }
    trace!(from = start_cost, to = sol.cost(), "focused local search done");
    sol.cost() - start_cost
}

/// Scan every neighborhood, move to the strictly best improving neighbor.
fn best_improvement_step(
    sol: &mut Solution,
    eval: &mut Evaluator,
    cfg: &FlsConfig,
    memo: &mut NeighborhoodMemo,
    rng: &mut StdRng,
) -> bool {
    let mut all: Vec<Cand> = Vec::new();
    for which in 0..NEIGHBORHOODS {
        all.extend(memo.get_or_build(sol, which, rng));
    }
    if all.is_empty() {
        return false;
    }

    // deltas only read the solution; scan the materialized list in parallel
    let frozen: &Solution = sol;
    let ev: &Evaluator = eval;
    let best = all
        .par_iter()
        .map(|&cand| (cand, estimate(ev, frozen, cand)))
        .min_by_key(|&(_, d)| OrderedFloat(d));

    let Some((cand, delta)) = best else {
        return false;
    };
    if delta >= -cfg.improvement_epsilon {
        return false;
    }
    let realized = commit(sol, eval, cand);
    realized < -cfg.improvement_epsilon
}

/// Walk neighborhoods in order; take the first improving neighbor of a
/// shuffled scan and restart that neighborhood.
fn first_improvement_step(
    sol: &mut Solution,
    eval: &mut Evaluator,
    cfg: &FlsConfig,
    memo: &mut NeighborhoodMemo,
    rng: &mut StdRng,
) -> bool {
    for which in 0..NEIGHBORHOODS {
        let mut cands = memo.get_or_build(sol, which, rng);
        cands.shuffle(rng);
        for cand in cands {
            let delta = estimate(eval, sol, cand);
            if delta < -cfg.improvement_epsilon {
                let realized = commit(sol, eval, cand);
                if realized < -cfg.improvement_epsilon {
                    return true;
                }
            }
        }
    }
    false
}

/// Remove one random chosen order or aisle from the best known solution and
/// continue from there.
fn light_mutation(sol: &mut Solution, eval: &Evaluator, best: &Solution, rng: &mut StdRng) {
    sol.clone_from(best);
    let drop_order = rng.random_bool(0.5) && sol.orders().len() > 1;
    if drop_order {
        let chosen = sol.orders().as_slice();
        let o = chosen[rng.random_range(0..chosen.len())];
        ops::commit_remove_order(sol, eval, o);
    } else if !sol.aisles().is_empty() {
        let chosen = sol.aisles().as_slice();
        let a = chosen[rng.random_range(0..chosen.len())];
        ops::commit_remove_aisle(sol, eval, a);
    }
    if sol.uncovered_chosen() > 0 {
        repair::repair(sol, eval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::CostWeights;
    use crate::instance::Instance;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn instance() -> Arc<Instance> {
        // aisle 2 stocks everything: local search should shrink to it
        Arc::new(
            Instance::parse(
                "2 2 3\n\
                 1 0 2\n\
                 1 1 2\n\
                 1 0 4\n\
                 1 1 4\n\
                 2 0 4 1 4\n\
                 0 100\n",
            )
            .unwrap(),
        )
    }

    fn run(mode: ImprovementMode, aisles: &[usize]) -> (Solution, f64) {
        let inst = instance();
        let mut ev = Evaluator::new(CostWeights::default());
        let mut sol = Solution::new(inst, [0, 1], aisles.iter().copied());
        sol.set_cost(ev.evaluate(&sol));
        let before = sol.cost();

        let mut memo = NeighborhoodMemo::new();
        let mut rng = StdRng::seed_from_u64(21);
        let cfg = FlsConfig::default();
        let budget = TimeBudget::unlimited();
        let delta = focused_local_search(
            &mut sol, &mut ev, &cfg, mode, &budget, &mut memo, &mut rng,
        );
        assert!((sol.cost() - (before + delta)).abs() <= 1e-9);
        (sol, delta)
    }

    #[test]
    fn best_improvement_drops_redundant_aisles() {
        // the third aisle duplicates the other two, so a removal always wins
        let (sol, delta) = run(ImprovementMode::Best, &[0, 1, 2]);
        assert!(delta < 0.0);
        assert!(sol.aisles().len() <= 2);
        assert!(repair::is_covered(&sol));
    }

    #[test]
    fn first_improvement_never_worsens() {
        let (sol, delta) = run(ImprovementMode::First, &[0, 1]);
        assert!(delta <= 0.0);
        assert!(repair::is_covered(&sol));
    }

    #[test]
    fn respects_an_expired_budget() {
        let inst = instance();
        let mut ev = Evaluator::new(CostWeights::default());
        let mut sol = Solution::new(inst, [0, 1], [0, 1]);
        sol.set_cost(ev.evaluate(&sol));
        let before = sol.cost();

        let mut memo = NeighborhoodMemo::new();
        let mut rng = StdRng::seed_from_u64(3);
        let cfg = FlsConfig::default();
        let budget = TimeBudget::new(std::time::Duration::ZERO);
        let delta = focused_local_search(
            &mut sol,
            &mut ev,
            &cfg,
            ImprovementMode::Best,
            &budget,
            &mut memo,
            &mut rng,
        );
        assert_eq!(delta, 0.0);
        assert_eq!(sol.cost(), before);
    }

    #[test]
    fn memo_is_reused_for_identical_states() {
        let inst = instance();
        let sol = {
            let ev = Evaluator::new(CostWeights::default());
            let mut s = Solution::new(inst, [0, 1], [0, 1]);
            s.set_cost(ev.evaluate(&s));
            s
        };
        let mut memo = NeighborhoodMemo::new();
        let mut rng = StdRng::seed_from_u64(4);
        let first = memo.get_or_build(&sol, 0, &mut rng);
        let second = memo.get_or_build(&sol, 0, &mut rng);
        assert_eq!(first, second);
        assert_eq!(memo.map.len(), 1);
    }
}
