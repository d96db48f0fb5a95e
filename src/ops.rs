use ordered_float::OrderedFloat;
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::eval::Evaluator;
use crate::repair;
use crate::solution::Solution;

/// The move operator family. Each variant is a plain record carrying its
/// parameters; `apply` mutates the solution through exact per-step deltas,
/// repairs it if coverage was broken, and returns the realized change in
/// surrogate cost (0 when it could not act).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Move {
    AddOrder,
    RemoveOrder,
    AddAisle,
    RemoveAisle,
    SwapAisle,
    SwapOrder,
    MultiSwapAisle { k: usize },
    LnsOrder { rho: f64 },
    LnsAisle { rho: f64 },
    ObjectiveFocused { lambda: f64 },
}

impl Move {
    pub fn name(self) -> &'static str {
        match self {
            Move::AddOrder => "add-order",
            Move::RemoveOrder => "remove-order",
            Move::AddAisle => "add-aisle",
            Move::RemoveAisle => "remove-aisle",
            Move::SwapAisle => "swap-aisle",
            Move::SwapOrder => "swap-order",
            Move::MultiSwapAisle { .. } => "multi-swap-aisle",
            Move::LnsOrder { .. } => "lns-order",
            Move::LnsAisle { .. } => "lns-aisle",
            Move::ObjectiveFocused { .. } => "objective-focused",
        }
    }

    /// The default operator roster handed to the bandit.
    pub fn roster() -> Vec<Move> {
        vec![
            Move::AddOrder,
            Move::RemoveOrder,
            Move::AddAisle,
            Move::RemoveAisle,
            Move::SwapAisle,
            Move::SwapOrder,
            Move::MultiSwapAisle { k: 2 },
            Move::LnsOrder { rho: 0.15 },
            Move::LnsAisle { rho: 0.15 },
            Move::ObjectiveFocused { lambda: 0.1 },
        ]
    }

    pub fn apply(self, sol: &mut Solution, eval: &mut Evaluator, rng: &mut StdRng) -> f64 {
        let before = sol.cost();
        match self {
            Move::AddOrder => add_random_order(sol, eval, rng),
            Move::RemoveOrder => remove_random_order(sol, eval, rng),
            Move::AddAisle => add_random_aisle(sol, eval, rng),
            Move::RemoveAisle => remove_random_aisle(sol, eval, rng),
            Move::SwapAisle => swap_random_aisle(sol, eval, rng),
            Move::SwapOrder => swap_random_order(sol, eval, rng),
            Move::MultiSwapAisle { k } => multi_swap_aisle(sol, eval, rng, k),
            Move::LnsOrder { rho } => lns_order(sol, eval, rng, rho),
            Move::LnsAisle { rho } => lns_aisle(sol, eval, rng, rho),
            Move::ObjectiveFocused { lambda } => objective_focused(sol, eval, rng, lambda),
        }
        if sol.uncovered_chosen() > 0 {
            repair::repair(sol, eval);
        }
        sol.cost() - before
    }
}

pub fn commit_add_order(sol: &mut Solution, eval: &Evaluator, o: usize) {
    let d = eval.compute_delta_add_order(sol, o);
    if d.is_finite() {
        sol.apply_add_order(o, d);
    } else {
        // leaving the empty wave: the infinite cost cannot be patched by a
        // delta, so recompute from the counters
        sol.apply_add_order(o, 0.0);
        let cost = eval.evaluate(sol);
        sol.set_cost(cost);
    }
}

pub fn commit_remove_order(sol: &mut Solution, eval: &Evaluator, o: usize) -> bool {
    let d = eval.compute_delta_remove_order(sol, o);
    if !d.is_finite() {
        return false;
    }
    sol.apply_remove_order(o, d)
}

pub fn commit_add_aisle(sol: &mut Solution, eval: &Evaluator, a: usize) {
    let d = eval.compute_delta_add_aisle(sol, a);
    sol.apply_add_aisle(a, d);
}

pub fn commit_remove_aisle(sol: &mut Solution, eval: &Evaluator, a: usize) {
    let d = eval.compute_delta_remove_aisle(sol, a);
    sol.apply_remove_aisle(a, d);
}

fn add_random_order(sol: &mut Solution, eval: &Evaluator, rng: &mut StdRng) {
    let candidates = sol.orders().complement();
    if candidates.is_empty() {
        return;
    }
    let o = candidates[rng.random_range(0..candidates.len())];
    commit_add_order(sol, eval, o);
}

fn remove_random_order(sol: &mut Solution, eval: &Evaluator, rng: &mut StdRng) {
    let chosen = sol.orders().as_slice();
    if chosen.len() <= 1 {
        return;
    }
    let o = chosen[rng.random_range(0..chosen.len())];
    commit_remove_order(sol, eval, o);
}

fn add_random_aisle(sol: &mut Solution, eval: &Evaluator, rng: &mut StdRng) {
    let candidates = sol.aisles().complement();
    if candidates.is_empty() {
        return;
    }
    let a = candidates[rng.random_range(0..candidates.len())];
    commit_add_aisle(sol, eval, a);
}

fn remove_random_aisle(sol: &mut Solution, eval: &Evaluator, rng: &mut StdRng) {
    let chosen = sol.aisles().as_slice();
    if chosen.is_empty() {
        return;
    }
    let a = chosen[rng.random_range(0..chosen.len())];
    commit_remove_aisle(sol, eval, a);
}

fn swap_random_aisle(sol: &mut Solution, eval: &Evaluator, rng: &mut StdRng) {
    let chosen = sol.aisles().as_slice();
    let candidates = sol.aisles().complement();
    if chosen.is_empty() || candidates.is_empty() {
        return;
    }
    let out = chosen[rng.random_range(0..chosen.len())];
    let inn = candidates[rng.random_range(0..candidates.len())];
    commit_remove_aisle(sol, eval, out);
    commit_add_aisle(sol, eval, inn);
}

fn swap_random_order(sol: &mut Solution, eval: &Evaluator, rng: &mut StdRng) {
    let chosen = sol.orders().as_slice();
    let candidates = sol.orders().complement();
    if chosen.is_empty() || candidates.is_empty() {
        return;
    }
    let out = chosen[rng.random_range(0..chosen.len())];
    let inn = candidates[rng.random_range(0..candidates.len())];
    // add first so the removal never empties the wave
    commit_add_order(sol, eval, inn);
    commit_remove_order(sol, eval, out);
}

fn multi_swap_aisle(sol: &mut Solution, eval: &Evaluator, rng: &mut StdRng, k: usize) {
    let mut chosen = sol.aisles().as_slice().to_vec();
    let mut candidates = sol.aisles().complement();
    let k = k.min(chosen.len()).min(candidates.len());
    if k == 0 {
        return;
    }
    chosen.shuffle(rng);
    candidates.shuffle(rng);
    for &a in &chosen[..k] {
        commit_remove_aisle(sol, eval, a);
    }
    for &a in &candidates[..k] {
        commit_add_aisle(sol, eval, a);
    }
}

/// Destroy a fraction of the chosen orders, then re-insert the best-ranked
/// non-chosen orders up to the destroyed count.
fn lns_order(sol: &mut Solution, eval: &Evaluator, rng: &mut StdRng, rho: f64) {
    let chosen = sol.orders().as_slice().to_vec();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let want = (rho * chosen.len() as f64).ceil() as usize;
    let destroy = want.min(chosen.len().saturating_sub(1));
    if destroy == 0 {
        return;
    }
    let mut victims = chosen;
    victims.shuffle(rng);
    victims.truncate(destroy);
    for o in victims {
        commit_remove_order(sol, eval, o);
    }

    let candidates = sol.orders().complement();
    let deltas = eval.batch_delta_add_order(sol, &candidates);
    let mut ranked: Vec<(usize, f64)> = candidates.into_iter().zip(deltas).collect();
    ranked.sort_by_key(|&(_, d)| OrderedFloat(d));
    for (o, _) in ranked.into_iter().take(destroy) {
        commit_add_order(sol, eval, o);
    }
}

fn lns_aisle(sol: &mut Solution, eval: &Evaluator, rng: &mut StdRng, rho: f64) {
    let chosen = sol.aisles().as_slice().to_vec();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let destroy = ((rho * chosen.len() as f64).ceil() as usize).min(chosen.len());
    if destroy == 0 {
        return;
    }
    let mut victims = chosen;
    victims.shuffle(rng);
    victims.truncate(destroy);
    for a in victims {
        commit_remove_aisle(sol, eval, a);
    }

    let candidates = sol.aisles().complement();
    let deltas = eval.batch_delta_add_aisle(sol, &candidates);
    let mut ranked: Vec<(usize, f64)> = candidates.into_iter().zip(deltas).collect();
    ranked.sort_by_key(|&(_, d)| OrderedFloat(d));
    for (a, _) in ranked.into_iter().take(destroy) {
        commit_add_aisle(sol, eval, a);
    }
}

/// Drop the chosen orders contributing least to the true objective
/// (demanded units over exclusively-held aisles), then pull in the
/// highest-yield candidates.
fn objective_focused(sol: &mut Solution, eval: &Evaluator, rng: &mut StdRng, lambda: f64) {
    let _ = rng;
    let chosen = sol.orders().as_slice().to_vec();
    if chosen.len() <= 1 {
        return;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let want = (lambda * chosen.len() as f64).ceil() as usize;
    let drop = want.min(chosen.len() - 1);
    if drop == 0 {
        return;
    }

    // an aisle is exclusive to an order when it is adjacent to no other
    // chosen order
    let adj = sol.instance.adjacency();
    let mut exclusive = vec![0usize; sol.instance.num_orders()];
    for a in sol.aisles().iter() {
        let mut owner = usize::MAX;
        let mut shared = false;
        for &o in &adj.aisle_orders[a] {
            if sol.contains_order(o) {
                if owner != usize::MAX {
                    shared = true;
                    break;
                }
                owner = o;
            }
        }
        if !shared && owner != usize::MAX {
            exclusive[owner] += 1;
        }
    }

    let mut ranked: Vec<(usize, f64)> = chosen
        .iter()
        .map(|&o| {
            #[allow(clippy::cast_precision_loss)]
            let contribution =
                sol.instance.order_units[o] as f64 / (1.0 + exclusive[o] as f64);
            (o, contribution)
        })
        .collect();
    ranked.sort_by_key(|&(_, c)| OrderedFloat(c));
    for &(o, _) in ranked.iter().take(drop) {
        commit_remove_order(sol, eval, o);
    }

    let candidates = sol.orders().complement();
    let deltas = eval.batch_delta_add_order(sol, &candidates);
    let mut scored: Vec<(usize, f64)> = candidates
        .into_iter()
        .zip(deltas)
        .map(|(o, d)| {
            #[allow(clippy::cast_precision_loss)]
            let score = sol.instance.order_units[o] as f64 / (1.0 + d.max(0.0));
            (o, score)
        })
        .collect();
    scored.sort_by_key(|&(_, s)| std::cmp::Reverse(OrderedFloat(s)));
    for (o, _) in scored.into_iter().take(drop) {
        commit_add_order(sol, eval, o);
    }
}

/// The stagnation escape hatch: a strong destroy over both orders and aisles
/// followed by repair. Used by the driver after long droughts.
pub fn strong_perturbation(sol: &mut Solution, eval: &mut Evaluator, rng: &mut StdRng) -> f64 {
    let d1 = Move::LnsOrder { rho: 0.3 }.apply(sol, eval, rng);
    let d2 = Move::LnsAisle { rho: 0.3 }.apply(sol, eval, rng);
    d1 + d2
}
