use std::collections::{HashSet, VecDeque};

use ordered_float::OrderedFloat;
use rand::Rng;
use rand::rngs::StdRng;
use tracing::trace;

use crate::budget::TimeBudget;
use crate::eval::Evaluator;
use crate::ops;
use crate::repair;
use crate::search::elite::EliteArchive;
use crate::solution::Solution;

const SWAP_SAMPLE_CAP: usize = 128;

#[derive(Debug, Clone, Copy)]
enum TabuMove {
    AddOrder(usize),
    RemoveOrder(usize),
    AddAisle(usize),
    RemoveAisle(usize),
    SwapAisle(usize, usize),
}

/// Recency keys: touching an element makes re-touching it tabu until the key
/// ages out of the tenure queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TabuKey {
    Order(usize),
    Aisle(usize),
}

impl TabuMove {
    fn keys(self) -> (TabuKey, Option<TabuKey>) {
        match self {
            TabuMove::AddOrder(o) | TabuMove::RemoveOrder(o) => (TabuKey::Order(o), None),
            TabuMove::AddAisle(a) | TabuMove::RemoveAisle(a) => (TabuKey::Aisle(a), None),
            TabuMove::SwapAisle(out, inn) => {
                (TabuKey::Aisle(out), Some(TabuKey::Aisle(inn)))
            }
        }
    }

    fn is_tabu(self, tabu: &HashSet<TabuKey>) -> bool {
        let (k1, k2) = self.keys();
        tabu.contains(&k1) || k2.is_some_and(|k| tabu.contains(&k))
    }
}

fn estimate(eval: &Evaluator, sol: &Solution, mv: TabuMove) -> f64 {
    match mv {
        TabuMove::AddOrder(o) => eval.compute_delta_add_order(sol, o),
        TabuMove::RemoveOrder(o) => eval.compute_delta_remove_order(sol, o),
        TabuMove::AddAisle(a) => eval.compute_delta_add_aisle(sol, a),
        TabuMove::RemoveAisle(a) => eval.compute_delta_remove_aisle(sol, a),
        TabuMove::SwapAisle(out, inn) => eval.delta_swap_aisle(sol, out, inn),
    }
}

fn commit(sol: &mut Solution, eval: &Evaluator, mv: TabuMove) {
    match mv {
        TabuMove::AddOrder(o) => ops::commit_add_order(sol, eval, o),
        TabuMove::RemoveOrder(o) => {
            ops::commit_remove_order(sol, eval, o);
        }
        TabuMove::AddAisle(a) => ops::commit_add_aisle(sol, eval, a),
        TabuMove::RemoveAisle(a) => ops::commit_remove_aisle(sol, eval, a),
        TabuMove::SwapAisle(out, inn) => {
            ops::commit_remove_aisle(sol, eval, out);
            ops::commit_add_aisle(sol, eval, inn);
        }
    }
    if sol.uncovered_chosen() > 0 {
        repair::repair(sol, eval);
    }
}

fn neighborhood(sol: &Solution, rng: &mut StdRng) -> Vec<TabuMove> {
    let mut moves = Vec::new();
    for o in sol.orders().complement() {
        moves.push(TabuMove::AddOrder(o));
    }
    if sol.orders().len() > 1 {
        for o in sol.orders().iter() {
            moves.push(TabuMove::RemoveOrder(o));
        }
    }
    for a in sol.aisles().complement() {
        moves.push(TabuMove::AddAisle(a));
    }
    for a in sol.aisles().iter() {
        moves.push(TabuMove::RemoveAisle(a));
    }

    let chosen = sol.aisles().as_slice();
    let unchosen = sol.aisles().complement();
    if !chosen.is_empty() && !unchosen.is_empty() {
        let product = chosen.len().saturating_mul(unchosen.len());
        if product <= SWAP_SAMPLE_CAP {
            for &c in chosen {
                for &u in &unchosen {
                    moves.push(TabuMove::SwapAisle(c, u));
                }
            }
        } else {
            for _ in 0..SWAP_SAMPLE_CAP {
                let c = chosen[rng.random_range(0..chosen.len())];
                let u = unchosen[rng.random_range(0..unchosen.len())];
                moves.push(TabuMove::SwapAisle(c, u));
            }
        }
    }
    moves
}

/// Short tabu search from `start`: each iteration applies the best non-tabu
/// move, or a tabu move that would beat the global best (aspiration), then
/// ages the tenure queue. Returns the best solution found.
pub fn tabu_refine(
    start: &Solution,
    eval: &mut Evaluator,
    tenure: usize,
    max_iterations: usize,
    budget: &TimeBudget,
    rng: &mut StdRng,
) -> Solution {
    let mut current = start.clone();
    let mut best = start.clone();
    let mut queue: VecDeque<TabuKey> = VecDeque::new();
    let mut tabu: HashSet<TabuKey> = HashSet::new();

    for _ in 0..max_iterations {
        if budget.expired() {
            break;
        }
        let moves = neighborhood(&current, rng);
        if moves.is_empty() {
            break;
        }

        let pick = moves
            .iter()
            .copied()
            .map(|mv| (mv, estimate(eval, &current, mv)))
            .filter(|&(mv, d)| {
                let aspires = current.cost() + d < best.cost() - 1e-9;
                d.is_finite() && (!mv.is_tabu(&tabu) || aspires)
            })
            .min_by_key(|&(_, d)| OrderedFloat(d));

        let Some((mv, _)) = pick else {
            break;
        };
        commit(&mut current, eval, mv);

        let (k1, k2) = mv.keys();
        for key in std::iter::once(k1).chain(k2) {
            if tabu.insert(key) {
                queue.push_back(key);
            }
        }
        while queue.len() > tenure {
            if let Some(old) = queue.pop_front() {
                tabu.remove(&old);
            }
        }

        if current.cost() < best.cost() {
            best.clone_from(&current);
        }
    }

    trace!(from = start.cost(), to = best.cost(), "tabu refinement done");
    best
}

/// Memetic intensification: refine each elite with a short tabu search and
/// return the best refined solution.
pub fn memetic_intensify(
    archive: &EliteArchive,
    eval: &mut Evaluator,
    tenure: usize,
    max_iterations: usize,
    budget: &TimeBudget,
    rng: &mut StdRng,
) -> Option<Solution> {
    let mut best: Option<Solution> = None;
    for elite in archive.solutions() {
        if budget.expired() {
            break;
        }
        let refined = tabu_refine(elite, eval, tenure, max_iterations, budget, rng);
        if best.as_ref().is_none_or(|b| refined.cost() < b.cost()) {
            best = Some(refined);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::CostWeights;
    use crate::instance::Instance;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn instance() -> Arc<Instance> {
        Arc::new(
            Instance::parse(
                "3 2 3\n\
                 1 0 2\n\
                 1 1 2\n\
                 2 0 1 1 1\n\
                 1 0 4\n\
                 1 1 4\n\
                 2 0 4 1 4\n\
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
    fn refinement_never_returns_something_worse() {
        let start = wave(&[0, 1], &[0, 1]);
        let mut ev = Evaluator::new(CostWeights::default());
        let mut rng = StdRng::seed_from_u64(41);
        let budget = TimeBudget::unlimited();
        let refined = tabu_refine(&start, &mut ev, 10, 100, &budget, &mut rng);
        assert!(refined.cost() <= start.cost());
        assert!(repair::is_covered(&refined));
    }

    #[test]
    fn refinement_finds_a_strict_improvement() {
        // adding order 2 is free coverage-wise and improves the ratio term
        let start = wave(&[0, 1], &[0, 1]);
        let mut ev = Evaluator::new(CostWeights::default());
        let mut rng = StdRng::seed_from_u64(42);
        let budget = TimeBudget::unlimited();
        let refined = tabu_refine(&start, &mut ev, 5, 100, &budget, &mut rng);
        assert!(refined.cost() < start.cost());
        assert!(repair::is_covered(&refined));
    }

    #[test]
    fn memetic_pass_covers_every_elite() {
        let mut archive = EliteArchive::new(3);
        archive.try_insert(&wave(&[0], &[0]));
        archive.try_insert(&wave(&[1], &[1]));
        let mut ev = Evaluator::new(CostWeights::default());
        let mut rng = StdRng::seed_from_u64(43);
        let budget = TimeBudget::unlimited();
        let best = memetic_intensify(&archive, &mut ev, 10, 50, &budget, &mut rng);
        assert!(best.is_some());
        assert!(repair::is_covered(&best.unwrap()));
    }
}
