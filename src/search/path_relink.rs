use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::trace;

use crate::budget::TimeBudget;
use crate::config::FlsConfig;
use crate::eval::Evaluator;
use crate::ops;
use crate::repair;
use crate::search::elite::EliteArchive;
use crate::search::fls::{self, ImprovementMode, NeighborhoodMemo};
use crate::solution::Solution;

/// One step along the path from origin to guide.
#[derive(Debug, Clone, Copy)]
enum RelinkMove {
    AddOrder(usize),
    RemoveOrder(usize),
    AddAisle(usize),
    RemoveAisle(usize),
}

/// The symmetric differences between origin and guide, one move per
/// differing element.
fn difference_moves(origin: &Solution, guide: &Solution) -> Vec<RelinkMove> {
    let mut moves = Vec::new();
    for o in guide.orders().iter() {
        if !origin.contains_order(o) {
            moves.push(RelinkMove::AddOrder(o));
        }
    }
    for o in origin.orders().iter() {
        if !guide.contains_order(o) {
            moves.push(RelinkMove::RemoveOrder(o));
        }
    }
    for a in guide.aisles().iter() {
        if !origin.contains_aisle(a) {
            moves.push(RelinkMove::AddAisle(a));
        }
    }
    for a in origin.aisles().iter() {
        if !guide.contains_aisle(a) {
            moves.push(RelinkMove::RemoveAisle(a));
        }
    }
    moves
}

fn estimate(eval: &Evaluator, sol: &Solution, mv: RelinkMove) -> f64 {
    match mv {
        RelinkMove::AddOrder(o) => eval.compute_delta_add_order(sol, o),
        RelinkMove::RemoveOrder(o) => eval.compute_delta_remove_order(sol, o),
        RelinkMove::AddAisle(a) => eval.compute_delta_add_aisle(sol, a),
        RelinkMove::RemoveAisle(a) => eval.compute_delta_remove_aisle(sol, a),
    }
}

fn commit(sol: &mut Solution, eval: &Evaluator, mv: RelinkMove) {
    match mv {
        RelinkMove::AddOrder(o) => ops::commit_add_order(sol, eval, o),
        RelinkMove::RemoveOrder(o) => {
            ops::commit_remove_order(sol, eval, o);
        }
        RelinkMove::AddAisle(a) => ops::commit_add_aisle(sol, eval, a),
        RelinkMove::RemoveAisle(a) => ops::commit_remove_aisle(sol, eval, a),
    }
}

/// Walk from `origin` towards `guide`, applying the differing elements one
/// move at a time. Moves are ranked by estimated delta against the origin
/// (best first) with the trailing 75% shuffled; the best solution seen along
/// the path is returned. With `refine` set, every improvement point gets a
/// quick first-improvement descent.
pub fn path_relink(
    origin: &Solution,
    guide: &Solution,
    eval: &mut Evaluator,
    budget: &TimeBudget,
    rng: &mut StdRng,
    refine: bool,
) -> Option<Solution> {
    let mut moves = difference_moves(origin, guide);
    if moves.is_empty() {
        return None;
    }

    let probe = origin.clone();
    let mut ranked: Vec<(RelinkMove, f64)> = moves
        .drain(..)
        .map(|mv| {
            let d = estimate(eval, &probe, mv);
            (mv, d)
        })
        .collect();
    ranked.sort_by_key(|&(_, d)| OrderedFloat(d));

    // keep the strongest quarter in order, shuffle the rest
    let head = ranked.len().div_ceil(4);
    ranked[head..].shuffle(rng);

    let mut working = origin.clone();
    let mut best = origin.clone();
    let mut memo = NeighborhoodMemo::new();
    let refine_cfg = FlsConfig {
        max_iterations: 30,
        timeout_millis: Some(100),
        allow_restart: false,
        ..FlsConfig::default()
    };

    for (mv, _) in ranked {
        if budget.expired() {
            break;
        }
        commit(&mut working, eval, mv);
        if working.uncovered_chosen() > 0 {
            repair::repair(&mut working, eval);
        }
        if working.cost() < best.cost() {
            if refine {
                fls::focused_local_search(
                    &mut working,
                    eval,
                    &refine_cfg,
                    ImprovementMode::First,
                    budget,
                    &mut memo,
                    rng,
                );
            }
            best.clone_from(&working);
        }
    }

    trace!(origin = origin.cost(), best = best.cost(), "path relinking done");
    (best.cost() < origin.cost()).then_some(best)
}

/// Relink every elite pair in both directions, feeding improving results
/// back into the archive. Returns the best solution produced, if any.
pub fn elite_relinking(
    archive: &mut EliteArchive,
    eval: &mut Evaluator,
    budget: &TimeBudget,
    rng: &mut StdRng,
) -> Option<Solution> {
    if archive.len() < 2 {
        return None;
    }
    let elites: Vec<Solution> = archive.solutions().to_vec();
    let mut best: Option<Solution> = None;

    for i in 0..elites.len() {
        for j in (i + 1)..elites.len() {
            if budget.expired() {
                break;
            }
            for (origin, guide) in [(&elites[i], &elites[j]), (&elites[j], &elites[i])] {
                let Some(found) = path_relink(origin, guide, eval, budget, rng, false) else {
                    continue;
                };
                archive.try_insert(&found);
                if best.as_ref().is_none_or(|b| found.cost() < b.cost()) {
                    best = Some(found);
                }
            }
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
        // aisle 2 covers both items on its own
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
    fn relinking_finds_intermediate_improvements() {
        let origin = wave(&[0, 1], &[0, 1]);
        let guide = wave(&[0, 1, 2], &[2]);
        let mut ev = Evaluator::new(CostWeights::default());
        let mut rng = StdRng::seed_from_u64(31);
        let budget = TimeBudget::unlimited();

        let found = path_relink(&origin, &guide, &mut ev, &budget, &mut rng, false);
        let found = found.expect("path to a cheaper wave exists");
        assert!(found.cost() < origin.cost());
        assert!(repair::is_covered(&found));
    }

    #[test]
    fn identical_endpoints_yield_nothing() {
        let origin = wave(&[0], &[0]);
        let guide = wave(&[0], &[0]);
        let mut ev = Evaluator::new(CostWeights::default());
        let mut rng = StdRng::seed_from_u64(32);
        let budget = TimeBudget::unlimited();
        assert!(path_relink(&origin, &guide, &mut ev, &budget, &mut rng, false).is_none());
    }

    #[test]
    fn elite_relinking_feeds_the_archive() {
        let mut archive = EliteArchive::new(5);
        assert!(archive.try_insert(&wave(&[0, 1], &[0, 1])));
        assert!(archive.try_insert(&wave(&[0, 1, 2], &[0, 1, 2])));
        let before = archive.best().unwrap().cost();

        let mut ev = Evaluator::new(CostWeights::default());
        let mut rng = StdRng::seed_from_u64(33);
        let budget = TimeBudget::unlimited();
        if let Some(best) = elite_relinking(&mut archive, &mut ev, &budget, &mut rng) {
            assert!(best.cost() <= before);
        }
        assert!(archive.len() >= 2);
    }
}
