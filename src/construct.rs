use std::cmp::Reverse;
use std::sync::Arc;

use ordered_float::OrderedFloat;
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand_distr::{Distribution, Normal};

use crate::eval::Evaluator;
use crate::instance::Instance;
use crate::repair;
use crate::solution::Solution;

/// Random initial wave: choose a uniform 20-50% slice of the orders, cover
/// them greedily, evaluate. Fails when the chosen orders cannot be covered.
pub fn random_wave(
    instance: &Arc<Instance>,
    eval: &Evaluator,
    rng: &mut StdRng,
) -> Result<Solution, String> {
    let n = instance.num_orders();
    if n == 0 {
        return Err("instance has no orders".to_string());
    }
    let frac = rng.random_range(0.2..0.5);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let take = ((n as f64 * frac) as usize).clamp(1, n);

    let mut order_ids: Vec<usize> = (0..n).collect();
    order_ids.shuffle(rng);
    order_ids.truncate(take);

    let mut sol = Solution::new(instance.clone(), order_ids, []);
    sol.set_cost(eval.evaluate(&sol));
    if !repair::repair(&mut sol, eval) {
        return Err("could not cover the sampled orders".to_string());
    }
    Ok(sol)
}

/// Greedy constructor: rank orders by demanded units per candidate aisle,
/// jittered with Gaussian noise so repeated attempts diverge, and keep the
/// top third. Covered greedily afterwards.
pub fn ratio_greedy(
    instance: &Arc<Instance>,
    eval: &Evaluator,
    rng: &mut StdRng,
) -> Result<Solution, String> {
    let n = instance.num_orders();
    if n == 0 {
        return Err("instance has no orders".to_string());
    }
    let adj = instance.adjacency();
    let normal = Normal::<f64>::new(1.0, 0.25).unwrap();

    let mut scored: Vec<(usize, f64)> = (0..n)
        .map(|o| {
            #[allow(clippy::cast_precision_loss)]
            let base =
                instance.order_units[o] as f64 / (1.0 + adj.order_aisles[o].len() as f64);
            (o, base * normal.sample(rng).max(0.05f64))
        })
        .collect();
    scored.sort_by_key(|&(_, s)| Reverse(OrderedFloat(s)));

    let take = (n / 3).max(1);
    let chosen = scored.into_iter().take(take).map(|(o, _)| o);

    let mut sol = Solution::new(instance.clone(), chosen, []);
    sol.set_cost(eval.evaluate(&sol));
    if !repair::repair(&mut sol, eval) {
        return Err("could not cover the ranked orders".to_string());
    }
    Ok(sol)
}

/// Constructor chain: a few random waves, then the greedy constructor,
/// finally a single random order. Uncoverable orders are evicted on the last
/// resort so the chain only fails on degenerate instances.
pub fn construct_or_fallback(
    instance: &Arc<Instance>,
    eval: &Evaluator,
    rng: &mut StdRng,
) -> Result<Solution, String> {
    for _ in 0..20 {
        if let Ok(sol) = random_wave(instance, eval, rng) {
            return Ok(sol);
        }
    }
    for _ in 0..5 {
        if let Ok(sol) = ratio_greedy(instance, eval, rng) {
            return Ok(sol);
        }
    }

    if instance.num_orders() == 0 {
        return Err("instance has no orders".to_string());
    }
    let o = rng.random_range(0..instance.num_orders());
    let mut sol = Solution::new(instance.clone(), [o], []);
    sol.set_cost(eval.evaluate(&sol));
    if !repair::repair(&mut sol, eval) {
        repair::remove_infeasible_orders(&mut sol, eval);
        if sol.orders().is_empty() || !repair::repair(&mut sol, eval) {
            return Err("no coverable order exists".to_string());
        }
    }
    Ok(sol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::CostWeights;
    use rand::SeedableRng;

    fn instance() -> Arc<Instance> {
        Arc::new(
            Instance::parse(
                "5 3 3\n\
                 1 0 2\n\
                 1 1 2\n\
                 1 2 2\n\
                 2 0 1 1 1\n\
                 2 1 1 2 1\n\
                 2 0 9 1 9\n\
                 2 1 9 2 9\n\
                 1 2 9\n\
                 0 100\n",
            )
            .unwrap(),
        )
    }

    #[test]
    fn random_wave_is_covered_and_sized() {
        let inst = instance();
        let ev = Evaluator::new(CostWeights::default());
        let mut rng = StdRng::seed_from_u64(11);
        let sol = random_wave(&inst, &ev, &mut rng).unwrap();
        assert!(!sol.orders().is_empty());
        assert!(sol.orders().len() <= inst.num_orders() / 2 + 1);
        assert!(repair::is_covered(&sol));
        assert!(sol.cached_cost().is_some());
    }

    #[test]
    fn ratio_greedy_is_covered() {
        let inst = instance();
        let ev = Evaluator::new(CostWeights::default());
        let mut rng = StdRng::seed_from_u64(12);
        let sol = ratio_greedy(&inst, &ev, &mut rng).unwrap();
        assert!(repair::is_covered(&sol));
    }

    #[test]
    fn fallback_chain_always_produces_a_wave() {
        let inst = instance();
        let ev = Evaluator::new(CostWeights::default());
        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let sol = construct_or_fallback(&inst, &ev, &mut rng).unwrap();
            assert!(repair::is_covered(&sol));
        }
    }
}
