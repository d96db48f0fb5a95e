use std::sync::Arc;

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, info};

use crate::bandit::Selector;
use crate::budget::TimeBudget;
use crate::config::SolverConfig;
use crate::construct;
use crate::eval::Evaluator;
use crate::instance::Instance;
use crate::ops::{self, Move};
use crate::repair;
use crate::search::{
    EliteArchive, ImprovementMode, NeighborhoodMemo, elite_relinking, focused_local_search,
    memetic_intensify,
};
use crate::solution::Solution;

pub mod stats {
    use serde::Serialize;

    use crate::bandit::OpSnapshot;

    /// Driver-owned counters, returned next to the best solution. No global
    /// state: everything a run learns about itself lives here.
    #[derive(Debug, Default, Serialize)]
    pub struct SolveStats {
        pub iterations: usize,
        pub accepted: usize,
        pub rejected: usize,
        /// (iteration, new best surrogate cost)
        pub improvements: Vec<(usize, f64)>,
        /// iterations at which a strong perturbation fired
        pub restarts: Vec<usize>,
        pub repair_failures: usize,
        pub evicted_orders: usize,
        pub intensifications: usize,
        pub relink_rounds: usize,
        pub tabu_rounds: usize,
        pub drift_checks: usize,
        pub operators: Vec<OpSnapshot>,
        pub best_cost: f64,
        pub best_objective: f64,
    }

    impl SolveStats {
        pub fn on_improvement(&mut self, iter: usize, cost: f64) {
            self.improvements.push((iter, cost));
        }

        pub fn on_restart(&mut self, iter: usize) {
            self.restarts.push(iter);
        }
    }
}

use stats::SolveStats;

/// Adaptive simulated annealing over the operator roster: bandit-selected
/// moves, Metropolis acceptance, and scheduled intensification phases pulling
/// from a shared elite archive. Runs until the time oracle expires or the
/// stagnation ceiling is hit; returns the best wave observed (preferring
/// solutions that pass the final feasibility gate) plus the run statistics.
pub fn solve(
    instance: &Arc<Instance>,
    config: &SolverConfig,
    budget: &TimeBudget,
    seed: u64,
) -> Result<(Solution, SolveStats), String> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut eval = Evaluator::new(config.weights);
    let selector = Selector::new(
        Move::roster(),
        config.bandit.strategy,
        config.bandit.update_frequency,
    );
    let mut archive = EliteArchive::new(config.elite_size);
    let mut memo = NeighborhoodMemo::new();
    let mut stats = SolveStats::default();

    let mut current = construct::construct_or_fallback(instance, &eval, &mut rng)?;
    let mut best = current.clone();
    let mut best_feasible: Option<Solution> =
        repair::final_feasible(&current).then(|| current.clone());
    let mut backup = current.clone();

    let max_no_improve = config.max_no_improvement_iterations.max(1);
    let mut no_improve = 0usize;
    let mut stagnation_steps = 0usize;
    let mut iter = 0usize;

    info!(
        orders = instance.num_orders(),
        aisles = instance.num_aisles(),
        start_cost = current.cost(),
        "solver started"
    );

    while !budget.expired() && no_improve < max_no_improve {
        iter += 1;
        stats.iterations = iter;
        backup.clone_from(&current);

        // 1. bandit-selected operator application
        let op_idx = selector.select(&mut rng);
        let delta = selector.roster()[op_idx].apply(&mut current, &mut eval, &mut rng);

        // a failed in-operator repair leaves uncovered orders behind
        if current.uncovered_chosen() > 0 {
            stats.repair_failures += 1;
            stats.evicted_orders += repair::remove_infeasible_orders(&mut current, &eval);
            repair::repair(&mut current, &eval);
            eval.evaluate_full(&mut current);
        }

        // 2. Metropolis-like acceptance
        let accepted = if delta <= 0.0 {
            true
        } else {
            let denom = current.cost().abs().max(1e-9) * config.temperature_scale_factor;
            rng.random_bool((-delta / denom).exp().clamp(0.0, 1.0))
        };
        if accepted {
            stats.accepted += 1;
        } else {
            stats.rejected += 1;
            current.clone_from(&backup);
        }

        // 3. selector feedback
        selector.feedback(op_idx, delta, accepted);

        let mut progressed = accepted && delta < -1e-9;

        // 4. elite archive refresh
        if iter % config.elite_update_frequency == 0 {
            archive.try_insert(&current);
            archive.try_insert(&best);
        }

        // 5. focused local search, deeper the longer the drought
        if iter % config.intensification_frequency == 0 || no_improve > max_no_improve / 2 {
            stats.intensifications += 1;
            let mode = if no_improve > (3 * max_no_improve) / 4 {
                ImprovementMode::Best
            } else {
                ImprovementMode::First
            };
            backup.clone_from(&current);
            let fls_delta = focused_local_search(
                &mut current,
                &mut eval,
                &config.fls,
                mode,
                budget,
                &mut memo,
                &mut rng,
            );
            if current.cost() > backup.cost() + 1e-9 {
                current.clone_from(&backup);
            } else if fls_delta < -1e-9 {
                progressed = true;
            }
        }

        // 6. elite path relinking
        #[allow(clippy::cast_precision_loss)]
        if (iter % config.path_relinking_frequency == 0
            || no_improve as f64 > 0.7 * max_no_improve as f64)
            && archive.len() >= 2
        {
            stats.relink_rounds += 1;
            if let Some(found) = elite_relinking(&mut archive, &mut eval, budget, &mut rng) {
                if found.cost() < current.cost() {
                    current.clone_from(&found);
                    progressed = true;
                }
            }
        }

        // 7. memetic tabu intensification
        #[allow(clippy::cast_precision_loss)]
        if no_improve as f64 > 0.8 * max_no_improve as f64 && !archive.is_empty() {
            stats.tabu_rounds += 1;
            if let Some(found) = memetic_intensify(
                &archive,
                &mut eval,
                config.tabu_tenure,
                config.tabu_max_iterations,
                budget,
                &mut rng,
            ) {
                archive.try_insert(&found);
                if found.cost() < current.cost() {
                    current.clone_from(&found);
                    progressed = true;
                }
            }
        }

        // 8. global best bookkeeping
        if current.cost() + 1e-9 < best.cost() {
            best.clone_from(&current);
            no_improve = 0;
            stats.on_improvement(iter, best.cost());
            debug!(iter, cost = best.cost(), "new best surrogate cost");
        } else if !progressed {
            // 9. stagnation ladder: strong perturbation every 100 dry steps
            no_improve += 1;
            stagnation_steps += 1;
            if stagnation_steps % 100 == 0 {
                ops::strong_perturbation(&mut current, &mut eval, &mut rng);
                eval.evaluate_full(&mut current);
                stats.on_restart(iter);
                debug!(iter, cost = current.cost(), "strong perturbation");
            }
        }

        if repair::final_feasible(&current) {
            let improves = best_feasible
                .as_ref()
                .is_none_or(|b| current.objective() > b.objective() + 1e-12);
            if improves {
                match best_feasible.as_mut() {
                    Some(b) => b.clone_from(&current),
                    None => best_feasible = Some(current.clone()),
                }
            }
        }

        // periodic full recompute against float drift
        if iter % config.drift_check_frequency == 0 {
            stats.drift_checks += 1;
            eval.evaluate_full(&mut current);
        }
    }

    let result = match best_feasible {
        Some(sol) => sol,
        None => best,
    };
    stats.best_cost = result.cost();
    stats.best_objective = result.objective();
    stats.operators = selector.snapshot();

    info!(
        iterations = stats.iterations,
        objective = stats.best_objective,
        "solver finished"
    );
    Ok((result, stats))
}
