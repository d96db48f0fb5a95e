use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ops::Move;

const SCORE_DECAY: f64 = 0.95;

/// Bandit selection rule over the operator roster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Strategy {
    Ucb1 { c: f64 },
    EpsilonGreedy { epsilon: f64 },
    Roulette,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Ucb1 {
            c: std::f64::consts::SQRT_2,
        }
    }
}

/// Per-operator counters. Plain counters are atomic so a parallel batch scan
/// can feed back without locking; the floating accumulators use CAS loops
/// over their bit patterns.
struct OpStats {
    uses: AtomicU64,
    successes: AtomicU64,
    sum_reward: AtomicU64,
    score: AtomicU64,
}

impl OpStats {
    fn new() -> Self {
        OpStats {
            uses: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            sum_reward: AtomicU64::new(0f64.to_bits()),
            score: AtomicU64::new(0f64.to_bits()),
        }
    }

    fn load_f64(cell: &AtomicU64) -> f64 {
        f64::from_bits(cell.load(Ordering::Relaxed))
    }

    fn fetch_add_f64(cell: &AtomicU64, add: f64) {
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + add).to_bits();
            match cell.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return,
                Err(seen) => current = seen,
            }
        }
    }

    fn decay_and_credit(cell: &AtomicU64, reward: f64) {
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) * SCORE_DECAY + reward).to_bits();
            match cell.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return,
                Err(seen) => current = seen,
            }
        }
    }

    fn mean_reward(&self) -> f64 {
        let uses = self.uses.load(Ordering::Relaxed);
        if uses == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            Self::load_f64(&self.sum_reward) / uses as f64
        }
    }
}

/// Read-only view of one operator's statistics.
#[derive(Debug, Clone, Serialize)]
pub struct OpSnapshot {
    pub name: &'static str,
    pub uses: u64,
    pub successes: u64,
    pub sum_reward: f64,
    pub score: f64,
    pub selection_probability: f64,
}

/// Adaptive operator selector: a multi-armed bandit over the move roster.
/// Selection reads the shared probability vector under a read lock; the
/// periodic weight refresh is the only writer.
pub struct Selector {
    roster: Vec<Move>,
    stats: Vec<OpStats>,
    strategy: Strategy,
    update_frequency: u64,
    feedbacks: AtomicU64,
    probabilities: RwLock<Vec<f64>>,
}

impl Selector {
    pub fn new(roster: Vec<Move>, strategy: Strategy, update_frequency: u64) -> Self {
        let n = roster.len();
        assert!(n > 0, "selector needs at least one operator");
        let stats = (0..n).map(|_| OpStats::new()).collect();
        #[allow(clippy::cast_precision_loss)]
        let uniform = vec![1.0 / n as f64; n];
        Selector {
            roster,
            stats,
            strategy,
            update_frequency: update_frequency.max(1),
            feedbacks: AtomicU64::new(0),
            probabilities: RwLock::new(uniform),
        }
    }

    pub fn roster(&self) -> &[Move] {
        &self.roster
    }

    pub fn total_feedbacks(&self) -> u64 {
        self.feedbacks.load(Ordering::Relaxed)
    }

    /// Pick an operator index according to the configured strategy.
    pub fn select(&self, rng: &mut StdRng) -> usize {
        match self.strategy {
            Strategy::Ucb1 { c } => self.select_ucb1(c),
            Strategy::EpsilonGreedy { epsilon } => self.select_epsilon(epsilon, rng),
            Strategy::Roulette => self.select_roulette(rng),
        }
    }

    fn select_ucb1(&self, c: f64) -> usize {
        // every arm gets pulled once before scoring kicks in
        if let Some(idx) = self
            .stats
            .iter()
            .position(|s| s.uses.load(Ordering::Relaxed) == 0)
        {
            return idx;
        }
        #[allow(clippy::cast_precision_loss)]
        let total = self
            .stats
            .iter()
            .map(|s| s.uses.load(Ordering::Relaxed))
            .sum::<u64>() as f64;

        let mut best = 0;
        let mut best_value = f64::NEG_INFINITY;
        for (i, s) in self.stats.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let uses = s.uses.load(Ordering::Relaxed) as f64;
            let value = s.mean_reward() + c * (total.ln() / uses).sqrt();
            if value > best_value {
                best_value = value;
                best = i;
            }
        }
        best
    }

    fn select_epsilon(&self, epsilon: f64, rng: &mut StdRng) -> usize {
        if rng.random_bool(epsilon.clamp(0.0, 1.0)) {
            return rng.random_range(0..self.roster.len());
        }
        let mut best = 0;
        let mut best_mean = f64::NEG_INFINITY;
        for (i, s) in self.stats.iter().enumerate() {
            let mean = s.mean_reward();
            if mean > best_mean {
                best_mean = mean;
                best = i;
            }
        }
        best
    }

    fn select_roulette(&self, rng: &mut StdRng) -> usize {
        let probs = self.probabilities.read().unwrap();
        let draw: f64 = rng.random_range(0.0..1.0);
        let mut acc = 0.0;
        for (i, &p) in probs.iter().enumerate() {
            acc += p;
            if draw < acc {
                return i;
            }
        }
        probs.len() - 1
    }

    /// Credit the operator for an application. An improving delta earns the
    /// full reward, a merely accepted move a small one; everything else only
    /// counts as a use. Triggers a weight refresh every `update_frequency`
    /// feedbacks.
    pub fn feedback(&self, idx: usize, delta: f64, accepted: bool) {
        let s = &self.stats[idx];
        s.uses.fetch_add(1, Ordering::Relaxed);
        if delta < 0.0 || accepted {
            s.successes.fetch_add(1, Ordering::Relaxed);
            let reward = if delta < 0.0 { 1.0 } else { 0.1 };
            OpStats::fetch_add_f64(&s.sum_reward, reward);
            OpStats::decay_and_credit(&s.score, reward);
        }

        let n = self.feedbacks.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.update_frequency == 0 {
            self.update_weights();
        }
    }

    /// Recompute the selection probability vector from mean rewards, shifted
    /// so the minimum sits at zero; uniform when nothing has earned reward.
    pub fn update_weights(&self) {
        let means: Vec<f64> = self.stats.iter().map(OpStats::mean_reward).collect();
        let min = means.iter().copied().fold(f64::INFINITY, f64::min);
        let shifted: Vec<f64> = means.iter().map(|m| m - min).collect();
        let total: f64 = shifted.iter().sum();

        let mut probs = self.probabilities.write().unwrap();
        if total <= f64::EPSILON {
            #[allow(clippy::cast_precision_loss)]
            let uniform = 1.0 / self.roster.len() as f64;
            probs.iter_mut().for_each(|p| *p = uniform);
        } else {
            for (p, w) in probs.iter_mut().zip(shifted.iter()) {
                *p = w / total;
            }
        }
        drop(probs);

        debug!(
            feedbacks = self.total_feedbacks(),
            "refreshed operator weights"
        );
    }

    pub fn snapshot(&self) -> Vec<OpSnapshot> {
        let probs = self.probabilities.read().unwrap();
        self.roster
            .iter()
            .zip(self.stats.iter())
            .zip(probs.iter())
            .map(|((op, s), &p)| OpSnapshot {
                name: op.name(),
                uses: s.uses.load(Ordering::Relaxed),
                successes: s.successes.load(Ordering::Relaxed),
                sum_reward: OpStats::load_f64(&s.sum_reward),
                score: OpStats::load_f64(&s.score),
                selection_probability: p,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn selector(strategy: Strategy) -> Selector {
        Selector::new(Move::roster(), strategy, 100)
    }

    #[test]
    fn uses_account_for_every_feedback() {
        let sel = selector(Strategy::default());
        let mut rng = StdRng::seed_from_u64(1);
        for i in 0..250 {
            let idx = sel.select(&mut rng);
            sel.feedback(idx, if i % 3 == 0 { -1.0 } else { 0.5 }, i % 2 == 0);
        }
        let total: u64 = sel.snapshot().iter().map(|s| s.uses).sum();
        assert_eq!(total, 250);
        assert_eq!(sel.total_feedbacks(), 250);
    }

    #[test]
    fn probabilities_form_a_distribution() {
        let sel = selector(Strategy::Roulette);
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..300 {
            let idx = sel.select(&mut rng);
            sel.feedback(idx, rng.random_range(-1.0..1.0), rng.random_bool(0.5));
        }
        sel.update_weights();
        let snap = sel.snapshot();
        let sum: f64 = snap.iter().map(|s| s.selection_probability).sum();
        assert!((sum - 1.0).abs() <= 1e-9);
        assert!(snap.iter().all(|s| s.selection_probability >= 0.0));
    }

    #[test]
    fn ucb1_tries_every_arm_first() {
        let sel = selector(Strategy::default());
        let mut rng = StdRng::seed_from_u64(3);
        let n = sel.roster().len();
        for _ in 0..n {
            let idx = sel.select(&mut rng);
            sel.feedback(idx, 0.0, false);
        }
        assert!(sel.snapshot().iter().all(|s| s.uses == 1));
    }

    #[test]
    fn ucb1_converges_on_the_winning_operator() {
        // operator 0 always improves; the rest never do
        let sel = selector(Strategy::default());
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..1000 {
            let idx = sel.select(&mut rng);
            let delta = if idx == 0 { -1.0 } else { 0.0 };
            sel.feedback(idx, delta, false);
        }
        let snap = sel.snapshot();
        let winner_share = snap[0].uses as f64 / 1000.0;
        assert!(
            winner_share > 0.8,
            "winning operator only selected {winner_share:.2} of the time"
        );
    }

    #[test]
    fn epsilon_greedy_exploits_the_best_mean() {
        let sel = selector(Strategy::EpsilonGreedy { epsilon: 0.1 });
        let mut rng = StdRng::seed_from_u64(5);
        // prime arm 2 with strong rewards
        for _ in 0..10 {
            sel.feedback(2, -1.0, true);
        }
        let mut hits = 0;
        for _ in 0..200 {
            if sel.select(&mut rng) == 2 {
                hits += 1;
            }
        }
        assert!(hits > 150);
    }

    #[test]
    fn roulette_falls_back_to_uniform_without_reward() {
        let sel = selector(Strategy::Roulette);
        sel.update_weights();
        let snap = sel.snapshot();
        let expected = 1.0 / snap.len() as f64;
        assert!(snap
            .iter()
            .all(|s| (s.selection_probability - expected).abs() <= 1e-9));
    }

    #[test]
    fn score_decays_on_each_credit() {
        let sel = selector(Strategy::default());
        sel.feedback(0, -1.0, true);
        sel.feedback(0, -1.0, true);
        let snap = sel.snapshot();
        // 1.0 * 0.95 + 1.0
        assert!((snap[0].score - 1.95).abs() <= 1e-9);
        assert_eq!(snap[0].successes, 2);
    }
}
