use serde::{Deserialize, Serialize};

use crate::bandit::Strategy;
use crate::eval::CostWeights;

/// Focused Local Search knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FlsConfig {
    pub max_iterations: usize,
    /// per-invocation wall-clock cap, on top of the global budget
    pub timeout_millis: Option<u64>,
    /// stop early once the best cost reaches this
    pub target_cost: Option<f64>,
    pub max_no_improvement: usize,
    pub allow_restart: bool,
    /// patience = patience_factor * (|orders| + |aisles|)
    pub patience_factor: f64,
    pub improvement_epsilon: f64,
}

impl Default for FlsConfig {
    fn default() -> Self {
        FlsConfig {
            max_iterations: 500,
            timeout_millis: Some(2_000),
            target_cost: None,
            max_no_improvement: 60,
            allow_restart: true,
            patience_factor: 0.5,
            improvement_epsilon: 1e-9,
        }
    }
}

/// Bandit knobs of the operator selector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BanditConfig {
    pub strategy: Strategy,
    pub update_frequency: u64,
}

impl Default for BanditConfig {
    fn default() -> Self {
        BanditConfig {
            strategy: Strategy::default(),
            update_frequency: 100,
        }
    }
}

/// The full configuration surface of the solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    pub max_runtime_millis: u64,
    pub max_no_improvement_iterations: usize,
    pub intensification_frequency: usize,
    pub path_relinking_frequency: usize,
    pub elite_update_frequency: usize,
    pub temperature_scale_factor: f64,
    pub elite_size: usize,
    pub tabu_tenure: usize,
    pub tabu_max_iterations: usize,
    pub bandit: BanditConfig,
    pub weights: CostWeights,
    pub fls: FlsConfig,
    /// full cost recompute cadence guarding against float drift
    pub drift_check_frequency: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            max_runtime_millis: 600_000,
            max_no_improvement_iterations: 1000,
            intensification_frequency: 175,
            path_relinking_frequency: 450,
            elite_update_frequency: 40,
            temperature_scale_factor: 0.12,
            elite_size: 5,
            tabu_tenure: 10,
            tabu_max_iterations: 100,
            bandit: BanditConfig::default(),
            weights: CostWeights::default(),
            fls: FlsConfig::default(),
            drift_check_frequency: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let cfg = SolverConfig::default();
        assert_eq!(cfg.max_runtime_millis, 600_000);
        assert_eq!(cfg.max_no_improvement_iterations, 1000);
        assert_eq!(cfg.elite_size, 5);
        assert_eq!(cfg.tabu_tenure, 10);
        assert_eq!(cfg.tabu_max_iterations, 100);
        assert_eq!(cfg.bandit.update_frequency, 100);
        assert_eq!(cfg.weights.p_missing, 1000.0);
        assert_eq!(cfg.weights.c_aisle, 10.0);
        assert_eq!(cfg.weights.w_ratio, 50.0);
        assert!(cfg.drift_check_frequency <= 500);
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = SolverConfig::default();
        let text = serde_json::to_string(&cfg).unwrap();
        let back: SolverConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.intensification_frequency, cfg.intensification_frequency);
        assert_eq!(back.temperature_scale_factor, cfg.temperature_scale_factor);
    }
}
