use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ordered_float::OrderedFloat;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use wave_picking::bandit::Strategy;
use wave_picking::budget::TimeBudget;
use wave_picking::config::SolverConfig;
use wave_picking::driver;
use wave_picking::instance::Instance;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Ucb1,
    EpsilonGreedy,
    Roulette,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Ucb1 => Strategy::Ucb1 {
                c: std::f64::consts::SQRT_2,
            },
            StrategyArg::EpsilonGreedy => Strategy::EpsilonGreedy { epsilon: 0.1 },
            StrategyArg::Roulette => Strategy::Roulette,
        }
    }
}

/// Wave-picking solver: maximizes picked units per visited aisle.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// instance file (whitespace-tokenized)
    instance: PathBuf,

    /// wall-clock limit in milliseconds
    #[arg(long)]
    time_limit_ms: Option<u64>,

    /// solver threads racing with distinct seeds (default: all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// base RNG seed
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// bandit strategy for operator selection
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// write the best wave to this file
    #[arg(long)]
    output: Option<PathBuf>,

    /// print run statistics of the winning thread
    #[arg(long)]
    stats: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = SolverConfig::default();
    if let Some(ms) = cli.time_limit_ms {
        config.max_runtime_millis = ms;
    }
    if let Some(strategy) = cli.strategy {
        config.bandit.strategy = strategy.into();
    }

    let instance = Arc::new(
        Instance::from_path(&cli.instance)
            .with_context(|| format!("reading {}", cli.instance.display()))?,
    );

    let start = Instant::now();
    let threads = cli.threads.unwrap_or_else(num_cpus::get).max(1);
    println!("Running {threads} threads...");

    let mut join_handles = Vec::new();
    for i in 0..threads {
        let instance = instance.clone();
        let config = config.clone();
        let seed = cli.seed.wrapping_add(i as u64);
        join_handles.push(thread::spawn(move || {
            let budget = TimeBudget::new(Duration::from_millis(config.max_runtime_millis));
            driver::solve(&instance, &config, &budget, seed)
        }));
    }

    let runs: Vec<_> = join_handles
        .into_iter()
        .map(|h| h.join().expect("solver thread panicked"))
        .collect::<std::result::Result<_, _>>()
        .map_err(anyhow::Error::msg)?;

    let (best_sol, best_stats) = runs
        .into_iter()
        .max_by_key(|(sol, _)| OrderedFloat(sol.objective()))
        .expect("at least one solver thread ran");

    let duration = start.elapsed();
    let file_name = cli
        .instance
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let output = json!({
        "Instance": file_name,
        "Time": (duration.as_secs_f64() * 100.0).round() / 100.0,
        "Result": (best_sol.objective() * 100.0).round() / 100.0,
        "Solution": best_sol.to_report_string(),
    });
    println!("{}", serde_json::to_string(&output)?);

    if cli.stats {
        println!("{}", serde_json::to_string_pretty(&best_stats)?);
    }

    if let Some(path) = cli.output {
        std::fs::write(&path, best_sol.to_file_string())
            .with_context(|| format!("writing {}", path.display()))?;
    }

    Ok(())
}
