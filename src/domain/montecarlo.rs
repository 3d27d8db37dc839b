//! Monte Carlo simulation of a fixed-edge trade sequence.
//!
//! Each simulated account compounds `n_trades` independent outcomes: a win
//! multiplies the balance by `1 + reward`, a loss by `1 - risk`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    pub n_trades: usize,
    pub n_simulations: usize,
    pub start_balance: f64,
    pub win_rate: f64,
    pub risk: f64,
    pub reward: f64,
    pub seed: u64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        MonteCarloConfig {
            n_trades: 2000,
            n_simulations: 1000,
            start_balance: 1000.0,
            win_rate: 0.625,
            risk: 0.01,
            reward: 0.02,
            seed: 42,
        }
    }
}

impl MonteCarloConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.n_trades == 0 {
            return Err(EngineError::invalid("montecarlo", "n_trades", "must be at least 1"));
        }
        if self.n_simulations == 0 {
            return Err(EngineError::invalid(
                "montecarlo",
                "n_simulations",
                "must be at least 1",
            ));
        }
        if !(self.start_balance > 0.0 && self.start_balance.is_finite()) {
            return Err(EngineError::invalid(
                "montecarlo",
                "start_balance",
                "must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.win_rate) {
            return Err(EngineError::invalid(
                "montecarlo",
                "win_rate",
                "must be between 0 and 1",
            ));
        }
        if !(0.0..1.0).contains(&self.risk) {
            return Err(EngineError::invalid("montecarlo", "risk", "must be in [0, 1)"));
        }
        if !(self.reward >= 0.0 && self.reward.is_finite()) {
            return Err(EngineError::invalid("montecarlo", "reward", "must be non-negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloSummary {
    pub simulations: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Share of simulations that finished below the starting balance.
    pub losing_share: f64,
}

pub fn simulate(config: &MonteCarloConfig) -> Result<MonteCarloSummary, EngineError> {
    config.validate()?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut finals: Vec<f64> = (0..config.n_simulations)
        .map(|_| run_once(&mut rng, config))
        .collect();
    finals.sort_by(f64::total_cmp);

    let n = finals.len();
    let mean = finals.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 0 {
        (finals[n / 2 - 1] + finals[n / 2]) / 2.0
    } else {
        finals[n / 2]
    };
    let losing = finals.iter().filter(|&&b| b < config.start_balance).count();

    debug!(simulations = n, mean, median, "monte carlo finished");

    Ok(MonteCarloSummary {
        simulations: n,
        mean,
        median,
        min: finals[0],
        max: finals[n - 1],
        losing_share: losing as f64 / n as f64,
    })
}

fn run_once(rng: &mut StdRng, config: &MonteCarloConfig) -> f64 {
    let mut balance = config.start_balance;
    for _ in 0..config.n_trades {
        if rng.gen_bool(config.win_rate) {
            balance *= 1.0 + config.reward;
        } else {
            balance *= 1.0 - config.risk;
        }
    }
    balance
}
