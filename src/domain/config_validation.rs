//! Configuration loading and validation.
//!
//! Every key is optional and falls back to its default, but a key that is
//! present must parse and pass validation before anything runs.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::domain::broker::CommissionSchedule;
use crate::domain::error::EngineError;
use crate::domain::ingest::{DataConfig, FetchRequest, PaginationConfig, RetryPolicy, Timeframe};
use crate::domain::montecarlo::MonteCarloConfig;
use crate::domain::strategy::StrategyConfig;
use crate::ports::config_port::ConfigPort;

const KNOWN_SECTIONS: [&str; 4] = ["strategy", "backtest", "data", "montecarlo"];

/// Check every section without running anything. Unknown sections are
/// reported but not rejected.
pub fn validate_config(config: &dyn ConfigPort) -> Result<(), EngineError> {
    for section in unknown_sections(config) {
        warn!(section = %section, "ignoring unknown config section");
    }
    load_strategy_config(config)?;
    load_data_config(config)?;
    load_montecarlo_config(config)?;
    Ok(())
}

/// Sections present in `config` that nothing reads.
pub fn unknown_sections(config: &dyn ConfigPort) -> Vec<String> {
    let mut unknown: Vec<String> = config
        .sections()
        .into_iter()
        .filter(|s| !KNOWN_SECTIONS.contains(&s.as_str()))
        .collect();
    unknown.sort();
    unknown
}

pub fn load_strategy_config(config: &dyn ConfigPort) -> Result<StrategyConfig, EngineError> {
    let d = StrategyConfig::default();
    let strategy = StrategyConfig {
        fast_period: read(config, "strategy", "fast_period", d.fast_period)?,
        slow_period: read(config, "strategy", "slow_period", d.slow_period)?,
        rsi_period: read(config, "strategy", "rsi_period", d.rsi_period)?,
        rsi_oversold_threshold: read(
            config,
            "strategy",
            "rsi_oversold_threshold",
            d.rsi_oversold_threshold,
        )?,
        risk_fraction: read(config, "strategy", "risk_fraction", d.risk_fraction)?,
        reward_multiple: read(config, "strategy", "reward_multiple", d.reward_multiple)?,
        lookback: read(config, "strategy", "lookback", d.lookback)?,
        starting_cash: read(config, "backtest", "starting_cash", d.starting_cash)?,
        commission_rate: read(config, "backtest", "commission_rate", d.commission_rate)?,
        commission: commission_schedule(config)?,
    };
    strategy.validate()?;
    Ok(strategy)
}

fn commission_schedule(config: &dyn ConfigPort) -> Result<CommissionSchedule, EngineError> {
    let model = config.get_string("backtest", "commission_model");
    match model.as_deref().map(str::trim) {
        None | Some("price_move") => Ok(CommissionSchedule::PriceMove),
        Some("notional") => Ok(CommissionSchedule::Notional),
        Some("flat") => {
            if config.get_string("backtest", "commission_flat").is_none() {
                return Err(EngineError::ConfigMissing {
                    section: "backtest".to_string(),
                    key: "commission_flat".to_string(),
                });
            }
            Ok(CommissionSchedule::Flat {
                per_trade: read(config, "backtest", "commission_flat", 0.0)?,
            })
        }
        Some(other) => Err(EngineError::invalid(
            "backtest",
            "commission_model",
            format!("unknown model '{other}', expected price_move, notional or flat"),
        )),
    }
}

pub fn load_data_config(config: &dyn ConfigPort) -> Result<DataConfig, EngineError> {
    let d = DataConfig::default();

    let symbol = match config.get_string("data", "symbol") {
        Some(s) if s.trim().is_empty() => {
            return Err(EngineError::invalid("data", "symbol", "must not be empty"));
        }
        Some(s) => s.trim().to_string(),
        None => d.request.symbol,
    };
    let timeframe = match config.get_string("data", "timeframe") {
        Some(s) => Timeframe::parse(&s)?,
        None => d.request.timeframe,
    };
    let limit: usize = read(config, "data", "limit", d.request.limit)?;
    if limit == 0 {
        return Err(EngineError::invalid("data", "limit", "must be at least 1"));
    }
    let since = match config.get_string("data", "since") {
        Some(_) => Some(read::<i64>(config, "data", "since", 0)?),
        None => None,
    };

    let max_per_request: usize = read(
        config,
        "data",
        "max_per_request",
        d.pagination.max_per_request,
    )?;
    if max_per_request == 0 {
        return Err(EngineError::invalid(
            "data",
            "max_per_request",
            "must be at least 1",
        ));
    }
    let page_delay_ms: u64 = read(
        config,
        "data",
        "page_delay_ms",
        d.pagination.page_delay.as_millis() as u64,
    )?;
    let max_retries: u32 = read(config, "data", "max_retries", d.retry.max_retries)?;
    let retry_base_delay_ms: u64 = read(
        config,
        "data",
        "retry_base_delay_ms",
        d.retry.base_delay.as_millis() as u64,
    )?;
    let dir = config
        .get_string("data", "dir")
        .map(PathBuf::from)
        .unwrap_or(d.dir);

    Ok(DataConfig {
        request: FetchRequest {
            symbol,
            timeframe,
            limit,
            since,
        },
        dir,
        pagination: PaginationConfig {
            max_per_request,
            page_delay: Duration::from_millis(page_delay_ms),
        },
        retry: RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(retry_base_delay_ms),
        },
    })
}

pub fn load_montecarlo_config(config: &dyn ConfigPort) -> Result<MonteCarloConfig, EngineError> {
    let d = MonteCarloConfig::default();
    let mc = MonteCarloConfig {
        n_trades: read(config, "montecarlo", "n_trades", d.n_trades)?,
        n_simulations: read(config, "montecarlo", "n_simulations", d.n_simulations)?,
        start_balance: read(config, "montecarlo", "start_balance", d.start_balance)?,
        win_rate: read(config, "montecarlo", "win_rate", d.win_rate)?,
        risk: read(config, "montecarlo", "risk", d.risk)?,
        reward: read(config, "montecarlo", "reward", d.reward)?,
        seed: read(config, "montecarlo", "seed", d.seed)?,
    };
    mc.validate()?;
    Ok(mc)
}

/// Parse `[section] key`, or return `default` when the key is absent.
fn read<T>(config: &dyn ConfigPort, section: &str, key: &str, default: T) -> Result<T, EngineError>
where
    T: FromStr,
{
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| EngineError::invalid(section, key, format!("cannot parse '{}'", raw.trim()))),
    }
}
