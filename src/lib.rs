//! candlecross: sequential EMA crossover / RSI candle backtester.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod cli;
pub mod domain;
pub mod ports;
pub mod adapters;

pub use domain::backtest::{BacktestResult, BacktestState, process, run_backtest};
pub use domain::candle::Candle;
pub use domain::error::EngineError;
pub use domain::strategy::StrategyConfig;
