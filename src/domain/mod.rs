//! Core domain types and logic.

pub mod candle;
pub mod candle_series;
pub mod indicator;
pub mod risk;
pub mod position;
pub mod broker;
pub mod state_machine;
pub mod strategy;
pub mod backtest;
pub mod metrics;
pub mod montecarlo;
pub mod ingest;
pub mod config_validation;
pub mod error;
