//! Backtest driver.
//!
//! All mutable run state lives in [`BacktestState`], which is advanced one
//! candle at a time by [`process`] (or [`BacktestState::step`]). The state is
//! serializable, so a run can be stopped between bars and resumed later.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::broker::{AccountState, BrokerSim};
use crate::domain::candle::Candle;
use crate::domain::candle_series::CandleSeries;
use crate::domain::error::EngineError;
use crate::domain::indicator::{IndicatorOutput, IndicatorPipeline, IndicatorPoint};
use crate::domain::metrics::{EquityPoint, PerformanceReport};
use crate::domain::position::{Position, TradeRecord};
use crate::domain::state_machine::{EntryRules, PositionPolicy, TradeEvent, TradeStateMachine};
use crate::domain::strategy::StrategyConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestState {
    pipeline: IndicatorPipeline,
    machine: TradeStateMachine,
    broker: BrokerSim,
    starting_cash: f64,
    last_timestamp: Option<i64>,
    equity_curve: Vec<EquityPoint>,
}

impl BacktestState {
    pub fn new(config: &StrategyConfig) -> Self {
        BacktestState {
            pipeline: IndicatorPipeline::new(
                config.fast_period,
                config.slow_period,
                config.rsi_period,
            ),
            machine: TradeStateMachine::new(EntryRules::from(config), PositionPolicy::SinglePosition),
            broker: BrokerSim::new(config.starting_cash, config.commission_rate, config.commission),
            starting_cash: config.starting_cash,
            last_timestamp: None,
            equity_curve: Vec::new(),
        }
    }

    /// Process one candle. Candles must arrive in strictly increasing
    /// timestamp order; deduplicate through a [`CandleSeries`] first.
    pub fn step(&mut self, candle: &Candle) -> Result<Vec<TradeEvent>, EngineError> {
        if let Some(last) = self.last_timestamp {
            if candle.timestamp <= last {
                return Err(EngineError::OutOfOrder {
                    timestamp: candle.timestamp,
                    last,
                });
            }
        }
        self.last_timestamp = Some(candle.timestamp);

        let output = self.pipeline.process(candle);
        let events = self.machine.on_bar(candle, &output, &mut self.broker);

        self.equity_curve.push(EquityPoint {
            timestamp: candle.timestamp,
            equity: self
                .broker
                .mark_to_market(self.machine.open_position(), candle.close),
        });
        Ok(events)
    }

    pub fn bars_processed(&self) -> usize {
        self.equity_curve.len()
    }

    pub fn last_output(&self) -> Option<IndicatorOutput> {
        self.pipeline.last().map(|point| point.output)
    }

    pub fn open_position(&self) -> Option<&Position> {
        self.machine.open_position()
    }

    pub fn trades(&self) -> &[TradeRecord] {
        self.machine.trades()
    }

    pub fn account(&self) -> &AccountState {
        self.broker.account()
    }

    pub fn indicators(&self) -> &[IndicatorPoint] {
        self.pipeline.history()
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn report(&self) -> PerformanceReport {
        PerformanceReport::compute(
            self.machine.trades(),
            self.broker.account(),
            self.starting_cash,
            &self.equity_curve,
            self.machine.skipped_entries(),
            self.broker.went_negative(),
        )
    }

    pub fn finish(self) -> BacktestResult {
        let report = self.report();
        let open_position = self.machine.open_position().cloned();
        let account = self.broker.account().clone();
        BacktestResult {
            report,
            trades: self.machine.into_trades(),
            equity_curve: self.equity_curve,
            account,
            open_position,
        }
    }
}

/// Value-threading form of [`BacktestState::step`].
pub fn process(
    mut state: BacktestState,
    candle: &Candle,
) -> Result<(BacktestState, Vec<TradeEvent>), EngineError> {
    let events = state.step(candle)?;
    Ok((state, events))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub report: PerformanceReport,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquityPoint>,
    pub account: AccountState,
    /// A position still open when the candles ran out. Not part of the report.
    pub open_position: Option<Position>,
}

pub fn run_backtest(
    candles: &[Candle],
    config: &StrategyConfig,
) -> Result<BacktestResult, EngineError> {
    config.validate()?;
    let series = CandleSeries::from_candles(candles.iter().copied())?;
    run_series(&series, config)
}

pub fn run_series(
    series: &CandleSeries,
    config: &StrategyConfig,
) -> Result<BacktestResult, EngineError> {
    config.validate()?;

    let mut state = BacktestState::new(config);
    for candle in series {
        state.step(candle)?;
    }

    let result = state.finish();
    info!(
        bars = series.len(),
        trades = result.report.total_trades,
        final_equity = result.report.final_equity,
        open = result.open_position.is_some(),
        "backtest finished"
    );
    Ok(result)
}
