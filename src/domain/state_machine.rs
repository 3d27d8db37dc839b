//! Per-bar trade management.
//!
//! The machine is either `Flat` or holding exactly one long `Position`.
//! Every bar first updates the rolling low window, then checks exits on an
//! open position, and only then (and only if the bar did not close a trade)
//! evaluates the entry rules.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::broker::BrokerSim;
use crate::domain::candle::Candle;
use crate::domain::error::EngineError;
use crate::domain::indicator::{Crossover, IndicatorOutput};
use crate::domain::position::{Position, TradeOutcome, TradeRecord};
use crate::domain::risk::position_size;
use crate::domain::strategy::StrategyConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TradeState {
    Flat,
    InTrade(Position),
}

/// How many positions may be open at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionPolicy {
    #[default]
    SinglePosition,
}

impl PositionPolicy {
    fn max_open(&self) -> usize {
        match self {
            PositionPolicy::SinglePosition => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TradeEvent {
    Entered(Position),
    Exited(TradeRecord),
    EntrySkipped { timestamp: i64, stop_distance: f64 },
    CashWarning { timestamp: i64, cash: f64 },
}

/// The subset of [`StrategyConfig`] the machine consults on each bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryRules {
    pub rsi_oversold_threshold: f64,
    pub risk_fraction: f64,
    pub reward_multiple: f64,
    pub lookback: usize,
}

impl From<&StrategyConfig> for EntryRules {
    fn from(config: &StrategyConfig) -> Self {
        EntryRules {
            rsi_oversold_threshold: config.rsi_oversold_threshold,
            risk_fraction: config.risk_fraction,
            reward_multiple: config.reward_multiple,
            lookback: config.lookback,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeStateMachine {
    state: TradeState,
    policy: PositionPolicy,
    rules: EntryRules,
    lows: VecDeque<f64>,
    trades: Vec<TradeRecord>,
    skipped_entries: usize,
}

impl TradeStateMachine {
    pub fn new(rules: EntryRules, policy: PositionPolicy) -> Self {
        TradeStateMachine {
            state: TradeState::Flat,
            policy,
            rules,
            lows: VecDeque::with_capacity(rules.lookback),
            trades: Vec::new(),
            skipped_entries: 0,
        }
    }

    pub fn state(&self) -> &TradeState {
        &self.state
    }

    pub fn open_position(&self) -> Option<&Position> {
        match &self.state {
            TradeState::Flat => None,
            TradeState::InTrade(position) => Some(position),
        }
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn into_trades(self) -> Vec<TradeRecord> {
        self.trades
    }

    pub fn skipped_entries(&self) -> usize {
        self.skipped_entries
    }

    fn open_count(&self) -> usize {
        match self.state {
            TradeState::Flat => 0,
            TradeState::InTrade(_) => 1,
        }
    }

    /// Lowest low over the last `lookback` bars, once that many have been seen.
    pub fn window_low(&self) -> Option<f64> {
        if self.lows.len() < self.rules.lookback {
            return None;
        }
        self.lows.iter().copied().reduce(f64::min)
    }

    pub fn on_bar(
        &mut self,
        candle: &Candle,
        output: &IndicatorOutput,
        broker: &mut BrokerSim,
    ) -> Vec<TradeEvent> {
        self.lows.push_back(candle.low);
        while self.lows.len() > self.rules.lookback {
            self.lows.pop_front();
        }

        let mut events = Vec::new();

        if let TradeState::InTrade(position) = &self.state {
            let exit = if position.should_stop_loss(candle.low) {
                Some((position.stop_price, TradeOutcome::Loss))
            } else if position.should_take_profit(candle.high) {
                Some((position.take_profit_price, TradeOutcome::Win))
            } else {
                None
            };

            match exit {
                Some((exit_price, outcome)) => {
                    let record = self.close(position.clone(), exit_price, outcome, candle, broker);
                    events.push(TradeEvent::Exited(record.clone()));
                    if let Err(EngineError::InsufficientCash { cash }) =
                        broker.close_position(&record)
                    {
                        warn!(
                            time = %candle.time_label(),
                            cash,
                            "cash negative after settlement"
                        );
                        events.push(TradeEvent::CashWarning {
                            timestamp: candle.timestamp,
                            cash,
                        });
                    }
                    self.trades.push(record);
                    self.state = TradeState::Flat;
                    return events;
                }
                None => {
                    if self.open_count() >= self.policy.max_open() {
                        return events;
                    }
                }
            }
        }

        if let Some(event) = self.try_enter(candle, output, broker) {
            events.push(event);
        }
        events
    }

    fn close(
        &self,
        position: Position,
        exit_price: f64,
        outcome: TradeOutcome,
        candle: &Candle,
        broker: &BrokerSim,
    ) -> TradeRecord {
        let pnl = (exit_price - position.entry_price) * position.size;
        let commission = broker.commission(position.entry_price, exit_price, position.size);

        info!(
            time = %candle.time_label(),
            ?outcome,
            entry = position.entry_price,
            exit = exit_price,
            size = position.size,
            pnl,
            commission,
            "closed position"
        );

        TradeRecord {
            entry_price: position.entry_price,
            exit_price,
            size: position.size,
            outcome,
            pnl,
            commission,
            opened_at: position.opened_at,
            closed_at: candle.timestamp,
        }
    }

    fn try_enter(
        &mut self,
        candle: &Candle,
        output: &IndicatorOutput,
        broker: &mut BrokerSim,
    ) -> Option<TradeEvent> {
        let indicators = output.state()?;
        if indicators.crossover != Crossover::Bullish {
            return None;
        }
        if indicators.rsi >= self.rules.rsi_oversold_threshold {
            debug!(
                time = %candle.time_label(),
                rsi = indicators.rsi,
                "bullish crossover without oversold rsi"
            );
            return None;
        }
        let stop_price = self.window_low()?;
        let entry_price = candle.close;
        let stop_distance = entry_price - stop_price;

        let size = match position_size(broker.cash(), self.rules.risk_fraction, stop_distance) {
            Ok(size) => size,
            Err(err) => {
                warn!(
                    time = %candle.time_label(),
                    entry = entry_price,
                    stop = stop_price,
                    cash = broker.cash(),
                    "entry skipped: {err}"
                );
                self.skipped_entries += 1;
                return Some(TradeEvent::EntrySkipped {
                    timestamp: candle.timestamp,
                    stop_distance,
                });
            }
        };

        let position = Position {
            entry_price,
            stop_price,
            take_profit_price: entry_price + self.rules.reward_multiple * stop_distance,
            size,
            opened_at: candle.timestamp,
        };
        broker.open_position(&position);

        info!(
            time = %candle.time_label(),
            entry = position.entry_price,
            stop = position.stop_price,
            target = position.take_profit_price,
            size = position.size,
            risk = position.stop_distance() * position.size,
            rsi = indicators.rsi,
            signal = %indicators.crossover,
            "opened long"
        );

        self.state = TradeState::InTrade(position.clone());
        Some(TradeEvent::Entered(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::broker::CommissionSchedule;
    use crate::domain::indicator::IndicatorState;
    use approx::assert_relative_eq;

    fn rules() -> EntryRules {
        EntryRules {
            rsi_oversold_threshold: 30.0,
            risk_fraction: 0.01,
            reward_multiple: 2.0,
            lookback: 3,
        }
    }

    fn machine() -> TradeStateMachine {
        TradeStateMachine::new(rules(), PositionPolicy::SinglePosition)
    }

    fn broker() -> BrokerSim {
        BrokerSim::new(1000.0, 0.001, CommissionSchedule::PriceMove)
    }

    fn bar(ts: i64, low: f64, high: f64, close: f64) -> Candle {
        Candle {
            timestamp: ts,
            open: close,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    fn ready(crossover: Crossover, rsi: f64) -> IndicatorOutput {
        IndicatorOutput::Ready(IndicatorState {
            ema_fast: 1.0,
            ema_slow: 1.0,
            rsi,
            crossover,
        })
    }

    fn quiet() -> IndicatorOutput {
        ready(Crossover::None, 50.0)
    }

    /// Feeds lows 9, 8 then enters on a bar with low 9.5 and close 10.
    fn entered() -> (TradeStateMachine, BrokerSim) {
        let mut m = machine();
        let mut b = broker();
        m.on_bar(&bar(1, 9.0, 11.0, 10.0), &quiet(), &mut b);
        m.on_bar(&bar(2, 8.0, 11.0, 10.0), &quiet(), &mut b);
        let events = m.on_bar(&bar(3, 9.5, 10.5, 10.0), &ready(Crossover::Bullish, 20.0), &mut b);
        assert!(matches!(events.as_slice(), [TradeEvent::Entered(_)]));
        (m, b)
    }

    #[test]
    fn starts_flat() {
        let m = machine();
        assert_eq!(m.state(), &TradeState::Flat);
        assert!(m.open_position().is_none());
        assert!(m.trades().is_empty());
    }

    #[test]
    fn entry_sizes_and_brackets_position() {
        let (m, b) = entered();
        let pos = m.open_position().unwrap();
        assert_relative_eq!(pos.entry_price, 10.0);
        assert_relative_eq!(pos.stop_price, 8.0);
        assert_relative_eq!(pos.take_profit_price, 14.0);
        assert_relative_eq!(pos.size, 5.0);
        assert_eq!(pos.opened_at, 3);
        assert_eq!(b.open_positions(), 1);
        assert_relative_eq!(b.cash(), 1000.0);
    }

    #[test]
    fn no_entry_before_window_fills() {
        let mut m = machine();
        let mut b = broker();
        m.on_bar(&bar(1, 9.0, 11.0, 10.0), &quiet(), &mut b);
        let events = m.on_bar(&bar(2, 8.0, 11.0, 10.0), &ready(Crossover::Bullish, 20.0), &mut b);
        assert!(events.is_empty());
        assert_eq!(m.state(), &TradeState::Flat);
    }

    #[test]
    fn no_entry_while_pending() {
        let mut m = machine();
        let mut b = broker();
        for ts in 1..=5 {
            let events = m.on_bar(&bar(ts, 9.0, 11.0, 10.0), &IndicatorOutput::Pending, &mut b);
            assert!(events.is_empty());
        }
    }

    #[test]
    fn no_entry_without_oversold_rsi() {
        let mut m = machine();
        let mut b = broker();
        m.on_bar(&bar(1, 9.0, 11.0, 10.0), &quiet(), &mut b);
        m.on_bar(&bar(2, 8.0, 11.0, 10.0), &quiet(), &mut b);
        let events = m.on_bar(&bar(3, 9.5, 10.5, 10.0), &ready(Crossover::Bullish, 30.0), &mut b);
        assert!(events.is_empty());
    }

    #[test]
    fn no_entry_on_bearish_crossover() {
        let mut m = machine();
        let mut b = broker();
        m.on_bar(&bar(1, 9.0, 11.0, 10.0), &quiet(), &mut b);
        m.on_bar(&bar(2, 8.0, 11.0, 10.0), &quiet(), &mut b);
        let events = m.on_bar(&bar(3, 9.5, 10.5, 10.0), &ready(Crossover::Bearish, 10.0), &mut b);
        assert!(events.is_empty());
    }

    #[test]
    fn stop_loss_exit_is_a_loss_at_stop_price() {
        let (mut m, mut b) = entered();
        let events = m.on_bar(&bar(4, 7.0, 10.0, 7.5), &quiet(), &mut b);
        let [TradeEvent::Exited(record)] = events.as_slice() else {
            panic!("expected exit, got {events:?}");
        };
        assert_eq!(record.outcome, TradeOutcome::Loss);
        assert_relative_eq!(record.exit_price, 8.0);
        assert_relative_eq!(record.pnl, -10.0);
        assert_relative_eq!(record.commission, 0.01, epsilon = 1e-12);
        assert_relative_eq!(b.cash(), 989.99, epsilon = 1e-9);
        assert_eq!(m.state(), &TradeState::Flat);
        assert_eq!(m.trades().len(), 1);
    }

    #[test]
    fn take_profit_exit_is_a_win_at_target() {
        let (mut m, mut b) = entered();
        assert!(m.on_bar(&bar(4, 9.0, 12.0, 11.0), &quiet(), &mut b).is_empty());
        let events = m.on_bar(&bar(5, 11.0, 15.0, 14.5), &quiet(), &mut b);
        let [TradeEvent::Exited(record)] = events.as_slice() else {
            panic!("expected exit, got {events:?}");
        };
        assert_eq!(record.outcome, TradeOutcome::Win);
        assert_relative_eq!(record.exit_price, 14.0);
        assert_relative_eq!(record.pnl, 20.0);
        assert_eq!(record.closed_at, 5);
    }

    #[test]
    fn stop_wins_when_both_levels_touched() {
        let (mut m, mut b) = entered();
        let events = m.on_bar(&bar(4, 7.0, 15.0, 10.0), &quiet(), &mut b);
        let [TradeEvent::Exited(record)] = events.as_slice() else {
            panic!("expected exit, got {events:?}");
        };
        assert_eq!(record.outcome, TradeOutcome::Loss);
    }

    #[test]
    fn no_reentry_on_exit_bar() {
        let (mut m, mut b) = entered();
        let events = m.on_bar(&bar(4, 7.0, 10.0, 9.0), &ready(Crossover::Bullish, 10.0), &mut b);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], TradeEvent::Exited(_)));
        assert_eq!(m.state(), &TradeState::Flat);
    }

    #[test]
    fn signal_ignored_while_in_trade() {
        let (mut m, mut b) = entered();
        let events = m.on_bar(&bar(4, 9.0, 11.0, 10.5), &ready(Crossover::Bullish, 10.0), &mut b);
        assert!(events.is_empty());
        assert_relative_eq!(m.open_position().unwrap().entry_price, 10.0);
        assert_eq!(b.open_positions(), 1);
    }

    #[test]
    fn zero_stop_distance_skips_entry() {
        let mut m = machine();
        let mut b = broker();
        m.on_bar(&bar(1, 10.0, 11.0, 10.0), &quiet(), &mut b);
        m.on_bar(&bar(2, 10.0, 11.0, 10.0), &quiet(), &mut b);
        let events = m.on_bar(&bar(3, 10.0, 10.5, 10.0), &ready(Crossover::Bullish, 20.0), &mut b);
        assert!(matches!(
            events.as_slice(),
            [TradeEvent::EntrySkipped { timestamp: 3, stop_distance }] if *stop_distance == 0.0
        ));
        assert_eq!(m.skipped_entries(), 1);
        assert_eq!(m.state(), &TradeState::Flat);
        assert_eq!(b.open_positions(), 0);
    }

    #[test]
    fn window_only_covers_lookback_bars() {
        let mut m = machine();
        let mut b = broker();
        for (ts, low) in [(1, 1.0), (2, 5.0), (3, 6.0), (4, 7.0)] {
            m.on_bar(&bar(ts, low, low + 1.0, low + 0.5), &quiet(), &mut b);
        }
        assert_relative_eq!(m.window_low().unwrap(), 5.0);
    }

    #[test]
    fn negative_cash_emits_warning_and_continues() {
        let mut m = TradeStateMachine::new(
            EntryRules {
                risk_fraction: 1.0,
                ..rules()
            },
            PositionPolicy::SinglePosition,
        );
        let mut b = broker();
        m.on_bar(&bar(1, 9.0, 11.0, 10.0), &quiet(), &mut b);
        m.on_bar(&bar(2, 8.0, 11.0, 10.0), &quiet(), &mut b);
        m.on_bar(&bar(3, 9.5, 10.5, 10.0), &ready(Crossover::Bullish, 20.0), &mut b);

        // size 500, loses the full 1000 plus 1.0 commission
        let events = m.on_bar(&bar(4, 7.0, 10.0, 7.5), &quiet(), &mut b);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], TradeEvent::CashWarning { timestamp: 4, cash } if cash < 0.0));
        assert!(b.went_negative());
        assert_eq!(m.state(), &TradeState::Flat);

        // Window lows 9.5, 7.0, 7.2 give a valid 0.6 stop, but there is no cash to risk.
        let events = m.on_bar(&bar(5, 7.2, 8.0, 7.6), &ready(Crossover::Bullish, 20.0), &mut b);
        assert!(matches!(
            events.as_slice(),
            [TradeEvent::EntrySkipped { timestamp: 5, .. }]
        ));
        assert_eq!(m.skipped_entries(), 1);
        assert_eq!(m.state(), &TradeState::Flat);
        assert_eq!(b.open_positions(), 0);
        assert_relative_eq!(b.cash(), -1.0, epsilon = 1e-9);
    }

    #[test]
    fn single_position_gate_uses_own_state() {
        let (mut m, _) = entered();
        // A broker that disagrees about the open count must not allow pyramiding.
        let mut fresh = broker();
        let events = m.on_bar(
            &bar(4, 9.0, 11.0, 10.5),
            &ready(Crossover::Bullish, 10.0),
            &mut fresh,
        );
        assert!(events.is_empty());
        assert_relative_eq!(m.open_position().unwrap().entry_price, 10.0);
        assert_eq!(fresh.open_positions(), 0);
    }
}
