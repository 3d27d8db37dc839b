//! Simulated broker: cash, commission and equity.
//!
//! No margin is modelled. Opening a position moves no cash; the whole P&L
//! (net of commission) settles when the position closes.

use serde::{Deserialize, Serialize};

use super::error::EngineError;
use super::position::{Position, TradeRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub cash: f64,
    pub commission_rate: f64,
    pub equity: f64,
}

/// How a round trip is charged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CommissionSchedule {
    /// rate * |exit - entry| * size
    PriceMove,
    /// rate * (entry + exit) * size, i.e. the rate charged on each side's notional
    Notional,
    /// Fixed charge per round trip.
    Flat { per_trade: f64 },
}

impl Default for CommissionSchedule {
    fn default() -> Self {
        CommissionSchedule::PriceMove
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerSim {
    account: AccountState,
    schedule: CommissionSchedule,
    open_positions: usize,
    went_negative: bool,
}

impl BrokerSim {
    pub fn new(starting_cash: f64, commission_rate: f64, schedule: CommissionSchedule) -> Self {
        BrokerSim {
            account: AccountState {
                cash: starting_cash,
                commission_rate,
                equity: starting_cash,
            },
            schedule,
            open_positions: 0,
            went_negative: false,
        }
    }

    pub fn account(&self) -> &AccountState {
        &self.account
    }

    pub fn cash(&self) -> f64 {
        self.account.cash
    }

    pub fn open_positions(&self) -> usize {
        self.open_positions
    }

    /// Whether cash has been negative after any settlement.
    pub fn went_negative(&self) -> bool {
        self.went_negative
    }

    pub fn commission(&self, entry_price: f64, exit_price: f64, size: f64) -> f64 {
        let rate = self.account.commission_rate;
        match self.schedule {
            CommissionSchedule::PriceMove => rate * (exit_price - entry_price).abs() * size,
            CommissionSchedule::Notional => rate * (entry_price + exit_price) * size,
            CommissionSchedule::Flat { per_trade } => per_trade,
        }
    }

    pub fn open_position(&mut self, _position: &Position) {
        self.open_positions += 1;
        self.account.equity = self.account.cash;
    }

    /// Settle a closed trade. The account is updated even when this returns
    /// `InsufficientCash`; the error only reports that cash went negative.
    pub fn close_position(&mut self, record: &TradeRecord) -> Result<(), EngineError> {
        self.open_positions = self.open_positions.saturating_sub(1);
        self.account.cash += record.pnl - record.commission;
        self.account.equity = self.account.cash;

        if self.account.cash < 0.0 {
            self.went_negative = true;
            return Err(EngineError::InsufficientCash {
                cash: self.account.cash,
            });
        }
        Ok(())
    }

    /// Cash plus the open position's unrealized P&L at `price`.
    pub fn mark_to_market(&self, position: Option<&Position>, price: f64) -> f64 {
        self.account.cash + position.map_or(0.0, |p| p.unrealized_pnl(price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::TradeOutcome;
    use approx::assert_relative_eq;

    fn position() -> Position {
        Position {
            entry_price: 100.0,
            stop_price: 95.0,
            take_profit_price: 110.0,
            size: 2.0,
            opened_at: 0,
        }
    }

    fn record(exit_price: f64, outcome: TradeOutcome, commission: f64) -> TradeRecord {
        TradeRecord {
            entry_price: 100.0,
            exit_price,
            size: 2.0,
            outcome,
            pnl: (exit_price - 100.0) * 2.0,
            commission,
            opened_at: 0,
            closed_at: 60_000,
        }
    }

    #[test]
    fn new_broker() {
        let broker = BrokerSim::new(1000.0, 0.001, CommissionSchedule::PriceMove);
        assert_relative_eq!(broker.cash(), 1000.0);
        assert_relative_eq!(broker.account().equity, 1000.0);
        assert_relative_eq!(broker.account().commission_rate, 0.001);
        assert_eq!(broker.open_positions(), 0);
    }

    #[test]
    fn open_moves_no_cash() {
        let mut broker = BrokerSim::new(1000.0, 0.001, CommissionSchedule::PriceMove);
        broker.open_position(&position());
        assert_relative_eq!(broker.cash(), 1000.0);
        assert_eq!(broker.open_positions(), 1);
    }

    #[test]
    fn price_move_commission() {
        let broker = BrokerSim::new(1000.0, 0.01, CommissionSchedule::PriceMove);
        assert_relative_eq!(broker.commission(100.0, 110.0, 2.0), 0.2, epsilon = 1e-12);
        assert_relative_eq!(broker.commission(100.0, 95.0, 2.0), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn notional_commission() {
        let broker = BrokerSim::new(1000.0, 0.001, CommissionSchedule::Notional);
        assert_relative_eq!(broker.commission(100.0, 110.0, 2.0), 0.42, epsilon = 1e-12);
    }

    #[test]
    fn flat_commission_ignores_rate() {
        let broker = BrokerSim::new(1000.0, 0.5, CommissionSchedule::Flat { per_trade: 3.0 });
        assert_relative_eq!(broker.commission(100.0, 110.0, 2.0), 3.0);
    }

    #[test]
    fn close_applies_net_pnl() {
        let mut broker = BrokerSim::new(1000.0, 0.01, CommissionSchedule::PriceMove);
        broker.open_position(&position());
        broker
            .close_position(&record(110.0, TradeOutcome::Win, 0.2))
            .unwrap();
        assert_relative_eq!(broker.cash(), 1019.8, epsilon = 1e-9);
        assert_relative_eq!(broker.account().equity, 1019.8, epsilon = 1e-9);
        assert_eq!(broker.open_positions(), 0);
    }

    #[test]
    fn negative_cash_reported_but_applied() {
        let mut broker = BrokerSim::new(10.0, 0.0, CommissionSchedule::PriceMove);
        broker.open_position(&position());
        let err = broker
            .close_position(&record(90.0, TradeOutcome::Loss, 0.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientCash { cash } if (cash + 10.0).abs() < 1e-9));
        assert_relative_eq!(broker.cash(), -10.0);
        assert!(broker.went_negative());
    }

    #[test]
    fn mark_to_market_includes_open_position() {
        let broker = BrokerSim::new(1000.0, 0.0, CommissionSchedule::PriceMove);
        let pos = position();
        assert_relative_eq!(broker.mark_to_market(Some(&pos), 103.0), 1006.0);
        assert_relative_eq!(broker.mark_to_market(None, 103.0), 1000.0);
    }
}
