//! Open position and closed trade records.

use serde::{Deserialize, Serialize};

/// A long position. Lives only while the state machine is in a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub entry_price: f64,
    pub stop_price: f64,
    pub take_profit_price: f64,
    pub size: f64,
    pub opened_at: i64,
}

impl Position {
    pub fn stop_distance(&self) -> f64 {
        self.entry_price - self.stop_price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.size * (price - self.entry_price)
    }

    /// True when the bar's low reached the stop.
    pub fn should_stop_loss(&self, low: f64) -> bool {
        low <= self.stop_price
    }

    /// True when the bar's high reached the target.
    pub fn should_take_profit(&self, high: f64) -> bool {
        high >= self.take_profit_price
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOutcome {
    Win,
    Loss,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub outcome: TradeOutcome,
    /// Gross price P&L: (exit - entry) * size.
    pub pnl: f64,
    pub commission: f64,
    pub opened_at: i64,
    pub closed_at: i64,
}

impl TradeRecord {
    pub fn net_pnl(&self) -> f64 {
        self.pnl - self.commission
    }

    pub fn is_win(&self) -> bool {
        self.outcome == TradeOutcome::Win
    }
}
