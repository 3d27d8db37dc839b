//! Performance aggregation over a finished run.

use serde::{Deserialize, Serialize};

use super::broker::AccountState;
use super::position::{TradeOutcome, TradeRecord};

/// Mark-to-market account value after one bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: i64,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub starting_cash: f64,
    pub final_equity: f64,
    pub total_return: f64,
    pub net_pnl: f64,
    pub total_commission: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub max_drawdown: f64,
    pub skipped_entries: usize,
    pub insufficient_cash: bool,
}

impl PerformanceReport {
    pub fn compute(
        trades: &[TradeRecord],
        account: &AccountState,
        starting_cash: f64,
        equity_curve: &[EquityPoint],
        skipped_entries: usize,
        insufficient_cash: bool,
    ) -> Self {
        let final_equity = account.equity;
        let total_return = if starting_cash > 0.0 {
            (final_equity - starting_cash) / starting_cash
        } else {
            0.0
        };

        let mut wins = 0usize;
        let mut losses = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut net_pnl = 0.0_f64;
        let mut total_commission = 0.0_f64;

        for trade in trades {
            let net = trade.net_pnl();
            net_pnl += net;
            total_commission += trade.commission;
            match trade.outcome {
                TradeOutcome::Win => wins += 1,
                TradeOutcome::Loss => losses += 1,
            }
            if net > 0.0 {
                total_wins += net;
            } else {
                total_losses += net.abs();
            }
        }

        let total_trades = trades.len();
        let win_rate = if total_trades > 0 {
            wins as f64 / total_trades as f64
        } else {
            0.0
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win = if wins > 0 {
            trades
                .iter()
                .filter(|t| t.is_win())
                .map(TradeRecord::net_pnl)
                .sum::<f64>()
                / wins as f64
        } else {
            0.0
        };

        let avg_loss = if losses > 0 {
            trades
                .iter()
                .filter(|t| !t.is_win())
                .map(|t| t.net_pnl().abs())
                .sum::<f64>()
                / losses as f64
        } else {
            0.0
        };

        PerformanceReport {
            total_trades,
            wins,
            losses,
            win_rate,
            starting_cash,
            final_equity,
            total_return,
            net_pnl,
            total_commission,
            profit_factor,
            avg_win,
            avg_loss,
            max_drawdown: compute_drawdown(equity_curve),
            skipped_entries,
            insufficient_cash,
        }
    }
}

/// Largest peak-to-trough decline as a fraction of the peak.
fn compute_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    let Some(first) = equity_curve.first() else {
        return 0.0;
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
        } else if peak > 0.0 {
            let dd = (peak - point.equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}
