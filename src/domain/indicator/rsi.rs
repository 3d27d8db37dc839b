//! RSI (Relative Strength Index), one close at a time.
//!
//! Uses Wilder's smoothing for average gain/loss calculation:
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100
//!
//! Warmup: the first n closes yield nothing (n changes are needed).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rsi {
    period: usize,
    prev_close: Option<f64>,
    changes: usize,
    avg_gain: f64,
    avg_loss: f64,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Rsi {
            period,
            prev_close: None,
            changes: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        }
    }

    pub fn update(&mut self, close: f64) -> Option<f64> {
        let Some(prev) = self.prev_close.replace(close) else {
            return None;
        };
        if self.period == 0 {
            return None;
        }

        let change = close - prev;
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };
        let n = self.period as f64;

        if self.changes < self.period {
            // Accumulate sums until the first simple average is available.
            self.changes += 1;
            self.avg_gain += gain;
            self.avg_loss += loss;
            if self.changes < self.period {
                return None;
            }
            self.avg_gain /= n;
            self.avg_loss /= n;
        } else {
            self.avg_gain = (self.avg_gain * (n - 1.0) + gain) / n;
            self.avg_loss = (self.avg_loss * (n - 1.0) + loss) / n;
        }

        let rsi = if self.avg_loss == 0.0 {
            100.0
        } else {
            100.0 - (100.0 / (1.0 + self.avg_gain / self.avg_loss))
        };
        Some(rsi.clamp(0.0, 100.0))
    }
}
