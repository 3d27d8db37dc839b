//! Exponential Moving Average, one close at a time.
//!
//! k = 2/(n+1), seed with the SMA of the first n closes, then
//! EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! Warmup: no value for the first (n-1) closes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ema {
    period: usize,
    k: f64,
    seen: usize,
    sum: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Ema {
            period,
            k: 2.0 / (period as f64 + 1.0),
            seen: 0,
            sum: 0.0,
            value: None,
        }
    }

    /// Feed the next close; returns the EMA once warmed up.
    pub fn update(&mut self, close: f64) -> Option<f64> {
        if self.period == 0 {
            return None;
        }
        self.value = match self.value {
            Some(ema) => Some(close * self.k + ema * (1.0 - self.k)),
            None => {
                self.seen += 1;
                self.sum += close;
                if self.seen == self.period {
                    Some(self.sum / self.period as f64)
                } else {
                    None
                }
            }
        };
        self.value
    }
}
