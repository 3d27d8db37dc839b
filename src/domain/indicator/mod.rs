//! Technical indicators and the per-bar indicator pipeline.
//!
//! This module provides:
//! - `IndicatorState`: the fast/slow EMA, RSI and crossover for one bar
//! - `IndicatorOutput`: `Pending` during warm-up, `Ready` afterwards
//! - `IndicatorPoint`: one output keyed to the candle it came from
//! - `IndicatorPipeline`: incremental computation, one candle at a time

pub mod crossover;
pub mod ema;
pub mod rsi;

use serde::{Deserialize, Serialize};

use crate::domain::candle::Candle;
pub use crossover::{Crossover, CrossoverDetector};
use ema::Ema;
use rsi::Rsi;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorState {
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub rsi: f64,
    pub crossover: Crossover,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum IndicatorOutput {
    Pending,
    Ready(IndicatorState),
}

impl IndicatorOutput {
    pub fn state(&self) -> Option<&IndicatorState> {
        match self {
            IndicatorOutput::Pending => None,
            IndicatorOutput::Ready(state) => Some(state),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, IndicatorOutput::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub timestamp: i64,
    pub output: IndicatorOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPipeline {
    fast: Ema,
    slow: Ema,
    rsi: Rsi,
    crossover: CrossoverDetector,
    history: Vec<IndicatorPoint>,
}

impl IndicatorPipeline {
    pub fn new(fast_period: usize, slow_period: usize, rsi_period: usize) -> Self {
        IndicatorPipeline {
            fast: Ema::new(fast_period),
            slow: Ema::new(slow_period),
            rsi: Rsi::new(rsi_period),
            crossover: CrossoverDetector::new(),
            history: Vec::new(),
        }
    }

    /// Advance by one candle. The crossover detector tracks the EMA ordering
    /// as soon as both EMAs exist, even while RSI is still warming up.
    pub fn process(&mut self, candle: &Candle) -> IndicatorOutput {
        let fast = self.fast.update(candle.close);
        let slow = self.slow.update(candle.close);
        let rsi = self.rsi.update(candle.close);

        let output = match (fast, slow) {
            (Some(ema_fast), Some(ema_slow)) => {
                let crossover = self.crossover.update(ema_fast, ema_slow);
                match rsi {
                    Some(rsi) => IndicatorOutput::Ready(IndicatorState {
                        ema_fast,
                        ema_slow,
                        rsi,
                        crossover,
                    }),
                    None => IndicatorOutput::Pending,
                }
            }
            _ => IndicatorOutput::Pending,
        };

        self.history.push(IndicatorPoint {
            timestamp: candle.timestamp,
            output,
        });
        output
    }

    pub fn history(&self) -> &[IndicatorPoint] {
        &self.history
    }

    pub fn last(&self) -> Option<&IndicatorPoint> {
        self.history.last()
    }
}
