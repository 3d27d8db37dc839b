//! Fast/slow crossover edge detection.
//!
//! Compares the sign of `fast - slow` on consecutive bars. Only strict sign
//! changes emit a signal, so a difference that sits at exactly zero does not
//! fire repeatedly.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Crossover {
    None,
    Bullish,
    Bearish,
}

impl fmt::Display for Crossover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crossover::None => write!(f, "none"),
            Crossover::Bullish => write!(f, "bullish"),
            Crossover::Bearish => write!(f, "bearish"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossoverDetector {
    prev_diff: Option<f64>,
}

impl CrossoverDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, fast: f64, slow: f64) -> Crossover {
        let diff = fast - slow;
        let signal = match self.prev_diff {
            Some(prev) if prev <= 0.0 && diff > 0.0 => Crossover::Bullish,
            Some(prev) if prev >= 0.0 && diff < 0.0 => Crossover::Bearish,
            _ => Crossover::None,
        };
        self.prev_diff = Some(diff);
        signal
    }
}
