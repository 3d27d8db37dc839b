//! OHLCV candle representation.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Milliseconds since the Unix epoch (UTC).
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Open time rendered for logs and reports, falling back to the raw millis.
    pub fn time_label(&self) -> String {
        format_timestamp(self.timestamp)
    }
}

pub fn format_timestamp(timestamp: i64) -> String {
    match DateTime::from_timestamp_millis(timestamp) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => timestamp.to_string(),
    }
}
