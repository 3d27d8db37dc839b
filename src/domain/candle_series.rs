//! Ordered, deduplicated candle history.
//!
//! Timestamps are strictly increasing. Re-appending the most recent timestamp
//! replaces that bar (a re-fetch of the still-forming candle); anything older
//! is rejected. Gaps between bars are kept as-is.

use serde::{Deserialize, Serialize};

use crate::domain::candle::Candle;
use crate::domain::error::EngineError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_candles<I>(candles: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = Candle>,
    {
        let mut series = Self::new();
        for candle in candles {
            series.append(candle)?;
        }
        Ok(series)
    }

    pub fn append(&mut self, candle: Candle) -> Result<(), EngineError> {
        match self.candles.last_mut() {
            Some(last) if candle.timestamp == last.timestamp => {
                *last = candle;
                Ok(())
            }
            Some(last) if candle.timestamp < last.timestamp => Err(EngineError::OutOfOrder {
                timestamp: candle.timestamp,
                last: last.timestamp,
            }),
            _ => {
                self.candles.push(candle);
                Ok(())
            }
        }
    }

    /// Ascending iteration; call again to restart.
    pub fn iter(&self) -> std::slice::Iter<'_, Candle> {
        self.candles.iter()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.candles.last().map(|c| c.timestamp)
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }
}

impl<'a> IntoIterator for &'a CandleSeries {
    type Item = &'a Candle;
    type IntoIter = std::slice::Iter<'a, Candle>;

    fn into_iter(self) -> Self::IntoIter {
        self.candles.iter()
    }
}
