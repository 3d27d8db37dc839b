#![allow(dead_code)]

use candlecross::domain::candle::Candle;
use candlecross::domain::error::EngineError;
use candlecross::ports::candle_source::CandleSource;
use std::cell::{Cell, RefCell};
use std::io::Write;

/// 2024-01-01 00:00 UTC.
pub const START_MS: i64 = 1_704_067_200_000;
/// 15 minutes.
pub const STEP_MS: i64 = 900_000;

pub fn candle(index: usize, close: f64) -> Candle {
    Candle {
        timestamp: START_MS + index as i64 * STEP_MS,
        open: close,
        high: close + 0.5,
        low: close - 0.5,
        close,
        volume: 1.0,
    }
}

pub fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| candle(i, close))
        .collect()
}

/// 251 closes shaped so that, with EMA 50/200 and RSI 14, the only bullish
/// crossover lands on the last bar (index 250) with RSI near 24.6.
///
/// Flat at 100, crash to 50, hold, ramp back to 96.2, hold, then two 2.0
/// drops that pull RSI into oversold while the fast EMA is still just above
/// the slow one. With lookback 6 the entry is 92.2, the stop 91.7 and the
/// 2R target 93.2.
pub fn crossover_base_closes() -> Vec<f64> {
    let mut closes = vec![100.0; 150];
    closes.extend((1..=3).map(|i| 100.0 - (100.0 - 50.0) * i as f64 / 3.0));
    closes.extend(std::iter::repeat_n(50.0, 20));
    closes.extend((1..=46).map(|i| 50.0 + (96.2 - 50.0) * i as f64 / 46.0));
    closes.extend(std::iter::repeat_n(96.2, 30));
    closes.extend((1..=2).map(|i| 96.2 - 2.0 * i as f64));
    closes
}

pub const ENTRY_INDEX: usize = 250;

/// Base series followed by ten rising bars; the first one hits the target.
pub fn winning_candles() -> Vec<Candle> {
    let mut closes = crossover_base_closes();
    closes.extend((1..=10).map(|i| 92.2 + 1.0 * i as f64));
    candles_from_closes(&closes)
}

/// Base series followed by a drop through the stop on the next bar.
pub fn losing_candles() -> Vec<Candle> {
    let mut closes = crossover_base_closes();
    closes.extend([90.0, 89.0, 88.0]);
    candles_from_closes(&closes)
}

/// Strictly rising closes: RSI pinned at 100, so no entry ever qualifies.
pub fn rising_candles(n: usize) -> Vec<Candle> {
    (0..n).map(|i| candle(i, 100.0 + i as f64 * 0.25)).collect()
}

/// In-memory candle source with optional injected failures.
pub struct MockCandleSource {
    pub candles: Vec<Candle>,
    /// Transient failures to return before serving each request.
    pub failures_per_request: u32,
    /// Extra already-seen candles to prepend to every page after the first.
    pub overlap: usize,
    pub requests: RefCell<Vec<(i64, usize)>>,
    failures_left: Cell<u32>,
}

impl MockCandleSource {
    pub fn new(candles: Vec<Candle>) -> Self {
        Self {
            candles,
            failures_per_request: 0,
            overlap: 0,
            requests: RefCell::new(Vec::new()),
            failures_left: Cell::new(0),
        }
    }

    pub fn with_failures(mut self, failures: u32) -> Self {
        self.failures_per_request = failures;
        self.failures_left.set(failures);
        self
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn served_requests(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl CandleSource for MockCandleSource {
    fn fetch_page(
        &self,
        _symbol: &str,
        _timeframe: &str,
        since: i64,
        limit: usize,
    ) -> Result<Vec<Candle>, EngineError> {
        if self.failures_left.get() > 0 {
            self.failures_left.set(self.failures_left.get() - 1);
            return Err(EngineError::DataSource {
                reason: "simulated timeout".into(),
            });
        }
        self.failures_left.set(self.failures_per_request);

        let first_page = self.requests.borrow().is_empty();
        self.requests.borrow_mut().push((since, limit));

        let start = self
            .candles
            .iter()
            .position(|c| c.timestamp >= since)
            .unwrap_or(self.candles.len());
        let start = if first_page {
            start
        } else {
            start.saturating_sub(self.overlap)
        };
        Ok(self.candles[start..].iter().take(limit).copied().collect())
    }
}

pub fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
