//! Paginated candle ingestion.
//!
//! Pulls `limit` candles through a [`CandleSource`] in pages, spacing the
//! requests out and retrying transient failures with exponential backoff.
//! Pages are merged by timestamp, so overlapping pages collapse and the
//! most recently fetched copy of a bar wins.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::candle::{Candle, format_timestamp};
use crate::domain::candle_series::CandleSeries;
use crate::domain::error::EngineError;
use crate::ports::candle_source::CandleSource;

/// A candle interval such as `15m` or `1d`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframe {
    label: String,
    millis: i64,
}

impl Timeframe {
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        let s = s.trim();
        let bad = || EngineError::invalid("data", "timeframe", format!("unrecognised timeframe '{s}'"));

        let split = s.find(|c: char| !c.is_ascii_digit()).ok_or_else(bad)?;
        let (digits, unit) = s.split_at(split);
        let count: i64 = digits.parse().map_err(|_| bad())?;
        if count <= 0 {
            return Err(bad());
        }
        let unit_ms: i64 = match unit {
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            "w" => 604_800_000,
            _ => return Err(bad()),
        };

        Ok(Timeframe {
            label: s.to_string(),
            millis: count * unit_ms,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn millis(&self) -> i64 {
        self.millis
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub limit: usize,
    /// Start of the range in ms. `None` means `limit` bars back from now.
    pub since: Option<i64>,
}

impl FetchRequest {
    pub fn resolve_since(&self, now_ms: i64) -> i64 {
        self.since
            .unwrap_or_else(|| now_ms - self.limit as i64 * self.timeframe.millis())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub max_per_request: usize,
    pub page_delay: Duration,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        PaginationConfig {
            max_per_request: 1500,
            page_delay: Duration::from_secs(1),
        }
    }
}

/// Bounded exponential backoff for a fallible fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// retries run out.
    pub fn run<T>(&self, mut op: impl FnMut() -> Result<T, EngineError>) -> Result<T, EngineError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.delay_for(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying fetch");
                pause(delay);
            }

            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    debug!(attempt, error = %err, "transient fetch failure");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(EngineError::RetriesExhausted {
            attempts: self.max_retries + 1,
            reason: last_error.map_or_else(|| "unknown".to_string(), |e| e.to_string()),
        })
    }
}

/// Everything needed to pull a candle history from disk or a remote source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    pub request: FetchRequest,
    pub dir: PathBuf,
    pub pagination: PaginationConfig,
    pub retry: RetryPolicy,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            request: FetchRequest {
                symbol: "BTC/USDT".to_string(),
                timeframe: Timeframe {
                    label: "15m".to_string(),
                    millis: 900_000,
                },
                limit: 100_000,
                since: None,
            },
            dir: PathBuf::from("data"),
            pagination: PaginationConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}

pub fn fetch_candles(
    source: &dyn CandleSource,
    request: &FetchRequest,
    pagination: &PaginationConfig,
    retry: &RetryPolicy,
) -> Result<CandleSeries, EngineError> {
    let max_per_request = pagination.max_per_request.max(1);
    let start = request.resolve_since(chrono::Utc::now().timestamp_millis());
    let mut since = start;
    let mut merged: BTreeMap<i64, Candle> = BTreeMap::new();
    let mut pages = 0usize;

    info!(
        symbol = %request.symbol,
        timeframe = %request.timeframe,
        limit = request.limit,
        since = %format_timestamp(since),
        "fetching candles"
    );

    while merged.len() < request.limit {
        let page_limit = (request.limit - merged.len()).min(max_per_request);
        let page = retry.run(|| {
            source.fetch_page(&request.symbol, request.timeframe.label(), since, page_limit)
        })?;

        let Some(last_ts) = page.iter().map(|c| c.timestamp).max() else {
            debug!(pages, "source returned an empty page");
            break;
        };
        pages += 1;
        let received = page.len();
        for candle in page {
            merged.insert(candle.timestamp, candle);
        }
        info!(page = pages, received, total = merged.len(), "fetched page");

        if last_ts < since {
            warn!(since, last_ts, "source returned no newer candles; stopping");
            break;
        }
        since = last_ts + 1;

        if merged.len() < request.limit && source.is_rate_limited() {
            pause(pagination.page_delay);
        }
    }

    if merged.is_empty() {
        warn!(
            symbol = %request.symbol,
            timeframe = %request.timeframe,
            since = %format_timestamp(start),
            "no candles at or after the requested start"
        );
    }

    CandleSeries::from_candles(merged.into_values())
}
