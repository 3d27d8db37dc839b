//! Market data source port.

use crate::domain::candle::Candle;
use crate::domain::error::EngineError;

/// One page of historical candles for a symbol.
///
/// Implementations return candles with `timestamp >= since`, ascending, and at
/// most `limit` of them. An empty page means there is nothing newer.
pub trait CandleSource {
    fn fetch_page(
        &self,
        symbol: &str,
        timeframe: &str,
        since: i64,
        limit: usize,
    ) -> Result<Vec<Candle>, EngineError>;

    /// Whether consecutive pages must be spaced by the pagination delay.
    /// Remote APIs are; local stores are not.
    fn is_rate_limited(&self) -> bool {
        true
    }
}
