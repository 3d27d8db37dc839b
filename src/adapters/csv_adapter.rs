//! CSV file candle source.
//!
//! One file per symbol and timeframe: `{dir}/{SYMBOL}_{timeframe}.csv`, with
//! `/` in the symbol replaced by `-` (so `BTC/USDT` at `15m` lives in
//! `BTC-USDT_15m.csv`). Header: `timestamp,open,high,low,close,volume`, with
//! timestamps in milliseconds since the epoch.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::candle::Candle;
use crate::domain::error::EngineError;
use crate::ports::candle_source::CandleSource;

pub struct CsvAdapter {
    base_path: PathBuf,
    /// Last file parsed by `fetch_page`, so paging does not re-read it.
    loaded: RefCell<Option<(PathBuf, Vec<Candle>)>>,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            loaded: RefCell::new(None),
        }
    }

    pub fn csv_path(&self, symbol: &str, timeframe: &str) -> PathBuf {
        self.base_path
            .join(format!("{}_{}.csv", symbol.replace('/', "-"), timeframe))
    }

    /// Every candle in the file, ascending by timestamp.
    pub fn read_all(&self, symbol: &str, timeframe: &str) -> Result<Vec<Candle>, EngineError> {
        read_candles(&self.csv_path(symbol, timeframe))
    }

    /// Write `candles` as the file for `symbol`/`timeframe`, replacing it.
    pub fn write_all(
        &self,
        symbol: &str,
        timeframe: &str,
        candles: &[Candle],
    ) -> Result<PathBuf, EngineError> {
        fs::create_dir_all(&self.base_path)?;
        let path = self.csv_path(symbol, timeframe);
        self.loaded.borrow_mut().take();
        let mut writer = csv::Writer::from_path(&path).map_err(csv_error)?;
        for candle in candles {
            writer.serialize(candle).map_err(csv_error)?;
        }
        writer.flush()?;
        Ok(path)
    }
}

impl CandleSource for CsvAdapter {
    fn fetch_page(
        &self,
        symbol: &str,
        timeframe: &str,
        since: i64,
        limit: usize,
    ) -> Result<Vec<Candle>, EngineError> {
        let path = self.csv_path(symbol, timeframe);
        let mut loaded = self.loaded.borrow_mut();
        let stale = !matches!(loaded.as_ref(), Some((cached, _)) if *cached == path);
        if stale {
            *loaded = Some((path.clone(), read_candles(&path)?));
        }

        let Some((_, candles)) = loaded.as_ref() else {
            return Ok(Vec::new());
        };
        let start = candles.partition_point(|c| c.timestamp < since);
        Ok(candles[start..].iter().take(limit).copied().collect())
    }

    fn is_rate_limited(&self) -> bool {
        false
    }
}

fn read_candles(path: &Path) -> Result<Vec<Candle>, EngineError> {
    let content = fs::read_to_string(path)?;
    let mut rdr = csv::Reader::from_reader(content.as_bytes());

    let mut candles = Vec::new();
    for (row, result) in rdr.deserialize::<Candle>().enumerate() {
        let candle = result.map_err(|e| EngineError::MalformedData {
            reason: format!("{} row {}: {}", path.display(), row + 1, e),
        })?;
        candles.push(candle);
    }

    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}

fn csv_error(e: csv::Error) -> EngineError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => EngineError::Io(io),
        other => EngineError::MalformedData {
            reason: format!("{other:?}"),
        },
    }
}
