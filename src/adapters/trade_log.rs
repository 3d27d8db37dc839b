//! Closed-trade log export.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::domain::candle::format_timestamp;
use crate::domain::error::EngineError;
use crate::domain::position::{TradeOutcome, TradeRecord};

#[derive(Serialize)]
struct TradeRow {
    opened: String,
    closed: String,
    outcome: TradeOutcome,
    entry_price: f64,
    exit_price: f64,
    size: f64,
    pnl: f64,
    commission: f64,
    net_pnl: f64,
}

impl From<&TradeRecord> for TradeRow {
    fn from(t: &TradeRecord) -> Self {
        TradeRow {
            opened: format_timestamp(t.opened_at),
            closed: format_timestamp(t.closed_at),
            outcome: t.outcome,
            entry_price: t.entry_price,
            exit_price: t.exit_price,
            size: t.size,
            pnl: t.pnl,
            commission: t.commission,
            net_pnl: t.net_pnl(),
        }
    }
}

pub fn write_trade_log<W: Write>(writer: W, trades: &[TradeRecord]) -> Result<(), EngineError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    // Written explicitly so an empty log still has a header row.
    wtr.write_record([
        "opened",
        "closed",
        "outcome",
        "entry_price",
        "exit_price",
        "size",
        "pnl",
        "commission",
        "net_pnl",
    ])
    .map_err(to_engine_error)?;
    for trade in trades {
        wtr.serialize(TradeRow::from(trade))
            .map_err(to_engine_error)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_trade_log_file(path: &Path, trades: &[TradeRecord]) -> Result<(), EngineError> {
    let file = std::fs::File::create(path)?;
    write_trade_log(file, trades)
}

fn to_engine_error(e: csv::Error) -> EngineError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => EngineError::Io(io),
        other => EngineError::MalformedData {
            reason: format!("trade log: {other:?}"),
        },
    }
}
