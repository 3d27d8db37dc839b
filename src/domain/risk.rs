//! Risk-based position sizing.
//!
//! size = (cash * risk_fraction) / stop_distance, so a stop-out loses exactly
//! `risk_fraction` of current cash (before commission). Only a strictly
//! positive, finite size is ever returned.

use crate::domain::error::EngineError;

pub fn position_size(
    cash: f64,
    risk_fraction: f64,
    stop_distance: f64,
) -> Result<f64, EngineError> {
    if !stop_distance.is_finite() || stop_distance <= 0.0 {
        return Err(EngineError::InvalidStopDistance {
            distance: stop_distance,
        });
    }
    if !cash.is_finite() || cash <= 0.0 {
        return Err(EngineError::InsufficientCash { cash });
    }
    let size = cash * risk_fraction / stop_distance;
    if !size.is_finite() || size <= 0.0 {
        return Err(EngineError::InvalidStopDistance {
            distance: stop_distance,
        });
    }
    Ok(size)
}
