//! Strategy and run parameters.

use serde::{Deserialize, Serialize};

use crate::domain::broker::CommissionSchedule;
use crate::domain::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    pub rsi_period: usize,
    pub rsi_oversold_threshold: f64,
    pub risk_fraction: f64,
    pub reward_multiple: f64,
    pub lookback: usize,
    pub starting_cash: f64,
    pub commission_rate: f64,
    pub commission: CommissionSchedule,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            fast_period: 50,
            slow_period: 200,
            rsi_period: 14,
            rsi_oversold_threshold: 30.0,
            risk_fraction: 0.01,
            reward_multiple: 2.0,
            lookback: 6,
            starting_cash: 1000.0,
            commission_rate: 0.001,
            commission: CommissionSchedule::PriceMove,
        }
    }
}

impl StrategyConfig {
    /// Bars needed before the first entry can possibly fire.
    pub fn warmup_bars(&self) -> usize {
        self.fast_period
            .max(self.slow_period)
            .max(self.rsi_period + 1)
            .max(self.lookback)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.fast_period == 0 {
            return Err(EngineError::invalid("strategy", "fast_period", "must be at least 1"));
        }
        if self.slow_period == 0 {
            return Err(EngineError::invalid("strategy", "slow_period", "must be at least 1"));
        }
        if self.rsi_period == 0 {
            return Err(EngineError::invalid("strategy", "rsi_period", "must be at least 1"));
        }
        if !(0.0..=100.0).contains(&self.rsi_oversold_threshold) {
            return Err(EngineError::invalid(
                "strategy",
                "rsi_oversold_threshold",
                "must be between 0 and 100",
            ));
        }
        if !(self.risk_fraction > 0.0 && self.risk_fraction <= 1.0) {
            return Err(EngineError::invalid(
                "strategy",
                "risk_fraction",
                "must be in (0, 1]",
            ));
        }
        if !(self.reward_multiple > 0.0 && self.reward_multiple.is_finite()) {
            return Err(EngineError::invalid(
                "strategy",
                "reward_multiple",
                "must be positive",
            ));
        }
        if self.lookback == 0 {
            return Err(EngineError::invalid("strategy", "lookback", "must be at least 1"));
        }
        if !(self.starting_cash > 0.0 && self.starting_cash.is_finite()) {
            return Err(EngineError::invalid(
                "backtest",
                "starting_cash",
                "must be positive",
            ));
        }
        if !(self.commission_rate >= 0.0 && self.commission_rate.is_finite()) {
            return Err(EngineError::invalid(
                "backtest",
                "commission_rate",
                "must be non-negative",
            ));
        }
        if let CommissionSchedule::Flat { per_trade } = self.commission {
            if !(per_trade >= 0.0 && per_trade.is_finite()) {
                return Err(EngineError::invalid(
                    "backtest",
                    "commission_flat",
                    "must be non-negative",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = StrategyConfig::default();
        assert_eq!(c.fast_period, 50);
        assert_eq!(c.slow_period, 200);
        assert_eq!(c.rsi_period, 14);
        assert!((c.rsi_oversold_threshold - 30.0).abs() < f64::EPSILON);
        assert!((c.risk_fraction - 0.01).abs() < f64::EPSILON);
        assert!((c.reward_multiple - 2.0).abs() < f64::EPSILON);
        assert_eq!(c.lookback, 6);
        assert!((c.starting_cash - 1000.0).abs() < f64::EPSILON);
        assert!((c.commission_rate - 0.001).abs() < f64::EPSILON);
        assert_eq!(c.commission, CommissionSchedule::PriceMove);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn warmup_is_longest_requirement() {
        assert_eq!(StrategyConfig::default().warmup_bars(), 200);
        let c = StrategyConfig {
            fast_period: 3,
            slow_period: 5,
            rsi_period: 14,
            ..StrategyConfig::default()
        };
        assert_eq!(c.warmup_bars(), 15);
    }

    #[test]
    fn zero_period_rejected() {
        let c = StrategyConfig {
            slow_period: 0,
            ..StrategyConfig::default()
        };
        let err = c.validate().unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid { ref key, .. } if key == "slow_period"));
    }

    #[test]
    fn risk_fraction_bounds() {
        for bad in [0.0, -0.1, 1.5, f64::NAN] {
            let c = StrategyConfig {
                risk_fraction: bad,
                ..StrategyConfig::default()
            };
            assert!(c.validate().is_err(), "risk_fraction {bad} accepted");
        }
        let full = StrategyConfig {
            risk_fraction: 1.0,
            ..StrategyConfig::default()
        };
        assert!(full.validate().is_ok());
    }

    #[test]
    fn zero_lookback_rejected() {
        let c = StrategyConfig {
            lookback: 0,
            ..StrategyConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn negative_commission_rejected() {
        let c = StrategyConfig {
            commission_rate: -0.001,
            ..StrategyConfig::default()
        };
        assert!(c.validate().is_err());

        let flat = StrategyConfig {
            commission: CommissionSchedule::Flat { per_trade: -1.0 },
            ..StrategyConfig::default()
        };
        assert!(flat.validate().is_err());
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let c = StrategyConfig {
            rsi_oversold_threshold: 120.0,
            ..StrategyConfig::default()
        };
        assert!(c.validate().is_err());
    }
}
