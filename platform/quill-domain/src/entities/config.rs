use crate::errors::BacktestError;
use crate::value_objects::reversal_mode::ReversalMode;
use serde::{Deserialize, Serialize};

/// Inputs every engine backend receives for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub fast: usize,
    pub slow: usize,
    pub qty: f64,
    pub cash: f64,
    pub commission: f64,
    pub reversal_mode: ReversalMode,
    pub symbol: String,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            fast: 9,
            slow: 21,
            qty: 0.01,
            cash: 100_000.0,
            commission: 0.0,
            reversal_mode: ReversalMode::default(),
            symbol: "UNKNOWN".to_string(),
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), BacktestError> {
        self.validate_periods()?;
        self.validate_account()
    }

    /// Indicator periods; only strategies that read `fast`/`slow` need them.
    pub fn validate_periods(&self) -> Result<(), BacktestError> {
        if self.fast == 0 || self.slow == 0 {
            return Err(BacktestError::InvalidConfig(
                "fast and slow periods must be > 0".to_string(),
            ));
        }
        if self.fast >= self.slow {
            return Err(BacktestError::InvalidConfig(format!(
                "fast period ({}) must be smaller than slow period ({})",
                self.fast, self.slow
            )));
        }
        Ok(())
    }

    pub fn validate_account(&self) -> Result<(), BacktestError> {
        if !self.qty.is_finite() || self.qty <= 0.0 {
            return Err(BacktestError::InvalidConfig(format!(
                "qty must be a positive number (got {})",
                self.qty
            )));
        }
        if !self.cash.is_finite() || self.cash < 0.0 {
            return Err(BacktestError::InvalidConfig(format!(
                "cash must be >= 0 (got {})",
                self.cash
            )));
        }
        if !self.commission.is_finite() || !(0.0..1.0).contains(&self.commission) {
            return Err(BacktestError::InvalidConfig(format!(
                "commission must be in [0, 1) (got {})",
                self.commission
            )));
        }
        if self.symbol.trim().is_empty() {
            return Err(BacktestError::InvalidConfig(
                "symbol must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
