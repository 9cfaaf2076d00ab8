mod ema_crossover;
mod vwap_breakout;

pub use ema_crossover::EmaCrossover;
pub use vwap_breakout::{VwapBreakout, VwapParams};

use crate::entities::config::BacktestConfig;
use crate::errors::BacktestError;
use crate::value_objects::bar::PriceBar;
use crate::value_objects::signal::Signal;
use std::collections::BTreeMap;

/// Named indicator series aligned with the input bars.
pub type IndicatorColumns = BTreeMap<String, Vec<f64>>;

/// Turns a price series into trade intents. Implementations are stateless across
/// calls so one instance can back any number of runs.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    fn params(&self, config: &BacktestConfig) -> serde_json::Value;

    fn generate_signals(&self, bars: &[PriceBar], config: &BacktestConfig) -> Vec<Signal>;

    fn validate_config(&self, config: &BacktestConfig) -> Result<(), BacktestError> {
        config.validate()
    }

    fn annotate(&self, _bars: &[PriceBar], _config: &BacktestConfig) -> IndicatorColumns {
        IndicatorColumns::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    EmaCrossover,
    VwapBreakout,
}

impl StrategyKind {
    pub fn parse(name: &str) -> Result<Self, BacktestError> {
        match name.trim().to_lowercase().replace('-', "_").as_str() {
            "ema_crossover" | "ema" => Ok(StrategyKind::EmaCrossover),
            "vwap_breakout" | "vwap" => Ok(StrategyKind::VwapBreakout),
            _ => Err(BacktestError::UnknownStrategy(name.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::EmaCrossover => "ema_crossover",
            StrategyKind::VwapBreakout => "vwap_breakout",
        }
    }
}

pub fn resolve_strategy(name: &str, vwap: VwapParams) -> Result<Box<dyn Strategy>, BacktestError> {
    Ok(match StrategyKind::parse(name)? {
        StrategyKind::EmaCrossover => Box::new(EmaCrossover),
        StrategyKind::VwapBreakout => Box::new(VwapBreakout::new(vwap)),
    })
}
