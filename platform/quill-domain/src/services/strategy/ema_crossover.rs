use super::{IndicatorColumns, Strategy};
use crate::entities::config::BacktestConfig;
use crate::services::indicators::ema;
use crate::value_objects::bar::PriceBar;
use crate::value_objects::signal::Signal;
use serde_json::json;

/// Buys when the fast EMA moves above the slow one and sells when it moves below.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmaCrossover;

impl EmaCrossover {
    fn lines(bars: &[PriceBar], config: &BacktestConfig) -> (Vec<f64>, Vec<f64>) {
        let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
        (ema(&closes, config.fast), ema(&closes, config.slow))
    }
}

impl Strategy for EmaCrossover {
    fn name(&self) -> &str {
        "ema_crossover"
    }

    fn params(&self, config: &BacktestConfig) -> serde_json::Value {
        json!({
            "fast": config.fast,
            "slow": config.slow,
            "qty": config.qty,
        })
    }

    fn generate_signals(&self, bars: &[PriceBar], config: &BacktestConfig) -> Vec<Signal> {
        let (fast, slow) = Self::lines(bars, config);
        let mut signals = Vec::new();
        let mut last_regime = 0i8;

        for ((bar, fast), slow) in bars.iter().zip(&fast).zip(&slow) {
            let regime = if fast > slow {
                1
            } else if fast < slow {
                -1
            } else {
                0
            };
            if regime == last_regime {
                continue;
            }
            last_regime = regime;
            match regime {
                1 => signals.push(Signal::buy(bar.timestamp, &config.symbol, config.qty)),
                -1 => signals.push(Signal::sell(bar.timestamp, &config.symbol, config.qty)),
                _ => {}
            }
        }
        signals
    }

    fn annotate(&self, bars: &[PriceBar], config: &BacktestConfig) -> IndicatorColumns {
        let (fast, slow) = Self::lines(bars, config);
        IndicatorColumns::from([
            ("ema_fast".to_string(), fast),
            ("ema_slow".to_string(), slow),
        ])
    }
}
