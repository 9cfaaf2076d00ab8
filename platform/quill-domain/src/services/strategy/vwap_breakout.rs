use super::{IndicatorColumns, Strategy};
use crate::entities::config::BacktestConfig;
use crate::errors::BacktestError;
use crate::services::indicators::{anchored_vwap, Session};
use crate::value_objects::bar::PriceBar;
use crate::value_objects::side::Side;
use crate::value_objects::signal::Signal;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VwapParams {
    pub session: Session,
    pub mult: f64,
    pub stop_loss: f64,
    pub target_profit: f64,
}

impl Default for VwapParams {
    fn default() -> Self {
        Self {
            session: Session::Week,
            mult: 2.0,
            stop_loss: 0.01,
            target_profit: 0.04,
        }
    }
}

/// Band breakout around a session-anchored VWAP with fixed stop loss and
/// take profit relative to the entry close.
#[derive(Debug, Clone, Copy, Default)]
pub struct VwapBreakout {
    params: VwapParams,
}

impl VwapBreakout {
    pub fn new(params: VwapParams) -> Self {
        Self { params }
    }

    fn exit_hit(&self, side: Side, entry: f64, close: f64) -> bool {
        let VwapParams {
            stop_loss,
            target_profit,
            ..
        } = self.params;
        match side {
            Side::Buy => close <= entry * (1.0 - stop_loss) || close >= entry * (1.0 + target_profit),
            Side::Sell => close >= entry * (1.0 + stop_loss) || close <= entry * (1.0 - target_profit),
        }
    }
}

impl Strategy for VwapBreakout {
    fn name(&self) -> &str {
        "vwap_breakout"
    }

    fn params(&self, config: &BacktestConfig) -> serde_json::Value {
        json!({
            "session": self.params.session.as_str(),
            "mult": self.params.mult,
            "stop_loss": self.params.stop_loss,
            "target_profit": self.params.target_profit,
            "qty": config.qty,
        })
    }

    fn validate_config(&self, config: &BacktestConfig) -> Result<(), BacktestError> {
        config.validate_account()
    }

    fn generate_signals(&self, bars: &[PriceBar], config: &BacktestConfig) -> Vec<Signal> {
        let bands = anchored_vwap(bars, self.params.session, self.params.mult);
        let emit = |timestamp: i64, side: Side| {
            Signal::new(timestamp, config.symbol.as_str(), side, config.qty)
        };

        let mut signals = Vec::new();
        // Live direction and entry close.
        let mut open: Option<(Side, f64)> = None;

        for idx in 1..bars.len() {
            let (Some(prev), Some(cur)) = (bands.point(idx - 1), bands.point(idx)) else {
                continue;
            };
            let prev_close = bars[idx - 1].close;
            let bar = &bars[idx];
            let close = bar.close;

            if let Some((side, entry)) = open {
                if self.exit_hit(side, entry, close) {
                    signals.push(emit(bar.timestamp, side.opposite()));
                    open = None;
                }
            }

            if prev_close < prev.upper && close > cur.upper {
                match open {
                    Some((Side::Buy, _)) => {}
                    Some((Side::Sell, _)) => {
                        signals.push(emit(bar.timestamp, Side::Buy));
                        signals.push(emit(bar.timestamp, Side::Buy));
                        open = Some((Side::Buy, close));
                    }
                    None => {
                        signals.push(emit(bar.timestamp, Side::Buy));
                        open = Some((Side::Buy, close));
                    }
                }
            }

            if prev_close > prev.lower && close < cur.lower {
                match open {
                    Some((Side::Sell, _)) => {}
                    Some((Side::Buy, _)) => {
                        signals.push(emit(bar.timestamp, Side::Sell));
                        signals.push(emit(bar.timestamp, Side::Sell));
                        open = Some((Side::Sell, close));
                    }
                    None => {
                        signals.push(emit(bar.timestamp, Side::Sell));
                        open = Some((Side::Sell, close));
                    }
                }
            }
        }
        signals
    }

    fn annotate(&self, bars: &[PriceBar], _config: &BacktestConfig) -> IndicatorColumns {
        let bands = anchored_vwap(bars, self.params.session, self.params.mult);
        IndicatorColumns::from([
            ("vwap".to_string(), bands.vwap),
            ("vwap_upper".to_string(), bands.upper),
            ("vwap_lower".to_string(), bands.lower),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::{VwapBreakout, VwapParams};
    use crate::entities::config::BacktestConfig;
    use crate::services::indicators::Session;
    use crate::services::strategy::Strategy;
    use crate::value_objects::bar::PriceBar;
    use crate::value_objects::side::Side;

    fn bar(idx: i64, close: f64) -> PriceBar {
        PriceBar {
            timestamp: idx * 60,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    fn strategy(stop_loss: f64, target_profit: f64) -> VwapBreakout {
        VwapBreakout::new(VwapParams {
            session: Session::Day,
            mult: 0.5,
            stop_loss,
            target_profit,
        })
    }

    #[test]
    fn breakout_above_upper_band_goes_long_then_takes_profit() {
        let bars = vec![bar(0, 100.0), bar(1, 99.0), bar(2, 100.0), bar(3, 111.0)];
        let signals = strategy(0.05, 0.10).generate_signals(&bars, &BacktestConfig::default());
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].side, Side::Buy);
        assert_eq!(signals[0].timestamp, 120);
        assert_eq!(signals[1].side, Side::Sell);
        assert_eq!(signals[1].timestamp, 180);
    }

    #[test]
    fn breakdown_below_lower_band_goes_short() {
        let bars = vec![bar(0, 100.0), bar(1, 101.0), bar(2, 90.0)];
        let signals = strategy(0.5, 0.5).generate_signals(&bars, &BacktestConfig::default());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].side, Side::Sell);
        assert_eq!(signals[0].timestamp, 120);
    }

    #[test]
    fn fewer_than_two_bars_emit_nothing() {
        let signals = strategy(0.01, 0.04).generate_signals(&[bar(0, 1.0)], &BacktestConfig::default());
        assert!(signals.is_empty());
    }

    #[test]
    fn annotates_band_columns() {
        let bars = vec![bar(0, 100.0), bar(1, 101.0)];
        let columns = strategy(0.01, 0.04).annotate(&bars, &BacktestConfig::default());
        assert_eq!(columns.len(), 3);
        assert!(columns["vwap_upper"][1] >= columns["vwap"][1]);
        assert!(columns["vwap_lower"][1] <= columns["vwap"][1]);
    }
}
