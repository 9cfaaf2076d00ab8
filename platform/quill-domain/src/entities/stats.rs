use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Stats {
    pub total_return: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub trade_count: usize,
    pub pnl_sum: f64,
    pub cagr: f64,
}

impl Stats {
    /// Flat `name -> value` view consumed by report renderers.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("total_return".to_string(), self.total_return),
            ("sharpe".to_string(), self.sharpe),
            ("max_drawdown".to_string(), self.max_drawdown),
            ("win_rate".to_string(), self.win_rate),
            ("trade_count".to_string(), self.trade_count as f64),
            ("pnl_sum".to_string(), self.pnl_sum),
            ("cagr".to_string(), self.cagr),
        ])
    }

    pub fn is_finite(&self) -> bool {
        [
            self.total_return,
            self.sharpe,
            self.max_drawdown,
            self.win_rate,
            self.pnl_sum,
            self.cagr,
        ]
        .iter()
        .all(|value| value.is_finite())
    }
}
