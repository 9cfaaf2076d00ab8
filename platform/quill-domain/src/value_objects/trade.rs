use crate::value_objects::side::Side;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: i64,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub fee: f64,
    /// Realized pnl, present only on a closing trade.
    pub pnl: Option<f64>,
}

impl Trade {
    pub fn is_closing(&self) -> bool {
        self.pnl.is_some()
    }

    pub fn signed_quantity(&self) -> f64 {
        self.side.sign() * self.quantity
    }
}
