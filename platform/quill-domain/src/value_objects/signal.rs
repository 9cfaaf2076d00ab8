use crate::value_objects::side::Side;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub timestamp: i64,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
}

impl Signal {
    pub fn new(timestamp: i64, symbol: impl Into<String>, side: Side, quantity: f64) -> Self {
        Self {
            timestamp,
            symbol: symbol.into(),
            side,
            quantity,
        }
    }

    pub fn buy(timestamp: i64, symbol: impl Into<String>, quantity: f64) -> Self {
        Self::new(timestamp, symbol, Side::Buy, quantity)
    }

    pub fn sell(timestamp: i64, symbol: impl Into<String>, quantity: f64) -> Self {
        Self::new(timestamp, symbol, Side::Sell, quantity)
    }
}
