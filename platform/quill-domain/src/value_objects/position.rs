use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionState {
    Flat,
    Long,
    Short,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Signed: positive long, negative short, zero flat.
    pub quantity: f64,
    pub avg_price: f64,
}

impl Position {
    pub fn flat(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            quantity: 0.0,
            avg_price: 0.0,
        }
    }

    pub fn state(&self) -> PositionState {
        if self.quantity > 0.0 {
            PositionState::Long
        } else if self.quantity < 0.0 {
            PositionState::Short
        } else {
            PositionState::Flat
        }
    }

    pub fn is_flat(&self) -> bool {
        self.state() == PositionState::Flat
    }
}
