use crate::services::state_machine::{Transition, TransitionKind};
use crate::value_objects::bar::PriceBar;
use crate::value_objects::trade::Trade;
use std::collections::BTreeMap;

/// Fills at the bar close with a proportional commission.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FillModel {
    pub commission: f64,
}

impl FillModel {
    pub fn new(commission: f64) -> Self {
        Self { commission }
    }

    pub fn fill_price(&self, bar: &PriceBar) -> f64 {
        bar.close
    }

    pub fn fee(&self, quantity: f64, price: f64) -> f64 {
        quantity * price * self.commission
    }
}

/// Gross realized pnl; `direction` is +1 for a long being closed, -1 for a short.
pub fn realized_pnl(entry_price: f64, exit_price: f64, quantity: f64, direction: f64) -> f64 {
    (exit_price - entry_price) * quantity * direction
}

/// Append-only trade record. The live positions are a projection of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeLedger {
    trades: Vec<Trade>,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, transition: &Transition, fill: &FillModel) -> &Trade {
        let pnl = match (transition.kind, transition.closed) {
            (TransitionKind::Close, Some(closed)) => Some(realized_pnl(
                closed.entry_price,
                transition.price,
                transition.quantity,
                closed.direction,
            )),
            _ => None,
        };
        self.append(Trade {
            timestamp: transition.timestamp,
            symbol: transition.symbol.clone(),
            side: transition.side,
            quantity: transition.quantity,
            price: transition.price,
            fee: fill.fee(transition.quantity, transition.price),
            pnl,
        })
    }

    pub fn apply_all(&mut self, transitions: &[Transition], fill: &FillModel) {
        for transition in transitions {
            self.apply(transition, fill);
        }
    }

    pub fn append(&mut self, trade: Trade) -> &Trade {
        self.trades.push(trade);
        &self.trades[self.trades.len() - 1]
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn into_trades(self) -> Vec<Trade> {
        self.trades
    }

    /// Signed quantity per symbol obtained by replaying every trade from the start.
    pub fn positions(&self) -> BTreeMap<String, f64> {
        replay_positions(&self.trades)
    }
}

pub fn replay_positions(trades: &[Trade]) -> BTreeMap<String, f64> {
    let mut positions = BTreeMap::new();
    for trade in trades {
        *positions.entry(trade.symbol.clone()).or_insert(0.0) += trade.signed_quantity();
    }
    positions
}
