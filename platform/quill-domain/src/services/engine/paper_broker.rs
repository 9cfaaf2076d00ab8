use crate::services::ledger::FillModel;
use crate::value_objects::position::Position;
use crate::value_objects::side::Side;
use std::collections::BTreeMap;

/// Part of a fill that reduced an existing position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Realized {
    pub entry_price: f64,
    /// +1 when a long was reduced, -1 for a short.
    pub direction: f64,
    pub quantity: f64,
    /// Gross pnl minus the whole fill's fee.
    pub net_pnl: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerFill {
    pub order_id: u64,
    pub timestamp: i64,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub avg_price: f64,
    pub fee: f64,
    pub realized: Option<Realized>,
}

/// In-process broker that fills market orders immediately at the quoted price
/// and keeps average-price positions with cash.
#[derive(Debug, Clone)]
pub struct PaperBroker {
    fill_model: FillModel,
    cash: f64,
    positions: BTreeMap<String, Position>,
    next_order_id: u64,
    realized_net: f64,
}

impl PaperBroker {
    pub fn new(cash: f64, fill_model: FillModel) -> Self {
        Self {
            fill_model,
            cash,
            positions: BTreeMap::new(),
            next_order_id: 1,
            realized_net: 0.0,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn realized_net_pnl(&self) -> f64 {
        self.realized_net
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn submit_market(
        &mut self,
        timestamp: i64,
        symbol: &str,
        side: Side,
        quantity: f64,
        price: f64,
    ) -> BrokerFill {
        let order_id = self.next_order_id;
        self.next_order_id += 1;

        let fee = self.fill_model.fee(quantity, price);
        match side {
            Side::Buy => self.cash -= quantity * price + fee,
            Side::Sell => self.cash += quantity * price - fee,
        }

        let position = self
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position::flat(symbol));
        let held = position.quantity;
        let signed = side.sign() * quantity;

        let realized = if held == 0.0 || held.signum() == signed.signum() {
            position.avg_price = if held == 0.0 {
                price
            } else {
                (position.avg_price * held.abs() + price * quantity) / (held.abs() + quantity)
            };
            position.quantity = held + signed;
            None
        } else {
            let closed = quantity.min(held.abs());
            let direction = held.signum();
            let entry_price = position.avg_price;
            let gross = (price - entry_price) * closed * direction;
            position.quantity = held + signed;
            if position.quantity == 0.0 {
                position.avg_price = 0.0;
            } else if position.quantity.signum() != direction {
                // Order flipped the position; the remainder opens at this price.
                position.avg_price = price;
            }
            self.realized_net += gross - fee;
            Some(Realized {
                entry_price,
                direction,
                quantity: closed,
                net_pnl: gross - fee,
            })
        };

        BrokerFill {
            order_id,
            timestamp,
            symbol: symbol.to_string(),
            side,
            quantity,
            avg_price: price,
            fee,
            realized,
        }
    }
}
