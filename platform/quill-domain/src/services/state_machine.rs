use crate::services::audit::{AuditEvent, RunContext};
use crate::services::normalizer::PriceIndex;
use crate::value_objects::position::{Position, PositionState};
use crate::value_objects::reversal_mode::ReversalMode;
use crate::value_objects::side::Side;
use crate::value_objects::signal::Signal;
use serde_json::json;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Open,
    Close,
}

/// Entry data of the position a closing transition flattens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosedPosition {
    pub entry_price: f64,
    /// +1 for a long being closed, -1 for a short.
    pub direction: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub kind: TransitionKind,
    pub timestamp: i64,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub closed: Option<ClosedPosition>,
}

/// Flat / Long / Short machine, one position per symbol.
///
/// | state | buy              | sell             |
/// |-------|------------------|------------------|
/// | Flat  | open long        | open short       |
/// | Long  | ignored          | close (+ open short in reverse mode) |
/// | Short | close (+ open long in reverse mode) | ignored |
#[derive(Debug, Clone)]
pub struct PositionStateMachine {
    reversal_mode: ReversalMode,
    positions: BTreeMap<String, Position>,
}

impl PositionStateMachine {
    pub fn new(reversal_mode: ReversalMode) -> Self {
        Self {
            reversal_mode,
            positions: BTreeMap::new(),
        }
    }

    pub fn reversal_mode(&self) -> ReversalMode {
        self.reversal_mode
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn state(&self, symbol: &str) -> PositionState {
        self.positions
            .get(symbol)
            .map(Position::state)
            .unwrap_or(PositionState::Flat)
    }

    pub fn on_signal(
        &mut self,
        signal: &Signal,
        fill_price: f64,
        ctx: &RunContext<'_>,
    ) -> Vec<Transition> {
        match (self.state(&signal.symbol), signal.side) {
            (PositionState::Flat, _) => vec![self.open(signal, fill_price)],
            (PositionState::Long, Side::Buy) | (PositionState::Short, Side::Sell) => {
                ctx.emit(
                    AuditEvent::new(signal.timestamp, "state_machine", "ignore_duplicate")
                        .with_symbol(&signal.symbol)
                        .with_details(json!({
                            "side": signal.side.as_str(),
                            "qty": signal.quantity,
                        })),
                );
                Vec::new()
            }
            (PositionState::Long, Side::Sell) | (PositionState::Short, Side::Buy) => {
                let close = self.close(signal, fill_price);
                match self.reversal_mode {
                    ReversalMode::CloseOnly => vec![close],
                    ReversalMode::Reverse => vec![close, self.open(signal, fill_price)],
                }
            }
        }
    }

    /// Drives the machine over an already normalized signal sequence.
    pub fn run_all(
        &mut self,
        signals: &[Signal],
        index: &PriceIndex<'_>,
        ctx: &RunContext<'_>,
    ) -> Vec<Transition> {
        let mut transitions = Vec::with_capacity(signals.len());
        for signal in signals {
            let Some(price) = index.close(signal.timestamp) else {
                continue;
            };
            transitions.extend(self.on_signal(signal, price, ctx));
        }
        transitions
    }

    fn open(&mut self, signal: &Signal, fill_price: f64) -> Transition {
        let position = self
            .positions
            .entry(signal.symbol.clone())
            .or_insert_with(|| Position::flat(signal.symbol.clone()));
        position.quantity = signal.side.sign() * signal.quantity;
        position.avg_price = fill_price;

        Transition {
            kind: TransitionKind::Open,
            timestamp: signal.timestamp,
            symbol: signal.symbol.clone(),
            side: signal.side,
            quantity: signal.quantity,
            price: fill_price,
            closed: None,
        }
    }

    fn close(&mut self, signal: &Signal, fill_price: f64) -> Transition {
        let position = self
            .positions
            .entry(signal.symbol.clone())
            .or_insert_with(|| Position::flat(signal.symbol.clone()));
        let closed = ClosedPosition {
            entry_price: position.avg_price,
            direction: position.quantity.signum(),
        };
        let quantity = position.quantity.abs();
        position.quantity = 0.0;
        position.avg_price = 0.0;

        Transition {
            kind: TransitionKind::Close,
            timestamp: signal.timestamp,
            symbol: signal.symbol.clone(),
            side: signal.side,
            quantity,
            price: fill_price,
            closed: Some(closed),
        }
    }
}
