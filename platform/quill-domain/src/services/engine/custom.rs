use super::paper_broker::{BrokerFill, PaperBroker};
use super::{finish, prepare, replay_by_bar, Engine, EngineBackend, EngineOutput};
use crate::entities::config::BacktestConfig;
use crate::errors::BacktestError;
use crate::services::audit::{AuditEvent, RunContext};
use crate::services::ledger::{realized_pnl, FillModel, TradeLedger};
use crate::services::state_machine::PositionStateMachine;
use crate::services::strategy::Strategy;
use crate::value_objects::bar::PriceBar;
use crate::value_objects::signal::Signal;
use crate::value_objects::trade::Trade;
use serde_json::json;

/// Broker-native backend: transitions are submitted as market orders to a
/// [`PaperBroker`] and its fills are translated into ledger trades.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomEngine;

/// The broker reports net pnl; the ledger keeps the gross figure and the fee apart.
fn to_trade(fill: &BrokerFill) -> Trade {
    Trade {
        timestamp: fill.timestamp,
        symbol: fill.symbol.clone(),
        side: fill.side,
        quantity: fill.quantity,
        price: fill.avg_price,
        fee: fill.fee,
        pnl: fill.realized.map(|realized| {
            realized_pnl(
                realized.entry_price,
                fill.avg_price,
                realized.quantity,
                realized.direction,
            )
        }),
    }
}

impl Engine for CustomEngine {
    fn backend(&self) -> EngineBackend {
        EngineBackend::Custom
    }

    fn run_signals(
        &self,
        bars: &[PriceBar],
        signals: &[Signal],
        strategy: &dyn Strategy,
        config: &BacktestConfig,
        ctx: &RunContext<'_>,
    ) -> Result<EngineOutput, BacktestError> {
        let (index, normalized) = prepare(bars, signals, strategy, config, ctx)?;
        let fill_model = FillModel::new(config.commission);
        let mut machine = PositionStateMachine::new(config.reversal_mode);
        let mut broker = PaperBroker::new(config.cash, fill_model);
        let mut ledger = TradeLedger::new();

        replay_by_bar(
            &index,
            &normalized.signals,
            self.backend(),
            ctx,
            |bar, due| {
                let price = fill_model.fill_price(bar);
                for signal in due {
                    for transition in machine.on_signal(signal, price, ctx) {
                        let fill = broker.submit_market(
                            transition.timestamp,
                            &transition.symbol,
                            transition.side,
                            transition.quantity,
                            transition.price,
                        );
                        ledger.append(to_trade(&fill));
                    }
                }
            },
        )?;

        ctx.emit(
            AuditEvent::new(
                ledger.trades().last().map(|t| t.timestamp).unwrap_or(0),
                "broker",
                "summary",
            )
            .with_symbol(&config.symbol)
            .with_details(json!({
                "cash": broker.cash(),
                "net_pnl": broker.realized_net_pnl(),
                "fills": ledger.len(),
            })),
        );

        Ok(finish(
            self.backend(),
            bars,
            strategy,
            config,
            ledger.into_trades(),
            &normalized,
            ctx,
        ))
    }
}
