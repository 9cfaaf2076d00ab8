use super::{finish, prepare, replay_by_bar, Engine, EngineBackend, EngineOutput};
use crate::entities::config::BacktestConfig;
use crate::errors::BacktestError;
use crate::services::audit::RunContext;
use crate::services::ledger::{FillModel, TradeLedger};
use crate::services::state_machine::PositionStateMachine;
use crate::services::strategy::Strategy;
use crate::value_objects::bar::PriceBar;
use crate::value_objects::signal::Signal;

/// Sequential backend: one step per bar, fills booked as soon as the bar's
/// signals are dispatched. Cancellation is checked on every bar.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventEngine;

impl Engine for EventEngine {
    fn backend(&self) -> EngineBackend {
        EngineBackend::Event
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
        let fill = FillModel::new(config.commission);
        let mut machine = PositionStateMachine::new(config.reversal_mode);
        let mut ledger = TradeLedger::new();

        replay_by_bar(
            &index,
            &normalized.signals,
            self.backend(),
            ctx,
            |bar, due| {
                let price = fill.fill_price(bar);
                for signal in due {
                    for transition in machine.on_signal(signal, price, ctx) {
                        ledger.apply(&transition, &fill);
                    }
                }
            },
        )?;

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
