use super::{cancelled, finish, prepare, Engine, EngineBackend, EngineOutput};
use crate::entities::config::BacktestConfig;
use crate::errors::BacktestError;
use crate::services::audit::RunContext;
use crate::services::ledger::{FillModel, TradeLedger};
use crate::services::state_machine::PositionStateMachine;
use crate::services::strategy::Strategy;
use crate::value_objects::bar::PriceBar;
use crate::value_objects::signal::Signal;

/// Batch backend: the whole signal vector goes through the state machine in one
/// pass, then the ledger is built from the resulting transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorizedEngine;

impl Engine for VectorizedEngine {
    fn backend(&self) -> EngineBackend {
        EngineBackend::Vectorized
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
        if ctx.is_cancelled() {
            return Err(cancelled(ctx, self.backend(), 0));
        }

        let mut machine = PositionStateMachine::new(config.reversal_mode);
        let transitions = machine.run_all(&normalized.signals, &index, ctx);
        if ctx.is_cancelled() {
            return Err(cancelled(ctx, self.backend(), 0));
        }

        let mut ledger = TradeLedger::new();
        ledger.apply_all(&transitions, &FillModel::new(config.commission));

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
