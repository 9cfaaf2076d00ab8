mod custom;
mod event;
pub mod paper_broker;
mod vectorized;

pub use custom::CustomEngine;
pub use event::EventEngine;
pub use vectorized::VectorizedEngine;

use crate::entities::config::BacktestConfig;
use crate::entities::stats::Stats;
use crate::errors::BacktestError;
use crate::services::audit::{AuditEvent, RunContext};
use crate::services::equity::build_equity_curve;
use crate::services::normalizer::{normalize, NormalizedSignals, PriceIndex};
use crate::services::stats::compute_stats;
use crate::services::strategy::{IndicatorColumns, Strategy};
use crate::value_objects::bar::PriceBar;
use crate::value_objects::equity_point::EquityPoint;
use crate::value_objects::signal::Signal;
use crate::value_objects::trade::Trade;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineBackend {
    Vectorized,
    Event,
    Custom,
}

impl EngineBackend {
    pub const ALL: [EngineBackend; 3] = [
        EngineBackend::Vectorized,
        EngineBackend::Event,
        EngineBackend::Custom,
    ];

    pub fn parse(name: &str) -> Result<Self, BacktestError> {
        match name.trim().to_lowercase().as_str() {
            "vectorized" | "vectorbt" => Ok(EngineBackend::Vectorized),
            "event" | "backtestingpy" => Ok(EngineBackend::Event),
            "custom" => Ok(EngineBackend::Custom),
            _ => Err(BacktestError::UnknownEngine(name.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EngineBackend::Vectorized => "vectorized",
            EngineBackend::Event => "event",
            EngineBackend::Custom => "custom",
        }
    }
}

/// Backtest backend. Every implementation produces the same ledger for the same
/// bars, signals and config.
pub trait Engine: Send + Sync {
    fn backend(&self) -> EngineBackend;

    fn name(&self) -> &'static str {
        self.backend().as_str()
    }

    /// Replays already generated signals.
    fn run_signals(
        &self,
        bars: &[PriceBar],
        signals: &[Signal],
        strategy: &dyn Strategy,
        config: &BacktestConfig,
        ctx: &RunContext<'_>,
    ) -> Result<EngineOutput, BacktestError>;

    fn run(
        &self,
        bars: &[PriceBar],
        strategy: &dyn Strategy,
        config: &BacktestConfig,
        ctx: &RunContext<'_>,
    ) -> Result<EngineOutput, BacktestError> {
        let signals = strategy.generate_signals(bars, config);
        self.run_signals(bars, &signals, strategy, config, ctx)
    }
}

pub fn resolve_engine(name: &str) -> Result<Box<dyn Engine>, BacktestError> {
    Ok(engine_for(EngineBackend::parse(name)?))
}

pub fn engine_for(backend: EngineBackend) -> Box<dyn Engine> {
    match backend {
        EngineBackend::Vectorized => Box::new(VectorizedEngine),
        EngineBackend::Event => Box::new(EventEngine),
        EngineBackend::Custom => Box::new(CustomEngine),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedSeries {
    pub bars: Vec<PriceBar>,
    pub columns: IndicatorColumns,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMeta {
    pub engine_name: String,
    pub strategy_name: String,
    pub params: serde_json::Value,
    pub symbol: String,
    pub reversal_mode: String,
    pub bars: usize,
    pub skipped_signals: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportBundle {
    pub stats: Stats,
    pub equity: Vec<EquityPoint>,
    pub meta: ReportMeta,
}

impl ReportBundle {
    /// `{stats: {name: value}, equity: [[timestamp, equity], ..], meta: {..}}`
    pub fn to_json(&self) -> serde_json::Value {
        let equity: Vec<serde_json::Value> = self
            .equity
            .iter()
            .map(|point| json!([point.timestamp, point.equity]))
            .collect();
        json!({
            "stats": self.stats.to_map(),
            "equity": equity,
            "meta": &self.meta,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    pub annotated: AnnotatedSeries,
    pub trades: Vec<Trade>,
    pub report: ReportBundle,
}

impl EngineOutput {
    pub fn stats(&self) -> &Stats {
        &self.report.stats
    }

    pub fn equity(&self) -> &[EquityPoint] {
        &self.report.equity
    }
}

fn prepare<'a>(
    bars: &'a [PriceBar],
    signals: &[Signal],
    strategy: &dyn Strategy,
    config: &BacktestConfig,
    ctx: &RunContext<'_>,
) -> Result<(PriceIndex<'a>, NormalizedSignals), BacktestError> {
    strategy.validate_config(config)?;
    let index = PriceIndex::new(bars);
    let normalized = normalize(signals, &index, ctx);
    Ok((index, normalized))
}

fn cancelled(ctx: &RunContext<'_>, backend: EngineBackend, timestamp: i64) -> BacktestError {
    ctx.emit(
        AuditEvent::new(timestamp, "engine", "cancelled")
            .with_error("cancelled")
            .with_details(json!({ "engine": backend.as_str() })),
    );
    BacktestError::Cancelled
}

/// Walks the series bar by bar, handing each bar the normalized signals
/// stamped with its timestamp.
fn replay_by_bar<F>(
    index: &PriceIndex<'_>,
    signals: &[Signal],
    backend: EngineBackend,
    ctx: &RunContext<'_>,
    mut on_bar: F,
) -> Result<(), BacktestError>
where
    F: FnMut(&PriceBar, &[Signal]),
{
    let mut cursor = 0;
    for bar in index.bars() {
        if ctx.is_cancelled() {
            return Err(cancelled(ctx, backend, bar.timestamp));
        }
        let start = cursor;
        while cursor < signals.len() && signals[cursor].timestamp <= bar.timestamp {
            cursor += 1;
        }
        on_bar(bar, &signals[start..cursor]);
    }
    Ok(())
}

fn finish(
    backend: EngineBackend,
    bars: &[PriceBar],
    strategy: &dyn Strategy,
    config: &BacktestConfig,
    trades: Vec<Trade>,
    normalized: &NormalizedSignals,
    ctx: &RunContext<'_>,
) -> EngineOutput {
    let equity = build_equity_curve(&trades, config.cash);
    let stats = compute_stats(&trades, &equity);
    let skipped_signals = normalized.skipped + normalized.invalid_quantity;

    ctx.emit(
        AuditEvent::new(
            equity.last().map(|point| point.timestamp).unwrap_or(0),
            "engine",
            "complete",
        )
        .with_symbol(&config.symbol)
        .with_details(json!({
            "engine": backend.as_str(),
            "trades": trades.len(),
            "signals": normalized.signals.len(),
            "skipped": skipped_signals,
        })),
    );

    EngineOutput {
        annotated: AnnotatedSeries {
            bars: bars.to_vec(),
            columns: strategy.annotate(bars, config),
        },
        report: ReportBundle {
            stats,
            equity,
            meta: ReportMeta {
                engine_name: backend.as_str().to_string(),
                strategy_name: strategy.name().to_string(),
                params: strategy.params(config),
                symbol: config.symbol.clone(),
                reversal_mode: config.reversal_mode.as_str().to_string(),
                bars: bars.len(),
                skipped_signals,
            },
        },
        trades,
    }
}
