use crate::backtesting::execute_backtest;
use crate::logging::TracingSink;
use crate::shared::engine_error;
use quill_domain::entities::config::BacktestConfig;
use quill_domain::entities::stats::Stats;
use quill_domain::services::audit::RunContext;
use quill_domain::services::engine::resolve_engine;
use quill_domain::services::strategy::EmaCrossover;
use quill_domain::value_objects::bar::PriceBar;
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct BenchResult {
    pub engine: String,
    pub bars_requested: usize,
    pub bars_processed: usize,
    pub trades: usize,
    pub elapsed_ms: u64,
    pub bars_per_sec: f64,
    pub stats: Stats,
}

/// Runs the EMA crossover over a synthetic series on one engine backend.
pub fn run_bench(bars: usize, step_seconds: i64, engine: &str) -> Result<BenchResult, String> {
    if step_seconds <= 0 {
        return Err(format!("step_seconds must be > 0 (got {step_seconds})"));
    }
    let engine = resolve_engine(engine).map_err(engine_error)?;
    let series = synthetic_bars(bars, step_seconds);
    let config = BacktestConfig {
        symbol: "SYNTH".to_string(),
        qty: 1.0,
        ..BacktestConfig::default()
    };
    let sink = TracingSink::new();
    let ctx = RunContext::new("bench", &sink);

    let start = Instant::now();
    let (output, _) = execute_backtest(engine.as_ref(), &EmaCrossover, &series, &config, &ctx, None)?;
    let elapsed = start.elapsed();

    let secs = elapsed.as_secs_f64();
    let bars_per_sec = if secs > 0.0 {
        series.len() as f64 / secs
    } else {
        0.0
    };
    Ok(BenchResult {
        engine: engine.name().to_string(),
        bars_requested: bars,
        bars_processed: series.len(),
        trades: output.trades.len(),
        elapsed_ms: elapsed.as_millis() as u64,
        bars_per_sec,
        stats: *output.stats(),
    })
}

/// Deterministic trending sine wave; crosses its own EMAs often enough to keep
/// the ledger busy.
pub fn synthetic_bars(count: usize, step_seconds: i64) -> Vec<PriceBar> {
    (0..count)
        .map(|idx| {
            let t = idx as f64;
            let close = 100.0 + 10.0 * (t / 40.0).sin() + 2.0 * (t / 7.0).sin() + 0.001 * t;
            PriceBar {
                timestamp: 1_700_000_000 + step_seconds * idx as i64,
                open: close - 0.1,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: 1.0 + (idx % 10) as f64,
            }
        })
        .collect()
}
