use crate::config::Config;
use crate::logging::TracingSink;
use crate::memo::{RunCache, RunFingerprint};
use crate::shared::engine_error;
use quill_domain::entities::config::BacktestConfig;
use quill_domain::errors::BacktestError;
use quill_domain::repositories::artifacts::ArtifactWriter;
use quill_domain::repositories::market_data::{
    DataQualityReport, MarketDataRepository, PriceQuery,
};
use quill_domain::services::audit::{AuditEvent, CancelHook, RunContext};
use quill_domain::services::engine::{resolve_engine, Engine, EngineOutput};
use quill_domain::services::strategy::{resolve_strategy, Strategy};
use quill_domain::value_objects::bar::PriceBar;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct BacktestRun {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub engine: String,
    pub strategy: String,
    pub data_quality: DataQualityReport,
    pub output: Arc<EngineOutput>,
    /// The engine result came from the run cache.
    pub cached: bool,
}

pub fn run_backtest(
    config: &Config,
    config_toml: &str,
    out_dir_override: Option<&Path>,
    market_data: &dyn MarketDataRepository,
    artifacts: &dyn ArtifactWriter,
) -> Result<PathBuf, String> {
    run_backtest_with_hooks(
        config,
        config_toml,
        out_dir_override,
        market_data,
        artifacts,
        None,
        None,
    )
    .map(|run| run.run_dir)
}

pub fn run_backtest_with_hooks(
    config: &Config,
    config_toml: &str,
    out_dir_override: Option<&Path>,
    market_data: &dyn MarketDataRepository,
    artifacts: &dyn ArtifactWriter,
    cache: Option<&RunCache>,
    should_cancel: Option<CancelHook<'_>>,
) -> Result<BacktestRun, String> {
    let span = tracing::info_span!(
        "run_backtest",
        run_id = %config.run.run_id,
        engine = %config.run.engine,
        strategy = %config.strategy.name
    );
    let _guard = span.enter();

    let backtest_config = config.backtest_config()?;
    let engine = resolve_engine(&config.run.engine).map_err(engine_error)?;
    let strategy =
        resolve_strategy(&config.strategy.name, config.vwap_params()?).map_err(engine_error)?;

    let (bars, data_quality) = market_data.load_bars(&PriceQuery {
        path: PathBuf::from(&config.data.path),
        symbol: config.data.symbol.clone(),
    })?;
    if bars.is_empty() {
        tracing::warn!(path = %config.data.path, "price series is empty; the run will have no trades");
    }

    let sink = TracingSink::buffered();
    let mut ctx = RunContext::new(&config.run.run_id, &sink);
    if let Some(hook) = should_cancel {
        ctx = ctx.with_cancel(hook);
    }
    ctx.emit(
        AuditEvent::new(
            bars.first().map(|bar| bar.timestamp).unwrap_or(0),
            "data",
            "loaded",
        )
        .with_symbol(&config.data.symbol)
        .with_details(json!({
            "path": config.data.path,
            "bars": bars.len(),
            "quality": data_quality,
        })),
    );

    let start = Instant::now();
    let (output, cached) = execute_backtest(
        engine.as_ref(),
        strategy.as_ref(),
        &bars,
        &backtest_config,
        &ctx,
        cache,
    )?;
    metrics::histogram!("quill.backtest.engine_ms", "engine" => engine.name())
        .record(start.elapsed().as_secs_f64() * 1000.0);
    metrics::histogram!("quill.backtest.trades", "engine" => engine.name())
        .record(output.trades.len() as f64);

    let out_dir = out_dir_override
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.paths.out_dir));
    let run_dir = out_dir.join(&config.run.run_id);
    artifacts.ensure_dir(&run_dir)?;
    artifacts.write_trades_csv(&run_dir.join("trades.csv"), &output.trades)?;
    artifacts.write_equity_csv(&run_dir.join("equity.csv"), output.equity())?;
    artifacts.write_report_json(&run_dir.join("report.json"), &output.report)?;
    artifacts.write_audit_jsonl(&run_dir.join("logs.jsonl"), &sink.events())?;
    artifacts.write_config_snapshot_toml(&run_dir.join("config_snapshot.toml"), config_toml)?;

    let stats = output.stats();
    tracing::info!(
        run_dir = %run_dir.display(),
        trades = stats.trade_count,
        total_return = stats.total_return,
        sharpe = stats.sharpe,
        max_drawdown = stats.max_drawdown,
        cached,
        "backtest complete"
    );

    Ok(BacktestRun {
        run_id: config.run.run_id.clone(),
        run_dir,
        engine: engine.name().to_string(),
        strategy: strategy.name().to_string(),
        data_quality,
        output,
        cached,
    })
}

/// Generates signals and runs the engine, going through `cache` when one is
/// given. Returns the output and whether it was a cache hit.
pub fn execute_backtest(
    engine: &dyn Engine,
    strategy: &dyn Strategy,
    bars: &[PriceBar],
    config: &BacktestConfig,
    ctx: &RunContext<'_>,
    cache: Option<&RunCache>,
) -> Result<(Arc<EngineOutput>, bool), String> {
    let signals = strategy.generate_signals(bars, config);
    tracing::debug!(signals = signals.len(), bars = bars.len(), "signals generated");

    let Some(cache) = cache else {
        let output = engine
            .run_signals(bars, &signals, strategy, config, ctx)
            .map_err(engine_error)?;
        return Ok((Arc::new(output), false));
    };

    let fingerprint = RunFingerprint::compute(bars, &signals, config, engine.backend(), strategy)?;
    let (output, hit) = cache
        .get_or_run(&fingerprint, || {
            engine.run_signals(bars, &signals, strategy, config, ctx)
        })
        .map_err(engine_error)?;
    if hit {
        // Hits skip the engine, which is where cancellation is observed.
        if ctx.is_cancelled() {
            return Err(engine_error(BacktestError::Cancelled));
        }
        ctx.emit(
            AuditEvent::new(
                bars.last().map(|bar| bar.timestamp).unwrap_or(0),
                "memo",
                "hit",
            )
            .with_symbol(&config.symbol)
            .with_details(json!({ "fingerprint": fingerprint.short() })),
        );
    }
    Ok((output, hit))
}
