use quill_application::benchmarking::BenchResult;
use quill_application::config::Config;
use quill_application::experiments::sweep::SweepProgress;
use quill_infrastructure::artifacts::FsArtifactWriter;
use quill_infrastructure::market_data::CsvMarketData;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadlessMode {
    Validate,
    Backtest,
    Sweep,
    Bench,
}

impl HeadlessMode {
    pub fn as_str(self) -> &'static str {
        match self {
            HeadlessMode::Validate => "validate",
            HeadlessMode::Backtest => "backtest",
            HeadlessMode::Sweep => "sweep",
            HeadlessMode::Bench => "bench",
        }
    }
}

pub struct HeadlessArgs {
    pub mode: HeadlessMode,
    pub config_path: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub strict: bool,
    pub sweep_config: Option<PathBuf>,
    pub bars: usize,
    pub step_seconds: i64,
    pub engine: String,
}

pub fn run_headless(args: HeadlessArgs) -> Result<serde_json::Value, String> {
    match args.mode {
        HeadlessMode::Sweep => run_sweep(args.sweep_config.as_deref()),
        HeadlessMode::Bench => {
            let bench = run_bench(args.bars, args.step_seconds, &args.engine)?;
            Ok(bench_json(&bench))
        }
        mode => {
            let config_path = args
                .config_path
                .as_deref()
                .ok_or_else(|| "--config is required for this mode".to_string())?;
            let (config, config_toml) =
                quill_application::config::load_config_with_source(config_path)?;
            match mode {
                HeadlessMode::Validate => run_validate(&config, args.strict),
                HeadlessMode::Backtest => {
                    run_backtest(&config, &config_toml, args.out_dir.as_deref())
                }
                HeadlessMode::Sweep | HeadlessMode::Bench => {
                    unreachable!("handled above")
                }
            }
        }
    }
}

pub fn artifacts_for_run(run_dir: &Path) -> serde_json::Value {
    serde_json::json!({
        "run_dir": run_dir.display().to_string(),
        "trades_csv": run_dir.join("trades.csv").display().to_string(),
        "equity_csv": run_dir.join("equity.csv").display().to_string(),
        "report_json": run_dir.join("report.json").display().to_string(),
        "logs_jsonl": run_dir.join("logs.jsonl").display().to_string(),
        "config_snapshot_toml": run_dir.join("config_snapshot.toml").display().to_string(),
    })
}

fn run_validate(config: &Config, strict: bool) -> Result<serde_json::Value, String> {
    let market_data = CsvMarketData::new();
    let report = quill_application::validation::validate(config, strict, &market_data)?;
    Ok(serde_json::json!({
        "status": "ok",
        "mode": "validate",
        "strict": strict,
        "run_id": config.run.run_id,
        "out_dir": config.paths.out_dir,
        "report": report,
    }))
}

fn run_backtest(
    config: &Config,
    config_toml: &str,
    out_dir: Option<&Path>,
) -> Result<serde_json::Value, String> {
    let market_data = CsvMarketData::new();
    let artifacts = FsArtifactWriter::new();

    let run = quill_application::backtesting::run_backtest_with_hooks(
        config,
        config_toml,
        out_dir,
        &market_data,
        &artifacts,
        None,
        None,
    )?;
    Ok(serde_json::json!({
        "status": "ok",
        "mode": "backtest",
        "run_id": run.run_id,
        "engine": run.engine,
        "strategy": run.strategy,
        "stats": run.output.stats().to_map(),
        "data_quality": run.data_quality,
        "artifacts": artifacts_for_run(&run.run_dir),
    }))
}

fn run_sweep(sweep_config: Option<&Path>) -> Result<serde_json::Value, String> {
    let sweep_path = sweep_config.ok_or_else(|| "--sweep is required for sweep mode".to_string())?;
    let market_data = CsvMarketData::new();
    let artifacts = FsArtifactWriter::new();
    let mut on_progress = |progress: SweepProgress| {
        tracing::info!(
            completed = progress.completed_runs,
            total = progress.total_runs,
            ok = progress.ok_runs,
            errors = progress.error_runs,
            last_run_id = progress.last_run_id.as_deref().unwrap_or(""),
            "sweep progress"
        );
    };

    let result = quill_application::experiments::sweep::run_sweep_with_hooks(
        sweep_path,
        &market_data,
        &artifacts,
        Some(&mut on_progress),
        None,
    )?;
    let ok_runs = result.runs.iter().filter(|run| run.status == "ok").count();
    Ok(serde_json::json!({
        "status": "ok",
        "mode": "sweep",
        "sweep_id": result.sweep_id,
        "runs": result.runs.len(),
        "ok_runs": ok_runs,
        "cache_hits": result.cache_hits,
        "artifacts": {
            "sweep_dir": result.sweep_dir.display().to_string(),
            "manifest_json": result.sweep_dir.join("manifest.json").display().to_string(),
            "results_csv": result.sweep_dir.join("results.csv").display().to_string(),
            "leaderboard_csv": result.sweep_dir.join("leaderboard.csv").display().to_string(),
        },
    }))
}

pub fn run_bench(bars: usize, step_seconds: i64, engine: &str) -> Result<BenchResult, String> {
    let bench = quill_application::benchmarking::run_bench(bars, step_seconds, engine)?;
    let engine_label = bench.engine.clone();
    metrics::histogram!("quill.bench.elapsed_ms", "engine" => engine_label.clone())
        .record(bench.elapsed_ms as f64);
    metrics::gauge!("quill.bench.bars_per_sec", "engine" => engine_label.clone())
        .set(bench.bars_per_sec);
    metrics::gauge!("quill.bench.bars_processed", "engine" => engine_label)
        .set(bench.bars_processed as f64);
    Ok(bench)
}

pub fn bench_json(bench: &BenchResult) -> serde_json::Value {
    serde_json::json!({
        "status": "ok",
        "mode": "bench",
        "engine": bench.engine,
        "bars_requested": bench.bars_requested,
        "bars_processed": bench.bars_processed,
        "trades": bench.trades,
        "elapsed_ms": bench.elapsed_ms,
        "bars_per_sec": bench.bars_per_sec,
    })
}

pub fn bench_lines(bench: &BenchResult) -> [String; 2] {
    [
        format!(
            "bench: engine={} bars={} elapsed_ms={} bars_per_sec={:.2}",
            bench.engine, bench.bars_processed, bench.elapsed_ms, bench.bars_per_sec
        ),
        format!(
            "bench: trades={} total_return={:.4} sharpe={:.4} max_drawdown={:.4}",
            bench.trades, bench.stats.total_return, bench.stats.sharpe, bench.stats.max_drawdown
        ),
    ]
}
