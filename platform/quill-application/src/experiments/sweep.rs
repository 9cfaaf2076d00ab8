use crate::backtesting::run_backtest_with_hooks;
use crate::config::Config;
use crate::memo::RunCache;
use crate::shared::{should_cancelled, to_hex_short, CANCELLED};
use quill_domain::entities::stats::Stats;
use quill_domain::repositories::artifacts::ArtifactWriter;
use quill_domain::repositories::market_data::{
    DataQualityReport, MarketDataRepository, PriceQuery,
};
use quill_domain::value_objects::bar::PriceBar;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweepFile {
    pub base: SweepBase,
    pub sweep: SweepMeta,
    #[serde(default)]
    pub params: Vec<SweepParam>,
    pub leaderboard: Option<LeaderboardConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweepBase {
    pub config: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweepMeta {
    pub id: String,
    pub parallelism: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweepParam {
    pub path: String,
    pub values: Vec<toml::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LeaderboardConfig {
    pub sort_by: Option<String>,
    pub descending: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepRunEntry {
    pub run_id: String,
    pub params: BTreeMap<String, toml::Value>,
    pub status: String,
    pub error: Option<String>,
    pub cached: bool,
    pub stats: Option<Stats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepResult {
    pub sweep_id: String,
    pub sweep_dir: PathBuf,
    pub base_config: String,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub runs: Vec<SweepRunEntry>,
}

#[derive(Debug, Clone)]
pub struct SweepProgress {
    pub total_runs: usize,
    pub completed_runs: usize,
    pub ok_runs: usize,
    pub error_runs: usize,
    pub last_run_id: Option<String>,
    pub last_error: Option<String>,
}

pub fn run_sweep(
    sweep_path: &Path,
    market_data: &dyn MarketDataRepository,
    artifacts: &(dyn ArtifactWriter + Sync),
) -> Result<SweepResult, String> {
    run_sweep_with_hooks(sweep_path, market_data, artifacts, None, None)
}

pub fn run_sweep_with_hooks(
    sweep_path: &Path,
    market_data: &dyn MarketDataRepository,
    artifacts: &(dyn ArtifactWriter + Sync),
    mut on_progress: Option<&mut dyn FnMut(SweepProgress)>,
    should_cancel: Option<&(dyn Fn() -> bool + Sync)>,
) -> Result<SweepResult, String> {
    let raw = std::fs::read_to_string(sweep_path).map_err(|err| {
        format!(
            "failed to read sweep config {}: {err}",
            sweep_path.display()
        )
    })?;
    let sweep: SweepFile = toml::from_str(&raw)
        .map_err(|err| format!("failed to parse sweep TOML {}: {err}", sweep_path.display()))?;

    let span = tracing::info_span!("run_sweep", sweep_id = %sweep.sweep.id);
    let _guard = span.enter();

    validate_param_paths(&sweep.params)?;

    let base_config_path = resolve_base_config_path(sweep_path, &sweep.base.config);
    let (base_config, base_toml_str) =
        crate::config::load_config_with_source(base_config_path.as_path())?;
    let base_toml_value: toml::Value = toml::from_str(&base_toml_str)
        .map_err(|err| format!("failed to parse base config TOML as value: {err}"))?;

    let out_dir = PathBuf::from(&base_config.paths.out_dir);
    let sweep_dir = out_dir.join("sweeps").join(&sweep.sweep.id);
    std::fs::create_dir_all(&sweep_dir)
        .map_err(|err| format!("failed to create sweep dir {}: {err}", sweep_dir.display()))?;

    let (bars, report) = market_data.load_bars(&PriceQuery {
        path: PathBuf::from(&base_config.data.path),
        symbol: base_config.data.symbol.clone(),
    })?;
    let in_memory_market = InMemoryMarketDataRepository { bars, report };

    let grid = expand_grid(&sweep.params);
    let requested_parallelism = normalize_parallelism(sweep.sweep.parallelism);
    metrics::gauge!("quill.sweep.runs").set(grid.len() as f64);
    tracing::info!(
        runs = grid.len(),
        parallelism = requested_parallelism,
        base_config = %base_config_path.display(),
        "sweep started"
    );

    let mut plans: Vec<SweepRunPlan> = Vec::with_capacity(grid.len());
    for (order_idx, assignment) in grid.iter().enumerate() {
        let mut toml_value = base_toml_value.clone();
        apply_assignment(&mut toml_value, assignment)?;

        let run_id = format!("{}__{}", sweep.sweep.id, assignment_hash(assignment));
        set_run_id(&mut toml_value, &run_id)?;

        let config_toml = toml::to_string_pretty(&toml_value)
            .map_err(|err| format!("failed to serialize sweep config TOML: {err}"))?;
        let config: Config = toml::from_str(&config_toml)
            .map_err(|err| format!("failed to parse generated config TOML: {err}"))?;

        plans.push(SweepRunPlan {
            order_idx,
            run_id,
            params: assignment.clone(),
            config,
            config_toml,
        });
    }

    let mut progress = SweepProgress {
        total_runs: plans.len(),
        completed_runs: 0,
        ok_runs: 0,
        error_runs: 0,
        last_run_id: None,
        last_error: None,
    };
    emit_progress(&mut on_progress, &progress);

    let mut on_entry = |entry: &SweepRunEntry| {
        update_progress(&mut progress, entry);
        emit_progress(&mut on_progress, &progress);
    };

    let cache = RunCache::new();
    let workers = SweepWorkers {
        market_data: &in_memory_market,
        artifacts,
        cache: &cache,
        should_cancel,
    };
    let mut executed = if requested_parallelism <= 1 || plans.len() <= 1 {
        execute_plans_serial(&plans, &workers, &mut on_entry)?
    } else {
        execute_plans_parallel(&plans, requested_parallelism, &workers, &mut on_entry)?
    };
    executed.sort_by_key(|(order_idx, _)| *order_idx);
    let runs: Vec<SweepRunEntry> = executed.into_iter().map(|(_, entry)| entry).collect();

    let result = SweepResult {
        sweep_id: sweep.sweep.id.clone(),
        sweep_dir: sweep_dir.clone(),
        base_config: base_config_path.display().to_string(),
        cache_hits: cache.hits(),
        cache_misses: cache.misses(),
        runs,
    };

    write_manifest(&sweep_dir, &result)?;
    write_results_csv(&sweep_dir, &result)?;
    write_leaderboard_csv(&sweep_dir, &result, sweep.leaderboard.as_ref())?;

    tracing::info!(
        sweep_dir = %sweep_dir.display(),
        runs = result.runs.len(),
        cache_hits = result.cache_hits,
        "sweep complete"
    );
    Ok(result)
}

#[derive(Debug, Clone)]
struct SweepRunPlan {
    order_idx: usize,
    run_id: String,
    params: BTreeMap<String, toml::Value>,
    config: Config,
    config_toml: String,
}

/// Shared, read-only inputs every run of a sweep sees.
struct SweepWorkers<'a> {
    market_data: &'a InMemoryMarketDataRepository,
    artifacts: &'a (dyn ArtifactWriter + Sync),
    cache: &'a RunCache,
    should_cancel: Option<&'a (dyn Fn() -> bool + Sync)>,
}

enum WorkerMessage {
    Entry {
        order_idx: usize,
        entry: SweepRunEntry,
    },
    Fatal(String),
}

fn normalize_parallelism(value: Option<usize>) -> usize {
    value.unwrap_or(1).max(1)
}

fn execute_plans_serial(
    plans: &[SweepRunPlan],
    workers: &SweepWorkers<'_>,
    on_entry: &mut dyn FnMut(&SweepRunEntry),
) -> Result<Vec<(usize, SweepRunEntry)>, String> {
    let mut out = Vec::with_capacity(plans.len());
    for plan in plans {
        if should_cancelled(workers.should_cancel) {
            return Err(CANCELLED.to_string());
        }
        let entry = execute_run_plan(plan, workers)?;
        on_entry(&entry);
        out.push((plan.order_idx, entry));
    }
    Ok(out)
}

fn execute_plans_parallel(
    plans: &[SweepRunPlan],
    parallelism: usize,
    workers: &SweepWorkers<'_>,
    on_entry: &mut dyn FnMut(&SweepRunEntry),
) -> Result<Vec<(usize, SweepRunEntry)>, String> {
    let worker_count = parallelism.max(1).min(plans.len());
    let next_index = AtomicUsize::new(0);
    let cancelled = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel::<WorkerMessage>();

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let tx = tx.clone();
            let next_index_ref = &next_index;
            let cancelled_ref = &cancelled;
            scope.spawn(move || loop {
                if cancelled_ref.load(Ordering::Relaxed) || should_cancelled(workers.should_cancel)
                {
                    cancelled_ref.store(true, Ordering::Relaxed);
                    let _ = tx.send(WorkerMessage::Fatal(CANCELLED.to_string()));
                    break;
                }

                let plan_idx = next_index_ref.fetch_add(1, Ordering::Relaxed);
                if plan_idx >= plans.len() {
                    break;
                }

                match execute_run_plan(&plans[plan_idx], workers) {
                    Ok(entry) => {
                        if tx
                            .send(WorkerMessage::Entry {
                                order_idx: plans[plan_idx].order_idx,
                                entry,
                            })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(err) => {
                        cancelled_ref.store(true, Ordering::Relaxed);
                        let _ = tx.send(WorkerMessage::Fatal(err));
                        break;
                    }
                }
            });
        }

        drop(tx);

        let mut entries: Vec<(usize, SweepRunEntry)> = Vec::with_capacity(plans.len());
        let mut fatal_error: Option<String> = None;
        while let Ok(message) = rx.recv() {
            match message {
                WorkerMessage::Entry { order_idx, entry } => {
                    if fatal_error.is_none() {
                        on_entry(&entry);
                        entries.push((order_idx, entry));
                    }
                }
                WorkerMessage::Fatal(err) => {
                    if fatal_error.is_none() {
                        fatal_error = Some(err);
                    }
                }
            }
        }

        if let Some(err) = fatal_error {
            return Err(err);
        }
        if entries.len() != plans.len() {
            return Err(format!(
                "internal sweep error: expected {} results, got {}",
                plans.len(),
                entries.len()
            ));
        }

        Ok(entries)
    })
}

/// A failed run becomes an `error` entry; only cancellation aborts the sweep.
fn execute_run_plan(
    plan: &SweepRunPlan,
    workers: &SweepWorkers<'_>,
) -> Result<SweepRunEntry, String> {
    let result = run_backtest_with_hooks(
        &plan.config,
        &plan.config_toml,
        None,
        workers.market_data,
        workers.artifacts,
        Some(workers.cache),
        workers.should_cancel,
    );

    let entry = match result {
        Ok(run) => SweepRunEntry {
            run_id: plan.run_id.clone(),
            params: plan.params.clone(),
            status: "ok".to_string(),
            error: None,
            cached: run.cached,
            stats: Some(*run.output.stats()),
        },
        Err(err) if err == CANCELLED => return Err(err),
        Err(err) => {
            tracing::warn!(run_id = %plan.run_id, error = %err, "sweep run failed");
            SweepRunEntry {
                run_id: plan.run_id.clone(),
                params: plan.params.clone(),
                status: "error".to_string(),
                error: Some(err),
                cached: false,
                stats: None,
            }
        }
    };

    Ok(entry)
}

fn update_progress(progress: &mut SweepProgress, entry: &SweepRunEntry) {
    progress.completed_runs = progress.completed_runs.saturating_add(1);
    progress.last_run_id = Some(entry.run_id.clone());
    progress.last_error = entry.error.clone();
    match entry.status.as_str() {
        "ok" => progress.ok_runs = progress.ok_runs.saturating_add(1),
        "error" => progress.error_runs = progress.error_runs.saturating_add(1),
        _ => {}
    }
}

fn emit_progress(
    on_progress: &mut Option<&mut dyn FnMut(SweepProgress)>,
    progress: &SweepProgress,
) {
    if let Some(callback) = on_progress.as_mut() {
        (callback)(progress.clone());
    }
}

fn resolve_base_config_path(sweep_path: &Path, base: &str) -> PathBuf {
    let p = PathBuf::from(base);
    if p.is_absolute() {
        p
    } else {
        sweep_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(p)
    }
}

fn validate_param_paths(params: &[SweepParam]) -> Result<(), String> {
    for p in params {
        let path = p.path.trim();
        if path.is_empty() {
            return Err("sweep param path cannot be empty".to_string());
        }
        let forbidden_prefixes = ["run.run_id", "data.path", "data.symbol", "paths.out_dir"];
        if forbidden_prefixes.iter().any(|pre| path.starts_with(pre)) {
            return Err(format!("sweep param path not allowed: {}", p.path));
        }
        if p.values.is_empty() {
            return Err(format!("sweep param has no values: {}", p.path));
        }
    }
    Ok(())
}

fn expand_grid(params: &[SweepParam]) -> Vec<BTreeMap<String, toml::Value>> {
    let mut out: Vec<BTreeMap<String, toml::Value>> = vec![BTreeMap::new()];
    for p in params {
        let mut next: Vec<BTreeMap<String, toml::Value>> = Vec::new();
        for base in &out {
            for v in &p.values {
                let mut m = base.clone();
                m.insert(p.path.clone(), v.clone());
                next.push(m);
            }
        }
        out = next;
    }
    out
}

fn assignment_hash(assignment: &BTreeMap<String, toml::Value>) -> String {
    let canonical = serde_json::to_string(assignment)
        .unwrap_or_else(|_| "{\"error\":\"assignment\"}".to_string());
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let bytes = hasher.finalize();
    to_hex_short(&bytes[..], 12)
}

fn set_run_id(root: &mut toml::Value, run_id: &str) -> Result<(), String> {
    set_path_value(root, "run.run_id", toml::Value::String(run_id.to_string()))
}

fn apply_assignment(
    root: &mut toml::Value,
    assignment: &BTreeMap<String, toml::Value>,
) -> Result<(), String> {
    for (path, value) in assignment {
        set_path_value(root, path, value.clone())?;
    }
    Ok(())
}

/// Optional tables (`strategy.vwap`) are created on demand; every other
/// segment must already exist in the base config.
fn set_path_value(root: &mut toml::Value, path: &str, value: toml::Value) -> Result<(), String> {
    let parts: Vec<&str> = path
        .split('.')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        return Err("empty path".to_string());
    }
    let mut cur = root;
    for (depth, key) in parts[..parts.len() - 1].iter().enumerate() {
        let table = cur
            .as_table_mut()
            .ok_or_else(|| format!("path is not a table: {}", path))?;
        if depth > 0 && !table.contains_key(*key) && is_optional_table(&parts[..=depth]) {
            table.insert(key.to_string(), toml::Value::Table(toml::Table::new()));
        }
        cur = table
            .get_mut(*key)
            .ok_or_else(|| format!("path not found: {}", path))?;
        if !cur.is_table() {
            return Err(format!("path is not a table: {}", path));
        }
    }
    let last = parts[parts.len() - 1];
    let table = cur
        .as_table_mut()
        .ok_or_else(|| format!("path is not a table: {}", path))?;
    if !table.contains_key(last) && !is_optional_key(&parts) {
        return Err(format!("path not found: {}", path));
    }
    table.insert(last.to_string(), value);
    Ok(())
}

fn is_optional_table(parts: &[&str]) -> bool {
    matches!(parts, ["strategy", "vwap"])
}

fn is_optional_key(parts: &[&str]) -> bool {
    matches!(
        parts,
        ["strategy", "reversal_mode"]
            | ["account", "commission"]
            | ["strategy", "vwap", "session" | "mult" | "stop_loss" | "target_profit"]
    )
}

fn write_manifest(dir: &Path, result: &SweepResult) -> Result<(), String> {
    let path = dir.join("manifest.json");
    let json = serde_json::to_string_pretty(result)
        .map_err(|err| format!("failed to serialize manifest: {err}"))?;
    std::fs::write(&path, json)
        .map_err(|err| format!("failed to write {}: {err}", path.display()))?;
    Ok(())
}

const STATS_COLUMNS: [&str; 7] = [
    "trades",
    "total_return",
    "sharpe",
    "max_drawdown",
    "win_rate",
    "pnl_sum",
    "cagr",
];

fn stats_record(stats: &Stats) -> Vec<String> {
    vec![
        stats.trade_count.to_string(),
        format!("{}", stats.total_return),
        format!("{}", stats.sharpe),
        format!("{}", stats.max_drawdown),
        format!("{}", stats.win_rate),
        format!("{}", stats.pnl_sum),
        format!("{}", stats.cagr),
    ]
}

fn write_results_csv(dir: &Path, result: &SweepResult) -> Result<(), String> {
    let path = dir.join("results.csv");
    let mut wtr = csv::Writer::from_path(&path)
        .map_err(|err| format!("failed to create {}: {err}", path.display()))?;
    let mut header = vec!["run_id", "status", "cached"];
    header.extend(STATS_COLUMNS);
    header.push("error");
    wtr.write_record(&header)
        .map_err(|err| format!("failed to write results header: {err}"))?;

    for r in &result.runs {
        let mut record = vec![r.run_id.clone(), r.status.clone(), r.cached.to_string()];
        match &r.stats {
            Some(stats) => record.extend(stats_record(stats)),
            None => record.extend(STATS_COLUMNS.iter().map(|_| String::new())),
        }
        record.push(r.error.clone().unwrap_or_default());
        wtr.write_record(record)
            .map_err(|err| format!("failed to write results row: {err}"))?;
    }
    wtr.flush()
        .map_err(|err| format!("failed to flush {}: {err}", path.display()))?;
    Ok(())
}

fn write_leaderboard_csv(
    dir: &Path,
    result: &SweepResult,
    cfg: Option<&LeaderboardConfig>,
) -> Result<(), String> {
    let sort_by = cfg
        .and_then(|c| c.sort_by.as_deref())
        .unwrap_or("sharpe")
        .trim()
        .to_lowercase();
    let descending = cfg.and_then(|c| c.descending).unwrap_or(true);

    let mut rows: Vec<(&SweepRunEntry, &Stats)> = result
        .runs
        .iter()
        .filter(|r| r.status == "ok")
        .filter_map(|r| r.stats.as_ref().map(|stats| (r, stats)))
        .collect();
    rows.sort_by(|(_, a), (_, b)| {
        let av = metric_value(a, &sort_by);
        let bv = metric_value(b, &sort_by);
        let ord = bv.partial_cmp(&av).unwrap_or(std::cmp::Ordering::Equal);
        if descending {
            ord
        } else {
            ord.reverse()
        }
    });

    let path = dir.join("leaderboard.csv");
    let mut wtr = csv::Writer::from_path(&path)
        .map_err(|err| format!("failed to create {}: {err}", path.display()))?;
    let mut header = vec!["rank", "run_id", "params"];
    header.extend(STATS_COLUMNS);
    wtr.write_record(&header)
        .map_err(|err| format!("failed to write leaderboard header: {err}"))?;

    for (idx, (r, stats)) in rows.iter().enumerate() {
        let params = serde_json::to_string(&r.params)
            .map_err(|err| format!("failed to serialize params of {}: {err}", r.run_id))?;
        let mut record = vec![(idx + 1).to_string(), r.run_id.clone(), params];
        record.extend(stats_record(stats));
        wtr.write_record(record)
            .map_err(|err| format!("failed to write leaderboard row: {err}"))?;
    }
    wtr.flush()
        .map_err(|err| format!("failed to flush {}: {err}", path.display()))?;
    Ok(())
}

fn metric_value(stats: &Stats, key: &str) -> f64 {
    match key {
        "total_return" | "return" => stats.total_return,
        "max_drawdown" | "max_dd" => stats.max_drawdown,
        "trades" | "trade_count" => stats.trade_count as f64,
        "win_rate" => stats.win_rate,
        "pnl_sum" | "pnl" => stats.pnl_sum,
        "cagr" => stats.cagr,
        _ => stats.sharpe,
    }
}

/// Serves the series loaded once for the sweep to every run.
#[derive(Default)]
struct InMemoryMarketDataRepository {
    bars: Vec<PriceBar>,
    report: DataQualityReport,
}

impl MarketDataRepository for InMemoryMarketDataRepository {
    fn load_bars(&self, _query: &PriceQuery) -> Result<(Vec<PriceBar>, DataQualityReport), String> {
        Ok((self.bars.clone(), self.report.clone()))
    }
}
