use quill_application::backtesting::{run_backtest, run_backtest_with_hooks};
use quill_application::config::{load_config_with_source, Config};
use quill_application::memo::RunCache;
use quill_domain::repositories::artifacts::ArtifactWriter;
use quill_domain::repositories::market_data::{
    DataQualityReport, MarketDataRepository, PriceQuery,
};
use quill_domain::services::audit::AuditEvent;
use quill_domain::services::engine::ReportBundle;
use quill_domain::value_objects::bar::PriceBar;
use quill_domain::value_objects::equity_point::EquityPoint;
use quill_domain::value_objects::trade::Trade;
use quill_infrastructure::artifacts::FsArtifactWriter;
use quill_infrastructure::market_data::CsvMarketData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

struct FixedMarketData {
    bars: Vec<PriceBar>,
}

impl MarketDataRepository for FixedMarketData {
    fn load_bars(&self, query: &PriceQuery) -> Result<(Vec<PriceBar>, DataQualityReport), String> {
        assert_eq!(query.symbol, "BTCUSDT");
        Ok((
            self.bars.clone(),
            DataQualityReport {
                rows: self.bars.len(),
                ..DataQualityReport::default()
            },
        ))
    }
}

#[derive(Default)]
struct RecordingArtifacts {
    dirs: Mutex<Vec<PathBuf>>,
    files: Mutex<Vec<String>>,
    trades: Mutex<Vec<Trade>>,
    events: Mutex<Vec<AuditEvent>>,
    report: Mutex<Option<serde_json::Value>>,
    snapshot: Mutex<Option<String>>,
}

impl RecordingArtifacts {
    fn record(&self, path: &Path) {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        self.files.lock().expect("files").push(name);
    }
}

impl ArtifactWriter for RecordingArtifacts {
    fn ensure_dir(&self, path: &Path) -> Result<(), String> {
        self.dirs.lock().expect("dirs").push(path.to_path_buf());
        Ok(())
    }

    fn write_trades_csv(&self, path: &Path, trades: &[Trade]) -> Result<(), String> {
        self.record(path);
        *self.trades.lock().expect("trades") = trades.to_vec();
        Ok(())
    }

    fn write_equity_csv(&self, path: &Path, _points: &[EquityPoint]) -> Result<(), String> {
        self.record(path);
        Ok(())
    }

    fn write_report_json(&self, path: &Path, report: &ReportBundle) -> Result<(), String> {
        self.record(path);
        *self.report.lock().expect("report") = Some(report.to_json());
        Ok(())
    }

    fn write_audit_jsonl(&self, path: &Path, events: &[AuditEvent]) -> Result<(), String> {
        self.record(path);
        *self.events.lock().expect("events") = events.to_vec();
        Ok(())
    }

    fn write_config_snapshot_toml(&self, path: &Path, contents: &str) -> Result<(), String> {
        self.record(path);
        *self.snapshot.lock().expect("snapshot") = Some(contents.to_string());
        Ok(())
    }
}

struct FailingArtifacts;

impl ArtifactWriter for FailingArtifacts {
    fn ensure_dir(&self, path: &Path) -> Result<(), String> {
        Err(format!("read-only filesystem: {}", path.display()))
    }

    fn write_trades_csv(&self, _path: &Path, _trades: &[Trade]) -> Result<(), String> {
        Ok(())
    }

    fn write_equity_csv(&self, _path: &Path, _points: &[EquityPoint]) -> Result<(), String> {
        Ok(())
    }

    fn write_report_json(&self, _path: &Path, _report: &ReportBundle) -> Result<(), String> {
        Ok(())
    }

    fn write_audit_jsonl(&self, _path: &Path, _events: &[AuditEvent]) -> Result<(), String> {
        Ok(())
    }

    fn write_config_snapshot_toml(&self, _path: &Path, _contents: &str) -> Result<(), String> {
        Ok(())
    }
}

fn bar(timestamp: i64, close: f64) -> PriceBar {
    PriceBar {
        timestamp,
        open: close,
        high: close,
        low: close,
        close,
        volume: 1.0,
    }
}

fn config_toml(engine: &str, strategy: &str, out_dir: &str) -> String {
    format!(
        r#"
[run]
run_id = "use_case"
engine = "{engine}"

[data]
path = "bars.csv"
symbol = "BTCUSDT"

[strategy]
name = "{strategy}"
fast = 2
slow = 4
qty = 1.0
reversal_mode = "close_only"

[account]
cash = 1000.0
commission = 0.0

[paths]
out_dir = "{out_dir}"
"#
    )
}

fn parse(raw: &str) -> Config {
    toml::from_str(raw).expect("config")
}

fn up_then_down() -> Vec<PriceBar> {
    [100.0, 100.0, 100.0, 100.0, 110.0, 120.0, 130.0, 140.0, 125.0, 115.0, 100.0]
        .iter()
        .enumerate()
        .map(|(idx, close)| bar(3_600 * (idx as i64 + 1), *close))
        .collect()
}

fn test_temp_dir(prefix: &str) -> PathBuf {
    let unique = format!(
        "{}_{}_{}",
        prefix,
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock before UNIX_EPOCH")
            .as_nanos()
    );
    std::env::temp_dir().join(unique)
}

#[test]
fn run_backtest_writes_every_artifact_through_the_port() {
    let raw = config_toml("vectorbt", "ema_crossover", "runs");
    let config = parse(&raw);
    let market = FixedMarketData {
        bars: up_then_down(),
    };
    let artifacts = RecordingArtifacts::default();

    let run_dir = run_backtest(&config, &raw, None, &market, &artifacts).expect("backtest");

    assert_eq!(run_dir, PathBuf::from("runs").join("use_case"));
    assert_eq!(*artifacts.dirs.lock().expect("dirs"), vec![run_dir.clone()]);
    assert_eq!(
        *artifacts.files.lock().expect("files"),
        vec![
            "trades.csv",
            "equity.csv",
            "report.json",
            "logs.jsonl",
            "config_snapshot.toml"
        ]
    );

    let trades = artifacts.trades.lock().expect("trades").clone();
    assert_eq!(trades.len(), 2);
    assert!(trades[0].pnl.is_none());
    assert!(trades[1].pnl.expect("closing pnl") > 0.0);

    let report = artifacts
        .report
        .lock()
        .expect("report")
        .clone()
        .expect("report written");
    assert_eq!(report["meta"]["engine_name"], "vectorized");
    assert_eq!(report["meta"]["strategy_name"], "ema_crossover");
    assert_eq!(report["stats"]["trade_count"], 2.0);

    let events = artifacts.events.lock().expect("events").clone();
    assert!(events
        .iter()
        .any(|event| event.stage == "data" && event.action == "loaded"));
    assert!(events
        .iter()
        .all(|event| event.run_id == "use_case"));
    assert_eq!(
        artifacts.snapshot.lock().expect("snapshot").as_deref(),
        Some(raw.as_str())
    );
}

#[test]
fn out_dir_override_wins_over_config() {
    let raw = config_toml("event", "ema", "runs");
    let config = parse(&raw);
    let market = FixedMarketData {
        bars: up_then_down(),
    };
    let artifacts = RecordingArtifacts::default();

    let run_dir = run_backtest(
        &config,
        &raw,
        Some(Path::new("/tmp/elsewhere")),
        &market,
        &artifacts,
    )
    .expect("backtest");
    assert_eq!(run_dir, PathBuf::from("/tmp/elsewhere/use_case"));
}

#[test]
fn every_engine_yields_the_same_ledger() {
    let market = FixedMarketData {
        bars: up_then_down(),
    };
    let mut ledgers = Vec::new();
    for engine in ["vectorized", "backtestingpy", "custom"] {
        let raw = config_toml(engine, "ema_crossover", "runs");
        let artifacts = RecordingArtifacts::default();
        run_backtest(&parse(&raw), &raw, None, &market, &artifacts).expect("backtest");
        let trades = artifacts.trades.lock().expect("trades").clone();
        ledgers.push(trades);
    }
    assert_eq!(ledgers[0], ledgers[1]);
    assert_eq!(ledgers[1], ledgers[2]);
}

#[test]
fn unknown_names_fail_before_touching_data() {
    struct Unreachable;
    impl MarketDataRepository for Unreachable {
        fn load_bars(&self, _query: &PriceQuery) -> Result<(Vec<PriceBar>, DataQualityReport), String> {
            Err("market data should not be loaded".to_string())
        }
    }

    let raw = config_toml("zipline", "ema_crossover", "runs");
    let err = run_backtest(&parse(&raw), &raw, None, &Unreachable, &RecordingArtifacts::default())
        .expect_err("unknown engine");
    assert!(err.contains("unknown engine: zipline"));

    let raw = config_toml("event", "momentum", "runs");
    let err = run_backtest(&parse(&raw), &raw, None, &Unreachable, &RecordingArtifacts::default())
        .expect_err("unknown strategy");
    assert!(err.contains("unknown strategy: momentum"));
}

#[test]
fn artifact_failures_propagate() {
    let raw = config_toml("event", "ema_crossover", "runs");
    let market = FixedMarketData {
        bars: up_then_down(),
    };
    let err = run_backtest(&parse(&raw), &raw, None, &market, &FailingArtifacts)
        .expect_err("artifact failure");
    assert!(err.contains("read-only filesystem"));
}

#[test]
fn cancelled_backtest_writes_nothing() {
    let raw = config_toml("custom", "ema_crossover", "runs");
    let market = FixedMarketData {
        bars: up_then_down(),
    };
    let artifacts = RecordingArtifacts::default();
    let cancel = || true;

    let err = run_backtest_with_hooks(
        &parse(&raw),
        &raw,
        None,
        &market,
        &artifacts,
        None,
        Some(&cancel),
    )
    .expect_err("cancelled");
    assert_eq!(err, "cancelled");
    assert!(artifacts.files.lock().expect("files").is_empty());
}

#[test]
fn shared_cache_serves_repeated_runs() {
    let raw = config_toml("event", "ema_crossover", "runs");
    let config = parse(&raw);
    let market = FixedMarketData {
        bars: up_then_down(),
    };
    let cache = RunCache::new();

    let first = run_backtest_with_hooks(
        &config,
        &raw,
        None,
        &market,
        &RecordingArtifacts::default(),
        Some(&cache),
        None,
    )
    .expect("first");
    let artifacts = RecordingArtifacts::default();
    let second = run_backtest_with_hooks(
        &config,
        &raw,
        None,
        &market,
        &artifacts,
        Some(&cache),
        None,
    )
    .expect("second");

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.output.trades, second.output.trades);
    assert!(artifacts
        .events
        .lock()
        .expect("events")
        .iter()
        .any(|event| event.stage == "memo" && event.action == "hit"));
}

#[test]
fn csv_to_filesystem_round_trip() {
    let temp_dir = test_temp_dir("quill_use_case_fs");
    std::fs::create_dir_all(&temp_dir).expect("temp dir");

    let csv_path = temp_dir.join("bars.csv");
    let mut csv = String::from("timestamp_utc,open,high,low,close,volume\n");
    for bar in up_then_down() {
        csv.push_str(&format!(
            "{},{},{},{},{},{}\n",
            bar.timestamp, bar.open, bar.high, bar.low, bar.close, bar.volume
        ));
    }
    std::fs::write(&csv_path, csv).expect("write csv");

    let raw = config_toml("event", "ema_crossover", &temp_dir.join("runs").display().to_string())
        .replace("bars.csv", &csv_path.display().to_string());
    let config_path = temp_dir.join("config.toml");
    std::fs::write(&config_path, &raw).expect("write config");

    let (config, source) = load_config_with_source(&config_path).expect("load config");
    let run_dir = run_backtest(
        &config,
        &source,
        None,
        &CsvMarketData::new(),
        &FsArtifactWriter::new(),
    )
    .expect("backtest");

    for name in [
        "trades.csv",
        "equity.csv",
        "report.json",
        "logs.jsonl",
        "config_snapshot.toml",
    ] {
        assert!(run_dir.join(name).exists(), "{name} should exist");
    }
    let trades = std::fs::read_to_string(run_dir.join("trades.csv")).expect("trades");
    assert_eq!(trades.lines().count(), 3);
    let report: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(run_dir.join("report.json")).expect("report"),
    )
    .expect("report json");
    assert_eq!(report["equity"].as_array().map(Vec::len), Some(2));

    let _ = std::fs::remove_dir_all(&temp_dir);
}
