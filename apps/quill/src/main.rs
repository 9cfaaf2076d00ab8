use clap::{Parser, Subcommand};
use quill::headless::{bench_lines, run_bench, run_headless, HeadlessArgs, HeadlessMode};
use quill::obs::{init_metrics, init_tracing, LogFormat};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(about = "Backtest execution and accounting engine (headless).", version)]
struct Cli {
    /// Log filter used when QUILL_LOG is not set (e.g. info, quill_application=debug).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format: text | json.
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    /// Prometheus metrics listen addr (e.g. 127.0.0.1:9898). Falls back to QUILL_METRICS_ADDR.
    #[arg(long, global = true)]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one backtest and write its artifacts.
    Backtest {
        /// Config file path (TOML). If omitted, uses env QUILL_CONFIG.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory overriding paths.out_dir.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run a parameter sweep over a base config.
    Sweep {
        /// Sweep file path (TOML).
        #[arg(long)]
        sweep: PathBuf,
    },
    /// Benchmark one engine backend on a synthetic series.
    Bench {
        /// Number of synthetic bars to generate.
        #[arg(long, default_value_t = 500_000)]
        bars: usize,

        /// Timestamp step in seconds.
        #[arg(long, default_value_t = 60)]
        step_seconds: i64,

        /// Engine backend: vectorized | vectorbt | event | backtestingpy | custom.
        #[arg(long, default_value = "vectorized")]
        engine: String,

        /// Print a single JSON line instead of human output.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Check a config and its price series without running the engine.
    Validate {
        /// Config file path (TOML). If omitted, uses env QUILL_CONFIG.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Fail on any data quality warning.
        #[arg(long)]
        strict: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_format = LogFormat::parse(&cli.log_format).unwrap_or_else(|err| fail(&err, 1));
    if let Err(err) = init_tracing(&cli.log_level, log_format) {
        fail(&err, 1);
    }
    if let Err(err) = init_metrics(cli.metrics_addr.as_deref()) {
        fail(&err, 1);
    }

    let mut args = HeadlessArgs {
        mode: HeadlessMode::Backtest,
        config_path: None,
        out_dir: None,
        strict: false,
        sweep_config: None,
        bars: 0,
        step_seconds: 60,
        engine: String::new(),
    };
    match cli.command {
        Command::Backtest { config, out } => {
            args.config_path = Some(config_or_env(config));
            args.out_dir = out;
        }
        Command::Sweep { sweep } => {
            args.mode = HeadlessMode::Sweep;
            args.sweep_config = Some(sweep);
        }
        Command::Bench {
            bars,
            step_seconds,
            engine,
            json,
        } => {
            if !json {
                match run_bench(bars, step_seconds, &engine) {
                    Ok(bench) => {
                        for line in bench_lines(&bench) {
                            println!("{line}");
                        }
                        std::process::exit(0);
                    }
                    Err(err) => fail(&err, 1),
                }
            }
            args.mode = HeadlessMode::Bench;
            args.bars = bars;
            args.step_seconds = step_seconds;
            args.engine = engine;
        }
        Command::Validate { config, strict } => {
            args.mode = HeadlessMode::Validate;
            args.config_path = Some(config_or_env(config));
            args.strict = strict;
        }
    }

    let mode = args.mode;
    match run_headless(args) {
        Ok(json) => {
            println!(
                "{}",
                serde_json::to_string(&json)
                    .unwrap_or_else(|_| "{\"status\":\"error\",\"error\":\"json\"}".to_string())
            );
            std::process::exit(0);
        }
        Err(err) => {
            tracing::debug!(mode = mode.as_str(), error = %err, "headless run failed");
            let code = if err.to_lowercase().contains("strict validation failed") {
                2
            } else {
                1
            };
            fail(&err, code);
        }
    }
}

fn config_or_env(config: Option<PathBuf>) -> PathBuf {
    config
        .or_else(|| {
            std::env::var("QUILL_CONFIG")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| fail("missing --config and env QUILL_CONFIG is not set", 1))
}

fn fail(err: &str, code: i32) -> ! {
    eprintln!("error: {err}");
    std::process::exit(code);
}
