use crate::config::Config;
use crate::shared::engine_error;
use quill_domain::repositories::market_data::{
    DataQualityReport, MarketDataRepository, PriceQuery,
};
use quill_domain::services::engine::resolve_engine;
use quill_domain::services::strategy::resolve_strategy;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub engine: String,
    pub strategy: String,
    pub params: serde_json::Value,
    pub bars: usize,
    pub first_timestamp: Option<i64>,
    pub last_timestamp: Option<i64>,
    /// `first .. last` as RFC 3339 UTC.
    pub span_utc: Option<String>,
    pub data_quality: DataQualityReport,
    pub warnings: Vec<String>,
}

/// Checks that a config resolves to a runnable backtest without running it.
/// With `strict`, any warning fails the validation.
pub fn validate(
    config: &Config,
    strict: bool,
    market_data: &dyn MarketDataRepository,
) -> Result<ValidationReport, String> {
    let backtest_config = config.backtest_config()?;
    let engine = resolve_engine(&config.run.engine).map_err(engine_error)?;
    let strategy =
        resolve_strategy(&config.strategy.name, config.vwap_params()?).map_err(engine_error)?;

    let (bars, data_quality) = market_data.load_bars(&PriceQuery {
        path: PathBuf::from(&config.data.path),
        symbol: config.data.symbol.clone(),
    })?;

    let mut warnings = Vec::new();
    if bars.is_empty() {
        warnings.push("price series is empty".to_string());
    } else if bars.len() < backtest_config.slow {
        warnings.push(format!(
            "price series has {} bars, fewer than the slow period ({})",
            bars.len(),
            backtest_config.slow
        ));
    }
    if data_quality.invalid_rows > 0 {
        warnings.push(format!("{} invalid rows dropped", data_quality.invalid_rows));
    }
    if data_quality.duplicates > 0 {
        warnings.push(format!(
            "{} duplicate timestamps collapsed",
            data_quality.duplicates
        ));
    }
    if data_quality.out_of_order > 0 {
        warnings.push(format!(
            "{} rows out of order were re-sorted",
            data_quality.out_of_order
        ));
    }
    if backtest_config.cash < backtest_config.qty * bars.first().map(|bar| bar.close).unwrap_or(0.0)
    {
        warnings.push("starting cash does not cover one position at the first close".to_string());
    }

    for warning in &warnings {
        tracing::warn!(run_id = %config.run.run_id, warning = %warning, "validation warning");
    }
    if strict && !warnings.is_empty() {
        return Err(format!("strict validation failed: {}", warnings.join("; ")));
    }

    Ok(ValidationReport {
        engine: engine.name().to_string(),
        strategy: strategy.name().to_string(),
        params: strategy.params(&backtest_config),
        bars: bars.len(),
        first_timestamp: bars.first().map(|bar| bar.timestamp),
        last_timestamp: bars.last().map(|bar| bar.timestamp),
        span_utc: match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some(format!(
                "{} .. {}",
                utc_label(first.timestamp),
                utc_label(last.timestamp)
            )),
            _ => None,
        },
        data_quality,
        warnings,
    })
}

fn utc_label(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_else(|| timestamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::validate;
    use crate::config::Config;
    use quill_domain::repositories::market_data::{
        DataQualityReport, MarketDataRepository, PriceQuery,
    };
    use quill_domain::value_objects::bar::PriceBar;

    struct FixedBars {
        bars: Vec<PriceBar>,
        report: DataQualityReport,
    }

    impl MarketDataRepository for FixedBars {
        fn load_bars(
            &self,
            _query: &PriceQuery,
        ) -> Result<(Vec<PriceBar>, DataQualityReport), String> {
            Ok((self.bars.clone(), self.report.clone()))
        }
    }

    fn bars(count: usize) -> Vec<PriceBar> {
        (0..count)
            .map(|idx| PriceBar {
                timestamp: 60 * idx as i64,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1.0,
            })
            .collect()
    }

    fn config(engine: &str) -> Config {
        toml::from_str(&format!(
            r#"
[run]
run_id = "validate"
engine = "{engine}"

[data]
path = "bars.csv"
symbol = "BTCUSDT"

[strategy]
name = "vwap"
fast = 2
slow = 5
qty = 1.0

[account]
cash = 1000.0

[paths]
out_dir = "runs/"
"#
        ))
        .expect("config")
    }

    #[test]
    fn clean_inputs_validate_without_warnings() {
        let market = FixedBars {
            bars: bars(10),
            report: DataQualityReport::default(),
        };
        let report = validate(&config("backtestingpy"), true, &market).expect("valid");
        assert_eq!(report.engine, "event");
        assert_eq!(report.strategy, "vwap_breakout");
        assert_eq!(report.bars, 10);
        assert_eq!(report.last_timestamp, Some(540));
        assert_eq!(
            report.span_utc.as_deref(),
            Some("1970-01-01T00:00:00Z .. 1970-01-01T00:09:00Z")
        );
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn strict_mode_fails_on_dirty_data() {
        let market = FixedBars {
            bars: bars(3),
            report: DataQualityReport {
                rows: 4,
                duplicates: 1,
                ..DataQualityReport::default()
            },
        };
        let report = validate(&config("custom"), false, &market).expect("lenient");
        assert_eq!(report.warnings.len(), 2);

        let err = validate(&config("custom"), true, &market).expect_err("strict");
        assert!(err.starts_with("strict validation failed"));
    }

    #[test]
    fn unknown_engine_is_reported() {
        let market = FixedBars {
            bars: bars(10),
            report: DataQualityReport::default(),
        };
        let err = validate(&config("zipline"), false, &market).expect_err("unknown");
        assert!(err.contains("unknown engine: zipline"));
    }
}
