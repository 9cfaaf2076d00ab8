use chrono::{DateTime, NaiveDate, NaiveDateTime};
use quill_domain::repositories::market_data::{DataQualityReport, MarketDataRepository, PriceQuery};
use quill_domain::value_objects::bar::PriceBar;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

/// Reads OHLCV bars from a headed CSV file: `timestamp_utc,open,high,low,close,volume`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvMarketData;

impl CsvMarketData {
    pub fn new() -> Self {
        Self
    }
}

impl MarketDataRepository for CsvMarketData {
    fn load_bars(&self, query: &PriceQuery) -> Result<(Vec<PriceBar>, DataQualityReport), String> {
        let start = Instant::now();
        let result = load_csv(&query.path);
        let result_label = if result.is_ok() { "ok" } else { "err" };
        metrics::histogram!("quill.infra.market_data.load_ms", "result" => result_label)
            .record(start.elapsed().as_millis() as f64);
        if let Ok((bars, report)) = &result {
            tracing::info!(
                symbol = %query.symbol,
                path = %query.path.display(),
                bars = bars.len(),
                invalid_rows = report.invalid_rows,
                duplicates = report.duplicates,
                out_of_order = report.out_of_order,
                "loaded price series"
            );
        }
        result
    }
}

#[derive(Debug, Deserialize)]
struct BarRecord {
    #[serde(alias = "timestamp", alias = "date", alias = "datetime")]
    timestamp_utc: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// Parses, validates and orders the rows. Rows with an unparseable timestamp or
/// a non-positive close are dropped; a repeated timestamp keeps the last row.
pub fn load_csv(path: &Path) -> Result<(Vec<PriceBar>, DataQualityReport), String> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|err| format!("failed to open price csv {}: {}", path.display(), err))?;

    let mut report = DataQualityReport::default();
    let mut by_timestamp: BTreeMap<i64, PriceBar> = BTreeMap::new();
    let mut last_timestamp: Option<i64> = None;

    for (row, result) in reader.deserialize::<BarRecord>().enumerate() {
        report.rows += 1;
        let record = result.map_err(|err| {
            format!("failed to parse price row {} in {}: {}", row + 1, path.display(), err)
        })?;
        let Ok(timestamp) = parse_timestamp(&record.timestamp_utc) else {
            report.invalid_rows += 1;
            continue;
        };
        if !record.close.is_finite() || record.close <= 0.0 {
            report.invalid_rows += 1;
            continue;
        }
        if last_timestamp.is_some_and(|last| timestamp < last) {
            report.out_of_order += 1;
        }
        last_timestamp = Some(timestamp);

        let bar = PriceBar {
            timestamp,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: if record.volume.is_finite() { record.volume } else { 0.0 },
        };
        if by_timestamp.insert(timestamp, bar).is_some() {
            report.duplicates += 1;
        }
    }

    Ok((by_timestamp.into_values().collect(), report))
}

/// Accepts epoch seconds, RFC 3339, `%Y-%m-%d %H:%M:%S` (UTC) or a bare date.
pub fn parse_timestamp(raw: &str) -> Result<i64, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("timestamp cannot be empty".to_string());
    }
    if let Ok(seconds) = trimmed.parse::<i64>() {
        return Ok(seconds);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.timestamp());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc().timestamp());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc().timestamp());
        }
    }
    Err(format!(
        "invalid timestamp (expected epoch seconds, RFC3339 or YYYY-MM-DD HH:MM:SS): {trimmed}"
    ))
}

#[cfg(test)]
mod tests {
    use super::{load_csv, parse_timestamp, CsvMarketData};
    use quill_domain::repositories::market_data::{MarketDataRepository, PriceQuery};
    use std::fs;
    use std::path::PathBuf;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "quill_{}_{}_{}.csv",
            name,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock before UNIX_EPOCH")
                .as_nanos()
        ));
        fs::write(&path, contents).expect("write csv");
        path
    }

    #[test]
    fn parses_supported_timestamp_formats() {
        assert_eq!(parse_timestamp("1704067200"), Ok(1_704_067_200));
        assert_eq!(parse_timestamp("2024-01-01T00:00:00Z"), Ok(1_704_067_200));
        assert_eq!(parse_timestamp("2024-01-01 00:00:00"), Ok(1_704_067_200));
        assert_eq!(parse_timestamp("2024-01-01"), Ok(1_704_067_200));
        assert_eq!(parse_timestamp("2024-01-01T01:00:00+01:00"), Ok(1_704_067_200));
        assert!(parse_timestamp("yesterday").is_err());
        assert!(parse_timestamp(" ").is_err());
    }

    #[test]
    fn cleans_sorts_and_dedupes_rows() {
        let path = temp_file(
            "clean",
            "timestamp_utc,open,high,low,close,volume\n\
             2024-01-01 02:00:00,1,1,1,12,1\n\
             2024-01-01 00:00:00,1,1,1,10,1\n\
             2024-01-01 01:00:00,1,1,1,11,1\n\
             2024-01-01 01:00:00,1,1,1,11.5,2\n\
             not-a-date,1,1,1,13,1\n\
             2024-01-01 03:00:00,1,1,1,0,1\n",
        );
        let (bars, report) = load_csv(&path).expect("load");
        let _ = fs::remove_file(&path);

        assert_eq!(bars.len(), 3);
        assert!(bars.windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp));
        assert_eq!(bars[1].close, 11.5);
        assert_eq!(report.rows, 6);
        assert_eq!(report.invalid_rows, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.out_of_order, 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn repository_reports_missing_file() {
        let repo = CsvMarketData::new();
        let err = repo
            .load_bars(&PriceQuery {
                path: PathBuf::from("/nonexistent/quill/prices.csv"),
                symbol: "BTCUSDT".to_string(),
            })
            .expect_err("missing file");
        assert!(err.contains("failed to open price csv"));
    }
}
