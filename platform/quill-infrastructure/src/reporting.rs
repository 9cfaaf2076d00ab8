use quill_domain::services::audit::AuditEvent;
use quill_domain::services::engine::ReportBundle;
use quill_domain::value_objects::equity_point::EquityPoint;
use quill_domain::value_objects::trade::Trade;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Serialize)]
struct TradeRecord<'a> {
    timestamp_utc: i64,
    symbol: &'a str,
    side: &'static str,
    qty: f64,
    price: f64,
    fee: f64,
    pnl: Option<f64>,
}

#[derive(Debug, Serialize)]
struct EquityRecord {
    timestamp_utc: i64,
    equity: f64,
    cash: f64,
}

pub fn write_trades_csv(path: &Path, trades: &[Trade]) -> Result<(), String> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|err| format!("failed to create trades csv {}: {}", path.display(), err))?;
    for trade in trades {
        writer
            .serialize(TradeRecord {
                timestamp_utc: trade.timestamp,
                symbol: &trade.symbol,
                side: trade.side.as_str(),
                qty: trade.quantity,
                price: trade.price,
                fee: trade.fee,
                pnl: trade.pnl,
            })
            .map_err(|err| format!("failed to write trades row: {}", err))?;
    }
    if trades.is_empty() {
        writer
            .write_record(["timestamp_utc", "symbol", "side", "qty", "price", "fee", "pnl"])
            .map_err(|err| format!("failed to write trades header: {}", err))?;
    }
    writer
        .flush()
        .map_err(|err| format!("failed to flush {}: {}", path.display(), err))
}

pub fn write_equity_csv(path: &Path, points: &[EquityPoint]) -> Result<(), String> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|err| format!("failed to create equity csv {}: {}", path.display(), err))?;
    for point in points {
        writer
            .serialize(EquityRecord {
                timestamp_utc: point.timestamp,
                equity: point.equity,
                cash: point.cash,
            })
            .map_err(|err| format!("failed to write equity row: {}", err))?;
    }
    if points.is_empty() {
        writer
            .write_record(["timestamp_utc", "equity", "cash"])
            .map_err(|err| format!("failed to write equity header: {}", err))?;
    }
    writer
        .flush()
        .map_err(|err| format!("failed to flush {}: {}", path.display(), err))
}

pub fn write_report_json(path: &Path, report: &ReportBundle) -> Result<(), String> {
    let json = serde_json::to_string_pretty(&report.to_json())
        .map_err(|err| format!("failed to serialize report: {}", err))?;
    fs::write(path, json).map_err(|err| format!("failed to write report {}: {}", path.display(), err))
}

pub fn write_audit_jsonl(path: &Path, events: &[AuditEvent]) -> Result<(), String> {
    let mut file =
        fs::File::create(path).map_err(|err| format!("failed to create logs: {}", err))?;
    for event in events {
        let line = serde_json::to_string(event)
            .map_err(|err| format!("failed to serialize audit event: {}", err))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .map_err(|err| format!("failed to write audit event: {}", err))?;
    }
    Ok(())
}
