use crate::entities::stats::Stats;
use crate::value_objects::equity_point::EquityPoint;
use crate::value_objects::trade::Trade;

pub const ANNUALIZATION: f64 = 252.0;
const SECONDS_PER_DAY: i64 = 86_400;
const DAYS_PER_YEAR: f64 = 365.25;

/// Total over any ledger and curve; degenerate statistics collapse to 0.0.
pub fn compute_stats(trades: &[Trade], equity: &[EquityPoint]) -> Stats {
    let returns = pct_returns(equity);
    let pnl_sum: f64 = trades.iter().filter_map(|trade| trade.pnl).sum();

    Stats {
        total_return: total_return(equity),
        sharpe: sharpe_ratio(&returns),
        max_drawdown: max_drawdown(equity),
        win_rate: win_rate(trades),
        trade_count: trades.len(),
        pnl_sum: finite_or_zero(pnl_sum),
        cagr: cagr(equity),
    }
}

pub fn pct_returns(equity: &[EquityPoint]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|pair| (pair[1].equity - pair[0].equity) / pair[0].equity)
        .filter(|ret| ret.is_finite())
        .collect()
}

pub fn total_return(equity: &[EquityPoint]) -> f64 {
    let (Some(first), Some(last)) = (equity.first(), equity.last()) else {
        return 0.0;
    };
    if equity.len() < 2 || first.equity == 0.0 {
        return 0.0;
    }
    finite_or_zero((last.equity - first.equity) / first.equity)
}

pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns
        .iter()
        .map(|ret| {
            let diff = ret - mean;
            diff * diff
        })
        .sum::<f64>()
        / (n - 1.0);
    let std = var.sqrt();
    // Constant series leave rounding noise in the variance.
    if !std.is_finite() || std == 0.0 || std <= mean.abs() * 1e-12 {
        return 0.0;
    }
    finite_or_zero(mean / std * ANNUALIZATION.sqrt())
}

pub fn max_drawdown(equity: &[EquityPoint]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0f64;
    for point in equity {
        if point.equity > peak {
            peak = point.equity;
        }
        if peak <= 0.0 || !peak.is_finite() {
            continue;
        }
        let drawdown = (point.equity - peak) / peak;
        if drawdown.is_finite() && drawdown < worst {
            worst = drawdown;
        }
    }
    worst.clamp(-1.0, 0.0)
}

pub fn cagr(equity: &[EquityPoint]) -> f64 {
    let (Some(first), Some(last)) = (equity.first(), equity.last()) else {
        return 0.0;
    };
    let Some(elapsed) = last.timestamp.checked_sub(first.timestamp) else {
        return 0.0;
    };
    let days = elapsed / SECONDS_PER_DAY;
    if days <= 0 || first.equity <= 0.0 {
        return 0.0;
    }
    let ratio = last.equity / first.equity;
    if !ratio.is_finite() || ratio <= 0.0 {
        return 0.0;
    }
    let years = days as f64 / DAYS_PER_YEAR;
    finite_or_zero(ratio.powf(1.0 / years) - 1.0)
}

pub fn win_rate(trades: &[Trade]) -> f64 {
    let closed: Vec<f64> = trades.iter().filter_map(|trade| trade.pnl).collect();
    if closed.is_empty() {
        return 0.0;
    }
    let wins = closed.iter().filter(|pnl| **pnl > 0.0).count();
    wins as f64 / closed.len() as f64
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
