use crate::value_objects::bar::PriceBar;
use chrono::{DateTime, Datelike};
use serde::{Deserialize, Serialize};

/// Exponential moving average seeded with the first value (`adjust = false`).
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn new(span: usize) -> Self {
        Self {
            alpha: 2.0 / (span.max(1) as f64 + 1.0),
            value: None,
        }
    }

    pub fn update(&mut self, input: f64) -> f64 {
        let next = match self.value {
            Some(prev) => prev + self.alpha * (input - prev),
            None => input,
        };
        self.value = Some(next);
        next
    }
}

pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let mut state = Ema::new(span);
    values.iter().map(|value| state.update(*value)).collect()
}

/// VWAP anchor period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Session {
    #[serde(rename = "D")]
    Day,
    #[default]
    #[serde(rename = "W")]
    Week,
    #[serde(rename = "M")]
    Month,
}

impl Session {
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_uppercase().as_str() {
            "D" | "DAY" => Ok(Session::Day),
            "W" | "WEEK" => Ok(Session::Week),
            "M" | "MONTH" => Ok(Session::Month),
            other => Err(format!("unsupported session: {other} (use: D | W | M)")),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Session::Day => "D",
            Session::Week => "W",
            Session::Month => "M",
        }
    }

    /// Bars sharing a key belong to the same session.
    fn key(self, timestamp: i64) -> Option<(i32, u32)> {
        let dt = DateTime::from_timestamp(timestamp, 0)?;
        Some(match self {
            Session::Day => (dt.year(), dt.ordinal()),
            Session::Week => {
                let week = dt.iso_week();
                (week.year(), week.week())
            }
            Session::Month => (dt.year(), dt.month()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VwapPoint {
    pub vwap: f64,
    pub upper: f64,
    pub lower: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VwapBands {
    pub vwap: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

impl VwapBands {
    pub fn len(&self) -> usize {
        self.vwap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vwap.is_empty()
    }

    pub fn point(&self, idx: usize) -> Option<VwapPoint> {
        Some(VwapPoint {
            vwap: *self.vwap.get(idx)?,
            upper: *self.upper.get(idx)?,
            lower: *self.lower.get(idx)?,
        })
    }
}

/// Session-anchored VWAP with volume-weighted deviation bands.
#[derive(Debug, Clone)]
pub struct AnchoredVwap {
    session: Session,
    mult: f64,
    current: Option<(i32, u32)>,
    cum_pv: f64,
    cum_vol: f64,
    sum_sq: f64,
}

impl AnchoredVwap {
    pub fn new(session: Session, mult: f64) -> Self {
        Self {
            session,
            mult,
            current: None,
            cum_pv: 0.0,
            cum_vol: 0.0,
            sum_sq: 0.0,
        }
    }

    pub fn update(&mut self, bar: &PriceBar) -> VwapPoint {
        let key = self.session.key(bar.timestamp);
        if key.is_some() && self.current.is_some() && key != self.current {
            self.cum_pv = 0.0;
            self.cum_vol = 0.0;
            self.sum_sq = 0.0;
        }
        if key.is_some() {
            self.current = key;
        }

        let typical = bar.hlc3();
        self.cum_pv += typical * bar.volume;
        self.cum_vol += bar.volume;
        if self.cum_vol <= 0.0 {
            // No traded volume yet in this session.
            return VwapPoint {
                vwap: typical,
                upper: typical,
                lower: typical,
            };
        }

        let vwap = self.cum_pv / self.cum_vol;
        self.sum_sq += (typical - vwap).powi(2) * bar.volume;
        let stdev = (self.sum_sq / self.cum_vol).max(0.0).sqrt();
        VwapPoint {
            vwap,
            upper: vwap + self.mult * stdev,
            lower: vwap - self.mult * stdev,
        }
    }
}

pub fn anchored_vwap(bars: &[PriceBar], session: Session, mult: f64) -> VwapBands {
    let mut state = AnchoredVwap::new(session, mult);
    let mut bands = VwapBands {
        vwap: Vec::with_capacity(bars.len()),
        upper: Vec::with_capacity(bars.len()),
        lower: Vec::with_capacity(bars.len()),
    };
    for bar in bars {
        let point = state.update(bar);
        bands.vwap.push(point.vwap);
        bands.upper.push(point.upper);
        bands.lower.push(point.lower);
    }
    bands
}
