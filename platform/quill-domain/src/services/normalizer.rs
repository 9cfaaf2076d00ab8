use crate::services::audit::{AuditEvent, RunContext};
use crate::value_objects::bar::PriceBar;
use crate::value_objects::signal::Signal;
use serde_json::json;
use std::collections::BTreeMap;

/// Ordered timestamp -> bar lookup over a price series. When the series repeats
/// a timestamp the first bar wins.
#[derive(Debug, Clone, Default)]
pub struct PriceIndex<'a> {
    bars: BTreeMap<i64, &'a PriceBar>,
}

impl<'a> PriceIndex<'a> {
    pub fn new(bars: &'a [PriceBar]) -> Self {
        let mut index = BTreeMap::new();
        for bar in bars {
            index.entry(bar.timestamp).or_insert(bar);
        }
        Self { bars: index }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.bars.contains_key(&timestamp)
    }

    pub fn bar(&self, timestamp: i64) -> Option<&'a PriceBar> {
        self.bars.get(&timestamp).copied()
    }

    pub fn close(&self, timestamp: i64) -> Option<f64> {
        self.bar(timestamp).map(|bar| bar.close)
    }

    /// Bars in strictly increasing timestamp order.
    pub fn bars(&self) -> impl Iterator<Item = &'a PriceBar> + '_ {
        self.bars.values().copied()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedSignals {
    pub signals: Vec<Signal>,
    /// Signals dropped because their timestamp has no bar.
    pub skipped: usize,
    /// Signals dropped because their quantity is not a positive number.
    pub invalid_quantity: usize,
}

pub fn normalize(
    signals: &[Signal],
    index: &PriceIndex<'_>,
    ctx: &RunContext<'_>,
) -> NormalizedSignals {
    let mut ordered = signals.to_vec();
    // Stable: signals sharing a timestamp keep the strategy's emission order.
    ordered.sort_by_key(|signal| signal.timestamp);

    let mut out = NormalizedSignals {
        signals: Vec::with_capacity(ordered.len()),
        ..NormalizedSignals::default()
    };

    for signal in ordered {
        if !index.contains(signal.timestamp) {
            out.skipped += 1;
            ctx.emit(skip_event(&signal, "signal_out_of_range"));
            continue;
        }
        if !signal.quantity.is_finite() || signal.quantity <= 0.0 {
            out.invalid_quantity += 1;
            ctx.emit(skip_event(&signal, "non_positive_quantity"));
            continue;
        }
        out.signals.push(signal);
    }

    out
}

fn skip_event(signal: &Signal, reason: &str) -> AuditEvent {
    AuditEvent::new(signal.timestamp, "normalizer", "skip")
        .with_symbol(&signal.symbol)
        .with_error(reason)
        .with_details(json!({
            "side": signal.side.as_str(),
            "qty": signal.quantity,
        }))
}

#[cfg(test)]
mod tests {
    use super::{normalize, PriceIndex};
    use crate::services::audit::{MemorySink, RunContext};
    use crate::value_objects::bar::PriceBar;
    use crate::value_objects::signal::Signal;

    fn bar(ts: i64, close: f64) -> PriceBar {
        PriceBar {
            timestamp: ts,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn sorts_stably_and_keeps_source_order_on_ties() {
        let bars = vec![bar(1, 10.0), bar(2, 11.0), bar(3, 12.0)];
        let index = PriceIndex::new(&bars);
        let sink = MemorySink::new();
        let ctx = RunContext::new("t", &sink);

        let signals = vec![
            Signal::sell(3, "X", 1.0),
            Signal::buy(2, "X", 1.0),
            Signal::sell(2, "X", 2.0),
            Signal::buy(1, "X", 1.0),
        ];
        let out = normalize(&signals, &index, &ctx);

        let order: Vec<(i64, f64)> = out
            .signals
            .iter()
            .map(|s| (s.timestamp, s.quantity))
            .collect();
        assert_eq!(order, vec![(1, 1.0), (2, 1.0), (2, 2.0), (3, 1.0)]);
        assert_eq!(out.signals[1], Signal::buy(2, "X", 1.0));
        assert_eq!(out.skipped, 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn drops_signals_without_a_bar_and_counts_them() {
        let bars = vec![bar(10, 1.0), bar(20, 2.0)];
        let index = PriceIndex::new(&bars);
        let sink = MemorySink::new();
        let ctx = RunContext::new("t", &sink);

        let signals = vec![
            Signal::buy(10, "X", 1.0),
            Signal::sell(15, "X", 1.0),
            Signal::sell(99, "X", 1.0),
            Signal::sell(20, "X", 0.0),
        ];
        let out = normalize(&signals, &index, &ctx);

        assert_eq!(out.signals, vec![Signal::buy(10, "X", 1.0)]);
        assert_eq!(out.skipped, 2);
        assert_eq!(out.invalid_quantity, 1);
        assert_eq!(sink.count("normalizer", "skip"), 3);
    }

    #[test]
    fn first_bar_wins_on_duplicate_timestamps() {
        let bars = vec![bar(5, 1.0), bar(5, 9.0), bar(1, 3.0)];
        let index = PriceIndex::new(&bars);
        assert_eq!(index.len(), 2);
        assert_eq!(index.close(5), Some(1.0));
        let order: Vec<i64> = index.bars().map(|b| b.timestamp).collect();
        assert_eq!(order, vec![1, 5]);
    }
}
