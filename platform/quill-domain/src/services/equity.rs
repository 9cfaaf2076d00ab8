use crate::value_objects::equity_point::EquityPoint;
use crate::value_objects::side::Side;
use crate::value_objects::trade::Trade;
use std::collections::BTreeMap;

/// One point per trade. Open positions are marked at the price of the trade
/// that produced the point.
pub fn build_equity_curve(trades: &[Trade], starting_cash: f64) -> Vec<EquityPoint> {
    let mut ordered: Vec<&Trade> = trades.iter().collect();
    ordered.sort_by_key(|trade| trade.timestamp);

    let mut cash = starting_cash;
    let mut positions: BTreeMap<&str, f64> = BTreeMap::new();
    let mut curve = Vec::with_capacity(ordered.len());

    for trade in ordered {
        let notional = trade.quantity * trade.price;
        match trade.side {
            Side::Buy => cash -= notional + trade.fee,
            Side::Sell => cash += notional - trade.fee,
        }
        *positions.entry(trade.symbol.as_str()).or_insert(0.0) += trade.signed_quantity();

        let marked: f64 = positions.values().map(|qty| qty * trade.price).sum();
        curve.push(EquityPoint {
            timestamp: trade.timestamp,
            equity: cash + marked,
            cash,
        });
    }
    curve
}

#[cfg(test)]
mod tests {
    use super::build_equity_curve;
    use crate::value_objects::side::Side;
    use crate::value_objects::trade::Trade;

    fn trade(timestamp: i64, side: Side, quantity: f64, price: f64, pnl: Option<f64>) -> Trade {
        Trade {
            timestamp,
            symbol: "X".to_string(),
            side,
            quantity,
            price,
            fee: 0.0,
            pnl,
        }
    }

    #[test]
    fn empty_ledger_gives_empty_curve() {
        assert!(build_equity_curve(&[], 1_000.0).is_empty());
    }

    #[test]
    fn round_trip_books_the_gain_in_cash() {
        let trades = vec![
            trade(1, Side::Buy, 1.0, 100.0, None),
            trade(2, Side::Sell, 1.0, 110.0, Some(10.0)),
        ];
        let curve = build_equity_curve(&trades, 1_000.0);
        assert_eq!(curve.len(), 2);
        assert_eq!(curve[0].cash, 900.0);
        assert_eq!(curve[0].equity, 1_000.0);
        assert_eq!(curve[1].cash, 1_010.0);
        assert_eq!(curve[1].equity, 1_010.0);
    }

    #[test]
    fn short_position_is_marked_negative() {
        let trades = vec![
            trade(1, Side::Sell, 2.0, 50.0, None),
            trade(2, Side::Buy, 2.0, 40.0, Some(20.0)),
        ];
        let curve = build_equity_curve(&trades, 0.0);
        assert_eq!(curve[0].cash, 100.0);
        assert_eq!(curve[0].equity, 0.0);
        assert_eq!(curve[1].equity, 20.0);
    }

    #[test]
    fn out_of_order_ledger_is_replayed_by_timestamp() {
        let trades = vec![
            trade(5, Side::Sell, 1.0, 110.0, Some(10.0)),
            trade(1, Side::Buy, 1.0, 100.0, None),
        ];
        let curve = build_equity_curve(&trades, 1_000.0);
        assert_eq!(curve[0].timestamp, 1);
        assert_eq!(curve[1].timestamp, 5);
        assert_eq!(curve[1].equity, 1_010.0);
    }

    #[test]
    fn every_open_position_is_marked_at_the_triggering_price() {
        let first = trade(1, Side::Buy, 1.0, 100.0, None);
        let mut second = trade(2, Side::Buy, 1.0, 10.0, None);
        second.symbol = "Y".to_string();
        let curve = build_equity_curve(&[first, second], 1_000.0);
        assert_eq!(curve[0].equity, 1_000.0);
        assert_eq!(curve[1].cash, 890.0);
        assert_eq!(curve[1].equity, 910.0);
    }

    #[test]
    fn fees_reduce_cash_on_both_sides() {
        let mut buy = trade(1, Side::Buy, 1.0, 100.0, None);
        buy.fee = 1.0;
        let mut sell = trade(2, Side::Sell, 1.0, 100.0, Some(0.0));
        sell.fee = 1.0;
        let curve = build_equity_curve(&[buy, sell], 1_000.0);
        assert_eq!(curve[1].cash, 998.0);
    }
}
