use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    filters::Filters,
    time::{deserialize_timestamp, serialize_timestamp},
};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Advice {
    None,
    Long,
    Short,
    Liquidate,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Candle {
    #[serde(serialize_with = "serialize_timestamp")]
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub time: u64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub closed: bool,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Trade {
    #[serde(serialize_with = "serialize_timestamp")]
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub time: u64,
    pub price: Decimal,
    pub size: Decimal,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Fees {
    pub maker: Decimal,
    pub taker: Decimal,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct BorrowInfo {
    pub daily_interest_rate: Decimal,
    pub limit: Decimal,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Ticker {
    pub volume: Decimal,
    pub quote_volume: Decimal,
    pub price: Decimal,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Balance {
    pub available: Decimal,
    pub hold: Decimal,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Fill {
    pub price: Decimal,
    pub size: Decimal,
    pub quote: Decimal,
    pub fee: Decimal,
    pub fee_asset: String,
}

impl Fill {
    pub fn with_computed_quote(
        price: Decimal,
        size: Decimal,
        fee: Decimal,
        fee_asset: &str,
        quote_precision: u32,
    ) -> Self {
        Self {
            price,
            size,
            quote: crate::math::round_down(price * size, quote_precision),
            fee,
            fee_asset: fee_asset.to_owned(),
        }
    }

    pub fn total_size(fills: &[Fill]) -> Decimal {
        fills.iter().map(|fill| fill.size).sum()
    }

    pub fn total_quote(fills: &[Fill]) -> Decimal {
        fills.iter().map(|fill| fill.quote).sum()
    }

    pub fn total_fee(fills: &[Fill]) -> Decimal {
        fills.iter().map(|fill| fill.fee).sum()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ExchangeInfo {
    pub fees: HashMap<String, Fees>,
    pub filters: HashMap<String, Filters>,
    pub candle_intervals: Vec<u64>,
    // Keyed by symbol, then base asset.
    pub borrow_info: HashMap<String, HashMap<String, BorrowInfo>>,
    pub margin_multiplier: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fill_totals() {
        let fills = vec![
            Fill {
                price: dec!(1.0),
                size: dec!(2.0),
                quote: dec!(2.0),
                fee: dec!(0.02),
                fee_asset: "eth".into(),
            },
            Fill {
                price: dec!(2.0),
                size: dec!(1.0),
                quote: dec!(2.0),
                fee: dec!(0.01),
                fee_asset: "eth".into(),
            },
        ];
        assert_eq!(Fill::total_size(&fills), dec!(3.0));
        assert_eq!(Fill::total_quote(&fills), dec!(4.0));
        assert_eq!(Fill::total_fee(&fills), dec!(0.03));
    }

    #[test]
    fn test_fill_computed_quote_rounds_down() {
        let fill = Fill::with_computed_quote(dec!(0.3), dec!(1.0), dec!(0.0), "btc", 1);
        assert_eq!(fill.quote, dec!(0.3));
        let fill = Fill::with_computed_quote(dec!(0.33), dec!(0.5), dec!(0.0), "btc", 2);
        assert_eq!(fill.quote, dec!(0.16));
    }
}
