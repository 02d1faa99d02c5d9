pub mod broker;
pub mod chandler;
pub mod common;
pub mod events;
pub mod exchange;
pub mod filters;
pub mod genetics;
pub mod indicators;
pub mod informant;
pub mod itertools;
pub mod math;
pub mod optimizer;
pub mod prices;
pub mod solver;
pub mod statistics;
pub mod stop_loss;
pub mod storage;
pub mod strategies;
pub mod take_profit;
pub mod time;
pub mod trades;
pub mod trading;
pub mod utils;

pub use crate::{
    common::{Advice, Balance, BorrowInfo, Candle, ExchangeInfo, Fees, Fill, Ticker, Trade},
    filters::Filters,
};

pub trait SymbolExt {
    fn assets(&self) -> (&str, &str);
    fn base_asset(&self) -> &str;
    fn quote_asset(&self) -> &str;
}

impl SymbolExt for str {
    fn assets(&self) -> (&str, &str) {
        let dash_i = dash_index(self);
        (&self[..dash_i], &self[dash_i + 1..])
    }
    fn base_asset(&self) -> &str {
        &self[..dash_index(self)]
    }
    fn quote_asset(&self) -> &str {
        &self[dash_index(self) + 1..]
    }
}

fn dash_index(value: &str) -> usize {
    value.find('-').expect("not a valid symbol")
}

#[cfg(test)]
mod tests {
    use super::SymbolExt;

    #[test]
    fn test_symbol_assets() {
        assert_eq!("eth-btc".assets(), ("eth", "btc"));
        assert_eq!("eth-btc".base_asset(), "eth");
        assert_eq!("eth-btc".quote_asset(), "btc");
    }
}
