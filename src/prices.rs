use std::collections::HashMap;

use rust_decimal::prelude::ToPrimitive;

use crate::{
    chandler::{Chandler, Result},
    common::Candle,
    math::floor_multiple,
    time::DAY_MS,
    SymbolExt,
};

// Daily fiat price series for the assets making up the traded symbols. Used
// by the optimizer for mark-to-market statistics and for the BTC benchmark.
#[derive(Clone)]
pub struct Prices {
    chandler: Chandler,
}

impl Prices {
    pub fn new(chandler: Chandler) -> Self {
        Self { chandler }
    }

    // Series span `[start, end)` floored to days; the first element is the
    // opening price of the first day, the rest are daily closes. The `btc`
    // series is always included for benchmarking.
    pub async fn map_asset_prices(
        &self,
        exchange: &str,
        symbols: &[String],
        start: u64,
        end: u64,
        fiat_asset: &str,
    ) -> Result<HashMap<String, Vec<f64>>> {
        let start = floor_multiple(start, DAY_MS);
        let end = floor_multiple(end, DAY_MS);

        let mut assets: Vec<&str> = Vec::new();
        for symbol in symbols {
            let (base_asset, quote_asset) = symbol.assets();
            if !assets.contains(&base_asset) {
                assets.push(base_asset);
            }
            if !assets.contains(&quote_asset) {
                assets.push(quote_asset);
            }
        }
        if !assets.contains(&"btc") {
            assets.push("btc");
        }

        let mut result = HashMap::with_capacity(assets.len());
        for asset in assets {
            let prices = if asset == fiat_asset {
                let length = ((end - start) / DAY_MS) as usize + 1;
                vec![1.0; length]
            } else {
                let symbol = format!("{}-{}", asset, fiat_asset);
                let candles = self
                    .chandler
                    .list_candles_fill_missing(exchange, &symbol, DAY_MS, start, end)
                    .await?;
                candles_to_prices(&candles, None)
            };
            result.insert(asset.to_owned(), prices);
        }
        Ok(result)
    }
}

// Prices have one extra element in the beginning which is the opening price
// of the first candle.
pub fn candles_to_prices(candles: &[Candle], multipliers: Option<&[f64]>) -> Vec<f64> {
    let mut prices = Vec::with_capacity(candles.len() + 1);
    prices.push(
        candles[0].open.to_f64().unwrap_or(0.0) * multipliers.map_or(1.0, |m| m[0]),
    );
    for (i, candle) in candles.iter().enumerate() {
        let multiplier_i = i + 1; // Has to be offset by 1.
        prices.push(
            candle.close.to_f64().unwrap_or(0.0) * multipliers.map_or(1.0, |m| m[multiplier_i]),
        );
    }
    prices
}
