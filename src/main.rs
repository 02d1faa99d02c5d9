use std::path::PathBuf;

use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

use vesta::{
    chandler::fill_missing_candles,
    prices::candles_to_prices,
    solver::{self, simulate},
    statistics::{analyse_benchmark, Statistics},
    storage::{Storage, StorageExt, SQLite},
    strategies::{FourWeekRuleParams, StrategyParams},
    time::{IntervalIntExt, TimestampStrExt, DAY_MS},
    trading::MissedCandlePolicy,
    ExchangeInfo,
};

// Scratch runner for a quick backtest over locally cached candles.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let exchange = "binance";
    let symbol = "eth-btc";
    let interval = DAY_MS;
    let start = "2021-01-01".to_timestamp();
    let end = "2021-07-01".to_timestamp();
    let quote = dec!(1.0);

    let storage = SQLite::new(data_dir())?;

    let shard = format!("{}_{}_{}", exchange, symbol, interval);
    let candles = storage.list_candles(&shard, start, end).await?;
    if candles.is_empty() {
        return Err(format!(
            "no cached {} {} {} candles; fetch them first",
            exchange,
            symbol,
            interval.to_interval_repr()
        )
        .into());
    }
    let exchange_info = storage
        .get_typed::<ExchangeInfo>(exchange, "exchange_info")
        .await?
        .ok_or("exchange info not cached")?
        .item;

    let fees = exchange_info.fees[symbol];
    let filters = exchange_info.filters[symbol];
    let borrow_info = exchange_info
        .borrow_info
        .get(symbol)
        .and_then(|by_asset| by_asset.get("eth"))
        .copied()
        .unwrap_or_default();

    let strategy_params = StrategyParams::FourWeekRule(FourWeekRuleParams::default());

    let base_prices = candles_to_prices(
        &fill_missing_candles(interval, start, end, &candles)?,
        None,
    );
    let benchmark = analyse_benchmark(&base_prices);

    let summary = simulate(&solver::Config {
        candles: &candles,
        fees: &fees,
        filters: &filters,
        borrow_info: &borrow_info,
        margin_multiplier: 2,
        symbol,
        interval,
        start,
        end,
        quote,
        strategy_params: &strategy_params,
        missed_candle_policy: MissedCandlePolicy::Ignore,
        stop_loss: dec!(0.13),
        trail_stop_loss: true,
        take_profit: dec!(0.0),
        long: true,
        short: false,
        base_fiat_prices: &base_prices,
        quote_fiat_prices: None,
        benchmark_g_returns: &benchmark.g_returns,
        stats_interval: DAY_MS,
    });

    let stats = Statistics::compose(&summary, &base_prices, None, &benchmark.g_returns, DAY_MS);
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn data_dir() -> PathBuf {
    std::env::var("VESTA_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            PathBuf::from(std::env::var("HOME").expect("home directory")).join(".vesta/data")
        })
}
