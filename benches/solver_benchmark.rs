use criterion::{criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use vesta::{
    common::{BorrowInfo, Candle, Fees},
    filters::Filters,
    solver::{self, simulate},
    strategies::{FourWeekRuleParams, StrategyParams},
    time::{DAY_MS, MIN_MS},
    trading::MissedCandlePolicy,
};

fn solver_benchmark(c: &mut Criterion) {
    let num_candles = 43_200; // 30 days of minute candles.
    let candles: Vec<Candle> = (0..num_candles)
        .map(|i| {
            let close = Decimal::from(i % 100 + 1);
            Candle {
                time: i as u64 * MIN_MS,
                open: close,
                high: close,
                low: close,
                close,
                volume: dec!(1.0),
                closed: true,
            }
        })
        .collect();
    let fees = Fees {
        maker: dec!(0.001),
        taker: dec!(0.001),
    };
    let filters = Filters::default();
    let borrow_info = BorrowInfo {
        daily_interest_rate: dec!(0.001),
        limit: dec!(1.0),
    };
    let strategy_params = StrategyParams::FourWeekRule(FourWeekRuleParams::default());
    let end = num_candles as u64 * MIN_MS;
    let stats_days = (end / DAY_MS) as usize;
    let base_fiat_prices = vec![1.0; stats_days + 1];
    let benchmark_g_returns = vec![0.0; stats_days];

    c.bench_function("simulate", |b| {
        b.iter(|| {
            simulate(&solver::Config {
                candles: &candles,
                fees: &fees,
                filters: &filters,
                borrow_info: &borrow_info,
                margin_multiplier: 2,
                symbol: "eth-btc",
                interval: MIN_MS,
                start: 0,
                end,
                quote: dec!(1.0),
                strategy_params: &strategy_params,
                missed_candle_policy: MissedCandlePolicy::Ignore,
                stop_loss: dec!(0.13),
                trail_stop_loss: true,
                take_profit: dec!(0.0),
                long: true,
                short: true,
                base_fiat_prices: &base_fiat_prices,
                quote_fiat_prices: None,
                benchmark_g_returns: &benchmark_g_returns,
                stats_interval: DAY_MS,
            })
        })
    });
}

criterion_group!(benches, solver_benchmark);
criterion_main!(benches);
