mod common;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::{candles_with_closes, FakeExchange};
use vesta::{
    chandler::{fill_missing_candles, Chandler},
    common::Fees,
    exchange::Exchange,
    indicators::MaKind,
    informant::Informant,
    optimizer::{Config, Optimizer},
    prices::{candles_to_prices, Prices},
    solver::{self, BasicSolver, FitnessValues, Solver},
    statistics::{analyse_benchmark, ExtendedStatistics},
    storage::{Memory, Storage},
    strategies::{DoubleMAParams, DoubleMAParamsContext, StrategyParams, StrategyParamsContext},
    time::DAY_MS,
    trading::{Basic, BasicConfig, MissedCandlePolicy, TradingMode},
};

fn zigzag_closes(length: usize) -> Vec<Decimal> {
    (0..length)
        .map(|i| Decimal::from(((i * 7) % 13 + 1) as u64))
        .collect()
}

fn fiat_closes(length: usize, base: i64, step: i64) -> Vec<Decimal> {
    (0..length)
        .map(|i| Decimal::from(base + i as i64 * step))
        .collect()
}

fn taker_fees() -> Fees {
    Fees {
        maker: dec!(0.001),
        taker: dec!(0.001),
    }
}

async fn build_components(
    exchange: Arc<FakeExchange>,
) -> (Arc<dyn Storage>, Informant, Chandler, Prices, Basic) {
    let storage: Arc<dyn Storage> = Arc::new(Memory::new());
    let exchange: Arc<dyn Exchange> = exchange;
    let informant = Informant::new(storage.clone(), vec![exchange.clone()])
        .await
        .unwrap();
    let chandler = Chandler::new(
        storage.clone(),
        vec![exchange],
        Some(informant.clone()),
        None,
    );
    let prices = Prices::new(chandler.clone());
    let trader = Basic::new(chandler.clone(), informant.clone());
    (storage, informant, chandler, prices, trader)
}

// The fast solver and the actual trader must agree on every fitness component
// to within 1e-6 given the same inputs.
#[tokio::test]
async fn test_solver_matches_trader() {
    let length = 30;
    let candles = candles_with_closes(DAY_MS, &zigzag_closes(length));
    let start = 0;
    let end = length as u64 * DAY_MS;

    let mut exchange_info = common::exchange_info();
    exchange_info.fees.insert("__all__".to_owned(), taker_fees());
    let exchange = Arc::new(
        FakeExchange::new()
            .with_exchange_info(exchange_info.clone())
            .with_candles("eth-btc", DAY_MS, candles.clone()),
    );
    let (_storage, _informant, _chandler, _prices, trader) =
        build_components(exchange.clone()).await;

    let strategy = StrategyParams::DoubleMA(DoubleMAParams {
        short_ma: MaKind::Sma,
        long_ma: MaKind::Sma,
        periods: (2, 5),
    });

    // Trader-side summary.
    let trading_config = BasicConfig {
        exchange: "fake".to_owned(),
        symbol: "eth-btc".to_owned(),
        interval: DAY_MS,
        start: Some(start),
        end,
        quote: dec!(10.0),
        strategy: strategy.clone(),
        stop_loss: dec!(0.1),
        trail_stop_loss: true,
        take_profit: dec!(0.5),
        mode: TradingMode::Backtest,
        channel: "default".to_owned(),
        missed_candle_policy: MissedCandlePolicy::Ignore,
        adjust_start: false,
        long: true,
        short: true,
        close_on_exit: true,
        exchange_candle_timeout: None,
    };
    let mut state = trader.initialize(trading_config).await.unwrap();
    let trader_summary = trader.run(&mut state).await.unwrap();

    // Solver-side summary over the same materialized inputs.
    let base_prices = candles_to_prices(
        &fill_missing_candles(DAY_MS, start, end, &candles).unwrap(),
        None,
    );
    let benchmark = analyse_benchmark(&base_prices);
    let fees = exchange_info.fees["__all__"];
    let filters = exchange_info.filters["eth-btc"];
    let borrow_info = exchange_info.borrow_info["eth-btc"]["eth"];

    let solver_config = solver::Config {
        candles: &candles,
        fees: &fees,
        filters: &filters,
        borrow_info: &borrow_info,
        margin_multiplier: exchange_info.margin_multiplier,
        symbol: "eth-btc",
        interval: DAY_MS,
        start,
        end,
        quote: dec!(10.0),
        strategy_params: &strategy,
        missed_candle_policy: MissedCandlePolicy::Ignore,
        stop_loss: dec!(0.1),
        trail_stop_loss: true,
        take_profit: dec!(0.5),
        long: true,
        short: true,
        base_fiat_prices: &base_prices,
        quote_fiat_prices: None,
        benchmark_g_returns: &benchmark.g_returns,
        stats_interval: DAY_MS,
    };

    let solver_summary = solver::simulate(&solver_config);
    let solver_fitness = BasicSolver.solve(&solver_config);

    // Both paths trade at least once on this data.
    assert!(trader_summary.num_positions() > 0);
    assert_eq!(
        serde_json::to_string(&solver_summary).unwrap(),
        serde_json::to_string(&trader_summary).unwrap()
    );

    let trader_fitness = FitnessValues::from_summary(
        &trader_summary,
        &ExtendedStatistics::compose(
            &trader_summary,
            &base_prices,
            None,
            &benchmark.g_returns,
            DAY_MS,
        ),
    );
    assert!(trader_fitness.isclose(&solver_fitness, 1e-6));
}

fn seeded_exchange(length: usize) -> Arc<FakeExchange> {
    let mut exchange_info = common::exchange_info();
    exchange_info.fees.insert("__all__".to_owned(), taker_fees());
    Arc::new(
        FakeExchange::new()
            .with_exchange_info(exchange_info)
            .with_candles("eth-btc", DAY_MS, candles_with_closes(DAY_MS, &zigzag_closes(length)))
            .with_candles(
                "eth-usdt",
                DAY_MS,
                candles_with_closes(DAY_MS, &fiat_closes(length, 100, 1)),
            )
            .with_candles(
                "btc-usdt",
                DAY_MS,
                candles_with_closes(DAY_MS, &fiat_closes(length, 10_000, 10)),
            ),
    )
}

fn optimizer_config(end: u64) -> Config {
    let mut config = Config::new("fake", dec!(10.0));
    config.symbols = Some(vec!["eth-btc".to_owned()]);
    config.intervals = Some(vec![DAY_MS]);
    config.start = Some(0);
    config.end = Some(end);
    config.strategy = StrategyParamsContext::DoubleMA(DoubleMAParamsContext::default());
    config.population_size = 6;
    config.max_generations = 2;
    config.seed = Some(1);
    config
}

// End to end: evolve a small population, rebuild the winner through the
// trader and cross-check the fitness tuples.
#[tokio::test]
async fn test_optimizer_validates_winner_against_trader() {
    let length = 30;
    let exchange = seeded_exchange(length);
    let (_storage, informant, chandler, prices, trader) = build_components(exchange).await;
    let optimizer = Optimizer::new(
        Arc::new(BasicSolver),
        chandler,
        informant,
        prices,
        trader,
    );

    let summary = optimizer
        .run(optimizer_config(length as u64 * DAY_MS), None)
        .await
        .unwrap();

    assert_eq!(summary.seed, 1);
    assert_eq!(summary.generations, 2);
    assert_eq!(summary.trading_config.symbol, "eth-btc");
    assert_eq!(summary.trading_config.interval, DAY_MS);
    assert!(summary.individual.fitness.is_some());
}

// Deterministic for a fixed seed.
#[tokio::test]
async fn test_optimizer_is_deterministic_for_seed() {
    let length = 30;
    let mut results = Vec::new();
    for _ in 0..2 {
        let exchange = seeded_exchange(length);
        let (_storage, informant, chandler, prices, trader) = build_components(exchange).await;
        let optimizer = Optimizer::new(
            Arc::new(BasicSolver),
            chandler,
            informant,
            prices,
            trader,
        );
        let summary = optimizer
            .run(optimizer_config(length as u64 * DAY_MS), None)
            .await
            .unwrap();
        results.push(serde_json::to_string(&summary.individual).unwrap());
    }
    assert_eq!(results[0], results[1]);
}

// Cancellation is observed between generations and still produces a validated
// summary from the work done so far.
#[tokio::test]
async fn test_optimizer_cancellation_finalizes_summary() {
    let length = 30;
    let exchange = seeded_exchange(length);
    let (_storage, informant, chandler, prices, trader) = build_components(exchange).await;
    let optimizer = Optimizer::new(
        Arc::new(BasicSolver),
        chandler,
        informant,
        prices,
        trader,
    );

    let cancellation = Arc::new(AtomicBool::new(true));
    cancellation.store(true, Ordering::Relaxed);

    let summary = optimizer
        .run(
            optimizer_config(length as u64 * DAY_MS),
            Some(cancellation),
        )
        .await
        .unwrap();

    assert_eq!(summary.generations, 0);
    assert!(summary.individual.fitness.is_some());
}
