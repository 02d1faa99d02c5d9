mod common;

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::{candle, candles_with_closes, FakeExchange};
use vesta::{
    chandler::Chandler,
    common::{Advice, Candle},
    events::TradingEvent,
    exchange::Exchange,
    informant::Informant,
    storage::{Memory, Storage},
    strategies::{AnySignal, FixedParams, StrategyParams},
    time::SEC_MS,
    trading::{
        Basic, BasicConfig, BasicState, CloseReason, MissedCandlePolicy, Position, TradingMode,
    },
};

// Second-based cadence so that the serialized state round-trips exactly.
const INTERVAL: u64 = SEC_MS;

fn t(index: u64) -> u64 {
    index * INTERVAL
}

async fn build_trader(exchange: Arc<FakeExchange>) -> Basic {
    let storage: Arc<dyn Storage> = Arc::new(Memory::new());
    let exchange: Arc<dyn Exchange> = exchange;
    let informant = Informant::new(storage.clone(), vec![exchange.clone()])
        .await
        .unwrap();
    let chandler = Chandler::new(storage, vec![exchange], Some(informant.clone()), None);
    Basic::new(chandler, informant)
}

fn config(advices: Vec<Advice>, end: u64) -> BasicConfig {
    BasicConfig {
        exchange: "fake".to_owned(),
        symbol: "eth-btc".to_owned(),
        interval: INTERVAL,
        start: Some(0),
        end,
        quote: dec!(10.0),
        strategy: StrategyParams::Fixed(FixedParams {
            advices,
            maturity: 1,
        }),
        stop_loss: dec!(0.0),
        trail_stop_loss: false,
        take_profit: dec!(0.0),
        mode: TradingMode::Backtest,
        channel: "default".to_owned(),
        missed_candle_policy: MissedCandlePolicy::Ignore,
        adjust_start: false,
        long: true,
        short: false,
        close_on_exit: true,
        exchange_candle_timeout: None,
    }
}

// Candles at t=0..3 with closes [10, 20, 18, 10]; the strategy advises LONG
// throughout and LIQUIDATE at t=3. The trailing stop loss sells at t=2.
#[tokio::test]
async fn test_upside_trailing_stop_loss_triggers_sell() {
    let closes = [dec!(10.0), dec!(20.0), dec!(18.0), dec!(10.0)];
    let exchange = Arc::new(
        FakeExchange::new().with_candles("eth-btc", INTERVAL, candles_with_closes(INTERVAL, &closes)),
    );
    let trader = build_trader(exchange).await;

    let mut config = config(
        vec![Advice::Long, Advice::Long, Advice::Long, Advice::Liquidate],
        t(4),
    );
    config.stop_loss = dec!(0.1);
    config.trail_stop_loss = true;

    let mut state = trader.initialize(config).await.unwrap();
    let summary = trader.run(&mut state).await.unwrap();

    assert_eq!(summary.num_positions(), 1);
    assert_eq!(summary.num_positions_in_profit(), 1);
    let positions = summary.positions();
    let Position::Long(position) = &positions[0] else {
        panic!("expected a long position");
    };
    assert_eq!(position.open_time, t(1));
    assert_eq!(position.open_fills[0].size, dec!(1.0));
    assert_eq!(position.close_time, t(3));
    assert_eq!(position.close_reason, CloseReason::StopLoss);
    assert_eq!(position.profit(), dec!(8.0));
}

// Closes [10, 5, 6, 10] with a short position; the trailing stop loss buys
// back at t=2 for a profit of 4.
#[tokio::test]
async fn test_downside_trailing_stop_loss_on_short() {
    let closes = [dec!(10.0), dec!(5.0), dec!(6.0), dec!(10.0)];
    let exchange = Arc::new(
        FakeExchange::new().with_candles("eth-btc", INTERVAL, candles_with_closes(INTERVAL, &closes)),
    );
    let trader = build_trader(exchange).await;

    let mut config = config(
        vec![Advice::Short, Advice::Short, Advice::Short, Advice::Liquidate],
        t(4),
    );
    config.long = false;
    config.short = true;
    config.stop_loss = dec!(0.1);
    config.trail_stop_loss = true;

    let mut state = trader.initialize(config).await.unwrap();
    let summary = trader.run(&mut state).await.unwrap();

    assert_eq!(summary.num_positions(), 1);
    let positions = summary.positions();
    let Position::Short(position) = &positions[0] else {
        panic!("expected a short position");
    };
    assert_eq!(position.open_time, t(1));
    assert_eq!(position.borrowed, dec!(1.0));
    assert_eq!(position.close_time, t(3));
    assert_eq!(position.close_reason, CloseReason::StopLoss);
    assert_eq!(position.profit(), dec!(4.0));
}

// Closes [10, 12, 20, 10]; the take profit sells at t=2 for a profit of 10.
#[tokio::test]
async fn test_take_profit_on_long() {
    let closes = [dec!(10.0), dec!(12.0), dec!(20.0), dec!(10.0)];
    let exchange = Arc::new(
        FakeExchange::new().with_candles("eth-btc", INTERVAL, candles_with_closes(INTERVAL, &closes)),
    );
    let trader = build_trader(exchange).await;

    let mut config = config(
        vec![Advice::Long, Advice::Long, Advice::Long, Advice::Liquidate],
        t(4),
    );
    config.take_profit = dec!(0.5);

    let mut state = trader.initialize(config).await.unwrap();
    let summary = trader.run(&mut state).await.unwrap();

    assert_eq!(summary.num_positions(), 1);
    let positions = summary.positions();
    let Position::Long(position) = &positions[0] else {
        panic!("expected a long position");
    };
    assert_eq!(position.close_time, t(3));
    assert_eq!(position.close_reason, CloseReason::TakeProfit);
    assert_eq!(position.profit(), dec!(10.0));
}

// Candles at t in {0, 1, 4} with policy LAST: the strategy receives five
// updates for times 0..4, with candles 2 and 3 synthesized from the previous
// close with zero volume.
#[tokio::test]
async fn test_missed_candle_policy_last_fills_gap() {
    let candles = vec![
        candle(t(0), dec!(1.0)),
        candle(t(1), dec!(2.0)),
        candle(t(4), dec!(5.0)),
    ];
    let exchange = Arc::new(FakeExchange::new().with_candles("eth-btc", INTERVAL, candles));
    let trader = build_trader(exchange).await;
    let mut events = trader.events().subscribe("default");

    let mut config = config(
        vec![
            Advice::None,
            Advice::None,
            Advice::None,
            Advice::None,
            Advice::Long,
        ],
        t(5),
    );
    config.missed_candle_policy = MissedCandlePolicy::Last;

    let mut state = trader.initialize(config).await.unwrap();
    trader.run(&mut state).await.unwrap();

    let AnySignal::Fixed(strategy) = &state.strategy else {
        panic!("expected the fixed strategy");
    };
    assert_eq!(strategy.updates(), 5);

    let mut seen: Vec<Candle> = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let TradingEvent::Candle(candle) = event {
            seen.push(candle);
        }
    }
    let times: Vec<u64> = seen.iter().map(|candle| candle.time).collect();
    assert_eq!(times, vec![t(0), t(1), t(2), t(3), t(4)]);
    for filler in &seen[2..4] {
        assert_eq!(filler.close, dec!(2.0));
        assert_eq!(filler.volume, dec!(0.0));
    }

    // The position opened on the final candle.
    let positions = state.summary.positions();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].open_time(), t(5));
}

// Candles at t in {0, 1, 3, 4, 5} with policy RESTART: the strategy used for
// t in {0, 1} is discarded and a fresh one sees only t in {3, 4, 5}.
#[tokio::test]
async fn test_missed_candle_policy_restart_reconstructs_strategy() {
    let candles = vec![
        candle(t(0), dec!(1.0)),
        candle(t(1), dec!(2.0)),
        candle(t(3), dec!(3.0)),
        candle(t(4), dec!(4.0)),
        candle(t(5), dec!(5.0)),
    ];
    let exchange = Arc::new(FakeExchange::new().with_candles("eth-btc", INTERVAL, candles));
    let trader = build_trader(exchange).await;

    // Advises on the third update; with the restart this happens at t=5.
    let mut config = config(
        vec![
            Advice::None,
            Advice::None,
            Advice::Long,
            Advice::Long,
            Advice::Long,
        ],
        t(6),
    );
    config.missed_candle_policy = MissedCandlePolicy::Restart;

    let mut state = trader.initialize(config).await.unwrap();
    trader.run(&mut state).await.unwrap();

    let AnySignal::Fixed(strategy) = &state.strategy else {
        panic!("expected the fixed strategy");
    };
    // The fresh strategy saw only the three candles after the gap.
    assert_eq!(strategy.updates(), 3);

    let positions = state.summary.positions();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].open_time(), t(6));
}

fn clock_run1() -> u64 {
    5 * SEC_MS
}
fn clock_run2() -> u64 {
    7 * SEC_MS
}

// Run over candles up to t=4, persist, feed candle t=5, resume. The strategy
// sees exactly times 0..5 with no duplicates and no skips.
#[tokio::test]
async fn test_persist_and_resume() {
    let closes: Vec<Decimal> = (1..=5).map(Decimal::from).collect();
    let exchange = Arc::new(
        FakeExchange::new().with_candles("eth-btc", INTERVAL, candles_with_closes(INTERVAL, &closes)),
    );
    let storage: Arc<dyn Storage> = Arc::new(Memory::new());
    let exchange_dyn: Arc<dyn Exchange> = exchange.clone();
    let informant = Informant::new(storage.clone(), vec![exchange_dyn.clone()])
        .await
        .unwrap();

    let mut config = config(
        vec![
            Advice::None,
            Advice::None,
            Advice::None,
            Advice::None,
            Advice::None,
            Advice::Long,
        ],
        t(6),
    );
    config.close_on_exit = false;

    let chandler1 = Chandler::new(
        storage.clone(),
        vec![exchange_dyn.clone()],
        Some(informant.clone()),
        None,
    )
    .with_clock(clock_run1);
    let trader1 = Basic::new(chandler1, informant.clone()).with_clock(clock_run1);

    let mut state = trader1.initialize(config).await.unwrap();
    trader1.run(&mut state).await.unwrap();
    assert_eq!(state.next, t(5));

    let persisted = serde_json::to_string(&state).unwrap();

    // A new candle prints while the trader is suspended.
    exchange.add_candles("eth-btc", INTERVAL, vec![candle(t(5), dec!(6.0))]);

    let mut state: BasicState = serde_json::from_str(&persisted).unwrap();
    let chandler2 = Chandler::new(
        storage,
        vec![exchange_dyn],
        Some(informant.clone()),
        None,
    )
    .with_clock(clock_run2);
    let trader2 = Basic::new(chandler2, informant).with_clock(clock_run2);

    trader2.run(&mut state).await.unwrap();

    let AnySignal::Fixed(strategy) = &state.strategy else {
        panic!("expected the fixed strategy");
    };
    assert_eq!(strategy.updates(), 6);
    assert_eq!(state.next, t(6));
    // The sixth advice opened a position right at the end.
    assert!(state.open_position.is_some());
    assert_eq!(state.summary.end(), t(6));
}

// Identical candles, fees, filters and config produce an identical summary.
#[tokio::test]
async fn test_backtest_is_deterministic() {
    let closes = [dec!(10.0), dec!(20.0), dec!(18.0), dec!(10.0)];
    let mut summaries = Vec::new();
    for _ in 0..2 {
        let exchange = Arc::new(
            FakeExchange::new()
                .with_candles("eth-btc", INTERVAL, candles_with_closes(INTERVAL, &closes)),
        );
        let trader = build_trader(exchange).await;
        let mut config = config(
            vec![Advice::Long, Advice::Long, Advice::Long, Advice::Liquidate],
            t(4),
        );
        config.stop_loss = dec!(0.1);
        config.trail_stop_loss = true;
        let mut state = trader.initialize(config).await.unwrap();
        let summary = trader.run(&mut state).await.unwrap();
        summaries.push(serde_json::to_string(&summary).unwrap());
    }
    assert_eq!(summaries[0], summaries[1]);
}
