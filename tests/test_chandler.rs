mod common;

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::{candle, trade, FakeExchange};
use vesta::{
    chandler::Chandler,
    common::Candle,
    exchange::Exchange,
    storage::{Memory, Storage},
    trades::Trades,
};

fn ten_candles() -> Vec<Candle> {
    (0..10).map(|i| candle(i, Decimal::from(i + 1))).collect()
}

async fn collect(
    chandler: &Chandler,
    symbol: &str,
    interval: u64,
    start: u64,
    end: u64,
    closed: bool,
    fill_missing_with_last: bool,
) -> Vec<Candle> {
    let mut stream = chandler
        .stream_candles("fake", symbol, interval, start, end, closed, fill_missing_with_last)
        .await
        .unwrap();
    let mut candles = Vec::new();
    while let Some(candle) = stream.recv().await {
        candles.push(candle.unwrap());
    }
    candles
}

#[tokio::test]
async fn test_stream_fetches_and_stores_missing_candles() {
    let storage = Arc::new(Memory::new());
    let exchange: Arc<dyn Exchange> =
        Arc::new(FakeExchange::new().with_candles("eth-btc", 1, ten_candles()));
    let chandler = Chandler::new(storage.clone(), vec![exchange], None, None);

    let candles = collect(&chandler, "eth-btc", 1, 0, 10, true, false).await;

    assert_eq!(candles, ten_candles());
    assert_eq!(
        storage.list_candle_spans("fake_eth-btc_1", 0, 10).await.unwrap(),
        vec![(0, 10)]
    );
    assert_eq!(
        storage.list_candles("fake_eth-btc_1", 0, 10).await.unwrap(),
        ten_candles()
    );
    assert_eq!(storage.store_count(), 1);
}

#[tokio::test]
async fn test_stream_over_cached_range_is_idempotent() {
    let storage = Arc::new(Memory::new());
    let exchange: Arc<dyn Exchange> =
        Arc::new(FakeExchange::new().with_candles("eth-btc", 1, ten_candles()));
    let chandler = Chandler::new(storage.clone(), vec![exchange], None, None);

    let first = collect(&chandler, "eth-btc", 1, 0, 10, true, false).await;
    let second = collect(&chandler, "eth-btc", 1, 0, 10, true, false).await;

    assert_eq!(first, second);
    // The second pass is served from storage without any new writes.
    assert_eq!(storage.store_count(), 1);
}

#[tokio::test]
async fn test_stream_combines_local_and_fetched_spans() {
    let storage = Arc::new(Memory::new());
    storage
        .store_candles_and_span("fake_eth-btc_1", &ten_candles()[0..3], 0, 3)
        .await
        .unwrap();
    let exchange: Arc<dyn Exchange> =
        Arc::new(FakeExchange::new().with_candles("eth-btc", 1, ten_candles()));
    let chandler = Chandler::new(storage.clone(), vec![exchange], None, None);

    let candles = collect(&chandler, "eth-btc", 1, 0, 10, true, false).await;

    assert_eq!(candles, ten_candles());
    assert_eq!(
        storage.list_candle_spans("fake_eth-btc_1", 0, 10).await.unwrap(),
        vec![(0, 3), (3, 10)]
    );
}

#[tokio::test]
async fn test_empty_range_yields_nothing_and_writes_nothing() {
    let storage = Arc::new(Memory::new());
    let exchange: Arc<dyn Exchange> =
        Arc::new(FakeExchange::new().with_candles("eth-btc", 1, ten_candles()));
    let chandler = Chandler::new(storage.clone(), vec![exchange], None, None);

    let candles = collect(&chandler, "eth-btc", 1, 5, 5, true, false).await;

    assert!(candles.is_empty());
    assert_eq!(storage.store_count(), 0);
}

#[tokio::test]
async fn test_fill_missing_with_last_synthesizes_gap_candles() {
    let storage = Arc::new(Memory::new());
    let exchange: Arc<dyn Exchange> = Arc::new(FakeExchange::new().with_candles(
        "eth-btc",
        1,
        vec![
            candle(0, dec!(1.0)),
            candle(1, dec!(2.0)),
            candle(3, dec!(4.0)),
        ],
    ));
    let chandler = Chandler::new(storage.clone(), vec![exchange], None, None);

    let candles = collect(&chandler, "eth-btc", 1, 0, 4, true, true).await;

    assert_eq!(candles.len(), 4);
    assert_eq!(candles[2].time, 2);
    assert_eq!(candles[2].close, dec!(2.0));
    assert_eq!(candles[2].volume, dec!(0.0));
    assert!(candles[2].closed);
    // The synthetic filler is not persisted; only what the exchange returned.
    assert_eq!(
        storage.list_candles("fake_eth-btc_1", 0, 4).await.unwrap().len(),
        3
    );
    assert_eq!(
        storage.list_candle_spans("fake_eth-btc_1", 0, 4).await.unwrap(),
        vec![(0, 4)]
    );
}

#[tokio::test]
async fn test_transient_exchange_error_resumes_from_flushed_batch() {
    let storage = Arc::new(Memory::new());
    let exchange: Arc<dyn Exchange> = Arc::new(
        FakeExchange::new()
            .with_candles("eth-btc", 1, (0..6).map(|i| candle(i, Decimal::from(i + 1))).collect())
            .with_fail_after(3),
    );
    let chandler =
        Chandler::new(storage.clone(), vec![exchange], None, None).with_storage_batch_size(2);

    let candles = collect(&chandler, "eth-btc", 1, 0, 6, true, false).await;

    let times: Vec<u64> = candles.iter().map(|candle| candle.time).collect();
    assert_eq!(times, vec![0, 1, 2, 3, 4, 5]);
    // Partial progress was flushed before retrying; the span set still covers
    // the full range exactly once.
    let spans = storage.list_candle_spans("fake_eth-btc_1", 0, 6).await.unwrap();
    assert_eq!(spans.iter().map(|&(a, b)| b - a).sum::<u64>(), 6);
    assert_eq!(
        storage.list_candles("fake_eth-btc_1", 0, 6).await.unwrap().len(),
        6
    );
}

#[tokio::test]
async fn test_constructs_candles_from_trades() {
    let storage = Arc::new(Memory::new());
    let fake = FakeExchange::new()
        .without_historical_candles()
        .with_trades(
            "eth-btc",
            vec![
                trade(0, dec!(1.0), dec!(1.0)),
                trade(1, dec!(2.0), dec!(1.0)),
                trade(2, dec!(3.0), dec!(1.0)),
                trade(3, dec!(4.0), dec!(1.0)),
                trade(4, dec!(5.0), dec!(1.0)),
                trade(5, dec!(6.0), dec!(1.0)),
            ],
        );
    let exchange: Arc<dyn Exchange> = Arc::new(fake);
    let trades = Trades::new(storage.clone(), vec![exchange.clone()]);
    let chandler = Chandler::new(storage.clone(), vec![exchange], None, Some(trades));

    let candles = collect(&chandler, "eth-btc", 2, 0, 6, true, false).await;

    assert_eq!(
        candles,
        vec![
            Candle {
                time: 0,
                open: dec!(1.0),
                high: dec!(2.0),
                low: dec!(1.0),
                close: dec!(2.0),
                volume: dec!(2.0),
                closed: true,
            },
            Candle {
                time: 2,
                open: dec!(3.0),
                high: dec!(4.0),
                low: dec!(3.0),
                close: dec!(4.0),
                volume: dec!(2.0),
                closed: true,
            },
            Candle {
                time: 4,
                open: dec!(5.0),
                high: dec!(6.0),
                low: dec!(5.0),
                close: dec!(6.0),
                volume: dec!(2.0),
                closed: true,
            },
        ]
    );
    // Both the constructed candles and the raw trades are cached.
    assert_eq!(
        storage.list_candle_spans("fake_eth-btc_2", 0, 6).await.unwrap(),
        vec![(0, 6)]
    );
    assert_eq!(storage.list_trades("fake_eth-btc", 0, 6).await.unwrap().len(), 6);
}

// Requesting earlier than the exchange has history: the stream starts at the
// earliest available candle and the whole requested range is marked fetched.
#[tokio::test]
async fn test_start_earlier_than_exchange_history() {
    let storage = Arc::new(Memory::new());
    let exchange: Arc<dyn Exchange> = Arc::new(FakeExchange::new().with_candles(
        "eth-btc",
        1,
        (5..10).map(|i| candle(i, Decimal::from(i))).collect(),
    ));
    let chandler = Chandler::new(storage.clone(), vec![exchange], None, None);

    let candles = collect(&chandler, "eth-btc", 1, 0, 10, true, false).await;

    let times: Vec<u64> = candles.iter().map(|candle| candle.time).collect();
    assert_eq!(times, vec![5, 6, 7, 8, 9]);
    assert_eq!(
        storage.list_candle_spans("fake_eth-btc_1", 0, 10).await.unwrap(),
        vec![(0, 10)]
    );

    // A second pass is served entirely from storage.
    let again = collect(&chandler, "eth-btc", 1, 0, 10, true, false).await;
    assert_eq!(candles, again);
    assert_eq!(storage.store_count(), 1);
}

#[tokio::test]
async fn test_candle_times_are_ordered_and_aligned() {
    let storage = Arc::new(Memory::new());
    let exchange: Arc<dyn Exchange> = Arc::new(FakeExchange::new().with_candles(
        "eth-btc",
        2,
        vec![candle(0, dec!(1.0)), candle(2, dec!(2.0)), candle(4, dec!(3.0))],
    ));
    let chandler = Chandler::new(storage, vec![exchange], None, None);

    // Unaligned boundaries are floored to the interval.
    let candles = collect(&chandler, "eth-btc", 2, 1, 5, true, false).await;

    let times: Vec<u64> = candles.iter().map(|candle| candle.time).collect();
    assert_eq!(times, vec![0, 2]);
    for window in times.windows(2) {
        assert!(window[0] < window[1]);
    }
    for time in times {
        assert_eq!(time % 2, 0);
    }
}
