#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;

use vesta::{
    common::{BorrowInfo, Candle, ExchangeInfo, Fees, Trade},
    exchange::{self, Exchange, ExchangeStream},
    filters::Filters,
    time::{DAY_MS, SEC_MS},
};

pub fn candle(time: u64, close: Decimal) -> Candle {
    Candle {
        time,
        open: close,
        high: close,
        low: close,
        close,
        volume: dec!(1.0),
        closed: true,
    }
}

// One candle per time step, closes taken from the list.
pub fn candles_with_closes(interval: u64, closes: &[Decimal]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| candle(i as u64 * interval, close))
        .collect()
}

pub fn trade(time: u64, price: Decimal, size: Decimal) -> Trade {
    Trade { time, price, size }
}

pub fn exchange_info() -> ExchangeInfo {
    let mut fees = HashMap::new();
    fees.insert("__all__".to_owned(), Fees::default());

    let mut filters = HashMap::new();
    for symbol in ["eth-btc", "eth-usdt", "btc-usdt"] {
        filters.insert(
            symbol.to_owned(),
            Filters {
                isolated_margin: true,
                ..Filters::default()
            },
        );
    }

    let mut borrow_info = HashMap::new();
    let mut eth_btc_borrow = HashMap::new();
    eth_btc_borrow.insert(
        "eth".to_owned(),
        BorrowInfo {
            daily_interest_rate: dec!(0.0),
            limit: dec!(1.0),
        },
    );
    borrow_info.insert("eth-btc".to_owned(), eth_btc_borrow);

    ExchangeInfo {
        fees,
        filters,
        candle_intervals: vec![1, 2, SEC_MS, DAY_MS],
        borrow_info,
        margin_multiplier: 2,
    }
}

pub struct FakeExchange {
    exchange_info: ExchangeInfo,
    candles: Mutex<HashMap<(String, u64), Vec<Candle>>>,
    trades: Mutex<HashMap<String, Vec<Trade>>>,
    can_historical_candles: bool,
    // Fail the next historical candle fetch after sending this many candles.
    fail_after: Mutex<Option<usize>>,
}

impl FakeExchange {
    pub fn new() -> Self {
        Self {
            exchange_info: exchange_info(),
            candles: Mutex::new(HashMap::new()),
            trades: Mutex::new(HashMap::new()),
            can_historical_candles: true,
            fail_after: Mutex::new(None),
        }
    }

    pub fn with_exchange_info(mut self, exchange_info: ExchangeInfo) -> Self {
        self.exchange_info = exchange_info;
        self
    }

    pub fn with_candles(self, symbol: &str, interval: u64, candles: Vec<Candle>) -> Self {
        self.candles
            .lock()
            .unwrap()
            .insert((symbol.to_owned(), interval), candles);
        self
    }

    pub fn with_trades(self, symbol: &str, trades: Vec<Trade>) -> Self {
        self.trades.lock().unwrap().insert(symbol.to_owned(), trades);
        self
    }

    pub fn without_historical_candles(mut self) -> Self {
        self.can_historical_candles = false;
        self
    }

    pub fn with_fail_after(self, count: usize) -> Self {
        *self.fail_after.lock().unwrap() = Some(count);
        self
    }

    pub fn add_candles(&self, symbol: &str, interval: u64, mut candles: Vec<Candle>) {
        self.candles
            .lock()
            .unwrap()
            .entry((symbol.to_owned(), interval))
            .or_default()
            .append(&mut candles);
    }
}

impl Default for FakeExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Exchange for FakeExchange {
    fn name(&self) -> &str {
        "fake"
    }

    fn can_stream_historical_candles(&self) -> bool {
        self.can_historical_candles
    }

    async fn get_exchange_info(&self) -> exchange::Result<ExchangeInfo> {
        Ok(self.exchange_info.clone())
    }

    async fn stream_historical_candles(
        &self,
        symbol: &str,
        interval: u64,
        start: u64,
        end: u64,
    ) -> exchange::Result<ExchangeStream<Candle>> {
        let selected: Vec<Candle> = self
            .candles
            .lock()
            .unwrap()
            .get(&(symbol.to_owned(), interval))
            .map(|candles| {
                candles
                    .iter()
                    .filter(|candle| candle.time >= start && candle.time < end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let fail_after = self.fail_after.lock().unwrap().take();

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            for (i, candle) in selected.into_iter().enumerate() {
                if fail_after == Some(i) {
                    let _ = tx
                        .send(Err(exchange::Error::Exchange("connection reset".to_owned())))
                        .await;
                    return;
                }
                if tx.send(Ok(candle)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }

    async fn connect_stream_candles(
        &self,
        _symbol: &str,
        _interval: u64,
    ) -> exchange::Result<ExchangeStream<Candle>> {
        // No live candles; the stream ends immediately.
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn stream_historical_trades(
        &self,
        symbol: &str,
        start: u64,
        end: u64,
    ) -> exchange::Result<ExchangeStream<Trade>> {
        let selected: Vec<Trade> = self
            .trades
            .lock()
            .unwrap()
            .get(symbol)
            .map(|trades| {
                trades
                    .iter()
                    .filter(|trade| trade.time >= start && trade.time < end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            for trade in selected {
                if tx.send(Ok(trade)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

pub fn arc_exchange(exchange: FakeExchange) -> Arc<FakeExchange> {
    Arc::new(exchange)
}
