use std::{collections::HashMap, sync::Arc, time::Duration};

use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{
    common::Candle,
    exchange::{self, Exchange},
    informant::{self, Informant},
    math::floor_multiple,
    storage::{self, Storage},
    time::{strfspan, timestamp, IntervalIntExt, TimestampIntExt},
    trades::{self, Trades},
    utils::{generate_missing_spans, merge_adjacent_spans, RetriesWithReset},
};

pub type Result<T> = std::result::Result<T, Error>;
pub type CandleStream = mpsc::Receiver<Result<Candle>>;

const STORAGE_BATCH_SIZE: usize = 1000;
const MAX_FETCH_ATTEMPTS: u32 = 3;
const FETCH_ATTEMPT_RESET_MS: u64 = 300_000;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Storage(#[from] storage::Error),
    #[error("{0}")]
    Exchange(#[from] exchange::Error),
    #[error("{0}")]
    Trades(#[from] trades::Error),
    #[error("{0}")]
    Informant(#[from] informant::Error),
    #[error("exchange {0} not configured")]
    ExchangeNotFound(String),
    #[error("trades component not configured; unable to construct candles")]
    TradesNotConfigured,
    #[error("informant component not configured")]
    InformantNotConfigured,
    #[error("no candles available for {exchange} {symbol} {interval}")]
    NoCandlesAvailable {
        exchange: String,
        symbol: String,
        interval: String,
    },
    #[error(
        "missing candle(s) from the start of the period; cannot fill; start {start}, current \
         {current}"
    )]
    MissingStartCandles { start: String, current: String },
    #[error("missing candle(s) from the end of the period; cannot fill; current {current}, end {end}")]
    MissingEndCandles { current: String, end: String },
    #[error("candle stream cancelled")]
    Cancelled,
}

impl Error {
    pub fn retriable(&self) -> bool {
        match self {
            Error::Exchange(err) => err.retriable(),
            Error::Trades(err) => err.retriable(),
            _ => false,
        }
    }
}

// Serves a logically complete, time-ordered candle stream for
// (exchange, symbol, interval, [start, end)) by combining local storage with
// exchange streams. Every newly fetched closed candle is persisted exactly
// once; partial progress survives errors and cancellation because batches are
// flushed together with their spans.
#[derive(Clone)]
pub struct Chandler {
    storage: Arc<dyn Storage>,
    exchanges: HashMap<String, Arc<dyn Exchange>>,
    informant: Option<Informant>,
    trades: Option<Trades>,
    storage_batch_size: usize,
    exchange_candle_timeout: Option<u64>,
    get_time_ms: fn() -> u64,
}

impl Chandler {
    pub fn new(
        storage: Arc<dyn Storage>,
        exchanges: Vec<Arc<dyn Exchange>>,
        informant: Option<Informant>,
        trades: Option<Trades>,
    ) -> Self {
        Self {
            storage,
            exchanges: exchanges
                .into_iter()
                .map(|exchange| (exchange.name().to_owned(), exchange))
                .collect(),
            informant,
            trades,
            storage_batch_size: STORAGE_BATCH_SIZE,
            exchange_candle_timeout: None,
            get_time_ms: timestamp,
        }
    }

    pub fn with_storage_batch_size(mut self, storage_batch_size: usize) -> Self {
        assert!(storage_batch_size > 0);
        self.storage_batch_size = storage_batch_size;
        self
    }

    // Inactivity timeout for exchange candle streams; treated as a transient
    // error on expiry.
    pub fn with_exchange_candle_timeout(mut self, timeout: Option<u64>) -> Self {
        self.exchange_candle_timeout = timeout;
        self
    }

    pub fn with_clock(mut self, get_time_ms: fn() -> u64) -> Self {
        self.get_time_ms = get_time_ms;
        self
    }

    pub fn list_candle_intervals(&self, exchange: &str) -> Result<Vec<u64>> {
        let informant = self
            .informant
            .as_ref()
            .ok_or(Error::InformantNotConfigured)?;
        Ok(informant.list_candle_intervals(exchange, None)?)
    }

    pub async fn list_candles(
        &self,
        exchange: &str,
        symbol: &str,
        interval: u64,
        start: u64,
        end: u64,
    ) -> Result<Vec<Candle>> {
        let mut stream = self
            .stream_candles(exchange, symbol, interval, start, end, true, false)
            .await?;
        let mut candles = Vec::new();
        while let Some(candle) = stream.recv().await {
            candles.push(candle?);
        }
        Ok(candles)
    }

    pub async fn list_candles_fill_missing(
        &self,
        exchange: &str,
        symbol: &str,
        interval: u64,
        start: u64,
        end: u64,
    ) -> Result<Vec<Candle>> {
        let start = floor_multiple(start, interval);
        let end = floor_multiple(end, interval);
        let candles = self
            .list_candles(exchange, symbol, interval, start, end)
            .await?;
        fill_missing_candles(interval, start, end, &candles)
    }

    pub async fn map_symbol_interval_candles(
        &self,
        exchange: &str,
        symbols: &[String],
        intervals: &[u64],
        start: u64,
        end: u64,
    ) -> Result<HashMap<(String, u64), Vec<Candle>>> {
        let mut futures = Vec::with_capacity(symbols.len() * intervals.len());
        for symbol in symbols {
            for &interval in intervals {
                let this = self.clone();
                let exchange = exchange.to_owned();
                let symbol = symbol.clone();
                futures.push(async move {
                    let candles = this
                        .list_candles(
                            &exchange,
                            &symbol,
                            interval,
                            floor_multiple(start, interval),
                            floor_multiple(end, interval),
                        )
                        .await?;
                    Ok::<_, Error>(((symbol, interval), candles))
                });
            }
        }
        let results = futures::future::try_join_all(futures).await?;
        Ok(results.into_iter().collect())
    }

    pub async fn get_first_candle(
        &self,
        exchange: &str,
        symbol: &str,
        interval: u64,
    ) -> Result<Candle> {
        let exchange_instance = self.get_exchange(exchange)?;
        let current = floor_multiple((self.get_time_ms)(), interval);
        // Start zero asks the exchange for its earliest available data.
        let mut stream = exchange_instance
            .stream_historical_candles(symbol, interval, 0, current)
            .await?;
        match stream.recv().await {
            Some(candle) => Ok(candle?),
            None => Err(Error::NoCandlesAvailable {
                exchange: exchange.to_owned(),
                symbol: symbol.to_owned(),
                interval: interval.to_interval_repr(),
            }),
        }
    }

    pub async fn get_last_candle(
        &self,
        exchange: &str,
        symbol: &str,
        interval: u64,
    ) -> Result<Candle> {
        let exchange_instance = self.get_exchange(exchange)?;
        let current = floor_multiple((self.get_time_ms)(), interval);
        let mut stream = exchange_instance
            .stream_historical_candles(symbol, interval, current - interval, current)
            .await?;
        match stream.recv().await {
            Some(candle) => Ok(candle?),
            None => Err(Error::NoCandlesAvailable {
                exchange: exchange.to_owned(),
                symbol: symbol.to_owned(),
                interval: interval.to_interval_repr(),
            }),
        }
    }

    // Candles are yielded time-ordered with `time` aligned to the interval
    // and within `[start, end)`. With `closed`, only closed candles are
    // yielded. With `fill_missing_with_last`, gaps are filled with synthetic
    // candles repeating the last close with zero volume. Gaps at the start,
    // middle and end of the range produce warnings.
    pub async fn stream_candles(
        &self,
        exchange: &str,
        symbol: &str,
        interval: u64,
        start: u64,
        end: u64,
        closed: bool,
        fill_missing_with_last: bool,
    ) -> Result<CandleStream> {
        if !self.exchanges.contains_key(exchange) {
            return Err(Error::ExchangeNotFound(exchange.to_owned()));
        }
        let start = floor_multiple(start, interval);
        let end = floor_multiple(end, interval);

        let (tx, rx) = mpsc::channel(self.storage_batch_size);
        let this = self.clone();
        let exchange = exchange.to_owned();
        let symbol = symbol.to_owned();
        tokio::spawn(async move {
            if let Err(err) = this
                .stream_candles_inner(
                    &tx,
                    &exchange,
                    &symbol,
                    interval,
                    start,
                    end,
                    closed,
                    fill_missing_with_last,
                )
                .await
            {
                if !matches!(err, Error::Cancelled) {
                    let _ = tx.send(Err(err)).await;
                }
            }
        });
        Ok(rx)
    }

    fn get_exchange(&self, exchange: &str) -> Result<Arc<dyn Exchange>> {
        self.exchanges
            .get(exchange)
            .cloned()
            .ok_or_else(|| Error::ExchangeNotFound(exchange.to_owned()))
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_candles_inner(
        &self,
        tx: &mpsc::Sender<Result<Candle>>,
        exchange: &str,
        symbol: &str,
        interval: u64,
        start: u64,
        end: u64,
        closed: bool,
        fill_missing_with_last: bool,
    ) -> Result<()> {
        if start >= end {
            return Ok(());
        }

        let shard = candle_shard(exchange, symbol, interval);
        let candle_msg = format!("{} {} {} candle(s)", exchange, symbol, interval.to_interval_repr());

        info!("checking for existing {} in local storage", candle_msg);
        let existing_spans = self.storage.list_candle_spans(&shard, start, end).await?;
        let merged_existing_spans = merge_adjacent_spans(&existing_spans);
        let missing_spans = generate_missing_spans(start, end, &merged_existing_spans);

        let mut spans: Vec<(u64, u64, bool)> = merged_existing_spans
            .iter()
            .map(|&(a, b)| (a, b, true))
            .chain(missing_spans.iter().map(|&(a, b)| (a, b, false)))
            .collect();
        spans.sort_by_key(|&(span_start, _, _)| span_start);

        let mut emit = EmitState {
            start,
            end,
            interval,
            closed,
            fill_missing_with_last,
            candle_msg,
            last_closed_candle: None,
        };

        for (span_start, span_end, exist_locally) in spans {
            if exist_locally {
                info!(
                    "local {} exist between {}",
                    emit.candle_msg,
                    strfspan(span_start, span_end)
                );
                for candle in self.storage.list_candles(&shard, span_start, span_end).await? {
                    emit.process(tx, candle).await?;
                }
            } else {
                info!(
                    "missing {} between {}",
                    emit.candle_msg,
                    strfspan(span_start, span_end)
                );
                self.stream_and_store_exchange_candles(
                    tx, &mut emit, &shard, exchange, symbol, interval, span_start, span_end,
                )
                .await?;
            }
        }

        match emit.last_closed_candle {
            None => warn!(
                "missed all {} between {}",
                emit.candle_msg,
                strfspan(start, end)
            ),
            Some(last_closed_candle) => {
                let time_diff = end - last_closed_candle.time;
                if time_diff >= interval * 2 {
                    let num_missed = time_diff / interval - 1;
                    warn!(
                        "missed {} {} from the end {}",
                        num_missed,
                        emit.candle_msg,
                        end.to_timestamp_repr()
                    );
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_and_store_exchange_candles(
        &self,
        tx: &mpsc::Sender<Result<Candle>>,
        emit: &mut EmitState,
        shard: &str,
        exchange: &str,
        symbol: &str,
        interval: u64,
        span_start: u64,
        span_end: u64,
    ) -> Result<()> {
        let mut start = span_start;
        let mut retries = RetriesWithReset::new(MAX_FETCH_ATTEMPTS, FETCH_ATTEMPT_RESET_MS);
        loop {
            match self
                .stream_and_store_attempt(tx, emit, shard, exchange, symbol, interval, start, span_end)
                .await
            {
                Ok(()) => return Ok(()),
                Err((resume, err)) if err.retriable() && retries.again((self.get_time_ms)()) => {
                    warn!(
                        "{}; retrying {} fetch from {}",
                        err,
                        emit.candle_msg,
                        resume.to_timestamp_repr()
                    );
                    start = resume;
                }
                Err((_, err)) => return Err(err),
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_and_store_attempt(
        &self,
        tx: &mpsc::Sender<Result<Candle>>,
        emit: &mut EmitState,
        shard: &str,
        exchange: &str,
        symbol: &str,
        interval: u64,
        start: u64,
        end: u64,
    ) -> std::result::Result<(), (u64, Error)> {
        let current = floor_multiple((self.get_time_ms)(), interval);
        let mut batch: Vec<Candle> = Vec::with_capacity(self.storage_batch_size);
        let mut batch_start = start;

        let mut stream = self
            .exchange_candle_source(exchange, symbol, interval, start, end, current)
            .await
            .map_err(|err| (batch_start, err))?;

        loop {
            let item = match self.exchange_candle_timeout {
                Some(timeout) => {
                    match tokio::time::timeout(Duration::from_millis(timeout), stream.recv()).await
                    {
                        Ok(item) => item,
                        Err(_) => {
                            let _ = self.flush(shard, &mut batch, &mut batch_start, interval).await;
                            return Err((
                                batch_start,
                                Error::Exchange(exchange::Error::Exchange(
                                    "candle stream inactivity timeout".to_owned(),
                                )),
                            ));
                        }
                    }
                }
                None => stream.recv().await,
            };
            let Some(item) = item else { break };

            match item {
                Ok(candle) => {
                    if candle.closed {
                        batch.push(candle);
                        if batch.len() == self.storage_batch_size {
                            self.flush(shard, &mut batch, &mut batch_start, interval)
                                .await
                                .map_err(|err| (batch_start, err))?;
                        }
                    }
                    if let Err(err) = emit.process(tx, candle).await {
                        // Cancelled mid-stream; persist what we have.
                        let _ = self.flush(shard, &mut batch, &mut batch_start, interval).await;
                        return Err((batch_start, err));
                    }
                }
                Err(err) => {
                    let _ = self.flush(shard, &mut batch, &mut batch_start, interval).await;
                    return Err((batch_start, err));
                }
            }
        }

        // Graceful end. The stored span is extended through any trailing gap
        // so that a re-request does not refetch a period known to be empty.
        let current = floor_multiple((self.get_time_ms)(), interval);
        let batch_end = u64::min(current, end);
        if batch_end > batch_start {
            self.storage
                .store_candles_and_span(shard, &batch, batch_start, batch_end)
                .await
                .map_err(|err| (batch_start, err.into()))?;
        }
        Ok(())
    }

    async fn flush(
        &self,
        shard: &str,
        batch: &mut Vec<Candle>,
        batch_start: &mut u64,
        interval: u64,
    ) -> Result<()> {
        if let Some(last) = batch.last() {
            let batch_end = last.time + interval;
            self.storage
                .store_candles_and_span(shard, batch, *batch_start, batch_end)
                .await?;
            *batch_start = batch_end;
            batch.clear();
        }
        Ok(())
    }

    // Raw exchange candles for `[start, end)`: the historical portion from
    // native streams (or constructed from trades), the future portion from a
    // live stream until the range is exhausted.
    async fn exchange_candle_source(
        &self,
        exchange: &str,
        symbol: &str,
        interval: u64,
        start: u64,
        end: u64,
        current: u64,
    ) -> Result<CandleStream> {
        let exchange_instance = self.get_exchange(exchange)?;
        let interval_supported = match &self.informant {
            Some(informant) => informant
                .list_candle_intervals(exchange, None)?
                .contains(&interval),
            // Without the informant we assume support; the exchange will fail
            // if it is not.
            None => true,
        };

        let (tx, rx) = mpsc::channel(self.storage_batch_size);
        let this = self.clone();
        let exchange = exchange.to_owned();
        let symbol = symbol.to_owned();
        tokio::spawn(async move {
            let result = this
                .exchange_candle_source_inner(
                    &tx,
                    exchange_instance,
                    &exchange,
                    &symbol,
                    interval,
                    interval_supported,
                    start,
                    end,
                    current,
                )
                .await;
            if let Err(err) = result {
                if !matches!(err, Error::Cancelled) {
                    let _ = tx.send(Err(err)).await;
                }
            }
        });
        Ok(rx)
    }

    #[allow(clippy::too_many_arguments)]
    async fn exchange_candle_source_inner(
        &self,
        tx: &mpsc::Sender<Result<Candle>>,
        exchange_instance: Arc<dyn Exchange>,
        exchange: &str,
        symbol: &str,
        interval: u64,
        interval_supported: bool,
        start: u64,
        end: u64,
        current: u64,
    ) -> Result<()> {
        if start < current {
            let historical_end = u64::min(end, current);
            if exchange_instance.can_stream_historical_candles() && interval_supported {
                let mut stream = exchange_instance
                    .stream_historical_candles(symbol, interval, start, historical_end)
                    .await?;
                while let Some(item) = stream.recv().await {
                    let candle = item?;
                    tx.send(Ok(candle)).await.map_err(|_| Error::Cancelled)?;
                }
            } else {
                self.stream_construct_candles(tx, exchange, symbol, interval, start, historical_end)
                    .await?;
            }
        }
        if end > current {
            if exchange_instance.can_stream_candles() && interval_supported {
                let mut stream = exchange_instance
                    .connect_stream_candles(symbol, interval)
                    .await?;
                while let Some(item) = stream.recv().await {
                    let candle = item?;
                    if candle.time >= end {
                        break;
                    }
                    tx.send(Ok(candle)).await.map_err(|_| Error::Cancelled)?;
                    if candle.closed && candle.time == end - interval {
                        break;
                    }
                }
            } else {
                self.stream_construct_candles(tx, exchange, symbol, interval, current, end)
                    .await?;
            }
        }
        Ok(())
    }

    // Synthesizes candles from raw trades; used when the exchange cannot
    // serve candles at the requested interval.
    async fn stream_construct_candles(
        &self,
        tx: &mpsc::Sender<Result<Candle>>,
        exchange: &str,
        symbol: &str,
        interval: u64,
        start: u64,
        end: u64,
    ) -> Result<()> {
        let trades = self.trades.as_ref().ok_or(Error::TradesNotConfigured)?;

        info!(
            "constructing {} {} {} candles from trades",
            exchange,
            symbol,
            interval.to_interval_repr()
        );

        let mut current = start;
        let mut next = current + interval;
        let mut open = Decimal::ZERO;
        let mut high = Decimal::ZERO;
        let mut low = Decimal::MAX;
        let mut close = Decimal::ZERO;
        let mut volume = Decimal::ZERO;
        let mut is_first = true;

        let mut stream = trades.stream_trades(exchange, symbol, start, end).await?;
        while let Some(item) = stream.recv().await {
            let trade = item?;

            if trade.time >= next {
                assert!(!is_first);
                let candle = Candle {
                    time: current,
                    open,
                    high,
                    low,
                    close,
                    volume,
                    closed: true,
                };
                tx.send(Ok(candle)).await.map_err(|_| Error::Cancelled)?;
                current = next;
                next = current + interval;
                open = Decimal::ZERO;
                high = Decimal::ZERO;
                low = Decimal::MAX;
                close = Decimal::ZERO;
                volume = Decimal::ZERO;
                is_first = true;
            }

            if is_first {
                open = trade.price;
                is_first = false;
            }
            high = Decimal::max(high, trade.price);
            low = Decimal::min(low, trade.price);
            close = trade.price;
            volume += trade.size;
        }

        if !is_first {
            let candle = Candle {
                time: current,
                open,
                high,
                low,
                close,
                volume,
                closed: true,
            };
            tx.send(Ok(candle)).await.map_err(|_| Error::Cancelled)?;
        }
        Ok(())
    }
}

struct EmitState {
    start: u64,
    end: u64,
    interval: u64,
    closed: bool,
    fill_missing_with_last: bool,
    candle_msg: String,
    last_closed_candle: Option<Candle>,
}

impl EmitState {
    async fn process(&mut self, tx: &mpsc::Sender<Result<Candle>>, candle: Candle) -> Result<()> {
        if self.last_closed_candle.is_none() && candle.closed {
            let num_missed = (candle.time - self.start) / self.interval;
            if num_missed > 0 {
                warn!(
                    "missed {} {} from the start {}",
                    num_missed,
                    self.candle_msg,
                    self.start.to_timestamp_repr()
                );
            }
        }

        if let Some(last_closed_candle) = self.last_closed_candle {
            let time_diff = candle.time - last_closed_candle.time;
            if time_diff >= self.interval * 2 {
                let num_missed = time_diff / self.interval - 1;
                warn!(
                    "missed {} {}; last closed candle at {}, current candle at {}",
                    num_missed,
                    self.candle_msg,
                    last_closed_candle.time.to_timestamp_repr(),
                    candle.time.to_timestamp_repr()
                );
                if self.fill_missing_with_last {
                    info!(
                        "filling {} missed {} with last values",
                        num_missed, self.candle_msg
                    );
                    for i in 1..=num_missed {
                        let filler = Candle {
                            time: last_closed_candle.time + i * self.interval,
                            open: last_closed_candle.close,
                            high: last_closed_candle.close,
                            low: last_closed_candle.close,
                            close: last_closed_candle.close,
                            volume: Decimal::ZERO,
                            closed: true,
                        };
                        tx.send(Ok(filler)).await.map_err(|_| Error::Cancelled)?;
                    }
                }
            }
        }

        if !self.closed || candle.closed {
            tx.send(Ok(candle)).await.map_err(|_| Error::Cancelled)?;
        }
        if candle.closed {
            self.last_closed_candle = Some(candle);
        }
        Ok(())
    }
}

fn candle_shard(exchange: &str, symbol: &str, interval: u64) -> String {
    format!("{}_{}_{}", exchange, symbol, interval)
}

// Fills gaps by repeating the previous close with zero volume. Unlike
// `stream_candles` with `fill_missing_with_last`, a hole at either edge of
// the range is an error here because there is nothing to extrapolate from.
pub fn fill_missing_candles(
    interval: u64,
    start: u64,
    end: u64,
    candles: &[Candle],
) -> Result<Vec<Candle>> {
    let start = floor_multiple(start, interval);
    let end = floor_multiple(end, interval);
    let length = ((end - start) / interval) as usize;

    let mut candles_filled = Vec::with_capacity(length);
    let mut current = start;
    let mut prev_candle: Option<&Candle> = None;

    for candle in candles {
        let diff = (candle.time - current) / interval;
        for i in 1..=diff {
            match prev_candle {
                None => {
                    return Err(Error::MissingStartCandles {
                        start: start.to_timestamp_repr(),
                        current: candle.time.to_timestamp_repr(),
                    })
                }
                Some(c) => candles_filled.push(Candle {
                    time: c.time + i * interval,
                    open: c.close,
                    high: c.close,
                    low: c.close,
                    close: c.close,
                    volume: Decimal::ZERO,
                    closed: true,
                }),
            }
            current += interval;
        }

        candles_filled.push(*candle);
        current += interval;

        prev_candle = Some(candle);
    }

    if current != end {
        return Err(Error::MissingEndCandles {
            current: current.to_timestamp_repr(),
            end: end.to_timestamp_repr(),
        });
    }
    assert_eq!(candles_filled.len(), length);

    Ok(candles_filled)
}
