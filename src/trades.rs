use std::{collections::HashMap, sync::Arc};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{
    common::Trade,
    exchange::{self, Exchange},
    storage::{self, Storage},
    time::{strfspan, timestamp},
    utils::{generate_missing_spans, merge_adjacent_spans, RetriesWithReset},
};

pub type Result<T> = std::result::Result<T, Error>;
pub type TradeStream = mpsc::Receiver<Result<Trade>>;

const STORAGE_BATCH_SIZE: usize = 1000;
const MAX_FETCH_ATTEMPTS: u32 = 3;
const FETCH_ATTEMPT_RESET_MS: u64 = 300_000;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Storage(#[from] storage::Error),
    #[error("{0}")]
    Exchange(#[from] exchange::Error),
    #[error("exchange {0} not configured")]
    ExchangeNotFound(String),
    #[error("trade stream cancelled")]
    Cancelled,
}

impl Error {
    pub fn retriable(&self) -> bool {
        matches!(self, Error::Exchange(err) if err.retriable())
    }
}

// Gap-aware historical and live trade streaming with local caching. Serves
// locally stored spans and fills the gaps from the exchange, persisting
// fetched trades in batches together with their spans.
#[derive(Clone)]
pub struct Trades {
    storage: Arc<dyn Storage>,
    exchanges: HashMap<String, Arc<dyn Exchange>>,
    storage_batch_size: usize,
    get_time_ms: fn() -> u64,
}

impl Trades {
    pub fn new(storage: Arc<dyn Storage>, exchanges: Vec<Arc<dyn Exchange>>) -> Self {
        Self {
            storage,
            exchanges: exchanges
                .into_iter()
                .map(|exchange| (exchange.name().to_owned(), exchange))
                .collect(),
            storage_batch_size: STORAGE_BATCH_SIZE,
            get_time_ms: timestamp,
        }
    }

    pub fn with_storage_batch_size(mut self, storage_batch_size: usize) -> Self {
        assert!(storage_batch_size > 0);
        self.storage_batch_size = storage_batch_size;
        self
    }

    pub fn with_clock(mut self, get_time_ms: fn() -> u64) -> Self {
        self.get_time_ms = get_time_ms;
        self
    }

    pub async fn list_trades(
        &self,
        exchange: &str,
        symbol: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<Trade>> {
        let mut stream = self.stream_trades(exchange, symbol, start, end).await?;
        let mut trades = Vec::new();
        while let Some(trade) = stream.recv().await {
            trades.push(trade?);
        }
        Ok(trades)
    }

    pub async fn stream_trades(
        &self,
        exchange: &str,
        symbol: &str,
        start: u64,
        end: u64,
    ) -> Result<TradeStream> {
        if !self.exchanges.contains_key(exchange) {
            return Err(Error::ExchangeNotFound(exchange.to_owned()));
        }

        let (tx, rx) = mpsc::channel(self.storage_batch_size);
        let this = self.clone();
        let exchange = exchange.to_owned();
        let symbol = symbol.to_owned();
        tokio::spawn(async move {
            if let Err(err) = this
                .stream_trades_inner(&tx, &exchange, &symbol, start, end)
                .await
            {
                if !matches!(err, Error::Cancelled) {
                    let _ = tx.send(Err(err)).await;
                }
            }
        });
        Ok(rx)
    }

    async fn stream_trades_inner(
        &self,
        tx: &mpsc::Sender<Result<Trade>>,
        exchange: &str,
        symbol: &str,
        start: u64,
        end: u64,
    ) -> Result<()> {
        if start >= end {
            return Ok(());
        }

        let shard = format!("{}_{}", exchange, symbol);
        info!("checking for existing {} {} trades in local storage", exchange, symbol);
        let existing_spans = self.storage.list_trade_spans(&shard, start, end).await?;
        let merged_existing_spans = merge_adjacent_spans(&existing_spans);
        let missing_spans = generate_missing_spans(start, end, &merged_existing_spans);

        let mut spans: Vec<(u64, u64, bool)> = merged_existing_spans
            .iter()
            .map(|&(a, b)| (a, b, true))
            .chain(missing_spans.iter().map(|&(a, b)| (a, b, false)))
            .collect();
        spans.sort_by_key(|&(span_start, _, _)| span_start);

        for (span_start, span_end, exist_locally) in spans {
            if exist_locally {
                info!(
                    "local {} {} trades exist between {}",
                    exchange,
                    symbol,
                    strfspan(span_start, span_end)
                );
                for trade in self.storage.list_trades(&shard, span_start, span_end).await? {
                    tx.send(Ok(trade)).await.map_err(|_| Error::Cancelled)?;
                }
            } else {
                info!(
                    "missing {} {} trades between {}",
                    exchange,
                    symbol,
                    strfspan(span_start, span_end)
                );
                self.stream_and_store_exchange_trades(tx, &shard, exchange, symbol, span_start, span_end)
                    .await?;
            }
        }
        Ok(())
    }

    async fn stream_and_store_exchange_trades(
        &self,
        tx: &mpsc::Sender<Result<Trade>>,
        shard: &str,
        exchange: &str,
        symbol: &str,
        span_start: u64,
        span_end: u64,
    ) -> Result<()> {
        let mut start = span_start;
        let mut retries = RetriesWithReset::new(MAX_FETCH_ATTEMPTS, FETCH_ATTEMPT_RESET_MS);
        loop {
            match self
                .stream_and_store_attempt(tx, shard, exchange, symbol, start, span_end)
                .await
            {
                Ok(()) => return Ok(()),
                Err((resume, err)) if err.retriable() && retries.again((self.get_time_ms)()) => {
                    warn!("{}; retrying trade fetch from {}", err, resume);
                    start = resume;
                }
                Err((_, err)) => return Err(err),
            }
        }
    }

    async fn stream_and_store_attempt(
        &self,
        tx: &mpsc::Sender<Result<Trade>>,
        shard: &str,
        exchange: &str,
        symbol: &str,
        start: u64,
        end: u64,
    ) -> std::result::Result<(), (u64, Error)> {
        let exchange_instance = self.exchanges[exchange].clone();
        let current = (self.get_time_ms)();
        let mut batch: Vec<Trade> = Vec::with_capacity(self.storage_batch_size);
        let mut batch_start = start;

        if start < current {
            let historical_end = u64::min(end, current);
            let mut stream = exchange_instance
                .stream_historical_trades(symbol, start, historical_end)
                .await
                .map_err(|err| (batch_start, err.into()))?;
            while let Some(item) = stream.recv().await {
                self.handle_trade(tx, shard, item, &mut batch, &mut batch_start)
                    .await?;
            }
        }
        if end > current {
            let mut stream = exchange_instance
                .connect_stream_trades(symbol)
                .await
                .map_err(|err| (batch_start, err.into()))?;
            while let Some(item) = stream.recv().await {
                if let Ok(trade) = &item {
                    if trade.time >= end {
                        break;
                    }
                }
                self.handle_trade(tx, shard, item, &mut batch, &mut batch_start)
                    .await?;
            }
        }

        // Mark the trailing portion fetched even when no trades printed there.
        let batch_end = u64::min(end, (self.get_time_ms)());
        if batch_end > batch_start {
            self.storage
                .store_trades_and_span(shard, &batch, batch_start, batch_end)
                .await
                .map_err(|err| (batch_start, err.into()))?;
        }
        Ok(())
    }

    async fn handle_trade(
        &self,
        tx: &mpsc::Sender<Result<Trade>>,
        shard: &str,
        item: exchange::Result<Trade>,
        batch: &mut Vec<Trade>,
        batch_start: &mut u64,
    ) -> std::result::Result<(), (u64, Error)> {
        match item {
            Ok(trade) => {
                batch.push(trade);
                if batch.len() == self.storage_batch_size {
                    self.flush(shard, batch, batch_start)
                        .await
                        .map_err(|err| (*batch_start, err))?;
                }
                if tx.send(Ok(trade)).await.is_err() {
                    let _ = self.flush(shard, batch, batch_start).await;
                    return Err((*batch_start, Error::Cancelled));
                }
                Ok(())
            }
            Err(err) => {
                let _ = self.flush(shard, batch, batch_start).await;
                Err((*batch_start, err.into()))
            }
        }
    }

    async fn flush(
        &self,
        shard: &str,
        batch: &mut Vec<Trade>,
        batch_start: &mut u64,
    ) -> Result<()> {
        if let Some(last) = batch.last() {
            let batch_end = last.time + 1;
            self.storage
                .store_trades_and_span(shard, batch, *batch_start, batch_end)
                .await?;
            *batch_start = batch_end;
            batch.clear();
        }
        Ok(())
    }
}
