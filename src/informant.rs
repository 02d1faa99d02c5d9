use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::Duration,
};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::{
    common::{BorrowInfo, ExchangeInfo, Fees, Ticker},
    exchange::{self, Exchange},
    filters::Filters,
    storage::{self, Storage, StorageExt},
    time::{timestamp, DAY_MS, HOUR_MS},
};

pub type Result<T> = std::result::Result<T, Error>;

const SYNC_PERIOD_MS: u64 = 6 * HOUR_MS;
const STALENESS_MS: u64 = DAY_MS;

const EXCHANGE_INFO_KEY: &str = "exchange_info";
const TICKERS_KEY: &str = "map_ticker";

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Storage(#[from] storage::Error),
    #[error("{0}")]
    Exchange(#[from] exchange::Error),
    #[error("exchange {0} not configured")]
    ExchangeNotFound(String),
    #[error("exchange {exchange} does not support symbol {symbol}")]
    SymbolNotFound { exchange: String, symbol: String },
    #[error("no borrow info for asset {asset} of {symbol} on {exchange}")]
    BorrowInfoNotFound {
        exchange: String,
        symbol: String,
        asset: String,
    },
}

struct Inner {
    storage: Arc<dyn Storage>,
    exchanges: HashMap<String, Arc<dyn Exchange>>,
    exchange_info: RwLock<HashMap<String, ExchangeInfo>>,
    tickers: RwLock<HashMap<String, HashMap<String, Ticker>>>,
    get_time_ms: fn() -> u64,
}

// Periodically refreshed exchange metadata: fees, filters, supported candle
// intervals, borrow info, tickers. The last-known copy lives in storage with
// a freshness timestamp; entries older than a day are refetched. Lookups are
// synchronous against the in-memory copy. Construction completes only after
// the initial sync.
#[derive(Clone)]
pub struct Informant {
    inner: Arc<Inner>,
    _sync_task: Arc<TaskGuard>,
}

struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Informant {
    pub async fn new(storage: Arc<dyn Storage>, exchanges: Vec<Arc<dyn Exchange>>) -> Result<Self> {
        Self::with_clock(storage, exchanges, timestamp).await
    }

    pub async fn with_clock(
        storage: Arc<dyn Storage>,
        exchanges: Vec<Arc<dyn Exchange>>,
        get_time_ms: fn() -> u64,
    ) -> Result<Self> {
        let inner = Arc::new(Inner {
            storage,
            exchanges: exchanges
                .into_iter()
                .map(|exchange| (exchange.name().to_owned(), exchange))
                .collect(),
            exchange_info: RwLock::new(HashMap::new()),
            tickers: RwLock::new(HashMap::new()),
            get_time_ms,
        });

        inner.sync_all().await?;

        let task_inner = inner.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(SYNC_PERIOD_MS));
            // The immediate first tick; the initial sync already happened.
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(err) = task_inner.sync_all().await {
                    error!("periodic exchange metadata sync failed: {}", err);
                }
            }
        });

        Ok(Self {
            inner,
            _sync_task: Arc::new(TaskGuard(handle)),
        })
    }

    pub fn get_fees_filters(&self, exchange: &str, symbol: &str) -> Result<(Fees, Filters)> {
        let exchange_info = self.inner.exchange_info.read().expect("informant lock");
        let info = exchange_info
            .get(exchange)
            .ok_or_else(|| Error::ExchangeNotFound(exchange.to_owned()))?;
        // `__all__` allows an exchange to report one fee schedule for every
        // symbol.
        let fees = info
            .fees
            .get("__all__")
            .or_else(|| info.fees.get(symbol))
            .copied()
            .ok_or_else(|| Error::SymbolNotFound {
                exchange: exchange.to_owned(),
                symbol: symbol.to_owned(),
            })?;
        let filters = info
            .filters
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::SymbolNotFound {
                exchange: exchange.to_owned(),
                symbol: symbol.to_owned(),
            })?;
        Ok((fees, filters))
    }

    pub fn list_symbols(&self, exchange: &str, patterns: Option<&[String]>) -> Result<Vec<String>> {
        let exchange_info = self.inner.exchange_info.read().expect("informant lock");
        let info = exchange_info
            .get(exchange)
            .ok_or_else(|| Error::ExchangeNotFound(exchange.to_owned()))?;
        let mut symbols: Vec<String> = match patterns {
            None => info.filters.keys().cloned().collect(),
            Some(patterns) => info
                .filters
                .keys()
                .filter(|symbol| patterns.iter().any(|pattern| pattern == *symbol))
                .cloned()
                .collect(),
        };
        symbols.sort();
        Ok(symbols)
    }

    pub fn list_candle_intervals(
        &self,
        exchange: &str,
        intervals: Option<&[u64]>,
    ) -> Result<Vec<u64>> {
        let exchange_info = self.inner.exchange_info.read().expect("informant lock");
        let info = exchange_info
            .get(exchange)
            .ok_or_else(|| Error::ExchangeNotFound(exchange.to_owned()))?;
        let mut result: Vec<u64> = match intervals {
            None => info.candle_intervals.clone(),
            Some(intervals) => info
                .candle_intervals
                .iter()
                .filter(|interval| intervals.contains(interval))
                .copied()
                .collect(),
        };
        result.sort_unstable();
        Ok(result)
    }

    pub fn get_borrow_info(&self, exchange: &str, symbol: &str, asset: &str) -> Result<BorrowInfo> {
        let exchange_info = self.inner.exchange_info.read().expect("informant lock");
        let info = exchange_info
            .get(exchange)
            .ok_or_else(|| Error::ExchangeNotFound(exchange.to_owned()))?;
        info.borrow_info
            .get(symbol)
            .and_then(|by_asset| by_asset.get(asset))
            .copied()
            .ok_or_else(|| Error::BorrowInfoNotFound {
                exchange: exchange.to_owned(),
                symbol: symbol.to_owned(),
                asset: asset.to_owned(),
            })
    }

    pub fn get_margin_multiplier(&self, exchange: &str) -> Result<u32> {
        let exchange_info = self.inner.exchange_info.read().expect("informant lock");
        exchange_info
            .get(exchange)
            .map(|info| info.margin_multiplier)
            .ok_or_else(|| Error::ExchangeNotFound(exchange.to_owned()))
    }

    pub fn map_tickers(&self, exchange: &str) -> Result<HashMap<String, Ticker>> {
        let tickers = self.inner.tickers.read().expect("informant lock");
        tickers
            .get(exchange)
            .cloned()
            .ok_or_else(|| Error::ExchangeNotFound(exchange.to_owned()))
    }
}

impl Inner {
    async fn sync_all(&self) -> Result<()> {
        for (name, exchange) in &self.exchanges {
            self.sync_exchange_info(name, exchange).await?;
            self.sync_tickers(name, exchange).await?;
        }
        Ok(())
    }

    async fn sync_exchange_info(&self, name: &str, exchange: &Arc<dyn Exchange>) -> Result<()> {
        let now = (self.get_time_ms)();
        let stored = self
            .storage
            .get_typed::<ExchangeInfo>(name, EXCHANGE_INFO_KEY)
            .await?;
        let info = match stored {
            Some(timestamped) if now < timestamped.time + STALENESS_MS => {
                info!("using exchange info for {} from storage", name);
                timestamped.item
            }
            _ => {
                info!("fetching exchange info for {} from exchange", name);
                let info = exchange.get_exchange_info().await?;
                self.storage
                    .set_typed(name, EXCHANGE_INFO_KEY, now, &info)
                    .await?;
                info
            }
        };
        self.exchange_info
            .write()
            .expect("informant lock")
            .insert(name.to_owned(), info);
        Ok(())
    }

    async fn sync_tickers(&self, name: &str, exchange: &Arc<dyn Exchange>) -> Result<()> {
        let now = (self.get_time_ms)();
        let stored = self
            .storage
            .get_typed::<HashMap<String, Ticker>>(name, TICKERS_KEY)
            .await?;
        let tickers = match stored {
            Some(timestamped) if now < timestamped.time + STALENESS_MS => timestamped.item,
            _ => match exchange.map_tickers().await {
                Ok(tickers) => {
                    self.storage.set_typed(name, TICKERS_KEY, now, &tickers).await?;
                    tickers
                }
                Err(exchange::Error::NotSupported(_)) => HashMap::new(),
                Err(err) => return Err(err.into()),
            },
        };
        self.tickers
            .write()
            .expect("informant lock")
            .insert(name.to_owned(), tickers);
        Ok(())
    }
}
