use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::common::{Balance, Candle, ExchangeInfo, Fill, Ticker, Trade};

pub type Result<T> = std::result::Result<T, Error>;

// Streams are channel-backed; dropping the receiver cancels the producer.
pub type ExchangeStream<T> = mpsc::Receiver<Result<T>>;

#[derive(Error, Debug)]
pub enum Error {
    // Transient failure (network, 5xx, rate limit). Retried by callers that
    // own the operation.
    #[error("exchange unavailable: {0}")]
    Exchange(String),
    // Permanent failure for the order in question (bad params, filter
    // violation, insufficient balance).
    #[error("order rejected: {0}")]
    Order(String),
    #[error("order would be taker")]
    OrderWouldBeTaker,
    #[error("order missing")]
    OrderMissing,
    #[error("{0} not supported by the exchange")]
    NotSupported(&'static str),
}

impl Error {
    pub fn retriable(&self) -> bool {
        matches!(self, Error::Exchange(_))
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum OrderType {
    Market,
    Limit,
    LimitMaker,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum TimeInForce {
    GoodTillCancelled,
    ImmediateOrCancel,
    FillOrKill,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

#[derive(Clone, Debug)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub type_: OrderType,
    pub size: Option<Decimal>,
    pub quote: Option<Decimal>,
    pub price: Option<Decimal>,
    pub time_in_force: Option<TimeInForce>,
    pub client_id: Option<String>,
    // "spot", "margin" or an isolated margin symbol.
    pub account: String,
}

#[derive(Clone, Debug)]
pub struct OrderResult {
    pub time: u64,
    pub status: OrderStatus,
    pub fills: Vec<Fill>,
}

#[derive(Clone, Debug)]
pub enum OrderUpdate {
    New {
        client_id: String,
    },
    Match {
        client_id: String,
        fill: Fill,
    },
    Cancelled {
        client_id: String,
        time: u64,
    },
    // Terminal; the order is fully filled.
    Done {
        client_id: String,
        time: u64,
    },
}

#[derive(Clone, Debug)]
pub struct DepthSnapshot {
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
    pub last_id: u64,
}

#[derive(Clone, Debug)]
pub struct DepthUpdate {
    // Size zero means the level is deleted.
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
    pub first_id: u64,
    pub last_id: u64,
}

#[derive(Clone, Debug)]
pub enum Depth {
    Snapshot(DepthSnapshot),
    Update(DepthUpdate),
}

pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
}

// `VESTA__<EXCHANGE>__API_KEY` / `VESTA__<EXCHANGE>__SECRET_KEY`.
pub fn credentials_from_env(exchange: &str) -> Option<Credentials> {
    let exchange = exchange.to_ascii_uppercase();
    let api_key = std::env::var(format!("VESTA__{}__API_KEY", exchange)).ok()?;
    let secret_key = std::env::var(format!("VESTA__{}__SECRET_KEY", exchange)).ok()?;
    Some(Credentials {
        api_key,
        secret_key,
    })
}

// Uniform access to one venue's market and account data. Implementations live
// outside this crate (HTTP/WebSocket adapters); tests use in-memory fakes.
// Historical candle streams yield only closed candles inside `[start, end)`
// with times aligned to the interval; live streams repeat the open candle
// until it closes. `start == 0` on a historical stream means "from the
// earliest available point".
#[async_trait]
pub trait Exchange: Send + Sync {
    fn name(&self) -> &str;

    fn can_stream_historical_candles(&self) -> bool {
        true
    }
    fn can_stream_candles(&self) -> bool {
        true
    }
    fn can_stream_historical_trades(&self) -> bool {
        true
    }
    fn can_stream_depth_snapshot(&self) -> bool {
        false
    }
    fn can_margin_trade(&self) -> bool {
        false
    }

    async fn get_exchange_info(&self) -> Result<ExchangeInfo>;

    async fn map_tickers(&self) -> Result<HashMap<String, Ticker>> {
        Err(Error::NotSupported("map_tickers"))
    }

    async fn stream_historical_candles(
        &self,
        symbol: &str,
        interval: u64,
        start: u64,
        end: u64,
    ) -> Result<ExchangeStream<Candle>>;

    async fn connect_stream_candles(
        &self,
        symbol: &str,
        interval: u64,
    ) -> Result<ExchangeStream<Candle>>;

    async fn stream_historical_trades(
        &self,
        symbol: &str,
        start: u64,
        end: u64,
    ) -> Result<ExchangeStream<Trade>> {
        let _ = (symbol, start, end);
        Err(Error::NotSupported("stream_historical_trades"))
    }

    async fn connect_stream_trades(&self, symbol: &str) -> Result<ExchangeStream<Trade>> {
        let _ = symbol;
        Err(Error::NotSupported("connect_stream_trades"))
    }

    async fn get_depth(&self, symbol: &str) -> Result<DepthSnapshot> {
        let _ = symbol;
        Err(Error::NotSupported("get_depth"))
    }

    async fn connect_stream_depth(&self, symbol: &str) -> Result<ExchangeStream<Depth>> {
        let _ = symbol;
        Err(Error::NotSupported("connect_stream_depth"))
    }

    async fn map_balances(&self, account: &str) -> Result<HashMap<String, Balance>> {
        let _ = account;
        Err(Error::NotSupported("map_balances"))
    }

    async fn connect_stream_balances(
        &self,
        account: &str,
    ) -> Result<ExchangeStream<HashMap<String, Balance>>> {
        let _ = account;
        Err(Error::NotSupported("connect_stream_balances"))
    }

    async fn place_order(&self, request: OrderRequest) -> Result<OrderResult> {
        let _ = request;
        Err(Error::NotSupported("place_order"))
    }

    async fn cancel_order(&self, symbol: &str, client_id: &str, account: &str) -> Result<()> {
        let _ = (symbol, client_id, account);
        Err(Error::NotSupported("cancel_order"))
    }

    async fn connect_stream_orders(
        &self,
        account: &str,
        symbol: &str,
    ) -> Result<ExchangeStream<OrderUpdate>> {
        let _ = (account, symbol);
        Err(Error::NotSupported("connect_stream_orders"))
    }

    async fn borrow(&self, asset: &str, size: Decimal, account: &str) -> Result<()> {
        let _ = (asset, size, account);
        Err(Error::NotSupported("borrow"))
    }

    async fn repay(&self, asset: &str, size: Decimal, account: &str) -> Result<()> {
        let _ = (asset, size, account);
        Err(Error::NotSupported("repay"))
    }

    async fn get_max_borrowable(&self, asset: &str, account: &str) -> Result<Decimal> {
        let _ = (asset, account);
        Err(Error::NotSupported("get_max_borrowable"))
    }

    async fn transfer(
        &self,
        asset: &str,
        size: Decimal,
        from_account: &str,
        to_account: &str,
    ) -> Result<()> {
        let _ = (asset, size, from_account, to_account);
        Err(Error::NotSupported("transfer"))
    }
}
