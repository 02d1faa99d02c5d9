mod memory;
mod sqlite;

pub use memory::Memory;
pub use sqlite::SQLite;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::common::{Candle, Trade};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("(de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("sqlite error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("decimal error: {0}")]
    Decimal(#[from] rust_decimal::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid input for shard {shard}: {message}")]
    InvalidInput { shard: String, message: String },
    #[error("span [{start}, {end}) overlaps an existing span in shard {shard}")]
    OverlappingSpan { shard: String, start: u64, end: u64 },
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Timestamped<T> {
    pub time: u64,
    pub item: T,
}

// Sharded key-value plus time-series-with-spans persistence. Writes are
// durable before the call returns. Span listings are clipped to the requested
// range; `store_*_and_span` is atomic and rejects items outside the span,
// unordered items and overlapping spans.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, shard: &str, key: &str) -> Result<Option<Timestamped<serde_json::Value>>>;
    async fn set(&self, shard: &str, key: &str, item: Timestamped<serde_json::Value>) -> Result<()>;

    async fn list_candle_spans(&self, shard: &str, start: u64, end: u64)
        -> Result<Vec<(u64, u64)>>;
    async fn list_candles(&self, shard: &str, start: u64, end: u64) -> Result<Vec<Candle>>;
    async fn store_candles_and_span(
        &self,
        shard: &str,
        items: &[Candle],
        start: u64,
        end: u64,
    ) -> Result<()>;

    async fn list_trade_spans(&self, shard: &str, start: u64, end: u64) -> Result<Vec<(u64, u64)>>;
    async fn list_trades(&self, shard: &str, start: u64, end: u64) -> Result<Vec<Trade>>;
    async fn store_trades_and_span(
        &self,
        shard: &str,
        items: &[Trade],
        start: u64,
        end: u64,
    ) -> Result<()>;
}

#[async_trait]
pub trait StorageExt: Storage {
    async fn get_typed<T: DeserializeOwned + Send>(
        &self,
        shard: &str,
        key: &str,
    ) -> Result<Option<Timestamped<T>>> {
        Ok(match self.get(shard, key).await? {
            Some(timestamped) => Some(Timestamped {
                time: timestamped.time,
                item: serde_json::from_value(timestamped.item)?,
            }),
            None => None,
        })
    }

    async fn set_typed<T: Serialize + Send + Sync>(
        &self,
        shard: &str,
        key: &str,
        time: u64,
        item: &T,
    ) -> Result<()> {
        self.set(
            shard,
            key,
            Timestamped {
                time,
                item: serde_json::to_value(item)?,
            },
        )
        .await
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}

// Strictly increasing times, all within the span. Empty batches are valid;
// they mark a fetched-but-empty period.
fn validate_batch(shard: &str, times: impl Iterator<Item = u64>, start: u64, end: u64) -> Result<()> {
    if start >= end {
        return Err(Error::InvalidInput {
            shard: shard.to_owned(),
            message: format!("span [{}, {}) is empty", start, end),
        });
    }
    let mut previous: Option<u64> = None;
    for time in times {
        if time < start || time >= end {
            return Err(Error::InvalidInput {
                shard: shard.to_owned(),
                message: format!("item time {} outside of span [{}, {})", time, start, end),
            });
        }
        if let Some(previous) = previous {
            if time <= previous {
                return Err(Error::InvalidInput {
                    shard: shard.to_owned(),
                    message: format!("item time {} out of order (previous {})", time, previous),
                });
            }
        }
        previous = Some(time);
    }
    Ok(())
}

fn spans_overlap(existing: &[(u64, u64)], start: u64, end: u64) -> bool {
    existing.iter().any(|&(a, b)| a < end && b > start)
}
