use std::{path::PathBuf, str::FromStr};

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteConnection},
    ConnectOptions, Connection,
};
use tracing::debug;

use super::{spans_overlap, validate_batch, Error, Result, Storage, Timestamped};
use crate::common::{Candle, Trade};

// Bumped whenever the schema changes; old data files are simply left behind.
const VERSION: &str = "v1";

// One SQLite database file per shard. Monetary values are stored as TEXT to
// preserve decimal precision.
pub struct SQLite {
    dir: PathBuf,
}

impl SQLite {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    async fn connect(&self, shard: &str) -> Result<SqliteConnection> {
        let path = self.dir.join(format!("{}_{}.db", VERSION, shard));
        debug!("opening {}", path.display());
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        Ok(options.connect().await?)
    }
}

async fn ensure_object_table(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS keyvaluepair (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            time INTEGER NOT NULL
        )",
    )
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn ensure_candle_tables(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS candle (
            time INTEGER PRIMARY KEY,
            open TEXT NOT NULL,
            high TEXT NOT NULL,
            low TEXT NOT NULL,
            close TEXT NOT NULL,
            volume TEXT NOT NULL,
            closed INTEGER NOT NULL
        )",
    )
    .execute(&mut *conn)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS candle_span (
            start INTEGER PRIMARY KEY,
            \"end\" INTEGER NOT NULL
        )",
    )
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn ensure_trade_tables(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS trade (
            time INTEGER NOT NULL,
            price TEXT NOT NULL,
            size TEXT NOT NULL
        )",
    )
    .execute(&mut *conn)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS trade_time ON trade (time)")
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS trade_span (
            start INTEGER PRIMARY KEY,
            \"end\" INTEGER NOT NULL
        )",
    )
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn list_spans(
    conn: &mut SqliteConnection,
    table: &str,
    start: u64,
    end: u64,
) -> Result<Vec<(u64, u64)>> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(&format!(
        "SELECT start, \"end\" FROM {} WHERE start < ? AND \"end\" > ? ORDER BY start",
        table
    ))
    .bind(end as i64)
    .bind(start as i64)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(a, b)| (u64::max(a as u64, start), u64::min(b as u64, end)))
        .collect())
}

async fn span_overlaps(
    conn: &mut SqliteConnection,
    table: &str,
    start: u64,
    end: u64,
) -> Result<bool> {
    let existing: Vec<(i64, i64)> = sqlx::query_as(&format!(
        "SELECT start, \"end\" FROM {} WHERE start < ? AND \"end\" > ?",
        table
    ))
    .bind(end as i64)
    .bind(start as i64)
    .fetch_all(&mut *conn)
    .await?;
    let existing: Vec<(u64, u64)> = existing
        .into_iter()
        .map(|(a, b)| (a as u64, b as u64))
        .collect();
    Ok(spans_overlap(&existing, start, end))
}

fn decimal(value: &str) -> Result<Decimal> {
    Ok(Decimal::from_str(value)?)
}

#[async_trait]
impl Storage for SQLite {
    async fn get(&self, shard: &str, key: &str) -> Result<Option<Timestamped<serde_json::Value>>> {
        let mut conn = self.connect(shard).await?;
        ensure_object_table(&mut conn).await?;
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT value, time FROM keyvaluepair WHERE key = ? LIMIT 1")
                .bind(key)
                .fetch_optional(&mut conn)
                .await?;
        Ok(match row {
            Some((value, time)) => Some(Timestamped {
                time: time as u64,
                item: serde_json::from_str(&value)?,
            }),
            None => None,
        })
    }

    async fn set(&self, shard: &str, key: &str, item: Timestamped<serde_json::Value>) -> Result<()> {
        let mut conn = self.connect(shard).await?;
        ensure_object_table(&mut conn).await?;
        sqlx::query("INSERT OR REPLACE INTO keyvaluepair (key, value, time) VALUES (?, ?, ?)")
            .bind(key)
            .bind(serde_json::to_string(&item.item)?)
            .bind(item.time as i64)
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn list_candle_spans(
        &self,
        shard: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<(u64, u64)>> {
        let mut conn = self.connect(shard).await?;
        ensure_candle_tables(&mut conn).await?;
        list_spans(&mut conn, "candle_span", start, end).await
    }

    async fn list_candles(&self, shard: &str, start: u64, end: u64) -> Result<Vec<Candle>> {
        let mut conn = self.connect(shard).await?;
        ensure_candle_tables(&mut conn).await?;
        let rows: Vec<(i64, String, String, String, String, String, bool)> = sqlx::query_as(
            "SELECT time, open, high, low, close, volume, closed FROM candle \
             WHERE time >= ? AND time < ? ORDER BY time",
        )
        .bind(start as i64)
        .bind(end as i64)
        .fetch_all(&mut conn)
        .await?;
        rows.into_iter()
            .map(|(time, open, high, low, close, volume, closed)| {
                Ok(Candle {
                    time: time as u64,
                    open: decimal(&open)?,
                    high: decimal(&high)?,
                    low: decimal(&low)?,
                    close: decimal(&close)?,
                    volume: decimal(&volume)?,
                    closed,
                })
            })
            .collect()
    }

    async fn store_candles_and_span(
        &self,
        shard: &str,
        items: &[Candle],
        start: u64,
        end: u64,
    ) -> Result<()> {
        validate_batch(shard, items.iter().map(|c| c.time), start, end)?;

        let mut conn = self.connect(shard).await?;
        ensure_candle_tables(&mut conn).await?;
        if span_overlaps(&mut conn, "candle_span", start, end).await? {
            return Err(Error::OverlappingSpan {
                shard: shard.to_owned(),
                start,
                end,
            });
        }

        let mut tx = conn.begin().await?;
        for candle in items {
            sqlx::query(
                "INSERT INTO candle (time, open, high, low, close, volume, closed) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(candle.time as i64)
            .bind(candle.open.to_string())
            .bind(candle.high.to_string())
            .bind(candle.low.to_string())
            .bind(candle.close.to_string())
            .bind(candle.volume.to_string())
            .bind(candle.closed)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("INSERT INTO candle_span (start, \"end\") VALUES (?, ?)")
            .bind(start as i64)
            .bind(end as i64)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_trade_spans(&self, shard: &str, start: u64, end: u64) -> Result<Vec<(u64, u64)>> {
        let mut conn = self.connect(shard).await?;
        ensure_trade_tables(&mut conn).await?;
        list_spans(&mut conn, "trade_span", start, end).await
    }

    async fn list_trades(&self, shard: &str, start: u64, end: u64) -> Result<Vec<Trade>> {
        let mut conn = self.connect(shard).await?;
        ensure_trade_tables(&mut conn).await?;
        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT time, price, size FROM trade WHERE time >= ? AND time < ? ORDER BY time",
        )
        .bind(start as i64)
        .bind(end as i64)
        .fetch_all(&mut conn)
        .await?;
        rows.into_iter()
            .map(|(time, price, size)| {
                Ok(Trade {
                    time: time as u64,
                    price: decimal(&price)?,
                    size: decimal(&size)?,
                })
            })
            .collect()
    }

    async fn store_trades_and_span(
        &self,
        shard: &str,
        items: &[Trade],
        start: u64,
        end: u64,
    ) -> Result<()> {
        if let (Some(first), Some(last)) = (items.first(), items.last()) {
            if first.time < start || last.time >= end {
                return Err(Error::InvalidInput {
                    shard: shard.to_owned(),
                    message: format!(
                        "trade times [{}, {}] outside of span [{}, {})",
                        first.time, last.time, start, end
                    ),
                });
            }
        }

        let mut conn = self.connect(shard).await?;
        ensure_trade_tables(&mut conn).await?;
        if span_overlaps(&mut conn, "trade_span", start, end).await? {
            return Err(Error::OverlappingSpan {
                shard: shard.to_owned(),
                start,
                end,
            });
        }

        let mut tx = conn.begin().await?;
        for trade in items {
            sqlx::query("INSERT INTO trade (time, price, size) VALUES (?, ?, ?)")
                .bind(trade.time as i64)
                .bind(trade.price.to_string())
                .bind(trade.size.to_string())
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("INSERT INTO trade_span (start, \"end\") VALUES (?, ?)")
            .bind(start as i64)
            .bind(end as i64)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
