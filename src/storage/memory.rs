use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use super::{spans_overlap, validate_batch, Error, Result, Storage, Timestamped};
use crate::common::{Candle, Trade};

#[derive(Default)]
struct Shard {
    objects: HashMap<String, Timestamped<serde_json::Value>>,
    candles: Vec<Candle>,
    candle_spans: Vec<(u64, u64)>,
    trades: Vec<Trade>,
    trade_spans: Vec<(u64, u64)>,
}

// In-memory storage. Backs tests and dry runs; the semantics mirror the
// SQLite implementation.
#[derive(Default)]
pub struct Memory {
    shards: Mutex<HashMap<String, Shard>>,
    store_count: AtomicUsize,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    // Number of `store_*_and_span` calls. Lets tests assert idempotence of
    // cached streams.
    pub fn store_count(&self) -> usize {
        self.store_count.load(Ordering::Relaxed)
    }

    fn with_shard<T>(&self, shard: &str, f: impl FnOnce(&mut Shard) -> T) -> T {
        let mut shards = self.shards.lock().expect("storage lock");
        f(shards.entry(shard.to_owned()).or_default())
    }
}

fn clip_spans(spans: &[(u64, u64)], start: u64, end: u64) -> Vec<(u64, u64)> {
    let mut result: Vec<(u64, u64)> = spans
        .iter()
        .filter(|&&(a, b)| a < end && b > start)
        .map(|&(a, b)| (u64::max(a, start), u64::min(b, end)))
        .collect();
    result.sort_by_key(|&(a, _)| a);
    result
}

#[async_trait]
impl Storage for Memory {
    async fn get(&self, shard: &str, key: &str) -> Result<Option<Timestamped<serde_json::Value>>> {
        Ok(self.with_shard(shard, |s| s.objects.get(key).cloned()))
    }

    async fn set(&self, shard: &str, key: &str, item: Timestamped<serde_json::Value>) -> Result<()> {
        self.with_shard(shard, |s| {
            s.objects.insert(key.to_owned(), item);
        });
        Ok(())
    }

    async fn list_candle_spans(
        &self,
        shard: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<(u64, u64)>> {
        Ok(self.with_shard(shard, |s| clip_spans(&s.candle_spans, start, end)))
    }

    async fn list_candles(&self, shard: &str, start: u64, end: u64) -> Result<Vec<Candle>> {
        Ok(self.with_shard(shard, |s| {
            let mut candles: Vec<Candle> = s
                .candles
                .iter()
                .filter(|c| c.time >= start && c.time < end)
                .cloned()
                .collect();
            candles.sort_by_key(|c| c.time);
            candles
        }))
    }

    async fn store_candles_and_span(
        &self,
        shard: &str,
        items: &[Candle],
        start: u64,
        end: u64,
    ) -> Result<()> {
        validate_batch(shard, items.iter().map(|c| c.time), start, end)?;
        self.with_shard(shard, |s| {
            if spans_overlap(&s.candle_spans, start, end) {
                return Err(Error::OverlappingSpan {
                    shard: shard.to_owned(),
                    start,
                    end,
                });
            }
            s.candles.extend_from_slice(items);
            s.candle_spans.push((start, end));
            s.candle_spans.sort_by_key(|&(a, _)| a);
            Ok(())
        })?;
        self.store_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn list_trade_spans(&self, shard: &str, start: u64, end: u64) -> Result<Vec<(u64, u64)>> {
        Ok(self.with_shard(shard, |s| clip_spans(&s.trade_spans, start, end)))
    }

    async fn list_trades(&self, shard: &str, start: u64, end: u64) -> Result<Vec<Trade>> {
        Ok(self.with_shard(shard, |s| {
            let mut trades: Vec<Trade> = s
                .trades
                .iter()
                .filter(|t| t.time >= start && t.time < end)
                .cloned()
                .collect();
            trades.sort_by_key(|t| t.time);
            trades
        }))
    }

    async fn store_trades_and_span(
        &self,
        shard: &str,
        items: &[Trade],
        start: u64,
        end: u64,
    ) -> Result<()> {
        // Trades may share a timestamp; only the span bounds are validated.
        if let Some(first) = items.first() {
            let last = items.last().unwrap();
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
        self.with_shard(shard, |s| {
            if spans_overlap(&s.trade_spans, start, end) {
                return Err(Error::OverlappingSpan {
                    shard: shard.to_owned(),
                    start,
                    end,
                });
            }
            s.trades.extend_from_slice(items);
            s.trade_spans.push((start, end));
            s.trade_spans.sort_by_key(|&(a, _)| a);
            Ok(())
        })?;
        self.store_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(time: u64) -> Candle {
        Candle {
            time,
            open: dec!(1.0),
            high: dec!(1.0),
            low: dec!(1.0),
            close: dec!(1.0),
            volume: dec!(1.0),
            closed: true,
        }
    }

    #[tokio::test]
    async fn test_roundtrip_candles_and_span() {
        let storage = Memory::new();
        let candles = vec![candle(0), candle(1), candle(2)];

        storage
            .store_candles_and_span("shard", &candles, 0, 3)
            .await
            .unwrap();

        assert_eq!(
            storage.list_candle_spans("shard", 0, 10).await.unwrap(),
            vec![(0, 3)]
        );
        assert_eq!(storage.list_candles("shard", 0, 10).await.unwrap(), candles);
    }

    #[tokio::test]
    async fn test_span_clipped_to_requested_range() {
        let storage = Memory::new();
        storage
            .store_candles_and_span("shard", &[candle(2)], 0, 10)
            .await
            .unwrap();

        assert_eq!(
            storage.list_candle_spans("shard", 2, 4).await.unwrap(),
            vec![(2, 4)]
        );
    }

    #[tokio::test]
    async fn test_overlapping_span_rejected() {
        let storage = Memory::new();
        storage
            .store_candles_and_span("shard", &[candle(0)], 0, 2)
            .await
            .unwrap();

        let result = storage.store_candles_and_span("shard", &[candle(1)], 1, 3).await;
        assert!(matches!(result, Err(Error::OverlappingSpan { .. })));
    }

    #[tokio::test]
    async fn test_out_of_order_batch_rejected() {
        let storage = Memory::new();
        let result = storage
            .store_candles_and_span("shard", &[candle(1), candle(0)], 0, 2)
            .await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_empty_batch_stores_span() {
        let storage = Memory::new();
        storage
            .store_candles_and_span("shard", &[], 0, 2)
            .await
            .unwrap();
        assert_eq!(
            storage.list_candle_spans("shard", 0, 10).await.unwrap(),
            vec![(0, 2)]
        );
    }
}
