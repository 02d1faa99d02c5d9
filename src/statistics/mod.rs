mod core;
mod extended;

pub use self::core::*;
pub use extended::*;

use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use crate::{
    math::annualized,
    time::{serialize_interval, serialize_timestamp},
    trading::{CloseReason, Position, TradingSummary},
};

// TODO: Use const fn when `365.0.sqrt()` is supported.
pub(crate) const SQRT_365: f64 = 19.10497317454279908588432590477168560028076171875;

#[derive(Debug, Serialize)]
pub struct PositionStatistics {
    #[serde(rename = "type")]
    pub type_: &'static str,
    #[serde(serialize_with = "serialize_timestamp")]
    pub open_time: u64,
    #[serde(serialize_with = "serialize_timestamp")]
    pub close_time: u64,
    pub cost: f64,
    pub gain: f64,
    pub profit: f64,
    #[serde(serialize_with = "serialize_interval")]
    pub duration: u64,
    pub roi: f64,
    pub annualized_roi: f64,
    pub close_reason: CloseReason,
}

impl PositionStatistics {
    pub fn from_position(position: &Position) -> Self {
        let (type_, cost, gain) = match position {
            Position::Long(position) => (
                "long",
                position.cost().to_f64().unwrap_or(0.0),
                position.gain().to_f64().unwrap_or(0.0),
            ),
            Position::Short(position) => (
                "short",
                position.cost().to_f64().unwrap_or(0.0),
                position.gain().to_f64().unwrap_or(0.0),
            ),
        };
        let duration = position.duration();
        let profit = position.profit().to_f64().unwrap_or(0.0);
        let roi = profit / cost;
        Self {
            type_,
            open_time: position.open_time(),
            close_time: position.close_time(),
            cost,
            gain,
            profit,
            duration,
            roi,
            annualized_roi: annualized(duration, roi),
            close_reason: position.close_reason(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Statistics {
    pub core: CoreStatistics,
    pub extended: ExtendedStatistics,
}

impl Statistics {
    pub fn compose(
        summary: &TradingSummary,
        base_prices: &[f64],
        quote_prices: Option<&[f64]>,
        benchmark_g_returns: &[f64],
        stats_interval: u64,
    ) -> Self {
        Self {
            core: CoreStatistics::compose(summary),
            extended: ExtendedStatistics::compose(
                summary,
                base_prices,
                quote_prices,
                benchmark_g_returns,
                stats_interval,
            ),
        }
    }
}
