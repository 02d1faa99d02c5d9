mod basic;
mod noop;

pub use basic::Basic;
pub use noop::Noop;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::Candle;

// Upside (or, for shorts, downside) target over the candle stream, relative
// to the price at entry.
pub trait TakeProfit: Send + Sync {
    fn upside_hit(&self) -> bool {
        false
    }

    fn downside_hit(&self) -> bool {
        false
    }

    fn clear(&mut self, _candle: &Candle) {}

    fn update(&mut self, _candle: &Candle) {}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum AnyTakeProfit {
    Noop(Noop),
    Basic(Basic),
}

impl AnyTakeProfit {
    // Threshold zero disables the target.
    pub fn from_threshold(threshold: Decimal) -> Self {
        if threshold.is_zero() {
            AnyTakeProfit::Noop(Noop {})
        } else {
            AnyTakeProfit::Basic(Basic::new(threshold))
        }
    }
}

impl TakeProfit for AnyTakeProfit {
    fn upside_hit(&self) -> bool {
        match self {
            AnyTakeProfit::Noop(inner) => inner.upside_hit(),
            AnyTakeProfit::Basic(inner) => inner.upside_hit(),
        }
    }

    fn downside_hit(&self) -> bool {
        match self {
            AnyTakeProfit::Noop(inner) => inner.downside_hit(),
            AnyTakeProfit::Basic(inner) => inner.downside_hit(),
        }
    }

    fn clear(&mut self, candle: &Candle) {
        match self {
            AnyTakeProfit::Noop(inner) => inner.clear(candle),
            AnyTakeProfit::Basic(inner) => inner.clear(candle),
        }
    }

    fn update(&mut self, candle: &Candle) {
        match self {
            AnyTakeProfit::Noop(inner) => inner.update(candle),
            AnyTakeProfit::Basic(inner) => inner.update(candle),
        }
    }
}
