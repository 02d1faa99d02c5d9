mod basic;
mod noop;
mod trailing;

pub use basic::Basic;
pub use noop::Noop;
pub use trailing::Trailing;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::Candle;

// Downside (or, for shorts, upside) guard over the candle stream. Hit flags
// are relative to the price when the position was entered; `clear` is called
// at entry.
pub trait StopLoss: Send + Sync {
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
pub enum AnyStopLoss {
    Noop(Noop),
    Basic(Basic),
    Trailing(Trailing),
}

impl AnyStopLoss {
    // Threshold zero disables the guard.
    pub fn from_threshold(threshold: Decimal, trail: bool) -> Self {
        if threshold.is_zero() {
            AnyStopLoss::Noop(Noop {})
        } else if trail {
            AnyStopLoss::Trailing(Trailing::new(threshold))
        } else {
            AnyStopLoss::Basic(Basic::new(threshold))
        }
    }
}

impl StopLoss for AnyStopLoss {
    fn upside_hit(&self) -> bool {
        match self {
            AnyStopLoss::Noop(inner) => inner.upside_hit(),
            AnyStopLoss::Basic(inner) => inner.upside_hit(),
            AnyStopLoss::Trailing(inner) => inner.upside_hit(),
        }
    }

    fn downside_hit(&self) -> bool {
        match self {
            AnyStopLoss::Noop(inner) => inner.downside_hit(),
            AnyStopLoss::Basic(inner) => inner.downside_hit(),
            AnyStopLoss::Trailing(inner) => inner.downside_hit(),
        }
    }

    fn clear(&mut self, candle: &Candle) {
        match self {
            AnyStopLoss::Noop(inner) => inner.clear(candle),
            AnyStopLoss::Basic(inner) => inner.clear(candle),
            AnyStopLoss::Trailing(inner) => inner.clear(candle),
        }
    }

    fn update(&mut self, candle: &Candle) {
        match self {
            AnyStopLoss::Noop(inner) => inner.update(candle),
            AnyStopLoss::Basic(inner) => inner.update(candle),
            AnyStopLoss::Trailing(inner) => inner.update(candle),
        }
    }
}
