use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TakeProfit;
use crate::common::Candle;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Basic {
    up_threshold_factor: Decimal,
    down_threshold_factor: Decimal,
    close_at_position: Decimal,
    close: Decimal,
}

impl Basic {
    pub fn new(threshold: Decimal) -> Self {
        assert!(threshold > Decimal::ZERO);
        Self {
            up_threshold_factor: Decimal::ONE + threshold,
            down_threshold_factor: Decimal::ONE - threshold,
            close_at_position: Decimal::ZERO,
            close: Decimal::ZERO,
        }
    }
}

impl TakeProfit for Basic {
    fn upside_hit(&self) -> bool {
        self.close >= self.close_at_position * self.up_threshold_factor
    }

    fn downside_hit(&self) -> bool {
        self.close <= self.close_at_position * self.down_threshold_factor
    }

    fn clear(&mut self, candle: &Candle) {
        self.close_at_position = candle.close;
    }

    fn update(&mut self, candle: &Candle) {
        self.close = candle.close;
    }
}
