use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::StopLoss;
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
            up_threshold_factor: Decimal::ONE - threshold,
            down_threshold_factor: Decimal::ONE + threshold,
            close_at_position: Decimal::ZERO,
            close: Decimal::ZERO,
        }
    }
}

impl StopLoss for Basic {
    fn upside_hit(&self) -> bool {
        self.close <= self.close_at_position * self.up_threshold_factor
    }

    fn downside_hit(&self) -> bool {
        self.close >= self.close_at_position * self.down_threshold_factor
    }

    fn clear(&mut self, candle: &Candle) {
        self.close_at_position = candle.close;
    }

    fn update(&mut self, candle: &Candle) {
        self.close = candle.close;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(close: Decimal) -> Candle {
        Candle {
            time: 0,
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1.0),
            closed: true,
        }
    }

    #[test]
    fn test_upside_hit_after_drop_from_entry() {
        let mut stop_loss = Basic::new(dec!(0.1));
        stop_loss.update(&candle(dec!(10.0)));
        stop_loss.clear(&candle(dec!(10.0)));
        stop_loss.update(&candle(dec!(9.5)));
        assert!(!stop_loss.upside_hit());
        stop_loss.update(&candle(dec!(9.0)));
        assert!(stop_loss.upside_hit());
    }

    #[test]
    fn test_downside_hit_after_rise_from_entry() {
        let mut stop_loss = Basic::new(dec!(0.1));
        stop_loss.clear(&candle(dec!(10.0)));
        stop_loss.update(&candle(dec!(11.0)));
        assert!(stop_loss.downside_hit());
    }
}
