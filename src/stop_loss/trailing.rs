use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::StopLoss;
use crate::common::Candle;

// Tracks the best close seen since entry and triggers relative to that peak
// (or valley, for shorts) instead of the entry price.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Trailing {
    up_threshold_factor: Decimal,
    down_threshold_factor: Decimal,
    highest_close_since_position: Decimal,
    lowest_close_since_position: Decimal,
    close: Decimal,
}

impl Trailing {
    pub fn new(threshold: Decimal) -> Self {
        assert!(threshold > Decimal::ZERO);
        Self {
            up_threshold_factor: Decimal::ONE - threshold,
            down_threshold_factor: Decimal::ONE + threshold,
            highest_close_since_position: Decimal::ZERO,
            lowest_close_since_position: Decimal::MAX,
            close: Decimal::ZERO,
        }
    }
}

impl StopLoss for Trailing {
    fn upside_hit(&self) -> bool {
        self.close <= self.highest_close_since_position * self.up_threshold_factor
    }

    fn downside_hit(&self) -> bool {
        self.close >= self.lowest_close_since_position * self.down_threshold_factor
    }

    fn clear(&mut self, candle: &Candle) {
        self.highest_close_since_position = candle.close;
        self.lowest_close_since_position = candle.close;
    }

    fn update(&mut self, candle: &Candle) {
        self.close = candle.close;
        self.highest_close_since_position =
            Decimal::max(self.highest_close_since_position, candle.close);
        self.lowest_close_since_position =
            Decimal::min(self.lowest_close_since_position, candle.close);
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
    fn test_trails_the_peak() {
        let mut stop_loss = Trailing::new(dec!(0.1));
        stop_loss.update(&candle(dec!(10.0)));
        stop_loss.clear(&candle(dec!(10.0)));
        stop_loss.update(&candle(dec!(20.0)));
        assert!(!stop_loss.upside_hit());
        stop_loss.update(&candle(dec!(18.0)));
        assert!(stop_loss.upside_hit());
    }

    #[test]
    fn test_trails_the_valley_for_shorts() {
        let mut stop_loss = Trailing::new(dec!(0.1));
        stop_loss.update(&candle(dec!(10.0)));
        stop_loss.clear(&candle(dec!(10.0)));
        stop_loss.update(&candle(dec!(5.0)));
        assert!(!stop_loss.downside_hit());
        stop_loss.update(&candle(dec!(6.0)));
        assert!(stop_loss.downside_hit());
    }
}
