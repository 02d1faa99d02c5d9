use std::cmp::min;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::MA;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Ema {
    value: Decimal,
    a: Decimal,
    t: u32,
    t1: u32,
}

impl Ema {
    pub fn new(period: u32) -> Self {
        assert!(period > 0);
        Self {
            value: Decimal::ZERO,
            a: Decimal::TWO / Decimal::from(period + 1),
            t: 0,
            t1: period,
        }
    }
}

impl MA for Ema {
    fn maturity(&self) -> u32 {
        self.t1
    }

    fn mature(&self) -> bool {
        self.t >= self.t1
    }

    fn update(&mut self, price: Decimal) {
        self.t = min(self.t + 1, self.t1);
        self.value = match self.t {
            1 => price,
            _ => (price - self.value) * self.a + self.value,
        };
    }

    fn value(&self) -> Decimal {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_first_update_seeds_value() {
        let mut ema = Ema::new(3);
        ema.update(dec!(4.0));
        assert_eq!(ema.value(), dec!(4.0));
        assert!(!ema.mature());
    }

    #[test]
    fn test_smooths_towards_price() {
        let mut ema = Ema::new(3);
        ema.update(dec!(2.0));
        ema.update(dec!(4.0));
        ema.update(dec!(4.0));
        assert!(ema.mature());
        assert!(ema.value() > dec!(2.0) && ema.value() < dec!(4.0));
    }
}
