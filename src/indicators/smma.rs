use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Sma, MA};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Smma {
    value: Decimal,
    sma: Sma,
    weight: Decimal,
    t: u32,
    t1: u32,
}

impl Smma {
    pub fn new(period: u32) -> Self {
        assert!(period > 0);
        Self {
            value: Decimal::ZERO,
            sma: Sma::new(period),
            weight: Decimal::from(period),
            t: 0,
            t1: period,
        }
    }
}

impl MA for Smma {
    fn maturity(&self) -> u32 {
        self.t1
    }

    fn mature(&self) -> bool {
        self.t >= self.t1
    }

    fn update(&mut self, price: Decimal) {
        self.t = u32::min(self.t + 1, self.t1);
        if self.t < self.t1 {
            self.sma.update(price);
            self.value = self.sma.value();
        } else {
            self.value = (self.value * (self.weight - Decimal::ONE) + price) / self.weight;
        }
    }

    fn value(&self) -> Decimal {
        self.value
    }
}
