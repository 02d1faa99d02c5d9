use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::MA;

const SHORT_PERIOD: u32 = 2;
const LONG_PERIOD: u32 = 30;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Kama {
    value: Decimal,
    prices: VecDeque<Decimal>,
    short_alpha: Decimal,
    long_alpha: Decimal,
    t: u32,
    t1: u32,
}

impl Kama {
    pub fn new(period: u32) -> Self {
        assert!(period > 0);
        Self {
            value: Decimal::ZERO,
            prices: VecDeque::with_capacity(period as usize + 1),
            short_alpha: Decimal::TWO / Decimal::from(SHORT_PERIOD + 1),
            long_alpha: Decimal::TWO / Decimal::from(LONG_PERIOD + 1),
            t: 0,
            t1: period + 1,
        }
    }
}

impl MA for Kama {
    fn maturity(&self) -> u32 {
        self.t1
    }

    fn mature(&self) -> bool {
        self.t >= self.t1
    }

    fn update(&mut self, price: Decimal) {
        self.t = u32::min(self.t + 1, self.t1);
        if self.prices.len() == self.t1 as usize {
            self.prices.pop_front();
        }

        if self.t < self.t1 {
            self.value = price;
        } else {
            let change = (price - self.prices.front().copied().expect("window not empty")).abs();
            let volatility: Decimal = self
                .prices
                .iter()
                .zip(self.prices.iter().skip(1))
                .map(|(a, b)| (b - a).abs())
                .sum::<Decimal>()
                + (price - self.prices.back().copied().expect("window not empty")).abs();
            let efficiency_ratio = if volatility.is_zero() {
                Decimal::ZERO
            } else {
                change / volatility
            };
            let smoothing = efficiency_ratio * (self.short_alpha - self.long_alpha)
                + self.long_alpha;
            self.value += smoothing * smoothing * (price - self.value);
        }

        self.prices.push_back(price);
    }

    fn value(&self) -> Decimal {
        self.value
    }
}
