use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::MA;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Sma {
    prices: VecDeque<Decimal>,
    sum: Decimal,
    t: u32,
    t1: u32,
}

impl Sma {
    pub fn new(period: u32) -> Self {
        assert!(period > 0);
        Self {
            prices: VecDeque::with_capacity(period as usize),
            sum: Decimal::ZERO,
            t: 0,
            t1: period,
        }
    }
}

impl MA for Sma {
    fn maturity(&self) -> u32 {
        self.t1
    }

    fn mature(&self) -> bool {
        self.t >= self.t1
    }

    fn update(&mut self, price: Decimal) {
        if self.prices.len() == self.t1 as usize {
            self.sum -= self.prices.pop_front().expect("window not empty");
        }
        self.prices.push_back(price);
        self.sum += price;
        self.t = u32::min(self.t + 1, self.t1);
    }

    fn value(&self) -> Decimal {
        if self.prices.is_empty() {
            Decimal::ZERO
        } else {
            self.sum / Decimal::from(self.prices.len() as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rolling_window() {
        let mut sma = Sma::new(2);
        sma.update(dec!(1.0));
        assert_eq!(sma.value(), dec!(1.0));
        sma.update(dec!(3.0));
        assert_eq!(sma.value(), dec!(2.0));
        sma.update(dec!(5.0));
        assert_eq!(sma.value(), dec!(4.0));
        assert!(sma.mature());
    }
}
