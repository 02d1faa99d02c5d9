use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Price {
    pub min: Decimal,
    pub max: Decimal,  // 0 means disabled.
    pub step: Decimal, // 0 means disabled.
}

impl Price {
    pub fn round_down(&self, price: Decimal) -> Decimal {
        if price < self.min {
            return Decimal::ZERO;
        }

        let mut price = price;
        if self.max > Decimal::ZERO {
            price = Decimal::min(price, self.max);
        }
        if self.step > Decimal::ZERO {
            price = (price / self.step).floor() * self.step;
        }
        price
    }

    pub fn valid(&self, price: Decimal) -> bool {
        price >= self.min
            && (self.max.is_zero() || price <= self.max)
            && (self.step.is_zero() || ((price - self.min) % self.step).is_zero())
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct PercentPrice {
    pub multiplier_up: Decimal,
    pub multiplier_down: Decimal,
    pub avg_price_period: u64, // 0 means the last price is used.
}

impl Default for PercentPrice {
    fn default() -> Self {
        Self {
            multiplier_up: Decimal::MAX,
            multiplier_down: Decimal::ZERO,
            avg_price_period: 0,
        }
    }
}

impl PercentPrice {
    pub fn valid(&self, price: Decimal, weighted_average_price: Decimal) -> bool {
        price <= weighted_average_price * self.multiplier_up
            && price >= weighted_average_price * self.multiplier_down
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Size {
    pub min: Decimal,
    pub max: Decimal,  // 0 means disabled.
    pub step: Decimal, // 0 means disabled.
}

impl Size {
    pub fn round_down(&self, size: Decimal) -> Decimal {
        if size < self.min {
            return Decimal::ZERO;
        }

        let mut size = size;
        if self.max > Decimal::ZERO {
            size = Decimal::min(size, self.max);
        }
        if self.step > Decimal::ZERO {
            size = (size / self.step).floor() * self.step;
        }
        size
    }

    pub fn round_up(&self, size: Decimal) -> Decimal {
        if size < self.min {
            return Decimal::ZERO;
        }

        let mut size = size;
        if self.max > Decimal::ZERO {
            size = Decimal::min(size, self.max);
        }
        if self.step > Decimal::ZERO {
            size = (size / self.step).ceil() * self.step;
        }
        size
    }

    pub fn valid(&self, size: Decimal) -> bool {
        size >= self.min
            && (self.max.is_zero() || size <= self.max)
            && (self.step.is_zero() || ((size - self.min) % self.step).is_zero())
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct MinNotional {
    pub min_notional: Decimal,
    pub apply_to_market: bool,
    pub avg_price_period: u64, // 0 means the last price is used.
}

impl MinNotional {
    // For limit orders only.
    pub fn valid(&self, price: Decimal, size: Decimal) -> bool {
        price * size >= self.min_notional
    }

    pub fn min_size_for_price(&self, price: Decimal) -> Decimal {
        self.min_notional / price
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Filters {
    pub price: Price,
    pub percent_price: PercentPrice,
    pub size: Size,
    pub min_notional: MinNotional,

    pub base_precision: u32,
    pub quote_precision: u32,

    pub spot: bool,
    pub cross_margin: bool,
    pub isolated_margin: bool,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            price: Price::default(),
            percent_price: PercentPrice::default(),
            size: Size::default(),
            min_notional: MinNotional::default(),
            base_precision: 8,
            quote_precision: 8,
            spot: true,
            cross_margin: false,
            isolated_margin: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_round_down() {
        let price = Price {
            min: dec!(0.1),
            max: dec!(100.0),
            step: dec!(0.1),
        };
        assert_eq!(price.round_down(dec!(0.05)), dec!(0.0));
        assert_eq!(price.round_down(dec!(0.25)), dec!(0.2));
        assert_eq!(price.round_down(dec!(1000.0)), dec!(100.0));
    }

    #[test]
    fn test_size_round_down_disabled_filter() {
        let size = Size::default();
        assert_eq!(size.round_down(dec!(0.123)), dec!(0.123));
    }

    #[test]
    fn test_size_round_up() {
        let size = Size {
            min: dec!(0.1),
            max: dec!(100.0),
            step: dec!(0.1),
        };
        assert_eq!(size.round_up(dec!(0.05)), dec!(0.0));
        assert_eq!(size.round_up(dec!(0.25)), dec!(0.3));
    }

    #[test]
    fn test_min_notional() {
        let min_notional = MinNotional {
            min_notional: dec!(10.0),
            apply_to_market: true,
            avg_price_period: 0,
        };
        assert!(min_notional.valid(dec!(2.0), dec!(5.0)));
        assert!(!min_notional.valid(dec!(2.0), dec!(4.0)));
        assert_eq!(min_notional.min_size_for_price(dec!(2.0)), dec!(5.0));
    }
}
