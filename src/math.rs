use rand::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};

pub fn ceil_multiple(value: u64, multiple: u64) -> u64 {
    ((value + multiple - 1) / multiple) * multiple
}

pub fn floor_multiple(value: u64, multiple: u64) -> u64 {
    value - (value % multiple)
}

pub fn round_down(value: Decimal, precision: u32) -> Decimal {
    value.round_dp_with_strategy(precision, RoundingStrategy::ToZero)
}

pub fn round_half_up(value: Decimal, precision: u32) -> Decimal {
    value.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero)
}

pub fn mean(data: &[f64]) -> f64 {
    let count = data.len();
    if count == 0 {
        f64::NAN
    } else {
        data.iter().sum::<f64>() / count as f64
    }
}

pub fn std_deviation(data: &[f64]) -> f64 {
    let count = data.len();
    if count == 0 {
        f64::NAN
    } else {
        let mean = data.iter().sum::<f64>() / count as f64;
        let variance = data
            .iter()
            .map(|value| {
                let diff = mean - value;
                diff * diff
            })
            .sum::<f64>()
            / count as f64;
        variance.sqrt()
    }
}

pub fn annualized(duration: u64, value: f64) -> f64 {
    const YEAR_MS: f64 = 31_556_952_000.0;

    let n = duration as f64 / YEAR_MS;
    if n == 0.0 {
        0.0
    } else {
        let res = (1.0 + value).powf(1.0 / n) - 1.0;
        if res.is_nan() {
            0.0
        } else {
            res
        }
    }
}

// Parameter constraints. Strategies describe their tunable parameters through
// these so that the optimizer can sample and validate gene values.

pub trait Constraint {
    type Item;

    fn random(&self, rng: &mut StdRng) -> Self::Item;
    fn validate(&self, value: &Self::Item) -> bool;
}

pub struct Uniform {
    min: Decimal,
    max: Decimal,
    min_mantissa: i128,
    max_mantissa: i128,
    scale: u32,
}

impl Uniform {
    pub fn new(min: Decimal, max: Decimal) -> Self {
        let scale = u32::max(min.scale(), max.scale());
        let mut min_rescaled = min;
        min_rescaled.rescale(scale);
        let mut max_rescaled = max;
        max_rescaled.rescale(scale);
        Self {
            min,
            max,
            min_mantissa: min_rescaled.mantissa(),
            max_mantissa: max_rescaled.mantissa(),
            scale,
        }
    }
}

impl Constraint for Uniform {
    type Item = Decimal;

    fn random(&self, rng: &mut StdRng) -> Decimal {
        Decimal::from_i128_with_scale(
            rng.gen_range(self.min_mantissa..=self.max_mantissa),
            self.scale,
        )
    }

    fn validate(&self, value: &Decimal) -> bool {
        *value >= self.min && *value <= self.max
    }
}

pub struct Int {
    pub min: u32,
    pub max: u32,
}

impl Int {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }
}

impl Constraint for Int {
    type Item = u32;

    fn random(&self, rng: &mut StdRng) -> u32 {
        rng.gen_range(self.min..self.max)
    }

    fn validate(&self, value: &u32) -> bool {
        *value >= self.min && *value < self.max
    }
}

pub struct Pair {
    a: Int,
    op: fn(u32, u32) -> bool,
    b: Int,
}

impl Pair {
    pub fn new(a: Int, op: fn(u32, u32) -> bool, b: Int) -> Self {
        Self { a, op, b }
    }
}

impl Constraint for Pair {
    type Item = (u32, u32);

    fn random(&self, rng: &mut StdRng) -> (u32, u32) {
        loop {
            let a = self.a.random(rng);
            let b = self.b.random(rng);
            if (self.op)(a, b) {
                return (a, b);
            }
        }
    }

    fn validate(&self, value: &(u32, u32)) -> bool {
        self.a.validate(&value.0) && self.b.validate(&value.1) && (self.op)(value.0, value.1)
    }
}

pub struct Choice<T: Clone + PartialEq> {
    choices: Vec<T>,
}

impl<T: Clone + PartialEq> Choice<T> {
    pub fn new(choices: Vec<T>) -> Self {
        assert!(!choices.is_empty());
        Self { choices }
    }
}

impl<T: Clone + PartialEq> Constraint for Choice<T> {
    type Item = T;

    fn random(&self, rng: &mut StdRng) -> T {
        self.choices.choose(rng).unwrap().clone()
    }

    fn validate(&self, value: &T) -> bool {
        self.choices.contains(value)
    }
}

pub struct Constant<T: Clone + PartialEq>(pub T);

impl<T: Clone + PartialEq> Constraint for Constant<T> {
    type Item = T;

    fn random(&self, _rng: &mut StdRng) -> T {
        self.0.clone()
    }

    fn validate(&self, value: &T) -> bool {
        *value == self.0
    }
}
