use once_cell::sync::Lazy;
use rand::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Signal, Strategy};
use crate::{
    common::{Advice, Candle},
    genetics::Chromosome,
    indicators::{Ma, MaKind, MA, MA_CHOICES},
    math::{Constraint, Int},
    utils::{combine, MidTrend, MidTrendPolicy, Persistence},
};

static PERIOD: Lazy<Int> = Lazy::new(|| Int::new(1, 100));
static PERSISTENCE: Lazy<Int> = Lazy::new(|| Int::new(0, 10));

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct SingleMAParams {
    pub ma: MaKind,
    pub period: u32,
    pub persistence: u32,
}

impl Default for SingleMAParams {
    fn default() -> Self {
        Self {
            ma: MaKind::Ema,
            period: 50,
            persistence: 0,
        }
    }
}

impl SingleMAParams {
    pub fn validate(&self) -> bool {
        PERIOD.validate(&self.period) && PERSISTENCE.validate(&self.persistence)
    }
}

fn ma(rng: &mut StdRng) -> MaKind {
    *MA_CHOICES.choose(rng).unwrap()
}
fn period(rng: &mut StdRng) -> u32 {
    PERIOD.random(rng)
}
fn persistence(rng: &mut StdRng) -> u32 {
    PERSISTENCE.random(rng)
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SingleMAParamsContext {
    pub ma: Option<MaKind>,
    pub period: Option<u32>,
    pub persistence: Option<u32>,
}

impl Chromosome for SingleMAParams {
    type Context = SingleMAParamsContext;

    fn len() -> usize {
        3
    }

    fn generate(rng: &mut StdRng, ctx: &Self::Context) -> Self {
        Self {
            ma: ctx.ma.unwrap_or_else(|| ma(rng)),
            period: ctx.period.unwrap_or_else(|| period(rng)),
            persistence: ctx.persistence.unwrap_or_else(|| persistence(rng)),
        }
    }

    fn cross(&mut self, other: &mut Self, i: usize) {
        match i {
            0 => std::mem::swap(&mut self.ma, &mut other.ma),
            1 => std::mem::swap(&mut self.period, &mut other.period),
            2 => std::mem::swap(&mut self.persistence, &mut other.persistence),
            _ => panic!("index out of bounds"),
        }
    }

    fn mutate(&mut self, rng: &mut StdRng, i: usize, ctx: &Self::Context) {
        match i {
            0 => self.ma = ctx.ma.unwrap_or_else(|| ma(rng)),
            1 => self.period = ctx.period.unwrap_or_else(|| period(rng)),
            2 => self.persistence = ctx.persistence.unwrap_or_else(|| persistence(rng)),
            _ => panic!("index out of bounds"),
        }
    }
}

// Long when the close is above an ascending moving average, short when below
// a descending one.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SingleMA {
    ma: Ma,
    previous_ma_value: Decimal,
    advice: Advice,
    combined_advice: Advice,
    mid_trend: MidTrend,
    persistence: Persistence,
}

impl SingleMA {
    pub fn new(params: &SingleMAParams) -> Self {
        Self {
            ma: Ma::new(params.ma, params.period),
            previous_ma_value: Decimal::ZERO,
            advice: Advice::None,
            combined_advice: Advice::None,
            mid_trend: MidTrend::new(MidTrendPolicy::Ignore),
            persistence: Persistence::new(params.persistence, false),
        }
    }
}

impl Strategy for SingleMA {
    fn maturity(&self) -> u32 {
        self.ma.maturity() + u32::max(self.mid_trend.maturity(), self.persistence.maturity()) - 1
    }

    fn mature(&self) -> bool {
        self.ma.mature()
    }

    fn update(&mut self, candle: &Candle) {
        self.ma.update(candle.close);

        if self.mature() {
            if candle.close > self.ma.value() && self.ma.value() > self.previous_ma_value {
                self.advice = Advice::Long;
            } else if candle.close < self.ma.value() && self.ma.value() < self.previous_ma_value {
                self.advice = Advice::Short;
            } else {
                self.advice = Advice::None;
            }

            self.combined_advice = combine(
                self.mid_trend.update(self.advice),
                self.persistence.update(self.advice),
            );
        }

        self.previous_ma_value = self.ma.value();
    }
}

impl Signal for SingleMA {
    fn advice(&self) -> Advice {
        self.combined_advice
    }
}
