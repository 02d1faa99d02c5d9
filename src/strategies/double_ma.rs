use once_cell::sync::Lazy;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

use super::{Signal, Strategy};
use crate::{
    common::{Advice, Candle},
    genetics::Chromosome,
    indicators::{Ma, MaKind, MA, MA_CHOICES},
    math::{Constraint, Int, Pair},
    utils::{combine, MidTrend, MidTrendPolicy, Persistence},
};

static PERIODS: Lazy<Pair> = Lazy::new(|| Pair::new(Int::new(1, 100), |a, b| a < b, Int::new(2, 101)));

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct DoubleMAParams {
    pub short_ma: MaKind,
    pub long_ma: MaKind,
    pub periods: (u32, u32),
}

impl Default for DoubleMAParams {
    fn default() -> Self {
        Self {
            short_ma: MaKind::Ema,
            long_ma: MaKind::Ema,
            periods: (5, 20),
        }
    }
}

impl DoubleMAParams {
    pub fn validate(&self) -> bool {
        PERIODS.validate(&self.periods)
    }
}

fn short_ma(rng: &mut StdRng) -> MaKind {
    *MA_CHOICES.choose(rng).unwrap()
}
fn long_ma(rng: &mut StdRng) -> MaKind {
    short_ma(rng)
}
fn periods(rng: &mut StdRng) -> (u32, u32) {
    PERIODS.random(rng)
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct DoubleMAParamsContext {
    pub short_ma: Option<MaKind>,
    pub long_ma: Option<MaKind>,
    pub periods: Option<(u32, u32)>,
}

impl Chromosome for DoubleMAParams {
    type Context = DoubleMAParamsContext;

    fn len() -> usize {
        3
    }

    fn generate(rng: &mut StdRng, ctx: &Self::Context) -> Self {
        Self {
            short_ma: ctx.short_ma.unwrap_or_else(|| short_ma(rng)),
            long_ma: ctx.long_ma.unwrap_or_else(|| long_ma(rng)),
            periods: ctx.periods.unwrap_or_else(|| periods(rng)),
        }
    }

    fn cross(&mut self, other: &mut Self, i: usize) {
        match i {
            0 => std::mem::swap(&mut self.short_ma, &mut other.short_ma),
            1 => std::mem::swap(&mut self.long_ma, &mut other.long_ma),
            2 => std::mem::swap(&mut self.periods, &mut other.periods),
            _ => panic!("index out of bounds"),
        }
    }

    fn mutate(&mut self, rng: &mut StdRng, i: usize, ctx: &Self::Context) {
        match i {
            0 => self.short_ma = ctx.short_ma.unwrap_or_else(|| short_ma(rng)),
            1 => self.long_ma = ctx.long_ma.unwrap_or_else(|| long_ma(rng)),
            2 => self.periods = ctx.periods.unwrap_or_else(|| periods(rng)),
            _ => panic!("index out of bounds"),
        }
    }
}

// Signals long when the fast moving average is above the slow one, short when
// below.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DoubleMA {
    short_ma: Ma,
    long_ma: Ma,
    advice: Advice,
    combined_advice: Advice,
    mid_trend: MidTrend,
    persistence: Persistence,
}

impl DoubleMA {
    pub fn new(params: &DoubleMAParams) -> Self {
        let (short_period, long_period) = params.periods;
        assert!(short_period < long_period);
        Self {
            short_ma: Ma::new(params.short_ma, short_period),
            long_ma: Ma::new(params.long_ma, long_period),
            advice: Advice::None,
            combined_advice: Advice::None,
            mid_trend: MidTrend::new(MidTrendPolicy::Ignore),
            persistence: Persistence::new(0, false),
        }
    }
}

impl Strategy for DoubleMA {
    fn maturity(&self) -> u32 {
        self.long_ma.maturity() + u32::max(self.mid_trend.maturity(), self.persistence.maturity())
            - 1
    }

    fn mature(&self) -> bool {
        self.long_ma.mature()
    }

    fn update(&mut self, candle: &Candle) {
        self.short_ma.update(candle.close);
        self.long_ma.update(candle.close);

        if self.mature() {
            if self.short_ma.value() > self.long_ma.value() {
                self.advice = Advice::Long;
            } else if self.short_ma.value() < self.long_ma.value() {
                self.advice = Advice::Short;
            }

            self.combined_advice = combine(
                self.mid_trend.update(self.advice),
                self.persistence.update(self.advice),
            );
        }
    }
}

impl Signal for DoubleMA {
    fn advice(&self) -> Advice {
        self.combined_advice
    }
}
