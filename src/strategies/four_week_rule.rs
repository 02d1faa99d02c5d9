use std::collections::VecDeque;

use once_cell::sync::Lazy;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

use super::{Signal, Strategy};
use crate::{
    common::{Advice, Candle},
    genetics::Chromosome,
    indicators::{Ma, MaKind, MA, MA_CHOICES},
    itertools::minmax,
    math::{Constraint, Int},
    utils::{combine, MidTrend, MidTrendPolicy, Persistence},
};

static PERIOD: Lazy<Int> = Lazy::new(|| Int::new(2, 100));
static MA_PERIOD: Lazy<Int> = Lazy::new(|| Int::new(2, 100));

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct FourWeekRuleParams {
    pub period: u32,
    pub ma: MaKind,
    pub ma_period: u32,
}

impl Default for FourWeekRuleParams {
    fn default() -> Self {
        Self {
            period: 28,
            ma: MaKind::Ema,
            ma_period: 14,
        }
    }
}

impl FourWeekRuleParams {
    pub fn validate(&self) -> bool {
        PERIOD.validate(&self.period) && MA_PERIOD.validate(&self.ma_period)
    }
}

fn period(rng: &mut StdRng) -> u32 {
    PERIOD.random(rng)
}
fn ma(rng: &mut StdRng) -> MaKind {
    *MA_CHOICES.choose(rng).unwrap()
}
fn ma_period(rng: &mut StdRng) -> u32 {
    MA_PERIOD.random(rng)
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct FourWeekRuleParamsContext {
    pub period: Option<u32>,
    pub ma: Option<MaKind>,
    pub ma_period: Option<u32>,
}

impl Chromosome for FourWeekRuleParams {
    type Context = FourWeekRuleParamsContext;

    fn len() -> usize {
        3
    }

    fn generate(rng: &mut StdRng, ctx: &Self::Context) -> Self {
        Self {
            period: ctx.period.unwrap_or_else(|| period(rng)),
            ma: ctx.ma.unwrap_or_else(|| ma(rng)),
            ma_period: ctx.ma_period.unwrap_or_else(|| ma_period(rng)),
        }
    }

    fn cross(&mut self, other: &mut Self, i: usize) {
        match i {
            0 => std::mem::swap(&mut self.period, &mut other.period),
            1 => std::mem::swap(&mut self.ma, &mut other.ma),
            2 => std::mem::swap(&mut self.ma_period, &mut other.ma_period),
            _ => panic!("index out of bounds"),
        }
    }

    fn mutate(&mut self, rng: &mut StdRng, i: usize, ctx: &Self::Context) {
        match i {
            0 => self.period = ctx.period.unwrap_or_else(|| period(rng)),
            1 => self.ma = ctx.ma.unwrap_or_else(|| ma(rng)),
            2 => self.ma_period = ctx.ma_period.unwrap_or_else(|| ma_period(rng)),
            _ => panic!("index out of bounds"),
        }
    }
}

// Breakout system: long above the highest close of the lookback window, short
// below the lowest, liquidate when the price falls back across a moving
// average.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FourWeekRule {
    prices: VecDeque<rust_decimal::Decimal>,
    ma: Ma,
    advice: Advice,
    combined_advice: Advice,
    mid_trend: MidTrend,
    persistence: Persistence,
    t: u32,
    t1: u32,
}

impl FourWeekRule {
    pub fn new(params: &FourWeekRuleParams) -> Self {
        Self {
            prices: VecDeque::with_capacity(params.period as usize),
            ma: Ma::new(params.ma, params.ma_period),
            advice: Advice::None,
            combined_advice: Advice::None,
            mid_trend: MidTrend::new(MidTrendPolicy::Ignore),
            persistence: Persistence::new(0, false),
            t: 0,
            t1: params.period,
        }
    }
}

impl Strategy for FourWeekRule {
    fn maturity(&self) -> u32 {
        self.t1 + u32::max(self.mid_trend.maturity(), self.persistence.maturity()) - 1
    }

    fn mature(&self) -> bool {
        self.t >= self.t1
    }

    fn update(&mut self, candle: &Candle) {
        self.ma.update(candle.close);

        if self.mature() {
            let (lowest, highest) = minmax(self.prices.iter());

            if candle.close >= highest {
                self.advice = Advice::Long;
            } else if candle.close <= lowest {
                self.advice = Advice::Short;
            } else if (self.advice == Advice::Long && candle.close <= self.ma.value())
                || (self.advice == Advice::Short && candle.close >= self.ma.value())
            {
                self.advice = Advice::Liquidate;
            }

            self.combined_advice = combine(
                self.mid_trend.update(self.advice),
                self.persistence.update(self.advice),
            );
            self.prices.pop_front();
        }

        self.prices.push_back(candle.close);
        self.t = u32::min(self.t + 1, self.t1);
    }
}

impl Signal for FourWeekRule {
    fn advice(&self) -> Advice {
        self.combined_advice
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
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
    fn test_breakout_advises_long_after_trend_change() {
        let mut strategy = FourWeekRule::new(&FourWeekRuleParams {
            period: 4,
            ma: MaKind::Sma,
            ma_period: 2,
        });
        // Establish a falling window so that the breakout is a change of
        // trend rather than a mid-trend continuation.
        for price in [dec!(10.0), dec!(9.0), dec!(8.0), dec!(7.0), dec!(6.0)] {
            strategy.update(&candle(price));
        }
        assert_eq!(strategy.advice(), Advice::None);
        strategy.update(&candle(dec!(11.0)));
        assert_eq!(strategy.advice(), Advice::Long);
    }
}
