mod double_ma;
mod fixed;
mod four_week_rule;
mod single_ma;

pub use double_ma::{DoubleMA, DoubleMAParams, DoubleMAParamsContext};
pub use fixed::{Fixed, FixedParams, FixedParamsContext};
pub use four_week_rule::{FourWeekRule, FourWeekRuleParams, FourWeekRuleParamsContext};
pub use single_ma::{SingleMA, SingleMAParams, SingleMAParamsContext};

use once_cell::sync::Lazy;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{common::Advice, common::Candle, genetics::Chromosome};

// A strategy is a pure state machine over a candle stream. Advice before
// maturity is `None`.
pub trait Strategy: Send + Sync {
    fn maturity(&self) -> u32;
    fn mature(&self) -> bool;
    fn update(&mut self, candle: &Candle);
}

pub trait Signal: Strategy {
    fn advice(&self) -> Advice;
}

// Closed over the known strategies; plug-in authors implement `Signal` and
// extend the variants. Keeping the set closed keeps strategy state
// serializable for trader persistence. `Fixed` plays back a scripted advice
// list and is excluded from random generation.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum StrategyParams {
    DoubleMA(DoubleMAParams),
    Fixed(FixedParams),
    FourWeekRule(FourWeekRuleParams),
    SingleMA(SingleMAParams),
}

impl StrategyParams {
    pub fn construct(&self) -> AnySignal {
        match self {
            StrategyParams::DoubleMA(params) => AnySignal::DoubleMA(DoubleMA::new(params)),
            StrategyParams::Fixed(params) => AnySignal::Fixed(Fixed::new(params)),
            StrategyParams::FourWeekRule(params) => {
                AnySignal::FourWeekRule(FourWeekRule::new(params))
            }
            StrategyParams::SingleMA(params) => AnySignal::SingleMA(SingleMA::new(params)),
        }
    }

    pub fn validate(&self) -> bool {
        match self {
            StrategyParams::DoubleMA(params) => params.validate(),
            StrategyParams::Fixed(params) => params.validate(),
            StrategyParams::FourWeekRule(params) => params.validate(),
            StrategyParams::SingleMA(params) => params.validate(),
        }
    }

    fn variant_len(&self) -> usize {
        match self {
            StrategyParams::DoubleMA(_) => DoubleMAParams::len(),
            StrategyParams::Fixed(_) => FixedParams::len(),
            StrategyParams::FourWeekRule(_) => FourWeekRuleParams::len(),
            StrategyParams::SingleMA(_) => SingleMAParams::len(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum StrategyParamsContext {
    None,
    DoubleMA(DoubleMAParamsContext),
    Fixed(FixedParamsContext),
    FourWeekRule(FourWeekRuleParamsContext),
    SingleMA(SingleMAParamsContext),
}

impl Default for StrategyParamsContext {
    fn default() -> Self {
        StrategyParamsContext::None
    }
}

static DEFAULT_DOUBLE_MA_CTX: Lazy<DoubleMAParamsContext> =
    Lazy::new(DoubleMAParamsContext::default);
static DEFAULT_FIXED_CTX: Lazy<FixedParamsContext> = Lazy::new(FixedParamsContext::default);
static DEFAULT_FOUR_WEEK_RULE_CTX: Lazy<FourWeekRuleParamsContext> =
    Lazy::new(FourWeekRuleParamsContext::default);
static DEFAULT_SINGLE_MA_CTX: Lazy<SingleMAParamsContext> =
    Lazy::new(SingleMAParamsContext::default);

impl StrategyParamsContext {
    fn double_ma(&self) -> &DoubleMAParamsContext {
        match self {
            StrategyParamsContext::DoubleMA(ctx) => ctx,
            _ => &DEFAULT_DOUBLE_MA_CTX,
        }
    }

    fn fixed(&self) -> &FixedParamsContext {
        match self {
            StrategyParamsContext::Fixed(ctx) => ctx,
            _ => &DEFAULT_FIXED_CTX,
        }
    }

    fn four_week_rule(&self) -> &FourWeekRuleParamsContext {
        match self {
            StrategyParamsContext::FourWeekRule(ctx) => ctx,
            _ => &DEFAULT_FOUR_WEEK_RULE_CTX,
        }
    }

    fn single_ma(&self) -> &SingleMAParamsContext {
        match self {
            StrategyParamsContext::SingleMA(ctx) => ctx,
            _ => &DEFAULT_SINGLE_MA_CTX,
        }
    }
}

impl Chromosome for StrategyParams {
    type Context = StrategyParamsContext;

    fn len() -> usize {
        // Extra slot swaps the entire variant.
        1 + [
            DoubleMAParams::len(),
            FourWeekRuleParams::len(),
            SingleMAParams::len(),
        ]
        .iter()
        .max()
        .unwrap()
    }

    fn generate(rng: &mut StdRng, ctx: &Self::Context) -> Self {
        match ctx {
            StrategyParamsContext::None => match rng.gen_range(0..3) {
                0 => StrategyParams::DoubleMA(DoubleMAParams::generate(rng, &DEFAULT_DOUBLE_MA_CTX)),
                1 => StrategyParams::FourWeekRule(FourWeekRuleParams::generate(
                    rng,
                    &DEFAULT_FOUR_WEEK_RULE_CTX,
                )),
                2 => StrategyParams::SingleMA(SingleMAParams::generate(rng, &DEFAULT_SINGLE_MA_CTX)),
                _ => panic!(),
            },
            StrategyParamsContext::DoubleMA(ctx) => {
                StrategyParams::DoubleMA(DoubleMAParams::generate(rng, ctx))
            }
            StrategyParamsContext::Fixed(ctx) => StrategyParams::Fixed(FixedParams::generate(rng, ctx)),
            StrategyParamsContext::FourWeekRule(ctx) => {
                StrategyParams::FourWeekRule(FourWeekRuleParams::generate(rng, ctx))
            }
            StrategyParamsContext::SingleMA(ctx) => {
                StrategyParams::SingleMA(SingleMAParams::generate(rng, ctx))
            }
        }
    }

    fn cross(&mut self, other: &mut Self, i: usize) {
        if i == 0 {
            std::mem::swap(self, other);
        } else if std::mem::discriminant(self) == std::mem::discriminant(other) {
            let i = i - 1;
            if i < self.variant_len() {
                match (self, other) {
                    (StrategyParams::DoubleMA(left), StrategyParams::DoubleMA(right)) => {
                        left.cross(right, i)
                    }
                    (StrategyParams::Fixed(left), StrategyParams::Fixed(right)) => {
                        left.cross(right, i)
                    }
                    (StrategyParams::FourWeekRule(left), StrategyParams::FourWeekRule(right)) => {
                        left.cross(right, i)
                    }
                    (StrategyParams::SingleMA(left), StrategyParams::SingleMA(right)) => {
                        left.cross(right, i)
                    }
                    _ => panic!(),
                }
            }
        }
    }

    fn mutate(&mut self, rng: &mut StdRng, i: usize, ctx: &Self::Context) {
        if i == 0 {
            *self = Self::generate(rng, ctx);
        } else {
            let i = i - 1;
            if i < self.variant_len() {
                match self {
                    StrategyParams::DoubleMA(params) => params.mutate(rng, i, ctx.double_ma()),
                    StrategyParams::Fixed(params) => params.mutate(rng, i, ctx.fixed()),
                    StrategyParams::FourWeekRule(params) => {
                        params.mutate(rng, i, ctx.four_week_rule())
                    }
                    StrategyParams::SingleMA(params) => params.mutate(rng, i, ctx.single_ma()),
                }
            }
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum AnySignal {
    DoubleMA(DoubleMA),
    Fixed(Fixed),
    FourWeekRule(FourWeekRule),
    SingleMA(SingleMA),
}

impl Strategy for AnySignal {
    fn maturity(&self) -> u32 {
        match self {
            AnySignal::DoubleMA(strategy) => strategy.maturity(),
            AnySignal::Fixed(strategy) => strategy.maturity(),
            AnySignal::FourWeekRule(strategy) => strategy.maturity(),
            AnySignal::SingleMA(strategy) => strategy.maturity(),
        }
    }

    fn mature(&self) -> bool {
        match self {
            AnySignal::DoubleMA(strategy) => strategy.mature(),
            AnySignal::Fixed(strategy) => strategy.mature(),
            AnySignal::FourWeekRule(strategy) => strategy.mature(),
            AnySignal::SingleMA(strategy) => strategy.mature(),
        }
    }

    fn update(&mut self, candle: &Candle) {
        match self {
            AnySignal::DoubleMA(strategy) => strategy.update(candle),
            AnySignal::Fixed(strategy) => strategy.update(candle),
            AnySignal::FourWeekRule(strategy) => strategy.update(candle),
            AnySignal::SingleMA(strategy) => strategy.update(candle),
        }
    }
}

impl Signal for AnySignal {
    fn advice(&self) -> Advice {
        match self {
            AnySignal::DoubleMA(strategy) => strategy.advice(),
            AnySignal::Fixed(strategy) => strategy.advice(),
            AnySignal::FourWeekRule(strategy) => strategy.advice(),
            AnySignal::SingleMA(strategy) => strategy.advice(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genetics::Chromosome;

    #[test]
    fn test_generate_respects_pinned_context() {
        let mut rng = StdRng::seed_from_u64(1);
        let ctx = StrategyParamsContext::FourWeekRule(FourWeekRuleParamsContext::default());
        for _ in 0..10 {
            let params = StrategyParams::generate(&mut rng, &ctx);
            assert!(matches!(params, StrategyParams::FourWeekRule(_)));
            assert!(params.validate());
        }
    }

    #[test]
    fn test_cross_slot_zero_swaps_variant() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut a = StrategyParams::generate(
            &mut rng,
            &StrategyParamsContext::DoubleMA(DoubleMAParamsContext::default()),
        );
        let mut b = StrategyParams::generate(
            &mut rng,
            &StrategyParamsContext::SingleMA(SingleMAParamsContext::default()),
        );
        a.cross(&mut b, 0);
        assert!(matches!(a, StrategyParams::SingleMA(_)));
        assert!(matches!(b, StrategyParams::DoubleMA(_)));
    }
}
