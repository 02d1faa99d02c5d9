use rand::prelude::*;
use serde::{Deserialize, Serialize};

use super::{Signal, Strategy};
use crate::{
    common::{Advice, Candle},
    genetics::Chromosome,
};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FixedParams {
    pub advices: Vec<Advice>,
    pub maturity: u32,
}

impl Default for FixedParams {
    fn default() -> Self {
        Self {
            advices: Vec::new(),
            maturity: 1,
        }
    }
}

impl FixedParams {
    pub fn validate(&self) -> bool {
        self.maturity >= 1
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct FixedParamsContext {
    pub advices: Option<Vec<Advice>>,
    pub maturity: Option<u32>,
}

// Not evolvable; the advice script is taken verbatim from the params.
impl Chromosome for FixedParams {
    type Context = FixedParamsContext;

    fn len() -> usize {
        0
    }

    fn generate(_rng: &mut StdRng, ctx: &Self::Context) -> Self {
        Self {
            advices: ctx.advices.clone().unwrap_or_default(),
            maturity: ctx.maturity.unwrap_or(1),
        }
    }

    fn cross(&mut self, _other: &mut Self, _i: usize) {
        panic!("index out of bounds")
    }

    fn mutate(&mut self, _rng: &mut StdRng, _i: usize, _ctx: &Self::Context) {
        panic!("index out of bounds")
    }
}

// Plays back a scripted list of advices, one per update. Useful for driving
// the trader deterministically.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Fixed {
    advices: Vec<Advice>,
    index: usize,
    advice: Advice,
    t: u32,
    t1: u32,
}

impl Fixed {
    pub fn new(params: &FixedParams) -> Self {
        Self {
            advices: params.advices.clone(),
            index: 0,
            advice: Advice::None,
            t: 0,
            t1: params.maturity,
        }
    }

    pub fn updates(&self) -> usize {
        self.index
    }
}

impl Strategy for Fixed {
    fn maturity(&self) -> u32 {
        self.t1
    }

    fn mature(&self) -> bool {
        self.t >= self.t1
    }

    fn update(&mut self, _candle: &Candle) {
        self.advice = self.advices.get(self.index).copied().unwrap_or(Advice::None);
        self.index += 1;
        self.t = u32::min(self.t + 1, self.t1);
    }
}

impl Signal for Fixed {
    fn advice(&self) -> Advice {
        if self.mature() {
            self.advice
        } else {
            Advice::None
        }
    }
}
