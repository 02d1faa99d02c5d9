use rand::prelude::*;

use super::Chromosome;

pub trait Mutation: Send + Sync {
    fn mutate<T: Chromosome>(&self, rng: &mut StdRng, chromosome: &mut T, ctx: &T::Context);
}

// Resamples each gene from its constraint with independent probability.
pub struct UniformMutation {
    mutation_probability: f64,
}

impl UniformMutation {
    pub fn new(mutation_probability: f64) -> Self {
        assert!((0.0..=1.0).contains(&mutation_probability));
        Self {
            mutation_probability,
        }
    }
}

impl Default for UniformMutation {
    fn default() -> Self {
        Self {
            mutation_probability: 0.1,
        }
    }
}

impl Mutation for UniformMutation {
    fn mutate<T: Chromosome>(&self, rng: &mut StdRng, chromosome: &mut T, ctx: &T::Context) {
        for i in 0..T::len() {
            if rng.gen::<f64>() < self.mutation_probability {
                chromosome.mutate(rng, i, ctx);
            }
        }
    }
}
