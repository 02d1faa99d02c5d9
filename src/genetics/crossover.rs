use rand::prelude::*;

use super::Chromosome;

pub trait Crossover: Send + Sync {
    fn cross<T: Chromosome>(&self, rng: &mut StdRng, chromosome1: &mut T, chromosome2: &mut T);
}

pub struct UniformCrossover {
    mix_probability: f64,
}

impl UniformCrossover {
    pub fn new(mix_probability: f64) -> Self {
        assert!((0.0..=1.0).contains(&mix_probability));
        Self { mix_probability }
    }
}

impl Default for UniformCrossover {
    fn default() -> Self {
        Self {
            mix_probability: 0.5,
        }
    }
}

impl Crossover for UniformCrossover {
    fn cross<T: Chromosome>(&self, rng: &mut StdRng, chromosome1: &mut T, chromosome2: &mut T) {
        for i in 0..T::len() {
            if rng.gen::<f64>() < self.mix_probability {
                chromosome1.cross(chromosome2, i);
            }
        }
    }
}
