mod algorithm;
mod crossover;
mod mutation;
mod selection;

pub use algorithm::GeneticAlgorithm;
pub use crossover::{Crossover, UniformCrossover};
pub use mutation::{Mutation, UniformMutation};
pub use selection::{NsgaII, Selection};

use std::cmp::Ordering;

use rand::prelude::*;
use serde::Serialize;

use crate::solver::FitnessValues;

// A fixed-length tuple of genes. Pinned values come in through the context;
// unpinned genes are sampled from their constraints.
pub trait Chromosome: Clone + Send + Sync {
    type Context: Send + Sync;

    fn len() -> usize;
    fn generate(rng: &mut StdRng, ctx: &Self::Context) -> Self;
    fn cross(&mut self, other: &mut Self, i: usize);
    fn mutate(&mut self, rng: &mut StdRng, i: usize, ctx: &Self::Context);
}

#[derive(Clone, Debug, Serialize)]
pub struct Individual<T: Chromosome> {
    pub chromosome: T,
    pub fitness: Option<FitnessValues>,
}

impl<T: Chromosome> Individual<T> {
    pub fn generate(rng: &mut StdRng, ctx: &T::Context) -> Self {
        Self {
            chromosome: T::generate(rng, ctx),
            fitness: None,
        }
    }

    pub fn fitness(&self) -> &FitnessValues {
        self.fitness.as_ref().expect("individual evaluated")
    }

    // Lexicographic comparison over weighted objectives; used for hall of
    // fame ranking and descending sorts.
    pub fn cmp_fitness(&self, other: &Individual<T>) -> Ordering {
        let a = self.fitness().weighted();
        let b = other.fitness().weighted();
        for (x, y) in a.iter().zip(b.iter()) {
            match x.partial_cmp(y) {
                Some(Ordering::Equal) | None => continue,
                Some(ordering) => return ordering,
            }
        }
        Ordering::Equal
    }

    pub fn fitness_desc(a: &Individual<T>, b: &Individual<T>) -> Ordering {
        b.cmp_fitness(a)
    }
}

pub trait Evaluation: Send + Sync {
    type Chromosome: Chromosome;

    fn evaluate(&self, population: &mut [Individual<Self::Chromosome>]);
}

pub struct Evolution<T: Chromosome> {
    pub hall_of_fame: Vec<Individual<T>>,
    pub seed: u64,
    pub generations: usize,
    pub cancelled: bool,
}
