use std::sync::atomic::{AtomicBool, Ordering};

use rand::prelude::*;
use tracing::info;

use super::{Chromosome, Crossover, Evaluation, Evolution, Individual, Mutation, Selection};

pub struct GeneticAlgorithm<TE, TS, TC, TM>
where
    TE: Evaluation,
    TS: Selection,
    TC: Crossover,
    TM: Mutation,
{
    pub evaluation: TE,
    pub selection: TS,
    pub crossover: TC,
    pub mutation: TM,
}

impl<TE, TS, TC, TM> GeneticAlgorithm<TE, TS, TC, TM>
where
    TE: Evaluation,
    TS: Selection,
    TC: Crossover,
    TM: Mutation,
{
    pub fn new(evaluation: TE, selection: TS, crossover: TC, mutation: TM) -> Self {
        Self {
            evaluation,
            selection,
            crossover,
            mutation,
        }
    }

    // mu + lambda evolution: each generation breeds `population_size`
    // offspring (crossover with probability `1 - mutation_probability`,
    // mutation otherwise) and selects the next population from parents and
    // offspring combined. The cancellation flag is observed between
    // generations; the best-so-far individual is kept in a hall of fame of
    // one.
    pub fn evolve(
        &self,
        ctx: &<TE::Chromosome as Chromosome>::Context,
        population_size: usize,
        max_generations: usize,
        mutation_probability: f64,
        seed: Option<u64>,
        cancellation: &AtomicBool,
        on_generation: impl Fn(usize, &[Individual<TE::Chromosome>]),
    ) -> Evolution<TE::Chromosome> {
        assert!(population_size >= 2);
        assert!((0.0..=1.0).contains(&mutation_probability));

        let seed = seed.unwrap_or_else(|| rand::thread_rng().gen());
        info!("randomizer seed ({})", seed);
        let mut rng = StdRng::seed_from_u64(seed);

        let crossover_probability = 1.0 - mutation_probability;

        let mut population: Vec<Individual<TE::Chromosome>> = (0..population_size)
            .map(|_| Individual::generate(&mut rng, ctx))
            .collect();
        self.evaluation.evaluate(&mut population);
        population = self.selection.select(&population, population_size);

        let mut hall_of_fame = vec![best_of(&population).clone()];
        on_generation(0, &population);

        let mut generations = 0;
        let mut cancelled = false;

        for generation in 1..=max_generations {
            if cancellation.load(Ordering::Relaxed) {
                info!("evolution cancelled at generation {}", generation);
                cancelled = true;
                break;
            }

            let mut offspring = Vec::with_capacity(population_size);
            for _ in 0..population_size {
                let choice: f64 = rng.gen();
                if choice < crossover_probability {
                    let (parent1, parent2) = two_distinct(&mut rng, &population);
                    let mut child1 = parent1.chromosome.clone();
                    let mut child2 = parent2.chromosome.clone();
                    self.crossover.cross(&mut rng, &mut child1, &mut child2);
                    offspring.push(Individual {
                        chromosome: child1,
                        fitness: None,
                    });
                } else {
                    let parent = population.choose(&mut rng).unwrap();
                    let mut child = parent.chromosome.clone();
                    self.mutation.mutate(&mut rng, &mut child, ctx);
                    offspring.push(Individual {
                        chromosome: child,
                        fitness: None,
                    });
                }
            }
            self.evaluation.evaluate(&mut offspring);

            let mut combined = population;
            combined.extend(offspring);
            population = self.selection.select(&combined, population_size);

            let best = best_of(&population);
            if best.cmp_fitness(&hall_of_fame[0]) == std::cmp::Ordering::Greater {
                hall_of_fame[0] = best.clone();
            }
            on_generation(generation, &population);
            generations = generation;
        }

        Evolution {
            hall_of_fame,
            seed,
            generations,
            cancelled,
        }
    }
}

fn best_of<T: Chromosome>(population: &[Individual<T>]) -> &Individual<T> {
    population
        .iter()
        .max_by(|a, b| a.cmp_fitness(b))
        .expect("non-empty population")
}

fn two_distinct<'a, T: Chromosome>(
    rng: &mut StdRng,
    population: &'a [Individual<T>],
) -> (&'a Individual<T>, &'a Individual<T>) {
    let first = rng.gen_range(0..population.len());
    let mut second = rng.gen_range(0..population.len());
    while second == first {
        second = rng.gen_range(0..population.len());
    }
    (&population[first], &population[second])
}
