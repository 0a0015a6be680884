// src/tuning/genetic.rs - Real-coded genetic algorithm over the gain box
use std::cmp::Ordering;

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TunerError};
use crate::tuning::search::{Candidate, Scored, SearchSpace, StochasticOptimizer};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticConfig {
    pub population_size: usize,
    pub tournament_size: usize,
    /// Probability that a selected pair is recombined
    pub crossover_rate: f64,
    /// Per-gene mutation probability
    pub mutation_rate: f64,
    /// Largest mutation step as a fraction of the gene's range
    pub mutation_span: f64,
    /// Best members copied unchanged into the next generation
    pub elitism: usize,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            population_size: 50,
            tournament_size: 3,
            crossover_rate: 0.9,
            mutation_rate: 0.2,
            mutation_span: 0.1,
            elitism: 2,
        }
    }
}

impl GeneticConfig {
    pub fn validate(&self) -> Result<()> {
        if self.population_size < 2 {
            return Err(TunerError::invalid("population_size must be at least 2"));
        }
        if self.tournament_size == 0 || self.tournament_size > self.population_size {
            return Err(TunerError::invalid(format!(
                "tournament_size must be in 1..={}, got {}",
                self.population_size, self.tournament_size
            )));
        }
        for (name, rate) in [
            ("crossover_rate", self.crossover_rate),
            ("mutation_rate", self.mutation_rate),
            ("mutation_span", self.mutation_span),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(TunerError::invalid(format!("{} must be within [0, 1], got {}", name, rate)));
            }
        }
        if self.elitism >= self.population_size {
            return Err(TunerError::invalid("elitism must be smaller than population_size"));
        }
        Ok(())
    }
}

/// Tournament selection, arithmetic blend crossover, bounded uniform mutation
/// and elitism. All randomness comes from the driver's seeded generator.
#[derive(Debug, Clone)]
pub struct GeneticAlgorithm {
    config: GeneticConfig,
}

impl GeneticAlgorithm {
    pub fn new(config: GeneticConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GeneticConfig {
        &self.config
    }

    fn tournament(&self, scored: &[Scored], rng: &mut StdRng) -> Candidate {
        let mut winner = scored[rng.random_range(0..scored.len())];
        for _ in 1..self.config.tournament_size {
            let challenger = scored[rng.random_range(0..scored.len())];
            if challenger.fitness > winner.fitness {
                winner = challenger;
            }
        }
        winner.candidate
    }

    fn crossover(&self, a: Candidate, b: Candidate, rng: &mut StdRng) -> (Candidate, Candidate) {
        if rng.random::<f64>() >= self.config.crossover_rate {
            return (a, b);
        }
        let mut first = a;
        let mut second = b;
        for axis in 0..3 {
            let mix: f64 = rng.random();
            first[axis] = mix * a[axis] + (1.0 - mix) * b[axis];
            second[axis] = (1.0 - mix) * a[axis] + mix * b[axis];
        }
        (first, second)
    }

    fn mutate(&self, mut candidate: Candidate, space: &SearchSpace, rng: &mut StdRng) -> Candidate {
        for axis in 0..3 {
            if rng.random::<f64>() < self.config.mutation_rate {
                let reach = self.config.mutation_span * space.span(axis);
                candidate[axis] += rng.random_range(-reach..=reach);
            }
        }
        space.clamp(candidate)
    }
}

impl StochasticOptimizer for GeneticAlgorithm {
    fn initial_population(&mut self, space: &SearchSpace, rng: &mut StdRng) -> Vec<Candidate> {
        (0..self.config.population_size)
            .map(|_| {
                let mut candidate = [0.0; 3];
                for (axis, gene) in candidate.iter_mut().enumerate() {
                    *gene = rng.random_range(space.lower[axis]..=space.upper[axis]);
                }
                candidate
            })
            .collect()
    }

    fn next_generation(&mut self, scored: &[Scored], space: &SearchSpace, rng: &mut StdRng) -> Vec<Candidate> {
        let size = self.config.population_size;
        let mut next = Vec::with_capacity(size);
        if scored.is_empty() {
            return self.initial_population(space, rng);
        }

        let mut ranked: Vec<&Scored> = scored.iter().collect();
        ranked.sort_by(|a, b| b.fitness.partial_cmp(&a.fitness).unwrap_or(Ordering::Equal));
        next.extend(ranked.iter().take(self.config.elitism).map(|s| s.candidate));

        while next.len() < size {
            let mother = self.tournament(scored, rng);
            let father = self.tournament(scored, rng);
            let (first, second) = self.crossover(mother, father, rng);
            next.push(self.mutate(first, space, rng));
            if next.len() < size {
                next.push(self.mutate(second, space, rng));
            }
        }
        next
    }
}
