// src/tuning/search.rs - Generation loop shared by all population-based optimizers
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TunerError};
use crate::tuning::control::{GenerationReport, ProgressObserver, SearchControl, StopConditions, Termination};
use crate::tuning::cost::UNSTABLE_COST;

/// A point in gain space: `[kp, ki, kd]`.
pub type Candidate = [f64; 3];

/// Fitness given to candidates that could not be scored.
pub const WORST_FITNESS: f64 = -UNSTABLE_COST;

/// Axis-aligned box the search is confined to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub lower: Candidate,
    pub upper: Candidate,
}

impl Default for SearchSpace {
    /// `Kp ∈ [0, 2]`, `Ki ∈ [0, 0.05]`, `Kd ∈ [0, 0.5]`
    fn default() -> Self {
        Self {
            lower: [0.0, 0.0, 0.0],
            upper: [2.0, 0.05, 0.5],
        }
    }
}

impl SearchSpace {
    pub fn new(lower: Candidate, upper: Candidate) -> Result<Self> {
        let space = Self { lower, upper };
        space.validate()?;
        Ok(space)
    }

    pub fn validate(&self) -> Result<()> {
        for axis in 0..3 {
            let (lo, hi) = (self.lower[axis], self.upper[axis]);
            if !lo.is_finite() || !hi.is_finite() {
                return Err(TunerError::invalid(format!("search bounds for axis {} must be finite", axis)));
            }
            if lo > hi {
                return Err(TunerError::invalid(format!(
                    "search bounds for axis {} are inverted: [{}, {}]",
                    axis, lo, hi
                )));
            }
        }
        Ok(())
    }

    pub fn span(&self, axis: usize) -> f64 {
        self.upper[axis] - self.lower[axis]
    }

    pub fn contains(&self, candidate: &Candidate) -> bool {
        (0..3).all(|axis| candidate[axis] >= self.lower[axis] && candidate[axis] <= self.upper[axis])
    }

    pub fn clamp(&self, mut candidate: Candidate) -> Candidate {
        for (axis, value) in candidate.iter_mut().enumerate() {
            *value = value.clamp(self.lower[axis], self.upper[axis]);
        }
        candidate
    }
}

/// Objective maximized by the search. Must be a pure function of the candidate:
/// population members are scored concurrently.
pub trait FitnessFunction: Sync {
    fn fitness(&self, candidate: &Candidate) -> f64;
}

impl<F> FitnessFunction for F
where
    F: Fn(&Candidate) -> f64 + Sync,
{
    fn fitness(&self, candidate: &Candidate) -> f64 {
        self(candidate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    pub candidate: Candidate,
    pub fitness: f64,
}

/// Population-based metaheuristic plugged into [`SearchDriver`].
///
/// The driver owns scoring, best-so-far tracking and termination; an optimizer
/// only decides which candidates to try next.
pub trait StochasticOptimizer {
    fn initial_population(&mut self, space: &SearchSpace, rng: &mut StdRng) -> Vec<Candidate>;

    /// Breed the next population from the scored current one.
    fn next_generation(&mut self, scored: &[Scored], space: &SearchSpace, rng: &mut StdRng) -> Vec<Candidate>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOutcome {
    pub best: Scored,
    pub generations_run: usize,
    pub evaluations: usize,
    pub termination: Termination,
}

/// Runs an optimizer for a fixed generation budget.
pub struct SearchDriver<'a> {
    max_generations: usize,
    seed: Option<u64>,
    stop: StopConditions,
    observer: Option<ProgressObserver<'a>>,
}

impl<'a> SearchDriver<'a> {
    pub fn new(max_generations: usize) -> Self {
        Self {
            max_generations,
            seed: None,
            stop: StopConditions::default(),
            observer: None,
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_stop_conditions(mut self, stop: StopConditions) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_observer(mut self, observer: ProgressObserver<'a>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn run<O, F>(mut self, optimizer: &mut O, fitness: &F, space: &SearchSpace) -> Result<SearchOutcome>
    where
        O: StochasticOptimizer + ?Sized,
        F: FitnessFunction + ?Sized,
    {
        if self.max_generations == 0 {
            return Err(TunerError::invalid("generation budget must be at least 1"));
        }
        space.validate()?;

        let started = Instant::now();
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => {
                let mut thread_rng = rand::rng();
                StdRng::from_rng(&mut thread_rng)
            }
        };

        let mut population = optimizer.initial_population(space, &mut rng);
        let mut best: Option<Scored> = None;
        let mut evaluations = 0;
        let mut generations_run = 0;
        let mut termination = Termination::Completed;

        for generation in 0..self.max_generations {
            if population.is_empty() {
                return Err(TunerError::invalid("optimizer produced an empty population"));
            }
            let scored = score_population(&population, fitness);
            evaluations += scored.len();
            generations_run = generation + 1;

            let generation_best = fittest(&scored);
            let best_so_far = match best {
                Some(previous) if previous.fitness >= generation_best.fitness => previous,
                _ => generation_best,
            };
            best = Some(best_so_far);

            let report = GenerationReport {
                generation,
                best_candidate: best_so_far.candidate,
                best_fitness: best_so_far.fitness,
                generation_best: generation_best.fitness,
                mean_fitness: mean_fitness(&scored),
                elapsed: started.elapsed(),
            };
            tracing::debug!(
                "Generation {:3}: best={:.6e} gen_best={:.6e} mean={:.6e}",
                generation,
                report.best_fitness,
                report.generation_best,
                report.mean_fitness
            );

            if let Some(observer) = self.observer.as_mut() {
                if observer(&report) == SearchControl::Stop {
                    termination = Termination::Stopped;
                    break;
                }
            }
            if let Some(stop) = self.stop.check(started) {
                termination = stop;
                break;
            }
            if generation + 1 < self.max_generations {
                population = optimizer.next_generation(&scored, space, &mut rng);
            }
        }

        let Some(best) = best else {
            return Err(TunerError::invalid("search finished without scoring a candidate"));
        };
        Ok(SearchOutcome {
            best,
            generations_run,
            evaluations,
            termination,
        })
    }
}

fn sanitize(fitness: f64) -> f64 {
    if fitness.is_finite() { fitness } else { WORST_FITNESS }
}

/// Score every candidate. Results keep population order, so parallel and
/// serial scoring produce the same generation.
pub fn score_population<F>(population: &[Candidate], fitness: &F) -> Vec<Scored>
where
    F: FitnessFunction + ?Sized,
{
    let score = |candidate: &Candidate| Scored {
        candidate: *candidate,
        fitness: sanitize(fitness.fitness(candidate)),
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        population.par_iter().map(score).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        population.iter().map(score).collect()
    }
}

/// First member with the highest fitness.
fn fittest(scored: &[Scored]) -> Scored {
    scored
        .iter()
        .copied()
        .reduce(|best, next| if next.fitness > best.fitness { next } else { best })
        .unwrap_or(Scored {
            candidate: [0.0; 3],
            fitness: WORST_FITNESS,
        })
}

fn mean_fitness(scored: &[Scored]) -> f64 {
    let finite: Vec<f64> = scored
        .iter()
        .map(|s| s.fitness)
        .filter(|f| *f > WORST_FITNESS)
        .collect();
    if finite.is_empty() {
        WORST_FITNESS
    } else {
        finite.iter().sum::<f64>() / finite.len() as f64
    }
}
