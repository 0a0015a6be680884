// src/tuning/mod.rs - Automatic PID gain search against the simulated hotend
//!
//! The tuner scores candidate gains by simulating the closed loop with the
//! environment held fixed and feeding the trajectory to the [`CostEvaluator`].
//! Fitness is the negated cost, so unstable candidates land at the very bottom
//! of the ranking instead of aborting the search.

pub mod control;
pub mod cost;
pub mod genetic;
pub mod search;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::simulator::Simulator;
use crate::simulator::grid::TimeGrid;
use crate::simulator::integrator::Tolerances;
use crate::thermal::{Gains, ParameterSet, SimulationState};

use self::control::{CancelToken, GenerationReport, ProgressObserver, SearchControl, StopConditions, Termination};
use self::cost::{CostBreakdown, CostEvaluator};
use self::genetic::{GeneticAlgorithm, GeneticConfig};
use self::search::{Candidate, FitnessFunction, SearchDriver, SearchSpace, StochasticOptimizer};

/// Fixed environment plus everything needed to score one candidate.
#[derive(Debug, Clone)]
pub struct TuningProblem {
    base: ParameterSet,
    grid: TimeGrid,
    initial: SimulationState,
    tolerances: Tolerances,
    evaluator: CostEvaluator,
}

impl TuningProblem {
    /// Environment from the three search inputs, remaining plant and actuator
    /// constants at their defaults.
    pub fn new(setpoint: f64, decay_rate: f64, ambient_temp: f64) -> Result<Self> {
        Self::from_parameters(ParameterSet {
            setpoint,
            decay_rate,
            ambient_temp,
            ..ParameterSet::default()
        })
    }

    /// Use every non-gain field of `base` as the fixed environment.
    pub fn from_parameters(base: ParameterSet) -> Result<Self> {
        base.validate()?;
        Ok(Self {
            base,
            grid: TimeGrid::default(),
            initial: SimulationState::default(),
            tolerances: Tolerances::default(),
            evaluator: CostEvaluator::default(),
        })
    }

    pub fn with_grid(mut self, grid: TimeGrid) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_initial_state(mut self, initial: SimulationState) -> Self {
        self.initial = initial;
        self
    }

    pub fn with_tolerances(mut self, tolerances: Tolerances) -> Self {
        self.tolerances = tolerances;
        self
    }

    pub fn with_evaluator(mut self, evaluator: CostEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn environment(&self) -> &ParameterSet {
        &self.base
    }

    pub fn parameters_for(&self, gains: Gains) -> ParameterSet {
        self.base.with_gains(gains)
    }

    /// Simulate `gains` and score the run. Candidates that fail validation are
    /// scored like unstable runs.
    pub fn cost(&self, gains: Gains) -> CostBreakdown {
        match Simulator::new(self.parameters_for(gains)) {
            Ok(simulator) => {
                let trajectory = simulator
                    .with_grid(self.grid)
                    .with_initial_state(self.initial)
                    .with_tolerances(self.tolerances)
                    .run();
                self.evaluator.evaluate(&trajectory, self.base.setpoint)
            }
            Err(_) => CostBreakdown::unstable(),
        }
    }
}

impl FitnessFunction for TuningProblem {
    fn fitness(&self, candidate: &Candidate) -> f64 {
        -self.cost(Gains::from_array(*candidate)).total
    }
}

/// Search settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TunerConfig {
    pub generations: usize,
    pub seed: Option<u64>,
    pub space: SearchSpace,
    pub genetic: GeneticConfig,
    pub time_budget: Option<Duration>,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            generations: 200,
            seed: None,
            space: SearchSpace::default(),
            genetic: GeneticConfig::default(),
            time_budget: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub best_gains: Gains,
    /// Negated cost of `best_gains`
    pub best_fitness: f64,
    pub generations_run: usize,
    pub evaluations: usize,
    pub termination: Termination,
}

impl OptimizationResult {
    pub fn best_cost(&self) -> f64 {
        -self.best_fitness
    }

    /// `Kp = 1.23, Ki = 0.02, Kd = 0.10`
    pub fn summary(&self) -> String {
        self.best_gains.to_string()
    }
}

/// Configured gain search over one [`TuningProblem`].
pub struct PidTuner<'a> {
    problem: TuningProblem,
    config: TunerConfig,
    cancel: Option<CancelToken>,
    observer: Option<ProgressObserver<'a>>,
}

impl<'a> PidTuner<'a> {
    pub fn new(problem: TuningProblem) -> Self {
        Self {
            problem,
            config: TunerConfig::default(),
            cancel: None,
            observer: None,
        }
    }

    pub fn with_config(mut self, config: TunerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.config.time_budget = Some(budget);
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Called after every generation with the best-so-far; return
    /// [`SearchControl::Stop`] to end the search early.
    pub fn on_generation<F>(mut self, observer: F) -> Self
    where
        F: FnMut(&GenerationReport) -> SearchControl + Send + 'a,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn problem(&self) -> &TuningProblem {
        &self.problem
    }

    /// Run the default genetic algorithm.
    pub fn tune(self) -> Result<OptimizationResult> {
        let mut optimizer = GeneticAlgorithm::new(self.config.genetic)?;
        self.tune_with(&mut optimizer)
    }

    /// Run any population-based optimizer against this problem.
    pub fn tune_with<O>(self, optimizer: &mut O) -> Result<OptimizationResult>
    where
        O: StochasticOptimizer + ?Sized,
    {
        let PidTuner {
            problem,
            config,
            cancel,
            observer,
        } = self;

        tracing::info!(
            "Tuning PID gains: setpoint={:.1}C, {} generations, seed={:?}",
            problem.base.setpoint,
            config.generations,
            config.seed
        );

        let mut driver = SearchDriver::new(config.generations)
            .with_seed(config.seed)
            .with_stop_conditions(StopConditions {
                cancel,
                time_budget: config.time_budget,
            });
        if let Some(observer) = observer {
            driver = driver.with_observer(observer);
        }

        let outcome = driver.run(optimizer, &problem, &config.space)?;
        let result = OptimizationResult {
            best_gains: Gains::from_array(outcome.best.candidate),
            best_fitness: outcome.best.fitness,
            generations_run: outcome.generations_run,
            evaluations: outcome.evaluations,
            termination: outcome.termination,
        };
        tracing::info!(
            "Tuning finished ({:?}) after {} generations: {} (cost {:.6e})",
            result.termination,
            result.generations_run,
            result.summary(),
            result.best_cost()
        );
        Ok(result)
    }

    /// Tune, then return the environment's parameter set carrying the best gains.
    pub fn tune_parameters(self) -> Result<(OptimizationResult, ParameterSet)> {
        let base = self.problem.base.clone();
        let result = self.tune()?;
        Ok((result, base.with_gains(result.best_gains)))
    }
}

/// Search the default gain box for the environment `(setpoint, decay_rate,
/// ambient_temp)` with population 50 over 200 generations.
pub fn optimize_pid(setpoint: f64, decay_rate: f64, ambient_temp: f64) -> Result<OptimizationResult> {
    PidTuner::new(TuningProblem::new(setpoint, decay_rate, ambient_temp)?).tune()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::cost::UNSTABLE_COST;

    fn short_problem() -> TuningProblem {
        TuningProblem::new(200.0, 0.1, 25.0)
            .unwrap()
            .with_grid(TimeGrid::new(0.0, 30.0, 0.1).unwrap())
    }

    #[test]
    fn test_fitness_is_negated_cost() {
        let problem = short_problem();
        let gains = Gains::default();
        let cost = problem.cost(gains);
        assert!(cost.total.is_finite());
        assert_eq!(problem.fitness(&gains.to_array()), -cost.total);
    }

    #[test]
    fn test_invalid_candidate_scores_as_unstable() {
        let problem = short_problem();
        assert_eq!(problem.cost(Gains::new(f64::NAN, 0.0, 0.0)).total, UNSTABLE_COST);
    }

    #[test]
    fn test_problem_rejects_invalid_environment() {
        assert!(TuningProblem::new(f64::INFINITY, 0.1, 25.0).is_err());
        assert!(TuningProblem::new(200.0, -0.1, 25.0).is_err());
    }

    #[test]
    fn test_short_tuning_run_beats_zero_gains() {
        let problem = short_problem();
        let idle_cost = problem.cost(Gains::new(0.0, 0.0, 0.0)).total;
        let config = TunerConfig {
            generations: 5,
            genetic: GeneticConfig {
                population_size: 12,
                ..GeneticConfig::default()
            },
            ..TunerConfig::default()
        };
        let result = PidTuner::new(problem).with_config(config).with_seed(1).tune().unwrap();
        assert_eq!(result.generations_run, 5);
        assert_eq!(result.evaluations, 60);
        assert_eq!(result.termination, Termination::Completed);
        assert!(result.best_cost() < idle_cost);
    }

    #[test]
    fn test_summary_format() {
        let result = OptimizationResult {
            best_gains: Gains::new(1.5, 0.0123, 0.456),
            best_fitness: -10.0,
            generations_run: 1,
            evaluations: 50,
            termination: Termination::Completed,
        };
        assert_eq!(result.summary(), "Kp = 1.50, Ki = 0.01, Kd = 0.46");
        assert_eq!(result.best_cost(), 10.0);
    }
}
