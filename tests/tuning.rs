// Integration tests for the PID gain search

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use rand::rngs::StdRng;

    use hotend_tuner::tuning::TunerConfig;
    use hotend_tuner::tuning::genetic::GeneticConfig;
    use hotend_tuner::tuning::search::{Candidate, Scored, SearchSpace, StochasticOptimizer};
    use hotend_tuner::{
        CancelToken, Gains, PidTuner, SearchControl, Termination, TimeGrid, TuningProblem, optimize_pid,
    };

    fn quick_problem() -> TuningProblem {
        TuningProblem::new(200.0, 0.1, 25.0)
            .unwrap()
            .with_grid(TimeGrid::new(0.0, 60.0, 0.1).unwrap())
    }

    fn quick_config(generations: usize) -> TunerConfig {
        TunerConfig {
            generations,
            genetic: GeneticConfig {
                population_size: 16,
                ..GeneticConfig::default()
            },
            ..TunerConfig::default()
        }
    }

    /// Proposes the same fixed candidates every generation.
    struct FixedProposals {
        candidates: Vec<Candidate>,
        generations_bred: usize,
    }

    impl StochasticOptimizer for FixedProposals {
        fn initial_population(&mut self, _space: &SearchSpace, _rng: &mut StdRng) -> Vec<Candidate> {
            self.candidates.clone()
        }

        fn next_generation(&mut self, _scored: &[Scored], _space: &SearchSpace, _rng: &mut StdRng) -> Vec<Candidate> {
            self.generations_bred += 1;
            self.candidates.clone()
        }
    }

    #[test]
    fn test_default_search_stays_in_bounds() {
        let result = optimize_pid(200.0, 0.1, 25.0).unwrap();
        let space = SearchSpace::default();
        assert!(space.contains(&result.best_gains.to_array()), "{:?}", result.best_gains);
        assert_eq!(result.termination, Termination::Completed);
        assert_eq!(result.generations_run, 200);
        assert_eq!(result.evaluations, 50 * 200);
        assert!(result.best_cost().is_finite());
    }

    #[test]
    fn test_full_seeded_search_is_reproducible() {
        let run = || {
            PidTuner::new(TuningProblem::new(200.0, 0.1, 25.0).unwrap())
                .with_seed(2024)
                .tune()
                .unwrap()
        };
        let first = run();
        let second = run();
        assert_eq!(first.generations_run, 200);
        assert_eq!(first.best_gains, second.best_gains);
        assert_eq!(first.best_fitness, second.best_fitness);
    }

    #[test]
    fn test_seeded_search_is_reproducible() {
        let run = || {
            PidTuner::new(quick_problem())
                .with_config(quick_config(8))
                .with_seed(42)
                .tune()
                .unwrap()
        };
        let first = run();
        let second = run();
        assert_eq!(first.best_gains, second.best_gains);
        assert_eq!(first.best_fitness, second.best_fitness);
    }

    #[test]
    fn test_search_beats_idle_heater() {
        let problem = quick_problem();
        let baseline = problem.cost(Gains::new(0.0, 0.0, 0.0)).total;
        let result = PidTuner::new(problem)
            .with_config(quick_config(10))
            .with_seed(3)
            .tune()
            .unwrap();
        assert!(result.best_cost() < baseline, "{} >= {}", result.best_cost(), baseline);
    }

    #[test]
    fn test_custom_search_space_is_respected() {
        let space = SearchSpace::new([0.5, 0.0, 0.1], [0.6, 0.001, 0.2]).unwrap();
        let config = TunerConfig {
            space,
            ..quick_config(4)
        };
        let result = PidTuner::new(quick_problem())
            .with_config(config)
            .with_seed(9)
            .tune()
            .unwrap();
        assert!(space.contains(&result.best_gains.to_array()));
    }

    #[test]
    fn test_cancelled_search_returns_first_generation() {
        let token = CancelToken::new();
        token.cancel();
        let result = PidTuner::new(quick_problem())
            .with_config(quick_config(50))
            .with_seed(1)
            .with_cancel_token(token)
            .tune()
            .unwrap();
        assert_eq!(result.termination, Termination::Cancelled);
        assert_eq!(result.generations_run, 1);
        assert_eq!(result.evaluations, 16);
        assert!(SearchSpace::default().contains(&result.best_gains.to_array()));
    }

    #[test]
    fn test_exhausted_time_budget_stops_search() {
        let result = PidTuner::new(quick_problem())
            .with_config(quick_config(50))
            .with_seed(1)
            .with_time_budget(Duration::ZERO)
            .tune()
            .unwrap();
        assert_eq!(result.termination, Termination::TimedOut);
        assert_eq!(result.generations_run, 1);
    }

    #[test]
    fn test_observer_can_stop_and_sees_every_generation() {
        let seen = AtomicUsize::new(0);
        let result = PidTuner::new(quick_problem())
            .with_config(quick_config(50))
            .with_seed(5)
            .on_generation(|report| {
                seen.fetch_add(1, Ordering::SeqCst);
                if report.generation == 2 { SearchControl::Stop } else { SearchControl::Continue }
            })
            .tune()
            .unwrap();
        assert_eq!(result.termination, Termination::Stopped);
        assert_eq!(result.generations_run, 3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_custom_optimizer_picks_lowest_cost_candidate() {
        let problem = quick_problem();
        let candidates = vec![[0.0, 0.0, 0.0], [1.0, 0.02, 0.1], [2.0, 0.0, 0.5], [0.3, 0.01, 0.0]];
        let expected = candidates
            .iter()
            .map(|c| (problem.cost(Gains::from_array(*c)).total, *c))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .unwrap();

        let mut optimizer = FixedProposals {
            candidates,
            generations_bred: 0,
        };
        let result = PidTuner::new(problem)
            .with_config(quick_config(3))
            .with_seed(0)
            .tune_with(&mut optimizer)
            .unwrap();
        assert_eq!(result.best_gains.to_array(), expected.1);
        assert_eq!(result.best_cost(), expected.0);
        assert_eq!(result.evaluations, 12);
        // The final generation is scored but never bred from.
        assert_eq!(optimizer.generations_bred, 2);
    }

    #[test]
    fn test_tune_parameters_keeps_environment() {
        let problem = TuningProblem::new(180.0, 0.15, 20.0)
            .unwrap()
            .with_grid(TimeGrid::new(0.0, 30.0, 0.1).unwrap());
        let (result, params) = PidTuner::new(problem)
            .with_config(quick_config(2))
            .with_seed(11)
            .tune_parameters()
            .unwrap();
        assert_eq!(params.gains, result.best_gains);
        assert_eq!(params.setpoint, 180.0);
        assert_eq!(params.decay_rate, 0.15);
        assert_eq!(params.ambient_temp, 20.0);
    }

    #[test]
    fn test_invalid_environment_rejected() {
        assert!(optimize_pid(f64::NAN, 0.1, 25.0).is_err());
        assert!(optimize_pid(200.0, -1.0, 25.0).is_err());
    }
}
