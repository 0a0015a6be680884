// src/simulator/mod.rs - Closed-loop hotend simulation on a fixed time grid
pub mod grid;
pub mod integrator;
pub mod trajectory;

use crate::error::Result;
use crate::simulator::grid::TimeGrid;
use crate::simulator::integrator::{DormandPrince, IntegrationOutcome, Tolerances};
use crate::simulator::trajectory::{Sample, Stability, Trajectory};
use crate::thermal::{ParameterSet, SimulationState, ThermalPidModel};

/// One configured simulation: model, solver, grid and initial condition.
///
/// Holds no mutable state, so a single instance can be run any number of times
/// (and from several threads) with identical results.
#[derive(Debug, Clone)]
pub struct Simulator {
    model: ThermalPidModel,
    solver: DormandPrince,
    grid: TimeGrid,
    initial: SimulationState,
}

impl Simulator {
    /// Validates `params` and sets up the default grid, tolerances and initial state.
    pub fn new(params: ParameterSet) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            model: ThermalPidModel::new(params),
            solver: DormandPrince::default(),
            grid: TimeGrid::default(),
            initial: SimulationState::default(),
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
        self.solver = DormandPrince::new(tolerances);
        self
    }

    pub fn params(&self) -> &ParameterSet {
        self.model.params()
    }

    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    pub fn run(&self) -> Trajectory {
        let mut samples = Vec::with_capacity(self.grid.len());
        let report = self.solver.integrate(&self.model, self.initial.to_array(), &self.grid, |_, time, y| {
            let state = SimulationState::from_array(*y);
            samples.push(Sample {
                time,
                temperature: state.temperature,
                error_sum: state.error_sum,
                prev_error: state.prev_error,
                output: self.model.control(&state).output,
            });
        });

        let stability = match report.outcome {
            IntegrationOutcome::Completed => Stability::Stable,
            IntegrationOutcome::Diverged { time } => {
                tracing::warn!(
                    "Simulation numerically unstable at t={:.3}s ({} of {} samples kept)",
                    time,
                    samples.len(),
                    self.grid.len()
                );
                Stability::Unstable { time }
            }
        };
        tracing::trace!(
            "Simulation finished: {} accepted ({} forced) / {} rejected steps",
            report.accepted_steps,
            report.forced_steps,
            report.rejected_steps
        );
        Trajectory::new(samples, stability)
    }
}

/// Run one simulation with an explicit initial state and grid.
pub fn run_simulation(
    params: &ParameterSet,
    initial: &SimulationState,
    grid: &TimeGrid,
) -> Result<Trajectory> {
    Ok(Simulator::new(params.clone())?
        .with_initial_state(*initial)
        .with_grid(*grid)
        .run())
}

/// Run one simulation from the default initial state over the default 0-300 s grid.
pub fn run_default_simulation(params: &ParameterSet) -> Result<Trajectory> {
    Ok(Simulator::new(params.clone())?.run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TunerError;

    #[test]
    fn test_invalid_parameters_rejected_before_run() {
        let params = ParameterSet {
            min_output: 1.0,
            max_output: 0.0,
            ..ParameterSet::default()
        };
        assert!(matches!(
            run_default_simulation(&params),
            Err(TunerError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_first_sample_is_initial_state() {
        let initial = SimulationState {
            temperature: 60.0,
            error_sum: 1.0,
            prev_error: 2.0,
        };
        let grid = TimeGrid::new(0.0, 1.0, 0.1).unwrap();
        let traj = run_simulation(&ParameterSet::default(), &initial, &grid).unwrap();
        let first = traj.samples()[0];
        assert_eq!(first.time, 0.0);
        assert_eq!(first.temperature, 60.0);
        assert_eq!(first.error_sum, 1.0);
        assert_eq!(first.prev_error, 2.0);
        assert_eq!(traj.len(), 11);
    }

    #[test]
    fn test_heater_off_decays_towards_ambient() {
        let params = ParameterSet {
            max_output: 0.0,
            ..ParameterSet::default()
        };
        let initial = SimulationState {
            temperature: 125.0,
            ..SimulationState::default()
        };
        let grid = TimeGrid::new(0.0, 10.0, 0.1).unwrap();
        let traj = run_simulation(&params, &initial, &grid).unwrap();
        // T(t) = 25 + 100 * exp(-0.1 t)
        let expected = 25.0 + 100.0 * (-1.0f64).exp();
        let last = traj.final_temperature().unwrap();
        assert!((last - expected).abs() < 1e-4, "got {}, expected {}", last, expected);
    }
}
