//! Hotend PID simulation and automatic gain tuning.
//!
//! - [`thermal`]: the lumped heat-balance plant with its PID control law
//! - [`simulator`]: adaptive integration of the closed loop onto a fixed time grid
//! - [`tuning`]: trajectory cost and a seeded genetic search over `(Kp, Ki, Kd)`
//! - [`config`]: TOML configuration for all of the above

pub mod config;
pub mod error;
pub mod simulator;
pub mod thermal;
pub mod tuning;

pub use error::{Result, TunerError};
pub use simulator::grid::TimeGrid;
pub use simulator::trajectory::{Sample, Stability, Trajectory};
pub use simulator::{Simulator, run_default_simulation, run_simulation};
pub use thermal::{Gains, ParameterSet, SimulationState, ThermalPidModel};
pub use tuning::control::{CancelToken, SearchControl, Termination};
pub use tuning::cost::{CostBreakdown, CostEvaluator, UNSTABLE_COST};
pub use tuning::{OptimizationResult, PidTuner, TuningProblem, optimize_pid};
