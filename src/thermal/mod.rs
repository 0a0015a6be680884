// src/thermal/mod.rs - Hotend thermal plant and its PID control law
pub mod model;
pub mod params;

pub use model::{ControlSignal, ModelEvaluation, SimulationState, StateDerivative, ThermalPidModel};
pub use params::{Gains, ParameterSet};
