// src/thermal/model.rs - Continuous-time hotend model under PID control
use serde::{Deserialize, Serialize};

use crate::simulator::integrator::OdeSystem;
use crate::thermal::params::ParameterSet;

/// Integrated state of the closed loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    /// °C
    pub temperature: f64,
    /// Integral accumulator of the control law
    pub error_sum: f64,
    /// Last error sample seen by the derivative term
    pub prev_error: f64,
}

impl Default for SimulationState {
    fn default() -> Self {
        Self {
            temperature: 25.0,
            error_sum: 0.0,
            prev_error: 0.0,
        }
    }
}

impl SimulationState {
    pub fn to_array(self) -> [f64; 3] {
        [self.temperature, self.error_sum, self.prev_error]
    }

    pub fn from_array(y: [f64; 3]) -> Self {
        Self {
            temperature: y[0],
            error_sum: y[1],
            prev_error: y[2],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.temperature.is_finite() && self.error_sum.is_finite() && self.prev_error.is_finite()
    }
}

/// Rate of change of each state component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateDerivative {
    pub d_temperature: f64,
    pub d_error_sum: f64,
    pub d_prev_error: f64,
}

impl StateDerivative {
    pub fn to_array(self) -> [f64; 3] {
        [self.d_temperature, self.d_error_sum, self.d_prev_error]
    }
}

/// What the controller did at one state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSignal {
    pub error: f64,
    /// P + I + D before clamping
    pub raw_output: f64,
    /// Output actually fed to the heater
    pub output: f64,
    pub saturated: bool,
    pub safety_cutoff: bool,
}

/// Full result of one model evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelEvaluation {
    pub derivative: StateDerivative,
    pub control: ControlSignal,
}

/// Right-hand side of the thermal/PID differential equations.
///
/// Evaluation is a pure function of the parameter set and the state. Saturation,
/// anti-windup and the safety cutoff are all applied inside a single evaluation.
#[derive(Debug, Clone)]
pub struct ThermalPidModel {
    params: ParameterSet,
}

impl ThermalPidModel {
    pub fn new(params: ParameterSet) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn evaluate(&self, state: &SimulationState) -> ModelEvaluation {
        let p = &self.params;
        let error = p.setpoint - state.temperature;

        let mut error_sum = state.error_sum;
        let proportional = p.gains.kp * error;
        let integral = p.gains.ki * error_sum;
        let derivative = p.gains.kd * (error - state.prev_error);
        let raw_output = proportional + integral + derivative;

        // Anti-windup: the corrected accumulator feeds the returned rate below.
        let mut output = raw_output;
        let mut saturated = false;
        if output > p.max_output {
            output = p.max_output;
            error_sum -= p.gains.ki * error;
            saturated = true;
        } else if output < p.min_output {
            output = p.min_output;
            error_sum -= p.gains.ki * error;
            saturated = true;
        }

        let safety_cutoff = state.temperature > p.max_temperature;
        if safety_cutoff {
            output = 0.0;
        }

        let heat_transfer = p.efficiency * output;
        let cooling = p.decay_rate * (state.temperature - p.ambient_temp);

        ModelEvaluation {
            derivative: StateDerivative {
                d_temperature: heat_transfer - cooling,
                d_error_sum: error_sum + error,
                d_prev_error: error,
            },
            control: ControlSignal {
                error,
                raw_output,
                output,
                saturated,
                safety_cutoff,
            },
        }
    }

    pub fn derivative(&self, state: &SimulationState) -> StateDerivative {
        self.evaluate(state).derivative
    }

    pub fn control(&self, state: &SimulationState) -> ControlSignal {
        self.evaluate(state).control
    }
}

impl OdeSystem<3> for ThermalPidModel {
    fn rhs(&self, _t: f64, y: &[f64; 3]) -> [f64; 3] {
        self.derivative(&SimulationState::from_array(*y)).to_array()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thermal::params::Gains;

    fn model_with(gains: Gains) -> ThermalPidModel {
        ThermalPidModel::new(ParameterSet::default().with_gains(gains))
    }

    #[test]
    fn test_unsaturated_derivative() {
        // e = 200 - 190 = 10 -> P = 1, I = 0.5, D = 0.1 * (10 - 4) = 0.6
        let model = model_with(Gains::new(0.1, 0.05, 0.1));
        let state = SimulationState {
            temperature: 190.0,
            error_sum: 10.0,
            prev_error: 4.0,
        };
        let eval = model.evaluate(&state);
        assert!(!eval.control.saturated);
        assert!((eval.control.output - 2.1).abs() < 1e-12);
        let expected_dt = 0.2 * 2.1 - 0.1 * (190.0 - 25.0);
        assert!((eval.derivative.d_temperature - expected_dt).abs() < 1e-12);
        assert_eq!(eval.derivative.d_error_sum, 10.0 + 10.0);
        assert_eq!(eval.derivative.d_prev_error, 10.0);
    }

    #[test]
    fn test_upper_saturation_applies_anti_windup() {
        let model = model_with(Gains::default());
        let state = SimulationState::default();
        let eval = model.evaluate(&state);
        // e = 175, raw = 175 + 0 + 17.5
        assert!((eval.control.raw_output - 192.5).abs() < 1e-12);
        assert_eq!(eval.control.output, 100.0);
        assert!(eval.control.saturated);
        // error_sum corrected to 0 - 0.02 * 175 before being returned
        assert!((eval.derivative.d_error_sum - (-3.5 + 175.0)).abs() < 1e-12);
        assert!((eval.derivative.d_temperature - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_lower_saturation_applies_anti_windup() {
        let model = ThermalPidModel::new(ParameterSet::default().with_setpoint(0.0));
        let eval = model.evaluate(&SimulationState::default());
        assert_eq!(eval.control.output, 0.0);
        assert!(eval.control.saturated);
        // e = -25: error_sum = 0 - 0.02 * -25 = 0.5
        assert!((eval.derivative.d_error_sum - (0.5 - 25.0)).abs() < 1e-12);
        assert_eq!(eval.derivative.d_temperature, 0.0);
    }

    #[test]
    fn test_safety_cutoff_overrides_pid() {
        let params = ParameterSet {
            max_temperature: 150.0,
            ..ParameterSet::default()
        };
        let model = ThermalPidModel::new(params);
        let state = SimulationState {
            temperature: 151.0,
            error_sum: 1000.0,
            prev_error: 0.0,
        };
        let eval = model.evaluate(&state);
        assert!(eval.control.safety_cutoff);
        assert_eq!(eval.control.output, 0.0);
        assert!((eval.derivative.d_temperature + 0.1 * (151.0 - 25.0)).abs() < 1e-12);
    }

    #[test]
    fn test_ode_rhs_matches_derivative() {
        let model = model_with(Gains::new(0.3, 0.01, 0.05));
        let state = SimulationState {
            temperature: 80.0,
            error_sum: -12.0,
            prev_error: 3.0,
        };
        assert_eq!(model.rhs(0.0, &state.to_array()), model.derivative(&state).to_array());
    }
}
