// src/thermal/params.rs - Immutable configuration for one simulation run
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TunerError};

/// PID gains, in the order the search space uses them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Gains {
    pub const fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.kp, self.ki, self.kd]
    }

    pub fn from_array(values: [f64; 3]) -> Self {
        Self::new(values[0], values[1], values[2])
    }
}

impl Default for Gains {
    fn default() -> Self {
        Self::new(1.0, 0.02, 0.1)
    }
}

impl fmt::Display for Gains {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kp = {:.2}, Ki = {:.2}, Kd = {:.2}", self.kp, self.ki, self.kd)
    }
}

/// Everything the thermal/PID model needs for one run.
///
/// Build one per run and treat it as read-only; `validate` must pass before the
/// simulator accepts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub gains: Gains,
    /// Fraction of heat lost per second per degree above ambient.
    pub decay_rate: f64,
    /// Degrees per second gained per unit of heater output.
    pub efficiency: f64,
    /// °C
    pub ambient_temp: f64,
    /// °C
    pub setpoint: f64,
    pub max_output: f64,
    pub min_output: f64,
    /// Safety ceiling (°C); above it the heater output is forced to zero.
    pub max_temperature: f64,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            gains: Gains::default(),
            decay_rate: 0.1,
            efficiency: 0.2,
            ambient_temp: 25.0,
            setpoint: 200.0,
            max_output: 100.0,
            min_output: 0.0,
            max_temperature: 300.0,
        }
    }
}

impl ParameterSet {
    /// Copy of this set with different gains, the environment left untouched.
    pub fn with_gains(&self, gains: Gains) -> Self {
        Self {
            gains,
            ..self.clone()
        }
    }

    pub fn with_setpoint(&self, setpoint: f64) -> Self {
        Self {
            setpoint,
            ..self.clone()
        }
    }

    /// Check the structural invariants of the set.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("kp", self.gains.kp),
            ("ki", self.gains.ki),
            ("kd", self.gains.kd),
            ("decay_rate", self.decay_rate),
            ("efficiency", self.efficiency),
            ("ambient_temp", self.ambient_temp),
            ("setpoint", self.setpoint),
            ("max_output", self.max_output),
            ("min_output", self.min_output),
            ("max_temperature", self.max_temperature),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(TunerError::invalid(format!("{} must be finite, got {}", name, value)));
        }
        if self.min_output > self.max_output {
            return Err(TunerError::invalid(format!(
                "min_output ({}) must not exceed max_output ({})",
                self.min_output, self.max_output
            )));
        }
        if self.decay_rate < 0.0 {
            return Err(TunerError::invalid("decay_rate must be >= 0"));
        }
        if self.efficiency < 0.0 {
            return Err(TunerError::invalid("efficiency must be >= 0"));
        }
        Ok(())
    }
}
