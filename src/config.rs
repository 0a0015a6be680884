//! # Tuner Configuration
//!
//! Plant, controller, simulation and search settings, loaded from a single TOML file.
//! Every field has a default, so an empty file (or no file) is a valid configuration.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [plant]
//! decay_rate = 0.1
//! efficiency = 0.2
//! ambient_temp = 25.0
//!
//! [controller]
//! kp = 1.0
//! ki = 0.02
//! kd = 0.1
//! setpoint = 200.0
//!
//! [simulation]
//! end_time = 300.0
//! time_step = 0.1
//!
//! [tuning]
//! population_size = 50
//! generations = 200
//! seed = 42
//! kp_range = [0.0, 2.0]
//! ```
//!
//! Individual values can be overridden with dotted keys (`tuning.seed=7`), see
//! [`Config::apply_override`].

// src/config.rs - Single configuration file
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::simulator::grid::TimeGrid;
use crate::simulator::integrator::Tolerances;
use crate::thermal::{Gains, ParameterSet, SimulationState};
use crate::tuning::TunerConfig;
use crate::tuning::genetic::GeneticConfig;
use crate::tuning::search::SearchSpace;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the plant, controller, simulation grid and gain search.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub plant: PlantConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub tuning: TuningConfig,
}

/// Thermal behaviour of the heated block.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlantConfig {
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
    #[serde(default = "default_efficiency")]
    pub efficiency: f64,
    #[serde(default = "default_ambient_temp")]
    pub ambient_temp: f64,
    #[serde(default = "default_max_temperature")]
    pub max_temperature: f64,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            decay_rate: default_decay_rate(),
            efficiency: default_efficiency(),
            ambient_temp: default_ambient_temp(),
            max_temperature: default_max_temperature(),
        }
    }
}

/// PID gains, target and actuator range.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    #[serde(default = "default_kp")]
    pub kp: f64,
    #[serde(default = "default_ki")]
    pub ki: f64,
    #[serde(default = "default_kd")]
    pub kd: f64,
    #[serde(default = "default_setpoint")]
    pub setpoint: f64,
    #[serde(default = "default_max_output")]
    pub max_output: f64,
    #[serde(default)]
    pub min_output: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            kp: default_kp(),
            ki: default_ki(),
            kd: default_kd(),
            setpoint: default_setpoint(),
            max_output: default_max_output(),
            min_output: 0.0,
        }
    }
}

/// Time grid, initial temperature and solver tolerances.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    #[serde(default)]
    pub start_time: f64,
    #[serde(default = "default_end_time")]
    pub end_time: f64,
    #[serde(default = "default_time_step")]
    pub time_step: f64,
    #[serde(default = "default_initial_temperature")]
    pub initial_temperature: f64,
    #[serde(default = "default_rtol")]
    pub rtol: f64,
    #[serde(default = "default_atol")]
    pub atol: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            end_time: default_end_time(),
            time_step: default_time_step(),
            initial_temperature: default_initial_temperature(),
            rtol: default_rtol(),
            atol: default_atol(),
        }
    }
}

/// Gain search settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TuningConfig {
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    #[serde(default = "default_generations")]
    pub generations: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_tournament_size")]
    pub tournament_size: usize,
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,
    #[serde(default = "default_mutation_span")]
    pub mutation_span: f64,
    #[serde(default = "default_elitism")]
    pub elitism: usize,
    /// Wall-clock limit in seconds
    #[serde(default)]
    pub time_budget_secs: Option<f64>,
    #[serde(default = "default_kp_range")]
    pub kp_range: [f64; 2],
    #[serde(default = "default_ki_range")]
    pub ki_range: [f64; 2],
    #[serde(default = "default_kd_range")]
    pub kd_range: [f64; 2],
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            generations: default_generations(),
            seed: None,
            tournament_size: default_tournament_size(),
            crossover_rate: default_crossover_rate(),
            mutation_rate: default_mutation_rate(),
            mutation_span: default_mutation_span(),
            elitism: default_elitism(),
            time_budget_secs: None,
            kp_range: default_kp_range(),
            ki_range: default_ki_range(),
            kd_range: default_kd_range(),
        }
    }
}

impl Config {
    pub fn parameter_set(&self) -> ParameterSet {
        ParameterSet {
            gains: Gains::new(self.controller.kp, self.controller.ki, self.controller.kd),
            decay_rate: self.plant.decay_rate,
            efficiency: self.plant.efficiency,
            ambient_temp: self.plant.ambient_temp,
            setpoint: self.controller.setpoint,
            max_output: self.controller.max_output,
            min_output: self.controller.min_output,
            max_temperature: self.plant.max_temperature,
        }
    }

    pub fn time_grid(&self) -> Result<TimeGrid, ConfigError> {
        let sim = &self.simulation;
        TimeGrid::new(sim.start_time, sim.end_time, sim.time_step).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn initial_state(&self) -> SimulationState {
        SimulationState {
            temperature: self.simulation.initial_temperature,
            ..SimulationState::default()
        }
    }

    pub fn tolerances(&self) -> Tolerances {
        Tolerances {
            rtol: self.simulation.rtol,
            atol: self.simulation.atol,
            ..Tolerances::default()
        }
    }

    pub fn tuner_config(&self) -> Result<TunerConfig, ConfigError> {
        let tuning = &self.tuning;
        let space = SearchSpace::new(
            [tuning.kp_range[0], tuning.ki_range[0], tuning.kd_range[0]],
            [tuning.kp_range[1], tuning.ki_range[1], tuning.kd_range[1]],
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let genetic = GeneticConfig {
            population_size: tuning.population_size,
            tournament_size: tuning.tournament_size,
            crossover_rate: tuning.crossover_rate,
            mutation_rate: tuning.mutation_rate,
            mutation_span: tuning.mutation_span,
            elitism: tuning.elitism,
        };
        genetic.validate().map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if tuning.generations == 0 {
            return Err(ConfigError::Invalid("tuning.generations must be at least 1".to_string()));
        }
        // TOML integers are signed 64-bit
        if tuning.seed.is_some_and(|seed| seed > i64::MAX as u64) {
            return Err(ConfigError::Invalid(format!("tuning.seed must be at most {}", i64::MAX)));
        }
        let time_budget = match tuning.time_budget_secs {
            Some(secs) if !(secs.is_finite() && secs >= 0.0) => {
                return Err(ConfigError::Invalid(format!(
                    "tuning.time_budget_secs must be a non-negative number, got {}",
                    secs
                )));
            }
            Some(secs) => Some(Duration::from_secs_f64(secs)),
            None => None,
        };
        Ok(TunerConfig {
            generations: tuning.generations,
            seed: tuning.seed,
            space,
            genetic,
            time_budget,
        })
    }

    /// Validate the whole configuration (parameters, grid, tolerances, search).
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parameter_set()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.time_grid()?;
        if !self.simulation.initial_temperature.is_finite() {
            return Err(ConfigError::Invalid("simulation.initial_temperature must be finite".to_string()));
        }
        let tol = self.tolerances();
        if !(tol.rtol > 0.0 && tol.atol > 0.0) {
            return Err(ConfigError::Invalid("simulation.rtol and simulation.atol must be > 0".to_string()));
        }
        self.tuner_config()?;
        Ok(())
    }

    /// Set one value by dotted key path, e.g. `apply_override("tuning.seed", "7")`.
    ///
    /// The value is parsed as a TOML value (so `7`, `0.5`, `[0.0, 1.0]` keep their
    /// types) and falls back to a plain string.
    pub fn apply_override(&mut self, key: &str, raw: &str) -> Result<(), ConfigError> {
        let mut root = toml::Value::try_from(&*self)?;
        let mut path: Vec<&str> = key.split('.').collect();
        let Some(leaf) = path.pop().filter(|leaf| !leaf.is_empty()) else {
            return Err(ConfigError::Invalid(format!("empty override key '{}'", key)));
        };

        let mut table = root
            .as_table_mut()
            .ok_or_else(|| ConfigError::Invalid("configuration root is not a table".to_string()))?;
        for section in path {
            table = table
                .get_mut(section)
                .and_then(toml::Value::as_table_mut)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown configuration section '{}' in '{}'", section, key)))?;
        }
        table.insert(leaf.to_string(), parse_override_value(raw));

        *self = root.try_into()?;
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn parse_override_value(raw: &str) -> toml::Value {
    toml::from_str::<toml::Table>(&format!("value = {}", raw))
        .ok()
        .and_then(|mut table| table.remove("value"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

// Default value functions
fn default_decay_rate() -> f64 { 0.1 }
fn default_efficiency() -> f64 { 0.2 }
fn default_ambient_temp() -> f64 { 25.0 }
fn default_max_temperature() -> f64 { 300.0 }
fn default_kp() -> f64 { 1.0 }
fn default_ki() -> f64 { 0.02 }
fn default_kd() -> f64 { 0.1 }
fn default_setpoint() -> f64 { 200.0 }
fn default_max_output() -> f64 { 100.0 }
fn default_end_time() -> f64 { 300.0 }
fn default_time_step() -> f64 { 0.1 }
fn default_initial_temperature() -> f64 { 25.0 }
fn default_rtol() -> f64 { 1e-6 }
fn default_atol() -> f64 { 1e-9 }
fn default_population_size() -> usize { 50 }
fn default_generations() -> usize { 200 }
fn default_tournament_size() -> usize { 3 }
fn default_crossover_rate() -> f64 { 0.9 }
fn default_mutation_rate() -> f64 { 0.2 }
fn default_mutation_span() -> f64 { 0.1 }
fn default_elitism() -> usize { 2 }
fn default_kp_range() -> [f64; 2] { [0.0, 2.0] }
fn default_ki_range() -> [f64; 2] { [0.0, 0.05] }
fn default_kd_range() -> [f64; 2] { [0.0, 0.5] }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            Err(ConfigError::Io(e))
        }
    }
}
