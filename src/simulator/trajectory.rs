// src/simulator/trajectory.rs - Sampled output of one simulation run
use serde::{Deserialize, Serialize};

/// One grid point of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the start of the grid
    pub time: f64,
    /// °C
    pub temperature: f64,
    pub error_sum: f64,
    pub prev_error: f64,
    /// Heater output the control law applies at this state
    pub output: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Stability {
    Stable,
    /// Integration produced a non-finite state at `time`; later samples are missing.
    Unstable { time: f64 },
}

/// Time-ordered samples produced by a single integrator invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    samples: Vec<Sample>,
    stability: Stability,
}

impl Trajectory {
    pub(crate) fn new(samples: Vec<Sample>, stability: Stability) -> Self {
        Self { samples, stability }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn stability(&self) -> Stability {
        self.stability
    }

    pub fn is_unstable(&self) -> bool {
        matches!(self.stability, Stability::Unstable { .. })
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.time)
    }

    pub fn temperatures(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.temperature)
    }

    pub fn final_temperature(&self) -> Option<f64> {
        self.samples.last().map(|s| s.temperature)
    }

    pub fn peak_temperature(&self) -> Option<f64> {
        self.temperatures().reduce(f64::max)
    }

    /// Index of the first sample within `band` °C of `setpoint`.
    pub fn settling_index(&self, setpoint: f64, band: f64) -> Option<usize> {
        self.samples
            .iter()
            .position(|s| (s.temperature - setpoint).abs() < band)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(time: f64, temperature: f64) -> Sample {
        Sample {
            time,
            temperature,
            error_sum: 0.0,
            prev_error: 0.0,
            output: 0.0,
        }
    }

    #[test]
    fn test_summary_helpers() {
        let traj = Trajectory::new(
            vec![sample(0.0, 25.0), sample(0.1, 150.0), sample(0.2, 198.0), sample(0.3, 190.0)],
            Stability::Stable,
        );
        assert_eq!(traj.len(), 4);
        assert_eq!(traj.final_temperature(), Some(190.0));
        assert_eq!(traj.peak_temperature(), Some(198.0));
        assert_eq!(traj.settling_index(200.0, 5.0), Some(2));
        assert_eq!(traj.settling_index(300.0, 5.0), None);
        assert!(!traj.is_unstable());
    }

    #[test]
    fn test_empty_trajectory() {
        let traj = Trajectory::new(Vec::new(), Stability::Unstable { time: 0.0 });
        assert!(traj.is_empty());
        assert!(traj.is_unstable());
        assert_eq!(traj.peak_temperature(), None);
    }
}
