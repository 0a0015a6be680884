// src/tuning/cost.rs - Tracking-quality cost of a simulated trajectory
use serde::{Deserialize, Serialize};

use crate::simulator::trajectory::Trajectory;

/// Cost assigned to runs that cannot be scored: unstable, non-finite or empty.
/// No finite breakdown total can exceed it.
pub const UNSTABLE_COST: f64 = f64::MAX;

/// Relative weight of each cost term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostWeights {
    pub overshoot: f64,
    /// Cost per sample spent outside the settling band
    pub stabilization: f64,
    pub oscillation: f64,
    /// Half-width of the settling band, °C
    pub settling_band: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            overshoot: 10.0,
            stabilization: 10.0,
            oscillation: 5.0,
            settling_band: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub tracking_error: f64,
    pub overshoot_penalty: f64,
    pub stabilization_penalty: f64,
    pub oscillation_penalty: f64,
    pub total: f64,
}

impl CostBreakdown {
    pub fn unstable() -> Self {
        Self {
            tracking_error: UNSTABLE_COST,
            overshoot_penalty: 0.0,
            stabilization_penalty: 0.0,
            oscillation_penalty: 0.0,
            total: UNSTABLE_COST,
        }
    }

    pub fn is_unstable(&self) -> bool {
        self.total >= UNSTABLE_COST
    }
}

#[derive(Debug, Clone, Default)]
pub struct CostEvaluator {
    weights: CostWeights,
}

impl CostEvaluator {
    pub fn new(weights: CostWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &CostWeights {
        &self.weights
    }

    /// Score `trajectory` against `setpoint`. Never fails: anything that cannot be
    /// scored gets [`UNSTABLE_COST`].
    pub fn evaluate(&self, trajectory: &Trajectory, setpoint: f64) -> CostBreakdown {
        if trajectory.is_unstable() || trajectory.is_empty() || !setpoint.is_finite() {
            return CostBreakdown::unstable();
        }

        let mut tracking_error = 0.0;
        let mut overshoot_penalty = 0.0;
        let mut oscillation_penalty = 0.0;
        let mut settled_at = None;
        let mut previous: Option<f64> = None;

        for (index, temperature) in trajectory.temperatures().enumerate() {
            if !temperature.is_finite() {
                return CostBreakdown::unstable();
            }
            let deviation = temperature - setpoint;
            tracking_error += deviation * deviation;
            let overshoot = deviation.max(0.0);
            overshoot_penalty += overshoot * overshoot;
            if settled_at.is_none() && deviation.abs() < self.weights.settling_band {
                settled_at = Some(index);
            }
            if let Some(prev) = previous {
                let delta = temperature - prev;
                oscillation_penalty += delta * delta;
            }
            previous = Some(temperature);
        }

        let settled_at = settled_at.unwrap_or(trajectory.len());
        let stabilization_penalty = self.weights.stabilization * settled_at as f64;
        let total = tracking_error
            + self.weights.overshoot * overshoot_penalty
            + stabilization_penalty
            + self.weights.oscillation * oscillation_penalty;

        if !total.is_finite() {
            return CostBreakdown::unstable();
        }

        CostBreakdown {
            tracking_error,
            overshoot_penalty,
            stabilization_penalty,
            oscillation_penalty,
            total,
        }
    }

    pub fn total(&self, trajectory: &Trajectory, setpoint: f64) -> f64 {
        self.evaluate(trajectory, setpoint).total
    }
}
