// src/simulator/integrator.rs - Adaptive Dormand-Prince 5(4) solver reporting on a fixed grid
//!
//! The solver picks its own internal step size from an embedded error estimate but
//! never steps across a grid point, so every reported sample sits exactly on the
//! requested time. Runs are deterministic: the step sequence depends only on the
//! system, the initial state, the grid and the tolerances.

use serde::{Deserialize, Serialize};

use crate::simulator::grid::TimeGrid;

/// A first-order system `y' = f(t, y)` with `N` state components.
pub trait OdeSystem<const N: usize> {
    fn rhs(&self, t: f64, y: &[f64; N]) -> [f64; N];
}

/// Step-size control settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    pub rtol: f64,
    pub atol: f64,
    /// Smallest step the controller will shrink to; steps at this size are
    /// accepted whatever their error estimate.
    pub min_step: f64,
    /// Adaptive step attempts for one run. Past this the run finishes with one
    /// step per grid interval.
    pub max_steps: usize,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-9,
            min_step: 1e-10,
            max_steps: 1_000_000,
        }
    }
}

/// How an integration run ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntegrationOutcome {
    Completed,
    /// The state stopped being finite at `time`.
    Diverged { time: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationReport {
    pub outcome: IntegrationOutcome,
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    /// Accepted steps whose error estimate exceeded the tolerance
    pub forced_steps: usize,
    /// `max_steps` ran out and the rest of the grid was covered at the grid spacing
    pub budget_exhausted: bool,
}

// Dormand-Prince tableau
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;
// 5th order weights (also the last stage row, FSAL)
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;
// 5th minus embedded 4th order weights
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 5.0;

/// Explicit embedded Runge-Kutta 5(4) with first-same-as-last stages.
#[derive(Debug, Clone, Default)]
pub struct DormandPrince {
    tolerances: Tolerances,
}

struct StepResult<const N: usize> {
    y: [f64; N],
    k_last: [f64; N],
    error: f64,
}

impl DormandPrince {
    pub fn new(tolerances: Tolerances) -> Self {
        Self { tolerances }
    }

    pub fn tolerances(&self) -> &Tolerances {
        &self.tolerances
    }

    /// Integrate `system` from `y0` across `grid`.
    ///
    /// `observe` is called once per grid point reached, in order, starting with
    /// index 0 and `y0`. Only finite states are ever observed. The run is declared
    /// diverged only when the state (or a stage of the smallest allowed step) stops
    /// being finite; the remaining grid points are then skipped.
    ///
    /// A finite run always reaches the end of the grid. Steps that would have to
    /// shrink below `min_step` are taken at `min_step` regardless of the error
    /// estimate, and once `max_steps` attempts are used up every remaining step is
    /// taken at the grid spacing. Both count as forced steps in the report.
    pub fn integrate<S, F, const N: usize>(
        &self,
        system: &S,
        y0: [f64; N],
        grid: &TimeGrid,
        mut observe: F,
    ) -> IntegrationReport
    where
        S: OdeSystem<N>,
        F: FnMut(usize, f64, &[f64; N]),
    {
        let tol = &self.tolerances;
        let mut report = IntegrationReport {
            outcome: IntegrationOutcome::Completed,
            accepted_steps: 0,
            rejected_steps: 0,
            forced_steps: 0,
            budget_exhausted: false,
        };

        let mut t = grid.start();
        let mut y = y0;
        if !all_finite(&y) {
            report.outcome = IntegrationOutcome::Diverged { time: t };
            return report;
        }
        observe(0, t, &y);

        let mut k1 = system.rhs(t, &y);
        if !all_finite(&k1) {
            report.outcome = IntegrationOutcome::Diverged { time: t };
            return report;
        }
        let mut h = grid.step();

        for index in 1..grid.len() {
            let target = grid.time(index);
            while t < target {
                if !report.budget_exhausted && report.accepted_steps + report.rejected_steps >= tol.max_steps {
                    tracing::warn!(
                        "Step budget of {} used up at t={:.3}s, finishing at the grid spacing",
                        tol.max_steps,
                        t
                    );
                    report.budget_exhausted = true;
                    h = grid.step();
                }

                let remaining = target - t;
                let shortened = h >= remaining;
                let h_step = if shortened { remaining } else { h };
                let at_floor = h_step <= tol.min_step;
                let step = self.attempt(system, t, &y, &k1, h_step);

                if !(all_finite(&step.y) && all_finite(&step.k_last)) {
                    if at_floor {
                        report.outcome = IntegrationOutcome::Diverged { time: t };
                        return report;
                    }
                    h = (h_step * MIN_FACTOR).max(tol.min_step);
                    report.rejected_steps += 1;
                    continue;
                }

                let within_tolerance = step.error.is_finite() && step.error <= 1.0;
                if within_tolerance || at_floor || report.budget_exhausted {
                    if !within_tolerance {
                        report.forced_steps += 1;
                    }
                    t = if shortened { target } else { t + h_step };
                    y = step.y;
                    k1 = step.k_last;
                    report.accepted_steps += 1;
                    h = if report.budget_exhausted {
                        grid.step()
                    } else {
                        let proposal = h_step * step_factor(step.error);
                        (if shortened { proposal.max(h) } else { proposal }).max(tol.min_step)
                    };
                    continue;
                }

                h = (h_step * step_factor(step.error).min(1.0)).max(tol.min_step);
                report.rejected_steps += 1;
            }
            observe(index, t, &y);
        }

        report
    }

    fn attempt<S, const N: usize>(
        &self,
        system: &S,
        t: f64,
        y: &[f64; N],
        k1: &[f64; N],
        h: f64,
    ) -> StepResult<N>
    where
        S: OdeSystem<N>,
    {
        let k2 = system.rhs(t + C2 * h, &stage_state(y, h, &[(A21, k1)]));
        let k3 = system.rhs(t + C3 * h, &stage_state(y, h, &[(A31, k1), (A32, &k2)]));
        let k4 = system.rhs(t + C4 * h, &stage_state(y, h, &[(A41, k1), (A42, &k2), (A43, &k3)]));
        let k5 = system.rhs(
            t + C5 * h,
            &stage_state(y, h, &[(A51, k1), (A52, &k2), (A53, &k3), (A54, &k4)]),
        );
        let k6 = system.rhs(
            t + h,
            &stage_state(y, h, &[(A61, k1), (A62, &k2), (A63, &k3), (A64, &k4), (A65, &k5)]),
        );
        let y_new = stage_state(y, h, &[(B1, k1), (B3, &k3), (B4, &k4), (B5, &k5), (B6, &k6)]);
        let k7 = system.rhs(t + h, &y_new);

        let mut sum_sq = 0.0;
        for i in 0..N {
            let err_i = h * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i] + E7 * k7[i]);
            let scale = self.tolerances.atol + self.tolerances.rtol * y[i].abs().max(y_new[i].abs());
            sum_sq += (err_i / scale).powi(2);
        }

        StepResult {
            y: y_new,
            k_last: k7,
            error: (sum_sq / N as f64).sqrt(),
        }
    }
}

fn stage_state<const N: usize>(y: &[f64; N], h: f64, weights: &[(f64, &[f64; N])]) -> [f64; N] {
    let mut out = *y;
    for (i, value) in out.iter_mut().enumerate() {
        let increment: f64 = weights.iter().map(|(w, k)| w * k[i]).sum();
        *value += h * increment;
    }
    out
}

fn step_factor(error: f64) -> f64 {
    if !error.is_finite() {
        return MIN_FACTOR;
    }
    if error == 0.0 {
        return MAX_FACTOR;
    }
    (SAFETY * error.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
}

fn all_finite<const N: usize>(values: &[f64; N]) -> bool {
    values.iter().all(|v| v.is_finite())
}
