// src/simulator/grid.rs - Fixed sampling grid the integrator reports on
use crate::error::{Result, TunerError};

/// Upper bound on grid points; one `Sample` is kept per point.
pub const MAX_GRID_POINTS: usize = 10_000_000;

/// Inclusive, evenly spaced time grid in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeGrid {
    start: f64,
    end: f64,
    step: f64,
    len: usize,
}

impl Default for TimeGrid {
    /// 0 to 300 s at 0.1 s: 3001 points.
    fn default() -> Self {
        Self {
            start: 0.0,
            end: 300.0,
            step: 0.1,
            len: 3001,
        }
    }
}

impl TimeGrid {
    pub fn new(start: f64, end: f64, step: f64) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() || !step.is_finite() {
            return Err(TunerError::invalid("time grid bounds must be finite"));
        }
        if step <= 0.0 {
            return Err(TunerError::invalid(format!("time step must be > 0, got {}", step)));
        }
        if end < start {
            return Err(TunerError::invalid(format!(
                "time grid end ({}) is before start ({})",
                end, start
            )));
        }
        // Consecutive grid times must stay distinct at the grid's largest magnitude.
        if step <= 16.0 * f64::EPSILON * start.abs().max(end.abs()) {
            return Err(TunerError::invalid(format!(
                "time step {} is too small to resolve times near {}",
                step,
                start.abs().max(end.abs())
            )));
        }
        // Tolerate the usual decimal step representation error (300 / 0.1 != 3000).
        let intervals = ((end - start) / step + 1e-9).floor();
        if !intervals.is_finite() || intervals >= MAX_GRID_POINTS as f64 {
            return Err(TunerError::invalid(format!(
                "time grid {}..{} at step {} exceeds {} points",
                start, end, step, MAX_GRID_POINTS
            )));
        }
        Ok(Self {
            start,
            end,
            step,
            len: intervals as usize + 1,
        })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// A grid always holds at least its start point.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn time(&self, index: usize) -> f64 {
        self.start + index as f64 * self.step
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len).map(move |i| self.time(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_has_3001_points() {
        let grid = TimeGrid::default();
        assert_eq!(grid.len(), 3001);
        assert_eq!(grid.time(0), 0.0);
        assert!((grid.time(3000) - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_new_matches_default() {
        let grid = TimeGrid::new(0.0, 300.0, 0.1).unwrap();
        assert_eq!(grid.len(), TimeGrid::default().len());
    }

    #[test]
    fn test_degenerate_grid_is_single_point() {
        let grid = TimeGrid::new(5.0, 5.0, 0.5).unwrap();
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.times().collect::<Vec<_>>(), vec![5.0]);
    }

    #[test]
    fn test_partial_last_interval_is_dropped() {
        let grid = TimeGrid::new(0.0, 1.05, 0.1).unwrap();
        assert_eq!(grid.len(), 11);
    }

    #[test]
    fn test_invalid_grids_rejected() {
        assert!(TimeGrid::new(0.0, 10.0, 0.0).is_err());
        assert!(TimeGrid::new(0.0, 10.0, -1.0).is_err());
        assert!(TimeGrid::new(10.0, 0.0, 0.1).is_err());
        assert!(TimeGrid::new(0.0, f64::INFINITY, 0.1).is_err());
    }

    #[test]
    fn test_oversized_grids_rejected() {
        assert!(TimeGrid::new(0.0, 1e30, 0.1).is_err());
        assert!(TimeGrid::new(0.0, f64::MAX, 1e-300).is_err());
        assert!(TimeGrid::new(0.0, 1e7, 0.1).is_err());
        let largest = TimeGrid::new(0.0, (MAX_GRID_POINTS - 1) as f64, 1.0).unwrap();
        assert_eq!(largest.len(), MAX_GRID_POINTS);
    }

    #[test]
    fn test_unresolvable_step_rejected() {
        // 1e-3 is below one ulp at 1e15, so the grid times would repeat.
        assert!(TimeGrid::new(1e15, 1e15 + 1.0, 1e-3).is_err());
        assert!(TimeGrid::new(-1e15, -1e15 + 1.0, 1e-3).is_err());
        assert!(TimeGrid::new(1e6, 1e6 + 1.0, 1e-3).is_ok());
    }

    #[test]
    fn test_times_strictly_increasing() {
        let grid = TimeGrid::default();
        let times: Vec<f64> = grid.times().collect();
        assert!(times.windows(2).all(|w| w[1] > w[0]));
    }
}
