// src/tuning/control.rs - Progress reporting and cancellation for long searches
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Cloneable, thread-safe cancellation flag.
///
/// The search checks it between generations, so cancelling never leaves a
/// half-scored population behind.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Returned by a progress observer after each generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchControl {
    Continue,
    Stop,
}

/// Why a search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Ran the full generation budget
    Completed,
    Cancelled,
    TimedOut,
    /// The progress observer asked to stop
    Stopped,
}

/// Snapshot handed to the progress observer after a generation is scored.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    /// Zero-based index of the generation just scored
    pub generation: usize,
    pub best_candidate: [f64; 3],
    /// Best fitness seen in any generation so far
    pub best_fitness: f64,
    /// Best fitness within this generation
    pub generation_best: f64,
    /// Mean over the finite fitness values of this generation
    pub mean_fitness: f64,
    pub elapsed: Duration,
}

pub type ProgressObserver<'a> = Box<dyn FnMut(&GenerationReport) -> SearchControl + Send + 'a>;

/// Stop conditions checked between generations.
#[derive(Debug, Clone, Default)]
pub struct StopConditions {
    pub cancel: Option<CancelToken>,
    pub time_budget: Option<Duration>,
}

impl StopConditions {
    pub(crate) fn check(&self, started: Instant) -> Option<Termination> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Some(Termination::Cancelled);
        }
        if self.time_budget.is_some_and(|budget| started.elapsed() >= budget) {
            return Some(Termination::TimedOut);
        }
        None
    }
}
