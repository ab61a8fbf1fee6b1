//! Pluggable solver backend interface.
//!
//! The engine depends only on this trait; the bundled backend in
//! [`crate::solver`] is the default implementation. A host wiring in a
//! different CP solver implements [`CpBackend`] and hands it to the driver.

use std::time::Duration;

use rosterforge_core::{EmpIdx, RosterScore};

use crate::cancellation::CancellationToken;
use crate::model::{CpModel, VarId};

/// Search limits for one backend invocation.
#[derive(Debug, Clone)]
pub struct SearchLimits {
    pub time_limit: Duration,
    /// Parallel search workers. The driver adapts this to problem size.
    pub workers: usize,
    pub seed: u64,
    /// Local-search step budget per worker; `None` lets the backend choose.
    pub max_steps: Option<u64>,
}

impl Default for SearchLimits {
    fn default() -> Self {
        SearchLimits {
            time_limit: Duration::from_secs(30),
            workers: 1,
            seed: 0,
            max_steps: None,
        }
    }
}

/// Backend status classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpStatus {
    /// Search converged before its limits.
    Optimal,
    /// A solution was found but the search was cut short.
    Feasible,
    /// No assignment can satisfy the hard clauses.
    Infeasible,
    /// No conclusion (cancelled before a solution, or empty search).
    Unknown,
}

/// Search statistics for the solver-run metadata.
#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    pub steps: u64,
    pub moves_evaluated: u64,
    pub moves_accepted: u64,
    pub duration: Duration,
    pub workers: usize,
}

/// Outcome of one backend invocation.
#[derive(Debug, Clone)]
pub struct CpOutcome {
    pub status: CpStatus,
    /// Chosen variable per slot, `None` for uncovered slots.
    pub chosen: Vec<Option<VarId>>,
    /// Decoded rotation offsets for `solver_optimized` employees:
    /// `(employee, offset, misaligned assignments)`.
    pub offsets: Vec<(EmpIdx, u32, u32)>,
    pub score: RosterScore,
    pub stats: SearchStats,
}

impl CpOutcome {
    /// An empty outcome for models with no variables.
    pub fn empty(model: &CpModel, status: CpStatus) -> Self {
        CpOutcome {
            status,
            chosen: vec![None; model.slot_count()],
            offsets: Vec::new(),
            score: RosterScore::ZERO,
            stats: SearchStats::default(),
        }
    }
}

/// A constraint-programming solver capability.
pub trait CpBackend: Send + Sync {
    /// Solves `model` within `limits`, polling `cancel` between steps.
    fn solve(&self, model: &CpModel, limits: &SearchLimits, cancel: &CancellationToken)
        -> CpOutcome;
}
