//! RosterForge Engine - workforce rostering over a CP model
//!
//! One pure entry point, [`solve`], takes a validated [`Problem`] to a
//! canonical [`RosterResult`]: resource gate, pattern probes, ICPMP
//! preprocessing, slot building, constraint model assembly, the CP solve
//! (with strict-ratio autotuning and the persistent ratio cache), hour
//! accounting and result assembly. [`estimate_complexity`] probes problem
//! size without side effects; [`validate_pattern`] is the fast feasibility
//! probe. Incremental re-solves treat earlier assignments as immutable.

pub mod constraints;
pub mod driver;
pub mod gate;
pub mod hours;
pub mod icpmp;
pub mod incremental;
pub mod result;
pub mod slots;

use rosterforge_core::domain::Problem;
use rosterforge_core::{ComplexityReport, Hours, Result, Scheme, WorkPattern};
use rosterforge_cp::CancellationToken;

pub use driver::SolverOptions;
pub use gate::ServerCapacity;
pub use result::{RosterResult, SolveStatus};

/// Solves a rostering problem with explicit options and cancellation.
pub fn solve(
    problem: &Problem,
    options: &SolverOptions,
    cancel: &CancellationToken,
) -> Result<RosterResult> {
    driver::solve(problem, options, cancel)
}

/// Estimates problem complexity against this host's capacity. Pure.
pub fn estimate_complexity(problem: &Problem) -> ComplexityReport {
    gate::estimate_complexity(problem, &ServerCapacity::detect())
}

/// Estimates problem complexity against an explicit capacity. Pure.
pub fn estimate_complexity_with(
    problem: &Problem,
    capacity: &ServerCapacity,
) -> ComplexityReport {
    gate::estimate_complexity(problem, capacity)
}

/// Validates a work pattern against a scheme's caps.
pub fn validate_pattern(
    pattern: &WorkPattern,
    scheme: Scheme,
    shift_hours: Option<f64>,
) -> rosterforge_core::PatternValidationResult {
    rosterforge_core::pattern::validate_pattern(
        pattern,
        scheme,
        shift_hours.map(Hours::from_f64),
        false,
    )
}
