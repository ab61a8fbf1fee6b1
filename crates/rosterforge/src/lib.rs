//! RosterForge - A Workforce Rostering Engine in Rust
//!
//! RosterForge maps monthly shift demand onto employees under labor-law and
//! operational constraints: regulatory hour caps, rest periods,
//! qualifications, rotation patterns and employment schemes. One pure call
//! takes a problem document to a canonical result document.
//!
//! # Quick Start
//!
//! ```no_run
//! use rosterforge::prelude::*;
//!
//! let doc = std::fs::read_to_string("problem.json").unwrap();
//! let problem = Problem::from_json(&doc).unwrap();
//!
//! let report = rosterforge::estimate_complexity(&problem);
//! assert!(report.can_solve);
//!
//! let result = rosterforge::solve(
//!     &problem,
//!     &SolverOptions::default(),
//!     &CancellationToken::new(),
//! )
//! .unwrap();
//! println!("{}", result.to_json());
//! ```

// =============================================================================
// Core types (domain modeling)
// =============================================================================

pub use rosterforge_core::{
    domain::Problem,
    pattern::{PatternValidationResult, WorkPattern},
    CapacityTier, ComplexityReport, DateRange, EngineError, Gender, HourBreakdown, Hours,
    RosterScore, Scheme,
};

// =============================================================================
// Engine (high-level API)
// =============================================================================

pub use rosterforge_engine::{
    estimate_complexity, estimate_complexity_with, solve, validate_pattern, RosterResult,
    ServerCapacity, SolveStatus, SolverOptions,
};

// =============================================================================
// CP backend (for hosts wiring in their own solver)
// =============================================================================

pub use rosterforge_cp::{
    BundledSolver, CancellationToken, CpBackend, CpModel, CpOutcome, CpStatus, SearchLimits,
};

// =============================================================================
// Ratio cache
// =============================================================================

pub use rosterforge_cache::{pattern_hash, RatioCache};

// =============================================================================
// Prelude
// =============================================================================

/// Prelude module for convenient imports.
pub mod prelude {
    pub use super::{
        CancellationToken, EngineError, Problem, RosterResult, Scheme, SolveStatus, SolverOptions,
    };
}
