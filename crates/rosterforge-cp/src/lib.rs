//! RosterForge CP - Boolean-assignment constraint model and search backend
//!
//! The engine's constraint modules emit clauses into a [`model::CpModel`];
//! any [`backend::CpBackend`] implementation can search it. The bundled
//! backend combines greedy construction with hill-climbing local search and
//! parallel multi-start, deterministic for a fixed seed.

pub mod backend;
pub mod cancellation;
pub mod construction;
pub mod evaluator;
pub mod local_search;
pub mod model;
pub mod solver;

pub use backend::{CpBackend, CpOutcome, CpStatus, SearchLimits, SearchStats};
pub use cancellation::CancellationToken;
pub use evaluator::Evaluator;
pub use model::{ClauseLabel, CpModel, OffsetVarId, VarId, VarInfo};
pub use solver::BundledSolver;
