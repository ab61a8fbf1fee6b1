//! RosterForge Core - Domain model and shared types for the rostering engine
//!
//! This crate provides the foundations the engine builds on:
//! - The canonical domain model and its flexible JSON ingress
//! - Fixed-point hour arithmetic (integer millihours)
//! - Employment schemes and their statutory caps
//! - Cyclic work patterns and the fast feasibility probe
//! - The closed error taxonomy
//! - Calendar math (Mon-Sun weeks, month lengths, weekday sets)

pub mod calendar;
pub mod complexity;
pub mod domain;
pub mod error;
pub mod hours;
pub mod ids;
pub mod pattern;
pub mod scheme;
pub mod score;

pub use calendar::{DateRange, WeekdaySet};
pub use complexity::{CapacityTier, ComplexityReport};
pub use domain::Problem;
pub use error::{EngineError, Result};
pub use hours::{HourBreakdown, Hours};
pub use ids::{EmpIdx, ReqIdx, SlotIdx};
pub use pattern::{validate_pattern, PatternToken, PatternValidationResult, WorkPattern};
pub use scheme::{Gender, Scheme};
pub use score::RosterScore;
