//! Error taxonomy for RosterForge.
//!
//! The engine never surfaces stringly-typed errors: every failure is one of
//! the closed kinds below, each carrying the structured payload a host needs
//! to render or act on it. Solver outcomes that are not failures (infeasible,
//! time limit, cancelled) are reported as result statuses; the matching error
//! kinds exist for hosts that must map them onto an error channel.

use thiserror::Error;

use crate::complexity::ComplexityReport;
use crate::scheme::Scheme;

/// Main error type for RosterForge operations.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Malformed problem document or out-of-enum value.
    ///
    /// `pointer` is a JSON Pointer to the offending location.
    #[error("invalid input at {pointer}: {message}")]
    InvalidInput { pointer: String, message: String },

    /// A requirement's work pattern violates its scheme's consecutive-day cap.
    #[error("pattern '{pattern}' is infeasible for scheme {scheme}: {message}")]
    PatternInfeasible {
        pattern: String,
        scheme: Scheme,
        message: String,
        suggestions: Vec<String>,
    },

    /// The resource gate refused the problem before model allocation.
    #[error("problem too large: {reason}")]
    ProblemTooLarge {
        reason: String,
        report: ComplexityReport,
        suggestions: Vec<String>,
    },

    /// Preprocessing could not select enough employees and fallback was
    /// disabled or also failed.
    #[error("insufficient employees for requirement {requirement_id}: need {needed}, eligible {available}")]
    InsufficientEmployees {
        requirement_id: String,
        needed: usize,
        available: usize,
    },

    /// The solver concluded no satisfying assignment exists.
    #[error("no satisfying assignment exists")]
    Infeasible,

    /// The solver hit its wall-clock limit without a proof.
    #[error("time limit exceeded")]
    TimeLimitExceeded,

    /// External cancellation via the cancellation token.
    #[error("solve was cancelled")]
    Cancelled,

    /// Invariant violation. A bug marker; never silenced.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// The protocol tag for this error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidInput { .. } => "InvalidInput",
            EngineError::PatternInfeasible { .. } => "PatternInfeasible",
            EngineError::ProblemTooLarge { .. } => "ProblemTooLarge",
            EngineError::InsufficientEmployees { .. } => "InsufficientEmployees",
            EngineError::Infeasible => "Infeasible",
            EngineError::TimeLimitExceeded => "TimeLimitExceeded",
            EngineError::Cancelled => "Cancelled",
            EngineError::Internal(_) => "InternalError",
        }
    }

    /// Shorthand for an [`EngineError::InvalidInput`] at a JSON Pointer.
    pub fn invalid_input(pointer: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            pointer: pointer.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for RosterForge operations.
pub type Result<T> = std::result::Result<T, EngineError>;
