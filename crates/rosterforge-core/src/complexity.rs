//! Complexity report and server capacity tiers.
//!
//! The resource gate (engine crate) fills these in; they live here so the
//! [`crate::error::EngineError::ProblemTooLarge`] payload can carry the
//! measured report without a crate cycle.

use serde::{Deserialize, Serialize};

/// Server capacity tier derived from available memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityTier {
    /// Up to 4 GiB.
    Small,
    /// Up to 8 GiB.
    Medium,
    /// More than 8 GiB.
    Large,
}

impl CapacityTier {
    /// Maximum decision variables this tier will accept.
    pub fn max_variables(self) -> u64 {
        match self {
            CapacityTier::Small => 50_000,
            CapacityTier::Medium => 200_000,
            CapacityTier::Large => 1_000_000,
        }
    }
}

/// Output of `estimate_complexity`: measured problem size against capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityReport {
    /// Estimated decision-variable count.
    pub variables: u64,
    /// Estimated peak model memory in MiB.
    pub memory_mb: f64,
    /// Estimated slot count over the horizon.
    pub slots: u64,
    /// Employees in the pool.
    pub employees: u64,
    pub tier: CapacityTier,
    pub can_solve: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}
