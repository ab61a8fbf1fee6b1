//! Resource gate: pre-solve complexity estimation.
//!
//! The gate is consulted before any model allocation and is the only
//! component permitted to terminate a solve with a size error. Estimation is
//! deliberately cheap: no slots or variables are materialized.

use rosterforge_core::domain::{Problem, RosteringBasis};
use rosterforge_core::{CapacityTier, ComplexityReport, EngineError, Result};

/// Bytes per decision variable, plus search overhead applied on top.
const BYTES_PER_VARIABLE: f64 = 100.0;
const SEARCH_OVERHEAD: f64 = 1.2;

/// Hard cap independent of tier.
const HARD_VARIABLE_CAP: u64 = 2_000_000;

/// Server capacity, immutable after startup.
#[derive(Debug, Clone, Copy)]
pub struct ServerCapacity {
    pub total_memory_bytes: u64,
    pub logical_cpus: usize,
}

impl ServerCapacity {
    /// Probes the host. Called once at startup; tests construct explicitly.
    pub fn detect() -> Self {
        let mut sys = sysinfo::System::new();
        sys.refresh_memory();
        ServerCapacity {
            total_memory_bytes: sys.total_memory(),
            logical_cpus: num_cpus::get(),
        }
    }

    pub fn tier(&self) -> CapacityTier {
        const GIB: u64 = 1024 * 1024 * 1024;
        if self.total_memory_bytes <= 4 * GIB {
            CapacityTier::Small
        } else if self.total_memory_bytes <= 8 * GIB {
            CapacityTier::Medium
        } else {
            CapacityTier::Large
        }
    }
}

/// Estimates problem complexity without side effects.
pub fn estimate_complexity(problem: &Problem, capacity: &ServerCapacity) -> ComplexityReport {
    let horizon_days = problem.horizon.len_days().max(0) as f64;
    let tier = capacity.tier();

    let mut slots = 0f64;
    let mut variables = 0f64;
    for (item, req) in problem.requirements() {
        // Demand-based mode emits a slot per headcount position on every
        // covered date; positional mode only on pattern work days.
        let work_fraction = match item.rostering_basis {
            RosteringBasis::DemandBased => 1.0,
            RosteringBasis::OutcomeBased => req.work_pattern.work_fraction(),
        };
        let coverage_fraction = req.coverage_days.count() as f64 / 7.0;
        let req_slots =
            req.headcount_or_default() as f64 * horizon_days * work_fraction * coverage_fraction;

        let eligible = problem
            .employees
            .iter()
            .filter(|e| req.admits_employee(e))
            .count() as f64;

        slots += req_slots;
        variables += req_slots * eligible;
    }

    let variables = variables.round() as u64;
    let slots = slots.round() as u64;
    let memory_mb = variables as f64 * BYTES_PER_VARIABLE * SEARCH_OVERHEAD / (1024.0 * 1024.0);

    let tier_max = tier.max_variables().min(HARD_VARIABLE_CAP);
    let can_solve = variables <= tier_max;
    let (reason, suggestions) = if can_solve {
        (None, Vec::new())
    } else {
        (
            Some(format!(
                "estimated {variables} decision variables exceed the {tier_max} limit for this server tier"
            )),
            reduction_suggestions(),
        )
    };

    ComplexityReport {
        variables,
        memory_mb,
        slots,
        employees: problem.employees.len() as u64,
        tier,
        can_solve,
        reason,
        suggestions,
    }
}

fn reduction_suggestions() -> Vec<String> {
    vec![
        "reduce requirement headcount".to_string(),
        "shorten the planning horizon".to_string(),
        "split large requirements into smaller ones".to_string(),
        "use incremental mode to solve a sub-window".to_string(),
    ]
}

/// Soft warning threshold for this tier.
fn warn_threshold(tier: CapacityTier) -> u64 {
    (tier.max_variables() / 2).min(1_000_000)
}

/// Pre-solve gate: passes, warns, or fails with `ProblemTooLarge`.
pub fn check(problem: &Problem, capacity: &ServerCapacity) -> Result<ComplexityReport> {
    let report = estimate_complexity(problem, capacity);
    if !report.can_solve || report.variables > HARD_VARIABLE_CAP {
        let reason = report
            .reason
            .clone()
            .unwrap_or_else(|| "problem exceeds server capacity".to_string());
        tracing::warn!(
            variables = report.variables,
            tier = ?report.tier,
            "resource gate refused problem"
        );
        return Err(EngineError::ProblemTooLarge {
            reason,
            suggestions: report.suggestions.clone(),
            report,
        });
    }
    if report.variables > warn_threshold(report.tier) {
        tracing::warn!(
            variables = report.variables,
            threshold = warn_threshold(report.tier),
            "problem size above warning threshold; solve may be slow"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn small_server() -> ServerCapacity {
        ServerCapacity {
            total_memory_bytes: 4 * GIB,
            logical_cpus: 2,
        }
    }

    fn large_server() -> ServerCapacity {
        ServerCapacity {
            total_memory_bytes: 32 * GIB,
            logical_cpus: 16,
        }
    }

    fn problem_with(headcount: u32, employees: usize) -> Problem {
        let emps: Vec<serde_json::Value> = (0..employees)
            .map(|i| {
                serde_json::json!({
                    "employeeId": format!("e{i}"), "scheme": "A", "rank": "SER",
                    "productType": "APO", "organizationalUnit": "OU1"
                })
            })
            .collect();
        let doc = serde_json::json!({
            "schemaVersion": "2.1",
            "planningHorizon": {"startDate": "2025-12-01", "endDate": "2025-12-31"},
            "shifts": [{"code": "D", "startTime": "08:00", "endTime": "20:00", "grossHours": 12.0}],
            "employees": emps,
            "demandItems": [{
                "demandId": "dm1", "rosteringBasis": "demandBased",
                "requirements": [{
                    "requirementId": "r1", "headcount": headcount,
                    "workPattern": ["D", "D", "D", "D", "D", "O", "O"],
                    "shiftCode": "D"
                }]
            }]
        });
        Problem::from_json(&doc.to_string()).unwrap()
    }

    #[test]
    fn tiers_by_memory() {
        assert_eq!(small_server().tier(), CapacityTier::Small);
        assert_eq!(
            ServerCapacity {
                total_memory_bytes: 8 * GIB,
                logical_cpus: 4
            }
            .tier(),
            CapacityTier::Medium
        );
        assert_eq!(large_server().tier(), CapacityTier::Large);
    }

    #[test]
    fn small_problem_passes() {
        let problem = problem_with(1, 5);
        let report = estimate_complexity(&problem, &small_server());
        assert!(report.can_solve);
        assert!(check(&problem, &small_server()).is_ok());
    }

    #[test]
    fn oversized_problem_is_refused_on_small_tier() {
        // 50 heads x 31 days x 200 eligible employees = 310k variables,
        // far beyond the 50k small-tier limit.
        let problem = problem_with(50, 200);
        let report = estimate_complexity(&problem, &small_server());
        assert!(!report.can_solve);
        assert!(report.variables > 200_000);
        assert!(!report.suggestions.is_empty());

        let err = check(&problem, &small_server()).unwrap_err();
        match err {
            EngineError::ProblemTooLarge { report, suggestions, .. } => {
                assert!(!report.can_solve);
                assert!(suggestions.iter().any(|s| s.contains("incremental")));
            }
            other => panic!("expected ProblemTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn same_problem_passes_on_large_tier() {
        let problem = problem_with(50, 200);
        let report = estimate_complexity(&problem, &large_server());
        assert!(report.can_solve);
    }

    #[test]
    fn estimate_is_pure() {
        let problem = problem_with(2, 10);
        let a = estimate_complexity(&problem, &small_server());
        let b = estimate_complexity(&problem, &small_server());
        assert_eq!(a.variables, b.variables);
        assert_eq!(a.slots, b.slots);
    }
}
