//! ICPMP - Iterative Capacity and Pattern Matching Planner.
//!
//! For each requirement, decides how many employees are needed and which
//! employees (with which rotation offsets) to reserve, before the constraint
//! solver runs. Capacity sizing folds in a scheme-aware weekly-hours factor
//! and a consecutive-run buffer; selection keeps per-scheme diversity via
//! round-robin over scheme buckets. Employees reserved for one requirement
//! are not offered to later ones.
//!
//! Known limitation: APGD-D10 weekly-rest exemption is not distinguished
//! here; all Scheme A capacity is sized as 6-day-per-week. Over-provisions
//! 7-day patterns by up to 15%; the solver trims actual assignments.

use std::collections::BTreeMap;

use rosterforge_core::domain::{OffsetMode, RosteringBasis};
use rosterforge_core::{EmpIdx, EngineError, ReqIdx, Result, Scheme};

use crate::slots::{ReqEntry, ReqTable};
use rosterforge_core::domain::Problem;

/// Per-requirement preprocessing plan.
#[derive(Debug, Clone)]
pub struct ReqPlan {
    pub req: ReqIdx,
    pub selected: Vec<EmpIdx>,
    /// Fixed rotation offsets; empty in `solver_optimized` mode.
    pub offsets: BTreeMap<EmpIdx, u32>,
    pub estimated_employees: u32,
    pub baseline: u32,
    pub warnings: Vec<String>,
    /// The eligible pool could not cover the estimate.
    pub insufficient: bool,
}

/// Aggregate preprocessing outcome.
#[derive(Debug, Clone, Default)]
pub struct PreprocessOutcome {
    pub plans: Vec<ReqPlan>,
    /// Any demand-based requirement came up short of employees.
    pub insufficient_any: bool,
}

impl PreprocessOutcome {
    pub fn plan_for(&self, req: ReqIdx) -> Option<&ReqPlan> {
        self.plans.iter().find(|p| p.req == req)
    }
}

/// Runs the preprocessor over every requirement.
pub fn preprocess(problem: &Problem, reqs: &ReqTable) -> Result<PreprocessOutcome> {
    preprocess_with(problem, reqs, &std::collections::BTreeSet::new())
}

/// Like [`preprocess`], with employees excluded up front (incremental
/// departures).
pub fn preprocess_with(
    problem: &Problem,
    reqs: &ReqTable,
    excluded: &std::collections::BTreeSet<String>,
) -> Result<PreprocessOutcome> {
    let mut outcome = PreprocessOutcome::default();
    let mut reserved: Vec<bool> = problem
        .employees
        .iter()
        .map(|e| excluded.contains(&e.id))
        .collect();

    for (req_idx, entry) in reqs.iter() {
        let plan = plan_requirement(problem, req_idx, entry, &mut reserved)?;
        if plan.insufficient && entry.basis == RosteringBasis::DemandBased {
            outcome.insufficient_any = true;
        }
        outcome.plans.push(plan);
    }
    Ok(outcome)
}

fn plan_requirement(
    problem: &Problem,
    req_idx: ReqIdx,
    entry: &ReqEntry,
    reserved: &mut [bool],
) -> Result<ReqPlan> {
    let req = &entry.req;
    let pattern = &req.work_pattern;
    let cycle_length = pattern.cycle_length() as u32;
    let work_days = pattern.work_days_per_cycle() as u32;
    let headcount = req.headcount_or_default();
    let net = problem.shift_net_hours(req);
    let mut warnings = Vec::new();

    if work_days == 0 {
        warnings.push(format!(
            "requirement {} has an all-off pattern; nothing to staff",
            req.id
        ));
        return Ok(ReqPlan {
            req: req_idx,
            selected: Vec::new(),
            offsets: BTreeMap::new(),
            estimated_employees: 0,
            baseline: 0,
            warnings,
            insufficient: false,
        });
    }

    // Lower bound from cycle geometry.
    let baseline = headcount * cycle_length / work_days
        + u32::from(headcount * cycle_length % work_days != 0);

    let mut estimated = match entry.basis {
        // Template mode: one employee per position.
        RosteringBasis::OutcomeBased => headcount.max(1),
        RosteringBasis::DemandBased => {
            // Weekly-hours feasibility factor against the scheme cap.
            let weekly_hours = work_days as f64 * net.as_f64() * 7.0 / cycle_length as f64;
            let cap = scheme_cap_for_filter(req, net.as_f64());
            let mut estimate = baseline;
            if weekly_hours > cap {
                estimate = ((baseline as f64) * weekly_hours / cap).ceil() as u32;
                warnings.push(format!(
                    "pattern implies {weekly_hours:.2} weekly hours against a {cap:.2} h cap; provisioning {estimate} employees"
                ));
            }
            estimate
        }
    };

    // Consecutive-run buffer for rotation flexibility.
    let longest_run = pattern.longest_work_run() as u32;
    if entry.basis == RosteringBasis::DemandBased && longest_run >= 6 {
        estimated += 1;
    }

    let pool = eligible_pool(problem, entry, reserved);
    let insufficient = (pool.len() as u32) < estimated;
    if insufficient {
        warnings.push(format!(
            "requirement {}: estimated {estimated} employees, only {} eligible",
            req.id,
            pool.len()
        ));
    }

    let selected: Vec<EmpIdx> = pool.into_iter().take(estimated as usize).collect();
    for &e in &selected {
        reserved[e.index()] = true;
    }

    let offsets = assign_offsets(problem, entry, &selected, cycle_length, &mut warnings)?;

    tracing::debug!(
        requirement = %req.id,
        baseline,
        estimated,
        selected = selected.len(),
        insufficient,
        "icpmp planned requirement"
    );

    Ok(ReqPlan {
        req: req_idx,
        selected,
        offsets,
        estimated_employees: estimated,
        baseline,
        warnings,
        insufficient,
    })
}

/// Weekly cap used for the feasibility factor: the most permissive cap among
/// the schemes the requirement accepts.
fn scheme_cap_for_filter(req: &rosterforge_core::domain::Requirement, net_hours: f64) -> f64 {
    let net = rosterforge_core::Hours::from_f64(net_hours);
    req.schemes
        .as_set()
        .iter()
        .map(|s| s.weekly_cap(net).as_f64())
        .fold(0.0f64, f64::max)
}

/// Filters the pool and keeps per-scheme diversity: when the requirement
/// accepts several schemes, employees are picked round-robin from per-scheme
/// buckets so the ratio stays balanced.
fn eligible_pool(problem: &Problem, entry: &ReqEntry, reserved: &[bool]) -> Vec<EmpIdx> {
    let req = &entry.req;
    let anchor = req.coverage_anchor;
    let eligible = problem.employees.iter().enumerate().filter(|(i, emp)| {
        !reserved[*i] && req.admits_employee(emp) && emp.satisfies_groups(&req.qualification_groups, anchor)
    });

    let schemes = req.schemes.as_set();
    if schemes.len() < 2 {
        return eligible.map(|(i, _)| EmpIdx::new(i)).collect();
    }

    let mut buckets: BTreeMap<Scheme, Vec<EmpIdx>> = BTreeMap::new();
    for (i, emp) in eligible {
        buckets.entry(emp.scheme).or_default().push(EmpIdx::new(i));
    }
    let mut out = Vec::new();
    let mut cursors: BTreeMap<Scheme, usize> = buckets.keys().map(|&s| (s, 0)).collect();
    loop {
        let mut advanced = false;
        for (&scheme, bucket) in &buckets {
            let cursor = cursors.get_mut(&scheme).expect("cursor exists");
            if *cursor < bucket.len() {
                out.push(bucket[*cursor]);
                *cursor += 1;
                advanced = true;
            }
        }
        if !advanced {
            break;
        }
    }
    out
}

fn assign_offsets(
    problem: &Problem,
    entry: &ReqEntry,
    selected: &[EmpIdx],
    cycle_length: u32,
    warnings: &mut Vec<String>,
) -> Result<BTreeMap<EmpIdx, u32>> {
    let mut offsets = BTreeMap::new();
    match entry.offset_mode {
        OffsetMode::SolverOptimized => {}
        OffsetMode::Auto => {
            // Round-robin over the cycle; a pre-set employee offset wins.
            for (i, &e) in selected.iter().enumerate() {
                let emp = &problem.employees[e.index()];
                let offset = emp
                    .rotation_offset
                    .map(|o| o % cycle_length)
                    .unwrap_or(i as u32 % cycle_length);
                offsets.insert(e, offset);
            }
        }
        OffsetMode::OuOffsets => {
            for &e in selected {
                let emp = &problem.employees[e.index()];
                let offset = match entry.ou_offsets.get(&emp.organizational_unit) {
                    Some(&o) => {
                        if o < 0 || o >= cycle_length as i64 {
                            return Err(EngineError::invalid_input(
                                "/demandItems/ouOffsets",
                                format!(
                                    "offset {o} for OU '{}' outside [0, {cycle_length})",
                                    emp.organizational_unit
                                ),
                            ));
                        }
                        o as u32
                    }
                    None => {
                        warnings.push(format!(
                            "employee {} OU '{}' missing from ouOffsets; defaulting to 0",
                            emp.id, emp.organizational_unit
                        ));
                        tracing::warn!(
                            employee = %emp.id,
                            ou = %emp.organizational_unit,
                            "OU missing from offset table, defaulting to 0"
                        );
                        0
                    }
                };
                offsets.insert(e, offset);
            }
        }
    }
    Ok(offsets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosterforge_core::domain::Problem;

    fn base_doc() -> serde_json::Value {
        serde_json::json!({
            "schemaVersion": "2.1",
            "planningHorizon": {"startDate": "2025-12-01", "endDate": "2025-12-31"},
            "shifts": [{"code": "D", "startTime": "08:00", "endTime": "20:00", "grossHours": 12.0}],
            "employees": [],
            "demandItems": [{
                "demandId": "dm1", "rosteringBasis": "demandBased",
                "requirements": [{
                    "requirementId": "r1", "headcount": 1,
                    "workPattern": ["D", "D", "D", "D", "D", "O", "O"],
                    "shiftCode": "D"
                }]
            }]
        })
    }

    fn emp(id: &str, scheme: &str, rank: &str) -> serde_json::Value {
        serde_json::json!({
            "employeeId": id, "scheme": scheme, "rank": rank,
            "productType": "APO", "organizationalUnit": "OU1"
        })
    }

    #[test]
    fn baseline_from_cycle_geometry() {
        let mut doc = base_doc();
        doc["employees"] = serde_json::json!([
            emp("e1", "A", "SER"), emp("e2", "A", "SER"), emp("e3", "A", "SER"),
            emp("e4", "A", "SER"), emp("e5", "A", "SER")
        ]);
        let p = Problem::from_json(&doc.to_string()).unwrap();
        let reqs = ReqTable::from_problem(&p);
        let outcome = preprocess(&p, &reqs).unwrap();
        let plan = &outcome.plans[0];
        // ceil(1 * 7 / 5) = 2, then weekly factor 55h/44h scales to 3.
        assert_eq!(plan.baseline, 2);
        assert!(plan.estimated_employees >= 3);
        assert!(!outcome.insufficient_any);
    }

    #[test]
    fn insufficient_pool_is_flagged() {
        let mut doc = base_doc();
        doc["employees"] = serde_json::json!([emp("e1", "A", "SER")]);
        let p = Problem::from_json(&doc.to_string()).unwrap();
        let reqs = ReqTable::from_problem(&p);
        let outcome = preprocess(&p, &reqs).unwrap();
        assert!(outcome.insufficient_any);
        assert!(outcome.plans[0].insufficient);
        assert_eq!(outcome.plans[0].selected.len(), 1);
    }

    #[test]
    fn auto_offsets_round_robin() {
        let mut doc = base_doc();
        doc["demandItems"][0]["requirements"][0]["rankIds"] =
            serde_json::json!(["COR", "SGT", "CPL"]);
        doc["demandItems"][0]["requirements"][0]["schemes"] = serde_json::json!(["A", "B"]);
        doc["demandItems"][0]["rosteringBasis"] = serde_json::json!("outcomeBased");
        doc["demandItems"][0]["requirements"][0]["headcount"] = serde_json::json!(3);
        doc["employees"] = serde_json::json!([
            emp("e1", "A", "COR"), emp("e2", "B", "SGT"), emp("e3", "A", "CPL")
        ]);
        let p = Problem::from_json(&doc.to_string()).unwrap();
        let reqs = ReqTable::from_problem(&p);
        let outcome = preprocess(&p, &reqs).unwrap();
        let plan = &outcome.plans[0];
        assert_eq!(plan.selected.len(), 3);
        let mut offsets: Vec<u32> = plan.offsets.values().copied().collect();
        offsets.sort();
        assert_eq!(offsets, vec![0, 1, 2]);
    }

    #[test]
    fn scheme_diversity_round_robins_buckets() {
        let mut doc = base_doc();
        doc["demandItems"][0]["requirements"][0]["schemes"] = serde_json::json!(["A", "B"]);
        doc["demandItems"][0]["requirements"][0]["headcount"] = serde_json::json!(2);
        doc["employees"] = serde_json::json!([
            emp("a1", "A", "SER"), emp("a2", "A", "SER"), emp("a3", "A", "SER"),
            emp("b1", "B", "SER"), emp("b2", "B", "SER")
        ]);
        let p = Problem::from_json(&doc.to_string()).unwrap();
        let reqs = ReqTable::from_problem(&p);
        let outcome = preprocess(&p, &reqs).unwrap();
        let plan = &outcome.plans[0];
        // First two picks alternate schemes.
        let schemes: Vec<Scheme> = plan.selected[..2]
            .iter()
            .map(|&e| p.employees[e.index()].scheme)
            .collect();
        assert_eq!(schemes, vec![Scheme::A, Scheme::B]);
    }

    #[test]
    fn ou_offsets_out_of_range_hard_fail() {
        let mut doc = base_doc();
        doc["demandItems"][0]["fixedRotationOffset"] = serde_json::json!("ou_offsets");
        doc["demandItems"][0]["ouOffsets"] = serde_json::json!({"OU1": 9});
        doc["employees"] = serde_json::json!([emp("e1", "A", "SER")]);
        let p = Problem::from_json(&doc.to_string()).unwrap();
        let reqs = ReqTable::from_problem(&p);
        assert!(preprocess(&p, &reqs).is_err());
    }

    #[test]
    fn ou_offsets_missing_ou_defaults_with_warning() {
        let mut doc = base_doc();
        doc["demandItems"][0]["fixedRotationOffset"] = serde_json::json!("ou_offsets");
        doc["demandItems"][0]["ouOffsets"] = serde_json::json!({"OTHER": 2});
        doc["employees"] = serde_json::json!([emp("e1", "A", "SER")]);
        let p = Problem::from_json(&doc.to_string()).unwrap();
        let reqs = ReqTable::from_problem(&p);
        let outcome = preprocess(&p, &reqs).unwrap();
        let plan = &outcome.plans[0];
        assert_eq!(plan.offsets.values().next(), Some(&0));
        assert!(plan.warnings.iter().any(|w| w.contains("missing from ouOffsets")));
    }

    #[test]
    fn reserved_employees_not_reused_across_requirements() {
        let mut doc = base_doc();
        let req2 = serde_json::json!({
            "requirementId": "r2", "headcount": 1,
            "workPattern": ["D", "O"], "shiftCode": "D"
        });
        doc["demandItems"][0]["requirements"]
            .as_array_mut()
            .unwrap()
            .push(req2);
        doc["employees"] = serde_json::json!([
            emp("e1", "A", "SER"), emp("e2", "A", "SER"), emp("e3", "A", "SER"),
            emp("e4", "A", "SER"), emp("e5", "A", "SER"), emp("e6", "A", "SER")
        ]);
        let p = Problem::from_json(&doc.to_string()).unwrap();
        let reqs = ReqTable::from_problem(&p);
        let outcome = preprocess(&p, &reqs).unwrap();
        let first: std::collections::BTreeSet<_> =
            outcome.plans[0].selected.iter().copied().collect();
        assert!(outcome.plans[1].selected.iter().all(|e| !first.contains(e)));
    }
}
