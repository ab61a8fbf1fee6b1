//! Result document assembly.
//!
//! Builds the canonical result: every assignment (ASSIGNED, OFF_DAY,
//! UNASSIGNED) carries ISO-8601 datetimes, the employee roster includes
//! pattern days, rank fields round-trip their input form, and the solver-run
//! metadata records the ICPMP trace, ratio search and cache hits.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use rosterforge_core::domain::{AssignmentStatus, Problem, RankForm, RosteringBasis};
use rosterforge_core::{DateRange, EmpIdx, HourBreakdown, Hours, ReqIdx};
use rosterforge_cp::{CpModel, CpOutcome};

use crate::hours::{credit_employee, AccountItem};
use crate::icpmp::PreprocessOutcome;
use crate::incremental::Projection;
use crate::slots::{ReqTable, SlotTable};

/// Final solve status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SolveStatus {
    #[serde(rename = "OPTIMAL")]
    Optimal,
    #[serde(rename = "FEASIBLE")]
    Feasible,
    #[serde(rename = "INFEASIBLE")]
    Infeasible,
    #[serde(rename = "UNKNOWN")]
    Unknown,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HoursDoc {
    pub gross: f64,
    pub lunch: f64,
    pub normal: f64,
    pub overtime: f64,
    pub public_holiday: f64,
    pub rest_day_pay: f64,
    pub paid: f64,
}

impl From<HourBreakdown> for HoursDoc {
    fn from(b: HourBreakdown) -> Self {
        HoursDoc {
            gross: b.gross.as_f64(),
            lunch: b.lunch.as_f64(),
            normal: b.normal.as_f64(),
            overtime: b.overtime.as_f64(),
            public_holiday: b.public_holiday.as_f64(),
            rest_day_pay: b.rest_day_pay.as_f64(),
            paid: b.paid().as_f64(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentDoc {
    pub assignment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_id: Option<String>,
    pub employee_id: Option<String>,
    pub date: NaiveDate,
    pub requirement_id: String,
    pub shift_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    pub status: AssignmentStatus,
    pub start_date_time: String,
    pub end_date_time: String,
    pub hours: HoursDoc,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_day: Option<u32>,
    /// Rank filter echoed in its original input form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStatusDoc {
    pub date: NaiveDate,
    pub status: AssignmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_day: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeRosterDoc {
    pub employee_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_offset: Option<u32>,
    pub daily_status: Vec<DailyStatusDoc>,
    pub days_worked: u32,
    pub off_days: u32,
    pub total_normal_hours: f64,
    pub total_overtime_hours: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterSummaryDoc {
    pub total_assignments: usize,
    pub assigned: usize,
    pub off_days: usize,
    pub unassigned: usize,
    pub employees_used: usize,
    pub coverage_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IcpmpRequirementDoc {
    pub requirement_id: String,
    pub baseline: u32,
    pub estimated_employees: u32,
    pub selected_employees: usize,
    pub insufficient: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IcpmpDoc {
    pub requirements: Vec<IcpmpRequirementDoc>,
    pub fallback_triggered: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatioCandidateDoc {
    pub ratio: f64,
    pub employees_used: u32,
    pub status: SolveStatus,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RatioSearchDoc {
    pub cache_hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_strict_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<RatioCandidateDoc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverRunDoc {
    pub status: SolveStatus,
    pub quality_grade: String,
    pub solve_time_ms: u64,
    pub seed: u64,
    pub workers: usize,
    pub icpmp: IcpmpDoc,
    pub ratio_search: RatioSearchDoc,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionQualityDoc {
    pub score_hard: i64,
    pub score_soft: i64,
    pub unmet_count: usize,
    pub coverage_pct: f64,
    pub quality_grade: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmetDemandDoc {
    pub slot_id: String,
    pub date: NaiveDate,
    pub requirement_id: String,
    pub shift_code: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementalMetaDoc {
    pub cutoff_date: NaiveDate,
    pub solve_from_date: NaiveDate,
    pub solve_to_date: NaiveDate,
    pub locked_assignments: usize,
    pub resolved_assignments: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaDoc {
    pub rostering_basis: RosteringBasis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_rostering_basis: Option<RosteringBasis>,
    pub fallback_triggered: bool,
    pub ratio_cache_hit: bool,
    pub engine_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incremental_solve: Option<IncrementalMetaDoc>,
}

/// The canonical result document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterResult {
    pub schema_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planning_reference: Option<String>,
    pub status: SolveStatus,
    pub assignments: Vec<AssignmentDoc>,
    pub employee_roster: Vec<EmployeeRosterDoc>,
    pub roster_summary: RosterSummaryDoc,
    pub solver_run: SolverRunDoc,
    pub solution_quality: SolutionQualityDoc,
    pub unmet_demand: Vec<UnmetDemandDoc>,
    pub meta: MetaDoc,
}

impl RosterResult {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("result serializes")
    }
}

/// Everything the builder consumes.
pub struct ResultInputs<'a> {
    pub problem: &'a Problem,
    pub reqs: &'a ReqTable,
    pub slots: &'a SlotTable,
    pub model: &'a CpModel,
    pub outcome: &'a CpOutcome,
    pub plans: &'a PreprocessOutcome,
    pub projection: Option<&'a Projection>,
    pub window: DateRange,
    pub status: SolveStatus,
    pub ratio_search: RatioSearchDoc,
    pub fallback_triggered: bool,
    pub original_basis: Option<RosteringBasis>,
    pub effective_basis: RosteringBasis,
    pub solve_time: Duration,
    pub seed: u64,
}

fn iso(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Builds the result document.
pub fn build(inputs: &ResultInputs<'_>) -> RosterResult {
    let problem = inputs.problem;
    let model = inputs.model;

    // Fixed offsets from ICPMP plans, then solver-decoded ones on top.
    let mut offsets: BTreeMap<EmpIdx, u32> = BTreeMap::new();
    for plan in &inputs.plans.plans {
        for (&emp, &offset) in &plan.offsets {
            offsets.insert(emp, offset);
        }
    }
    for &(emp, offset, _) in &inputs.outcome.offsets {
        offsets.insert(emp, offset);
    }

    // Chronological assigned slots per employee.
    let mut per_emp: BTreeMap<EmpIdx, Vec<usize>> = BTreeMap::new();
    for (i, chosen) in inputs.outcome.chosen.iter().enumerate() {
        if let Some(var) = chosen {
            per_emp.entry(model.var(*var).emp).or_default().push(i);
        }
    }
    for indices in per_emp.values_mut() {
        indices.sort_by_key(|&i| {
            let slot = inputs.slots.get(rosterforge_core::SlotIdx::new(i));
            (slot.date, slot.start)
        });
    }

    // Hour accounting per employee.
    let mut hours_by_slot: BTreeMap<usize, HourBreakdown> = BTreeMap::new();
    for (&emp_idx, slot_indices) in &per_emp {
        let emp = &problem.employees[emp_idx.index()];
        let prior = inputs
            .projection
            .and_then(|p| p.prior_for(&emp.id));
        let items: Vec<AccountItem> = slot_indices
            .iter()
            .map(|&i| {
                let slot = inputs.slots.get(rosterforge_core::SlotIdx::new(i));
                let shift = problem.shift(&slot.shift_code);
                let entry = inputs.reqs.get(slot.req);
                let days = rosterforge_core::calendar::days_in_month(slot.date) as f64;
                AccountItem {
                    date: slot.date,
                    gross: shift.map(|s| s.gross_hours).unwrap_or(Hours::from_whole(12)),
                    lunch: shift.map(|s| s.effective_lunch()).unwrap_or(Hours::from_whole(1)),
                    expected_work_days: (days * entry.req.work_pattern.work_fraction()).round()
                        as u32,
                }
            })
            .collect();
        let breakdowns = credit_employee(problem, emp, &items, prior);
        for (&i, b) in slot_indices.iter().zip(breakdowns) {
            hours_by_slot.insert(i, b);
        }
    }

    let mut assignments: Vec<AssignmentDoc> = Vec::new();
    let mut unmet: Vec<UnmetDemandDoc> = Vec::new();

    // Locked history first (verbatim).
    if let Some(projection) = inputs.projection {
        for prev in &projection.locked {
            let entry_rank = inputs
                .reqs
                .iter()
                .find(|(_, e)| e.req.id == prev.requirement_id)
                .map(|(_, e)| (e.req.rank_form, e.req.rank_ids.clone()));
            let (rank_id, rank_ids) = rank_fields(entry_rank);
            assignments.push(AssignmentDoc {
                assignment_id: prev.assignment_id.clone(),
                slot_id: None,
                employee_id: prev.employee_id.clone(),
                date: prev.date,
                requirement_id: prev.requirement_id.clone(),
                shift_code: prev.shift_code.clone(),
                position: prev.position,
                status: prev.status,
                start_date_time: iso(prev.start),
                end_date_time: iso(prev.end),
                hours: prev.hours.into(),
                pattern_day: None,
                rank_id,
                rank_ids,
            });
        }
    }

    // Fresh slot outcomes.
    for (slot_idx, slot) in inputs.slots.iter() {
        let entry = inputs.reqs.get(slot.req);
        let (rank_id, rank_ids) =
            rank_fields(Some((entry.req.rank_form, entry.req.rank_ids.clone())));
        match inputs.outcome.chosen[slot_idx.index()] {
            Some(var) => {
                let emp_idx = model.var(var).emp;
                let emp = &problem.employees[emp_idx.index()];
                let pattern_day = pattern_day_for(inputs, slot.req, emp_idx, slot.date, &offsets);
                assignments.push(AssignmentDoc {
                    assignment_id: format!("a:{}", slot.id),
                    slot_id: Some(slot.id.clone()),
                    employee_id: Some(emp.id.clone()),
                    date: slot.date,
                    requirement_id: entry.req.id.clone(),
                    shift_code: slot.shift_code.clone(),
                    position: Some(slot.position),
                    status: AssignmentStatus::Assigned,
                    start_date_time: iso(slot.start),
                    end_date_time: iso(slot.end),
                    hours: hours_by_slot
                        .get(&slot_idx.index())
                        .copied()
                        .unwrap_or(HourBreakdown::ZERO)
                        .into(),
                    pattern_day,
                    rank_id,
                    rank_ids,
                });
            }
            None => {
                let reason = if model.slot_vars(slot_idx).is_empty() {
                    "no eligible employee".to_string()
                } else {
                    "eligible employees exhausted by hard constraints".to_string()
                };
                unmet.push(UnmetDemandDoc {
                    slot_id: slot.id.clone(),
                    date: slot.date,
                    requirement_id: entry.req.id.clone(),
                    shift_code: slot.shift_code.clone(),
                    reason,
                });
                assignments.push(AssignmentDoc {
                    assignment_id: format!("a:{}", slot.id),
                    slot_id: Some(slot.id.clone()),
                    employee_id: None,
                    date: slot.date,
                    requirement_id: entry.req.id.clone(),
                    shift_code: slot.shift_code.clone(),
                    position: Some(slot.position),
                    status: AssignmentStatus::Unassigned,
                    start_date_time: iso(slot.start),
                    end_date_time: iso(slot.end),
                    hours: HoursDoc::default(),
                    pattern_day: None,
                    rank_id,
                    rank_ids,
                });
            }
        }
    }

    // OFF_DAY records for selected employees on their idle window dates.
    let assigned_dates: BTreeSet<(EmpIdx, NaiveDate)> = per_emp
        .iter()
        .flat_map(|(&e, slots)| {
            slots.iter().map(move |&i| {
                (e, inputs.slots.get(rosterforge_core::SlotIdx::new(i)).date)
            })
        })
        .collect();
    let locked_dates: BTreeSet<(String, NaiveDate)> = inputs
        .projection
        .map(|p| {
            p.locked
                .iter()
                .filter(|a| a.status != AssignmentStatus::Unassigned)
                .filter_map(|a| a.employee_id.clone().map(|e| (e, a.date)))
                .collect()
        })
        .unwrap_or_default();

    for plan in &inputs.plans.plans {
        let entry = inputs.reqs.get(plan.req);
        let (rank_id, rank_ids) =
            rank_fields(Some((entry.req.rank_form, entry.req.rank_ids.clone())));
        for &emp_idx in &plan.selected {
            let emp = &problem.employees[emp_idx.index()];
            for date in inputs.window.iter() {
                if assigned_dates.contains(&(emp_idx, date))
                    || locked_dates.contains(&(emp.id.clone(), date))
                {
                    continue;
                }
                let pattern_day = pattern_day_for(inputs, plan.req, emp_idx, date, &offsets);
                // Nominal window: the requirement's primary shift that day.
                let shift_code = entry
                    .req
                    .shift_codes
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "D".to_string());
                let (start, end) = problem
                    .shift(&shift_code)
                    .map(|s| s.window_on(date))
                    .unwrap_or((
                        date.and_hms_opt(8, 0, 0).expect("valid time"),
                        date.and_hms_opt(20, 0, 0).expect("valid time"),
                    ));
                assignments.push(AssignmentDoc {
                    assignment_id: format!("off:{}:{}", emp.id, date),
                    slot_id: None,
                    employee_id: Some(emp.id.clone()),
                    date,
                    requirement_id: entry.req.id.clone(),
                    shift_code,
                    position: None,
                    status: AssignmentStatus::OffDay,
                    start_date_time: iso(start),
                    end_date_time: iso(end),
                    hours: HoursDoc::default(),
                    pattern_day,
                    rank_id: rank_id.clone(),
                    rank_ids: rank_ids.clone(),
                });
            }
        }
    }

    assignments.sort_by(|a, b| {
        (a.date, &a.requirement_id, &a.shift_code, a.position, &a.employee_id)
            .cmp(&(b.date, &b.requirement_id, &b.shift_code, b.position, &b.employee_id))
    });

    let roster = build_roster(problem, &assignments, &offsets);

    let assigned = assignments
        .iter()
        .filter(|a| a.status == AssignmentStatus::Assigned)
        .count();
    let off_days = assignments
        .iter()
        .filter(|a| a.status == AssignmentStatus::OffDay)
        .count();
    let unassigned = assignments
        .iter()
        .filter(|a| a.status == AssignmentStatus::Unassigned)
        .count();
    let coverage_pct = if assigned + unassigned > 0 {
        assigned as f64 * 100.0 / (assigned + unassigned) as f64
    } else {
        100.0
    };

    let quality_grade = grade(inputs.status, coverage_pct);
    let summary = RosterSummaryDoc {
        total_assignments: assignments.len(),
        assigned,
        off_days,
        unassigned,
        employees_used: roster.iter().filter(|r| r.days_worked > 0).count(),
        coverage_pct,
    };

    let icpmp = IcpmpDoc {
        requirements: inputs
            .plans
            .plans
            .iter()
            .map(|p| IcpmpRequirementDoc {
                requirement_id: inputs.reqs.get(p.req).req.id.clone(),
                baseline: p.baseline,
                estimated_employees: p.estimated_employees,
                selected_employees: p.selected.len(),
                insufficient: p.insufficient,
                warnings: p.warnings.clone(),
            })
            .collect(),
        fallback_triggered: inputs.fallback_triggered,
    };

    RosterResult {
        schema_version: problem.schema_version.clone(),
        planning_reference: problem.planning_reference.clone(),
        status: inputs.status,
        solution_quality: SolutionQualityDoc {
            score_hard: inputs.outcome.score.hard(),
            score_soft: inputs.outcome.score.soft(),
            unmet_count: unmet.len(),
            coverage_pct,
            quality_grade: quality_grade.clone(),
        },
        solver_run: SolverRunDoc {
            status: inputs.status,
            quality_grade,
            solve_time_ms: inputs.solve_time.as_millis() as u64,
            seed: inputs.seed,
            workers: inputs.outcome.stats.workers,
            icpmp,
            ratio_search: inputs.ratio_search.clone(),
        },
        assignments,
        employee_roster: roster,
        roster_summary: summary,
        unmet_demand: unmet,
        meta: MetaDoc {
            rostering_basis: inputs.effective_basis,
            original_rostering_basis: inputs.original_basis,
            fallback_triggered: inputs.fallback_triggered,
            ratio_cache_hit: inputs.ratio_search.cache_hit,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            incremental_solve: inputs.projection.zip(problem.incremental.as_ref()).map(
                |(projection, block)| IncrementalMetaDoc {
                    cutoff_date: block.cutoff_date,
                    solve_from_date: block.solve_from,
                    solve_to_date: block.solve_to,
                    locked_assignments: projection.locked.len(),
                    resolved_assignments: inputs.slots.len(),
                },
            ),
        },
    }
}

fn rank_fields(
    form: Option<(RankForm, Vec<String>)>,
) -> (Option<String>, Option<Vec<String>>) {
    match form {
        Some((RankForm::Singular, ids)) => (ids.into_iter().next(), None),
        Some((RankForm::Plural, ids)) if !ids.is_empty() => (None, Some(ids)),
        _ => (None, None),
    }
}

fn pattern_day_for(
    inputs: &ResultInputs<'_>,
    req: ReqIdx,
    emp: EmpIdx,
    date: NaiveDate,
    offsets: &BTreeMap<EmpIdx, u32>,
) -> Option<u32> {
    let entry = inputs.reqs.get(req);
    let offset = offsets.get(&emp).copied().unwrap_or(0);
    Some(
        entry
            .req
            .work_pattern
            .pattern_day(entry.req.coverage_anchor, date, offset as i64) as u32,
    )
}

fn build_roster(
    problem: &Problem,
    assignments: &[AssignmentDoc],
    offsets: &BTreeMap<EmpIdx, u32>,
) -> Vec<EmployeeRosterDoc> {
    let mut by_emp: BTreeMap<String, Vec<&AssignmentDoc>> = BTreeMap::new();
    for a in assignments {
        if let Some(emp) = &a.employee_id {
            by_emp.entry(emp.clone()).or_default().push(a);
        }
    }
    by_emp
        .into_iter()
        .map(|(employee_id, mut docs)| {
            docs.sort_by_key(|a| a.date);
            let rotation_offset = problem
                .employees
                .iter()
                .position(|e| e.id == employee_id)
                .and_then(|i| offsets.get(&EmpIdx::new(i)).copied());
            let days_worked = docs
                .iter()
                .filter(|a| a.status == AssignmentStatus::Assigned)
                .count() as u32;
            let off_days = docs
                .iter()
                .filter(|a| a.status == AssignmentStatus::OffDay)
                .count() as u32;
            EmployeeRosterDoc {
                daily_status: docs
                    .iter()
                    .map(|a| DailyStatusDoc {
                        date: a.date,
                        status: a.status,
                        shift_code: (a.status == AssignmentStatus::Assigned)
                            .then(|| a.shift_code.clone()),
                        pattern_day: a.pattern_day,
                    })
                    .collect(),
                days_worked,
                off_days,
                total_normal_hours: docs.iter().map(|a| a.hours.normal).sum(),
                total_overtime_hours: docs.iter().map(|a| a.hours.overtime).sum(),
                employee_id,
                rotation_offset,
            }
        })
        .collect()
}

fn grade(status: SolveStatus, coverage_pct: f64) -> String {
    match status {
        SolveStatus::Optimal if coverage_pct >= 100.0 => "A".to_string(),
        SolveStatus::Optimal | SolveStatus::Feasible if coverage_pct >= 95.0 => "B".to_string(),
        SolveStatus::Feasible | SolveStatus::Unknown => "C".to_string(),
        SolveStatus::Optimal => "B".to_string(),
        SolveStatus::Infeasible | SolveStatus::Cancelled => "F".to_string(),
    }
}
