//! Canonical domain model.
//!
//! Everything here is the normalized, validated form of the problem
//! document. Ingress (flexible JSON forms, backward-compatibility aliases,
//! JSON-Pointer-tagged validation) lives in [`ingress`]; the rest of the
//! engine only ever sees these types.

pub mod ingress;

#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::calendar::{DateRange, WeekdaySet};
use crate::hours::Hours;
use crate::pattern::WorkPattern;
use crate::scheme::{Gender, Scheme};

/// Employee qualification with a validity window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Qualification {
    pub code: String,
    pub valid_from: Option<NaiveDate>,
    pub expiry: Option<NaiveDate>,
}

impl Qualification {
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.valid_from.is_none_or(|from| from <= date)
            && self.expiry.is_none_or(|until| date <= until)
    }
}

/// Leave categories. Long leaves additionally unlock assignments in
/// incremental re-solves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveKind {
    Annual,
    Medical,
    Long,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveRecord {
    pub kind: LeaveKind,
    pub range: DateRange,
}

/// An employee in the pool.
#[derive(Debug, Clone)]
pub struct Employee {
    pub id: String,
    pub scheme: Scheme,
    pub rank: String,
    pub product_type: String,
    pub organizational_unit: String,
    pub team: Option<String>,
    pub gender: Gender,
    pub is_foreign: bool,
    /// APGD-D10 special approval; only effective for Scheme A.
    pub apgd_d10: bool,
    pub qualifications: Vec<Qualification>,
    pub unavailable: Vec<DateRange>,
    pub rotation_offset: Option<u32>,
    pub leaves: Vec<LeaveRecord>,
}

impl Employee {
    /// APGD-D10 only modifies caps for Scheme A employees.
    #[inline]
    pub fn effective_apgd_d10(&self) -> bool {
        self.apgd_d10 && self.scheme == Scheme::A
    }

    /// True when neither an unavailability range nor a leave covers `date`.
    pub fn is_available_on(&self, date: NaiveDate) -> bool {
        !self.unavailable.iter().any(|r| r.contains(date))
            && !self.leaves.iter().any(|l| l.range.contains(date))
    }

    pub fn on_long_leave(&self, date: NaiveDate) -> bool {
        self.leaves
            .iter()
            .any(|l| l.kind == LeaveKind::Long && l.range.contains(date))
    }

    pub fn holds_qualification(&self, code: &str, date: NaiveDate) -> bool {
        self.qualifications
            .iter()
            .any(|q| q.code == code && q.is_valid_on(date))
    }

    /// Checks every qualification group: ALL groups need every code, ANY
    /// groups need at least one, all unexpired at `date`.
    pub fn satisfies_groups(&self, groups: &[QualificationGroup], date: NaiveDate) -> bool {
        groups.iter().all(|g| match g.match_type {
            MatchType::All => g.codes.iter().all(|c| self.holds_qualification(c, date)),
            MatchType::Any => g.codes.iter().any(|c| self.holds_qualification(c, date)),
        })
    }

    /// C19 category: foreign CPL/SGT employees get the raised cap row.
    pub fn is_foreign_cpl_sgt(&self) -> bool {
        self.is_foreign && matches!(self.rank.as_str(), "CPL" | "SGT")
    }
}

/// A shift type as configured in the problem document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftType {
    pub code: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub gross_hours: Hours,
    /// Explicit lunch break; when absent the default deduction rule applies.
    pub lunch_break: Option<Hours>,
}

impl ShiftType {
    /// `end <= start` means the shift crosses midnight into the next day.
    pub fn crosses_midnight(&self) -> bool {
        self.end_time <= self.start_time
    }

    /// Concrete shift window on `date`.
    pub fn window_on(&self, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        let start = date.and_time(self.start_time);
        let end_date = if self.crosses_midnight() {
            date.checked_add_days(Days::new(1)).expect("date overflow")
        } else {
            date
        };
        (start, end_date.and_time(self.end_time))
    }

    /// Lunch deduction: the configured break, or 1 h for shifts of 6 gross
    /// hours or more. (Scheme P's refined 0.75 h rule for 6-7.99 h shifts is
    /// documented but not active.)
    pub fn effective_lunch(&self) -> Hours {
        self.lunch_break.unwrap_or_else(|| {
            if self.gross_hours >= Hours::from_whole(6) {
                Hours::from_whole(1)
            } else {
                Hours::ZERO
            }
        })
    }

    /// Net workable hours.
    pub fn net_hours(&self) -> Hours {
        (self.gross_hours - self.effective_lunch()).clamp_floor()
    }
}

/// Scheme filter on a requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemeFilter {
    /// "Any"/"Global" or an empty list: all schemes accepted.
    Any,
    Set(Vec<Scheme>),
}

impl SchemeFilter {
    pub fn admits(&self, scheme: Scheme) -> bool {
        match self {
            SchemeFilter::Any => true,
            SchemeFilter::Set(set) => set.contains(&scheme),
        }
    }

    /// Schemes to balance over in ICPMP round-robin selection.
    pub fn as_set(&self) -> Vec<Scheme> {
        match self {
            SchemeFilter::Any => vec![Scheme::A, Scheme::B, Scheme::P],
            SchemeFilter::Set(set) => set.clone(),
        }
    }
}

/// Input shape of the rank field, preserved for result round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankForm {
    Singular,
    #[default]
    Plural,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchType {
    All,
    Any,
}

/// A group of qualification codes a slot requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualificationGroup {
    pub group_id: String,
    pub match_type: MatchType,
    pub codes: Vec<String>,
}

/// Autotune range for the strict adherence ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoRatioRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl AutoRatioRange {
    /// Default sweep: 0.5 to 0.8 in steps of 0.05.
    pub const DEFAULT: AutoRatioRange = AutoRatioRange {
        min: 0.5,
        max: 0.8,
        step: 0.05,
    };

    /// The arithmetic progression of candidate ratios, inclusive of `max`.
    pub fn candidates(&self) -> Vec<f64> {
        let mut out = Vec::new();
        if self.step <= 0.0 || self.max < self.min {
            return vec![self.min];
        }
        let mut r = self.min;
        while r <= self.max + 1e-9 {
            out.push((r * 1000.0).round() / 1000.0);
            r += self.step;
        }
        out
    }
}

/// One shift requirement within a demand item.
#[derive(Debug, Clone)]
pub struct Requirement {
    pub id: String,
    pub headcount: Option<u32>,
    pub work_pattern: WorkPattern,
    pub coverage_anchor: NaiveDate,
    pub coverage_days: WeekdaySet,
    pub shift_codes: Vec<String>,
    pub schemes: SchemeFilter,
    pub rank_ids: Vec<String>,
    pub rank_form: RankForm,
    pub gender: Gender,
    pub qualification_groups: Vec<QualificationGroup>,
    pub whitelist: Option<BTreeSet<String>>,
    pub blacklist: BTreeSet<String>,
    pub enable_apgd_d10: bool,
    pub strict_ratio: Option<f64>,
    pub auto_ratio: Option<AutoRatioRange>,
}

impl Requirement {
    pub fn headcount_or_default(&self) -> u32 {
        self.headcount.unwrap_or(1)
    }

    /// Rank matching is OR over the list; an empty list accepts all ranks.
    pub fn admits_rank(&self, rank: &str) -> bool {
        self.rank_ids.is_empty() || self.rank_ids.iter().any(|r| r == rank)
    }

    /// Static eligibility filters: scheme, rank, gender, whitelist and
    /// blacklist. Qualifications and availability are date-dependent and
    /// checked per slot.
    pub fn admits_employee(&self, emp: &Employee) -> bool {
        if !self.schemes.admits(emp.scheme) {
            return false;
        }
        if !self.admits_rank(&emp.rank) {
            return false;
        }
        if !self.gender.admits(emp.gender) {
            return false;
        }
        if let Some(white) = &self.whitelist {
            if !white.contains(&emp.id) {
                return false;
            }
        }
        if self.blacklist.contains(&emp.id) {
            return false;
        }
        true
    }
}

/// How requirement headcount is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RosteringBasis {
    /// The preprocessor fixes the employee count.
    DemandBased,
    /// Template-driven: positional slots, headcount deduced.
    OutcomeBased,
}

/// Rotation-offset assignment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetMode {
    /// Offsets distributed round-robin over the cycle.
    Auto,
    /// Each employee inherits their organizational unit's declared offset.
    OuOffsets,
    /// Offsets become solver decision variables.
    SolverOptimized,
}

/// A demand item groups requirements under one rostering basis.
#[derive(Debug, Clone)]
pub struct DemandItem {
    pub id: String,
    pub rostering_basis: RosteringBasis,
    pub min_staff_threshold_pct: f64,
    pub offset_mode: OffsetMode,
    pub ou_offsets: BTreeMap<String, i64>,
    pub requirements: Vec<Requirement>,
}

/// Hour calculation method for a monthly-hour-limits row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HourMethod {
    WeeklyThreshold,
    DailyProrated,
    MonthlyCumulative,
}

/// Per-month-length limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthLimits {
    pub method: HourMethod,
    pub minimum_contractual_hours: Hours,
    pub max_overtime_hours: Hours,
    pub total_max_hours: Hours,
}

/// One row of the monthly-hour-limits table. `product_type` and
/// `employee_type` of `None` act as wildcards.
#[derive(Debug, Clone)]
pub struct HourLimitRow {
    pub scheme: Scheme,
    pub product_type: Option<String>,
    /// "local" or "foreign"; `None` matches both.
    pub employee_type: Option<String>,
    pub by_month_length: BTreeMap<u32, MonthLimits>,
}

/// Monthly-hour-limits table keyed by (scheme, product type, employee type).
#[derive(Debug, Clone, Default)]
pub struct MonthlyHourLimits {
    pub rows: Vec<HourLimitRow>,
}

impl MonthlyHourLimits {
    /// Most specific matching row wins: exact product/employee type beats a
    /// wildcard.
    pub fn lookup(
        &self,
        scheme: Scheme,
        product_type: &str,
        is_foreign: bool,
        days_in_month: u32,
    ) -> Option<&MonthLimits> {
        let employee_type = if is_foreign { "foreign" } else { "local" };
        let mut best: Option<(&HourLimitRow, u32)> = None;
        for row in &self.rows {
            if row.scheme != scheme {
                continue;
            }
            let mut specificity = 0;
            match &row.product_type {
                Some(p) if p == product_type => specificity += 2,
                Some(_) => continue,
                None => {}
            }
            match &row.employee_type {
                Some(e) if e.eq_ignore_ascii_case(employee_type) => specificity += 1,
                Some(_) => continue,
                None => {}
            }
            if best.is_none_or(|(_, s)| specificity > s) {
                best = Some((row, specificity));
            }
        }
        best.and_then(|(row, _)| row.by_month_length.get(&days_in_month))
    }
}

/// Activation entry in the problem's constraint list.
#[derive(Debug, Clone)]
pub struct ConstraintActivation {
    pub id: String,
    pub enabled: bool,
    pub params: serde_json::Value,
}

/// Objective selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationMode {
    MinimizeEmployeeCount,
    BalanceWorkload,
}

/// Solver configuration carried inside the problem document.
#[derive(Debug, Clone)]
pub struct SolveSettings {
    pub time_limit: Duration,
    pub workers: Option<usize>,
    pub optimization_mode: OptimizationMode,
    pub fallback_to_outcome_based: bool,
    pub auto_optimize_strict_ratio: bool,
    pub ratio_range: AutoRatioRange,
    pub strict_ratio: Option<f64>,
    pub random_seed: u64,
}

impl Default for SolveSettings {
    fn default() -> Self {
        SolveSettings {
            time_limit: Duration::from_secs(30),
            workers: None,
            optimization_mode: OptimizationMode::MinimizeEmployeeCount,
            fallback_to_outcome_based: true,
            auto_optimize_strict_ratio: false,
            ratio_range: AutoRatioRange::DEFAULT,
            strict_ratio: None,
            random_seed: 0,
        }
    }
}

/// Assignment status in results and previous plans. The legacy `OFF` form is
/// rewritten to `OFF_DAY` at ingress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignmentStatus {
    #[serde(rename = "ASSIGNED")]
    Assigned,
    #[serde(rename = "OFF_DAY", alias = "OFF")]
    OffDay,
    #[serde(rename = "UNASSIGNED")]
    Unassigned,
}

/// An assignment from a previously produced plan, fed to the incremental
/// projector.
#[derive(Debug, Clone)]
pub struct PreviousAssignment {
    pub assignment_id: String,
    pub employee_id: Option<String>,
    pub date: NaiveDate,
    pub requirement_id: String,
    pub shift_code: String,
    pub position: Option<u32>,
    pub status: AssignmentStatus,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub hours: crate::hours::HourBreakdown,
}

impl PreviousAssignment {
    pub fn normal_hours(&self) -> Hours {
        self.hours.normal
    }

    pub fn overtime_hours(&self) -> Hours {
        self.hours.overtime
    }
}

#[derive(Debug, Clone)]
pub struct EmployeeDeparture {
    pub employee_id: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct EmployeeLeave {
    pub employee_id: String,
    pub range: DateRange,
}

/// Changes between the previous plan and this re-solve.
#[derive(Debug, Clone, Default)]
pub struct EmployeeChanges {
    /// IDs of employees (present in the pool) joining during the sub-window.
    pub new_joiners: Vec<String>,
    pub departures: Vec<EmployeeDeparture>,
    pub long_leaves: Vec<EmployeeLeave>,
}

/// Incremental re-solve request block.
#[derive(Debug, Clone)]
pub struct IncrementalBlock {
    pub cutoff_date: NaiveDate,
    pub solve_from: NaiveDate,
    pub solve_to: NaiveDate,
    pub previous_assignments: Vec<PreviousAssignment>,
    pub employee_changes: EmployeeChanges,
}

/// Top-level validated problem. Owns every entity for the duration of one
/// solve.
#[derive(Debug, Clone)]
pub struct Problem {
    pub schema_version: String,
    pub planning_reference: Option<String>,
    pub horizon: DateRange,
    pub public_holidays: BTreeSet<NaiveDate>,
    pub shifts: Vec<ShiftType>,
    pub employees: Vec<Employee>,
    pub demand_items: Vec<DemandItem>,
    pub hour_limits: MonthlyHourLimits,
    pub constraints: Vec<ConstraintActivation>,
    pub solver: SolveSettings,
    pub incremental: Option<IncrementalBlock>,
}

impl Problem {
    /// Parses and normalizes a JSON problem document.
    pub fn from_json(doc: &str) -> crate::error::Result<Problem> {
        ingress::parse_problem(doc)
    }

    pub fn shift(&self, code: &str) -> Option<&ShiftType> {
        self.shifts.iter().find(|s| s.code == code)
    }

    /// Iterates `(demand_item, requirement)` pairs in document order.
    pub fn requirements(&self) -> impl Iterator<Item = (&DemandItem, &Requirement)> {
        self.demand_items
            .iter()
            .flat_map(|d| d.requirements.iter().map(move |r| (d, r)))
    }

    /// Total requested headcount across all requirements.
    pub fn total_headcount(&self) -> u32 {
        self.requirements()
            .map(|(_, r)| r.headcount_or_default())
            .sum()
    }

    /// Net hours of a requirement's first shift, defaulting to 11 h when no
    /// shift matches the pattern.
    pub fn shift_net_hours(&self, requirement: &Requirement) -> Hours {
        requirement
            .shift_codes
            .first()
            .and_then(|code| self.shift(code))
            .map(|s| s.net_hours())
            .unwrap_or(Hours::from_whole(11))
    }
}
