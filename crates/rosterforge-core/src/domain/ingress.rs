//! Problem-document ingress.
//!
//! Parses the JSON problem document, honoring every backward-compatibility
//! form the wire format accumulated: singular vs plural `scheme`/`rankId`,
//! "Any"/"Global" wildcards, flat vs grouped qualification lists, boolean vs
//! string `fixedRotationOffset`, legacy `OFF` statuses. Everything is
//! canonicalized on entry; the original rank form is remembered so results
//! can round-trip it. Validation failures carry a JSON Pointer to the
//! offending location.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::Deserialize;

use crate::calendar::{DateRange, WeekdaySet};
use crate::error::{EngineError, Result};
use crate::hours::Hours;
use crate::pattern::WorkPattern;
use crate::scheme::{Gender, Scheme};

use super::{
    AssignmentStatus, AutoRatioRange, ConstraintActivation, DemandItem, Employee,
    EmployeeChanges, EmployeeDeparture, EmployeeLeave, HourLimitRow, HourMethod,
    IncrementalBlock, LeaveKind, LeaveRecord, MatchType, MonthLimits, MonthlyHourLimits,
    OffsetMode, OptimizationMode, PreviousAssignment, Problem, Qualification,
    QualificationGroup, RankForm, Requirement, RosteringBasis, SchemeFilter, ShiftType,
    SolveSettings,
};

/// A field that may arrive as one value or a list of values.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(vs) => vs,
        }
    }
}

/// `fixedRotationOffset` arrived historically as a boolean, later as a mode
/// string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum BoolOrString {
    Bool(bool),
    Str(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProblemDoc {
    schema_version: String,
    #[serde(default)]
    planning_reference: Option<String>,
    planning_horizon: HorizonDoc,
    #[serde(default)]
    public_holidays: Vec<NaiveDate>,
    #[serde(default)]
    shifts: Vec<ShiftDoc>,
    #[serde(default)]
    employees: Vec<EmployeeDoc>,
    #[serde(default)]
    demand_items: Vec<DemandItemDoc>,
    #[serde(default)]
    monthly_hour_limits: Vec<HourLimitRowDoc>,
    #[serde(default)]
    constraint_list: Vec<ConstraintDoc>,
    #[serde(default)]
    solver_config: Option<SolverConfigDoc>,
    #[serde(default, alias = "incrementalSolve")]
    incremental: Option<IncrementalDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HorizonDoc {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShiftDoc {
    code: String,
    start_time: String,
    end_time: String,
    gross_hours: f64,
    #[serde(default)]
    lunch_break: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DateRangeDoc {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QualificationDoc {
    Code(String),
    Full {
        code: String,
        #[serde(default, rename = "validFrom")]
        valid_from: Option<NaiveDate>,
        #[serde(default)]
        expiry: Option<NaiveDate>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeaveDoc {
    #[serde(alias = "type")]
    leave_type: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmployeeDoc {
    employee_id: String,
    scheme: String,
    #[serde(alias = "rankId")]
    rank: String,
    #[serde(default)]
    product_type: String,
    #[serde(default, alias = "ou")]
    organizational_unit: String,
    #[serde(default)]
    team: Option<String>,
    #[serde(default)]
    gender: Option<String>,
    #[serde(default)]
    is_foreign: bool,
    #[serde(default)]
    qualifications: Vec<QualificationDoc>,
    #[serde(default, alias = "unavailability")]
    unavailable_dates: Vec<DateRangeDoc>,
    #[serde(default)]
    rotation_offset: Option<i64>,
    #[serde(default)]
    leaves: Vec<LeaveDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QualGroupDoc {
    group_id: String,
    #[serde(default)]
    match_type: Option<String>,
    #[serde(alias = "codes")]
    qualification_codes: Vec<String>,
}

/// Qualifications arrive either as a flat code list (one ALL group) or as
/// explicit groups.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QualificationsDoc {
    Flat(Vec<String>),
    Groups(Vec<QualGroupDoc>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AutoRatioDoc {
    min: f64,
    max: f64,
    step: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequirementDoc {
    requirement_id: String,
    #[serde(default)]
    headcount: Option<u32>,
    work_pattern: Vec<String>,
    #[serde(default)]
    coverage_anchor: Option<NaiveDate>,
    #[serde(default)]
    coverage_days: Option<Vec<String>>,
    #[serde(default)]
    shift_codes: Option<OneOrMany<String>>,
    #[serde(default)]
    shift_code: Option<String>,
    #[serde(default)]
    schemes: Option<OneOrMany<String>>,
    #[serde(default)]
    scheme: Option<String>,
    #[serde(default)]
    rank_ids: Option<OneOrMany<String>>,
    #[serde(default)]
    rank_id: Option<String>,
    #[serde(default)]
    gender: Option<String>,
    #[serde(default)]
    qualifications: Option<QualificationsDoc>,
    #[serde(default)]
    whitelist: Option<Vec<String>>,
    #[serde(default)]
    blacklist: Option<Vec<String>>,
    #[serde(
        default,
        rename = "enableApgdD10",
        alias = "enableAPGD-D10",
        alias = "enableAPGDD10"
    )]
    enable_apgd_d10: bool,
    #[serde(default)]
    strict_adherence_ratio: Option<f64>,
    #[serde(default)]
    auto_ratio: Option<AutoRatioDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DemandItemDoc {
    demand_id: String,
    #[serde(default)]
    rostering_basis: Option<String>,
    #[serde(default)]
    min_staff_threshold_percentage: Option<f64>,
    #[serde(default)]
    rotation_offset_mode: Option<String>,
    #[serde(default)]
    fixed_rotation_offset: Option<BoolOrString>,
    #[serde(default)]
    ou_offsets: Option<BTreeMap<String, i64>>,
    #[serde(default)]
    requirements: Vec<RequirementDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonthLimitsDoc {
    hour_calculation_method: String,
    #[serde(default)]
    minimum_contractual_hours: f64,
    #[serde(default)]
    max_overtime_hours: f64,
    #[serde(default)]
    total_max_hours: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HourLimitRowDoc {
    scheme: String,
    #[serde(default)]
    product_type: Option<String>,
    #[serde(default)]
    employee_type: Option<String>,
    /// Keyed by days-in-month ("28".."31").
    limits: BTreeMap<String, MonthLimitsDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConstraintDoc {
    id: String,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    params: serde_json::Value,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolverConfigDoc {
    #[serde(default, alias = "timeLimitSecs")]
    time_limit_seconds: Option<u64>,
    #[serde(default)]
    workers: Option<usize>,
    #[serde(default)]
    optimization_mode: Option<String>,
    #[serde(default)]
    fallback_to_outcome_based: Option<bool>,
    #[serde(default)]
    auto_optimize_strict_ratio: Option<bool>,
    #[serde(default)]
    ratio_min: Option<f64>,
    #[serde(default)]
    ratio_max: Option<f64>,
    #[serde(default)]
    ratio_step: Option<f64>,
    #[serde(default)]
    strict_adherence_ratio: Option<f64>,
    #[serde(default)]
    random_seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrevHoursDoc {
    #[serde(default)]
    gross: f64,
    #[serde(default)]
    lunch: f64,
    #[serde(default)]
    normal: f64,
    #[serde(default)]
    overtime: f64,
    #[serde(default)]
    public_holiday: f64,
    #[serde(default)]
    rest_day_pay: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrevAssignmentDoc {
    assignment_id: String,
    #[serde(default)]
    employee_id: Option<String>,
    date: NaiveDate,
    requirement_id: String,
    shift_code: String,
    #[serde(default)]
    position: Option<u32>,
    status: AssignmentStatus,
    start_date_time: NaiveDateTime,
    end_date_time: NaiveDateTime,
    #[serde(default)]
    hours: Option<PrevHoursDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepartureDoc {
    employee_id: String,
    date: NaiveDate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LongLeaveDoc {
    employee_id: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct EmployeeChangesDoc {
    #[serde(default)]
    new_joiners: Vec<String>,
    #[serde(default)]
    departures: Vec<DepartureDoc>,
    #[serde(default)]
    long_leaves: Vec<LongLeaveDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncrementalDoc {
    cutoff_date: NaiveDate,
    solve_from_date: NaiveDate,
    solve_to_date: NaiveDate,
    #[serde(default)]
    previous_assignments: Vec<PrevAssignmentDoc>,
    #[serde(default)]
    employee_changes: Option<EmployeeChangesDoc>,
}

/// Parses and canonicalizes a problem document.
pub fn parse_problem(doc: &str) -> Result<Problem> {
    let doc: ProblemDoc = serde_json::from_str(doc)
        .map_err(|e| EngineError::invalid_input("", format!("malformed document: {e}")))?;
    normalize_problem(doc)
}

fn normalize_problem(doc: ProblemDoc) -> Result<Problem> {
    if doc.planning_horizon.end_date < doc.planning_horizon.start_date {
        return Err(EngineError::invalid_input(
            "/planningHorizon",
            "endDate precedes startDate",
        ));
    }
    let horizon = DateRange::new(doc.planning_horizon.start_date, doc.planning_horizon.end_date);

    let mut shifts = Vec::with_capacity(doc.shifts.len());
    for (i, s) in doc.shifts.into_iter().enumerate() {
        shifts.push(normalize_shift(s, &format!("/shifts/{i}"))?);
    }

    let mut employees = Vec::with_capacity(doc.employees.len());
    let mut seen_ids = BTreeSet::new();
    for (i, e) in doc.employees.into_iter().enumerate() {
        let pointer = format!("/employees/{i}");
        if !seen_ids.insert(e.employee_id.clone()) {
            return Err(EngineError::invalid_input(
                format!("{pointer}/employeeId"),
                format!("duplicate employee id '{}'", e.employee_id),
            ));
        }
        employees.push(normalize_employee(e, &pointer)?);
    }

    let mut demand_items = Vec::with_capacity(doc.demand_items.len());
    for (i, d) in doc.demand_items.into_iter().enumerate() {
        demand_items.push(normalize_demand_item(
            d,
            horizon.start,
            &shifts,
            &format!("/demandItems/{i}"),
        )?);
    }

    // Requirements that enable APGD-D10 mark every employee they admit.
    let apgd_requirements: Vec<&Requirement> = demand_items
        .iter()
        .flat_map(|d| d.requirements.iter())
        .filter(|r| r.enable_apgd_d10)
        .collect();
    for emp in &mut employees {
        if apgd_requirements.iter().any(|r| r.admits_employee(emp)) {
            emp.apgd_d10 = true;
        }
    }

    let mut rows = Vec::with_capacity(doc.monthly_hour_limits.len());
    for (i, row) in doc.monthly_hour_limits.into_iter().enumerate() {
        rows.push(normalize_hour_limits(row, &format!("/monthlyHourLimits/{i}"))?);
    }

    let constraints = doc
        .constraint_list
        .into_iter()
        .map(|c| ConstraintActivation {
            id: c.id,
            enabled: c.enabled,
            params: c.params,
        })
        .collect();

    let solver = normalize_solver_config(doc.solver_config);
    let incremental = match doc.incremental {
        Some(inc) => Some(normalize_incremental(inc, &horizon)?),
        None => None,
    };

    Ok(Problem {
        schema_version: doc.schema_version,
        planning_reference: doc.planning_reference,
        horizon,
        public_holidays: doc.public_holidays.into_iter().collect(),
        shifts,
        employees,
        demand_items,
        hour_limits: MonthlyHourLimits { rows },
        constraints,
        solver,
        incremental,
    })
}

fn parse_time(raw: &str, pointer: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| EngineError::invalid_input(pointer, format!("invalid time '{raw}'")))
}

fn normalize_shift(doc: ShiftDoc, pointer: &str) -> Result<ShiftType> {
    if doc.gross_hours <= 0.0 {
        return Err(EngineError::invalid_input(
            format!("{pointer}/grossHours"),
            "gross hours must be positive",
        ));
    }
    Ok(ShiftType {
        code: doc.code,
        start_time: parse_time(&doc.start_time, &format!("{pointer}/startTime"))?,
        end_time: parse_time(&doc.end_time, &format!("{pointer}/endTime"))?,
        gross_hours: Hours::from_f64(doc.gross_hours),
        lunch_break: doc.lunch_break.map(Hours::from_f64),
    })
}

fn normalize_employee(doc: EmployeeDoc, pointer: &str) -> Result<Employee> {
    let scheme = Scheme::parse(&doc.scheme, &format!("{pointer}/scheme"))?;
    let gender = match &doc.gender {
        Some(g) => Gender::parse(g, &format!("{pointer}/gender"))?,
        None => Gender::Any,
    };
    if let Some(offset) = doc.rotation_offset {
        if offset < 0 {
            return Err(EngineError::invalid_input(
                format!("{pointer}/rotationOffset"),
                "rotation offset must be non-negative",
            ));
        }
    }
    let qualifications = doc
        .qualifications
        .into_iter()
        .map(|q| match q {
            QualificationDoc::Code(code) => Qualification {
                code,
                valid_from: None,
                expiry: None,
            },
            QualificationDoc::Full {
                code,
                valid_from,
                expiry,
            } => Qualification {
                code,
                valid_from,
                expiry,
            },
        })
        .collect();
    let mut leaves = Vec::with_capacity(doc.leaves.len());
    for (i, l) in doc.leaves.into_iter().enumerate() {
        let kind = match l.leave_type.to_ascii_lowercase().as_str() {
            "annual" => LeaveKind::Annual,
            "medical" => LeaveKind::Medical,
            "long" => LeaveKind::Long,
            other => {
                return Err(EngineError::invalid_input(
                    format!("{pointer}/leaves/{i}/leaveType"),
                    format!("unknown leave type '{other}'"),
                ))
            }
        };
        leaves.push(LeaveRecord {
            kind,
            range: DateRange::new(l.start_date, l.end_date),
        });
    }
    Ok(Employee {
        id: doc.employee_id,
        scheme,
        rank: doc.rank,
        product_type: doc.product_type,
        organizational_unit: doc.organizational_unit,
        team: doc.team,
        gender,
        is_foreign: doc.is_foreign,
        apgd_d10: false,
        qualifications,
        unavailable: doc
            .unavailable_dates
            .into_iter()
            .map(|r| DateRange::new(r.start_date, r.end_date))
            .collect(),
        rotation_offset: doc.rotation_offset.map(|o| o as u32),
        leaves,
    })
}

fn parse_weekday(raw: &str, pointer: &str) -> Result<Weekday> {
    match raw.to_ascii_lowercase().as_str() {
        "mon" | "monday" => Ok(Weekday::Mon),
        "tue" | "tuesday" => Ok(Weekday::Tue),
        "wed" | "wednesday" => Ok(Weekday::Wed),
        "thu" | "thursday" => Ok(Weekday::Thu),
        "fri" | "friday" => Ok(Weekday::Fri),
        "sat" | "saturday" => Ok(Weekday::Sat),
        "sun" | "sunday" => Ok(Weekday::Sun),
        other => Err(EngineError::invalid_input(
            pointer,
            format!("unknown weekday '{other}'"),
        )),
    }
}

fn normalize_requirement(
    doc: RequirementDoc,
    horizon_start: NaiveDate,
    shifts: &[ShiftType],
    pointer: &str,
) -> Result<Requirement> {
    let work_pattern = WorkPattern::parse(&doc.work_pattern, &format!("{pointer}/workPattern"))?;

    // Singular and plural forms are equivalent; plural wins when both given.
    let (schemes, _) = match (doc.schemes, doc.scheme) {
        (Some(list), _) => (list.into_vec(), RankForm::Plural),
        (None, Some(one)) => (vec![one], RankForm::Singular),
        (None, None) => (Vec::new(), RankForm::Plural),
    };
    let scheme_filter = normalize_scheme_filter(&schemes, &format!("{pointer}/schemes"))?;

    let (rank_ids, rank_form) = match (doc.rank_ids, doc.rank_id) {
        (Some(list), _) => (list.into_vec(), RankForm::Plural),
        (None, Some(one)) => (vec![one], RankForm::Singular),
        (None, None) => (Vec::new(), RankForm::Plural),
    };

    let mut shift_codes = match (doc.shift_codes, doc.shift_code) {
        (Some(list), _) => list.into_vec(),
        (None, Some(one)) => vec![one],
        (None, None) => Vec::new(),
    };
    if shift_codes.is_empty() {
        shift_codes = work_pattern
            .shift_codes()
            .into_iter()
            .map(String::from)
            .collect();
    }
    for (i, code) in shift_codes.iter().enumerate() {
        if !shifts.iter().any(|s| &s.code == code) {
            return Err(EngineError::invalid_input(
                format!("{pointer}/shiftCodes/{i}"),
                format!("shift code '{code}' is not declared in /shifts"),
            ));
        }
    }

    let gender = match &doc.gender {
        Some(g) => Gender::parse(g, &format!("{pointer}/gender"))?,
        None => Gender::Any,
    };

    let qualification_groups = match doc.qualifications {
        None => Vec::new(),
        // A flat code list is equivalent to a single ALL group.
        Some(QualificationsDoc::Flat(codes)) if codes.is_empty() => Vec::new(),
        Some(QualificationsDoc::Flat(codes)) => vec![QualificationGroup {
            group_id: "default".to_string(),
            match_type: MatchType::All,
            codes,
        }],
        Some(QualificationsDoc::Groups(groups)) => {
            let mut out = Vec::with_capacity(groups.len());
            for (i, g) in groups.into_iter().enumerate() {
                let match_type = match g.match_type.as_deref() {
                    None | Some("ALL") | Some("all") => MatchType::All,
                    Some("ANY") | Some("any") => MatchType::Any,
                    Some(other) => {
                        return Err(EngineError::invalid_input(
                            format!("{pointer}/qualifications/{i}/matchType"),
                            format!("unknown match type '{other}'"),
                        ))
                    }
                };
                out.push(QualificationGroup {
                    group_id: g.group_id,
                    match_type,
                    codes: g.qualification_codes,
                });
            }
            out
        }
    };

    let coverage_days = match doc.coverage_days {
        None => WeekdaySet::ALL,
        Some(days) => {
            let mut parsed = Vec::with_capacity(days.len());
            for (i, d) in days.iter().enumerate() {
                parsed.push(parse_weekday(d, &format!("{pointer}/coverageDays/{i}"))?);
            }
            WeekdaySet::from_weekdays(parsed)
        }
    };

    Ok(Requirement {
        id: doc.requirement_id,
        headcount: doc.headcount,
        work_pattern,
        coverage_anchor: doc.coverage_anchor.unwrap_or(horizon_start),
        coverage_days,
        shift_codes,
        schemes: scheme_filter,
        rank_ids,
        rank_form,
        gender,
        qualification_groups,
        whitelist: doc.whitelist.map(|w| w.into_iter().collect()),
        blacklist: doc.blacklist.unwrap_or_default().into_iter().collect(),
        enable_apgd_d10: doc.enable_apgd_d10,
        strict_ratio: doc.strict_adherence_ratio,
        auto_ratio: doc.auto_ratio.map(|a| AutoRatioRange {
            min: a.min,
            max: a.max,
            step: a.step,
        }),
    })
}

fn normalize_scheme_filter(raw: &[String], pointer: &str) -> Result<SchemeFilter> {
    if raw.is_empty() {
        return Ok(SchemeFilter::Any);
    }
    if raw
        .iter()
        .any(|s| matches!(s.trim(), "Any" | "any" | "ANY" | "Global" | "global"))
    {
        return Ok(SchemeFilter::Any);
    }
    let mut set = Vec::with_capacity(raw.len());
    for (i, s) in raw.iter().enumerate() {
        let scheme = Scheme::parse(s, &format!("{pointer}/{i}"))?;
        if !set.contains(&scheme) {
            set.push(scheme);
        }
    }
    Ok(SchemeFilter::Set(set))
}

fn normalize_demand_item(
    doc: DemandItemDoc,
    horizon_start: NaiveDate,
    shifts: &[ShiftType],
    pointer: &str,
) -> Result<DemandItem> {
    let rostering_basis = match doc.rostering_basis.as_deref() {
        None | Some("demandBased") | Some("demand_based") => RosteringBasis::DemandBased,
        Some("outcomeBased") | Some("outcome_based") => RosteringBasis::OutcomeBased,
        Some(other) => {
            return Err(EngineError::invalid_input(
                format!("{pointer}/rosteringBasis"),
                format!("unknown rostering basis '{other}'"),
            ))
        }
    };

    let offset_mode = resolve_offset_mode(
        doc.rotation_offset_mode.as_deref(),
        doc.fixed_rotation_offset,
        pointer,
    )?;

    let mut requirements = Vec::with_capacity(doc.requirements.len());
    for (i, r) in doc.requirements.into_iter().enumerate() {
        requirements.push(normalize_requirement(
            r,
            horizon_start,
            shifts,
            &format!("{pointer}/requirements/{i}"),
        )?);
    }

    Ok(DemandItem {
        id: doc.demand_id,
        rostering_basis,
        min_staff_threshold_pct: doc.min_staff_threshold_percentage.unwrap_or(100.0),
        offset_mode,
        ou_offsets: doc.ou_offsets.unwrap_or_default(),
        requirements,
    })
}

fn resolve_offset_mode(
    mode: Option<&str>,
    legacy: Option<BoolOrString>,
    pointer: &str,
) -> Result<OffsetMode> {
    if let Some(mode) = mode {
        return parse_offset_mode(mode, &format!("{pointer}/rotationOffsetMode"));
    }
    match legacy {
        // Legacy boolean: true fixed the offsets (auto distribution), false
        // left them to the solver.
        Some(BoolOrString::Bool(true)) | None => Ok(OffsetMode::Auto),
        Some(BoolOrString::Bool(false)) => Ok(OffsetMode::SolverOptimized),
        Some(BoolOrString::Str(s)) => {
            parse_offset_mode(&s, &format!("{pointer}/fixedRotationOffset"))
        }
    }
}

fn parse_offset_mode(raw: &str, pointer: &str) -> Result<OffsetMode> {
    match raw {
        "auto" | "Auto" => Ok(OffsetMode::Auto),
        "ou_offsets" | "ouOffsets" => Ok(OffsetMode::OuOffsets),
        "solver_optimized" | "solverOptimized" => Ok(OffsetMode::SolverOptimized),
        other => Err(EngineError::invalid_input(
            pointer,
            format!("unknown rotation offset mode '{other}'"),
        )),
    }
}

fn normalize_hour_limits(doc: HourLimitRowDoc, pointer: &str) -> Result<HourLimitRow> {
    let scheme = Scheme::parse(&doc.scheme, &format!("{pointer}/scheme"))?;
    let mut by_month_length = BTreeMap::new();
    for (key, limits) in doc.limits {
        let days: u32 = key.parse().map_err(|_| {
            EngineError::invalid_input(
                format!("{pointer}/limits/{key}"),
                "month-length key must be a day count (28-31)",
            )
        })?;
        let method = match limits.hour_calculation_method.as_str() {
            "weekly_threshold" | "weeklyThreshold" => HourMethod::WeeklyThreshold,
            "daily_prorated" | "dailyProrated" => HourMethod::DailyProrated,
            "monthly_cumulative" | "monthlyCumulative" => HourMethod::MonthlyCumulative,
            other => {
                return Err(EngineError::invalid_input(
                    format!("{pointer}/limits/{key}/hourCalculationMethod"),
                    format!("unknown hour calculation method '{other}'"),
                ))
            }
        };
        by_month_length.insert(
            days,
            MonthLimits {
                method,
                minimum_contractual_hours: Hours::from_f64(limits.minimum_contractual_hours),
                max_overtime_hours: Hours::from_f64(limits.max_overtime_hours),
                total_max_hours: Hours::from_f64(limits.total_max_hours),
            },
        );
    }
    Ok(HourLimitRow {
        scheme,
        product_type: doc.product_type,
        employee_type: doc.employee_type,
        by_month_length,
    })
}

fn normalize_solver_config(doc: Option<SolverConfigDoc>) -> SolveSettings {
    let defaults = SolveSettings::default();
    let Some(doc) = doc else {
        return defaults;
    };
    let optimization_mode = match doc.optimization_mode.as_deref() {
        Some("balance_workload") | Some("balanceWorkload") => OptimizationMode::BalanceWorkload,
        _ => OptimizationMode::MinimizeEmployeeCount,
    };
    let ratio_range = AutoRatioRange {
        min: doc.ratio_min.unwrap_or(AutoRatioRange::DEFAULT.min),
        max: doc.ratio_max.unwrap_or(AutoRatioRange::DEFAULT.max),
        step: doc.ratio_step.unwrap_or(AutoRatioRange::DEFAULT.step),
    };
    SolveSettings {
        time_limit: doc
            .time_limit_seconds
            .map(Duration::from_secs)
            .unwrap_or(defaults.time_limit),
        workers: doc.workers,
        optimization_mode,
        fallback_to_outcome_based: doc
            .fallback_to_outcome_based
            .unwrap_or(defaults.fallback_to_outcome_based),
        auto_optimize_strict_ratio: doc.auto_optimize_strict_ratio.unwrap_or(false),
        ratio_range,
        strict_ratio: doc.strict_adherence_ratio,
        random_seed: doc.random_seed.unwrap_or(0),
    }
}

fn normalize_incremental(doc: IncrementalDoc, horizon: &DateRange) -> Result<IncrementalBlock> {
    if doc.solve_to_date < doc.solve_from_date {
        return Err(EngineError::invalid_input(
            "/incrementalSolve",
            "solveToDate precedes solveFromDate",
        ));
    }
    if !horizon.contains(doc.solve_from_date) || !horizon.contains(doc.solve_to_date) {
        return Err(EngineError::invalid_input(
            "/incrementalSolve",
            "solve window must lie within the planning horizon",
        ));
    }
    let previous_assignments = doc
        .previous_assignments
        .into_iter()
        .map(|p| {
            let hours = p.hours.unwrap_or_default();
            PreviousAssignment {
                assignment_id: p.assignment_id,
                employee_id: p.employee_id,
                date: p.date,
                requirement_id: p.requirement_id,
                shift_code: p.shift_code,
                position: p.position,
                status: p.status,
                start: p.start_date_time,
                end: p.end_date_time,
                hours: crate::hours::HourBreakdown {
                    gross: Hours::from_f64(hours.gross),
                    lunch: Hours::from_f64(hours.lunch),
                    normal: Hours::from_f64(hours.normal),
                    overtime: Hours::from_f64(hours.overtime),
                    public_holiday: Hours::from_f64(hours.public_holiday),
                    rest_day_pay: Hours::from_f64(hours.rest_day_pay),
                },
            }
        })
        .collect();
    let changes = doc.employee_changes.unwrap_or_default();
    Ok(IncrementalBlock {
        cutoff_date: doc.cutoff_date,
        solve_from: doc.solve_from_date,
        solve_to: doc.solve_to_date,
        previous_assignments,
        employee_changes: EmployeeChanges {
            new_joiners: changes.new_joiners,
            departures: changes
                .departures
                .into_iter()
                .map(|d| EmployeeDeparture {
                    employee_id: d.employee_id,
                    date: d.date,
                })
                .collect(),
            long_leaves: changes
                .long_leaves
                .into_iter()
                .map(|l| EmployeeLeave {
                    employee_id: l.employee_id,
                    range: DateRange::new(l.start_date, l.end_date),
                })
                .collect(),
        },
    })
}
