//! Constraint module catalog and model assembly.
//!
//! Modules are a closed registry (no runtime scanning): each one implements
//! [`ConstraintModule`] and is registered in [`registry`]. Activation comes
//! from the problem's constraint list by id; an empty list activates the
//! default set (every hard module plus strict adherence). Purely static
//! modules (gender, rank, qualifications, availability, fixed offsets) act
//! as filters during variable creation; the rest emit clauses after all
//! variables exist.

mod consecutive_days;
mod daily_hours;
mod monthly_caps;
mod rest_period;
mod scheme_p;
mod weekly_hours;
mod weekly_rest;


use std::collections::{BTreeSet, HashMap};

use chrono::{Days, NaiveDate};

use rosterforge_core::domain::{
    Employee, OffsetMode, OptimizationMode, Problem, RosteringBasis,
};
use rosterforge_core::pattern::PatternToken;
use rosterforge_core::{DateRange, EmpIdx, EngineError, Hours, Result};
use rosterforge_cp::{CpModel, OffsetVarId, VarId};

use crate::icpmp::PreprocessOutcome;
use crate::incremental::Projection;
use crate::slots::{ReqTable, Slot, SlotTable};

pub use consecutive_days::ConsecutiveDays;
pub use daily_hours::DailyHours;
pub use monthly_caps::{ApgdMonthlyTotal, MonthlyOvertime};
pub use rest_period::RestPeriod;
pub use scheme_p::{SameDayGap, SchemePWeekly};
pub use weekly_hours::WeeklyHours;
pub use weekly_rest::WeeklyRest;

/// Ids of the static filter modules (applied at variable creation).
pub const FILTER_MODULE_IDS: &[&str] = &[
    "C9_gender",
    "C11_rank",
    "C_qualifications",
    "C_rotation_offset",
    "C_availability",
    "C_strict_adherence",
];

/// A clause-emitting constraint module.
pub trait ConstraintModule: Send + Sync {
    fn id(&self) -> &'static str;
    fn emit(&self, ctx: &BuildContext<'_>, model: &mut CpModel) -> Result<()>;
}

/// The closed registry of emitting modules, in emission order.
pub fn registry() -> Vec<Box<dyn ConstraintModule>> {
    vec![
        Box::new(DailyHours),
        Box::new(WeeklyHours),
        Box::new(ConsecutiveDays),
        Box::new(RestPeriod),
        Box::new(WeeklyRest),
        Box::new(SchemePWeekly),
        Box::new(SameDayGap),
        Box::new(MonthlyOvertime),
        Box::new(ApgdMonthlyTotal),
    ]
}

fn all_module_ids() -> BTreeSet<&'static str> {
    let mut ids: BTreeSet<&'static str> = FILTER_MODULE_IDS.iter().copied().collect();
    for m in registry() {
        ids.insert(m.id());
    }
    ids
}

/// Which modules are active, with their parameters.
#[derive(Debug, Clone)]
pub struct ActiveSet {
    enabled: BTreeSet<String>,
    params: HashMap<String, serde_json::Value>,
}

impl ActiveSet {
    /// Builds the active set from the problem's constraint list. An empty
    /// list activates everything; unknown ids are input errors.
    pub fn from_problem(problem: &Problem) -> Result<ActiveSet> {
        let known = all_module_ids();
        if problem.constraints.is_empty() {
            return Ok(ActiveSet {
                enabled: known.iter().map(|s| s.to_string()).collect(),
                params: HashMap::new(),
            });
        }
        let mut enabled = BTreeSet::new();
        let mut params = HashMap::new();
        for (i, activation) in problem.constraints.iter().enumerate() {
            if !known.contains(activation.id.as_str()) {
                return Err(EngineError::invalid_input(
                    format!("/constraintList/{i}/id"),
                    format!("unknown constraint id '{}'", activation.id),
                ));
            }
            if activation.enabled {
                enabled.insert(activation.id.clone());
                if !activation.params.is_null() {
                    params.insert(activation.id.clone(), activation.params.clone());
                }
            }
        }
        Ok(ActiveSet { enabled, params })
    }

    #[inline]
    pub fn is_enabled(&self, id: &str) -> bool {
        self.enabled.contains(id)
    }

    pub fn param_f64(&self, id: &str, key: &str) -> Option<f64> {
        self.params.get(id)?.get(key)?.as_f64()
    }
}

/// Everything the modules need to emit clauses.
pub struct BuildContext<'a> {
    pub problem: &'a Problem,
    pub reqs: &'a ReqTable,
    pub slots: &'a SlotTable,
    pub plans: &'a PreprocessOutcome,
    pub projection: Option<&'a Projection>,
    pub window: DateRange,
    pub active: &'a ActiveSet,
    pub strict_ratio: Option<f64>,
}

impl BuildContext<'_> {
    /// Net hours of the shift behind a variable's slot.
    pub fn net_of(&self, model: &CpModel, var: VarId) -> Hours {
        let slot = self.slots.get(model.var(var).slot);
        self.problem
            .shift(&slot.shift_code)
            .map(|s| s.net_hours())
            .unwrap_or(Hours::from_whole(11))
    }

    pub fn slot_of<'s>(&'s self, model: &CpModel, var: VarId) -> &'s Slot {
        self.slots.get(model.var(var).slot)
    }

    pub fn employee(&self, emp: EmpIdx) -> &Employee {
        &self.problem.employees[emp.index()]
    }

    /// Locked projection prior for an employee, if any.
    pub fn prior_of(&self, emp: EmpIdx) -> Option<&crate::incremental::EmployeePrior> {
        self.projection?.prior_for(&self.employee(emp).id)
    }

    /// Day groups of one employee, sorted by date.
    pub fn emp_day_groups(&self, model: &CpModel, emp: EmpIdx) -> Vec<(NaiveDate, u32)> {
        let mut groups: Vec<(NaiveDate, u32)> = model
            .day_groups()
            .iter()
            .enumerate()
            .filter(|(_, g)| g.emp == emp)
            .map(|(i, g)| (g.date, i as u32))
            .collect();
        groups.sort();
        groups
    }
}

/// Assembles the full CP model: creates variables behind the static filters,
/// then lets every active module emit its clauses.
pub fn assemble(ctx: &BuildContext<'_>) -> Result<CpModel> {
    let mut model = CpModel::new(ctx.slots.len(), ctx.problem.employees.len());
    create_variables(ctx, &mut model)?;

    for module in registry() {
        if ctx.active.is_enabled(module.id()) {
            module.emit(ctx, &mut model)?;
        }
    }

    model.objective = objective_for(ctx);
    tracing::debug!(
        vars = model.var_count(),
        linears = model.linears().len(),
        windows = model.windows().len(),
        "constraint model assembled"
    );
    Ok(model)
}

fn objective_for(ctx: &BuildContext<'_>) -> rosterforge_cp::model::Objective {
    let mut objective = rosterforge_cp::model::Objective::default();
    match ctx.problem.solver.optimization_mode {
        OptimizationMode::MinimizeEmployeeCount => {
            objective.employee_weight = 10_000;
            objective.balance_weight = 1;
        }
        OptimizationMode::BalanceWorkload => {
            objective.employee_weight = 1_000;
            objective.balance_weight = 100;
        }
    }
    // In solver-optimized mode the off-pattern flag is dynamic; the budget
    // only applies to fixed offsets.
    let any_fixed = ctx
        .reqs
        .iter()
        .any(|(_, e)| e.offset_mode != OffsetMode::SolverOptimized);
    if any_fixed && ctx.active.is_enabled("C_strict_adherence") {
        objective.strict_ratio = ctx.strict_ratio;
    }
    objective
}

/// Creates `x[slot, employee]` variables for pairs passing the static
/// filters, including ICPMP selection, and registers offset variables for
/// solver-optimized requirements.
fn create_variables(ctx: &BuildContext<'_>, model: &mut CpModel) -> Result<()> {
    // Offset vars per (requirement, selected employee) in solver mode.
    let mut offset_vars: HashMap<(usize, EmpIdx), OffsetVarId> = HashMap::new();
    for (req_idx, entry) in ctx.reqs.iter() {
        if entry.offset_mode != OffsetMode::SolverOptimized {
            continue;
        }
        let Some(plan) = ctx.plans.plan_for(req_idx) else {
            continue;
        };
        let work_mask: Vec<bool> = entry
            .req
            .work_pattern
            .tokens()
            .iter()
            .map(PatternToken::is_work)
            .collect();
        for &emp in &plan.selected {
            let ov = model.add_offset_var(emp, work_mask.clone());
            offset_vars.insert((req_idx.index(), emp), ov);
        }
    }

    let allow_off_pattern = ctx
        .strict_ratio
        .map(|r| r < 1.0)
        .unwrap_or(false)
        && ctx.active.is_enabled("C_strict_adherence");

    for (slot_idx, slot) in ctx.slots.iter() {
        let entry = ctx.reqs.get(slot.req);
        let req = &entry.req;
        let Some(plan) = ctx.plans.plan_for(slot.req) else {
            continue;
        };

        for &emp_idx in &plan.selected {
            let emp = ctx.employee(emp_idx);

            // Scheme compatibility and whitelist/blacklist always apply.
            if !req.schemes.admits(emp.scheme) {
                continue;
            }
            if let Some(white) = &req.whitelist {
                if !white.contains(&emp.id) {
                    continue;
                }
            }
            if req.blacklist.contains(&emp.id) {
                continue;
            }
            if ctx.active.is_enabled("C11_rank") && !req.admits_rank(&emp.rank) {
                continue;
            }
            if ctx.active.is_enabled("C9_gender") && !req.gender.admits(emp.gender) {
                continue;
            }
            if ctx.active.is_enabled("C_qualifications")
                && !emp.satisfies_groups(&req.qualification_groups, slot.date)
            {
                continue;
            }
            if ctx.active.is_enabled("C_availability") {
                if !emp.is_available_on(slot.date) || emp.on_long_leave(slot.date) {
                    continue;
                }
            }
            if !locked_state_admits(ctx, emp_idx, slot) {
                continue;
            }

            // Rotation-offset alignment.
            let mut off_pattern = false;
            let mut channel = None;
            match entry.offset_mode {
                OffsetMode::SolverOptimized => {
                    let base = req.work_pattern.pattern_day(req.coverage_anchor, slot.date, 0);
                    channel = offset_vars
                        .get(&(slot.req.index(), emp_idx))
                        .map(|&ov| (ov, base as u16));
                }
                OffsetMode::Auto | OffsetMode::OuOffsets => {
                    if ctx.active.is_enabled("C_rotation_offset") {
                        let aligned = match entry.basis {
                            RosteringBasis::OutcomeBased => plan
                                .offsets
                                .get(&emp_idx)
                                .is_some_and(|&k| k == slot.rotation_offset_for_position),
                            RosteringBasis::DemandBased => {
                                let k = plan.offsets.get(&emp_idx).copied().unwrap_or(0);
                                let day = req.work_pattern.pattern_day(
                                    req.coverage_anchor,
                                    slot.date,
                                    k as i64,
                                );
                                req.work_pattern.token_at(day).is_work()
                            }
                        };
                        if !aligned {
                            if !allow_off_pattern {
                                continue;
                            }
                            off_pattern = true;
                        }
                    }
                }
            }

            model.add_var(slot_idx, emp_idx, slot.date, off_pattern, channel);
        }
    }
    Ok(())
}

/// Rejects pairs that would collide with the employee's locked assignments:
/// same-date double booking or a rest-period violation against a locked
/// shift window.
fn locked_state_admits(ctx: &BuildContext<'_>, emp_idx: EmpIdx, slot: &Slot) -> bool {
    let Some(prior) = ctx.prior_of(emp_idx) else {
        return true;
    };
    let emp = ctx.employee(emp_idx);
    let same_day_ok = emp.scheme == rosterforge_core::Scheme::P;

    if !same_day_ok && prior.locked_work_dates.contains(&slot.date) {
        return false;
    }
    let min_rest = emp.scheme.min_rest(emp.effective_apgd_d10(), false);
    let same_day_rest = emp.scheme.min_rest(emp.effective_apgd_d10(), true);
    let adjacent: [Option<NaiveDate>; 3] = [
        slot.date.checked_sub_days(Days::new(1)),
        Some(slot.date),
        slot.date.checked_add_days(Days::new(1)),
    ];
    for &(locked_date, locked_start, locked_end) in &prior.locked_windows {
        if !adjacent.iter().any(|d| *d == Some(locked_date)) {
            continue;
        }
        let rest = if locked_date == slot.date {
            same_day_rest
        } else {
            min_rest
        };
        let rest_minutes = (rest.millis() * 60 / 1000) as i64;
        if slot.start >= locked_end {
            if (slot.start - locked_end).num_minutes() < rest_minutes {
                return false;
            }
        } else if locked_start >= slot.end {
            if (locked_start - slot.end).num_minutes() < rest_minutes {
                return false;
            }
        } else {
            // Overlapping windows.
            return false;
        }
    }
    true
}
