//! The boolean-assignment CP model.
//!
//! Decision variables are `x[slot, employee]` booleans, created only for
//! pairs that pass static eligibility filters. Constraint modules in the
//! engine crate emit the clause forms below; the bundled backend (or any
//! other [`crate::backend::CpBackend`]) searches over them.
//!
//! Clause forms:
//! - per-slot at-most-one (structural: a slot holds at most one chosen var)
//! - pairwise conflicts (rest periods, same-day gaps)
//! - weighted linear sums with an upper bound (hour caps; projected prior
//!   state folds into the bound)
//! - sliding windows over day groups bounding the count of active days
//!   (consecutive-day caps, weekly rest, weekly day-count caps)
//! - a strict-adherence budget limiting off-pattern assignments to a
//!   fraction of the total
//! - per-employee integer offset variables channeled to assignments
//!   (`solver_optimized` rotation mode)

use std::collections::HashMap;

use chrono::NaiveDate;
use smallvec::SmallVec;

use rosterforge_core::{EmpIdx, SlotIdx};

/// Handle to one boolean assignment variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

impl VarId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a per-employee rotation-offset variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OffsetVarId(pub u32);

/// Why a clause exists; carried into unmet-demand explanations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClauseLabel {
    DailyHours,
    WeeklyHours,
    SchemePWeekly,
    ConsecutiveDays,
    RestPeriod,
    SameDayGap,
    WeeklyRest,
    MonthlyOvertime,
    ApgdMonthlyTotal,
    MonthlyTotal,
}

impl std::fmt::Display for ClauseLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ClauseLabel::DailyHours => "daily-hours",
            ClauseLabel::WeeklyHours => "weekly-hours",
            ClauseLabel::SchemePWeekly => "scheme-p-weekly",
            ClauseLabel::ConsecutiveDays => "consecutive-days",
            ClauseLabel::RestPeriod => "rest-period",
            ClauseLabel::SameDayGap => "same-day-gap",
            ClauseLabel::WeeklyRest => "weekly-rest",
            ClauseLabel::MonthlyOvertime => "monthly-overtime",
            ClauseLabel::ApgdMonthlyTotal => "apgd-d10-monthly-total",
            ClauseLabel::MonthlyTotal => "monthly-total",
        };
        write!(f, "{name}")
    }
}

/// Metadata attached to one variable.
#[derive(Debug, Clone)]
pub struct VarInfo {
    pub slot: SlotIdx,
    pub emp: EmpIdx,
    /// Day group (employee × date) this var belongs to.
    pub day_group: u32,
    /// Assignment would deviate from the employee's fixed rotation pattern.
    pub off_pattern: bool,
    /// Channeling to an offset variable: (offset var, base pattern position
    /// of the slot's date relative to the requirement anchor).
    pub offset_channel: Option<(OffsetVarId, u16)>,
}

/// One employee-day: all vars that would put `emp` to work on `date`.
#[derive(Debug, Clone)]
pub struct DayGroup {
    pub emp: EmpIdx,
    pub date: NaiveDate,
    pub vars: Vec<VarId>,
}

/// Weighted linear inequality `sum(weight_i * x_i) <= bound`.
#[derive(Debug, Clone)]
pub struct LinearLe {
    pub terms: Vec<(VarId, i64)>,
    pub bound: i64,
    pub label: ClauseLabel,
}

/// Bound on the number of active day groups within one window of dates.
/// `prior` counts work days already fixed outside the model (incremental
/// projections) that consume part of the bound.
#[derive(Debug, Clone)]
pub struct WindowLe {
    pub groups: Vec<u32>,
    pub bound: u32,
    pub prior: u32,
    pub label: ClauseLabel,
}

/// Per-employee rotation-offset decision variable for `solver_optimized`
/// mode. `work_mask[p]` says whether pattern position `p` is a work day.
#[derive(Debug, Clone)]
pub struct OffsetVar {
    pub emp: EmpIdx,
    pub cycle_length: u16,
    pub work_mask: Vec<bool>,
}

/// Objective weights. All contributions are penalties; the evaluator negates
/// them into the soft score.
#[derive(Debug, Clone)]
pub struct Objective {
    /// Weight per used employee (`y[e]` linking).
    pub employee_weight: i64,
    /// Weight per unmet required slot. Dominates everything else.
    pub unmet_weight: i64,
    /// Weight per off-pattern assignment.
    pub adherence_weight: i64,
    /// Weight on (max - min) assignments across used employees.
    pub balance_weight: i64,
    /// Strict-adherence ratio: at most `(1 - r) * assigned` off-pattern
    /// assignments, enforced as a hard budget in fixed-offset modes.
    pub strict_ratio: Option<f64>,
}

impl Default for Objective {
    fn default() -> Self {
        Objective {
            employee_weight: 1_000,
            unmet_weight: 1_000_000,
            adherence_weight: 10,
            balance_weight: 1,
            strict_ratio: None,
        }
    }
}

/// The assembled model for one solve.
#[derive(Debug, Clone)]
pub struct CpModel {
    vars: Vec<VarInfo>,
    per_slot: Vec<SmallVec<[VarId; 8]>>,
    per_emp: Vec<Vec<VarId>>,
    slot_required: Vec<bool>,
    day_groups: Vec<DayGroup>,
    day_group_index: HashMap<(EmpIdx, NaiveDate), u32>,
    conflicts: Vec<SmallVec<[VarId; 8]>>,
    linears: Vec<LinearLe>,
    var_linears: Vec<Vec<(u32, i64)>>,
    windows: Vec<WindowLe>,
    group_windows: Vec<Vec<u32>>,
    offset_vars: Vec<OffsetVar>,
    pub objective: Objective,
    n_emps: usize,
}

impl CpModel {
    pub fn new(n_slots: usize, n_emps: usize) -> Self {
        CpModel {
            vars: Vec::new(),
            per_slot: vec![SmallVec::new(); n_slots],
            per_emp: vec![Vec::new(); n_emps],
            slot_required: vec![true; n_slots],
            day_groups: Vec::new(),
            day_group_index: HashMap::new(),
            conflicts: Vec::new(),
            linears: Vec::new(),
            var_linears: Vec::new(),
            windows: Vec::new(),
            group_windows: Vec::new(),
            offset_vars: Vec::new(),
            objective: Objective::default(),
            n_emps,
        }
    }

    /// Returns (creating on first use) the day group for `(emp, date)`.
    pub fn day_group(&mut self, emp: EmpIdx, date: NaiveDate) -> u32 {
        if let Some(&g) = self.day_group_index.get(&(emp, date)) {
            return g;
        }
        let g = self.day_groups.len() as u32;
        self.day_groups.push(DayGroup {
            emp,
            date,
            vars: Vec::new(),
        });
        self.group_windows.push(Vec::new());
        self.day_group_index.insert((emp, date), g);
        g
    }

    /// Creates a variable for an eligible (slot, employee) pair.
    pub fn add_var(
        &mut self,
        slot: SlotIdx,
        emp: EmpIdx,
        date: NaiveDate,
        off_pattern: bool,
        offset_channel: Option<(OffsetVarId, u16)>,
    ) -> VarId {
        let day_group = self.day_group(emp, date);
        let id = VarId(self.vars.len() as u32);
        self.vars.push(VarInfo {
            slot,
            emp,
            day_group,
            off_pattern,
            offset_channel,
        });
        self.per_slot[slot.index()].push(id);
        self.per_emp[emp.index()].push(id);
        self.day_groups[day_group as usize].vars.push(id);
        self.conflicts.push(SmallVec::new());
        self.var_linears.push(Vec::new());
        id
    }

    /// Marks two variables as mutually exclusive.
    pub fn add_conflict(&mut self, a: VarId, b: VarId) {
        if a == b {
            return;
        }
        self.conflicts[a.index()].push(b);
        self.conflicts[b.index()].push(a);
    }

    pub fn add_linear_le(&mut self, terms: Vec<(VarId, i64)>, bound: i64, label: ClauseLabel) {
        let idx = self.linears.len() as u32;
        for &(var, weight) in &terms {
            self.var_linears[var.index()].push((idx, weight));
        }
        self.linears.push(LinearLe {
            terms,
            bound,
            label,
        });
    }

    /// Adds a window constraint over existing day groups.
    pub fn add_window(&mut self, groups: Vec<u32>, bound: u32, prior: u32, label: ClauseLabel) {
        let idx = self.windows.len() as u32;
        for &g in &groups {
            self.group_windows[g as usize].push(idx);
        }
        self.windows.push(WindowLe {
            groups,
            bound,
            prior,
            label,
        });
    }

    pub fn add_offset_var(&mut self, emp: EmpIdx, work_mask: Vec<bool>) -> OffsetVarId {
        let id = OffsetVarId(self.offset_vars.len() as u32);
        self.offset_vars.push(OffsetVar {
            emp,
            cycle_length: work_mask.len() as u16,
            work_mask,
        });
        id
    }

    /// Soft slots contribute to the unmet-demand penalty only when required.
    pub fn set_slot_required(&mut self, slot: SlotIdx, required: bool) {
        self.slot_required[slot.index()] = required;
    }

    // Accessors used by the evaluator and backend.

    #[inline]
    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.per_slot.len()
    }

    #[inline]
    pub fn emp_count(&self) -> usize {
        self.n_emps
    }

    #[inline]
    pub fn var(&self, id: VarId) -> &VarInfo {
        &self.vars[id.index()]
    }

    #[inline]
    pub fn slot_vars(&self, slot: SlotIdx) -> &[VarId] {
        &self.per_slot[slot.index()]
    }

    #[inline]
    pub fn emp_vars(&self, emp: EmpIdx) -> &[VarId] {
        &self.per_emp[emp.index()]
    }

    #[inline]
    pub fn is_slot_required(&self, slot: SlotIdx) -> bool {
        self.slot_required[slot.index()]
    }

    #[inline]
    pub fn conflicts_of(&self, var: VarId) -> &[VarId] {
        &self.conflicts[var.index()]
    }

    #[inline]
    pub fn linears(&self) -> &[LinearLe] {
        &self.linears
    }

    #[inline]
    pub fn linears_of(&self, var: VarId) -> &[(u32, i64)] {
        &self.var_linears[var.index()]
    }

    #[inline]
    pub fn windows(&self) -> &[WindowLe] {
        &self.windows
    }

    #[inline]
    pub fn windows_of_group(&self, group: u32) -> &[u32] {
        &self.group_windows[group as usize]
    }

    #[inline]
    pub fn day_groups(&self) -> &[DayGroup] {
        &self.day_groups
    }

    #[inline]
    pub fn offset_vars(&self) -> &[OffsetVar] {
        &self.offset_vars
    }

    /// Required slots with no candidate variable at all. These can never be
    /// covered; the driver reports them as structurally unmet.
    pub fn uncoverable_required_slots(&self) -> Vec<SlotIdx> {
        (0..self.slot_count())
            .filter(|&s| self.slot_required[s] && self.per_slot[s].is_empty())
            .map(SlotIdx::new)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, day).unwrap()
    }

    #[test]
    fn day_groups_are_deduplicated() {
        let mut m = CpModel::new(2, 1);
        let a = m.add_var(SlotIdx::new(0), EmpIdx::new(0), date(1), false, None);
        let b = m.add_var(SlotIdx::new(1), EmpIdx::new(0), date(1), false, None);
        assert_eq!(m.var(a).day_group, m.var(b).day_group);
        assert_eq!(m.day_groups().len(), 1);
        assert_eq!(m.day_groups()[0].vars, vec![a, b]);
    }

    #[test]
    fn conflicts_are_symmetric() {
        let mut m = CpModel::new(2, 2);
        let a = m.add_var(SlotIdx::new(0), EmpIdx::new(0), date(1), false, None);
        let b = m.add_var(SlotIdx::new(1), EmpIdx::new(0), date(2), false, None);
        m.add_conflict(a, b);
        assert_eq!(m.conflicts_of(a), &[b]);
        assert_eq!(m.conflicts_of(b), &[a]);
    }

    #[test]
    fn linear_terms_index_back_to_vars() {
        let mut m = CpModel::new(1, 1);
        let a = m.add_var(SlotIdx::new(0), EmpIdx::new(0), date(1), false, None);
        m.add_linear_le(vec![(a, 11_000)], 44_000, ClauseLabel::WeeklyHours);
        assert_eq!(m.linears_of(a), &[(0, 11_000)]);
        assert_eq!(m.linears()[0].bound, 44_000);
    }

    #[test]
    fn uncoverable_slots_are_reported() {
        let mut m = CpModel::new(2, 1);
        m.add_var(SlotIdx::new(0), EmpIdx::new(0), date(1), false, None);
        m.set_slot_required(SlotIdx::new(1), true);
        assert_eq!(m.uncoverable_required_slots(), vec![SlotIdx::new(1)]);
    }
}
