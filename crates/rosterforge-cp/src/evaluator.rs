//! Incremental model evaluator.
//!
//! Plays the score-director role for the bundled backend: it holds the
//! working assignment (one chosen var per slot), keeps every clause's
//! running state incrementally, answers feasibility queries in O(degree of
//! the variable), and produces the two-level score. Hard clauses are never
//! violated by construction; the hard level exists for asserting that.

use rosterforge_core::{EmpIdx, RosterScore, SlotIdx};

use crate::model::{CpModel, VarId};

/// Working assignment state over a [`CpModel`].
pub struct Evaluator<'m> {
    model: &'m CpModel,
    chosen: Vec<Option<VarId>>,
    var_set: Vec<bool>,
    group_counts: Vec<u32>,
    window_active: Vec<u32>,
    linear_sums: Vec<i64>,
    emp_assign_count: Vec<u32>,
    used_count: u32,
    assigned_total: u32,
    unmet_required: u32,
    off_pattern_count: u32,
    /// Per offset var: assignment count by base pattern position.
    offset_base_counts: Vec<Vec<u32>>,
    /// Per offset var: aligned-assignment count for each candidate offset.
    offset_aligned: Vec<Vec<u32>>,
    /// Assignments channeled through each offset var.
    offset_totals: Vec<u32>,
}

impl<'m> Evaluator<'m> {
    pub fn new(model: &'m CpModel) -> Self {
        let unmet_required = (0..model.slot_count())
            .filter(|&s| model.is_slot_required(SlotIdx::new(s)))
            .count() as u32;
        let offset_base_counts = model
            .offset_vars()
            .iter()
            .map(|ov| vec![0; ov.cycle_length as usize])
            .collect::<Vec<_>>();
        let offset_aligned = offset_base_counts.clone();
        Evaluator {
            model,
            chosen: vec![None; model.slot_count()],
            var_set: vec![false; model.var_count()],
            group_counts: vec![0; model.day_groups().len()],
            window_active: vec![0; model.windows().len()],
            linear_sums: vec![0; model.linears().len()],
            emp_assign_count: vec![0; model.emp_count()],
            used_count: 0,
            assigned_total: 0,
            unmet_required,
            off_pattern_count: 0,
            offset_totals: vec![0; model.offset_vars().len()],
            offset_base_counts,
            offset_aligned,
        }
    }

    #[inline]
    pub fn model(&self) -> &CpModel {
        self.model
    }

    #[inline]
    pub fn chosen(&self) -> &[Option<VarId>] {
        &self.chosen
    }

    #[inline]
    pub fn chosen_for(&self, slot: SlotIdx) -> Option<VarId> {
        self.chosen[slot.index()]
    }

    #[inline]
    pub fn assigned_total(&self) -> u32 {
        self.assigned_total
    }

    #[inline]
    pub fn unmet_required(&self) -> u32 {
        self.unmet_required
    }

    #[inline]
    pub fn used_employees(&self) -> u32 {
        self.used_count
    }

    /// Whether setting `var` keeps every hard clause satisfied. The slot
    /// must currently be empty.
    pub fn can_assign(&self, var: VarId) -> bool {
        let info = self.model.var(var);
        debug_assert!(self.chosen[info.slot.index()].is_none());

        for &other in self.model.conflicts_of(var) {
            if self.var_set[other.index()] {
                return false;
            }
        }
        for &(linear, weight) in self.model.linears_of(var) {
            let l = &self.model.linears()[linear as usize];
            if self.linear_sums[linear as usize] + weight > l.bound {
                return false;
            }
        }
        // A group's first var activates the day; check the windows it joins.
        if self.group_counts[info.day_group as usize] == 0 {
            for &w in self.model.windows_of_group(info.day_group) {
                let window = &self.model.windows()[w as usize];
                if self.window_active[w as usize] + window.prior + 1 > window.bound {
                    return false;
                }
            }
        }
        // Strict-adherence budget: off-pattern assignments may not exceed
        // (1 - r) of the would-be total.
        if info.off_pattern {
            if let Some(ratio) = self.model.objective.strict_ratio {
                let allowance =
                    ((1.0 - ratio) * (self.assigned_total + 1) as f64).floor() as u32;
                if self.off_pattern_count + 1 > allowance {
                    return false;
                }
            }
        }
        true
    }

    /// Sets `var` on its slot. Caller must have checked [`Self::can_assign`].
    pub fn assign(&mut self, var: VarId) {
        let info = self.model.var(var);
        let slot = info.slot.index();
        debug_assert!(self.chosen[slot].is_none());

        self.chosen[slot] = Some(var);
        self.var_set[var.index()] = true;
        self.assigned_total += 1;
        if self.model.is_slot_required(info.slot) {
            self.unmet_required -= 1;
        }
        if info.off_pattern {
            self.off_pattern_count += 1;
        }

        let emp = info.emp.index();
        self.emp_assign_count[emp] += 1;
        if self.emp_assign_count[emp] == 1 {
            self.used_count += 1;
        }

        for &(linear, weight) in self.model.linears_of(var) {
            self.linear_sums[linear as usize] += weight;
        }

        let g = info.day_group as usize;
        self.group_counts[g] += 1;
        if self.group_counts[g] == 1 {
            for &w in self.model.windows_of_group(info.day_group) {
                self.window_active[w as usize] += 1;
            }
        }

        if let Some((ov, base)) = info.offset_channel {
            let ov_idx = ov.0 as usize;
            let mask = &self.model.offset_vars()[ov_idx].work_mask;
            let len = mask.len();
            self.offset_totals[ov_idx] += 1;
            self.offset_base_counts[ov_idx][base as usize] += 1;
            for k in 0..len {
                if mask[(base as usize + k) % len] {
                    self.offset_aligned[ov_idx][k] += 1;
                }
            }
        }
    }

    /// Clears the slot's chosen var, if any.
    pub fn unassign(&mut self, slot: SlotIdx) -> Option<VarId> {
        let var = self.chosen[slot.index()].take()?;
        let info = self.model.var(var);
        self.var_set[var.index()] = false;
        self.assigned_total -= 1;
        if self.model.is_slot_required(info.slot) {
            self.unmet_required += 1;
        }
        if info.off_pattern {
            self.off_pattern_count -= 1;
        }

        let emp = info.emp.index();
        self.emp_assign_count[emp] -= 1;
        if self.emp_assign_count[emp] == 0 {
            self.used_count -= 1;
        }

        for &(linear, weight) in self.model.linears_of(var) {
            self.linear_sums[linear as usize] -= weight;
        }

        let g = info.day_group as usize;
        self.group_counts[g] -= 1;
        if self.group_counts[g] == 0 {
            for &w in self.model.windows_of_group(info.day_group) {
                self.window_active[w as usize] -= 1;
            }
        }

        if let Some((ov, base)) = info.offset_channel {
            let ov_idx = ov.0 as usize;
            let mask = &self.model.offset_vars()[ov_idx].work_mask;
            let len = mask.len();
            self.offset_totals[ov_idx] -= 1;
            self.offset_base_counts[ov_idx][base as usize] -= 1;
            for k in 0..len {
                if mask[(base as usize + k) % len] {
                    self.offset_aligned[ov_idx][k] -= 1;
                }
            }
        }
        Some(var)
    }

    /// Best offset per offset var under the current assignment, with the
    /// count of assignments that offset fails to align.
    pub fn decoded_offsets(&self) -> Vec<(EmpIdx, u32, u32)> {
        self.model
            .offset_vars()
            .iter()
            .enumerate()
            .map(|(i, ov)| {
                let (best_k, aligned) = self.offset_aligned[i]
                    .iter()
                    .enumerate()
                    .max_by_key(|(k, &a)| (a, std::cmp::Reverse(*k)))
                    .map(|(k, &a)| (k as u32, a))
                    .unwrap_or((0, 0));
                (ov.emp, best_k, self.offset_totals[i] - aligned)
            })
            .collect()
    }

    /// Misalignment across all solver-optimized offset vars.
    fn solver_opt_misaligned(&self) -> u32 {
        self.decoded_offsets().iter().map(|&(_, _, m)| m).sum()
    }

    /// Workload imbalance: max - min assignment count over used employees.
    fn imbalance(&self) -> i64 {
        let mut min = u32::MAX;
        let mut max = 0u32;
        for &c in &self.emp_assign_count {
            if c > 0 {
                min = min.min(c);
                max = max.max(c);
            }
        }
        if min == u32::MAX {
            0
        } else {
            (max - min) as i64
        }
    }

    /// Two-level score of the current assignment. Hard is always zero during
    /// search (clauses are checked before every assign); the soft level is
    /// the negated weighted objective.
    pub fn score(&self) -> RosterScore {
        let obj = &self.model.objective;
        let mut penalty = 0i64;
        penalty += obj.unmet_weight * self.unmet_required as i64;
        penalty += obj.employee_weight * self.used_count as i64;
        penalty +=
            obj.adherence_weight * (self.off_pattern_count + self.solver_opt_misaligned()) as i64;
        penalty += obj.balance_weight * self.imbalance();
        RosterScore::of(0, -penalty)
    }
}
