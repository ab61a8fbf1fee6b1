//! C3: consecutive work-day cap.

use chrono::{Days, NaiveDate};

use rosterforge_core::Result;
use rosterforge_cp::{ClauseLabel, CpModel};

use super::{BuildContext, ConstraintModule};

/// Bounds every run of work days: 12 for Schemes A/B, 8 under APGD-D10,
/// 6 for Scheme P. Emitted as sliding windows of `cap + 1` consecutive
/// dates, each allowing at most `cap` active days; locked work days from an
/// incremental projection consume part of each window's bound.
pub struct ConsecutiveDays;

impl ConstraintModule for ConsecutiveDays {
    fn id(&self) -> &'static str {
        "C3_consecutive_days"
    }

    fn emit(&self, ctx: &BuildContext<'_>, model: &mut CpModel) -> Result<()> {
        let override_cap = ctx
            .active
            .param_f64(self.id(), "maxConsecutiveDays")
            .map(|v| v as u32);

        let mut clauses = Vec::new();
        for emp_idx in (0..model.emp_count()).map(rosterforge_core::EmpIdx::new) {
            let emp = ctx.employee(emp_idx);
            let cap = override_cap.unwrap_or_else(|| emp.scheme.consecutive_cap(emp.effective_apgd_d10()));
            let groups = ctx.emp_day_groups(model, emp_idx);
            if groups.is_empty() {
                continue;
            }
            let locked: Vec<NaiveDate> = ctx
                .prior_of(emp_idx)
                .map(|p| p.locked_work_dates.iter().copied().collect())
                .unwrap_or_default();

            // Window starts early enough to see a locked streak that runs
            // into the solve window.
            let first = groups[0].0.min(locked.first().copied().unwrap_or(groups[0].0));
            let last = groups[groups.len() - 1].0;
            let mut start = first;
            while start <= last {
                let end = start
                    .checked_add_days(Days::new(cap as u64))
                    .expect("date overflow");
                let window_groups: Vec<u32> = groups
                    .iter()
                    .filter(|&&(d, _)| d >= start && d <= end)
                    .map(|&(_, g)| g)
                    .collect();
                let prior = locked.iter().filter(|&&d| d >= start && d <= end).count() as u32;
                if window_groups.len() as u32 + prior > cap {
                    clauses.push((window_groups, cap, prior));
                }
                start = start.checked_add_days(Days::new(1)).expect("date overflow");
            }
        }
        for (groups, cap, prior) in clauses {
            model.add_window(groups, cap, prior, ClauseLabel::ConsecutiveDays);
        }
        Ok(())
    }
}
