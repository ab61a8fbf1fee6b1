//! C4: rest period between shifts.

use chrono::Days;

use rosterforge_core::{Hours, Result, Scheme};
use rosterforge_cp::{CpModel, VarId};

use super::{BuildContext, ConstraintModule};

/// Between two shifts on consecutive days for the same employee, the
/// wall-clock gap must reach 11 h (8 h under APGD-D10). Same-date pairs are
/// mutually exclusive for Schemes A and B (one slot per day); Scheme P
/// same-day multi-shift is handled by C7. Overridable via `minRestHours`.
pub struct RestPeriod;

impl ConstraintModule for RestPeriod {
    fn id(&self) -> &'static str {
        "C4_rest_period"
    }

    fn emit(&self, ctx: &BuildContext<'_>, model: &mut CpModel) -> Result<()> {
        let override_rest = ctx
            .active
            .param_f64(self.id(), "minRestHours")
            .map(Hours::from_f64);

        let mut conflicts: Vec<(VarId, VarId)> = Vec::new();
        for emp_idx in (0..model.emp_count()).map(rosterforge_core::EmpIdx::new) {
            let emp = ctx.employee(emp_idx);
            let min_rest =
                override_rest.unwrap_or_else(|| emp.scheme.min_rest(emp.effective_apgd_d10(), false));
            let rest_minutes = min_rest.millis() * 60 / 1000;
            let groups = ctx.emp_day_groups(model, emp_idx);

            for (i, &(date, group)) in groups.iter().enumerate() {
                let vars = &model.day_groups()[group as usize].vars;

                // Same-date exclusivity for full-time schemes.
                if emp.scheme != Scheme::P {
                    for (a, &va) in vars.iter().enumerate() {
                        for &vb in vars.iter().skip(a + 1) {
                            conflicts.push((va, vb));
                        }
                    }
                }

                // Rest gap against the next calendar day.
                let next_date = date.checked_add_days(Days::new(1)).expect("date overflow");
                let Some(&(_, next_group)) =
                    groups[i + 1..].iter().find(|&&(d, _)| d == next_date)
                else {
                    continue;
                };
                let next_vars = &model.day_groups()[next_group as usize].vars;
                for &va in vars {
                    let end_a = ctx.slot_of(model, va).end;
                    for &vb in next_vars {
                        let start_b = ctx.slot_of(model, vb).start;
                        if start_b < end_a || (start_b - end_a).num_minutes() < rest_minutes {
                            conflicts.push((va, vb));
                        }
                    }
                }
            }
        }
        for (a, b) in conflicts {
            model.add_conflict(a, b);
        }
        Ok(())
    }
}
