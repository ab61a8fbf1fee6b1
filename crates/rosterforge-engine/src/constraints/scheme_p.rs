//! C6 and C7: Scheme P weekly totals and same-day gaps.

use chrono::Days;

use rosterforge_core::calendar::weeks_overlapping;
use rosterforge_core::{Result, Scheme};
use rosterforge_cp::{ClauseLabel, CpModel, VarId};

use super::{BuildContext, ConstraintModule};

/// C6: Scheme P weekly caps enforced by day count. The 34.98 h / 29.98 h
/// totals decompose into a maximum number of work days for the shift length
/// (4 days for >=8 h shifts, 5 for 6-hour, 6 for 5-hour, 7 for <=4-hour);
/// the per-day thresholds in hour accounting supply the hour arithmetic.
pub struct SchemePWeekly;

impl ConstraintModule for SchemePWeekly {
    fn id(&self) -> &'static str {
        "C6_scheme_p_weekly"
    }

    fn emit(&self, ctx: &BuildContext<'_>, model: &mut CpModel) -> Result<()> {
        let weeks = weeks_overlapping(&ctx.window);
        let mut clauses = Vec::new();

        for emp_idx in (0..model.emp_count()).map(rosterforge_core::EmpIdx::new) {
            let emp = ctx.employee(emp_idx);
            if emp.scheme != Scheme::P {
                continue;
            }
            let groups = ctx.emp_day_groups(model, emp_idx);
            if groups.is_empty() {
                continue;
            }
            // Shift length drives the day cap; take the longest net shift
            // the employee could be assigned.
            let max_net = model
                .emp_vars(emp_idx)
                .iter()
                .map(|&v| ctx.net_of(model, v))
                .max()
                .unwrap_or(rosterforge_core::Hours::from_whole(8));
            let cap = emp.scheme.max_week_days(max_net, false);

            for &monday in &weeks {
                let week_end = monday.checked_add_days(Days::new(6)).expect("date overflow");
                let week_groups: Vec<u32> = groups
                    .iter()
                    .filter(|&&(d, _)| d >= monday && d <= week_end)
                    .map(|&(_, g)| g)
                    .collect();
                let prior = ctx
                    .prior_of(emp_idx)
                    .map(|p| {
                        p.locked_work_dates
                            .iter()
                            .filter(|&&d| d >= monday && d <= week_end)
                            .count() as u32
                    })
                    .unwrap_or(0);
                if week_groups.len() as u32 + prior > cap {
                    clauses.push((week_groups, cap, prior));
                }
            }
        }
        for (groups, cap, prior) in clauses {
            model.add_window(groups, cap, prior, ClauseLabel::SchemePWeekly);
        }
        Ok(())
    }
}

/// C7: two Scheme P shifts on the same date need a gap of at least one hour
/// between the end of one and the start of the other.
pub struct SameDayGap;

impl ConstraintModule for SameDayGap {
    fn id(&self) -> &'static str {
        "C7_same_day_gap"
    }

    fn emit(&self, ctx: &BuildContext<'_>, model: &mut CpModel) -> Result<()> {
        let mut conflicts: Vec<(VarId, VarId)> = Vec::new();
        for emp_idx in (0..model.emp_count()).map(rosterforge_core::EmpIdx::new) {
            let emp = ctx.employee(emp_idx);
            if emp.scheme != Scheme::P {
                continue;
            }
            let gap_minutes = Scheme::P.min_rest(false, true).millis() * 60 / 1000;
            for (_, group) in ctx.emp_day_groups(model, emp_idx) {
                let vars = &model.day_groups()[group as usize].vars;
                for (i, &va) in vars.iter().enumerate() {
                    let slot_a = ctx.slot_of(model, va);
                    for &vb in vars.iter().skip(i + 1) {
                        let slot_b = ctx.slot_of(model, vb);
                        let compatible = if slot_b.start >= slot_a.end {
                            (slot_b.start - slot_a.end).num_minutes() >= gap_minutes
                        } else if slot_a.start >= slot_b.end {
                            (slot_a.start - slot_b.end).num_minutes() >= gap_minutes
                        } else {
                            false
                        };
                        if !compatible {
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
