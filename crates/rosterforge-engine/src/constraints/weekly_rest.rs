//! C5: weekly rest day.

use chrono::Days;

use rosterforge_core::calendar::weeks_overlapping;
use rosterforge_core::Result;
use rosterforge_cp::{ClauseLabel, CpModel};

use super::{BuildContext, ConstraintModule};

/// At least one day off per Mon-Sun week: at most 6 of a week's 7 days may
/// be active. Skipped for APGD-D10 employees, whose exemption permits 7-day
/// weeks. Locked work days consume the bound in incremental solves.
pub struct WeeklyRest;

impl ConstraintModule for WeeklyRest {
    fn id(&self) -> &'static str {
        "C5_weekly_rest"
    }

    fn emit(&self, ctx: &BuildContext<'_>, model: &mut CpModel) -> Result<()> {
        let weeks = weeks_overlapping(&ctx.window);
        let mut clauses = Vec::new();

        for emp_idx in (0..model.emp_count()).map(rosterforge_core::EmpIdx::new) {
            let emp = ctx.employee(emp_idx);
            if emp.effective_apgd_d10() {
                continue;
            }
            let groups = ctx.emp_day_groups(model, emp_idx);
            if groups.is_empty() {
                continue;
            }
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
                if week_groups.len() as u32 + prior > 6 {
                    clauses.push((week_groups, prior));
                }
            }
        }
        for (groups, prior) in clauses {
            model.add_window(groups, 6, prior, ClauseLabel::WeeklyRest);
        }
        Ok(())
    }
}
