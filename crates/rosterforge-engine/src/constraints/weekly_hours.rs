//! C2: weekly normal-hours cap.

use chrono::Days;

use rosterforge_core::calendar::{days_in_month, week_start, weeks_overlapping};
use rosterforge_core::domain::HourMethod;
use rosterforge_core::{Hours, Result, Scheme};
use rosterforge_cp::{ClauseLabel, CpModel, VarId};

use super::{BuildContext, ConstraintModule};

/// Per employee and Mon-Sun week, the sum of normal hours stays under the
/// 44 h cap (Schemes A and B; Scheme P is covered by C6, APGD-D10 by C19).
///
/// Under the `weekly_threshold` accounting method normal hours are capped by
/// construction, so clauses are only emitted for the prorated methods, with
/// each variable weighted by its expected normal contribution. Projected
/// locked hours shrink the bound.
pub struct WeeklyHours;

/// Standard daily normal threshold (44 h / 5 days).
const DAILY_NORMAL: Hours = Hours::from_millis(8_800);

impl ConstraintModule for WeeklyHours {
    fn id(&self) -> &'static str {
        "C2_weekly_hours"
    }

    fn emit(&self, ctx: &BuildContext<'_>, model: &mut CpModel) -> Result<()> {
        let weeks = weeks_overlapping(&ctx.window);
        let mut clauses = Vec::new();

        for emp_idx in (0..model.emp_count()).map(rosterforge_core::EmpIdx::new) {
            let emp = ctx.employee(emp_idx);
            if emp.scheme == Scheme::P || emp.effective_apgd_d10() {
                continue;
            }
            let groups = ctx.emp_day_groups(model, emp_idx);
            if groups.is_empty() {
                continue;
            }
            let cap = Hours::from_whole(44);

            for &monday in &weeks {
                let week_end = monday
                    .checked_add_days(Days::new(6))
                    .expect("date overflow");
                let mut terms: Vec<(VarId, i64)> = Vec::new();
                for &(date, group) in &groups {
                    if date < monday || date > week_end {
                        continue;
                    }
                    for &var in &model.day_groups()[group as usize].vars {
                        let weight = normal_weight(ctx, model, var);
                        if weight > 0 {
                            terms.push((var, weight));
                        }
                    }
                }
                if terms.is_empty() {
                    continue;
                }
                let prior = ctx
                    .prior_of(emp_idx)
                    .and_then(|p| p.weekly_normal.get(&week_start(monday)).copied())
                    .unwrap_or(Hours::ZERO);
                let bound = (cap - prior).clamp_floor().millis();
                let total: i64 = terms.iter().map(|&(_, w)| w).sum();
                if total > bound {
                    clauses.push((terms, bound));
                }
            }
        }
        for (terms, bound) in clauses {
            model.add_linear_le(terms, bound, ClauseLabel::WeeklyHours);
        }
        Ok(())
    }
}

/// Expected normal-hour contribution of one assignment under the employee's
/// accounting method. Zero means the method caps normal hours on its own.
fn normal_weight(ctx: &BuildContext<'_>, model: &CpModel, var: VarId) -> i64 {
    let info = model.var(var);
    let emp = ctx.employee(info.emp);
    let slot = ctx.slot_of(model, var);
    let net = ctx.net_of(model, var);
    let method = ctx
        .problem
        .hour_limits
        .lookup(
            emp.scheme,
            &emp.product_type,
            emp.is_foreign,
            days_in_month(slot.date),
        )
        .map(|l| (l.method, l.minimum_contractual_hours));

    match method {
        // Normal hours cannot exceed the weekly cap by construction.
        None | Some((HourMethod::WeeklyThreshold, _)) => 0,
        Some((HourMethod::MonthlyCumulative, _)) => net.min(DAILY_NORMAL).millis(),
        Some((HourMethod::DailyProrated, min_contract)) => {
            let expected_days = expected_work_days(ctx, model, var);
            let threshold = if expected_days > 0 {
                Hours::from_millis(min_contract.millis() / expected_days as i64)
            } else {
                DAILY_NORMAL
            };
            net.min(threshold).millis()
        }
    }
}

/// Scheduled pattern work days in the slot's month.
fn expected_work_days(ctx: &BuildContext<'_>, model: &CpModel, var: VarId) -> u32 {
    let slot = ctx.slot_of(model, var);
    let entry = ctx.reqs.get(slot.req);
    let days = days_in_month(slot.date) as f64;
    (days * entry.req.work_pattern.work_fraction()).round() as u32
}
