//! C17 and C19: monthly overtime and APGD-D10 monthly total caps.

use std::collections::BTreeMap;

use rosterforge_core::calendar::{days_in_month, month_key};
use rosterforge_core::scheme::{apgd_d10_monthly_cap, scheme_p_daily_threshold};
use rosterforge_core::{Hours, Result, Scheme};
use rosterforge_cp::{ClauseLabel, CpModel, VarId};

use super::{BuildContext, ConstraintModule};

/// Standard daily normal threshold for overtime estimation (44 h / 5 days).
const DAILY_NORMAL: Hours = Hours::from_millis(8_800);

/// C17: per employee and month, estimated overtime stays under the
/// `max_overtime_hours` of the applicable monthly-hour-limits row. Each
/// variable is weighted by the overtime its shift exceeds the daily normal
/// threshold by. APGD-D10 employees use the monthly total cap (C19) instead.
pub struct MonthlyOvertime;

impl ConstraintModule for MonthlyOvertime {
    fn id(&self) -> &'static str {
        "C17_monthly_overtime"
    }

    fn emit(&self, ctx: &BuildContext<'_>, model: &mut CpModel) -> Result<()> {
        let mut clauses = Vec::new();
        for emp_idx in (0..model.emp_count()).map(rosterforge_core::EmpIdx::new) {
            let emp = ctx.employee(emp_idx);
            if emp.effective_apgd_d10() {
                continue;
            }
            let mut by_month: BTreeMap<(i32, u32), Vec<(VarId, i64)>> = BTreeMap::new();
            for &var in model.emp_vars(emp_idx) {
                let slot = ctx.slot_of(model, var);
                let net = ctx.net_of(model, var);
                let daily_normal = match emp.scheme {
                    Scheme::P => scheme_p_daily_threshold(4),
                    _ => DAILY_NORMAL,
                };
                let overtime = (net - daily_normal).clamp_floor();
                if overtime.is_zero() {
                    continue;
                }
                by_month
                    .entry(month_key(slot.date))
                    .or_default()
                    .push((var, overtime.millis()));
            }

            for (month, terms) in by_month {
                let days = month_days(month);
                let Some(limits) = ctx.problem.hour_limits.lookup(
                    emp.scheme,
                    &emp.product_type,
                    emp.is_foreign,
                    days,
                ) else {
                    continue;
                };
                let prior = ctx
                    .prior_of(emp_idx)
                    .and_then(|p| p.monthly_overtime.get(&month).copied())
                    .unwrap_or(Hours::ZERO);
                let bound = (limits.max_overtime_hours - prior).clamp_floor().millis();
                let total: i64 = terms.iter().map(|&(_, w)| w).sum();
                if total > bound {
                    clauses.push((terms, bound));
                }
            }
        }
        for (terms, bound) in clauses {
            model.add_linear_le(terms, bound, ClauseLabel::MonthlyOvertime);
        }
        Ok(())
    }
}

/// C19: per APGD-D10 employee and month, the sum of net hours of assigned
/// slots stays under the statutory table value for the month length and
/// employee category (standard vs foreign CPL/SGT).
pub struct ApgdMonthlyTotal;

impl ConstraintModule for ApgdMonthlyTotal {
    fn id(&self) -> &'static str {
        "C19_apgd_monthly_total"
    }

    fn emit(&self, ctx: &BuildContext<'_>, model: &mut CpModel) -> Result<()> {
        let mut clauses = Vec::new();
        for emp_idx in (0..model.emp_count()).map(rosterforge_core::EmpIdx::new) {
            let emp = ctx.employee(emp_idx);
            if !emp.effective_apgd_d10() {
                continue;
            }
            let mut by_month: BTreeMap<(i32, u32), Vec<(VarId, i64)>> = BTreeMap::new();
            for &var in model.emp_vars(emp_idx) {
                let slot = ctx.slot_of(model, var);
                let net = ctx.net_of(model, var);
                by_month
                    .entry(month_key(slot.date))
                    .or_default()
                    .push((var, net.millis()));
            }
            for (month, terms) in by_month {
                let cap = apgd_d10_monthly_cap(month_days(month), emp.is_foreign_cpl_sgt());
                let prior = ctx
                    .prior_of(emp_idx)
                    .and_then(|p| p.monthly_net.get(&month).copied())
                    .unwrap_or(Hours::ZERO);
                let bound = (cap - prior).clamp_floor().millis();
                let total: i64 = terms.iter().map(|&(_, w)| w).sum();
                if total > bound {
                    clauses.push((terms, bound));
                }
            }
        }
        for (terms, bound) in clauses {
            model.add_linear_le(terms, bound, ClauseLabel::ApgdMonthlyTotal);
        }
        Ok(())
    }
}

fn month_days(month: (i32, u32)) -> u32 {
    let first = chrono::NaiveDate::from_ymd_opt(month.0, month.1, 1).expect("valid month");
    days_in_month(first)
}
