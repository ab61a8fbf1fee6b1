//! C1: daily net-hours cap.

use rosterforge_core::{Hours, Result};
use rosterforge_cp::{ClauseLabel, CpModel};

use super::{BuildContext, ConstraintModule};

/// Per employee and calendar date, the sum of assigned net hours stays under
/// the scheme's daily cap (14 h default, 9 h for Scheme P). The cap is
/// overridable via the `maxDailyHours` parameter.
pub struct DailyHours;

impl ConstraintModule for DailyHours {
    fn id(&self) -> &'static str {
        "C1_daily_hours"
    }

    fn emit(&self, ctx: &BuildContext<'_>, model: &mut CpModel) -> Result<()> {
        let override_cap = ctx
            .active
            .param_f64(self.id(), "maxDailyHours")
            .map(Hours::from_f64);

        let mut clauses = Vec::new();
        for group in model.day_groups() {
            let emp = ctx.employee(group.emp);
            let cap = override_cap.unwrap_or_else(|| emp.scheme.daily_cap());
            let terms: Vec<_> = group
                .vars
                .iter()
                .map(|&v| (v, ctx.net_of(model, v).millis()))
                .collect();
            // A single var under the cap can never violate; skip the clause.
            if terms.len() == 1 && terms[0].1 <= cap.millis() {
                continue;
            }
            clauses.push((terms, cap.millis()));
        }
        for (terms, bound) in clauses {
            model.add_linear_le(terms, bound, ClauseLabel::DailyHours);
        }
        Ok(())
    }
}
