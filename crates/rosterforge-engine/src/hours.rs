//! Hour accounting.
//!
//! Credits each ASSIGNED slot with a normal/overtime/rest-day-pay breakdown.
//! Scheme P and APGD-D10 overrides run before the table-selected method
//! (weekly threshold, daily prorated, monthly cumulative). All arithmetic is
//! integer millihours; `normal + overtime + rest_day_pay = gross - lunch`
//! holds exactly for every assignment.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use rosterforge_core::calendar::{days_in_month, month_key, week_start};
use rosterforge_core::domain::{Employee, HourMethod, Problem};
use rosterforge_core::scheme::scheme_p_daily_threshold;
use rosterforge_core::{HourBreakdown, Hours, Scheme};

use crate::incremental::EmployeePrior;

/// Standard daily normal cap (44 h / 5 days).
const DAILY_NORMAL: Hours = Hours::from_millis(8_800);

/// APGD-D10 rest-day pay: 8 h at the normal rate.
const REST_DAY_PAY: Hours = Hours::from_millis(8_000);

/// One assigned slot to credit.
#[derive(Debug, Clone)]
pub struct AccountItem {
    pub date: NaiveDate,
    pub gross: Hours,
    pub lunch: Hours,
    /// Scheduled pattern work days in the slot's month (daily prorating).
    pub expected_work_days: u32,
}

impl AccountItem {
    fn net(&self) -> Hours {
        (self.gross - self.lunch).clamp_floor()
    }
}

/// Credits every assignment of one employee, in chronological order.
/// `prior` carries locked hours from an incremental projection.
pub fn credit_employee(
    problem: &Problem,
    emp: &Employee,
    items: &[AccountItem],
    prior: Option<&EmployeePrior>,
) -> Vec<HourBreakdown> {
    debug_assert!(items.windows(2).all(|w| w[0].date <= w[1].date));

    // Work-date set over locked and fresh assignments, for consecutive-run
    // positions (Scheme P 5th-day rule, APGD week-day index).
    let mut work_dates: BTreeSet<NaiveDate> = items.iter().map(|i| i.date).collect();
    if let Some(p) = prior {
        work_dates.extend(p.locked_work_dates.iter().copied());
    }

    let mut weekly_normal: HashMap<NaiveDate, Hours> = HashMap::new();
    let mut weekly_days: HashMap<NaiveDate, u32> = HashMap::new();
    let mut monthly_budget: HashMap<(i32, u32), Hours> = HashMap::new();
    if let Some(p) = prior {
        weekly_normal.extend(p.weekly_normal.iter().map(|(&k, &v)| (k, v)));
        weekly_days.extend(p.weekly_work_days.iter().map(|(&k, &v)| (k, v)));
    }

    // Total work days per week, needed up front for the Scheme P thresholds.
    let mut week_totals: HashMap<NaiveDate, u32> = HashMap::new();
    for &date in &work_dates {
        *week_totals.entry(week_start(date)).or_default() += 1;
    }

    items
        .iter()
        .map(|item| {
            let net = item.net();
            let monday = week_start(item.date);
            let public_holiday = if problem.public_holidays.contains(&item.date) {
                net
            } else {
                Hours::ZERO
            };

            let (normal, overtime, rest_day_pay) = if emp.effective_apgd_d10() {
                let day_index = weekly_days.get(&monday).copied().unwrap_or(0) + 1;
                *weekly_days.entry(monday).or_default() += 1;
                apgd_split(net, day_index)
            } else if emp.scheme == Scheme::P {
                let days_in_week = week_totals.get(&monday).copied().unwrap_or(1);
                let run = consecutive_run_position(&work_dates, item.date);
                scheme_p_split(net, days_in_week, run)
            } else {
                method_split(
                    problem,
                    emp,
                    item,
                    net,
                    &mut weekly_normal,
                    &mut monthly_budget,
                    prior,
                )
            };

            HourBreakdown {
                gross: item.gross,
                lunch: item.lunch,
                normal,
                overtime,
                public_holiday,
                rest_day_pay,
            }
        })
        .collect()
}

/// APGD-D10: week days 1-5 use the standard 8.8 h normal cap; days 6 and 7
/// pay an 8 h rest-day premium with the remainder as overtime.
fn apgd_split(net: Hours, day_index: u32) -> (Hours, Hours, Hours) {
    if day_index <= 5 {
        let normal = net.min(DAILY_NORMAL);
        (normal, net - normal, Hours::ZERO)
    } else if net <= REST_DAY_PAY {
        (Hours::ZERO, Hours::ZERO, net)
    } else {
        (Hours::ZERO, net - REST_DAY_PAY, REST_DAY_PAY)
    }
}

/// Scheme P daily thresholds by days worked in the week; the 5th consecutive
/// work day is entirely overtime.
fn scheme_p_split(net: Hours, days_in_week: u32, consecutive_run: u32) -> (Hours, Hours, Hours) {
    if days_in_week == 5 && consecutive_run == 5 {
        return (Hours::ZERO, net, Hours::ZERO);
    }
    let threshold = scheme_p_daily_threshold(days_in_week);
    let normal = net.min(threshold);
    (normal, net - normal, Hours::ZERO)
}

/// Position of `date` within its consecutive work-day run (1-based).
fn consecutive_run_position(work_dates: &BTreeSet<NaiveDate>, date: NaiveDate) -> u32 {
    let mut position = 1u32;
    let mut cursor = date;
    while let Some(prev) = cursor.pred_opt() {
        if work_dates.contains(&prev) {
            position += 1;
            cursor = prev;
        } else {
            break;
        }
    }
    position
}

/// Table-selected method for Schemes A and B.
fn method_split(
    problem: &Problem,
    emp: &Employee,
    item: &AccountItem,
    net: Hours,
    weekly_normal: &mut HashMap<NaiveDate, Hours>,
    monthly_budget: &mut HashMap<(i32, u32), Hours>,
    prior: Option<&EmployeePrior>,
) -> (Hours, Hours, Hours) {
    let limits = problem.hour_limits.lookup(
        emp.scheme,
        &emp.product_type,
        emp.is_foreign,
        days_in_month(item.date),
    );
    let method = limits.map(|l| l.method).unwrap_or(HourMethod::WeeklyThreshold);

    match method {
        HourMethod::WeeklyThreshold => {
            let cap = Hours::from_whole(44);
            let monday = week_start(item.date);
            let used = weekly_normal.entry(monday).or_default();
            let normal = (cap - *used).clamp_floor().min(net);
            *used += normal;
            (normal, net - normal, Hours::ZERO)
        }
        HourMethod::DailyProrated => {
            let min_contract = limits
                .map(|l| l.minimum_contractual_hours)
                .unwrap_or(Hours::ZERO);
            let threshold = if item.expected_work_days > 0 {
                Hours::from_millis(min_contract.millis() / item.expected_work_days as i64)
            } else {
                DAILY_NORMAL
            };
            let normal = net.min(threshold);
            (normal, net - normal, Hours::ZERO)
        }
        HourMethod::MonthlyCumulative => {
            let month = month_key(item.date);
            let budget = monthly_budget.entry(month).or_insert_with(|| {
                let min_contract = limits
                    .map(|l| l.minimum_contractual_hours)
                    .unwrap_or(Hours::ZERO);
                let consumed = prior
                    .map(|p| {
                        let net_prior =
                            p.monthly_net.get(&month).copied().unwrap_or(Hours::ZERO);
                        let ot_prior = p
                            .monthly_overtime
                            .get(&month)
                            .copied()
                            .unwrap_or(Hours::ZERO);
                        (net_prior - ot_prior).clamp_floor()
                    })
                    .unwrap_or(Hours::ZERO);
                (min_contract - consumed).clamp_floor()
            });
            let normal = net.min(*budget);
            *budget -= normal;
            (normal, net - normal, Hours::ZERO)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosterforge_core::domain::Problem;

    fn problem_with_limits(limits: serde_json::Value) -> Problem {
        let doc = serde_json::json!({
            "schemaVersion": "2.1",
            "planningHorizon": {"startDate": "2025-12-01", "endDate": "2025-12-31"},
            "publicHolidays": ["2025-12-25"],
            "shifts": [{"code": "D", "startTime": "08:00", "endTime": "20:00", "grossHours": 12.0}],
            "employees": [
                {"employeeId": "e1", "scheme": "A", "rank": "SER", "productType": "APO",
                 "organizationalUnit": "OU1"}
            ],
            "demandItems": [],
            "monthlyHourLimits": limits
        });
        Problem::from_json(&doc.to_string()).unwrap()
    }

    fn emp(problem: &Problem) -> Employee {
        problem.employees[0].clone()
    }

    fn item(day: u32, gross: f64, lunch: f64) -> AccountItem {
        AccountItem {
            date: NaiveDate::from_ymd_opt(2025, 12, day).unwrap(),
            gross: Hours::from_f64(gross),
            lunch: Hours::from_f64(lunch),
            expected_work_days: 22,
        }
    }

    fn assert_balanced(breakdowns: &[HourBreakdown]) {
        for b in breakdowns {
            assert!(b.is_balanced(), "unbalanced breakdown: {b:?}");
        }
    }

    #[test]
    fn weekly_threshold_caps_week_at_44() {
        let problem = problem_with_limits(serde_json::json!([]));
        let employee = emp(&problem);
        // Mon 12-01 .. Fri 12-05, 11 h net each: 44 normal + 11 overtime.
        let items: Vec<_> = (1..=5).map(|d| item(d, 12.0, 1.0)).collect();
        let result = credit_employee(&problem, &employee, &items, None);
        assert_balanced(&result);
        let total_normal: Hours = result.iter().map(|b| b.normal).sum();
        assert_eq!(total_normal, Hours::from_whole(44));
        assert_eq!(result[3].normal, Hours::from_whole(11));
        assert_eq!(result[4].normal, Hours::ZERO);
        assert_eq!(result[4].overtime, Hours::from_whole(11));
    }

    #[test]
    fn apgd_six_day_week_matches_statute() {
        let mut problem = problem_with_limits(serde_json::json!([]));
        problem.employees[0].apgd_d10 = true;
        let employee = emp(&problem);
        // Week of Mon 12-01: six 12 h gross / 1 h lunch days.
        let items: Vec<_> = (1..=6).map(|d| item(d, 12.0, 1.0)).collect();
        let result = credit_employee(&problem, &employee, &items, None);
        assert_balanced(&result);
        let weekly_normal: Hours = result.iter().map(|b| b.normal).sum();
        assert_eq!(weekly_normal, Hours::from_whole(44));
        // Day 6: normal 0, rest-day pay 8, overtime 3.
        assert_eq!(result[5].normal, Hours::ZERO);
        assert_eq!(result[5].rest_day_pay, Hours::from_whole(8));
        assert_eq!(result[5].overtime, Hours::from_whole(3));
    }

    #[test]
    fn scheme_p_four_day_week_uses_8745_threshold() {
        let mut problem = problem_with_limits(serde_json::json!([]));
        problem.employees[0].scheme = Scheme::P;
        let employee = emp(&problem);
        let items: Vec<_> = (1..=4).map(|d| item(d, 10.0, 1.0)).collect();
        let result = credit_employee(&problem, &employee, &items, None);
        assert_balanced(&result);
        assert_eq!(result[0].normal, Hours::from_millis(8_745));
        assert_eq!(result[0].overtime, Hours::from_millis(255));
    }

    #[test]
    fn scheme_p_fifth_consecutive_day_is_overtime() {
        let mut problem = problem_with_limits(serde_json::json!([]));
        problem.employees[0].scheme = Scheme::P;
        let employee = emp(&problem);
        let items: Vec<_> = (1..=5).map(|d| item(d, 7.0, 1.0)).collect();
        let result = credit_employee(&problem, &employee, &items, None);
        assert_balanced(&result);
        // Days 1-4 use the 5.996 threshold, day 5 is all overtime.
        assert_eq!(result[0].normal, Hours::from_millis(5_996));
        assert_eq!(result[4].normal, Hours::ZERO);
        assert_eq!(result[4].overtime, Hours::from_whole(6));
    }

    #[test]
    fn monthly_cumulative_exhausts_budget() {
        let problem = problem_with_limits(serde_json::json!([
            {"scheme": "A", "limits": {"31": {
                "hourCalculationMethod": "monthly_cumulative",
                "minimumContractualHours": 20.0,
                "maxOvertimeHours": 72.0,
                "totalMaxHours": 260.0
            }}}
        ]));
        let employee = emp(&problem);
        let items: Vec<_> = (1..=3).map(|d| item(d, 12.0, 1.0)).collect();
        let result = credit_employee(&problem, &employee, &items, None);
        assert_balanced(&result);
        assert_eq!(result[0].normal, Hours::from_whole(11));
        assert_eq!(result[1].normal, Hours::from_whole(9));
        assert_eq!(result[1].overtime, Hours::from_whole(2));
        assert_eq!(result[2].normal, Hours::ZERO);
        assert_eq!(result[2].overtime, Hours::from_whole(11));
    }

    #[test]
    fn daily_prorated_threshold() {
        let problem = problem_with_limits(serde_json::json!([
            {"scheme": "A", "limits": {"31": {
                "hourCalculationMethod": "daily_prorated",
                "minimumContractualHours": 176.0,
                "maxOvertimeHours": 72.0,
                "totalMaxHours": 260.0
            }}}
        ]));
        let employee = emp(&problem);
        let result = credit_employee(&problem, &employee, &[item(1, 12.0, 1.0)], None);
        assert_balanced(&result);
        // 176 / 22 = 8 h threshold.
        assert_eq!(result[0].normal, Hours::from_whole(8));
        assert_eq!(result[0].overtime, Hours::from_whole(3));
    }

    #[test]
    fn public_holiday_hours_are_tracked() {
        let problem = problem_with_limits(serde_json::json!([]));
        let employee = emp(&problem);
        let result = credit_employee(&problem, &employee, &[item(25, 12.0, 1.0)], None);
        assert_eq!(result[0].public_holiday, Hours::from_whole(11));
        assert_eq!(result[0].paid(), Hours::from_whole(12));
    }

    #[test]
    fn projected_weekly_hours_carry_into_new_week_totals() {
        let problem = problem_with_limits(serde_json::json!([]));
        let employee = emp(&problem);
        let mut prior = EmployeePrior::default();
        // 40 h of locked normal already in the week of Mon 12-15.
        prior
            .weekly_normal
            .insert(NaiveDate::from_ymd_opt(2025, 12, 15).unwrap(), Hours::from_whole(40));
        let result = credit_employee(&problem, &employee, &[item(18, 12.0, 1.0)], Some(&prior));
        assert_balanced(&result);
        assert_eq!(result[0].normal, Hours::from_whole(4));
        assert_eq!(result[0].overtime, Hours::from_whole(7));
    }
}
