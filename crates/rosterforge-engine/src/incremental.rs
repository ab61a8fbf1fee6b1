//! Incremental projector: re-plan a sub-window against an immutable past.
//!
//! Previous assignments are classified into locked facts and solvable slots.
//! Locked assignments appear in the output verbatim; their hours and work
//! days are projected into per-employee priors that the constraint modules
//! consume (weekly sums start from the projected totals, consecutive runs
//! include the locked streak, rest checks consult the last locked shift
//! window).

use std::collections::{BTreeSet, HashMap};

use chrono::{NaiveDate, NaiveDateTime};

use rosterforge_core::calendar::{month_key, week_start};
use rosterforge_core::domain::{
    AssignmentStatus, EmployeeChanges, IncrementalBlock, PreviousAssignment, Problem,
};
use rosterforge_core::{DateRange, Hours};

/// Projected state for one employee at the start of the solve window.
#[derive(Debug, Clone, Default)]
pub struct EmployeePrior {
    /// Locked normal hours per Mon-Sun week (keyed by that week's Monday).
    pub weekly_normal: HashMap<NaiveDate, Hours>,
    /// Locked work days per week.
    pub weekly_work_days: HashMap<NaiveDate, u32>,
    /// Locked net hours per month.
    pub monthly_net: HashMap<(i32, u32), Hours>,
    /// Locked overtime per month.
    pub monthly_overtime: HashMap<(i32, u32), Hours>,
    /// Work run ending on, or on the day before, the cutoff date.
    pub streak_at_cutoff: u32,
    /// End of the most recent locked shift.
    pub last_work_end: Option<NaiveDateTime>,
    /// Every locked work date (also the in-window ones).
    pub locked_work_dates: BTreeSet<NaiveDate>,
    /// Locked shift windows for rest-gap checks.
    pub locked_windows: Vec<(NaiveDate, NaiveDateTime, NaiveDateTime)>,
}

/// Outcome of classifying a previous plan.
#[derive(Debug, Clone, Default)]
pub struct Projection {
    /// Assignments that must appear in the output unchanged.
    pub locked: Vec<PreviousAssignment>,
    /// Priors keyed by employee id.
    pub priors: HashMap<String, EmployeePrior>,
    /// Employees excluded from the solve pool (departed before the window).
    pub excluded_employees: BTreeSet<String>,
}

impl Projection {
    pub fn prior_for(&self, employee_id: &str) -> Option<&EmployeePrior> {
        self.priors.get(employee_id)
    }

    /// Whether a slot key is already covered by a locked ASSIGNED
    /// assignment. OFF_DAY records carry a nominal window but cover nothing.
    pub fn is_locked_key(&self, date: NaiveDate, requirement_id: &str, shift_code: &str) -> bool {
        self.locked.iter().any(|a| {
            a.status == AssignmentStatus::Assigned
                && a.date == date
                && a.requirement_id == requirement_id
                && a.shift_code == shift_code
        })
    }
}

/// Classifies the previous plan and projects priors.
pub fn project(problem: &Problem, block: &IncrementalBlock) -> Projection {
    let changes = &block.employee_changes;
    let mut projection = Projection::default();

    for emp in &problem.employees {
        if let Some(departure) = departure_date(changes, &emp.id) {
            if departure <= block.solve_from {
                projection.excluded_employees.insert(emp.id.clone());
            }
        }
    }

    for prev in &block.previous_assignments {
        if is_solvable(prev, block) {
            continue;
        }
        projection.locked.push(prev.clone());
        if prev.status == AssignmentStatus::Assigned {
            if let Some(emp_id) = &prev.employee_id {
                accumulate_prior(
                    problem,
                    projection.priors.entry(emp_id.clone()).or_default(),
                    prev,
                );
            }
        }
    }

    for prior in projection.priors.values_mut() {
        prior.streak_at_cutoff = streak_ending_at(&prior.locked_work_dates, block.cutoff_date);
        prior.last_work_end = prior.locked_windows.iter().map(|&(_, _, end)| end).max();
    }

    tracing::debug!(
        locked = projection.locked.len(),
        employees_with_priors = projection.priors.len(),
        excluded = projection.excluded_employees.len(),
        "incremental projection built"
    );
    projection
}

/// A previous assignment is re-opened when the window covers it and its
/// employee departed, is on long leave that date, or the slot was never
/// covered. Everything else stays locked.
fn is_solvable(prev: &PreviousAssignment, block: &IncrementalBlock) -> bool {
    if prev.date < block.cutoff_date {
        return false;
    }
    if prev.status == AssignmentStatus::Unassigned {
        return true;
    }
    let changes = &block.employee_changes;
    if let Some(emp_id) = &prev.employee_id {
        if let Some(departure) = departure_date(changes, emp_id) {
            if departure <= prev.date {
                return true;
            }
        }
        if changes
            .long_leaves
            .iter()
            .any(|l| &l.employee_id == emp_id && l.range.contains(prev.date))
        {
            return true;
        }
    }
    false
}

fn departure_date(changes: &EmployeeChanges, employee_id: &str) -> Option<NaiveDate> {
    changes
        .departures
        .iter()
        .find(|d| d.employee_id == employee_id)
        .map(|d| d.date)
}

fn accumulate_prior(problem: &Problem, prior: &mut EmployeePrior, prev: &PreviousAssignment) {
    let monday = week_start(prev.date);
    *prior.weekly_normal.entry(monday).or_default() += prev.normal_hours();
    *prior.weekly_work_days.entry(monday).or_default() += 1;

    let month = month_key(prev.date);
    let net = problem
        .shift(&prev.shift_code)
        .map(|s| s.net_hours())
        .unwrap_or(prev.normal_hours() + prev.overtime_hours());
    *prior.monthly_net.entry(month).or_default() += net;
    *prior.monthly_overtime.entry(month).or_default() += prev.overtime_hours();

    prior.locked_work_dates.insert(prev.date);
    prior.locked_windows.push((prev.date, prev.start, prev.end));
}

/// Longest run of work days ending on the cutoff date or the day before it.
fn streak_ending_at(work_dates: &BTreeSet<NaiveDate>, cutoff: NaiveDate) -> u32 {
    let mut end = if work_dates.contains(&cutoff) {
        cutoff
    } else if let Some(prev) = cutoff.pred_opt() {
        if work_dates.contains(&prev) {
            prev
        } else {
            return 0;
        }
    } else {
        return 0;
    };

    let mut streak = 1u32;
    while let Some(prev) = end.pred_opt() {
        if work_dates.contains(&prev) {
            streak += 1;
            end = prev;
        } else {
            break;
        }
    }
    streak
}

/// The effective solve window of an incremental request.
pub fn solve_window(block: &IncrementalBlock) -> DateRange {
    DateRange::new(block.solve_from, block.solve_to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosterforge_core::domain::Problem;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, day).unwrap()
    }

    fn problem_with_incremental(extra: serde_json::Value) -> Problem {
        let mut doc = serde_json::json!({
            "schemaVersion": "2.1",
            "planningHorizon": {"startDate": "2025-12-01", "endDate": "2025-12-31"},
            "shifts": [{"code": "D", "startTime": "08:00", "endTime": "20:00", "grossHours": 12.0}],
            "employees": [
                {"employeeId": "e1", "scheme": "A", "rank": "SER", "productType": "APO",
                 "organizationalUnit": "OU1"}
            ],
            "demandItems": [{"demandId": "dm1", "rosteringBasis": "demandBased",
                "requirements": [{"requirementId": "r1", "headcount": 1,
                    "workPattern": ["D", "D", "D", "D", "D", "O", "O"], "shiftCode": "D"}]}]
        });
        doc["incrementalSolve"] = extra;
        Problem::from_json(&doc.to_string()).unwrap()
    }

    fn prev(id: &str, day: u32, status: &str) -> serde_json::Value {
        serde_json::json!({
            "assignmentId": id, "employeeId": "e1", "date": format!("2025-12-{day:02}"),
            "requirementId": "r1", "shiftCode": "D", "status": status,
            "startDateTime": format!("2025-12-{day:02}T08:00:00"),
            "endDateTime": format!("2025-12-{day:02}T20:00:00"),
            "hours": {"gross": 12.0, "normal": 8.8, "overtime": 2.2}
        })
    }

    #[test]
    fn pre_cutoff_assignments_lock() {
        let p = problem_with_incremental(serde_json::json!({
            "cutoffDate": "2025-12-15", "solveFromDate": "2025-12-16",
            "solveToDate": "2025-12-31",
            "previousAssignments": [prev("a1", 10, "ASSIGNED"), prev("a2", 20, "ASSIGNED")]
        }));
        let block = p.incremental.clone().unwrap();
        let projection = project(&p, &block);
        // Both lock: pre-cutoff by date, post-cutoff because nothing re-opens it.
        assert_eq!(projection.locked.len(), 2);
        assert!(projection.is_locked_key(d(10), "r1", "D"));
        assert!(projection.is_locked_key(d(20), "r1", "D"));
    }

    #[test]
    fn unassigned_in_window_reopens() {
        let p = problem_with_incremental(serde_json::json!({
            "cutoffDate": "2025-12-15", "solveFromDate": "2025-12-16",
            "solveToDate": "2025-12-31",
            "previousAssignments": [prev("a1", 20, "UNASSIGNED")]
        }));
        let block = p.incremental.clone().unwrap();
        let projection = project(&p, &block);
        assert!(projection.locked.is_empty());
        assert!(!projection.is_locked_key(d(20), "r1", "D"));
    }

    #[test]
    fn departed_employee_reopens_and_is_excluded() {
        let p = problem_with_incremental(serde_json::json!({
            "cutoffDate": "2025-12-15", "solveFromDate": "2025-12-16",
            "solveToDate": "2025-12-31",
            "previousAssignments": [prev("a1", 20, "ASSIGNED"), prev("a2", 10, "ASSIGNED")],
            "employeeChanges": {"departures": [{"employeeId": "e1", "date": "2025-12-16"}]}
        }));
        let block = p.incremental.clone().unwrap();
        let projection = project(&p, &block);
        // The in-window assignment re-opens; the pre-cutoff one stays.
        assert_eq!(projection.locked.len(), 1);
        assert_eq!(projection.locked[0].assignment_id, "a2");
        assert!(projection.excluded_employees.contains("e1"));
    }

    #[test]
    fn priors_project_weekly_hours_and_streak() {
        // Work Mon 12-08 .. Fri 12-12, then cutoff Mon 12-15.
        let assignments: Vec<serde_json::Value> =
            (8..=12).map(|day| prev(&format!("a{day}"), day, "ASSIGNED")).collect();
        let p = problem_with_incremental(serde_json::json!({
            "cutoffDate": "2025-12-15", "solveFromDate": "2025-12-16",
            "solveToDate": "2025-12-31",
            "previousAssignments": assignments
        }));
        let block = p.incremental.clone().unwrap();
        let projection = project(&p, &block);
        let prior = projection.prior_for("e1").unwrap();
        let monday = d(8);
        assert_eq!(prior.weekly_normal[&monday], Hours::from_f64(8.8) * 5);
        assert_eq!(prior.weekly_work_days[&monday], 5);
        // Streak broke on 12-13/14 (weekend off), cutoff 12-15 sees none.
        assert_eq!(prior.streak_at_cutoff, 0);
        assert_eq!(prior.locked_work_dates.len(), 5);
        assert!(prior.last_work_end.unwrap() > d(12).and_hms_opt(19, 0, 0).unwrap());
    }

    #[test]
    fn streak_counts_runs_touching_cutoff() {
        let mut dates = BTreeSet::new();
        for day in [12, 13, 14] {
            dates.insert(d(day));
        }
        assert_eq!(streak_ending_at(&dates, d(15)), 3);
        assert_eq!(streak_ending_at(&dates, d(14)), 3);
        assert_eq!(streak_ending_at(&dates, d(17)), 0);
    }
}
