//! Ingress and normalization tests.

use chrono::NaiveDate;

use super::*;
use crate::hours::Hours;
use crate::scheme::{Gender, Scheme};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn minimal_doc() -> serde_json::Value {
    serde_json::json!({
        "schemaVersion": "2.1",
        "planningHorizon": {"startDate": "2025-12-01", "endDate": "2025-12-31"},
        "publicHolidays": ["2025-12-25"],
        "shifts": [
            {"code": "D", "startTime": "08:00", "endTime": "20:00", "grossHours": 12.0, "lunchBreak": 1.0}
        ],
        "employees": [
            {"employeeId": "e1", "scheme": "Scheme A", "rank": "SER", "productType": "APO",
             "organizationalUnit": "OU1", "gender": "M"}
        ],
        "demandItems": [
            {"demandId": "dm1", "rosteringBasis": "demandBased",
             "requirements": [
                 {"requirementId": "r1", "headcount": 1,
                  "workPattern": ["D", "D", "D", "D", "D", "O", "O"],
                  "shiftCode": "D", "scheme": "A", "rankId": "SER"}
             ]}
        ]
    })
}

#[test]
fn parses_minimal_document() {
    let problem = Problem::from_json(&minimal_doc().to_string()).unwrap();
    assert_eq!(problem.schema_version, "2.1");
    assert_eq!(problem.horizon.len_days(), 31);
    assert_eq!(problem.employees.len(), 1);
    assert_eq!(problem.employees[0].scheme, Scheme::A);
    assert_eq!(problem.employees[0].gender, Gender::M);
    assert!(problem.public_holidays.contains(&d(2025, 12, 25)));
}

#[test]
fn singular_fields_become_one_element_lists() {
    let problem = Problem::from_json(&minimal_doc().to_string()).unwrap();
    let (_, req) = problem.requirements().next().unwrap();
    assert_eq!(req.rank_ids, vec!["SER".to_string()]);
    assert_eq!(req.rank_form, RankForm::Singular);
    assert_eq!(req.shift_codes, vec!["D".to_string()]);
    assert!(matches!(&req.schemes, SchemeFilter::Set(s) if s == &vec![Scheme::A]));
}

#[test]
fn global_scheme_accepts_all() {
    let mut doc = minimal_doc();
    let req = &mut doc["demandItems"][0]["requirements"][0];
    req["scheme"] = serde_json::Value::Null;
    req["schemes"] = serde_json::json!(["Global"]);
    let problem = Problem::from_json(&doc.to_string()).unwrap();
    let (_, req) = problem.requirements().next().unwrap();
    assert!(matches!(req.schemes, SchemeFilter::Any));
    assert!(req.schemes.admits(Scheme::P));
}

#[test]
fn flat_qualifications_become_one_all_group() {
    let mut doc = minimal_doc();
    doc["demandItems"][0]["requirements"][0]["qualifications"] =
        serde_json::json!(["FIRST_AID", "FIREARM"]);
    let problem = Problem::from_json(&doc.to_string()).unwrap();
    let (_, req) = problem.requirements().next().unwrap();
    assert_eq!(req.qualification_groups.len(), 1);
    assert_eq!(req.qualification_groups[0].match_type, MatchType::All);
    assert_eq!(req.qualification_groups[0].codes.len(), 2);
}

#[test]
fn duplicate_employee_ids_are_rejected_with_pointer() {
    let mut doc = minimal_doc();
    let emp = doc["employees"][0].clone();
    doc["employees"].as_array_mut().unwrap().push(emp);
    let err = Problem::from_json(&doc.to_string()).unwrap_err();
    match err {
        crate::error::EngineError::InvalidInput { pointer, .. } => {
            assert_eq!(pointer, "/employees/1/employeeId");
        }
        other => panic!("expected InvalidInput, got {other:?}"),
    }
}

#[test]
fn unknown_shift_code_is_rejected() {
    let mut doc = minimal_doc();
    doc["demandItems"][0]["requirements"][0]["shiftCode"] = serde_json::json!("X");
    let err = Problem::from_json(&doc.to_string()).unwrap_err();
    assert_eq!(err.kind(), "InvalidInput");
}

#[test]
fn reversed_horizon_is_rejected() {
    let mut doc = minimal_doc();
    doc["planningHorizon"]["endDate"] = serde_json::json!("2025-11-01");
    assert!(Problem::from_json(&doc.to_string()).is_err());
}

#[test]
fn legacy_fixed_rotation_offset_boolean() {
    let mut doc = minimal_doc();
    doc["demandItems"][0]["fixedRotationOffset"] = serde_json::json!(false);
    let problem = Problem::from_json(&doc.to_string()).unwrap();
    assert_eq!(problem.demand_items[0].offset_mode, OffsetMode::SolverOptimized);

    doc["demandItems"][0]["fixedRotationOffset"] = serde_json::json!("ou_offsets");
    let problem = Problem::from_json(&doc.to_string()).unwrap();
    assert_eq!(problem.demand_items[0].offset_mode, OffsetMode::OuOffsets);
}

#[test]
fn apgd_requirement_marks_admitted_employees() {
    let mut doc = minimal_doc();
    doc["demandItems"][0]["requirements"][0]["enableApgdD10"] = serde_json::json!(true);
    let problem = Problem::from_json(&doc.to_string()).unwrap();
    assert!(problem.employees[0].apgd_d10);
    assert!(problem.employees[0].effective_apgd_d10());
}

#[test]
fn shift_window_crosses_midnight() {
    let shift = ShiftType {
        code: "N".into(),
        start_time: chrono::NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        end_time: chrono::NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        gross_hours: Hours::from_whole(12),
        lunch_break: None,
    };
    assert!(shift.crosses_midnight());
    let (start, end) = shift.window_on(d(2025, 12, 31));
    assert_eq!(start.date(), d(2025, 12, 31));
    assert_eq!(end.date(), d(2026, 1, 1));
    assert_eq!(shift.effective_lunch(), Hours::from_whole(1));
}

#[test]
fn short_shift_has_no_default_lunch() {
    let shift = ShiftType {
        code: "H".into(),
        start_time: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        end_time: chrono::NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
        gross_hours: Hours::from_whole(5),
        lunch_break: None,
    };
    assert_eq!(shift.effective_lunch(), Hours::ZERO);
    assert_eq!(shift.net_hours(), Hours::from_whole(5));
}

#[test]
fn hour_limits_lookup_prefers_specific_rows() {
    let table = MonthlyHourLimits {
        rows: vec![
            HourLimitRow {
                scheme: Scheme::A,
                product_type: None,
                employee_type: None,
                by_month_length: [(
                    31,
                    MonthLimits {
                        method: HourMethod::WeeklyThreshold,
                        minimum_contractual_hours: Hours::from_whole(176),
                        max_overtime_hours: Hours::from_whole(72),
                        total_max_hours: Hours::from_whole(260),
                    },
                )]
                .into_iter()
                .collect(),
            },
            HourLimitRow {
                scheme: Scheme::A,
                product_type: Some("APO".into()),
                employee_type: Some("local".into()),
                by_month_length: [(
                    31,
                    MonthLimits {
                        method: HourMethod::MonthlyCumulative,
                        minimum_contractual_hours: Hours::from_whole(180),
                        max_overtime_hours: Hours::from_whole(60),
                        total_max_hours: Hours::from_whole(250),
                    },
                )]
                .into_iter()
                .collect(),
            },
        ],
    };
    let hit = table.lookup(Scheme::A, "APO", false, 31).unwrap();
    assert_eq!(hit.method, HourMethod::MonthlyCumulative);
    let fallback = table.lookup(Scheme::A, "OTHER", true, 31).unwrap();
    assert_eq!(fallback.method, HourMethod::WeeklyThreshold);
    assert!(table.lookup(Scheme::P, "APO", false, 31).is_none());
}

#[test]
fn auto_ratio_candidates() {
    let r = AutoRatioRange {
        min: 0.6,
        max: 0.8,
        step: 0.1,
    };
    assert_eq!(r.candidates(), vec![0.6, 0.7, 0.8]);
    let dflt = AutoRatioRange::DEFAULT.candidates();
    assert_eq!(dflt.first(), Some(&0.5));
    assert_eq!(dflt.last(), Some(&0.8));
    assert_eq!(dflt.len(), 7);
}

#[test]
fn incremental_block_round_trips() {
    let mut doc = minimal_doc();
    doc["incrementalSolve"] = serde_json::json!({
        "cutoffDate": "2025-12-15",
        "solveFromDate": "2025-12-16",
        "solveToDate": "2025-12-31",
        "previousAssignments": [
            {"assignmentId": "a1", "employeeId": "e1", "date": "2025-12-01",
             "requirementId": "r1", "shiftCode": "D", "status": "ASSIGNED",
             "startDateTime": "2025-12-01T08:00:00", "endDateTime": "2025-12-01T20:00:00",
             "hours": {"gross": 12.0, "normal": 8.8, "overtime": 2.2}}
        ],
        "employeeChanges": {"newJoiners": ["e2"], "departures": [], "longLeaves": []}
    });
    let problem = Problem::from_json(&doc.to_string()).unwrap();
    let inc = problem.incremental.unwrap();
    assert_eq!(inc.cutoff_date, d(2025, 12, 15));
    assert_eq!(inc.previous_assignments.len(), 1);
    assert_eq!(inc.previous_assignments[0].normal_hours(), Hours::from_f64(8.8));
    assert_eq!(inc.employee_changes.new_joiners, vec!["e2".to_string()]);
}

#[test]
fn legacy_off_status_is_rewritten() {
    let status: AssignmentStatus = serde_json::from_str("\"OFF\"").unwrap();
    assert_eq!(status, AssignmentStatus::OffDay);
    assert_eq!(
        serde_json::to_string(&AssignmentStatus::OffDay).unwrap(),
        "\"OFF_DAY\""
    );
}
