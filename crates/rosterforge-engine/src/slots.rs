//! Slot builder: expands requirements over the horizon into concrete slots.
//!
//! Demand-based requirements produce one slot per headcount position on
//! every covered date (the pattern governs employee eligibility elsewhere).
//! Positional outcome-based requirements skip dates whose pattern position
//! under the position's rotation offset is an off day, and carry that offset
//! on the slot. The slot set is deterministic: sorted by
//! `(date, requirement_id, shift_code, position)`.

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use rosterforge_core::domain::{OffsetMode, Problem, Requirement, RosteringBasis};
use rosterforge_core::pattern::PatternToken;
use rosterforge_core::{DateRange, EngineError, ReqIdx, Result, SlotIdx};

/// One requirement flattened out of its demand item, with the demand-level
/// attributes it inherits.
#[derive(Debug, Clone)]
pub struct ReqEntry {
    pub demand_id: String,
    pub basis: RosteringBasis,
    pub offset_mode: OffsetMode,
    pub ou_offsets: std::collections::BTreeMap<String, i64>,
    pub min_staff_pct: f64,
    pub req: Requirement,
}

/// Flattened requirement arena for one solve.
#[derive(Debug, Clone, Default)]
pub struct ReqTable {
    entries: Vec<ReqEntry>,
}

impl ReqTable {
    pub fn from_problem(problem: &Problem) -> Self {
        let mut entries = Vec::new();
        for item in &problem.demand_items {
            for req in &item.requirements {
                entries.push(ReqEntry {
                    demand_id: item.id.clone(),
                    basis: item.rostering_basis,
                    offset_mode: item.offset_mode,
                    ou_offsets: item.ou_offsets.clone(),
                    min_staff_pct: item.min_staff_threshold_pct,
                    req: req.clone(),
                });
            }
        }
        ReqTable { entries }
    }

    #[inline]
    pub fn get(&self, idx: ReqIdx) -> &ReqEntry {
        &self.entries[idx.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ReqIdx, &ReqEntry)> {
        self.entries.iter().enumerate().map(|(i, e)| (ReqIdx::new(i), e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flips every demand-based entry to outcome-based (fallback mode).
    pub fn with_outcome_based_fallback(&self) -> Self {
        let mut entries = self.entries.clone();
        for e in &mut entries {
            e.basis = RosteringBasis::OutcomeBased;
        }
        ReqTable { entries }
    }
}

/// A materialized shift slot.
#[derive(Debug, Clone)]
pub struct Slot {
    pub id: String,
    pub date: NaiveDate,
    pub shift_code: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub req: ReqIdx,
    pub position: u32,
    /// Pattern position of this date under the slot's offset.
    pub pattern_day: u32,
    /// Rotation offset implied by the position (positional outcome mode).
    pub rotation_offset_for_position: u32,
    pub required: bool,
}

/// The slot table for one solve.
#[derive(Debug, Clone, Default)]
pub struct SlotTable {
    slots: Vec<Slot>,
}

impl SlotTable {
    #[inline]
    pub fn get(&self, idx: SlotIdx) -> &Slot {
        &self.slots[idx.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotIdx, &Slot)> {
        self.slots.iter().enumerate().map(|(i, s)| (SlotIdx::new(i), s))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Builds the slot table for `window` (the full horizon, or the incremental
/// sub-window). `skip` filters out slots whose canonical key is already
/// covered by a locked assignment.
pub fn build_slots(
    problem: &Problem,
    reqs: &ReqTable,
    window: &DateRange,
    skip: &dyn Fn(NaiveDate, &str, &str) -> bool,
) -> Result<SlotTable> {
    let mut slots = Vec::new();
    for (req_idx, entry) in reqs.iter() {
        build_requirement_slots(problem, req_idx, entry, window, skip, &mut slots)?;
    }
    // Deterministic ordering regardless of emission order.
    slots.sort_by(|a, b| {
        (a.date, &a.id, &a.shift_code, a.position).cmp(&(b.date, &b.id, &b.shift_code, b.position))
    });
    Ok(SlotTable { slots })
}

fn build_requirement_slots(
    problem: &Problem,
    req_idx: ReqIdx,
    entry: &ReqEntry,
    window: &DateRange,
    skip: &dyn Fn(NaiveDate, &str, &str) -> bool,
    out: &mut Vec<Slot>,
) -> Result<()> {
    let req = &entry.req;
    let headcount = req.headcount_or_default();
    let cycle_length = req.work_pattern.cycle_length() as u32;

    for date in window.iter() {
        if !req.coverage_days.contains(date.weekday()) {
            continue;
        }
        for position in 0..headcount {
            let (shift_code, pattern_day, offset_for_position) = match entry.basis {
                RosteringBasis::DemandBased => {
                    let day = req.work_pattern.pattern_day(req.coverage_anchor, date, 0) as u32;
                    (demand_shift_code(req, day), day, 0)
                }
                RosteringBasis::OutcomeBased => {
                    let offset = position % cycle_length;
                    let day =
                        req.work_pattern
                            .pattern_day(req.coverage_anchor, date, offset as i64)
                            as u32;
                    match req.work_pattern.token_at(day as usize) {
                        PatternToken::Off => continue,
                        PatternToken::Work(code) => (code.clone(), day, offset),
                    }
                }
            };

            if skip(date, &req.id, &shift_code) {
                continue;
            }

            let shift = problem.shift(&shift_code).ok_or_else(|| {
                EngineError::Internal(format!(
                    "requirement {} references unknown shift '{shift_code}'",
                    req.id
                ))
            })?;
            let (start, end) = shift.window_on(date);

            out.push(Slot {
                id: format!("{}:{date}:{shift_code}:{position}", req.id),
                date,
                shift_code,
                start,
                end,
                req: req_idx,
                position,
                pattern_day,
                rotation_offset_for_position: offset_for_position,
                required: true,
            });
        }
    }
    Ok(())
}

/// Shift for a demand-based slot: the pattern's token for the date when it
/// is a work day, otherwise the requirement's first accepted shift code.
fn demand_shift_code(req: &Requirement, pattern_day: u32) -> String {
    match req.work_pattern.token_at(pattern_day as usize) {
        PatternToken::Work(code) if req.shift_codes.contains(code) => code.clone(),
        _ => req
            .shift_codes
            .first()
            .cloned()
            .unwrap_or_else(|| "D".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problem(basis: &str, headcount: u32, coverage: Option<Vec<&str>>) -> Problem {
        let mut req = serde_json::json!({
            "requirementId": "r1", "headcount": headcount,
            "workPattern": ["D", "D", "D", "D", "D", "O", "O"],
            "shiftCode": "D"
        });
        if let Some(days) = coverage {
            req["coverageDays"] = serde_json::json!(days);
        }
        let doc = serde_json::json!({
            "schemaVersion": "2.1",
            "planningHorizon": {"startDate": "2025-12-01", "endDate": "2025-12-14"},
            "shifts": [{"code": "D", "startTime": "08:00", "endTime": "20:00", "grossHours": 12.0}],
            "employees": [],
            "demandItems": [{"demandId": "dm1", "rosteringBasis": basis, "requirements": [req]}]
        });
        Problem::from_json(&doc.to_string()).unwrap()
    }

    fn no_skip(_: NaiveDate, _: &str, _: &str) -> bool {
        false
    }

    #[test]
    fn demand_based_emits_every_covered_date() {
        let p = problem("demandBased", 2, None);
        let reqs = ReqTable::from_problem(&p);
        let slots = build_slots(&p, &reqs, &p.horizon, &no_skip).unwrap();
        // 14 days x 2 positions, off-pattern days included.
        assert_eq!(slots.len(), 28);
    }

    #[test]
    fn outcome_based_skips_off_days() {
        let p = problem("outcomeBased", 1, None);
        let reqs = ReqTable::from_problem(&p);
        let slots = build_slots(&p, &reqs, &p.horizon, &no_skip).unwrap();
        // Pattern D5 O2 anchored at the horizon start: 10 work days in 14.
        assert_eq!(slots.len(), 10);
        for (_, slot) in slots.iter() {
            assert_eq!(slot.rotation_offset_for_position, 0);
        }
    }

    #[test]
    fn positional_offsets_stagger_positions() {
        let p = problem("outcomeBased", 3, None);
        let reqs = ReqTable::from_problem(&p);
        let slots = build_slots(&p, &reqs, &p.horizon, &no_skip).unwrap();
        let offsets: std::collections::BTreeSet<u32> = slots
            .iter()
            .map(|(_, s)| s.rotation_offset_for_position)
            .collect();
        assert_eq!(offsets, [0u32, 1, 2].into_iter().collect());
    }

    #[test]
    fn coverage_days_filter_dates() {
        let p = problem("demandBased", 1, Some(vec!["Mon", "Tue"]));
        let reqs = ReqTable::from_problem(&p);
        let slots = build_slots(&p, &reqs, &p.horizon, &no_skip).unwrap();
        // Two weeks -> 2 Mondays + 2 Tuesdays.
        assert_eq!(slots.len(), 4);
    }

    #[test]
    fn ordering_is_stable() {
        let p = problem("demandBased", 2, None);
        let reqs = ReqTable::from_problem(&p);
        let a = build_slots(&p, &reqs, &p.horizon, &no_skip).unwrap();
        let b = build_slots(&p, &reqs, &p.horizon, &no_skip).unwrap();
        let ids_a: Vec<_> = a.iter().map(|(_, s)| s.id.clone()).collect();
        let ids_b: Vec<_> = b.iter().map(|(_, s)| s.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(a.iter().next().unwrap().1.date, p.horizon.start);
    }

    #[test]
    fn skip_filter_suppresses_locked_slots() {
        let p = problem("demandBased", 1, None);
        let reqs = ReqTable::from_problem(&p);
        let lock_date = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        let skip = move |date: NaiveDate, req: &str, shift: &str| {
            date == lock_date && req == "r1" && shift == "D"
        };
        let slots = build_slots(&p, &reqs, &p.horizon, &skip).unwrap();
        assert_eq!(slots.len(), 13);
        assert!(slots.iter().all(|(_, s)| s.date != lock_date));
    }

    #[test]
    fn cross_midnight_shift_ends_next_day() {
        let doc = serde_json::json!({
            "schemaVersion": "2.1",
            "planningHorizon": {"startDate": "2025-12-31", "endDate": "2025-12-31"},
            "shifts": [{"code": "N", "startTime": "20:00", "endTime": "08:00", "grossHours": 12.0}],
            "employees": [],
            "demandItems": [{"demandId": "dm1", "rosteringBasis": "demandBased",
                "requirements": [{"requirementId": "r1", "headcount": 1,
                    "workPattern": ["N"], "shiftCode": "N"}]}]
        });
        let p = Problem::from_json(&doc.to_string()).unwrap();
        let reqs = ReqTable::from_problem(&p);
        let slots = build_slots(&p, &reqs, &p.horizon, &no_skip).unwrap();
        assert_eq!(slots.len(), 1);
        let slot = slots.iter().next().unwrap().1;
        assert_eq!(slot.end.date(), NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
    }
}
