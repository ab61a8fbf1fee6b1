//! Calendar helpers: inclusive date ranges, Mon-Sun weeks, month arithmetic.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    #[inline]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar days, inclusive of both endpoints.
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Iterates every date in the range in order.
    pub fn iter(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }
}

/// Monday of the Mon-Sun week containing `date`. Used as the week key for
/// weekly caps and rest rules.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let back = date.weekday().num_days_from_monday() as u64;
    date.checked_sub_days(Days::new(back)).unwrap_or(date)
}

/// Mondays of every Mon-Sun week overlapping the range, in order.
pub fn weeks_overlapping(range: &DateRange) -> Vec<NaiveDate> {
    let mut weeks = Vec::new();
    let mut monday = week_start(range.start);
    while monday <= range.end {
        weeks.push(monday);
        monday = monday
            .checked_add_days(Days::new(7))
            .expect("date overflow walking weeks");
    }
    weeks
}

/// Number of days in the month containing `date`.
pub fn days_in_month(date: NaiveDate) -> u32 {
    let (y, m) = (date.year(), date.month());
    let first = NaiveDate::from_ymd_opt(y, m, 1).expect("valid first of month");
    let next = if m == 12 {
        NaiveDate::from_ymd_opt(y + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(y, m + 1, 1)
    }
    .expect("valid first of next month");
    (next - first).num_days() as u32
}

/// `(year, month)` key for monthly caps.
#[inline]
pub fn month_key(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}

/// Set of covered weekdays as a 7-bit mask (bit 0 = Monday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    /// All seven days covered.
    pub const ALL: WeekdaySet = WeekdaySet(0b0111_1111);

    pub fn from_weekdays(days: impl IntoIterator<Item = Weekday>) -> Self {
        let mut mask = 0u8;
        for d in days {
            mask |= 1 << d.num_days_from_monday();
        }
        WeekdaySet(mask)
    }

    #[inline]
    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }
}

impl Default for WeekdaySet {
    fn default() -> Self {
        WeekdaySet::ALL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn range_iteration_is_inclusive() {
        let r = DateRange::new(d(2025, 12, 30), d(2026, 1, 2));
        let dates: Vec<_> = r.iter().collect();
        assert_eq!(dates.len(), 4);
        assert_eq!(r.len_days(), 4);
        assert!(r.contains(d(2026, 1, 1)));
        assert!(!r.contains(d(2026, 1, 3)));
    }

    #[test]
    fn week_start_is_monday() {
        // 2025-12-15 is a Monday.
        assert_eq!(week_start(d(2025, 12, 15)), d(2025, 12, 15));
        assert_eq!(week_start(d(2025, 12, 21)), d(2025, 12, 15));
        assert_eq!(week_start(d(2025, 12, 22)), d(2025, 12, 22));
    }

    #[test]
    fn december_has_five_overlapping_weeks() {
        let weeks = weeks_overlapping(&DateRange::new(d(2025, 12, 1), d(2025, 12, 31)));
        assert_eq!(weeks.len(), 5);
        assert_eq!(weeks[0], d(2025, 12, 1));
        assert_eq!(weeks[4], d(2025, 12, 29));
    }

    #[test]
    fn month_lengths() {
        assert_eq!(days_in_month(d(2025, 12, 10)), 31);
        assert_eq!(days_in_month(d(2026, 2, 1)), 28);
        assert_eq!(days_in_month(d(2028, 2, 15)), 29);
    }

    #[test]
    fn weekday_mask() {
        let set = WeekdaySet::from_weekdays([Weekday::Mon, Weekday::Fri]);
        assert!(set.contains(Weekday::Mon));
        assert!(!set.contains(Weekday::Sun));
        assert_eq!(set.count(), 2);
        assert!(WeekdaySet::ALL.contains(Weekday::Sun));
    }
}
