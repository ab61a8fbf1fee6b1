//! Employment schemes and the statutory caps attached to them.
//!
//! Scheme A is full-time standard, Scheme B full-time contractual, Scheme P
//! part-time. APGD-D10 is a special-approval marker on Scheme A employees
//! permitting up to 7 consecutive work days under modified caps.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::hours::Hours;

/// Closed employment-scheme enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scheme {
    A,
    B,
    P,
}

impl Scheme {
    /// Normalizes a display form ("A", "Scheme A", "schemeB") to the
    /// canonical letter. Case-insensitive, prefix-tolerant.
    pub fn parse(raw: &str, pointer: &str) -> Result<Scheme, EngineError> {
        let trimmed = raw.trim();
        let letter = trimmed
            .strip_prefix("Scheme ")
            .or_else(|| trimmed.strip_prefix("scheme "))
            .or_else(|| trimmed.strip_prefix("Scheme"))
            .or_else(|| trimmed.strip_prefix("scheme"))
            .unwrap_or(trimmed)
            .trim();
        match letter {
            "A" | "a" => Ok(Scheme::A),
            "B" | "b" => Ok(Scheme::B),
            "P" | "p" => Ok(Scheme::P),
            _ => Err(EngineError::invalid_input(
                pointer,
                format!("unknown scheme '{raw}' (expected A, B or P)"),
            )),
        }
    }

    /// Default daily net-hours cap (C1).
    pub fn daily_cap(self) -> Hours {
        match self {
            Scheme::A | Scheme::B => Hours::from_whole(14),
            Scheme::P => Hours::from_whole(9),
        }
    }

    /// Weekly normal-hours cap (C2/C6). Scheme P's cap depends on the shift
    /// duration; `shift_net` is ignored for A and B.
    pub fn weekly_cap(self, shift_net: Hours) -> Hours {
        match self {
            Scheme::A | Scheme::B => Hours::from_whole(44),
            Scheme::P => {
                if shift_net >= Hours::from_whole(8) {
                    Hours::from_millis(34_980)
                } else {
                    Hours::from_millis(29_980)
                }
            }
        }
    }

    /// Maximum work days per Mon-Sun week implied by the weekly cap.
    /// Scheme P: 4 days for shifts >= 8 h, 5 for 6-hour shifts, 6 for
    /// 5-hour shifts, 7 for shifts of 4 h or less.
    pub fn max_week_days(self, shift_net: Hours, apgd_d10: bool) -> u32 {
        match self {
            Scheme::A | Scheme::B => {
                if apgd_d10 {
                    7
                } else {
                    6
                }
            }
            Scheme::P => {
                if shift_net >= Hours::from_whole(8) {
                    4
                } else if shift_net >= Hours::from_whole(6) {
                    5
                } else if shift_net >= Hours::from_whole(5) {
                    6
                } else {
                    7
                }
            }
        }
    }

    /// Consecutive work-day cap (C3).
    pub fn consecutive_cap(self, apgd_d10: bool) -> u32 {
        match self {
            Scheme::A | Scheme::B => {
                if apgd_d10 {
                    8
                } else {
                    12
                }
            }
            Scheme::P => 6,
        }
    }

    /// Minimum rest between shifts (C4/C7). `same_day` applies only to
    /// Scheme P multi-shift days.
    pub fn min_rest(self, apgd_d10: bool, same_day: bool) -> Hours {
        if same_day && self == Scheme::P {
            return Hours::from_whole(1);
        }
        if apgd_d10 {
            Hours::from_whole(8)
        } else {
            Hours::from_whole(11)
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::A => write!(f, "A"),
            Scheme::B => write!(f, "B"),
            Scheme::P => write!(f, "P"),
        }
    }
}

/// Gender restriction on a slot or attribute of an employee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Gender {
    M,
    F,
    #[default]
    Any,
}

impl Gender {
    /// Accepts "M"/"F"/"Any"/"Global"/empty; anything else is an input error.
    pub fn parse(raw: &str, pointer: &str) -> Result<Gender, EngineError> {
        match raw.trim() {
            "M" | "m" | "Male" | "male" => Ok(Gender::M),
            "F" | "f" | "Female" | "female" => Ok(Gender::F),
            "" | "Any" | "any" | "ANY" | "Global" | "global" => Ok(Gender::Any),
            other => Err(EngineError::invalid_input(
                pointer,
                format!("unknown gender '{other}' (expected M, F or Any)"),
            )),
        }
    }

    /// Whether an employee of gender `other` satisfies this restriction.
    pub fn admits(self, other: Gender) -> bool {
        self == Gender::Any || self == other
    }
}

/// APGD-D10 monthly total cap (C19), keyed by days in month and employee
/// category. Categories: standard, or foreign CPL/SGT.
pub fn apgd_d10_monthly_cap(days_in_month: u32, foreign_cpl_sgt: bool) -> Hours {
    let whole = match (days_in_month, foreign_cpl_sgt) {
        (28, false) => 224,
        (28, true) => 244,
        (29, false) => 231,
        (29, true) => 252,
        (30, false) => 238,
        (30, true) => 260,
        (_, false) => 246,
        (_, true) => 268,
    };
    Hours::from_whole(whole)
}

/// Scheme P daily normal-hours threshold by days worked in the Mon-Sun week.
/// The 5-day row makes the 5th consecutive work day entirely overtime.
pub fn scheme_p_daily_threshold(days_worked_in_week: u32) -> Hours {
    match days_worked_in_week {
        0..=4 => Hours::from_millis(8_745),
        5 => Hours::from_millis(5_996),
        6 => Hours::from_millis(4_996),
        _ => Hours::from_millis(4_283),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_display_forms() {
        assert_eq!(Scheme::parse("Scheme A", "/x").unwrap(), Scheme::A);
        assert_eq!(Scheme::parse("b", "/x").unwrap(), Scheme::B);
        assert_eq!(Scheme::parse("schemeP", "/x").unwrap(), Scheme::P);
        assert!(Scheme::parse("Q", "/x").is_err());
    }

    #[test]
    fn weekly_caps() {
        assert_eq!(Scheme::A.weekly_cap(Hours::from_whole(11)), Hours::from_whole(44));
        assert_eq!(
            Scheme::P.weekly_cap(Hours::from_whole(8)),
            Hours::from_millis(34_980)
        );
        assert_eq!(
            Scheme::P.weekly_cap(Hours::from_whole(6)),
            Hours::from_millis(29_980)
        );
    }

    #[test]
    fn consecutive_caps() {
        assert_eq!(Scheme::A.consecutive_cap(false), 12);
        assert_eq!(Scheme::A.consecutive_cap(true), 8);
        assert_eq!(Scheme::P.consecutive_cap(false), 6);
    }

    #[test]
    fn rest_minimums() {
        assert_eq!(Scheme::A.min_rest(false, false), Hours::from_whole(11));
        assert_eq!(Scheme::A.min_rest(true, false), Hours::from_whole(8));
        assert_eq!(Scheme::P.min_rest(false, true), Hours::from_whole(1));
    }

    #[test]
    fn apgd_table() {
        assert_eq!(apgd_d10_monthly_cap(31, false), Hours::from_whole(246));
        assert_eq!(apgd_d10_monthly_cap(31, true), Hours::from_whole(268));
        assert_eq!(apgd_d10_monthly_cap(28, false), Hours::from_whole(224));
        assert_eq!(apgd_d10_monthly_cap(30, true), Hours::from_whole(260));
    }

    #[test]
    fn gender_admission() {
        assert!(Gender::Any.admits(Gender::M));
        assert!(!Gender::F.admits(Gender::M));
        assert_eq!(Gender::parse("Global", "/g").unwrap(), Gender::Any);
    }
}
