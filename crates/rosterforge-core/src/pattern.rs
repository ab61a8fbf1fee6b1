//! Cyclic work patterns and the fast feasibility probe.
//!
//! A pattern is an ordered sequence over {shift codes, 'O'} of cycle length
//! `L`. An employee with rotation offset `k` is on pattern day
//! `(days_since_anchor + k) mod L` on any calendar date. The probe validates
//! a pattern against a scheme's consecutive-day cap and weekly-hours cap
//! before any solving starts; infeasible patterns short-circuit the solve.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::hours::Hours;
use crate::scheme::Scheme;

/// One position in a work pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternToken {
    /// An off day ('O').
    Off,
    /// A work day carrying a shift code.
    Work(String),
}

impl PatternToken {
    #[inline]
    pub fn is_work(&self) -> bool {
        matches!(self, PatternToken::Work(_))
    }
}

/// An ordered cyclic sequence of pattern tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkPattern {
    tokens: Vec<PatternToken>,
}

impl WorkPattern {
    /// Builds a pattern from raw token strings; "O" (any case) is an off day,
    /// everything else is a shift code. Empty patterns are an input error.
    pub fn parse(raw: &[String], pointer: &str) -> Result<WorkPattern, EngineError> {
        if raw.is_empty() {
            return Err(EngineError::invalid_input(pointer, "work pattern is empty"));
        }
        let tokens = raw
            .iter()
            .map(|t| {
                let trimmed = t.trim();
                if trimmed.eq_ignore_ascii_case("O") {
                    PatternToken::Off
                } else {
                    PatternToken::Work(trimmed.to_string())
                }
            })
            .collect();
        Ok(WorkPattern { tokens })
    }

    #[inline]
    pub fn cycle_length(&self) -> usize {
        self.tokens.len()
    }

    /// Count of work positions in one cycle.
    pub fn work_days_per_cycle(&self) -> usize {
        self.tokens.iter().filter(|t| t.is_work()).count()
    }

    /// Fraction of the cycle that is work.
    pub fn work_fraction(&self) -> f64 {
        self.work_days_per_cycle() as f64 / self.cycle_length() as f64
    }

    #[inline]
    pub fn token_at(&self, pattern_day: usize) -> &PatternToken {
        &self.tokens[pattern_day % self.tokens.len()]
    }

    pub fn tokens(&self) -> &[PatternToken] {
        &self.tokens
    }

    /// Pattern day for `date` under `offset`, relative to `anchor`.
    /// Dates before the anchor wrap backwards through the cycle.
    pub fn pattern_day(&self, anchor: NaiveDate, date: NaiveDate, offset: i64) -> usize {
        let len = self.tokens.len() as i64;
        let since = (date - anchor).num_days();
        (since + offset).rem_euclid(len) as usize
    }

    /// Longest run of consecutive work days, treating the pattern as cyclic
    /// (a run may wrap from the last position into the first).
    pub fn longest_work_run(&self) -> usize {
        let len = self.tokens.len();
        if self.tokens.iter().all(|t| t.is_work()) {
            return len;
        }
        let mut best = 0usize;
        let mut current = 0usize;
        // Walk two cycles so wrapping runs are seen whole.
        for i in 0..len * 2 {
            if self.tokens[i % len].is_work() {
                current += 1;
                best = best.max(current.min(len));
            } else {
                current = 0;
            }
        }
        best
    }

    /// Distinct shift codes appearing in the pattern, in first-seen order.
    pub fn shift_codes(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for t in &self.tokens {
            if let PatternToken::Work(code) = t {
                if !seen.contains(&code.as_str()) {
                    seen.push(code.as_str());
                }
            }
        }
        seen
    }

    /// Canonical joined letters, e.g. "D,D,N,O".
    pub fn joined(&self) -> String {
        self.tokens
            .iter()
            .map(|t| match t {
                PatternToken::Off => "O",
                PatternToken::Work(code) => code.as_str(),
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for WorkPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.joined())
    }
}

/// Outcome of the pattern feasibility probe.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternValidationResult {
    pub feasible: bool,
    pub scheme: Scheme,
    pub cycle_length: usize,
    pub work_days_per_cycle: usize,
    pub longest_work_run: usize,
    pub max_allowed_run: u32,
    /// Average weekly work hours implied by the pattern.
    pub weekly_hours: f64,
    pub weekly_cap: f64,
    pub messages: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Validates a pattern against a scheme's caps. `shift_net` defaults to 11 h
/// when the caller has no shift information.
pub fn validate_pattern(
    pattern: &WorkPattern,
    scheme: Scheme,
    shift_net: Option<Hours>,
    apgd_d10: bool,
) -> PatternValidationResult {
    let net = shift_net.unwrap_or(Hours::from_whole(11));
    let cycle_length = pattern.cycle_length();
    let work_days = pattern.work_days_per_cycle();
    let longest_run = pattern.longest_work_run();
    let max_run = scheme.consecutive_cap(apgd_d10);

    let weekly_hours = work_days as f64 * net.as_f64() * 7.0 / cycle_length as f64;
    let weekly_cap = scheme.weekly_cap(net).as_f64();

    let mut messages = Vec::new();
    let mut suggestions = Vec::new();
    let mut feasible = true;

    if longest_run as u32 > max_run {
        feasible = false;
        messages.push(format!(
            "pattern has a {longest_run}-day work run; scheme {scheme} allows at most {max_run} consecutive work days"
        ));
        suggestions.push(format!(
            "shorten the work run to {max_run} days or insert an off day"
        ));
        if scheme == Scheme::A && !apgd_d10 && longest_run as u32 <= Scheme::A.consecutive_cap(true)
        {
            suggestions.push("enable APGD-D10 approval for the assigned employees".to_string());
        }
    }

    if weekly_hours > weekly_cap {
        messages.push(format!(
            "pattern implies {weekly_hours:.2} weekly hours against a {weekly_cap:.2} h cap; extra employees will be provisioned"
        ));
    }

    PatternValidationResult {
        feasible,
        scheme,
        cycle_length,
        work_days_per_cycle: work_days,
        longest_work_run: longest_run,
        max_allowed_run: max_run,
        weekly_hours,
        weekly_cap,
        messages,
        suggestions,
    }
}

/// Converts an infeasible probe outcome into the structured error.
pub fn infeasibility_error(
    pattern: &WorkPattern,
    result: &PatternValidationResult,
) -> EngineError {
    EngineError::PatternInfeasible {
        pattern: pattern.joined(),
        scheme: result.scheme,
        message: result.messages.join("; "),
        suggestions: result.suggestions.clone(),
    }
}
