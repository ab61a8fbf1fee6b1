//! Local-search improvement phase.
//!
//! Hill climbing over two move kinds: *change* (re-seat or fill one slot)
//! and *swap* (exchange the employees of two slots). Moves are applied
//! speculatively against the evaluator and reverted unless they improve the
//! score. The loop stops on the step budget, an unimproved-streak limit, the
//! wall clock, or cancellation.

use std::time::Instant;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use rosterforge_core::SlotIdx;

use crate::backend::{SearchLimits, SearchStats};
use crate::cancellation::CancellationToken;
use crate::evaluator::Evaluator;
use crate::model::CpModel;

/// Stop searching after this many consecutive non-improving steps.
const UNIMPROVED_LIMIT: u64 = 4_000;

/// Poll the clock and the cancellation flag every this many steps.
const POLL_INTERVAL: u64 = 256;

pub struct LocalSearchOutcome {
    pub stats: SearchStats,
    pub converged: bool,
    pub cancelled: bool,
}

/// Improves the evaluator's assignment in place.
pub fn improve(
    model: &CpModel,
    eval: &mut Evaluator<'_>,
    limits: &SearchLimits,
    cancel: &CancellationToken,
    rng: &mut ChaCha8Rng,
    deadline: Instant,
) -> LocalSearchOutcome {
    let mut stats = SearchStats::default();
    let max_steps = limits.max_steps.unwrap_or(200_000);
    let mut unimproved = 0u64;
    let mut cancelled = false;

    if model.slot_count() == 0 || model.var_count() == 0 {
        return LocalSearchOutcome {
            stats,
            converged: true,
            cancelled: false,
        };
    }

    while stats.steps < max_steps && unimproved < UNIMPROVED_LIMIT {
        if stats.steps % POLL_INTERVAL == 0 {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if Instant::now() >= deadline {
                break;
            }
        }
        stats.steps += 1;

        let improved = if rng.random_bool(0.7) {
            try_change_move(model, eval, rng, &mut stats)
        } else {
            try_swap_move(model, eval, rng, &mut stats)
        };
        if improved {
            stats.moves_accepted += 1;
            unimproved = 0;
        } else {
            unimproved += 1;
        }
    }

    LocalSearchOutcome {
        converged: unimproved >= UNIMPROVED_LIMIT,
        cancelled,
        stats,
    }
}

/// Re-seats one slot: tries every candidate (including leaving the current
/// one) and keeps the best strictly-improving choice.
fn try_change_move(
    model: &CpModel,
    eval: &mut Evaluator<'_>,
    rng: &mut ChaCha8Rng,
    stats: &mut SearchStats,
) -> bool {
    let slot = SlotIdx::new(rng.random_range(0..model.slot_count()));
    let baseline = eval.score();
    let incumbent = eval.chosen_for(slot);
    eval.unassign(slot);

    let mut candidates = model.slot_vars(slot).to_vec();
    candidates.shuffle(rng);

    let mut best = incumbent.map(|v| (v, baseline));
    for var in candidates {
        if Some(var) == incumbent || !eval.can_assign(var) {
            continue;
        }
        stats.moves_evaluated += 1;
        eval.assign(var);
        let score = eval.score();
        eval.unassign(slot);
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((var, score));
        }
    }

    match best {
        Some((var, score)) => {
            eval.assign(var);
            score > baseline
        }
        // Leaving the slot empty can itself be the improvement.
        None => eval.score() > baseline,
    }
}

/// Exchanges the employees of two slots when both directions stay feasible
/// and the exchange improves the score.
fn try_swap_move(
    model: &CpModel,
    eval: &mut Evaluator<'_>,
    rng: &mut ChaCha8Rng,
    stats: &mut SearchStats,
) -> bool {
    if model.slot_count() < 2 {
        return false;
    }
    let a = SlotIdx::new(rng.random_range(0..model.slot_count()));
    let b = SlotIdx::new(rng.random_range(0..model.slot_count()));
    if a == b {
        return false;
    }
    let (Some(var_a), Some(var_b)) = (eval.chosen_for(a), eval.chosen_for(b)) else {
        return false;
    };
    let emp_a = model.var(var_a).emp;
    let emp_b = model.var(var_b).emp;
    if emp_a == emp_b {
        return false;
    }

    // The cross vars must exist: employee B on slot A and vice versa.
    let cross_a = model
        .slot_vars(a)
        .iter()
        .copied()
        .find(|&v| model.var(v).emp == emp_b);
    let cross_b = model
        .slot_vars(b)
        .iter()
        .copied()
        .find(|&v| model.var(v).emp == emp_a);
    let (Some(cross_a), Some(cross_b)) = (cross_a, cross_b) else {
        return false;
    };

    stats.moves_evaluated += 1;
    let baseline = eval.score();
    eval.unassign(a);
    eval.unassign(b);

    if eval.can_assign(cross_a) {
        eval.assign(cross_a);
        if eval.can_assign(cross_b) {
            eval.assign(cross_b);
            if eval.score() > baseline {
                return true;
            }
            eval.unassign(b);
        }
        eval.unassign(a);
    }

    // Revert.
    eval.assign(var_a);
    eval.assign(var_b);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rosterforge_core::EmpIdx;
    use std::time::Duration;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, day).unwrap()
    }

    #[test]
    fn consolidates_onto_one_employee() {
        // Both slots coverable by both employees; a spread assignment should
        // collapse onto one employee to cut the used-employee penalty.
        let mut m = CpModel::new(2, 2);
        let a0 = m.add_var(SlotIdx::new(0), EmpIdx::new(0), date(1), false, None);
        m.add_var(SlotIdx::new(1), EmpIdx::new(0), date(2), false, None);
        m.add_var(SlotIdx::new(0), EmpIdx::new(1), date(1), false, None);
        let b1 = m.add_var(SlotIdx::new(1), EmpIdx::new(1), date(2), false, None);
        let mut eval = Evaluator::new(&m);
        eval.assign(a0);
        eval.assign(b1);
        assert_eq!(eval.used_employees(), 2);

        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let limits = SearchLimits {
            time_limit: Duration::from_secs(5),
            ..SearchLimits::default()
        };
        let cancel = CancellationToken::new();
        let deadline = Instant::now() + limits.time_limit;
        improve(&m, &mut eval, &limits, &cancel, &mut rng, deadline);
        assert_eq!(eval.used_employees(), 1);
        assert_eq!(eval.unmet_required(), 0);
    }

    #[test]
    fn cancellation_stops_the_loop() {
        let mut m = CpModel::new(1, 1);
        m.add_var(SlotIdx::new(0), EmpIdx::new(0), date(1), false, None);
        let mut eval = Evaluator::new(&m);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let limits = SearchLimits::default();
        let outcome = improve(
            &m,
            &mut eval,
            &limits,
            &cancel,
            &mut rng,
            Instant::now() + Duration::from_secs(5),
        );
        assert!(outcome.cancelled);
    }
}
