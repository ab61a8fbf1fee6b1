//! Greedy construction phase.
//!
//! Builds an initial assignment slot by slot: most constrained slots first
//! within each date, each slot taking the candidate that improves the score
//! the most. Candidate order is shuffled per worker seed so parallel
//! multi-start workers explore different basins.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use rosterforge_core::SlotIdx;

use crate::evaluator::Evaluator;
use crate::model::CpModel;

/// Runs one construction pass over every empty slot.
///
/// Returns the number of slots that received an assignment.
pub fn construct(model: &CpModel, eval: &mut Evaluator<'_>, rng: &mut ChaCha8Rng) -> usize {
    let mut order: Vec<SlotIdx> = (0..model.slot_count()).map(SlotIdx::new).collect();
    // Fewest candidates first; slot index keeps the order deterministic.
    order.sort_by_key(|&s| (model.slot_vars(s).len(), s.index()));

    let mut assigned = 0;
    for slot in order {
        if eval.chosen_for(slot).is_some() {
            continue;
        }
        let mut candidates = model.slot_vars(slot).to_vec();
        candidates.shuffle(rng);

        let mut best = None;
        for var in candidates {
            if !eval.can_assign(var) {
                continue;
            }
            eval.assign(var);
            let score = eval.score();
            eval.unassign(slot);
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((var, score));
            }
        }
        if let Some((var, _)) = best {
            eval.assign(var);
            assigned += 1;
        }
    }
    assigned
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rosterforge_core::EmpIdx;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, day).unwrap()
    }

    #[test]
    fn fills_every_coverable_slot() {
        let mut m = CpModel::new(3, 2);
        for slot in 0..3 {
            for emp in 0..2 {
                m.add_var(
                    SlotIdx::new(slot),
                    EmpIdx::new(emp),
                    date(slot as u32 + 1),
                    false,
                    None,
                );
            }
        }
        let mut eval = Evaluator::new(&m);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let assigned = construct(&m, &mut eval, &mut rng);
        assert_eq!(assigned, 3);
        assert_eq!(eval.unmet_required(), 0);
    }

    #[test]
    fn prefers_fewer_employees() {
        // Two slots on different dates; employee 0 can take both, employee 1
        // only the second. Minimizing used employees should give both to 0.
        let mut m = CpModel::new(2, 2);
        m.add_var(SlotIdx::new(0), EmpIdx::new(0), date(1), false, None);
        m.add_var(SlotIdx::new(1), EmpIdx::new(0), date(2), false, None);
        m.add_var(SlotIdx::new(1), EmpIdx::new(1), date(2), false, None);
        let mut eval = Evaluator::new(&m);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        construct(&m, &mut eval, &mut rng);
        assert_eq!(eval.used_employees(), 1);
        assert_eq!(eval.unmet_required(), 0);
    }

    #[test]
    fn respects_conflicts() {
        let mut m = CpModel::new(2, 1);
        let a = m.add_var(SlotIdx::new(0), EmpIdx::new(0), date(1), false, None);
        let b = m.add_var(SlotIdx::new(1), EmpIdx::new(0), date(2), false, None);
        m.add_conflict(a, b);
        let mut eval = Evaluator::new(&m);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let assigned = construct(&m, &mut eval, &mut rng);
        assert_eq!(assigned, 1);
        assert_eq!(eval.unmet_required(), 1);
    }
}
