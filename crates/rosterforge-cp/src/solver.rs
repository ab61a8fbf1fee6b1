//! The bundled search backend.
//!
//! Parallel multi-start: each worker seeds its own RNG, runs greedy
//! construction and then local-search improvement, and the best worker
//! solution wins. Deterministic for a fixed seed and worker count.

use std::time::Instant;

use rayon::prelude::*;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::backend::{CpBackend, CpOutcome, CpStatus, SearchLimits, SearchStats};
use crate::cancellation::CancellationToken;
use crate::construction::construct;
use crate::evaluator::Evaluator;
use crate::local_search::improve;
use crate::model::CpModel;

/// Default backend: greedy construction + hill-climbing local search with
/// parallel multi-start.
#[derive(Debug, Clone, Default)]
pub struct BundledSolver;

impl BundledSolver {
    pub fn new() -> Self {
        BundledSolver
    }

    fn run_worker(
        model: &CpModel,
        limits: &SearchLimits,
        cancel: &CancellationToken,
        worker: usize,
        deadline: Instant,
    ) -> WorkerResult {
        let mut rng = ChaCha8Rng::seed_from_u64(limits.seed.wrapping_add(worker as u64));
        let mut eval = Evaluator::new(model);
        construct(model, &mut eval, &mut rng);
        let outcome = improve(model, &mut eval, limits, cancel, &mut rng, deadline);
        WorkerResult {
            score: eval.score(),
            chosen: eval.chosen().to_vec(),
            offsets: eval.decoded_offsets(),
            unmet: eval.unmet_required(),
            assigned: eval.assigned_total(),
            stats: outcome.stats,
            converged: outcome.converged,
            cancelled: outcome.cancelled,
        }
    }
}

struct WorkerResult {
    score: rosterforge_core::RosterScore,
    chosen: Vec<Option<crate::model::VarId>>,
    offsets: Vec<(rosterforge_core::EmpIdx, u32, u32)>,
    unmet: u32,
    assigned: u32,
    stats: SearchStats,
    converged: bool,
    cancelled: bool,
}

impl CpBackend for BundledSolver {
    fn solve(
        &self,
        model: &CpModel,
        limits: &SearchLimits,
        cancel: &CancellationToken,
    ) -> CpOutcome {
        let started = Instant::now();
        let deadline = started + limits.time_limit;

        if model.var_count() == 0 {
            let any_required =
                (0..model.slot_count()).any(|s| model.is_slot_required(rosterforge_core::SlotIdx::new(s)));
            let status = if any_required {
                CpStatus::Infeasible
            } else {
                CpStatus::Optimal
            };
            return CpOutcome::empty(model, status);
        }
        if cancel.is_cancelled() {
            return CpOutcome::empty(model, CpStatus::Unknown);
        }

        let workers = limits.workers.max(1);
        tracing::debug!(workers, vars = model.var_count(), "starting bundled search");

        let results: Vec<WorkerResult> = if workers == 1 {
            vec![Self::run_worker(model, limits, cancel, 0, deadline)]
        } else {
            (0..workers)
                .into_par_iter()
                .map(|w| Self::run_worker(model, limits, cancel, w, deadline))
                .collect()
        };

        // Best score wins; worker order breaks ties deterministically.
        let best = results
            .into_iter()
            .reduce(|a, b| if b.score > a.score { b } else { a })
            .expect("at least one worker ran");

        let cancelled = best.cancelled || cancel.is_cancelled();
        let timed_out = Instant::now() >= deadline;
        let status = if best.assigned == 0 && best.unmet > 0 {
            CpStatus::Infeasible
        } else if cancelled {
            CpStatus::Unknown
        } else if best.converged {
            CpStatus::Optimal
        } else if timed_out {
            CpStatus::Feasible
        } else {
            CpStatus::Feasible
        };

        let mut stats = best.stats;
        stats.duration = started.elapsed();
        stats.workers = workers;

        tracing::debug!(
            ?status,
            score = %best.score,
            unmet = best.unmet,
            "bundled search finished"
        );

        CpOutcome {
            status,
            chosen: best.chosen,
            offsets: best.offsets,
            score: best.score,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClauseLabel;
    use chrono::NaiveDate;
    use rosterforge_core::{EmpIdx, SlotIdx};
    use std::time::Duration;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, day).unwrap()
    }

    fn limits() -> SearchLimits {
        SearchLimits {
            time_limit: Duration::from_secs(5),
            workers: 2,
            seed: 0,
            max_steps: Some(20_000),
        }
    }

    #[test]
    fn solves_a_coverable_model_to_optimal() {
        let mut m = CpModel::new(4, 2);
        for slot in 0..4 {
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
        let outcome = BundledSolver::new().solve(&m, &limits(), &CancellationToken::new());
        assert_eq!(outcome.status, CpStatus::Optimal);
        assert!(outcome.chosen.iter().all(|c| c.is_some()));
    }

    #[test]
    fn empty_model_with_required_slots_is_infeasible() {
        let m = CpModel::new(3, 0);
        let outcome = BundledSolver::new().solve(&m, &limits(), &CancellationToken::new());
        assert_eq!(outcome.status, CpStatus::Infeasible);
        assert!(outcome.chosen.iter().all(|c| c.is_none()));
    }

    #[test]
    fn fully_blocked_model_is_infeasible() {
        // One employee, two slots on one date, pairwise conflict and a linear
        // cap of zero: nothing can ever be assigned.
        let mut m = CpModel::new(1, 1);
        let v = m.add_var(SlotIdx::new(0), EmpIdx::new(0), date(1), false, None);
        m.add_linear_le(vec![(v, 1)], 0, ClauseLabel::DailyHours);
        let outcome = BundledSolver::new().solve(&m, &limits(), &CancellationToken::new());
        assert_eq!(outcome.status, CpStatus::Infeasible);
    }

    #[test]
    fn deterministic_for_fixed_seed() {
        let mut m = CpModel::new(3, 3);
        for slot in 0..3 {
            for emp in 0..3 {
                m.add_var(
                    SlotIdx::new(slot),
                    EmpIdx::new(emp),
                    date(slot as u32 + 1),
                    false,
                    None,
                );
            }
        }
        let solver = BundledSolver::new();
        let l = SearchLimits {
            workers: 1,
            ..limits()
        };
        let a = solver.solve(&m, &l, &CancellationToken::new());
        let b = solver.solve(&m, &l, &CancellationToken::new());
        assert_eq!(a.chosen, b.chosen);
        assert_eq!(a.score, b.score);
    }

    #[test]
    fn pre_cancelled_solve_returns_unknown() {
        let mut m = CpModel::new(1, 1);
        m.add_var(SlotIdx::new(0), EmpIdx::new(0), date(1), false, None);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = BundledSolver::new().solve(&m, &limits(), &cancel);
        assert_eq!(outcome.status, CpStatus::Unknown);
    }
}
