//! Solver driver: orchestrates one solve end to end.
//!
//! Pipeline: resource gate, pattern probes, incremental projection, ICPMP,
//! ratio decision (fixed, cached, or autotune sweep), then one CP solve per
//! candidate ratio. Outcomes are classified, hours credited, and the result
//! assembled. The cancellation token is polled at the start of each ratio
//! candidate, after each backend call, and before result assembly.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rosterforge_cache::RatioCache;
use rosterforge_core::domain::{OffsetMode, OptimizationMode, Problem, RosteringBasis};
use rosterforge_core::pattern::{infeasibility_error, validate_pattern};
use rosterforge_core::{EngineError, Result};
use rosterforge_cp::{
    BundledSolver, CancellationToken, CpBackend, CpOutcome, CpStatus, SearchLimits,
};

use crate::constraints::{assemble, ActiveSet, BuildContext};
use crate::gate::{self, ServerCapacity};
use crate::icpmp::{preprocess_with, PreprocessOutcome};
use crate::incremental::{project, solve_window, Projection};
use crate::result::{
    build, RatioCandidateDoc, RatioSearchDoc, ResultInputs, RosterResult, SolveStatus,
};
use crate::slots::{build_slots, ReqTable, SlotTable};

/// Options for one solve call. The ratio cache is opt-in via `cache_path`;
/// capacity and backend default to host detection and the bundled solver.
#[derive(Clone)]
pub struct SolverOptions {
    pub cache_path: Option<PathBuf>,
    pub capacity: Option<ServerCapacity>,
    pub backend: Option<Arc<dyn CpBackend>>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            cache_path: None,
            capacity: None,
            backend: None,
        }
    }
}

impl std::fmt::Debug for SolverOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolverOptions")
            .field("cache_path", &self.cache_path)
            .field("capacity", &self.capacity)
            .field("custom_backend", &self.backend.is_some())
            .finish()
    }
}

/// Solves a rostering problem.
pub fn solve(
    problem: &Problem,
    options: &SolverOptions,
    cancel: &CancellationToken,
) -> Result<RosterResult> {
    let started = Instant::now();
    let capacity = options.capacity.unwrap_or_else(ServerCapacity::detect);

    // 1. Resource gate, before anything is allocated.
    gate::check(problem, &capacity)?;

    // 2. Pattern feasibility probes; infeasible patterns short-circuit.
    probe_patterns(problem)?;

    // 3. Incremental projection.
    let (projection, window) = match &problem.incremental {
        Some(block) => (Some(project(problem, block)), solve_window(block)),
        None => (None, problem.horizon),
    };
    let excluded: BTreeSet<String> = projection
        .as_ref()
        .map(|p| p.excluded_employees.clone())
        .unwrap_or_default();

    // 4. Preprocessing, with outcome-based fallback when the pool is short.
    let mut reqs = ReqTable::from_problem(problem);
    let mut plans = preprocess_with(problem, &reqs, &excluded)?;
    let mut fallback_triggered = false;
    let mut original_basis = None;
    let any_demand_based = reqs.iter().any(|(_, e)| e.basis == RosteringBasis::DemandBased);
    if plans.insufficient_any && any_demand_based {
        if problem.solver.fallback_to_outcome_based {
            tracing::info!("icpmp pool insufficient; falling back to outcome-based templates");
            original_basis = Some(RosteringBasis::DemandBased);
            reqs = reqs.with_outcome_based_fallback();
            plans = preprocess_with(problem, &reqs, &excluded)?;
            fallback_triggered = true;
        } else {
            tracing::warn!("icpmp pool insufficient and fallback disabled; expect INFEASIBLE");
        }
    }

    warn_on_risky_mode(problem, &reqs);

    // 5. Slot building, skipping slots covered by locked assignments.
    let skip = |date, req_id: &str, shift: &str| {
        projection
            .as_ref()
            .map(|p| p.is_locked_key(date, req_id, shift))
            .unwrap_or(false)
    };
    let slots = build_slots(problem, &reqs, &window, &skip)?;

    let active = ActiveSet::from_problem(problem)?;
    let backend: Arc<dyn CpBackend> = options
        .backend
        .clone()
        .unwrap_or_else(|| Arc::new(BundledSolver::new()));

    // 6. Ratio decision: fixed, cache hit, or autotune sweep.
    let cache = options.cache_path.as_ref().map(RatioCache::open);
    let pattern_hash = pattern_hash_for(&reqs);
    let mut ratio_search = RatioSearchDoc {
        pattern_hash: Some(pattern_hash.clone()),
        ..RatioSearchDoc::default()
    };
    let candidates = ratio_candidates(problem, cache.as_ref(), &pattern_hash, &mut ratio_search);

    // 7. One CP solve per candidate.
    let mut best: Option<(Option<f64>, rosterforge_cp::CpModel, CpOutcome, u32)> = None;
    let per_candidate_limit = candidate_time_limit(problem, &capacity, candidates.len());
    for &ratio in &candidates {
        if cancel.is_cancelled() {
            return cancelled_result(problem, &reqs, &slots, &plans, projection.as_ref(), window, ratio_search, fallback_triggered, original_basis, started);
        }
        let ctx = BuildContext {
            problem,
            reqs: &reqs,
            slots: &slots,
            plans: &plans,
            projection: projection.as_ref(),
            window,
            active: &active,
            strict_ratio: ratio,
        };
        let model = assemble(&ctx)?;
        let limits = SearchLimits {
            time_limit: per_candidate_limit,
            workers: adapt_workers(model.var_count(), &capacity, problem),
            seed: problem.solver.random_seed,
            max_steps: None,
        };
        let outcome = backend.solve(&model, &limits, cancel);
        let employees_used = used_employees(&model, &outcome);
        tracing::info!(
            ratio = ?ratio,
            status = ?outcome.status,
            employees_used,
            "ratio candidate solved"
        );
        if let Some(r) = ratio {
            ratio_search.candidates.push(RatioCandidateDoc {
                ratio: r,
                employees_used,
                status: classify(outcome.status, &outcome),
            });
        }
        let replace = match &best {
            None => true,
            Some((best_ratio, _, best_outcome, best_used)) => {
                better_candidate(ratio, &outcome, employees_used, *best_ratio, best_outcome, *best_used)
            }
        };
        if replace {
            best = Some((ratio, model, outcome, employees_used));
        }
    }

    let (selected_ratio, model, outcome, employees_used) = best.ok_or_else(|| {
        EngineError::Internal("ratio sweep produced no candidates".to_string())
    })?;
    ratio_search.selected_strict_ratio = selected_ratio;

    // Autotune learnings persist for the next structurally equal problem.
    if let (Some(cache), Some(ratio)) = (&cache, selected_ratio) {
        if !ratio_search.cache_hit
            && problem.solver.auto_optimize_strict_ratio
            && outcome.status == CpStatus::Optimal
        {
            if let Err(e) = cache.record(
                &pattern_hash,
                ratio,
                employees_used,
                serde_json::json!({"horizonDays": window.len_days()}),
            ) {
                tracing::warn!(error = %e, "failed to persist ratio cache entry");
            }
        }
    }

    if cancel.is_cancelled() {
        return cancelled_result(problem, &reqs, &slots, &plans, projection.as_ref(), window, ratio_search, fallback_triggered, original_basis, started);
    }

    // 8. Classification, hour accounting and result assembly.
    let status = classify(outcome.status, &outcome);
    let effective_basis = effective_basis(&reqs);
    let inputs = ResultInputs {
        problem,
        reqs: &reqs,
        slots: &slots,
        model: &model,
        outcome: &outcome,
        plans: &plans,
        projection: projection.as_ref(),
        window,
        status,
        ratio_search,
        fallback_triggered,
        original_basis,
        effective_basis,
        solve_time: started.elapsed(),
        seed: problem.solver.random_seed,
    };
    Ok(build(&inputs))
}

fn probe_patterns(problem: &Problem) -> Result<()> {
    let probe_started = Instant::now();
    for (_, req) in problem.requirements() {
        let net = problem.shift_net_hours(req);
        // An unrestricted scheme filter is probed against the schemes
        // actually present in the pool, not the whole enumeration.
        let schemes: Vec<_> = match &req.schemes {
            rosterforge_core::domain::SchemeFilter::Set(set) => set.clone(),
            rosterforge_core::domain::SchemeFilter::Any => {
                let mut present: Vec<_> =
                    problem.employees.iter().map(|e| e.scheme).collect();
                present.sort();
                present.dedup();
                if present.is_empty() {
                    vec![rosterforge_core::Scheme::A]
                } else {
                    present
                }
            }
        };
        for scheme in schemes {
            let validation =
                validate_pattern(&req.work_pattern, scheme, Some(net), req.enable_apgd_d10);
            if !validation.feasible {
                tracing::debug!(
                    requirement = %req.id,
                    elapsed_us = probe_started.elapsed().as_micros() as u64,
                    "pattern probe rejected requirement"
                );
                return Err(infeasibility_error(&req.work_pattern, &validation));
            }
        }
    }
    Ok(())
}

/// `minimize_employee_count` clusters offsets under strict rotation modes
/// and can render the model infeasible; the combination is flagged.
fn warn_on_risky_mode(problem: &Problem, reqs: &ReqTable) {
    if problem.solver.optimization_mode != OptimizationMode::MinimizeEmployeeCount {
        return;
    }
    let strict_fixed = reqs.iter().any(|(_, e)| {
        e.offset_mode != OffsetMode::SolverOptimized
            && e.req.strict_ratio.is_none()
            && problem.solver.strict_ratio.is_none()
    });
    if strict_fixed {
        tracing::warn!(
            "minimize_employee_count with strict fixed rotation offsets can produce INFEASIBLE results; consider balance_workload or a strict adherence ratio"
        );
    }
}

/// Ratio candidates for the sweep. `None` means "no adherence budget".
fn ratio_candidates(
    problem: &Problem,
    cache: Option<&RatioCache>,
    pattern_hash: &str,
    trace: &mut RatioSearchDoc,
) -> Vec<Option<f64>> {
    let solver = &problem.solver;
    if let Some(fixed) = solver.strict_ratio.or_else(|| first_req_ratio(problem)) {
        return vec![Some(fixed)];
    }
    if !solver.auto_optimize_strict_ratio {
        return vec![None];
    }
    if let Some(cache) = cache {
        match cache.lookup(pattern_hash) {
            Ok(Some(entry)) => {
                tracing::info!(
                    pattern_hash,
                    ratio = entry.optimal_ratio,
                    "ratio cache hit; skipping autotune sweep"
                );
                trace.cache_hit = true;
                if let Err(e) = cache.touch(pattern_hash) {
                    tracing::warn!(error = %e, "failed to bump ratio cache usage");
                }
                return vec![Some(entry.optimal_ratio)];
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "ratio cache lookup failed"),
        }
    }
    solver
        .ratio_range
        .candidates()
        .into_iter()
        .map(Some)
        .collect()
}

fn first_req_ratio(problem: &Problem) -> Option<f64> {
    problem.requirements().find_map(|(_, r)| r.strict_ratio)
}

/// Pattern hash over the first requirement's pattern and the aggregate
/// shift-headcount composition.
fn pattern_hash_for(reqs: &ReqTable) -> String {
    let mut composition: Vec<(String, u32)> = Vec::new();
    let mut pattern_joined = String::new();
    let mut cycle_length = 0usize;
    for (i, (_, entry)) in reqs.iter().enumerate() {
        if i == 0 {
            pattern_joined = entry.req.work_pattern.joined();
            cycle_length = entry.req.work_pattern.cycle_length();
        }
        for code in &entry.req.shift_codes {
            match composition.iter_mut().find(|(c, _)| c == code) {
                Some((_, count)) => *count += entry.req.headcount_or_default(),
                None => composition.push((code.clone(), entry.req.headcount_or_default())),
            }
        }
    }
    rosterforge_cache::pattern_hash(&pattern_joined, cycle_length, &composition)
}

/// Worker count adapts to model size: 1 below 5k variables, scaling to 16 at
/// 150k and above, clamped to the host's CPUs.
fn adapt_workers(vars: usize, capacity: &ServerCapacity, problem: &Problem) -> usize {
    if let Some(w) = problem.solver.workers {
        return w.max(1);
    }
    let scaled = if vars < 5_000 {
        1
    } else if vars >= 150_000 {
        16
    } else {
        // Linear ramp between the two anchors.
        1 + (vars - 5_000) * 15 / 145_000
    };
    scaled.min(capacity.logical_cpus.max(1))
}

/// Per-candidate wall-clock budget; small servers get a reduced limit.
fn candidate_time_limit(
    problem: &Problem,
    capacity: &ServerCapacity,
    candidates: usize,
) -> Duration {
    let mut limit = problem.solver.time_limit;
    if capacity.tier() == rosterforge_core::CapacityTier::Small {
        limit /= 2;
    }
    if candidates > 1 {
        limit = Duration::from_millis((limit.as_millis() as u64 / candidates as u64).max(500));
    }
    limit
}

fn used_employees(model: &rosterforge_cp::CpModel, outcome: &CpOutcome) -> u32 {
    let mut used = BTreeSet::new();
    for chosen in outcome.chosen.iter().flatten() {
        used.insert(model.var(*chosen).emp);
    }
    used.len() as u32
}

/// Keeps all OPTIMAL solutions, preferring fewer employees; ties break to
/// the lower ratio (more flexibility).
fn better_candidate(
    ratio: Option<f64>,
    outcome: &CpOutcome,
    used: u32,
    best_ratio: Option<f64>,
    best_outcome: &CpOutcome,
    best_used: u32,
) -> bool {
    let optimal = outcome.status == CpStatus::Optimal;
    let best_optimal = best_outcome.status == CpStatus::Optimal;
    if optimal != best_optimal {
        return optimal;
    }
    if optimal {
        if used != best_used {
            return used < best_used;
        }
        return match (ratio, best_ratio) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        };
    }
    outcome.score > best_outcome.score
}

fn classify(cp: CpStatus, outcome: &CpOutcome) -> SolveStatus {
    match cp {
        // OPTIMAL downgrades to FEASIBLE when demand is unmet.
        CpStatus::Optimal => {
            if outcome.chosen.iter().any(|c| c.is_none()) {
                SolveStatus::Feasible
            } else {
                SolveStatus::Optimal
            }
        }
        CpStatus::Feasible => SolveStatus::Feasible,
        CpStatus::Infeasible => SolveStatus::Infeasible,
        CpStatus::Unknown => SolveStatus::Unknown,
    }
}

fn effective_basis(reqs: &ReqTable) -> RosteringBasis {
    if reqs.iter().all(|(_, e)| e.basis == RosteringBasis::OutcomeBased) && !reqs.is_empty() {
        RosteringBasis::OutcomeBased
    } else {
        RosteringBasis::DemandBased
    }
}

#[allow(clippy::too_many_arguments)]
fn cancelled_result(
    problem: &Problem,
    reqs: &ReqTable,
    slots: &SlotTable,
    plans: &PreprocessOutcome,
    projection: Option<&Projection>,
    window: rosterforge_core::DateRange,
    ratio_search: RatioSearchDoc,
    fallback_triggered: bool,
    original_basis: Option<RosteringBasis>,
    started: Instant,
) -> Result<RosterResult> {
    // Partial intermediate results are discarded on cancellation.
    let empty_model = rosterforge_cp::CpModel::new(slots.len(), problem.employees.len());
    let outcome = CpOutcome::empty(&empty_model, CpStatus::Unknown);
    let inputs = ResultInputs {
        problem,
        reqs,
        slots,
        model: &empty_model,
        outcome: &outcome,
        plans,
        projection,
        window,
        status: SolveStatus::Cancelled,
        ratio_search,
        fallback_triggered,
        original_basis,
        effective_basis: effective_basis(reqs),
        solve_time: started.elapsed(),
        seed: problem.solver.random_seed,
    };
    Ok(build(&inputs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_scaling_anchors() {
        let capacity = ServerCapacity {
            total_memory_bytes: 32 * 1024 * 1024 * 1024,
            logical_cpus: 32,
        };
        let doc = serde_json::json!({
            "schemaVersion": "2.1",
            "planningHorizon": {"startDate": "2025-12-01", "endDate": "2025-12-01"},
            "shifts": [], "employees": [], "demandItems": []
        });
        let problem = Problem::from_json(&doc.to_string()).unwrap();
        assert_eq!(adapt_workers(1_000, &capacity, &problem), 1);
        assert_eq!(adapt_workers(150_000, &capacity, &problem), 16);
        assert_eq!(adapt_workers(500_000, &capacity, &problem), 16);
        let middle = adapt_workers(77_500, &capacity, &problem);
        assert!(middle > 1 && middle < 16);
    }

    #[test]
    fn workers_clamped_by_cpus() {
        let capacity = ServerCapacity {
            total_memory_bytes: 32 * 1024 * 1024 * 1024,
            logical_cpus: 4,
        };
        let doc = serde_json::json!({
            "schemaVersion": "2.1",
            "planningHorizon": {"startDate": "2025-12-01", "endDate": "2025-12-01"},
            "shifts": [], "employees": [], "demandItems": []
        });
        let problem = Problem::from_json(&doc.to_string()).unwrap();
        assert_eq!(adapt_workers(200_000, &capacity, &problem), 4);
    }

    #[test]
    fn small_tier_halves_the_time_limit() {
        let doc = serde_json::json!({
            "schemaVersion": "2.1",
            "planningHorizon": {"startDate": "2025-12-01", "endDate": "2025-12-01"},
            "shifts": [], "employees": [], "demandItems": [],
            "solverConfig": {"timeLimitSeconds": 30}
        });
        let problem = Problem::from_json(&doc.to_string()).unwrap();
        let small = ServerCapacity {
            total_memory_bytes: 2 * 1024 * 1024 * 1024,
            logical_cpus: 2,
        };
        assert_eq!(
            candidate_time_limit(&problem, &small, 1),
            Duration::from_secs(15)
        );
        let large = ServerCapacity {
            total_memory_bytes: 32 * 1024 * 1024 * 1024,
            logical_cpus: 16,
        };
        assert_eq!(
            candidate_time_limit(&problem, &large, 1),
            Duration::from_secs(30)
        );
        // The sweep divides the budget across candidates.
        assert_eq!(
            candidate_time_limit(&problem, &large, 3),
            Duration::from_secs(10)
        );
    }
}
