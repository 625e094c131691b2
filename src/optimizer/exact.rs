//! Exact-solver collaborator and the hybrid strategy built on it.
//!
//! Small instances go to an [`ExactSolver`] if one is supplied through the
//! [`RunContext`]. Whatever the solver returns is re-verified through the
//! placement rules; any failure falls back to the greedy strategy.

use std::time::Duration;

use crate::constraints::check;
use crate::error::{Result, SolverError};
use crate::model::Placement;
use crate::state::LoadState;

use super::{GreedyConfig, LoadProblem, RunContext, greedy};

/// An external solver producing a complete layout for a problem.
pub trait ExactSolver: Send + Sync {
    /// Solves `problem` within `budget`.
    ///
    /// Only `box_index`, `rotation` and `position` of the returned placements
    /// are used; everything else is recomputed from the problem.
    fn solve(&self, problem: &LoadProblem, budget: Duration) -> std::result::Result<Vec<Placement>, SolverError>;
}

/// Parameters of the hybrid strategy.
#[derive(Clone, Debug, PartialEq)]
pub struct HybridConfig {
    /// Instances with fewer boxes than this go to the exact solver
    pub threshold: usize,
    /// Time budget handed to the exact solver
    pub budget: Duration,
    /// Fallback configuration
    pub greedy: GreedyConfig,
}

impl HybridConfig {
    pub const DEFAULT_THRESHOLD: usize = 20;
    pub const DEFAULT_BUDGET: Duration = Duration::from_secs(30);
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
            budget: Self::DEFAULT_BUDGET,
            greedy: GreedyConfig::default(),
        }
    }
}

/// Rebuilds solver placements from the problem and checks each one.
///
/// Placements are replayed bottom-up so supports exist before the boxes they
/// carry.
pub fn verify(problem: &LoadProblem, placements: &[Placement]) -> std::result::Result<LoadState, SolverError> {
    let mut ordered: Vec<&Placement> = placements.iter().collect();
    ordered.sort_by(|a, b| a.position.z.total_cmp(&b.position.z));

    let mut seen = vec![false; problem.len()];
    let mut state = problem.empty_state();
    for raw in ordered {
        let object = problem.boxes().get(raw.box_index).ok_or_else(|| {
            SolverError::Failed(format!("unknown box index {}", raw.box_index))
        })?;
        if std::mem::replace(&mut seen[raw.box_index], true) {
            return Err(SolverError::Failed(format!("box '{}' placed twice", object.id)));
        }
        if !object.allowed_rotations.contains(raw.rotation) {
            return Err(SolverError::Failed(format!(
                "box '{}' uses forbidden rotation {}",
                object.id, raw.rotation
            )));
        }
        let candidate = Placement::new(raw.box_index, object, raw.rotation, raw.position);
        check(&candidate, &state, problem.rules()).map_err(|rejection| {
            SolverError::Failed(format!("box '{}' rejected: {}", object.id, rejection))
        })?;
        state.place(candidate);
    }
    Ok(state)
}

/// Exact solver for small instances, greedy otherwise or on any failure.
pub fn run_hybrid(problem: &LoadProblem, config: &HybridConfig, ctx: &RunContext<'_>) -> Result<LoadState> {
    ctx.checkpoint()?;
    if problem.len() < config.threshold {
        if let Some(solver) = ctx.solver() {
            ctx.report(&format!(
                "hybrid: {} boxes below threshold {}, calling exact solver",
                problem.len(),
                config.threshold
            ));
            match solver
                .solve(problem, config.budget)
                .and_then(|placements| verify(problem, &placements))
            {
                Ok(state) => {
                    ctx.checkpoint()?;
                    ctx.report(&format!(
                        "hybrid: exact solution accepted, fill rate {:.2}%",
                        state.fill_rate()
                    ));
                    return Ok(state);
                }
                Err(err) => {
                    log::warn!("{err}, falling back to greedy");
                    ctx.report(&format!("hybrid: {err}, falling back to greedy"));
                }
            }
        }
    }
    greedy::run(problem, &config.greedy, ctx)
}
