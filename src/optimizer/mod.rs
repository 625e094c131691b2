//! Placement strategies and the run orchestration around them.
//!
//! A run goes through three steps:
//! 1. build a validated [`LoadProblem`] (all input checks happen here)
//! 2. pick a [`Strategy`] and call [`solve`] or [`pack`] with a [`RunContext`]
//! 3. turn the final state into a [`LoadResult`](crate::result::LoadResult)
//!
//! Strategies:
//! - [`blf`]: deterministic bottom-left-fill
//! - [`greedy`]: randomized multi-restart, multi-pass heuristic with compaction
//! - [`genetic`]: permutation + rotation genetic algorithm decoded with BLF
//! - [`exact`]: hybrid routing to an external exact solver with greedy fallback

pub mod blf;
pub mod exact;
pub mod genetic;
pub mod greedy;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::constraints::PlacementRules;
use crate::error::{PackingError, Result};
use crate::geometry::fitting_rotations;
use crate::model::{Box3D, ConstraintFlags, Container, Group, Rotation};
use crate::result::LoadResult;
use crate::state::LoadState;
use crate::types::Vec3;

pub use exact::{ExactSolver, HybridConfig};
pub use genetic::GaConfig;
pub use greedy::GreedyConfig;

/// Tolerances for the placement rules.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PackingConfig {
    /// Minimum supported fraction of the base above floor level (0.0 to 1.0)
    pub support_ratio: f64,
    /// Maximum gap between a top face and a base that still counts as contact
    pub height_epsilon: f64,
    /// General numerical tolerance
    pub general_epsilon: f64,
}

impl PackingConfig {
    pub const DEFAULT_SUPPORT_RATIO: f64 = 0.70;
    pub const DEFAULT_HEIGHT_EPSILON: f64 = crate::types::EPSILON_HEIGHT;
    pub const DEFAULT_GENERAL_EPSILON: f64 = crate::types::EPSILON_GENERAL;

    /// Creates a builder for a custom configuration.
    pub fn builder() -> PackingConfigBuilder {
        PackingConfigBuilder::default()
    }
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            support_ratio: Self::DEFAULT_SUPPORT_RATIO,
            height_epsilon: Self::DEFAULT_HEIGHT_EPSILON,
            general_epsilon: Self::DEFAULT_GENERAL_EPSILON,
        }
    }
}

/// Builder for [`PackingConfig`].
#[derive(Clone, Debug, Default)]
pub struct PackingConfigBuilder {
    config: PackingConfig,
}

impl PackingConfigBuilder {
    /// Sets the minimum support ratio.
    pub fn support_ratio(mut self, ratio: f64) -> Self {
        self.config.support_ratio = ratio;
        self
    }

    /// Sets the height tolerance.
    pub fn height_epsilon(mut self, epsilon: f64) -> Self {
        self.config.height_epsilon = epsilon;
        self
    }

    /// Sets the general tolerance.
    pub fn general_epsilon(mut self, epsilon: f64) -> Self {
        self.config.general_epsilon = epsilon;
        self
    }

    /// Builds the final configuration.
    pub fn build(self) -> PackingConfig {
        self.config
    }
}

/// Validated, immutable configuration of one run.
///
/// Constructed once and passed by reference to every component.
#[derive(Clone, Debug)]
pub struct LoadProblem {
    container: Container,
    boxes: Vec<Box3D>,
    flags: ConstraintFlags,
    config: PackingConfig,
    rules: PlacementRules,
    fitting: Vec<Vec<(Rotation, Vec3)>>,
}

impl LoadProblem {
    /// Validates the input with the default tolerances.
    pub fn new(container: Container, boxes: Vec<Box3D>, flags: ConstraintFlags) -> Result<Self> {
        Self::with_config(container, boxes, flags, PackingConfig::default())
    }

    /// Validates the input.
    ///
    /// Rejects invalid containers and boxes, duplicate box ids and constraint
    /// fields whose flag is disabled.
    pub fn with_config(
        container: Container,
        boxes: Vec<Box3D>,
        flags: ConstraintFlags,
        config: PackingConfig,
    ) -> Result<Self> {
        container.validate()?;
        if !(0.0..=1.0).contains(&config.support_ratio) {
            return Err(PackingError::InvalidInput(format!(
                "support ratio must be between 0 and 1, got: {}",
                config.support_ratio
            )));
        }

        let mut seen = HashSet::with_capacity(boxes.len());
        for object in &boxes {
            object.validate()?;
            object.check_flags(&flags)?;
            if !seen.insert(object.id.as_str()) {
                return Err(PackingError::InvalidInput(format!(
                    "duplicate box id '{}'",
                    object.id
                )));
            }
        }

        let fitting = boxes
            .iter()
            .map(|object| fitting_rotations(object, &container))
            .collect();

        Ok(Self {
            container,
            boxes,
            flags,
            config,
            rules: PlacementRules::new(flags, &config),
            fitting,
        })
    }

    #[inline]
    pub fn container(&self) -> &Container {
        &self.container
    }

    #[inline]
    pub fn boxes(&self) -> &[Box3D] {
        &self.boxes
    }

    #[inline]
    pub fn flags(&self) -> &ConstraintFlags {
        &self.flags
    }

    #[inline]
    pub fn config(&self) -> &PackingConfig {
        &self.config
    }

    #[inline]
    pub fn rules(&self) -> &PlacementRules {
        &self.rules
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Allowed orientations of box `index` that fit inside the empty container.
    #[inline]
    pub fn fitting_rotations(&self, index: usize) -> &[(Rotation, Vec3)] {
        self.fitting.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Fresh, empty state for this problem's container.
    pub fn empty_state(&self) -> LoadState {
        LoadState::new(self.container)
    }

    /// Explains why box `index` ended up unplaced.
    pub fn unplaced_reason(&self, index: usize) -> UnplacedReason {
        let Some(object) = self.boxes.get(index) else {
            return UnplacedReason::NoFeasiblePosition;
        };
        if self.flags.enforce_load_capacity
            && object.weight > self.container.max_weight + self.config.general_epsilon
        {
            return UnplacedReason::TooHeavyForContainer;
        }
        if self.fitting_rotations(index).is_empty() {
            return UnplacedReason::DimensionsExceedContainer;
        }
        UnplacedReason::NoFeasiblePosition
    }
}

/// Reasons why a box could not be placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnplacedReason {
    TooHeavyForContainer,
    DimensionsExceedContainer,
    NoFeasiblePosition,
}

impl UnplacedReason {
    pub fn code(&self) -> &'static str {
        match self {
            UnplacedReason::TooHeavyForContainer => "too_heavy_for_container",
            UnplacedReason::DimensionsExceedContainer => "dimensions_exceed_container",
            UnplacedReason::NoFeasiblePosition => "no_feasible_position",
        }
    }
}

impl fmt::Display for UnplacedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnplacedReason::TooHeavyForContainer => {
                write!(f, "Box exceeds the container's weight limit")
            }
            UnplacedReason::DimensionsExceedContainer => {
                write!(f, "Box does not fit the container in any allowed rotation")
            }
            UnplacedReason::NoFeasiblePosition => {
                write!(f, "No feasible position found inside the container")
            }
        }
    }
}

/// Cooperative cancellation flag shared between a caller and a run.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Receiver of coarse-grained progress lines.
pub trait ProgressSink: Sync {
    fn emit(&self, line: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(&str) + Sync,
{
    fn emit(&self, line: &str) {
        self(line)
    }
}

/// Collaborators threaded into every strategy: cancellation, progress, and an
/// optional exact solver.
#[derive(Clone, Default)]
pub struct RunContext<'a> {
    cancel: CancellationToken,
    progress: Option<&'a dyn ProgressSink>,
    solver: Option<&'a dyn ExactSolver>,
}

impl<'a> RunContext<'a> {
    /// Context without progress, solver or external cancellation.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, sink: &'a dyn ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn with_solver(mut self, solver: &'a dyn ExactSolver) -> Self {
        self.solver = Some(solver);
        self
    }

    pub fn solver(&self) -> Option<&'a dyn ExactSolver> {
        self.solver
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fails with [`PackingError::Cancelled`] once the token is set.
    #[inline]
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(PackingError::Cancelled);
        }
        Ok(())
    }

    /// Forwards a progress line to the sink, if any.
    pub fn report(&self, line: &str) {
        if let Some(sink) = self.progress {
            sink.emit(line);
        }
    }
}

impl fmt::Debug for RunContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("cancelled", &self.is_cancelled())
            .field("progress", &self.progress.is_some())
            .field("solver", &self.solver.is_some())
            .finish()
    }
}

/// Selectable algorithm names as accepted by callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    Blf,
    Greedy,
    Genetic,
    Hybrid,
}

impl Algorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Blf => "BLF",
            Algorithm::Greedy => "GREEDY",
            Algorithm::Genetic => "GA",
            Algorithm::Hybrid => "HYBRID",
        }
    }
}

impl FromStr for Algorithm {
    type Err = PackingError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BLF" | "PYTHON_BLF" => Ok(Algorithm::Blf),
            "GREEDY" | "CLPTAC" | "PYTHON_CLPTAC" => Ok(Algorithm::Greedy),
            "GA" | "GENETIC" | "PYTHON_GA" => Ok(Algorithm::Genetic),
            "HYBRID" => Ok(Algorithm::Hybrid),
            other => Err(PackingError::InvalidInput(format!(
                "unknown algorithm '{other}', expected one of BLF, GREEDY, GA, HYBRID"
            ))),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A placement strategy together with its parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum Strategy {
    Blf,
    Greedy(GreedyConfig),
    Genetic(GaConfig),
    Hybrid(HybridConfig),
}

impl Strategy {
    /// Strategy for `algorithm` with default parameters.
    pub fn with_defaults(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Blf => Strategy::Blf,
            Algorithm::Greedy => Strategy::Greedy(GreedyConfig::default()),
            Algorithm::Genetic => Strategy::Genetic(GaConfig::default()),
            Algorithm::Hybrid => Strategy::Hybrid(HybridConfig::default()),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            Strategy::Blf => Algorithm::Blf,
            Strategy::Greedy(_) => Algorithm::Greedy,
            Strategy::Genetic(_) => Algorithm::Genetic,
            Strategy::Hybrid(_) => Algorithm::Hybrid,
        }
    }
}

/// Final partition of a run: the winning state plus the boxes left out.
#[derive(Clone, Debug)]
pub struct PackOutcome {
    pub state: LoadState,
    pub unplaced: Vec<UnplacedBox>,
}

/// A box that could not be placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnplacedBox {
    pub box_index: usize,
    pub reason: UnplacedReason,
}

impl PackOutcome {
    /// Derives the unplaced list (in box order) from a final state.
    pub fn from_state(problem: &LoadProblem, state: LoadState) -> Self {
        let mut placed = vec![false; problem.len()];
        for placement in &state.placed {
            if let Some(flag) = placed.get_mut(placement.box_index) {
                *flag = true;
            }
        }
        let unplaced = placed
            .iter()
            .enumerate()
            .filter(|(_, is_placed)| !**is_placed)
            .map(|(box_index, _)| UnplacedBox {
                box_index,
                reason: problem.unplaced_reason(box_index),
            })
            .collect();
        Self { state, unplaced }
    }

    #[inline]
    pub fn fill_rate(&self) -> f64 {
        self.state.fill_rate()
    }
}

/// Runs a strategy and returns the placed/unplaced partition.
///
/// Returns [`PackingError::Cancelled`] if the token is observed, never a
/// partial result.
pub fn solve(problem: &LoadProblem, strategy: &Strategy, ctx: &RunContext<'_>) -> Result<PackOutcome> {
    ctx.checkpoint()?;
    let state = match strategy {
        Strategy::Blf => blf::run(problem, ctx)?,
        Strategy::Greedy(config) => greedy::run(problem, config, ctx)?,
        Strategy::Genetic(config) => genetic::run(problem, config, ctx)?,
        Strategy::Hybrid(config) => exact::run_hybrid(problem, config, ctx)?,
    };
    let outcome = PackOutcome::from_state(problem, state);
    log::debug!(
        "{} finished: {} placed, {} unplaced, fill rate {:.2}%",
        strategy.algorithm(),
        outcome.state.len(),
        outcome.unplaced.len(),
        outcome.fill_rate()
    );
    Ok(outcome)
}

/// Runs a strategy and assembles the external result.
pub fn pack(
    problem: &LoadProblem,
    strategy: &Strategy,
    ctx: &RunContext<'_>,
    groups: &[Group],
) -> Result<LoadResult> {
    let outcome = solve(problem, strategy, ctx)?;
    Ok(LoadResult::assemble(problem, &outcome, groups))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn container() -> Container {
        Container::new((100.0, 100.0, 100.0), 1000.0).unwrap()
    }

    fn cube(id: &str) -> Box3D {
        Box3D::new(id, (10.0, 10.0, 10.0), 1.0).unwrap()
    }

    #[test]
    fn problem_rejects_duplicate_ids() {
        let err = LoadProblem::new(container(), vec![cube("a_1"), cube("a_1")], ConstraintFlags::default())
            .unwrap_err();
        assert!(matches!(err, PackingError::InvalidInput(_)));
    }

    #[test]
    fn problem_rejects_fields_without_flags() {
        let boxes = vec![cube("a_1").with_destination_group(3)];
        let err = LoadProblem::new(container(), boxes, ConstraintFlags::default()).unwrap_err();
        assert_eq!(err.code(), "constraint_field_without_flag");
    }

    #[test]
    fn unplaced_reasons_are_classified() {
        let flags = ConstraintFlags {
            enforce_load_capacity: true,
            ..ConstraintFlags::default()
        };
        let small = Container::new((20.0, 20.0, 20.0), 5.0).unwrap();
        let boxes = vec![
            Box3D::new("heavy_1", (5.0, 5.0, 5.0), 50.0).unwrap(),
            Box3D::new("long_1", (50.0, 5.0, 5.0), 1.0).unwrap(),
            Box3D::new("ok_1", (5.0, 5.0, 5.0), 1.0).unwrap(),
        ];
        let problem = LoadProblem::new(small, boxes, flags).unwrap();
        assert_eq!(problem.unplaced_reason(0), UnplacedReason::TooHeavyForContainer);
        assert_eq!(problem.unplaced_reason(1), UnplacedReason::DimensionsExceedContainer);
        assert_eq!(problem.unplaced_reason(2), UnplacedReason::NoFeasiblePosition);
    }

    #[test]
    fn algorithm_names_accept_aliases() {
        assert_eq!("blf".parse::<Algorithm>().unwrap(), Algorithm::Blf);
        assert_eq!("PYTHON_CLPTAC".parse::<Algorithm>().unwrap(), Algorithm::Greedy);
        assert_eq!("PYTHON_GA".parse::<Algorithm>().unwrap(), Algorithm::Genetic);
        assert_eq!("hybrid".parse::<Algorithm>().unwrap(), Algorithm::Hybrid);
        assert!("SIMPLEX".parse::<Algorithm>().is_err());
    }

    #[test]
    fn cancelled_token_stops_every_strategy() {
        let problem = LoadProblem::new(container(), vec![cube("a_1")], ConstraintFlags::default()).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let ctx = RunContext::none().with_cancellation(token);
        for algorithm in [Algorithm::Blf, Algorithm::Greedy, Algorithm::Genetic, Algorithm::Hybrid] {
            let err = solve(&problem, &Strategy::with_defaults(algorithm), &ctx).unwrap_err();
            assert_eq!(err, PackingError::Cancelled);
        }
    }

    #[test]
    fn progress_reaches_the_sink() {
        let lines = Mutex::new(Vec::new());
        let sink = |line: &str| lines.lock().unwrap().push(line.to_string());
        let problem = LoadProblem::new(container(), vec![cube("a_1")], ConstraintFlags::default()).unwrap();
        let ctx = RunContext::none().with_progress(&sink);
        solve(&problem, &Strategy::Blf, &ctx).unwrap();
        assert!(!lines.lock().unwrap().is_empty());
    }

    #[test]
    fn outcome_lists_unplaced_in_box_order() {
        let tiny = Container::new((10.0, 10.0, 10.0), 1000.0).unwrap();
        let boxes = vec![cube("a_1"), cube("a_2"), cube("a_3")];
        let problem = LoadProblem::new(tiny, boxes, ConstraintFlags::default()).unwrap();
        let outcome = solve(&problem, &Strategy::Blf, &RunContext::none()).unwrap();
        assert_eq!(outcome.state.len(), 1);
        let unplaced: Vec<_> = outcome.unplaced.iter().map(|u| u.box_index).collect();
        assert_eq!(unplaced, vec![1, 2]);
        assert!((outcome.fill_rate() - 100.0).abs() < 1e-9);
    }
}
