//! Randomized multi-restart, multi-pass greedy placement with compaction.
//!
//! Each restart is an independent attempt that owns its own [`LoadState`]:
//! - restart 0 uses the base order, later restarts a seeded shuffle of it
//! - every attempt makes up to `passes` passes over the boxes still unplaced,
//!   each pass with a different ordering heuristic
//! - after a productive pass, placed boxes slide toward the origin
//!
//! Attempts run on the rayon pool and are merged afterwards; the attempt with
//! the highest fill rate wins, earlier attempts win ties.

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::constraints::{check, check_excluding};
use crate::error::Result;
use crate::geometry::support_area;
use crate::model::{Box3D, ConstraintFlags, Container, Placement};
use crate::state::LoadState;
use crate::types::{BoundingBox, Dimensional, EPSILON_GENERAL, Vec3};

use super::{LoadProblem, RunContext};

/// Parameters of the greedy strategy.
#[derive(Clone, Debug, PartialEq)]
pub struct GreedyConfig {
    /// Number of independent attempts (at least one runs)
    pub restarts: usize,
    /// Maximum passes per attempt
    pub passes: usize,
    /// Grid samples per container axis for interior candidates
    pub grid_samples: usize,
    /// Slide boxes toward the origin after each productive pass
    pub compaction: bool,
    /// Master seed; a random one is drawn when absent
    pub seed: Option<u64>,
}

impl GreedyConfig {
    pub const DEFAULT_RESTARTS: usize = 5;
    pub const DEFAULT_PASSES: usize = 4;
    pub const DEFAULT_GRID_SAMPLES: usize = 10;
}

impl Default for GreedyConfig {
    fn default() -> Self {
        Self {
            restarts: Self::DEFAULT_RESTARTS,
            passes: Self::DEFAULT_PASSES,
            grid_samples: Self::DEFAULT_GRID_SAMPLES,
            compaction: true,
            seed: None,
        }
    }
}

/// Smallest value a sort multiplier may take.
const MIN_MULTIPLIER: f64 = 0.01;

/// Volume weighting from priority and destination group.
///
/// Important boxes (low priority number) and urgent groups (low group number)
/// are pulled toward the front of the base order.
pub fn priority_multiplier(object: &Box3D, flags: &ConstraintFlags) -> f64 {
    let mut multiplier = 1.0;
    if flags.enforce_priority {
        multiplier *= (1.0 + (6.0 - object.priority_rank() as f64) * 0.1).max(MIN_MULTIPLIER);
    }
    if flags.enforce_lifo {
        multiplier *= (1.0 + (100.0 - object.destination_rank() as f64) * 0.005).max(MIN_MULTIPLIER);
    }
    multiplier
}

#[inline]
fn aspect_ratio(dims: Vec3) -> f64 {
    dims.max_component() / dims.min_component()
}

#[inline]
fn compactness(dims: Vec3) -> f64 {
    dims.volume() / (dims.x + dims.y + dims.z)
}

/// Base order: weighted volume descending, aspect ratio ascending,
/// compactness descending, then original index.
pub fn base_order(problem: &LoadProblem) -> Vec<usize> {
    let boxes = problem.boxes();
    let flags = problem.flags();
    let weighted: Vec<f64> = boxes
        .iter()
        .map(|b| b.volume() * priority_multiplier(b, flags))
        .collect();
    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| {
        weighted[b]
            .total_cmp(&weighted[a])
            .then_with(|| aspect_ratio(boxes[a].dims).total_cmp(&aspect_ratio(boxes[b].dims)))
            .then_with(|| compactness(boxes[b].dims).total_cmp(&compactness(boxes[a].dims)))
            .then(a.cmp(&b))
    });
    order
}

/// Ordering heuristic of pass `pass` applied to the remaining boxes.
///
/// Pass 0 keeps the attempt order; later passes cycle through smallest
/// dimension ascending, aspect ratio ascending and volume descending.
fn pass_order(problem: &LoadProblem, remaining: &[usize], pass: usize) -> Vec<usize> {
    let boxes = problem.boxes();
    let mut order = remaining.to_vec();
    match pass % 4 {
        0 => {}
        1 => order.sort_by(|&a, &b| {
            boxes[a]
                .dims
                .min_component()
                .total_cmp(&boxes[b].dims.min_component())
        }),
        2 => order.sort_by(|&a, &b| {
            aspect_ratio(boxes[a].dims).total_cmp(&aspect_ratio(boxes[b].dims))
        }),
        _ => order.sort_by(|&a, &b| boxes[b].volume().total_cmp(&boxes[a].volume())),
    }
    order
}

/// Corner candidates: the origin plus six extrusions of every placed box.
fn corner_positions(state: &LoadState) -> Vec<Vec3> {
    let mut points = Vec::with_capacity(1 + state.placed.len() * 6);
    points.push(Vec3::zero());
    for placed in &state.placed {
        let Vec3 { x, y, z } = placed.position;
        let Vec3 { x: l, y: w, z: h } = placed.dims;
        points.extend([
            Vec3::new(x + l, y, z),
            Vec3::new(x, y + w, z),
            Vec3::new(x, y, z + h),
            Vec3::new(x + l, y + w, z),
            Vec3::new(x + l, y, z + h),
            Vec3::new(x, y + w, z + h),
        ]);
    }
    points.sort_by(|a, b| a.total_cmp(b));
    points.dedup_by(|a, b| a.approx_eq(b, EPSILON_GENERAL));
    points
}

fn axis_steps(container_len: f64, object_len: f64, samples: usize) -> Vec<f64> {
    let step = (container_len / samples.max(1) as f64).floor().max(1.0);
    let limit = container_len - object_len + EPSILON_GENERAL;
    let mut values = Vec::new();
    let mut value = 0.0;
    while value <= limit {
        values.push(value);
        value += step;
    }
    values
}

/// Interior grid for an oriented box.
fn grid_positions(container: &Container, dims: Vec3, samples: usize) -> Vec<Vec3> {
    let xs = axis_steps(container.length, dims.x, samples);
    let ys = axis_steps(container.width, dims.y, samples);
    let zs = axis_steps(container.height, dims.z, samples);
    let mut points = Vec::with_capacity(xs.len() * ys.len() * zs.len());
    for &x in &xs {
        for &y in &ys {
            for &z in &zs {
                points.push(Vec3::new(x, y, z));
            }
        }
    }
    points
}

/// Lexicographic candidate score; see [`CandidateScore::is_better_than`].
#[derive(Clone, Copy, Debug)]
struct CandidateScore {
    support: f64,
    corner_distance: f64,
    z: f64,
    stability: f64,
}

impl CandidateScore {
    fn of(candidate: &Placement, placed: &[Placement], height_tolerance: f64) -> Self {
        let support = support_area(candidate, placed, height_tolerance);
        let base = candidate.dims.base_area();
        Self {
            support,
            corner_distance: candidate.position.norm(),
            z: candidate.position.z,
            stability: if base > 0.0 { support / base } else { 0.0 },
        }
    }

    /// More support, then closer to the origin, then lower, then more stable.
    fn is_better_than(&self, other: &Self) -> bool {
        self.support
            .total_cmp(&other.support)
            .then_with(|| other.corner_distance.total_cmp(&self.corner_distance))
            .then_with(|| other.z.total_cmp(&self.z))
            .then_with(|| self.stability.total_cmp(&other.stability))
            == Ordering::Greater
    }
}

/// Best feasible candidate for box `box_index`, if any.
fn best_candidate(
    problem: &LoadProblem,
    state: &LoadState,
    box_index: usize,
    corners: &[Vec3],
    grid_samples: usize,
) -> Option<Placement> {
    let object = problem.boxes().get(box_index)?;
    let rules = problem.rules();
    let mut best: Option<(CandidateScore, Placement)> = None;
    for &(rotation, dims) in problem.fitting_rotations(box_index) {
        let grid = grid_positions(problem.container(), dims, grid_samples);
        for &position in corners.iter().chain(grid.iter()) {
            let candidate = Placement::new(box_index, object, rotation, position);
            if check(&candidate, state, rules).is_err() {
                continue;
            }
            let score = CandidateScore::of(&candidate, &state.placed, rules.support_tolerance);
            if best.as_ref().is_none_or(|(current, _)| score.is_better_than(current)) {
                best = Some((score, candidate));
            }
        }
    }
    best.map(|(_, placement)| placement)
}

/// Contact coordinate below `slot` along `axis`: the highest far face of any
/// other box whose projection overlaps it on the two remaining axes, or 0.
fn contact_face(state: &LoadState, slot: usize, axis: usize, epsilon: f64) -> f64 {
    let me = state.placed[slot].bounding_box();
    let others = [(axis + 1) % 3, (axis + 2) % 3];
    state
        .placed
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != slot)
        .map(|(_, other)| other.bounding_box())
        .filter(|other| other.max.axis(axis) <= me.min.axis(axis) + epsilon)
        .filter(|other| {
            others.iter().all(|&a| {
                BoundingBox::overlap_1d(
                    me.min.axis(a),
                    me.max.axis(a),
                    other.min.axis(a),
                    other.max.axis(a),
                ) > epsilon
            })
        })
        .map(|other| other.max.axis(axis))
        .fold(0.0, f64::max)
}

/// Slides the box at `slot` toward the origin along `axis`.
///
/// Moves one unit at a time while the evaluator accepts, then tries to snap to
/// the contact face.
fn slide(problem: &LoadProblem, state: &mut LoadState, slot: usize, axis: usize) {
    let rules = *problem.rules();
    loop {
        let current = state.placed[slot];
        let coord = current.position.axis(axis);
        if coord <= rules.epsilon {
            return;
        }
        let target = (coord - 1.0).max(0.0);
        let moved = current.moved_to(current.position.with_axis(axis, target));
        if check_excluding(&moved, state, &rules, Some(slot)).is_err() {
            break;
        }
        state.relocate(slot, moved);
    }

    let current = state.placed[slot];
    let coord = current.position.axis(axis);
    let contact = contact_face(state, slot, axis, rules.epsilon);
    if contact < coord - rules.epsilon {
        let moved = current.moved_to(current.position.with_axis(axis, contact));
        if check_excluding(&moved, state, &rules, Some(slot)).is_ok() {
            state.relocate(slot, moved);
        }
    }
}

/// Slides every movable box along x, then y, then z.
///
/// With stacking enabled, boxes that carry other boxes stay where they are.
pub fn compact(problem: &LoadProblem, state: &mut LoadState) {
    let rules = *problem.rules();
    for slot in 0..state.len() {
        if rules.flags.enforce_stacking && state.carries_load(slot, rules.support_tolerance) {
            continue;
        }
        for axis in 0..3 {
            slide(problem, state, slot, axis);
        }
    }
}

/// Finished attempt with its buffered progress lines.
#[derive(Clone, Debug)]
struct Attempt {
    state: LoadState,
    log: Vec<String>,
}

fn run_attempt(
    problem: &LoadProblem,
    config: &GreedyConfig,
    attempt: usize,
    restarts: usize,
    order: Vec<usize>,
    ctx: &RunContext<'_>,
) -> Result<Attempt> {
    let mut state = problem.empty_state();
    let mut log = Vec::new();
    let mut remaining = order;

    for pass in 0..config.passes {
        ctx.checkpoint()?;
        if remaining.is_empty() {
            break;
        }
        log.push(format!(
            "restart {}/{} pass {}: {} boxes remaining",
            attempt + 1,
            restarts,
            pass + 1,
            remaining.len()
        ));

        let mut unplaced = Vec::new();
        let mut placed_in_pass = 0;
        for index in pass_order(problem, &remaining, pass) {
            ctx.checkpoint()?;
            let corners = corner_positions(&state);
            match best_candidate(problem, &state, index, &corners, config.grid_samples) {
                Some(placement) => {
                    state.place(placement);
                    placed_in_pass += 1;
                }
                None => unplaced.push(index),
            }
        }
        remaining = unplaced;

        if placed_in_pass == 0 {
            break;
        }
        if config.compaction {
            compact(problem, &mut state);
        }
    }

    log.push(format!(
        "restart {}/{}: {} boxes placed, fill rate {:.2}%",
        attempt + 1,
        restarts,
        state.len(),
        state.fill_rate()
    ));
    log::debug!(
        "greedy attempt {} finished with fill rate {:.2}%",
        attempt + 1,
        state.fill_rate()
    );
    Ok(Attempt { state, log })
}

/// Runs all attempts and returns the best final state.
pub fn run(problem: &LoadProblem, config: &GreedyConfig, ctx: &RunContext<'_>) -> Result<LoadState> {
    let (state, _) = run_with_fill_rates(problem, config, ctx)?;
    Ok(state)
}

/// Like [`run`], additionally returning every attempt's fill rate in attempt
/// order.
pub fn run_with_fill_rates(
    problem: &LoadProblem,
    config: &GreedyConfig,
    ctx: &RunContext<'_>,
) -> Result<(LoadState, Vec<f64>)> {
    ctx.checkpoint()?;
    let restarts = config.restarts.max(1);
    let base = base_order(problem);

    let mut master = StdRng::seed_from_u64(config.seed.unwrap_or_else(rand::random));
    let orders: Vec<Vec<usize>> = (0..restarts)
        .map(|attempt| {
            let seed: u64 = master.random();
            let mut order = base.clone();
            if attempt > 0 {
                order.shuffle(&mut StdRng::seed_from_u64(seed));
            }
            order
        })
        .collect();

    let attempts: Vec<Attempt> = orders
        .into_par_iter()
        .enumerate()
        .map(|(attempt, order)| {
            ctx.checkpoint()?;
            run_attempt(problem, config, attempt, restarts, order, ctx)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut fill_rates = Vec::with_capacity(attempts.len());
    let mut best: Option<(usize, LoadState)> = None;
    for (index, attempt) in attempts.into_iter().enumerate() {
        for line in &attempt.log {
            ctx.report(line);
        }
        ctx.checkpoint()?;
        let fill = attempt.state.fill_rate();
        fill_rates.push(fill);
        if best
            .as_ref()
            .is_none_or(|(_, current)| fill > current.fill_rate())
        {
            best = Some((index, attempt.state));
        }
    }

    let (winner, state) = best.unwrap_or_else(|| (0, problem.empty_state()));
    ctx.report(&format!(
        "greedy: best restart {}/{} with fill rate {:.2}%",
        winner + 1,
        restarts,
        state.fill_rate()
    ));
    Ok((state, fill_rates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::can_place;
    use crate::error::PackingError;
    use crate::geometry::overlaps;
    use crate::model::Rotation;
    use crate::optimizer::CancellationToken;
    use std::sync::Mutex;

    fn cubes(count: usize, side: f64) -> Vec<Box3D> {
        (1..=count)
            .map(|i| Box3D::new(format!("cube_{i}"), (side, side, side), 1.0).unwrap())
            .collect()
    }

    fn problem(boxes: Vec<Box3D>, flags: ConstraintFlags) -> LoadProblem {
        let container = Container::new((20.0, 20.0, 20.0), 1000.0).unwrap();
        LoadProblem::new(container, boxes, flags).unwrap()
    }

    fn seeded() -> GreedyConfig {
        GreedyConfig {
            restarts: 3,
            seed: Some(7),
            ..GreedyConfig::default()
        }
    }

    #[test]
    fn multiplier_favours_important_boxes() {
        let flags = ConstraintFlags {
            enforce_priority: true,
            enforce_lifo: true,
            ..ConstraintFlags::default()
        };
        let urgent = Box3D::new("a_1", (1.0, 1.0, 1.0), 1.0)
            .unwrap()
            .with_priority(1)
            .with_destination_group(0);
        let relaxed = Box3D::new("b_1", (1.0, 1.0, 1.0), 1.0)
            .unwrap()
            .with_priority(9)
            .with_destination_group(99);
        assert!(priority_multiplier(&urgent, &flags) > priority_multiplier(&relaxed, &flags));
        assert!(priority_multiplier(&relaxed, &flags) > 0.0);
        assert_eq!(priority_multiplier(&urgent, &ConstraintFlags::default()), 1.0);
    }

    #[test]
    fn base_order_prefers_large_cubic_boxes() {
        let boxes = vec![
            Box3D::new("flat_1", (16.0, 16.0, 1.0), 1.0).unwrap(),
            Box3D::new("cube_1", (4.0, 4.0, 4.0), 1.0).unwrap(),
            Box3D::new("stick_1", (16.0, 2.0, 2.0), 1.0).unwrap(),
            Box3D::new("cube_2", (4.0, 4.0, 4.0), 1.0).unwrap(),
        ];
        // volumes 256, 64, 64, 64; the cubes beat the stick on aspect ratio
        assert_eq!(base_order(&problem(boxes, ConstraintFlags::default())), vec![0, 1, 3, 2]);
    }

    #[test]
    fn grid_steps_are_at_least_one_unit() {
        let steps = axis_steps(5.0, 2.0, 10);
        assert_eq!(steps, vec![0.0, 1.0, 2.0, 3.0]);
        assert!(axis_steps(5.0, 6.0, 10).is_empty());
    }

    #[test]
    fn fills_a_container_exactly() {
        let problem = problem(cubes(8, 10.0), ConstraintFlags::default());
        let state = run(&problem, &seeded(), &RunContext::none()).unwrap();
        assert_eq!(state.len(), 8);
        assert!((state.fill_rate() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn placements_never_overlap() {
        let mut boxes = cubes(6, 7.0);
        boxes.extend((1..=6).map(|i| Box3D::new(format!("slab_{i}"), (9.0, 5.0, 3.0), 1.0).unwrap()));
        let problem = problem(boxes, ConstraintFlags::default());
        let state = run(&problem, &seeded(), &RunContext::none()).unwrap();
        for (i, a) in state.placed.iter().enumerate() {
            for b in &state.placed[i + 1..] {
                assert!(!overlaps(a, b));
            }
        }
    }

    #[test]
    fn reported_fill_is_the_best_attempt() {
        let mut boxes = cubes(5, 8.0);
        boxes.extend((1..=5).map(|i| Box3D::new(format!("bar_{i}"), (12.0, 4.0, 6.0), 1.0).unwrap()));
        let problem = problem(boxes, ConstraintFlags::default());
        let (state, fills) = run_with_fill_rates(&problem, &seeded(), &RunContext::none()).unwrap();
        assert_eq!(fills.len(), 3);
        assert!(fills.iter().all(|fill| state.fill_rate() >= *fill - 1e-9));
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let mut boxes = cubes(4, 6.0);
        boxes.extend((1..=4).map(|i| Box3D::new(format!("bar_{i}"), (11.0, 3.0, 5.0), 1.0).unwrap()));
        let problem = problem(boxes, ConstraintFlags::default());
        let first = run(&problem, &seeded(), &RunContext::none()).unwrap();
        let second = run(&problem, &seeded(), &RunContext::none()).unwrap();
        assert_eq!(first.placed, second.placed);
    }

    #[test]
    fn compaction_closes_gaps() {
        let object = Box3D::new("cube_1", (5.0, 5.0, 5.0), 1.0).unwrap();
        let problem = problem(vec![object.clone()], ConstraintFlags::default());
        let mut state = problem.empty_state();
        state.place(Placement::new(0, &object, Rotation::Lwh, Vec3::new(7.5, 3.25, 9.0)));
        compact(&problem, &mut state);
        assert!(state.placed[0].position.approx_eq(&Vec3::zero(), 1e-9));
    }

    #[test]
    fn compaction_keeps_stacked_loads_in_place() {
        let flags = ConstraintFlags {
            enforce_stacking: true,
            ..ConstraintFlags::default()
        };
        let object = Box3D::new("cube_1", (5.0, 5.0, 5.0), 1.0).unwrap();
        let problem = problem(vec![object.clone()], flags);
        let mut state = problem.empty_state();
        state.place(Placement::new(0, &object, Rotation::Lwh, Vec3::new(4.0, 0.0, 0.0)));
        state.place(Placement::new(1, &object, Rotation::Lwh, Vec3::new(4.0, 0.0, 5.0)));
        compact(&problem, &mut state);
        assert!(state.placed[0].position.approx_eq(&Vec3::new(4.0, 0.0, 0.0), 1e-9));
        for (slot, placement) in state.placed.iter().enumerate() {
            let mut others = state.clone();
            others.take(slot);
            assert!(can_place(placement, &others, problem.rules()));
        }
    }

    #[test]
    fn progress_is_flushed_in_attempt_order() {
        let lines = Mutex::new(Vec::new());
        let sink = |line: &str| lines.lock().unwrap().push(line.to_string());
        let problem = problem(cubes(3, 5.0), ConstraintFlags::default());
        run(&problem, &seeded(), &RunContext::none().with_progress(&sink)).unwrap();
        let lines = lines.into_inner().unwrap();
        let restarts: Vec<_> = lines
            .iter()
            .filter(|l| l.contains("pass 1:"))
            .map(|l| l.split_whitespace().nth(1).unwrap_or_default().to_string())
            .collect();
        assert_eq!(restarts, vec!["1/3", "2/3", "3/3"]);
        assert!(lines.last().unwrap().starts_with("greedy: best restart"));
    }

    #[test]
    fn cancellation_aborts_the_run() {
        let token = CancellationToken::new();
        token.cancel();
        let problem = problem(cubes(2, 5.0), ConstraintFlags::default());
        let ctx = RunContext::none().with_cancellation(token);
        assert_eq!(run(&problem, &seeded(), &ctx).unwrap_err(), PackingError::Cancelled);
    }

    #[test]
    fn cancelling_during_progress_stops_before_the_next_restart_is_merged() {
        let token = CancellationToken::new();
        let lines = Mutex::new(Vec::new());
        let sink = |line: &str| {
            lines.lock().unwrap().push(line.to_string());
            token.cancel();
        };
        let problem = problem(cubes(8, 5.0), ConstraintFlags::default());
        let ctx = RunContext::none()
            .with_cancellation(token.clone())
            .with_progress(&sink);
        assert_eq!(run(&problem, &seeded(), &ctx).unwrap_err(), PackingError::Cancelled);
        let lines = lines.into_inner().unwrap();
        assert!(lines.iter().all(|l| l.starts_with("restart 1/3")));
        assert!(!lines.iter().any(|l| l.starts_with("greedy: best restart")));
    }
}
