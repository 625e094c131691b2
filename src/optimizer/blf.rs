//! Deterministic bottom-left-fill placement.
//!
//! Boxes are taken in a fixed order and each one goes to the lowest, then
//! front-most, then left-most feasible anchor. There is no backtracking, so the
//! same input always produces the same placements.

use std::cmp::Ordering;

use crate::constraints::check;
use crate::error::Result;
use crate::model::{Placement, Rotation};
use crate::state::LoadState;
use crate::types::{Dimensional, EPSILON_GENERAL, Vec3};

use super::{LoadProblem, RunContext};

/// Number of boxes between two progress lines.
const PROGRESS_INTERVAL: usize = 25;

/// Placement order: destination group (LIFO), priority, volume descending,
/// original index.
pub fn sort_order(problem: &LoadProblem) -> Vec<usize> {
    let flags = problem.flags();
    let boxes = problem.boxes();
    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| {
        let (box_a, box_b) = (&boxes[a], &boxes[b]);
        let lifo = if flags.enforce_lifo {
            box_a.destination_rank().cmp(&box_b.destination_rank())
        } else {
            Ordering::Equal
        };
        let priority = if flags.enforce_priority {
            box_a.priority_rank().cmp(&box_b.priority_rank())
        } else {
            Ordering::Equal
        };
        lifo.then(priority)
            .then_with(|| box_b.volume().total_cmp(&box_a.volume()))
            .then(a.cmp(&b))
    });
    order
}

/// Candidate anchors: the origin plus, for every placed box, the points right
/// of it, behind it and on top of it. Sorted and deduplicated.
pub fn anchors(state: &LoadState) -> Vec<Vec3> {
    let mut points = Vec::with_capacity(1 + state.placed.len() * 3);
    points.push(Vec3::zero());
    for placed in &state.placed {
        let Vec3 { x, y, z } = placed.position;
        points.push(Vec3::new(x + placed.dims.x, y, z));
        points.push(Vec3::new(x, y + placed.dims.y, z));
        points.push(Vec3::new(x, y, z + placed.dims.z));
    }
    points.sort_by(|a, b| a.total_cmp(b));
    points.dedup_by(|a, b| a.approx_eq(b, EPSILON_GENERAL));
    points
}

/// Lower is better: height dominates, then depth, then length.
#[inline]
pub fn score(position: Vec3) -> f64 {
    position.z * 1e9 + position.y * 1e6 + position.x
}

/// Best feasible anchor for box `box_index` over the given orientations.
///
/// Orientations are tried in the given order and anchors in sorted order; the
/// first candidate with the minimum score wins.
pub fn best_position(
    problem: &LoadProblem,
    state: &LoadState,
    box_index: usize,
    rotations: &[(Rotation, Vec3)],
    points: &[Vec3],
) -> Option<Placement> {
    let object = problem.boxes().get(box_index)?;
    let mut best: Option<(f64, Placement)> = None;
    for &(rotation, _) in rotations {
        for &anchor in points {
            let candidate = Placement::new(box_index, object, rotation, anchor);
            if check(&candidate, state, problem.rules()).is_err() {
                continue;
            }
            let candidate_score = score(anchor);
            if best.as_ref().is_none_or(|(current, _)| candidate_score < *current) {
                best = Some((candidate_score, candidate));
            }
        }
    }
    best.map(|(_, placement)| placement)
}

/// Places every box in [`sort_order`] at its best anchor.
pub fn run(problem: &LoadProblem, ctx: &RunContext<'_>) -> Result<LoadState> {
    let order = sort_order(problem);
    let mut state = problem.empty_state();
    let total = order.len();

    for (step, &index) in order.iter().enumerate() {
        ctx.checkpoint()?;
        let points = anchors(&state);
        if let Some(placement) =
            best_position(problem, &state, index, problem.fitting_rotations(index), &points)
        {
            state.place(placement);
        }
        if (step + 1) % PROGRESS_INTERVAL == 0 {
            ctx.report(&format!(
                "BLF: {}/{} boxes processed, {} placed",
                step + 1,
                total,
                state.len()
            ));
        }
    }

    ctx.report(&format!(
        "BLF: finished with {}/{} boxes placed, fill rate {:.2}%",
        state.len(),
        total,
        state.fill_rate()
    ));
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PackingError;
    use crate::model::{Box3D, ConstraintFlags, Container};
    use crate::optimizer::CancellationToken;

    fn problem(boxes: Vec<Box3D>, flags: ConstraintFlags) -> LoadProblem {
        let container = Container::new((30.0, 20.0, 20.0), 1000.0).unwrap();
        LoadProblem::new(container, boxes, flags).unwrap()
    }

    #[test]
    fn sort_order_honours_lifo_then_priority() {
        let flags = ConstraintFlags {
            enforce_lifo: true,
            enforce_priority: true,
            ..ConstraintFlags::default()
        };
        let boxes = vec![
            Box3D::new("a_1", (10.0, 10.0, 10.0), 1.0).unwrap().with_destination_group(5).with_priority(1),
            Box3D::new("b_1", (5.0, 5.0, 5.0), 1.0).unwrap().with_destination_group(1).with_priority(3),
            Box3D::new("c_1", (5.0, 5.0, 5.0), 1.0).unwrap().with_destination_group(1).with_priority(2),
            Box3D::new("d_1", (8.0, 8.0, 8.0), 1.0).unwrap().with_destination_group(5).with_priority(1),
        ];
        assert_eq!(sort_order(&problem(boxes, flags)), vec![2, 1, 0, 3]);
    }

    #[test]
    fn sort_order_defaults_to_volume_then_index() {
        let boxes = vec![
            Box3D::new("s_1", (5.0, 5.0, 5.0), 1.0).unwrap(),
            Box3D::new("l_1", (10.0, 10.0, 10.0), 1.0).unwrap(),
            Box3D::new("s_2", (5.0, 5.0, 5.0), 1.0).unwrap(),
        ];
        assert_eq!(sort_order(&problem(boxes, ConstraintFlags::default())), vec![1, 0, 2]);
    }

    #[test]
    fn anchors_are_deduplicated() {
        let object = Box3D::new("a_1", (10.0, 10.0, 10.0), 1.0).unwrap();
        let mut state = LoadState::new(Container::new((30.0, 20.0, 20.0), 100.0).unwrap());
        assert_eq!(anchors(&state), vec![Vec3::zero()]);
        state.place(Placement::new(0, &object, Rotation::Lwh, Vec3::zero()));
        state.place(Placement::new(1, &object, Rotation::Lwh, Vec3::new(10.0, 0.0, 0.0)));
        let points = anchors(&state);
        // (10,0,0) appears once even though it is both a right-extrusion and an origin
        assert_eq!(points.iter().filter(|p| p.approx_eq(&Vec3::new(10.0, 0.0, 0.0), 1e-9)).count(), 1);
        assert_eq!(points.len(), 7);
    }

    #[test]
    fn fills_floor_before_stacking() {
        let boxes: Vec<_> = (1..=4)
            .map(|i| Box3D::new(format!("cube_{i}"), (10.0, 10.0, 10.0), 1.0).unwrap())
            .collect();
        let problem = problem(boxes, ConstraintFlags::default());
        let state = run(&problem, &RunContext::none()).unwrap();
        assert_eq!(state.len(), 4);
        let positions: Vec<_> = state.placed.iter().map(|p| p.position.as_tuple()).collect();
        assert_eq!(
            positions,
            vec![
                (0.0, 0.0, 0.0),
                (10.0, 0.0, 0.0),
                (20.0, 0.0, 0.0),
                (0.0, 10.0, 0.0),
            ]
        );
    }

    #[test]
    fn repeated_runs_are_identical() {
        let boxes: Vec<_> = (1..=12)
            .map(|i| Box3D::new(format!("mix_{i}"), (4.0 + i as f64, 6.0, 3.0 + (i % 4) as f64), 1.0).unwrap())
            .collect();
        let problem = problem(boxes, ConstraintFlags::default());
        let first = run(&problem, &RunContext::none()).unwrap();
        let second = run(&problem, &RunContext::none()).unwrap();
        assert_eq!(first.placed, second.placed);
    }

    #[test]
    fn run_observes_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let problem = problem(
            vec![Box3D::new("a_1", (1.0, 1.0, 1.0), 1.0).unwrap()],
            ConstraintFlags::default(),
        );
        let ctx = RunContext::none().with_cancellation(token);
        assert_eq!(run(&problem, &ctx).unwrap_err(), PackingError::Cancelled);
    }
}
