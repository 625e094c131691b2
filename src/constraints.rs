//! Placement feasibility rules.
//!
//! Every strategy asks the same question before accepting a candidate: can this
//! oriented box sit at this position given everything already placed? The
//! answer is produced here, in a fixed order, so that all strategies share one
//! contract:
//!
//! 1. bounds
//! 2. load capacity (if enabled)
//! 3. overlap
//! 4. stacking (if enabled): supports below the candidate, then boxes that
//!    would end up resting on it

use std::fmt;

use crate::geometry::{overlaps, support_area, supporting, within_container};
use crate::model::{ConstraintFlags, Placement};
use crate::optimizer::PackingConfig;
use crate::state::LoadState;

/// Flags plus the tolerances used to evaluate them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacementRules {
    pub flags: ConstraintFlags,
    /// Minimum supported fraction of the base above floor level.
    pub support_ratio: f64,
    /// Maximum gap between a top face and a base that still counts as contact.
    pub support_tolerance: f64,
    pub epsilon: f64,
}

impl PlacementRules {
    pub fn new(flags: ConstraintFlags, config: &PackingConfig) -> Self {
        Self {
            flags,
            support_ratio: config.support_ratio,
            support_tolerance: config.height_epsilon,
            epsilon: config.general_epsilon,
        }
    }
}

impl Default for PlacementRules {
    fn default() -> Self {
        Self::new(ConstraintFlags::default(), &PackingConfig::default())
    }
}

/// Why a candidate placement was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Rejection {
    OutOfBounds,
    OverCapacity,
    Overlap,
    StackWeightExceeded,
    HeavierOnLighter,
    InsufficientSupport,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::OutOfBounds => "out_of_bounds",
            Rejection::OverCapacity => "over_capacity",
            Rejection::Overlap => "overlap",
            Rejection::StackWeightExceeded => "stack_weight_exceeded",
            Rejection::HeavierOnLighter => "heavier_on_lighter",
            Rejection::InsufficientSupport => "insufficient_support",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::OutOfBounds => write!(f, "Box extends beyond the container walls"),
            Rejection::OverCapacity => write!(f, "Container weight limit would be exceeded"),
            Rejection::Overlap => write!(f, "Box would overlap an already placed box"),
            Rejection::StackWeightExceeded => {
                write!(f, "A supporting box would carry more than its stack limit")
            }
            Rejection::HeavierOnLighter => write!(f, "Box is heavier than a box below it"),
            Rejection::InsufficientSupport => write!(f, "Not enough of the base is supported"),
        }
    }
}

/// Checks a candidate against the current state.
pub fn check(candidate: &Placement, state: &LoadState, rules: &PlacementRules) -> Result<(), Rejection> {
    check_excluding(candidate, state, rules, None)
}

/// Shorthand for `check(..).is_ok()`.
#[inline]
pub fn can_place(candidate: &Placement, state: &LoadState, rules: &PlacementRules) -> bool {
    check(candidate, state, rules).is_ok()
}

/// Checks a candidate while ignoring the placement at `skip`.
///
/// Used to re-validate a placed box at a new position: the box's own old
/// placement must not count as an obstacle, a load or a support.
pub fn check_excluding(
    candidate: &Placement,
    state: &LoadState,
    rules: &PlacementRules,
    skip: Option<usize>,
) -> Result<(), Rejection> {
    if !within_container(candidate, &state.container, rules.epsilon) {
        return Err(Rejection::OutOfBounds);
    }

    if rules.flags.enforce_load_capacity {
        let skipped_weight = skip
            .and_then(|slot| state.placed.get(slot))
            .map_or(0.0, |p| p.weight);
        let total = state.total_weight - skipped_weight + candidate.weight;
        if total > state.container.max_weight + rules.epsilon {
            return Err(Rejection::OverCapacity);
        }
    }

    let collides = state
        .placed
        .iter()
        .enumerate()
        .any(|(index, placed)| Some(index) != skip && overlaps(candidate, placed));
    if collides {
        return Err(Rejection::Overlap);
    }

    if rules.flags.enforce_stacking {
        if candidate.position.z > rules.epsilon {
            check_stacking(candidate, state, rules, skip)?;
        }
        check_carried(candidate, state, rules, skip)?;
    }

    Ok(())
}

/// Rejects a candidate slid or dropped under boxes that are already placed.
fn check_carried(
    candidate: &Placement,
    state: &LoadState,
    rules: &PlacementRules,
    skip: Option<usize>,
) -> Result<(), Rejection> {
    let mut load = 0.0;
    for (index, above) in state.placed.iter().enumerate() {
        if Some(index) == skip
            || supporting(above, std::slice::from_ref(candidate), rules.support_tolerance).is_empty()
        {
            continue;
        }
        if above.weight > candidate.weight + rules.epsilon {
            return Err(Rejection::HeavierOnLighter);
        }
        load += above.weight;
    }
    if load > candidate.stack_limit + rules.epsilon {
        return Err(Rejection::StackWeightExceeded);
    }
    Ok(())
}

fn check_stacking(
    candidate: &Placement,
    state: &LoadState,
    rules: &PlacementRules,
    skip: Option<usize>,
) -> Result<(), Rejection> {
    let others: Vec<Placement>;
    let placed: &[Placement] = match skip {
        Some(slot) if slot < state.placed.len() => {
            others = state
                .placed
                .iter()
                .enumerate()
                .filter(|(index, _)| *index != slot)
                .map(|(_, p)| *p)
                .collect();
            &others
        }
        _ => &state.placed,
    };

    for index in supporting(candidate, &state.placed, rules.support_tolerance) {
        if Some(index) == skip {
            continue;
        }
        let support = &state.placed[index];
        let load = state.load_on_excluding(index, skip, rules.support_tolerance);
        if load + candidate.weight > support.stack_limit + rules.epsilon {
            return Err(Rejection::StackWeightExceeded);
        }
        if candidate.weight > support.weight + rules.epsilon {
            return Err(Rejection::HeavierOnLighter);
        }
    }

    let base = candidate.dims.base_area();
    let supported = support_area(candidate, placed, rules.support_tolerance);
    if base <= 0.0 || supported / base < rules.support_ratio {
        return Err(Rejection::InsufficientSupport);
    }

    Ok(())
}
