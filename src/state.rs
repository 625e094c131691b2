//! Mutable state of a single loading attempt.

use crate::geometry::supporting;
use crate::model::{Container, Placement};
use crate::types::{Dimensional, Weighted};

/// Accepted placements of one attempt plus running totals.
///
/// Each exploration unit (BLF run, greedy restart, GA individual) owns its
/// state exclusively. Cloning yields an independent copy.
#[derive(Clone, Debug)]
pub struct LoadState {
    pub container: Container,
    pub placed: Vec<Placement>,
    pub total_weight: f64,
    pub total_volume: f64,
}

impl LoadState {
    /// Creates an empty state for the container.
    pub fn new(container: Container) -> Self {
        Self {
            container,
            placed: Vec::new(),
            total_weight: 0.0,
            total_volume: 0.0,
        }
    }

    /// Clears all placements while keeping the container.
    pub fn reset(&mut self) {
        self.placed.clear();
        self.total_weight = 0.0;
        self.total_volume = 0.0;
    }

    /// Records an accepted placement.
    ///
    /// The caller is responsible for checking feasibility first.
    pub fn place(&mut self, placement: Placement) {
        self.total_weight += placement.weight();
        self.total_volume += placement.volume();
        self.placed.push(placement);
    }

    /// Replaces the placement at `slot` with a moved copy of itself.
    pub fn relocate(&mut self, slot: usize, placement: Placement) {
        if let Some(existing) = self.placed.get_mut(slot) {
            *existing = placement;
        }
    }

    /// Removes the placement at `slot` and returns it.
    pub fn take(&mut self, slot: usize) -> Option<Placement> {
        if slot >= self.placed.len() {
            return None;
        }
        let placement = self.placed.remove(slot);
        self.total_weight -= placement.weight();
        self.total_volume -= placement.volume();
        Some(placement)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.placed.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.placed.is_empty()
    }

    /// Occupied volume as a percentage of the container volume.
    pub fn fill_rate(&self) -> f64 {
        let capacity = self.container.volume();
        if capacity <= 0.0 {
            return 0.0;
        }
        self.total_volume / capacity * 100.0
    }

    /// Weight currently resting directly on the placement at `slot`.
    ///
    /// A box resting on several supports counts fully toward each of them.
    pub fn load_on(&self, slot: usize, height_tolerance: f64) -> f64 {
        self.load_on_excluding(slot, None, height_tolerance)
    }

    /// Like [`LoadState::load_on`], ignoring the placement at `skip`.
    pub fn load_on_excluding(&self, slot: usize, skip: Option<usize>, height_tolerance: f64) -> f64 {
        let Some(support) = self.placed.get(slot) else {
            return 0.0;
        };
        self.placed
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != slot && Some(*index) != skip)
            .filter(|(_, above)| {
                !supporting(above, std::slice::from_ref(support), height_tolerance).is_empty()
            })
            .map(|(_, above)| above.weight())
            .sum()
    }

    /// Returns `true` if any placed box rests on the placement at `slot`.
    pub fn carries_load(&self, slot: usize, height_tolerance: f64) -> bool {
        self.load_on(slot, height_tolerance) > 0.0
    }
}
