//! Geometric helpers for collision detection and support calculation.
//!
//! This module enumerates admissible orientations and answers the two spatial
//! questions every strategy asks: does a candidate overlap a placed box, and how
//! much of its base rests on something.

use crate::model::{Box3D, Container, Placement, Rotation};
use crate::types::{BoundingBox, EPSILON_GENERAL, Vec3};

/// Admissible orientations of a box, in rotation id order.
///
/// Only ids contained in the box's allowed set are returned.
pub fn rotations(object: &Box3D) -> Vec<(Rotation, Vec3)> {
    object
        .allowed_rotations
        .iter()
        .map(|rotation| (rotation, rotation.apply(object.dims)))
        .collect()
}

/// Orientations that fit inside the empty container.
pub fn fitting_rotations(object: &Box3D, container: &Container) -> Vec<(Rotation, Vec3)> {
    let bounds = container.dims();
    rotations(object)
        .into_iter()
        .filter(|(_, dims)| dims.fits_within(&bounds, EPSILON_GENERAL))
        .collect()
}

/// Checks whether two placements share volume.
///
/// Uses Axis-Aligned Bounding Box (AABB) collision detection. Boxes that only
/// touch along a face do not overlap.
///
/// # Examples
/// ```
/// use container_loader::geometry::overlaps;
/// use container_loader::model::{Box3D, Placement, Rotation};
/// use container_loader::types::Vec3;
///
/// let cube = Box3D::new("cube_1", (10.0, 10.0, 10.0), 1.0).unwrap();
/// let a = Placement::new(0, &cube, Rotation::Lwh, Vec3::zero());
/// let b = Placement::new(1, &cube, Rotation::Lwh, Vec3::new(10.0, 0.0, 0.0));
/// assert!(!overlaps(&a, &b));
/// ```
#[inline]
pub fn overlaps(a: &Placement, b: &Placement) -> bool {
    a.bounding_box().intersects(&b.bounding_box())
}

/// Returns `true` when `below`'s top face touches `candidate`'s base.
#[inline]
fn touches_base(candidate: &Placement, below: &Placement, height_tolerance: f64) -> bool {
    (below.top_z() - candidate.position.z).abs() <= height_tolerance
}

/// Base area of `candidate` that rests on the floor or on placed boxes.
///
/// At floor level the whole base counts. Otherwise the footprint
/// intersections with every box whose top face lies within `height_tolerance`
/// of the candidate's base are summed.
pub fn support_area(candidate: &Placement, placed: &[Placement], height_tolerance: f64) -> f64 {
    if candidate.position.z.abs() <= EPSILON_GENERAL {
        return candidate.dims.base_area();
    }
    let candidate_box = candidate.bounding_box();
    placed
        .iter()
        .filter(|below| touches_base(candidate, below, height_tolerance))
        .map(|below| candidate_box.overlap_area_xy(&below.bounding_box()))
        .sum()
}

/// Indices into `placed` of boxes that carry `candidate` directly.
///
/// A box carries the candidate when its top face touches the candidate's base
/// and the footprints overlap with positive area.
pub fn supporting(candidate: &Placement, placed: &[Placement], height_tolerance: f64) -> Vec<usize> {
    if candidate.position.z.abs() <= EPSILON_GENERAL {
        return Vec::new();
    }
    let candidate_box = candidate.bounding_box();
    placed
        .iter()
        .enumerate()
        .filter(|(_, below)| {
            touches_base(candidate, below, height_tolerance)
                && candidate_box.overlap_area_xy(&below.bounding_box()) > EPSILON_GENERAL
        })
        .map(|(index, _)| index)
        .collect()
}

/// Checks whether `candidate` lies completely inside the container.
#[inline]
pub fn within_container(candidate: &Placement, container: &Container, epsilon: f64) -> bool {
    let bounds = BoundingBox::from_position_and_dims(Vec3::zero(), container.dims());
    let bbox = candidate.bounding_box();
    bbox.min.x >= -epsilon
        && bbox.min.y >= -epsilon
        && bbox.min.z >= -epsilon
        && bbox.max.fits_within(&bounds.max, epsilon)
}
