//! Common types and traits for 3D geometry.
//!
//! Positions and dimensions share the `Vec3` representation: `x` runs along the
//! container length, `y` along its width and `z` along its height.

use std::ops::Add;

/// Global numerical tolerance for floating-point comparisons.
///
/// Used for bounds checks, weight comparisons and deduplication of anchors.
pub const EPSILON_GENERAL: f64 = 1e-6;

/// Tolerance for matching a top face against a base in the Z-plane.
///
/// Two faces closer than this are treated as touching for support purposes.
pub const EPSILON_HEIGHT: f64 = 0.01;

/// Represents a 3D vector or point in space.
///
/// # Examples
/// ```
/// use container_loader::types::Vec3;
///
/// let position = Vec3::new(1.0, 2.0, 3.0);
/// let dimensions = Vec3::new(10.0, 20.0, 30.0);
/// let far_corner = position + dimensions;
/// assert_eq!(far_corner, Vec3::new(11.0, 22.0, 33.0));
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Creates a new 3D vector.
    ///
    /// # Parameters
    /// * `x` - X component (length)
    /// * `y` - Y component (width)
    /// * `z` - Z component (height)
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Creates a zero vector (origin).
    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// (length, width, height) tuple, as used by the constructors.
    #[inline]
    pub const fn as_tuple(&self) -> (f64, f64, f64) {
        (self.x, self.y, self.z)
    }

    /// Component by axis index (0 = x, 1 = y, anything else = z).
    #[inline]
    pub const fn axis(&self, index: usize) -> f64 {
        match index {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Copy with the component at `index` replaced (0 = x, 1 = y, anything else = z).
    #[inline]
    pub const fn with_axis(&self, index: usize, value: f64) -> Self {
        match index {
            0 => Self::new(value, self.y, self.z),
            1 => Self::new(self.x, value, self.z),
            _ => Self::new(self.x, self.y, value),
        }
    }

    /// Calculates the volume (product of all components).
    #[inline]
    pub fn volume(&self) -> f64 {
        self.x * self.y * self.z
    }

    /// Calculates the base area (X × Y product).
    #[inline]
    pub fn base_area(&self) -> f64 {
        self.x * self.y
    }

    /// Euclidean length, i.e. the distance from the origin.
    #[inline]
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Smallest component.
    #[inline]
    pub fn min_component(&self) -> f64 {
        self.x.min(self.y).min(self.z)
    }

    /// Largest component.
    #[inline]
    pub fn max_component(&self) -> f64 {
        self.x.max(self.y).max(self.z)
    }

    /// Checks if the vector fits within another vector (component-wise <=).
    ///
    /// # Parameters
    /// * `container` - The outer vector (e.g., container dimensions)
    /// * `tolerance` - Numerical tolerance for the comparison
    #[inline]
    pub fn fits_within(&self, container: &Self, tolerance: f64) -> bool {
        self.x <= container.x + tolerance
            && self.y <= container.y + tolerance
            && self.z <= container.z + tolerance
    }

    /// Lexicographic total order on (x, y, z).
    pub fn total_cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.x
            .total_cmp(&other.x)
            .then_with(|| self.y.total_cmp(&other.y))
            .then_with(|| self.z.total_cmp(&other.z))
    }

    /// Component-wise equality within a tolerance.
    #[inline]
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.z - other.z).abs() <= tolerance
    }
}

impl Add for Vec3 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl From<(f64, f64, f64)> for Vec3 {
    #[inline]
    fn from(tuple: (f64, f64, f64)) -> Self {
        Self::new(tuple.0, tuple.1, tuple.2)
    }
}

/// Trait for objects with 3D dimensions.
pub trait Dimensional {
    /// Returns the dimensions of the object.
    fn dimensions(&self) -> Vec3;

    /// Calculates the volume.
    fn volume(&self) -> f64 {
        self.dimensions().volume()
    }

    /// Calculates the base area.
    fn base_area(&self) -> f64 {
        self.dimensions().base_area()
    }
}

/// Trait for objects with weight.
pub trait Weighted {
    /// Returns the weight in kg.
    fn weight(&self) -> f64;
}

/// Represents an Axis-Aligned Bounding Box (AABB).
///
/// Used for collision detection and footprint overlap calculation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    /// Minimum corner (position)
    pub min: Vec3,
    /// Maximum corner (position + dimensions)
    pub max: Vec3,
}

impl BoundingBox {
    /// Creates a bounding box from position and dimensions.
    #[inline]
    pub fn from_position_and_dims(position: Vec3, dims: Vec3) -> Self {
        Self {
            min: position,
            max: position + dims,
        }
    }

    /// Checks if two bounding boxes intersect.
    ///
    /// Implements the Separating Axis Theorem (SAT) for AABBs: touching faces
    /// do not count as an intersection.
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        !(self.max.x <= other.min.x
            || other.max.x <= self.min.x
            || self.max.y <= other.min.y
            || other.max.y <= self.min.y
            || self.max.z <= other.min.z
            || other.max.z <= self.min.z)
    }

    /// Calculates the overlap length in one dimension.
    #[inline]
    pub fn overlap_1d(a_min: f64, a_max: f64, b_min: f64, b_max: f64) -> f64 {
        (a_max.min(b_max) - a_min.max(b_min)).max(0.0)
    }

    /// Calculates the overlap area in the XY plane.
    #[inline]
    pub fn overlap_area_xy(&self, other: &Self) -> f64 {
        let overlap_x = Self::overlap_1d(self.min.x, self.max.x, other.min.x, other.max.x);
        let overlap_y = Self::overlap_1d(self.min.y, self.max.y, other.min.y, other.max.y);
        overlap_x * overlap_y
    }
}

/// Scalar validation shared by the model constructors.
///
/// Errors are plain messages; callers wrap them into their own error type.
pub mod validation {

    fn positive_finite(value: f64, name: &str) -> Result<(), String> {
        if value.is_nan() {
            Err(format!("{name} must not be NaN"))
        } else if value.is_infinite() {
            Err(format!("{name} must not be infinite"))
        } else if value <= 0.0 {
            Err(format!("{name} must be positive, got: {value}"))
        } else {
            Ok(())
        }
    }

    /// Validates a single length, width or height.
    pub fn validate_dimension(value: f64, name: &str) -> Result<(), String> {
        positive_finite(value, name)
    }

    /// Validates a box weight or a container weight limit.
    pub fn validate_weight(value: f64, name: &str) -> Result<(), String> {
        positive_finite(value, name)
    }

    /// Validates all three dimensions of a 3D object.
    ///
    /// # Parameters
    /// * `dims` - The dimensions to validate (length, width, height)
    /// * `owner` - Prefix for error messages, e.g. the box id
    pub fn validate_dimensions_3d(dims: (f64, f64, f64), owner: &str) -> Result<(), String> {
        validate_dimension(dims.0, &format!("{owner} length"))?;
        validate_dimension(dims.1, &format!("{owner} width"))?;
        validate_dimension(dims.2, &format!("{owner} height"))?;
        Ok(())
    }
}
