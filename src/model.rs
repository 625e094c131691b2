//! Data models for the container loading engine.
//!
//! This module defines the fundamental data structures:
//! - `Box3D`: an item to be loaded with its immutable original dimensions
//! - `ItemSpec`: a catalog line that expands into `quantity` boxes
//! - `Container`: the single destination volume
//! - `ConstraintFlags`: the four switches enabling optional rules
//! - `Placement`: a box at a position in a chosen orientation
//!
//! All structures implement the traits from the `types` module.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::error::PackingError;
use crate::types::{BoundingBox, Dimensional, Vec3, Weighted, validation};

/// Handling priority assumed when a box does not set one.
pub const DEFAULT_PRIORITY: u32 = 5;

/// Destination group assumed when a box does not set one (least urgent).
pub const DEFAULT_DESTINATION_GROUP: u32 = 99;

/// One of the six axis-aligned orientations of a box.
///
/// The discriminant is the stable rotation id used by the API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rotation {
    /// (length, width, height)
    Lwh = 0,
    /// (length, height, width)
    Lhw = 1,
    /// (width, length, height)
    Wlh = 2,
    /// (width, height, length)
    Whl = 3,
    /// (height, length, width)
    Hlw = 4,
    /// (height, width, length)
    Hwl = 5,
}

impl Rotation {
    pub const ALL: [Rotation; 6] = [
        Rotation::Lwh,
        Rotation::Lhw,
        Rotation::Wlh,
        Rotation::Whl,
        Rotation::Hlw,
        Rotation::Hwl,
    ];

    /// Stable rotation id (0..=5).
    #[inline]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Looks up a rotation by id.
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Oriented dimensions of `dims` under this rotation.
    #[inline]
    pub fn apply(self, dims: Vec3) -> Vec3 {
        let Vec3 { x: l, y: w, z: h } = dims;
        match self {
            Rotation::Lwh => Vec3::new(l, w, h),
            Rotation::Lhw => Vec3::new(l, h, w),
            Rotation::Wlh => Vec3::new(w, l, h),
            Rotation::Whl => Vec3::new(w, h, l),
            Rotation::Hlw => Vec3::new(h, l, w),
            Rotation::Hwl => Vec3::new(h, w, l),
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Rotation::Lwh => "LWH",
            Rotation::Lhw => "LHW",
            Rotation::Wlh => "WLH",
            Rotation::Whl => "WHL",
            Rotation::Hlw => "HLW",
            Rotation::Hwl => "HWL",
        };
        write!(f, "{}: {}", self.index(), label)
    }
}

/// Set of admissible rotations, stored as a bit mask over rotation ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RotationSet(u8);

impl RotationSet {
    /// All six orientations.
    pub const ALL: Self = Self(0b11_1111);

    /// Only the original orientation.
    pub const UPRIGHT: Self = Self(0b00_0001);

    /// Builds a set from raw rotation ids as received from callers.
    ///
    /// Duplicates are tolerated; ids outside 0..=5 and empty lists are rejected.
    pub fn from_indices(indices: &[i64]) -> Result<Self, PackingError> {
        if indices.is_empty() {
            return Err(PackingError::InvalidInput(
                "allowed_rotations must not be empty".to_string(),
            ));
        }
        let mut mask = 0u8;
        for &raw in indices {
            let rotation = u8::try_from(raw)
                .ok()
                .and_then(Rotation::from_index)
                .ok_or_else(|| {
                    PackingError::InvalidInput(format!(
                        "rotation id must be between 0 and 5, got: {raw}"
                    ))
                })?;
            mask |= 1 << rotation.index();
        }
        Ok(Self(mask))
    }

    /// Builds a set from rotations.
    pub fn of(rotations: &[Rotation]) -> Self {
        Self(rotations.iter().fold(0, |mask, r| mask | (1 << r.index())))
    }

    #[inline]
    pub fn contains(self, rotation: Rotation) -> bool {
        self.0 & (1 << rotation.index()) != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 & Self::ALL.0 == 0
    }

    #[inline]
    pub fn len(self) -> usize {
        (self.0 & Self::ALL.0).count_ones() as usize
    }

    /// Rotations in id order.
    pub fn iter(self) -> impl Iterator<Item = Rotation> {
        Rotation::ALL.into_iter().filter(move |r| self.contains(*r))
    }

    /// Rotation at position `n` in id order.
    pub fn nth(self, n: usize) -> Option<Rotation> {
        self.iter().nth(n)
    }
}

impl Default for RotationSet {
    fn default() -> Self {
        Self::ALL
    }
}

/// Represents one physical item to be loaded.
///
/// Optional constraint fields keep the distinction between "not set" and a
/// value, so a field without its flag can be rejected (see
/// [`Box3D::check_flags`]).
#[derive(Clone, Debug, PartialEq)]
pub struct Box3D {
    pub id: String,
    pub group: String,
    /// Original (length, width, height); never changed by placement.
    pub dims: Vec3,
    pub weight: f64,
    pub allowed_rotations: RotationSet,
    pub max_stack_weight: Option<f64>,
    pub priority: Option<u32>,
    pub destination_group: Option<u32>,
}

impl Box3D {
    /// Creates a new box with validation.
    ///
    /// # Examples
    /// ```
    /// use container_loader::model::Box3D;
    ///
    /// let box_ok = Box3D::new("crate_1", (10.0, 20.0, 30.0), 5.0);
    /// assert!(box_ok.is_ok());
    ///
    /// let box_invalid = Box3D::new("crate_2", (-10.0, 20.0, 30.0), 5.0);
    /// assert!(box_invalid.is_err());
    /// ```
    pub fn new(
        id: impl Into<String>,
        dims: (f64, f64, f64),
        weight: f64,
    ) -> Result<Self, PackingError> {
        let id = id.into();
        let group = id
            .rsplit_once('_')
            .map(|(group, _)| group.to_string())
            .unwrap_or_else(|| id.clone());
        let object = Self {
            id,
            group,
            dims: Vec3::from(dims),
            weight,
            allowed_rotations: RotationSet::ALL,
            max_stack_weight: None,
            priority: None,
            destination_group: None,
        };
        object.validate()?;
        Ok(object)
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_allowed_rotations(mut self, rotations: RotationSet) -> Self {
        self.allowed_rotations = rotations;
        self
    }

    pub fn with_max_stack_weight(mut self, max_stack_weight: f64) -> Self {
        self.max_stack_weight = Some(max_stack_weight);
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_destination_group(mut self, destination_group: u32) -> Self {
        self.destination_group = Some(destination_group);
        self
    }

    /// Effective priority; lower numbers are more important.
    #[inline]
    pub fn priority_rank(&self) -> u32 {
        self.priority.unwrap_or(DEFAULT_PRIORITY)
    }

    /// Effective destination group; lower numbers are loaded first.
    #[inline]
    pub fn destination_rank(&self) -> u32 {
        self.destination_group.unwrap_or(DEFAULT_DESTINATION_GROUP)
    }

    /// Effective maximum weight that may rest on top of this box.
    #[inline]
    pub fn stack_limit(&self) -> f64 {
        self.max_stack_weight.unwrap_or(f64::INFINITY)
    }

    /// Checks scalar fields: dimensions, weight and constraint value ranges.
    pub fn validate(&self) -> Result<(), PackingError> {
        validation::validate_dimensions_3d(self.dims.as_tuple(), &format!("Box '{}'", self.id))
            .map_err(PackingError::InvalidInput)?;
        validation::validate_weight(self.weight, &format!("Box '{}' weight", self.id))
            .map_err(PackingError::InvalidInput)?;
        if self.allowed_rotations.is_empty() {
            return Err(PackingError::InvalidInput(format!(
                "Box '{}' allows no rotation",
                self.id
            )));
        }
        if let Some(limit) = self.max_stack_weight {
            if limit.is_nan() || limit < 0.0 {
                return Err(PackingError::InvalidInput(format!(
                    "Box '{}' max_stack_weight must not be negative, got: {}",
                    self.id, limit
                )));
            }
        }
        if self.priority == Some(0) {
            return Err(PackingError::InvalidInput(format!(
                "Box '{}' priority must be at least 1",
                self.id
            )));
        }
        if let Some(group) = self.destination_group {
            if group > DEFAULT_DESTINATION_GROUP {
                return Err(PackingError::InvalidInput(format!(
                    "Box '{}' destination_group must be between 0 and {}, got: {}",
                    self.id, DEFAULT_DESTINATION_GROUP, group
                )));
            }
        }
        Ok(())
    }

    /// Rejects constraint fields whose flag is disabled.
    pub fn check_flags(&self, flags: &ConstraintFlags) -> Result<(), PackingError> {
        let missing = |field: &'static str, flag: &'static str| {
            Err(PackingError::ConstraintFieldWithoutFlag {
                box_id: self.id.clone(),
                field,
                flag,
            })
        };
        if self.priority.is_some() && !flags.enforce_priority {
            return missing("priority", "enforcePriority");
        }
        if self.max_stack_weight.is_some() && !flags.enforce_stacking {
            return missing("max_stack_weight", "enforceStacking");
        }
        if self.destination_group.is_some() && !flags.enforce_lifo {
            return missing("destination_group", "enforceLIFO");
        }
        Ok(())
    }
}

impl Dimensional for Box3D {
    fn dimensions(&self) -> Vec3 {
        self.dims
    }
}

impl Weighted for Box3D {
    fn weight(&self) -> f64 {
        self.weight
    }
}

fn default_quantity() -> u32 {
    1
}

/// A catalog line: `quantity` identical boxes of one group.
#[derive(Clone, Debug, Deserialize, ToSchema)]
#[schema(example = json!({
    "length": 53.0, "width": 53.0, "height": 76.0, "weight": 20.0,
    "quantity": 35, "group": "Spareparts"
}))]
pub struct ItemSpec {
    /// Caller-side identifier of the catalog line; not used for box ids.
    #[serde(default)]
    pub id: Option<String>,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub weight: f64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    pub group: String,
    #[serde(default)]
    pub allowed_rotations: Option<Vec<i64>>,
    #[serde(default)]
    pub max_stack_weight: Option<f64>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub destination_group: Option<i64>,
}

impl ItemSpec {
    /// Creates a catalog line with default constraint fields.
    pub fn new(group: impl Into<String>, dims: (f64, f64, f64), weight: f64, quantity: u32) -> Self {
        Self {
            id: None,
            length: dims.0,
            width: dims.1,
            height: dims.2,
            weight,
            quantity,
            group: group.into(),
            allowed_rotations: None,
            max_stack_weight: None,
            priority: None,
            destination_group: None,
        }
    }

    /// Builds the prototype box shared by every instance of this line.
    fn prototype(&self) -> Result<Box3D, PackingError> {
        if self.quantity == 0 {
            return Err(PackingError::InvalidInput(format!(
                "Item '{}' quantity must be at least 1",
                self.group
            )));
        }
        let mut proto = Box3D::new(
            self.group.clone(),
            (self.length, self.width, self.height),
            self.weight,
        )?
        .with_group(self.group.clone());
        if let Some(indices) = &self.allowed_rotations {
            proto.allowed_rotations = RotationSet::from_indices(indices)?;
        }
        proto.max_stack_weight = self.max_stack_weight;
        proto.priority = self
            .priority
            .map(|raw| {
                u32::try_from(raw).map_err(|_| {
                    PackingError::InvalidInput(format!(
                        "Item '{}' priority must be at least 1, got: {}",
                        self.group, raw
                    ))
                })
            })
            .transpose()?;
        proto.destination_group = self
            .destination_group
            .map(|raw| {
                u32::try_from(raw).map_err(|_| {
                    PackingError::InvalidInput(format!(
                        "Item '{}' destination_group must be between 0 and {}, got: {}",
                        self.group, DEFAULT_DESTINATION_GROUP, raw
                    ))
                })
            })
            .transpose()?;
        proto.validate()?;
        Ok(proto)
    }
}

/// Expands catalog lines into individual boxes.
///
/// Box ids are `"{group}_{n}"`, numbered from 1 per group across all lines.
pub fn expand_catalog(items: &[ItemSpec]) -> Result<Vec<Box3D>, PackingError> {
    let mut counters: HashMap<&str, u32> = HashMap::new();
    let mut boxes = Vec::new();
    for item in items {
        let proto = item.prototype()?;
        let counter = counters.entry(item.group.as_str()).or_insert(0);
        for _ in 0..item.quantity {
            *counter += 1;
            let mut instance = proto.clone();
            instance.id = format!("{}_{}", item.group, counter);
            boxes.push(instance);
        }
    }
    Ok(boxes)
}

/// Represents the single destination volume of a run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({"length": 591.9, "width": 234.0, "height": 238.0, "maxWeight": 18725.0}))]
pub struct Container {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub max_weight: f64,
}

impl Container {
    /// Creates a new container with validation.
    pub fn new(dims: (f64, f64, f64), max_weight: f64) -> Result<Self, PackingError> {
        let container = Self {
            length: dims.0,
            width: dims.1,
            height: dims.2,
            max_weight,
        };
        container.validate()?;
        Ok(container)
    }

    /// Checks that all dimensions and the weight limit are positive and finite.
    pub fn validate(&self) -> Result<(), PackingError> {
        validation::validate_dimensions_3d((self.length, self.width, self.height), "Container")
            .map_err(PackingError::InvalidInput)?;
        validation::validate_weight(self.max_weight, "Container max weight")
            .map_err(PackingError::InvalidInput)?;
        Ok(())
    }

    #[inline]
    pub fn dims(&self) -> Vec3 {
        Vec3::new(self.length, self.width, self.height)
    }
}

impl Dimensional for Container {
    fn dimensions(&self) -> Vec3 {
        self.dims()
    }
}

/// Switches enabling the optional rules.
///
/// A flag only enables evaluation of a rule or sort criterion; it never
/// changes geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintFlags {
    #[serde(default)]
    pub enforce_load_capacity: bool,
    #[serde(default)]
    pub enforce_stacking: bool,
    #[serde(default)]
    pub enforce_priority: bool,
    #[serde(default, rename = "enforceLIFO")]
    pub enforce_lifo: bool,
}

impl ConstraintFlags {
    /// Every rule enabled.
    pub const fn all() -> Self {
        Self {
            enforce_load_capacity: true,
            enforce_stacking: true,
            enforce_priority: true,
            enforce_lifo: true,
        }
    }
}

/// Display color of an item group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"name": "Spareparts", "color": "#4f9d69"}))]
pub struct Group {
    pub name: String,
    pub color: String,
}

impl Group {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }
}

/// A box at a position in a chosen orientation.
///
/// Carries copies of the box's weight and stack limit so constraint checks
/// need no lookups into the box list.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    /// Index of the box in the run's box list.
    pub box_index: usize,
    pub rotation: Rotation,
    /// Oriented (length, width, height).
    pub dims: Vec3,
    /// Lower-left-back corner.
    pub position: Vec3,
    pub weight: f64,
    pub stack_limit: f64,
}

impl Placement {
    /// Orients `object` with `rotation` and anchors it at `position`.
    pub fn new(box_index: usize, object: &Box3D, rotation: Rotation, position: Vec3) -> Self {
        Self {
            box_index,
            rotation,
            dims: rotation.apply(object.dims),
            position,
            weight: object.weight,
            stack_limit: object.stack_limit(),
        }
    }

    /// Same box and orientation at another position.
    #[inline]
    pub fn moved_to(&self, position: Vec3) -> Self {
        Self { position, ..*self }
    }

    #[inline]
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_position_and_dims(self.position, self.dims)
    }

    /// Z coordinate of the top face.
    #[inline]
    pub fn top_z(&self) -> f64 {
        self.position.z + self.dims.z
    }
}

impl Dimensional for Placement {
    fn dimensions(&self) -> Vec3 {
        self.dims
    }
}

impl Weighted for Placement {
    fn weight(&self) -> f64 {
        self.weight
    }
}
