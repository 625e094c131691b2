//! External result contract of a loading run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::model::Group;
use crate::optimizer::{LoadProblem, PackOutcome};

/// Color used for boxes whose group has no configured color.
pub const DEFAULT_COLOR: &str = "#cccccc";

/// Placed and unplaced boxes of a finished run.
///
/// # Fields
/// * `fill_rate` - Occupied share of the container volume in percent (0 to 100)
/// * `total_weight` - Sum of the placed boxes' weights
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadResult {
    pub fill_rate: f64,
    pub total_weight: f64,
    pub placed_items: Vec<PlacedItem>,
    pub unplaced_items: Vec<UnplacedItem>,
}

/// A placed box with its oriented dimensions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "Spareparts_1", "x": 0.0, "y": 0.0, "z": 0.0,
    "length": 53.0, "width": 53.0, "height": 76.0,
    "weight": 20.0, "color": "#4f9d69", "rotation": 0
}))]
pub struct PlacedItem {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub weight: f64,
    pub color: String,
    /// Rotation id (0 to 5) applied to the original dimensions
    pub rotation: u8,
}

/// A box that could not be placed, with its original dimensions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnplacedItem {
    pub id: String,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub weight: f64,
    pub group: String,
    pub reason_code: String,
    pub reason: String,
}

impl LoadResult {
    /// Converts a finished run into the external contract.
    pub fn assemble(problem: &LoadProblem, outcome: &PackOutcome, groups: &[Group]) -> Self {
        let colors: HashMap<&str, &str> = groups
            .iter()
            .map(|g| (g.name.as_str(), g.color.as_str()))
            .collect();
        let boxes = problem.boxes();

        let placed_items = outcome
            .state
            .placed
            .iter()
            .filter_map(|placement| {
                let object = boxes.get(placement.box_index)?;
                Some(PlacedItem {
                    id: object.id.clone(),
                    x: placement.position.x,
                    y: placement.position.y,
                    z: placement.position.z,
                    length: placement.dims.x,
                    width: placement.dims.y,
                    height: placement.dims.z,
                    weight: object.weight,
                    color: colors
                        .get(object.group.as_str())
                        .copied()
                        .unwrap_or(DEFAULT_COLOR)
                        .to_string(),
                    rotation: placement.rotation.index(),
                })
            })
            .collect();

        let unplaced_items = outcome
            .unplaced
            .iter()
            .filter_map(|unplaced| {
                let object = boxes.get(unplaced.box_index)?;
                Some(UnplacedItem {
                    id: object.id.clone(),
                    length: object.dims.x,
                    width: object.dims.y,
                    height: object.dims.z,
                    weight: object.weight,
                    group: object.group.clone(),
                    reason_code: unplaced.reason.code().to_string(),
                    reason: unplaced.reason.to_string(),
                })
            })
            .collect();

        Self {
            fill_rate: outcome.state.fill_rate(),
            total_weight: outcome.state.total_weight,
            placed_items,
            unplaced_items,
        }
    }

    /// Returns whether every box was placed.
    pub fn is_complete(&self) -> bool {
        self.unplaced_items.is_empty()
    }
}
