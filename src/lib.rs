//! Placement engine for the three-dimensional container loading problem.
//!
//! Boxes are placed into a single container by one of several strategies
//! (bottom-left-fill, randomized greedy, genetic, hybrid) under a shared set
//! of physical placement rules. The [`api`] module exposes the engine over
//! HTTP.

pub mod api;
pub mod config;
pub mod constraints;
pub mod error;
pub mod geometry;
pub mod model;
pub mod optimizer;
pub mod result;
pub mod state;
pub mod types;

pub use error::{PackingError, SolverError};
pub use model::{Box3D, ConstraintFlags, Container, Group, ItemSpec, Placement, Rotation, RotationSet};
pub use optimizer::{Algorithm, LoadProblem, RunContext, Strategy, pack, solve};
pub use result::LoadResult;
