//! raster_planner - incremental path planning on occupancy grids
//!
//! This crate provides A*, D*, Focused D* and D* Lite behind one planner
//! contract, together with the grid model, map loading and debug views
//! they share.

// Core modules
pub mod common;
pub mod utils;

// Algorithm modules
pub mod path_planning;

// Re-export common types for convenience
pub use common::{GridNode, GridPath, GridRect, Point2D, Pose2D};
pub use common::{AlgorithmKind, InputUpdate, InputUpdates, PlannerConfig, PlanningAlgorithm, StepBudget};
pub use common::{PlanningError, PlanningResult};
pub use path_planning::{GridPlanner, PlannerEvent};
pub use utils::OccupancyGrid;
