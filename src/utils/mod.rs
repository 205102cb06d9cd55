//! Utility modules for raster_planner

pub mod grid_map;
pub mod map_loader;
pub mod visualization;

pub use grid_map::*;
pub use map_loader::*;
pub use visualization::{colors, PathStyle, PointStyle, Visualizer};
