//! Common types, traits, configuration and error definitions for raster_planner
//!
//! This module provides the foundational building blocks shared by the
//! planner contract and all search algorithms in this crate.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::*;
pub use traits::*;
pub use types::*;
