//! Error types for raster_planner

use std::fmt;

use thiserror::Error;

/// Which end of the query an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Start,
    Goal,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Start => write!(f, "Start"),
            Endpoint::Goal => write!(f, "Goal"),
        }
    }
}

/// Main error type for the planners and their map boundary.
///
/// The display strings of the planning variants double as the
/// human-readable "last error" exposed by [`crate::GridPlanner`].
#[derive(Error, Debug)]
pub enum PlanningError {
    /// Cell arrays for the current map could not be allocated
    #[error("Planner memory allocation error")]
    AllocationFailure { cells: usize },

    /// A position lies outside the grid
    #[error("Invalid position")]
    InvalidPosition,

    /// Start or goal sits on a blocked cell
    #[error("{0} position blocked")]
    BlockedEndpoint(Endpoint),

    #[error("No Path found")]
    NoPathFound,

    /// Path extraction exceeded the number of cells in the grid
    #[error("Path too long")]
    PathTooLong,

    /// Greedy path extraction ran into a dead end
    #[error("Path blocked")]
    PathBlocked,

    /// A cell on the path had no successor
    #[error("Broken backpointer chain")]
    BrokenBackpointerChain,

    /// The step budget ran out; the search state is kept for resumption
    #[error("Computation incomplete")]
    ComputationIncomplete,

    #[error("Operation not supported by {0}")]
    Unsupported(&'static str),

    #[error("Invalid map: {0}")]
    InvalidMap(String),

    #[error("Invalid planner snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PlanningError {
    /// `false` for outcomes that only mean "not finished yet"
    pub fn is_failure(&self) -> bool {
        !matches!(self, PlanningError::ComputationIncomplete)
    }
}

/// Result type alias for planning operations
pub type PlanningResult<T> = Result<T, PlanningError>;
