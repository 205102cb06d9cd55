//! Common traits defining the interface between the planner contract
//! and the individual search algorithms

use std::io::{Read, Write};

use enumset::{EnumSet, EnumSetType};

use crate::common::error::{PlanningError, PlanningResult};
use crate::common::types::*;
use crate::path_planning::debug_layer::{DebugLayer, LayerData, LayerKind};
use crate::utils::OccupancyGrid;

/// One kind of input change since the previous planner invocation
#[derive(EnumSetType, Debug)]
pub enum InputUpdate {
    Start,
    Goal,
    Map,
    NewMap,
}

/// Accumulated input changes handed to an algorithm
pub type InputUpdates = EnumSet<InputUpdate>;

/// Whether `updates` invalidate an incremental search session.
///
/// Only start moves and partial map edits can be absorbed incrementally.
pub fn requires_reset(updates: InputUpdates) -> bool {
    !(updates - (InputUpdate::Start | InputUpdate::Map)).is_empty()
}

/// How much work a single invocation may do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepBudget {
    #[default]
    Unlimited,
    /// Number of expansions (heap pops) allowed before returning
    /// [`PlanningError::ComputationIncomplete`]
    Steps(usize),
}

impl StepBudget {
    /// True once `done` expansions use up the budget
    pub fn exhausted(&self, done: usize) -> bool {
        match self {
            StepBudget::Unlimited => false,
            StepBudget::Steps(limit) => done >= *limit,
        }
    }
}

/// Trait implemented by every grid search algorithm.
///
/// The algorithm owns its per-cell arrays exclusively; the
/// [`crate::GridPlanner`] decides when to call it and with which updates.
pub trait PlanningAlgorithm {
    /// Display name of the algorithm
    fn name(&self) -> &'static str;

    /// Whether a finite [`StepBudget`] is honoured
    fn supports_stepping(&self) -> bool {
        false
    }

    /// (Re)allocate all per-cell state for a new map
    fn init_map(&mut self, grid: &OccupancyGrid) -> PlanningResult<()>;

    /// Absorb a partial edit. `grid` holds the new content; only cells in
    /// `region` may differ from what the algorithm saw before.
    fn update_map(&mut self, grid: &OccupancyGrid, region: GridRect);

    /// Compute a path between two in-bounds cells
    fn calculate_path(
        &mut self,
        start: GridNode,
        goal: GridNode,
        updates: InputUpdates,
        budget: StepBudget,
    ) -> PlanningResult<GridPath>;

    /// Debug layers this algorithm currently offers
    fn debug_layers(&self) -> &[DebugLayer];

    /// Row-major data for one of the offered layers
    fn debug_layer_data(&self, kind: LayerKind) -> Option<LayerData>;

    /// Human-readable dump of a cell's search state
    fn cell_details(&self, _node: GridNode) -> Option<String> {
        None
    }

    /// Write the complete search state
    fn save_state(&self, _writer: &mut dyn Write) -> PlanningResult<()> {
        Err(PlanningError::Unsupported(self.name()))
    }

    /// Restore a state written by [`PlanningAlgorithm::save_state`]
    fn load_state(&mut self, _reader: &mut dyn Read) -> PlanningResult<()> {
        Err(PlanningError::Unsupported(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_reset() {
        assert!(!requires_reset(EnumSet::empty()));
        assert!(!requires_reset(InputUpdate::Start | InputUpdate::Map));
        assert!(requires_reset(InputUpdate::Start | InputUpdate::Goal));
        assert!(requires_reset(EnumSet::only(InputUpdate::NewMap)));
    }

    #[test]
    fn test_step_budget() {
        assert!(!StepBudget::Unlimited.exhausted(usize::MAX));
        assert!(StepBudget::Steps(0).exhausted(0));
        assert!(!StepBudget::Steps(3).exhausted(2));
        assert!(StepBudget::Steps(3).exhausted(3));
    }
}
