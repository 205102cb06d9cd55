//! Grid path planning algorithms
//!
//! Four interchangeable planners behind [`PlanningAlgorithm`]:
//! A* (from scratch on every call) and the incremental D*, Focused D*
//! and D* Lite, all driven by the [`GridPlanner`] contract.

pub mod a_star;
pub mod d_star;
pub mod d_star_lite;
pub mod debug_layer;
pub mod focused_d_star;
pub mod neighborhood;
pub mod open_list;
pub mod planner;

pub use a_star::*;
pub use d_star::*;
pub use d_star_lite::*;
pub use debug_layer::*;
pub use focused_d_star::*;
pub use planner::*;

use crate::common::{AlgorithmKind, PlannerConfig, PlanningAlgorithm, PlanningError, PlanningResult};

/// Create the algorithm selected by `kind`
pub fn create_algorithm(kind: AlgorithmKind, config: &PlannerConfig) -> Box<dyn PlanningAlgorithm> {
    match kind {
        AlgorithmKind::AStar => Box::new(AStarPlanner::new(config.a_star.clone())),
        AlgorithmKind::DStar => Box::new(DStarPlanner::new()),
        AlgorithmKind::FocusedDStar => Box::new(FocusedDStarPlanner::new(config.focused_d_star.clone())),
        AlgorithmKind::FocusedDStarFullInit => {
            let mut fd_config = config.focused_d_star.clone();
            fd_config.full_init = true;
            Box::new(FocusedDStarPlanner::new(fd_config))
        }
        AlgorithmKind::DStarLite => Box::new(DStarLitePlanner::new()),
    }
}

/// Allocate a per-cell array, reporting failure instead of aborting
pub(crate) fn allocate_cells<T: Clone>(count: usize, value: T) -> PlanningResult<Vec<T>> {
    let mut cells = Vec::new();
    cells
        .try_reserve_exact(count)
        .map_err(|_| PlanningError::AllocationFailure { cells: count })?;
    cells.resize(count, value);
    Ok(cells)
}

/// Follow successor links from `from` until `to` is reached.
///
/// `step` returns whether a cell is blocked and its successor. The walk
/// gives up after `limit` cells, which catches cycles.
pub(crate) fn trace_chain<F>(from: usize, to: usize, limit: usize, mut step: F) -> PlanningResult<Vec<usize>>
where
    F: FnMut(usize) -> (bool, Option<usize>),
{
    let mut chain = vec![from];
    let mut current = from;
    while current != to {
        let (blocked, next) = step(current);
        if blocked {
            return Err(PlanningError::PathBlocked);
        }
        current = next.ok_or(PlanningError::BrokenBackpointerChain)?;
        chain.push(current);
        if chain.len() > limit {
            log::warn!("path extraction exceeded {} cells", limit);
            return Err(PlanningError::PathTooLong);
        }
    }
    if step(to).0 {
        return Err(PlanningError::PathBlocked);
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_chain() {
        let next = [Some(1), Some(2), None, Some(3)];
        assert_eq!(trace_chain(0, 2, 10, |i| (false, next[i])).unwrap(), vec![0, 1, 2]);
        assert_eq!(trace_chain(2, 2, 10, |i| (false, next[i])).unwrap(), vec![2]);
        assert!(matches!(
            trace_chain(0, 3, 10, |i| (false, next[i])),
            Err(PlanningError::BrokenBackpointerChain)
        ));
        assert!(matches!(
            trace_chain(3, 0, 10, |i| (false, next[i])),
            Err(PlanningError::PathTooLong)
        ));
        assert!(matches!(
            trace_chain(0, 2, 10, |i| (i == 1, next[i])),
            Err(PlanningError::PathBlocked)
        ));
    }

    #[test]
    fn test_allocate_cells() {
        let cells = allocate_cells(16, 0u32).unwrap();
        assert_eq!(cells.len(), 16);
        assert!(matches!(
            allocate_cells(usize::MAX / 2, 0u64),
            Err(PlanningError::AllocationFailure { .. })
        ));
    }

    #[test]
    fn test_obstacle_cost_reexport() {
        // only the D* sentinel is visible through the module globs
        assert_eq!(OBSTACLE_COST, d_star::OBSTACLE_COST);
        assert!(OBSTACLE_COST > u32::MAX / 3);
    }

    #[test]
    fn test_create_algorithm_names() {
        let config = PlannerConfig::default();
        let names: Vec<_> = AlgorithmKind::ALL
            .iter()
            .map(|&kind| create_algorithm(kind, &config).name())
            .collect();
        assert_eq!(names, vec!["A*", "D*", "Focused D*", "Focused D*", "D* Lite"]);
    }
}
