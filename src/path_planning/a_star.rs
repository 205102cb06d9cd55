//! A* path planning on an 8-connected occupancy grid
//!
//! Non-incremental: every call searches from scratch, reusing only the
//! allocated cell array. With the default octile heuristic the returned
//! paths are optimal for the 10/14 cost model.
//!
//! Reference: Hart, P. E., Nilsson, N. J., & Raphael, B. (1968). A Formal
//! Basis for the Heuristic Determination of Minimum Cost Paths.

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::common::{
    Endpoint, GridNode, GridPath, GridRect, InputUpdates, PlanningAlgorithm, PlanningError,
    PlanningResult, StepBudget,
};
use crate::path_planning::debug_layer::{CellMark, DebugLayer, LayerData, LayerKind};
use crate::path_planning::neighborhood::NeighborhoodTable;
use crate::path_planning::open_list::{HeapItem, OpenList};
use crate::path_planning::{allocate_cells, trace_chain};
use crate::utils::OccupancyGrid;

/// Distance estimate used to order the open list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Heuristic {
    /// Exact free-space cost, admissible and consistent
    #[default]
    Octile,
    /// 10 * (|dx| + |dy|); overestimates diagonals, so paths may be suboptimal
    Manhattan,
}

/// Configuration for the A* planner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AStarConfig {
    pub heuristic: Heuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListTag {
    Unvisited,
    Open,
    Closed,
}

#[derive(Debug, Clone)]
struct AStarCell {
    pos: GridNode,
    parent: Option<usize>,
    g: u32,
    f: u32,
    list: ListTag,
    blocked: bool,
    heap_slot: usize,
}

impl AStarCell {
    fn free() -> Self {
        Self {
            pos: GridNode::default(),
            parent: None,
            g: 0,
            f: 0,
            list: ListTag::Unvisited,
            blocked: false,
            heap_slot: 0,
        }
    }
}

impl HeapItem for AStarCell {
    type Key = u32;

    fn key(&self) -> u32 {
        self.f
    }

    fn heap_slot(&self) -> usize {
        self.heap_slot
    }

    fn set_heap_slot(&mut self, slot: usize) {
        self.heap_slot = slot;
    }
}

pub struct AStarPlanner {
    config: AStarConfig,
    width: usize,
    map_cells: usize,
    cells: Vec<AStarCell>,
    neighborhood: NeighborhoodTable,
    open: OpenList,
    layers: Vec<DebugLayer>,
}

impl AStarPlanner {
    pub fn new(config: AStarConfig) -> Self {
        Self {
            config,
            width: 0,
            map_cells: 0,
            cells: Vec::new(),
            neighborhood: NeighborhoodTable::default(),
            open: OpenList::new(),
            layers: Vec::new(),
        }
    }

    pub fn config(&self) -> &AStarConfig {
        &self.config
    }

    fn heuristic(&self, a: GridNode, b: GridNode) -> u32 {
        match self.config.heuristic {
            Heuristic::Octile => a.octile_distance(&b),
            Heuristic::Manhattan => a.manhattan_distance(&b),
        }
    }

    fn index_of(&self, node: GridNode) -> PlanningResult<usize> {
        let height = if self.width == 0 { 0 } else { self.cells.len() / self.width };
        if node.x < 0 || node.y < 0 || node.x as usize >= self.width || node.y as usize >= height {
            return Err(PlanningError::InvalidPosition);
        }
        Ok(node.y as usize * self.width + node.x as usize)
    }

    /// Run a full search between two cells
    pub fn plan(&mut self, start: GridNode, goal: GridNode) -> PlanningResult<GridPath> {
        if self.cells.len() != self.map_cells {
            return Err(PlanningError::AllocationFailure { cells: self.map_cells });
        }
        let start_idx = self.index_of(start)?;
        let goal_idx = self.index_of(goal)?;
        trace!("[AStar] plan: start={:?} goal={:?}", start, goal);

        if self.cells[goal_idx].blocked {
            debug!("[AStar] FAILED: goal {:?} blocked", goal);
            return Err(PlanningError::BlockedEndpoint(Endpoint::Goal));
        }
        if self.cells[start_idx].blocked {
            debug!("[AStar] FAILED: start {:?} blocked", start);
            return Err(PlanningError::BlockedEndpoint(Endpoint::Start));
        }

        self.open.reset();
        for cell in self.cells.iter_mut().filter(|c| !c.blocked) {
            cell.list = ListTag::Unvisited;
            cell.parent = None;
            cell.heap_slot = 0;
        }
        if self.layers.is_empty() {
            self.layers.push(DebugLayer::new("Visited cells", 1, LayerKind::Visited));
        }

        let h_start = self.heuristic(start, goal);
        let cell = &mut self.cells[start_idx];
        cell.g = 0;
        cell.f = h_start;
        cell.list = ListTag::Open;
        self.open.push(&mut self.cells, start_idx);

        let mut expansions = 0usize;
        while let Some(current) = self.open.pop(&mut self.cells) {
            self.cells[current].list = ListTag::Closed;
            expansions += 1;
            if current == goal_idx {
                break;
            }

            let g_current = self.cells[current].g;
            for neighbor in self.neighborhood.neighbors(current) {
                let n = neighbor.index;
                if self.cells[n].blocked {
                    continue;
                }
                let g_new = g_current + neighbor.cost;
                match self.cells[n].list {
                    ListTag::Closed => continue,
                    ListTag::Unvisited => {
                        let h = self.heuristic(self.cells[n].pos, goal);
                        let cell = &mut self.cells[n];
                        cell.g = g_new;
                        cell.f = g_new + h;
                        cell.parent = Some(current);
                        cell.list = ListTag::Open;
                        self.open.push(&mut self.cells, n);
                    }
                    ListTag::Open => {
                        if g_new < self.cells[n].g {
                            let cell = &mut self.cells[n];
                            cell.f = cell.f - cell.g + g_new;
                            cell.g = g_new;
                            cell.parent = Some(current);
                            self.open.reposition(&mut self.cells, n);
                        }
                    }
                }
            }
        }

        if self.cells[goal_idx].list != ListTag::Closed {
            debug!("[AStar] FAILED: no path after {} expansions", expansions);
            return Err(PlanningError::NoPathFound);
        }

        let mut indices = trace_chain(goal_idx, start_idx, self.cells.len(), |i| {
            (false, self.cells[i].parent)
        })?;
        indices.reverse();
        debug!(
            "[AStar] SUCCESS: {} cells, cost {}, {} expansions",
            indices.len(),
            self.cells[goal_idx].g,
            expansions
        );
        Ok(GridPath::from_cells(indices.into_iter().map(|i| self.cells[i].pos).collect()))
    }
}

impl Default for AStarPlanner {
    fn default() -> Self {
        Self::new(AStarConfig::default())
    }
}

impl PlanningAlgorithm for AStarPlanner {
    fn name(&self) -> &'static str {
        "A*"
    }

    fn init_map(&mut self, grid: &OccupancyGrid) -> PlanningResult<()> {
        self.width = grid.width();
        self.map_cells = grid.len();
        self.cells = Vec::new();
        self.open = OpenList::new();
        let mut cells = allocate_cells(grid.len(), AStarCell::free())?;
        for (i, cell) in cells.iter_mut().enumerate() {
            cell.pos = grid.node(i);
            cell.blocked = grid.is_blocked_index(i);
        }
        self.cells = cells;
        self.neighborhood = NeighborhoodTable::new(grid.width(), grid.height());
        self.open = OpenList::with_capacity(grid.len());
        Ok(())
    }

    fn update_map(&mut self, grid: &OccupancyGrid, region: GridRect) {
        for node in region.cells() {
            if let Some(i) = grid.index(node) {
                if let Some(cell) = self.cells.get_mut(i) {
                    cell.blocked = grid.is_blocked_index(i);
                    cell.list = ListTag::Unvisited;
                }
            }
        }
    }

    fn calculate_path(
        &mut self,
        start: GridNode,
        goal: GridNode,
        _updates: InputUpdates,
        _budget: StepBudget,
    ) -> PlanningResult<GridPath> {
        self.plan(start, goal)
    }

    fn debug_layers(&self) -> &[DebugLayer] {
        &self.layers
    }

    fn debug_layer_data(&self, kind: LayerKind) -> Option<LayerData> {
        match kind {
            LayerKind::Visited => Some(LayerData::Marks(
                self.cells
                    .iter()
                    .map(|c| match c.list {
                        ListTag::Unvisited => CellMark::None,
                        _ if c.blocked => CellMark::None,
                        _ => CellMark::Visited,
                    })
                    .collect(),
            )),
            _ => None,
        }
    }
}
