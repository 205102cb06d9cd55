//! D* incremental path planning
//!
//! Searches backwards from the goal. Every cell keeps a backpointer
//! towards the goal; when cells become blocked or free, RAISE and LOWER
//! waves repair only the affected part of the backpointer tree.
//!
//! Reference: Stentz, A. (1994). Optimal and Efficient Path Planning for
//! Partially-Known Environments. ICRA '94.

use log::{debug, trace};

use crate::common::{
    requires_reset, Endpoint, GridNode, GridPath, GridRect, InputUpdates, PlanningAlgorithm,
    PlanningError, PlanningResult, StepBudget,
};
use crate::path_planning::debug_layer::{CellMark, DebugLayer, LayerData, LayerKind};
use crate::path_planning::neighborhood::NeighborhoodTable;
use crate::path_planning::open_list::{HeapItem, OpenList};
use crate::path_planning::{allocate_cells, trace_chain};
use crate::utils::OccupancyGrid;

/// Traversal cost of any edge touching a blocked cell
pub(crate) const OBSTACLE_COST: u32 = 2_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListTag {
    New,
    Open,
    Closed,
}

#[derive(Debug, Clone)]
struct DStarCell {
    pos: GridNode,
    backptr: Option<usize>,
    h: u32,
    k: u32,
    list: ListTag,
    blocked: bool,
    heap_slot: usize,
}

impl DStarCell {
    fn new_state() -> Self {
        Self {
            pos: GridNode::default(),
            backptr: None,
            h: 0,
            k: 0,
            list: ListTag::New,
            blocked: false,
            heap_slot: 0,
        }
    }
}

impl HeapItem for DStarCell {
    type Key = u32;

    fn key(&self) -> u32 {
        self.k
    }

    fn heap_slot(&self) -> usize {
        self.heap_slot
    }

    fn set_heap_slot(&mut self, slot: usize) {
        self.heap_slot = slot;
    }
}

// Adds a cell cost to an edge cost unless the edge is already infinite.
fn path_cost(edge: u32, h: u32) -> u32 {
    if edge < OBSTACLE_COST {
        edge.saturating_add(h)
    } else {
        edge
    }
}

pub struct DStarPlanner {
    width: usize,
    map_cells: usize,
    cells: Vec<DStarCell>,
    neighborhood: NeighborhoodTable,
    open: OpenList,
    /// Goal of the current search session
    session_goal: Option<usize>,
    layers: Vec<DebugLayer>,
}

impl Default for DStarPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl DStarPlanner {
    pub fn new() -> Self {
        Self {
            width: 0,
            map_cells: 0,
            cells: Vec::new(),
            neighborhood: NeighborhoodTable::default(),
            open: OpenList::new(),
            session_goal: None,
            layers: Vec::new(),
        }
    }

    /// Number of cells currently on the open list
    pub fn open_len(&self) -> usize {
        self.open.len()
    }

    fn index_of(&self, node: GridNode) -> PlanningResult<usize> {
        let height = if self.width == 0 { 0 } else { self.cells.len() / self.width };
        if node.x < 0 || node.y < 0 || node.x as usize >= self.width || node.y as usize >= height {
            return Err(PlanningError::InvalidPosition);
        }
        Ok(node.y as usize * self.width + node.x as usize)
    }

    fn k_min(&self) -> u32 {
        self.open.peek().map_or(OBSTACLE_COST, |i| self.cells[i].k)
    }

    fn reset(&mut self, goal: usize) {
        debug!("[DStar] reset search, goal {:?}", self.cells[goal].pos);
        self.open.reset();
        for cell in self.cells.iter_mut() {
            cell.list = ListTag::New;
            cell.backptr = None;
            cell.heap_slot = 0;
            cell.h = 0;
        }
        let cell = &mut self.cells[goal];
        cell.h = 0;
        cell.k = 0;
        cell.list = ListTag::Open;
        self.open.push(&mut self.cells, goal);
        self.session_goal = Some(goal);
    }

    /// Put a cell on the open list with a new path cost
    fn insert(&mut self, index: usize, h_new: u32) {
        let cell = &mut self.cells[index];
        match cell.list {
            ListTag::Open => {
                cell.k = cell.k.min(h_new);
                cell.h = h_new;
                self.open.reposition(&mut self.cells, index);
            }
            ListTag::New => {
                cell.k = h_new;
                cell.h = h_new;
                cell.list = ListTag::Open;
                self.open.push(&mut self.cells, index);
            }
            ListTag::Closed => {
                cell.k = cell.h.min(h_new);
                cell.h = h_new;
                cell.list = ListTag::Open;
                self.open.push(&mut self.cells, index);
            }
        }
    }

    fn edge_cost(&self, a: usize, b: usize, step: u32) -> u32 {
        if self.cells[a].blocked || self.cells[b].blocked {
            OBSTACLE_COST
        } else {
            step
        }
    }

    /// Expand the cell with the smallest k and return the new minimum k
    fn process_state(&mut self) -> u32 {
        let Some(current) = self.open.pop(&mut self.cells) else {
            return OBSTACLE_COST;
        };
        self.cells[current].list = ListTag::Closed;
        let k_old = self.cells[current].k;

        // RAISE: try to lower h through neighbours that are already optimal
        if k_old < self.cells[current].h {
            for neighbor in self.neighborhood.neighbors(current) {
                let n = neighbor.index;
                if self.cells[n].list == ListTag::New || self.cells[n].h > k_old {
                    continue;
                }
                let h_new = path_cost(self.edge_cost(current, n, neighbor.cost), self.cells[n].h);
                if self.cells[current].h > h_new {
                    self.cells[current].h = h_new;
                    self.cells[current].backptr = Some(n);
                }
            }
        }

        let h_current = self.cells[current].h;
        if k_old == h_current {
            // LOWER: propagate the optimal cost
            for neighbor in self.neighborhood.neighbors(current) {
                let n = neighbor.index;
                let via = path_cost(self.edge_cost(current, n, neighbor.cost), h_current);
                let cell = &self.cells[n];
                if cell.list == ListTag::New
                    || cell.h > via
                    || (cell.backptr == Some(current) && cell.h != via)
                {
                    self.cells[n].backptr = Some(current);
                    self.insert(n, via);
                }
            }
        } else {
            for neighbor in self.neighborhood.neighbors(current) {
                let n = neighbor.index;
                let edge = self.edge_cost(current, n, neighbor.cost);
                let via = path_cost(edge, h_current);
                let cell = &self.cells[n];
                if cell.list == ListTag::New || (cell.backptr == Some(current) && cell.h != via) {
                    self.cells[n].backptr = Some(current);
                    self.insert(n, via);
                } else if cell.backptr != Some(current) {
                    if cell.h > via {
                        self.insert(current, h_current);
                    } else {
                        let back = path_cost(edge, cell.h);
                        if h_current > back && cell.list == ListTag::Closed && cell.h > k_old {
                            let h = cell.h;
                            self.insert(n, h);
                        }
                    }
                }
            }
        }

        self.k_min()
    }

    fn run(&mut self, start: usize, budget: StepBudget) -> PlanningResult<()> {
        let mut steps = 0usize;
        let mut k_min = self.k_min();
        if self.cells[start].list == ListTag::New || k_min < self.cells[start].h {
            loop {
                if budget.exhausted(steps) {
                    trace!("[DStar] step budget used up after {} states", steps);
                    return Err(PlanningError::ComputationIncomplete);
                }
                k_min = self.process_state();
                steps += 1;
                if self.cells[start].list != ListTag::New && k_min >= self.cells[start].h {
                    break;
                }
                if k_min >= OBSTACLE_COST {
                    debug!("[DStar] FAILED: open list exhausted after {} states", steps);
                    return Err(PlanningError::NoPathFound);
                }
            }
        }
        debug!("[DStar] processed {} states", steps);

        let cell = &self.cells[start];
        if cell.list == ListTag::New || cell.h >= OBSTACLE_COST {
            return Err(PlanningError::NoPathFound);
        }
        Ok(())
    }

    fn ensure_layers(&mut self) {
        if self.layers.is_empty() {
            self.layers.push(DebugLayer::new("Open/closed lists", 1, LayerKind::Lists));
            self.layers.push(DebugLayer::new("Backpointers", 0, LayerKind::Backpointers));
        }
    }
}

impl PlanningAlgorithm for DStarPlanner {
    fn name(&self) -> &'static str {
        "D*"
    }

    fn supports_stepping(&self) -> bool {
        true
    }

    fn init_map(&mut self, grid: &OccupancyGrid) -> PlanningResult<()> {
        self.width = grid.width();
        self.map_cells = grid.len();
        self.session_goal = None;
        self.cells = Vec::new();
        self.open = OpenList::new();
        let mut cells = allocate_cells(grid.len(), DStarCell::new_state())?;
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
            let Some(i) = grid.index(node).filter(|&i| i < self.cells.len()) else {
                continue;
            };
            let blocked = grid.is_blocked_index(i);
            if self.cells[i].blocked == blocked {
                continue;
            }
            self.cells[i].blocked = blocked;
            if self.session_goal.is_none() {
                continue;
            }
            if self.cells[i].list == ListTag::Closed {
                let h = self.cells[i].h;
                self.insert(i, h);
            }
            if !blocked {
                for neighbor in self.neighborhood.neighbors(i) {
                    let n = neighbor.index;
                    if self.cells[n].list == ListTag::Closed {
                        let h = self.cells[n].h;
                        self.insert(n, h);
                    }
                }
            }
        }
    }

    fn calculate_path(
        &mut self,
        start: GridNode,
        goal: GridNode,
        updates: InputUpdates,
        budget: StepBudget,
    ) -> PlanningResult<GridPath> {
        if self.cells.len() != self.map_cells {
            return Err(PlanningError::AllocationFailure { cells: self.map_cells });
        }
        let start_idx = self.index_of(start)?;
        let goal_idx = self.index_of(goal)?;
        trace!("[DStar] calculate: start={:?} goal={:?} updates={:?}", start, goal, updates);

        if self.cells[start_idx].blocked {
            return Err(PlanningError::BlockedEndpoint(Endpoint::Start));
        }
        if self.cells[goal_idx].blocked {
            return Err(PlanningError::BlockedEndpoint(Endpoint::Goal));
        }

        if requires_reset(updates) || self.session_goal != Some(goal_idx) {
            self.reset(goal_idx);
        }

        let result = self.run(start_idx, budget);
        self.ensure_layers();
        result?;

        let chain = trace_chain(start_idx, goal_idx, self.cells.len(), |i| {
            (self.cells[i].blocked, self.cells[i].backptr)
        })?;
        debug!("[DStar] path with {} cells, cost {}", chain.len(), self.cells[start_idx].h);
        Ok(GridPath::from_cells(chain.into_iter().map(|i| self.cells[i].pos).collect()))
    }

    fn debug_layers(&self) -> &[DebugLayer] {
        &self.layers
    }

    fn debug_layer_data(&self, kind: LayerKind) -> Option<LayerData> {
        match kind {
            LayerKind::Lists => {
                let mut marks: Vec<CellMark> = self
                    .cells
                    .iter()
                    .map(|c| match c.list {
                        ListTag::New => CellMark::None,
                        ListTag::Closed => CellMark::Closed,
                        ListTag::Open if c.k >= OBSTACLE_COST => CellMark::OpenRaise,
                        ListTag::Open => CellMark::Open,
                    })
                    .collect();
                if let Some(root) = self.open.peek() {
                    marks[root] = CellMark::Next;
                }
                Some(LayerData::Marks(marks))
            }
            LayerKind::Backpointers => Some(LayerData::Backpointers(
                self.cells
                    .iter()
                    .map(|c| match c.list {
                        ListTag::New => None,
                        _ => c.backptr.map(|b| self.cells[b].pos),
                    })
                    .collect(),
            )),
            _ => None,
        }
    }

    fn cell_details(&self, node: GridNode) -> Option<String> {
        let cell = &self.cells[self.index_of(node).ok()?];
        let mut text = format!("Cell ({}, {})", node.x, node.y);
        if cell.blocked {
            text.push_str("\n - blocked");
        }
        let list = match cell.list {
            ListTag::New => "NEW",
            ListTag::Open => "OPEN",
            ListTag::Closed => "CLOSED",
        };
        text.push_str(&format!("\n - List = {}", list));
        if cell.list != ListTag::New {
            text.push_str(&format!("\n - k_cost = {}, h_cost = {}", cell.k, cell.h));
        }
        Some(text)
    }
}
