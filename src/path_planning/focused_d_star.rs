//! Focused D* incremental path planning
//!
//! D* with an A*-style focusing heuristic: open cells are ordered by
//! their path cost plus the distance to the robot. When the robot moves,
//! cached priorities are not recomputed eagerly; a growing bias `d_curr`
//! keeps them valid lower bounds and the heap root is corrected lazily.
//!
//! Reference: Stentz, A. (1995). The Focussed D* Algorithm for Real-Time
//! Replanning. IJCAI '95.

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::common::{
    requires_reset, Endpoint, GridNode, GridPath, GridRect, InputUpdates, PlanningAlgorithm,
    PlanningError, PlanningResult, StepBudget,
};
use crate::path_planning::debug_layer::{CellMark, DebugLayer, LayerData, LayerKind};
use crate::path_planning::neighborhood::NeighborhoodTable;
use crate::path_planning::open_list::{HeapItem, OpenList};
use crate::path_planning::{allocate_cells, trace_chain};
use crate::utils::OccupancyGrid;

use crate::path_planning::d_star::OBSTACLE_COST;

/// Configuration for the Focused D* planner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusedDStarConfig {
    /// Keep expanding after the start is reached on the first run, so the
    /// whole reachable map carries optimal costs
    pub full_init: bool,
}

/// Lexicographic (f, k) pair compared against path costs
type Cost = (u32, u32);

const NO_COST: Cost = (u32::MAX, u32::MAX);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListTag {
    New,
    Open,
    Closed,
}

#[derive(Debug, Clone)]
struct FocusedCell {
    pos: GridNode,
    backptr: Option<usize>,
    /// Robot cell the cached f / fB were computed against
    focus: Option<usize>,
    h: u32,
    k: u32,
    f: u32,
    fb: u32,
    list: ListTag,
    blocked: bool,
    heap_slot: usize,
}

impl FocusedCell {
    fn new_state() -> Self {
        Self {
            pos: GridNode::default(),
            backptr: None,
            focus: None,
            h: 0,
            k: 0,
            f: 0,
            fb: 0,
            list: ListTag::New,
            blocked: false,
            heap_slot: 0,
        }
    }
}

impl HeapItem for FocusedCell {
    type Key = (u32, u32, u32);

    fn key(&self) -> Self::Key {
        (self.fb, self.f, self.k)
    }

    fn heap_slot(&self) -> usize {
        self.heap_slot
    }

    fn set_heap_slot(&mut self, slot: usize) {
        self.heap_slot = slot;
    }
}

fn path_cost(edge: u32, h: u32) -> u32 {
    if edge < OBSTACLE_COST {
        edge.saturating_add(h)
    } else {
        edge
    }
}

pub struct FocusedDStarPlanner {
    config: FocusedDStarConfig,
    width: usize,
    map_cells: usize,
    cells: Vec<FocusedCell>,
    neighborhood: NeighborhoodTable,
    open: OpenList,
    robot: usize,
    /// Accumulated robot travel bias
    d_curr: u32,
    session_goal: Option<usize>,
    /// The first sweep after a reset has not reached its stop condition yet
    initial_sweep: bool,
    layers: Vec<DebugLayer>,
}

impl Default for FocusedDStarPlanner {
    fn default() -> Self {
        Self::new(FocusedDStarConfig::default())
    }
}

impl FocusedDStarPlanner {
    pub fn new(config: FocusedDStarConfig) -> Self {
        Self {
            config,
            width: 0,
            map_cells: 0,
            cells: Vec::new(),
            neighborhood: NeighborhoodTable::default(),
            open: OpenList::new(),
            robot: 0,
            d_curr: 0,
            session_goal: None,
            initial_sweep: false,
            layers: Vec::new(),
        }
    }

    pub fn full_init(&self) -> bool {
        self.config.full_init
    }

    pub fn set_full_init(&mut self, full_init: bool) {
        self.config.full_init = full_init;
    }

    /// Robot position the current priorities are focused on
    pub fn robot(&self) -> Option<GridNode> {
        self.session_goal.map(|_| self.cells[self.robot].pos)
    }

    pub fn d_curr(&self) -> u32 {
        self.d_curr
    }

    fn index_of(&self, node: GridNode) -> PlanningResult<usize> {
        let height = if self.width == 0 { 0 } else { self.cells.len() / self.width };
        if node.x < 0 || node.y < 0 || node.x as usize >= self.width || node.y as usize >= height {
            return Err(PlanningError::InvalidPosition);
        }
        Ok(node.y as usize * self.width + node.x as usize)
    }

    fn dist(&self, a: usize, b: usize) -> u32 {
        self.cells[a].pos.octile_distance(&self.cells[b].pos)
    }

    /// Path cost of a cell as seen from the robot
    fn cost_of(&self, index: usize) -> Cost {
        let h = self.cells[index].h;
        (h.saturating_add(self.dist(index, self.robot)), h)
    }

    fn edge_cost(&self, a: usize, b: usize, step: u32) -> u32 {
        if self.cells[a].blocked || self.cells[b].blocked {
            OBSTACLE_COST
        } else {
            step
        }
    }

    fn reset(&mut self, start: usize, goal: usize) {
        debug!("[FocusedDStar] reset search, goal {:?}", self.cells[goal].pos);
        self.open.reset();
        for cell in self.cells.iter_mut() {
            cell.list = ListTag::New;
            cell.backptr = None;
            cell.heap_slot = 0;
            cell.h = 0;
        }
        self.robot = start;
        self.d_curr = 0;
        let cell = &mut self.cells[goal];
        cell.h = 0;
        cell.k = 0;
        cell.f = 0;
        cell.fb = 0;
        cell.focus = None;
        cell.list = ListTag::Open;
        self.open.push(&mut self.cells, goal);
        self.session_goal = Some(goal);
        self.initial_sweep = true;
    }

    /// Heap root after correcting stale focus entries
    fn min_state(&mut self) -> Option<usize> {
        loop {
            let root = self.open.peek()?;
            if self.cells[root].focus == Some(self.robot) {
                return Some(root);
            }
            let dist = self.dist(root, self.robot);
            let cell = &mut self.cells[root];
            cell.f = cell.k.saturating_add(dist);
            cell.fb = cell.f.saturating_add(self.d_curr);
            cell.focus = Some(self.robot);
            self.open.reposition(&mut self.cells, root);
        }
    }

    fn min_val(&mut self) -> Cost {
        match self.min_state() {
            Some(i) => (self.cells[i].f, self.cells[i].k),
            None => NO_COST,
        }
    }

    fn insert(&mut self, index: usize, h_new: u32) {
        let dist = self.dist(index, self.robot);
        let d_curr = self.d_curr;
        let robot = self.robot;
        let cell = &mut self.cells[index];
        let was = cell.list;
        cell.k = match was {
            ListTag::Open => cell.k.min(h_new),
            ListTag::New => h_new,
            ListTag::Closed => cell.h.min(h_new),
        };
        cell.f = cell.k.saturating_add(dist);
        cell.fb = cell.f.saturating_add(d_curr);
        cell.h = h_new;
        cell.focus = Some(robot);
        cell.list = ListTag::Open;
        if was == ListTag::Open {
            self.open.reposition(&mut self.cells, index);
        } else {
            self.open.push(&mut self.cells, index);
        }
    }

    fn process_state(&mut self) -> Cost {
        let Some(current) = self.min_state() else {
            return NO_COST;
        };
        self.open.remove(&mut self.cells, current);
        self.cells[current].list = ListTag::Closed;
        let val: Cost = (self.cells[current].f, self.cells[current].k);
        let k_val = self.cells[current].k;

        if k_val < self.cells[current].h {
            for neighbor in self.neighborhood.neighbors(current) {
                let n = neighbor.index;
                if self.cells[n].list == ListTag::New || self.cost_of(n) > val {
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
        if k_val == h_current {
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
                let (list, backptr, h_n) = {
                    let cell = &self.cells[n];
                    (cell.list, cell.backptr, cell.h)
                };
                if list == ListTag::New || (backptr == Some(current) && h_n != via) {
                    self.cells[n].backptr = Some(current);
                    self.insert(n, via);
                } else if backptr != Some(current) {
                    if h_n > via {
                        self.insert(current, h_current);
                    } else if h_current > path_cost(edge, h_n)
                        && list == ListTag::Closed
                        && val < self.cost_of(n)
                    {
                        self.insert(n, h_n);
                    }
                }
            }
        }

        self.min_val()
    }

    fn sweep(&mut self, start: usize, budget: StepBudget) -> PlanningResult<()> {
        let mut steps = 0usize;
        while self.initial_sweep {
            if !self.config.full_init && self.cells[start].list == ListTag::Closed {
                break;
            }
            if self.open.is_empty() {
                break;
            }
            if budget.exhausted(steps) {
                return Err(PlanningError::ComputationIncomplete);
            }
            let val = self.process_state();
            steps += 1;
            if val.1 >= OBSTACLE_COST {
                break;
            }
        }
        self.initial_sweep = false;
        debug!("[FocusedDStar] initial sweep: {} states", steps);

        let cell = &self.cells[start];
        if cell.list != ListTag::Closed || cell.h >= OBSTACLE_COST {
            return Err(PlanningError::NoPathFound);
        }
        Ok(())
    }

    fn replan(&mut self, start: usize, budget: StepBudget) -> PlanningResult<()> {
        let mut steps = 0usize;
        let val = self.min_val();
        if self.cells[start].list == ListTag::New || val < self.cost_of(start) {
            while !self.open.is_empty() {
                if budget.exhausted(steps) {
                    return Err(PlanningError::ComputationIncomplete);
                }
                let val = self.process_state();
                steps += 1;
                if self.cells[start].list != ListTag::New && self.cost_of(start) <= val {
                    break;
                }
                if val.1 >= OBSTACLE_COST {
                    debug!("[FocusedDStar] FAILED: open list exhausted after {} states", steps);
                    return Err(PlanningError::NoPathFound);
                }
            }
        }
        debug!("[FocusedDStar] replanned with {} states", steps);

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

impl PlanningAlgorithm for FocusedDStarPlanner {
    fn name(&self) -> &'static str {
        "Focused D*"
    }

    fn supports_stepping(&self) -> bool {
        true
    }

    fn init_map(&mut self, grid: &OccupancyGrid) -> PlanningResult<()> {
        self.width = grid.width();
        self.map_cells = grid.len();
        self.session_goal = None;
        self.initial_sweep = false;
        self.robot = 0;
        self.d_curr = 0;
        self.cells = Vec::new();
        self.open = OpenList::new();
        let mut cells = allocate_cells(grid.len(), FocusedCell::new_state())?;
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
        trace!("[FocusedDStar] calculate: start={:?} goal={:?} updates={:?}", start, goal, updates);

        if self.cells[start_idx].blocked {
            return Err(PlanningError::BlockedEndpoint(Endpoint::Start));
        }
        if self.cells[goal_idx].blocked {
            return Err(PlanningError::BlockedEndpoint(Endpoint::Goal));
        }

        if requires_reset(updates) || self.session_goal != Some(goal_idx) {
            self.reset(start_idx, goal_idx);
        }
        if start_idx != self.robot {
            self.d_curr = self
                .d_curr
                .saturating_add(self.dist(start_idx, self.robot) + 1);
            self.robot = start_idx;
        }

        let result = if self.initial_sweep {
            self.sweep(start_idx, budget)
        } else {
            self.replan(start_idx, budget)
        };
        self.ensure_layers();
        result?;

        let chain = trace_chain(start_idx, goal_idx, self.cells.len(), |i| {
            (self.cells[i].blocked, self.cells[i].backptr)
        })?;
        debug!("[FocusedDStar] path with {} cells, cost {}", chain.len(), self.cells[start_idx].h);
        Ok(GridPath::from_cells(chain.into_iter().map(|i| self.cells[i].pos).collect()))
    }

    fn debug_layers(&self) -> &[DebugLayer] {
        &self.layers
    }

    fn debug_layer_data(&self, kind: LayerKind) -> Option<LayerData> {
        match kind {
            LayerKind::Lists => {
                let robot = Some(self.robot);
                let mut marks: Vec<CellMark> = self
                    .cells
                    .iter()
                    .map(|c| match c.list {
                        ListTag::New => CellMark::None,
                        ListTag::Closed if c.focus == robot => CellMark::Closed,
                        ListTag::Closed => CellMark::ClosedStale,
                        ListTag::Open if c.focus == robot => CellMark::Open,
                        ListTag::Open => CellMark::OpenStale,
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
            text.push_str(&format!(
                "\n - k_cost = {}, h_cost = {}, f_cost = {}, fB_cost = {}",
                cell.k, cell.h, cell.f, cell.fb
            ));
        }
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enumset::EnumSet;

    use crate::common::InputUpdate;

    fn fresh() -> InputUpdates {
        InputUpdate::NewMap | InputUpdate::Start | InputUpdate::Goal
    }

    fn planner_for(grid: &OccupancyGrid, full_init: bool) -> FocusedDStarPlanner {
        let mut planner = FocusedDStarPlanner::new(FocusedDStarConfig { full_init });
        planner.init_map(grid).unwrap();
        planner
    }

    fn closed_count(planner: &FocusedDStarPlanner) -> usize {
        match planner.debug_layer_data(LayerKind::Lists) {
            Some(LayerData::Marks(marks)) => marks
                .iter()
                .filter(|m| matches!(m, CellMark::Closed | CellMark::ClosedStale))
                .count(),
            _ => 0,
        }
    }

    #[test]
    fn test_focused_d_star_open_grid() {
        let grid = OccupancyGrid::new(8, 8);
        let mut planner = planner_for(&grid, false);
        let path = planner
            .calculate_path(GridNode::new(1, 1), GridNode::new(6, 3), fresh(), StepBudget::Unlimited)
            .unwrap();
        assert!(path.is_connected());
        assert_eq!(path.cost(), 2 * 14 + 3 * 10);
        // focusing keeps the sweep well below the full map
        assert!(closed_count(&planner) < 64);
    }

    #[test]
    fn test_focused_d_star_full_init_expands_everything() {
        let grid = OccupancyGrid::from_ascii(&["......", "..##..", "......"]).unwrap();
        let mut planner = planner_for(&grid, true);
        let path = planner
            .calculate_path(GridNode::new(0, 0), GridNode::new(5, 0), fresh(), StepBudget::Unlimited)
            .unwrap();
        assert_eq!(path.cost(), 50);
        assert_eq!(closed_count(&planner), 16);

        planner.set_full_init(false);
        assert!(!planner.full_init());
        let path = planner
            .calculate_path(GridNode::new(0, 0), GridNode::new(5, 0), fresh(), StepBudget::Unlimited)
            .unwrap();
        assert_eq!(path.cost(), 50);
        assert!(closed_count(&planner) < 16);
    }

    #[test]
    fn test_focused_d_star_robot_moves_along_path() {
        let grid = OccupancyGrid::from_ascii(&[
            "..........",
            "....#.....",
            "....#.....",
            "....#.....",
            "..........",
        ])
        .unwrap();
        let mut planner = planner_for(&grid, false);
        let goal = GridNode::new(9, 2);
        let mut path = planner
            .calculate_path(GridNode::new(0, 2), goal, fresh(), StepBudget::Unlimited)
            .unwrap();
        let total = path.cost();

        let mut walked = 0;
        while path.len() > 1 {
            let next = path.cells[1];
            walked += path.cells[0].step_cost(&next);
            path = planner
                .calculate_path(next, goal, EnumSet::only(InputUpdate::Start), StepBudget::Unlimited)
                .unwrap();
            assert_eq!(walked + path.cost(), total);
        }
        assert_eq!(planner.robot(), Some(goal));
        assert!(planner.d_curr() > 0);
    }

    #[test]
    fn test_focused_d_star_blocking_and_unblocking() {
        let mut grid = OccupancyGrid::new(9, 7);
        let mut planner = planner_for(&grid, false);
        let start = GridNode::new(1, 3);
        let goal = GridNode::new(7, 3);
        let first = planner.calculate_path(start, goal, fresh(), StepBudget::Unlimited).unwrap();
        assert_eq!(first.cost(), 60);

        let wall = GridRect::new(4, 0, 1, 6);
        grid.fill_rect(wall, true);
        planner.update_map(&grid, wall);
        let blocked = planner
            .calculate_path(start, goal, EnumSet::only(InputUpdate::Map), StepBudget::Unlimited)
            .unwrap();
        assert!(blocked.cells.iter().all(|c| !grid.is_blocked(*c)));
        assert_eq!(blocked.cost(), 14 * 3 + 14 * 3);

        grid.fill_rect(wall, false);
        planner.update_map(&grid, wall);
        let reopened = planner
            .calculate_path(start, goal, EnumSet::only(InputUpdate::Map), StepBudget::Unlimited)
            .unwrap();
        assert_eq!(reopened.cost(), 60);
    }

    #[test]
    fn test_focused_d_star_stepped_sweep_resumes() {
        let grid = OccupancyGrid::new(6, 6);
        let mut planner = planner_for(&grid, false);
        let start = GridNode::new(0, 0);
        let goal = GridNode::new(5, 5);
        assert!(matches!(
            planner.calculate_path(start, goal, fresh(), StepBudget::Steps(0)),
            Err(PlanningError::ComputationIncomplete)
        ));
        let mut calls = 0;
        let path = loop {
            calls += 1;
            match planner.calculate_path(start, goal, EnumSet::empty(), StepBudget::Steps(2)) {
                Err(PlanningError::ComputationIncomplete) => continue,
                other => break other.unwrap(),
            }
        };
        assert!(calls > 1);
        assert_eq!(path.cost(), 70);
    }

    #[test]
    fn test_focused_d_star_no_path() {
        let grid = OccupancyGrid::from_ascii(&["..#..", "..#..", "..#.."]).unwrap();
        let mut planner = planner_for(&grid, false);
        let result =
            planner.calculate_path(GridNode::new(0, 0), GridNode::new(4, 0), fresh(), StepBudget::Unlimited);
        assert!(matches!(result, Err(PlanningError::NoPathFound)));
    }
}
