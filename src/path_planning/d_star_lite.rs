//! D* Lite incremental path planning
//!
//! Searches backwards from the goal with one-step lookahead values (rhs).
//! Robot moves are absorbed through the key modifier `k_m` instead of
//! reordering the open list; map edits only touch the edited cells and
//! their neighbours.
//!
//! Reference: Koenig, S., & Likhachev, M. (2002). D* Lite. AAAI-02.

use std::io::{BufReader, BufWriter, Read, Write};

use log::{debug, info, trace, warn};

use crate::common::{
    requires_reset, Endpoint, GridNode, GridPath, GridRect, InputUpdates, PlanningAlgorithm,
    PlanningError, PlanningResult, StepBudget,
};
use crate::path_planning::allocate_cells;
use crate::path_planning::debug_layer::{CellMark, CostPair, DebugLayer, LayerData, LayerKind};
use crate::path_planning::neighborhood::NeighborhoodTable;
use crate::path_planning::open_list::{HeapItem, OpenList};
use crate::utils::OccupancyGrid;

/// Infinite g / rhs value; leaves room for heuristic and `k_m` on top
const OBSTACLE_COST: u32 = u32::MAX - 10_000_000;

// Snapshot format constants
const SNAPSHOT_MAGIC: u32 = 0x44534C54; // "DSLT"
const SNAPSHOT_VERSION: u32 = 1;
const NO_CELL: u32 = u32::MAX;

/// Priority of a cell on the open list, ordered lexicographically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Key {
    pub k1: u32,
    pub k2: u32,
}

impl Key {
    pub fn new(k1: u32, k2: u32) -> Self {
        Self { k1, k2 }
    }
}

#[derive(Debug, Clone)]
struct LiteCell {
    pos: GridNode,
    g: u32,
    rhs: u32,
    key: Key,
    blocked: bool,
    heap_slot: usize,
}

impl LiteCell {
    fn infinite() -> Self {
        Self {
            pos: GridNode::default(),
            g: OBSTACLE_COST,
            rhs: OBSTACLE_COST,
            key: Key::default(),
            blocked: false,
            heap_slot: 0,
        }
    }
}

impl HeapItem for LiteCell {
    type Key = Key;

    fn key(&self) -> Key {
        self.key
    }

    fn heap_slot(&self) -> usize {
        self.heap_slot
    }

    fn set_heap_slot(&mut self, slot: usize) {
        self.heap_slot = slot;
    }
}

// Adds a step cost to a finite cost; infinite stays infinite.
fn add_cost(g: u32, step: u32) -> u32 {
    if g < OBSTACLE_COST {
        g.saturating_add(step).min(OBSTACLE_COST)
    } else {
        g
    }
}

/// Session header and occupancy stored in a D* Lite snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub start: Option<GridNode>,
    pub goal: Option<GridNode>,
    pub robot: Option<GridNode>,
    pub k_m: u32,
    pub grid: OccupancyGrid,
}

pub struct DStarLitePlanner {
    width: usize,
    map_cells: usize,
    cells: Vec<LiteCell>,
    neighborhood: NeighborhoodTable,
    open: OpenList,
    k_m: u32,
    start: Option<usize>,
    robot: Option<usize>,
    /// Goal of the current search session
    session_goal: Option<usize>,
    /// Cells popped during the last call
    touched: Vec<bool>,
    layers: Vec<DebugLayer>,
}

impl Default for DStarLitePlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl DStarLitePlanner {
    pub fn new() -> Self {
        Self {
            width: 0,
            map_cells: 0,
            cells: Vec::new(),
            neighborhood: NeighborhoodTable::default(),
            open: OpenList::new(),
            k_m: 0,
            start: None,
            robot: None,
            session_goal: None,
            touched: Vec::new(),
            layers: Vec::new(),
        }
    }

    /// Accumulated key modifier of the current session
    pub fn k_m(&self) -> u32 {
        self.k_m
    }

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

    fn calculate_key(&self, index: usize) -> Key {
        let cell = &self.cells[index];
        let k2 = cell.g.min(cell.rhs);
        let h = self
            .start
            .map_or(0, |s| cell.pos.octile_distance(&self.cells[s].pos));
        Key::new(k2.saturating_add(h).saturating_add(self.k_m), k2)
    }

    fn update_vertex(&mut self, index: usize) {
        if self.cells[index].g != self.cells[index].rhs {
            self.cells[index].key = self.calculate_key(index);
            self.open.push(&mut self.cells, index);
        } else {
            self.open.remove(&mut self.cells, index);
        }
    }

    /// Smallest `g + step` over the free neighbours of `index`
    fn best_rhs(&self, index: usize) -> u32 {
        self.neighborhood
            .neighbors(index)
            .filter(|n| !self.cells[n.index].blocked)
            .map(|n| add_cost(self.cells[n.index].g, n.cost))
            .min()
            .unwrap_or(OBSTACLE_COST)
            .min(OBSTACLE_COST)
    }

    fn reset(&mut self, goal: usize) {
        debug!("[DStarLite] reset search, goal {:?}", self.cells[goal].pos);
        self.open.reset();
        for cell in self.cells.iter_mut() {
            cell.heap_slot = 0;
            cell.g = OBSTACLE_COST;
            cell.rhs = OBSTACLE_COST;
        }
        self.k_m = 0;
        self.robot = self.start;
        self.cells[goal].rhs = 0;
        self.cells[goal].key = self.calculate_key(goal);
        self.open.push(&mut self.cells, goal);
        self.session_goal = Some(goal);
    }

    fn compute_shortest_path(&mut self, start: usize, budget: StepBudget) -> PlanningResult<()> {
        let goal = self.session_goal.ok_or(PlanningError::NoPathFound)?;
        let mut steps = 0usize;
        while let Some(current) = self.open.peek() {
            let start_cell = &self.cells[start];
            let k2_start = start_cell.g.min(start_cell.rhs);
            let start_key = Key::new(k2_start.saturating_add(self.k_m), k2_start);
            if !(self.cells[current].key < start_key || start_cell.rhs != start_cell.g) {
                break;
            }
            if budget.exhausted(steps) {
                trace!("[DStarLite] step budget used up after {} pops", steps);
                return Err(PlanningError::ComputationIncomplete);
            }
            steps += 1;
            self.touched[current] = true;

            let correct_key = self.calculate_key(current);
            if self.cells[current].key < correct_key {
                self.cells[current].key = correct_key;
                self.open.reposition(&mut self.cells, current);
            } else if self.cells[current].g > self.cells[current].rhs {
                // overconsistent: settle g and lower the neighbours
                self.cells[current].g = self.cells[current].rhs;
                self.open.remove(&mut self.cells, current);
                if self.cells[current].blocked {
                    continue;
                }
                let g = self.cells[current].g;
                for neighbor in self.neighborhood.neighbors(current) {
                    let n = neighbor.index;
                    if self.cells[n].blocked || n == goal {
                        continue;
                    }
                    let via = add_cost(g, neighbor.cost);
                    if self.cells[n].rhs > via {
                        self.cells[n].rhs = via;
                        self.update_vertex(n);
                    }
                }
            } else {
                // underconsistent: raise g and recompute everything that
                // depended on the old value
                let g_old = self.cells[current].g;
                self.cells[current].g = OBSTACLE_COST;
                let dependents = std::iter::once((current, 0)).chain(
                    self.neighborhood
                        .neighbors(current)
                        .map(|n| (n.index, n.cost)),
                );
                for (n, cost) in dependents {
                    if self.cells[n].blocked || n == goal {
                        if n == current {
                            self.open.remove(&mut self.cells, current);
                        }
                        continue;
                    }
                    if n == current || self.cells[n].rhs == add_cost(g_old, cost) {
                        self.cells[n].rhs = self.best_rhs(n);
                    }
                    self.update_vertex(n);
                }
            }
        }
        trace!("[DStarLite] {} pops, {} cells open", steps, self.open.len());
        Ok(())
    }

    fn extract_path(&self, start: usize, goal: usize) -> PlanningResult<GridPath> {
        if self.cells[start].rhs >= OBSTACLE_COST {
            debug!("[DStarLite] FAILED: start unreachable");
            return Err(PlanningError::NoPathFound);
        }
        let mut cells = vec![self.cells[start].pos];
        let mut current = start;
        while current != goal {
            if cells.len() > self.cells.len() {
                warn!("[DStarLite] path extraction exceeded {} cells", self.cells.len());
                return Err(PlanningError::PathTooLong);
            }
            current = self.greedy_successor(current).ok_or(PlanningError::PathBlocked)?;
            cells.push(self.cells[current].pos);
        }
        debug!("[DStarLite] path with {} cells, cost {}", cells.len(), self.cells[start].rhs);
        Ok(GridPath::from_cells(cells))
    }

    /// Free neighbour minimising `g + step`, the implicit backpointer
    fn greedy_successor(&self, index: usize) -> Option<usize> {
        let mut best = None;
        let mut min_cost = OBSTACLE_COST;
        for neighbor in self.neighborhood.neighbors(index) {
            let cell = &self.cells[neighbor.index];
            if cell.blocked || cell.g >= OBSTACLE_COST {
                continue;
            }
            let cost = cell.g + neighbor.cost;
            if cost < min_cost {
                min_cost = cost;
                best = Some(neighbor.index);
            }
        }
        best
    }

    fn ensure_layers(&mut self) {
        if self.layers.is_empty() {
            self.layers.push(DebugLayer::new("Lists (open / touched)", 1, LayerKind::Lists));
            self.layers.push(
                DebugLayer::new("Backpointers", 1, LayerKind::Backpointers)
                    .with_minimum_zoom_factor(6.0),
            );
            self.layers.push(
                DebugLayer::new("Costs (g / rhs)", 1, LayerKind::Costs)
                    .with_minimum_zoom_factor(16.0),
            );
        }
    }
}

fn write_u32<W: Write>(writer: &mut W, value: u32) -> std::io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn read_u32<R: Read>(reader: &mut R) -> std::io::Result<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u8<R: Read>(reader: &mut R) -> std::io::Result<u8> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    Ok(byte[0])
}

struct SnapshotHeader {
    width: usize,
    height: usize,
    k_m: u32,
    start: u32,
    goal: u32,
    robot: u32,
}

fn read_header<R: Read>(reader: &mut R) -> PlanningResult<SnapshotHeader> {
    let magic = read_u32(reader)?;
    if magic != SNAPSHOT_MAGIC {
        return Err(PlanningError::InvalidSnapshot("invalid magic number".to_string()));
    }
    let version = read_u32(reader)?;
    if version != SNAPSHOT_VERSION {
        return Err(PlanningError::InvalidSnapshot(format!(
            "unsupported version: {}",
            version
        )));
    }
    Ok(SnapshotHeader {
        width: read_u32(reader)? as usize,
        height: read_u32(reader)? as usize,
        k_m: read_u32(reader)?,
        start: read_u32(reader)?,
        goal: read_u32(reader)?,
        robot: read_u32(reader)?,
    })
}

impl SnapshotHeader {
    fn cell_count(&self) -> PlanningResult<usize> {
        let max = i32::MAX as usize;
        match self.width.checked_mul(self.height) {
            Some(cells) if self.width <= max && self.height <= max => Ok(cells),
            _ => Err(PlanningError::InvalidSnapshot(format!(
                "invalid dimensions {}x{}",
                self.width, self.height
            ))),
        }
    }
}

fn checked_cell(raw: u32, cells: usize) -> PlanningResult<Option<usize>> {
    match raw {
        NO_CELL => Ok(None),
        i if (i as usize) < cells => Ok(Some(i as usize)),
        i => Err(PlanningError::InvalidSnapshot(format!("cell index {} out of range", i))),
    }
}

/// Read a snapshot written by [`DStarLitePlanner`], keeping only the
/// session header and the occupancy of every cell
pub fn read_snapshot<R: Read>(reader: R) -> PlanningResult<StateSnapshot> {
    let mut reader = BufReader::new(reader);
    let header = read_header(&mut reader)?;
    let cells = header.cell_count()?;
    // grown per record so a corrupt header runs into end of file first
    let mut blocked = Vec::new();
    for _ in 0..cells {
        // g, rhs, k1, k2, heap slot
        for _ in 0..5 {
            read_u32(&mut reader)?;
        }
        blocked.push(read_u8(&mut reader)? != 0);
    }
    let grid = OccupancyGrid::from_cells(header.width, header.height, blocked)
        .map_err(|e| PlanningError::InvalidSnapshot(e.to_string()))?;
    let node_of = |raw: u32| -> PlanningResult<Option<GridNode>> {
        Ok(checked_cell(raw, cells)?.map(|i| grid.node(i)))
    };
    let start = node_of(header.start)?;
    let goal = node_of(header.goal)?;
    let robot = node_of(header.robot)?;
    Ok(StateSnapshot {
        start,
        goal,
        robot,
        k_m: header.k_m,
        grid,
    })
}

/// Occupancy stored in a snapshot
pub fn read_snapshot_map<R: Read>(reader: R) -> PlanningResult<OccupancyGrid> {
    Ok(read_snapshot(reader)?.grid)
}

impl PlanningAlgorithm for DStarLitePlanner {
    fn name(&self) -> &'static str {
        "D* Lite"
    }

    fn supports_stepping(&self) -> bool {
        true
    }

    fn init_map(&mut self, grid: &OccupancyGrid) -> PlanningResult<()> {
        self.width = grid.width();
        self.map_cells = grid.len();
        self.session_goal = None;
        self.start = None;
        self.robot = None;
        self.k_m = 0;
        self.cells = Vec::new();
        self.touched = Vec::new();
        self.open = OpenList::new();
        let mut cells = allocate_cells(grid.len(), LiteCell::infinite())?;
        for (i, cell) in cells.iter_mut().enumerate() {
            cell.pos = grid.node(i);
            cell.blocked = grid.is_blocked_index(i);
        }
        self.touched = allocate_cells(grid.len(), false)?;
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
            let Some(goal) = self.session_goal else {
                continue;
            };

            if blocked {
                for neighbor in self.neighborhood.neighbors(i) {
                    let n = neighbor.index;
                    if n == goal || self.cells[n].blocked {
                        continue;
                    }
                    let rhs = self.best_rhs(n);
                    if self.cells[n].rhs != rhs {
                        self.cells[n].rhs = rhs;
                        self.update_vertex(n);
                    }
                }
                self.cells[i].g = OBSTACLE_COST;
                self.cells[i].rhs = OBSTACLE_COST;
                self.update_vertex(i);
            } else {
                let g_cell = self.cells[i].g;
                let mut cell_rhs = self.cells[i].rhs;
                for neighbor in self.neighborhood.neighbors(i) {
                    let n = neighbor.index;
                    if self.cells[n].blocked {
                        continue;
                    }
                    cell_rhs = cell_rhs.min(add_cost(self.cells[n].g, neighbor.cost));
                    if n == goal {
                        continue;
                    }
                    let via = add_cost(g_cell, neighbor.cost);
                    if via < self.cells[n].rhs {
                        self.cells[n].rhs = via;
                        self.update_vertex(n);
                    }
                }
                if i == goal {
                    cell_rhs = 0;
                }
                if cell_rhs < self.cells[i].rhs {
                    self.cells[i].rhs = cell_rhs;
                    self.update_vertex(i);
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
        trace!("[DStarLite] calculate: start={:?} goal={:?} updates={:?}", start, goal, updates);
        self.touched.iter_mut().for_each(|t| *t = false);
        self.start = Some(start_idx);

        if self.cells[start_idx].blocked {
            return Err(PlanningError::BlockedEndpoint(Endpoint::Start));
        }
        if self.cells[goal_idx].blocked {
            return Err(PlanningError::BlockedEndpoint(Endpoint::Goal));
        }

        if requires_reset(updates) || self.session_goal != Some(goal_idx) {
            self.reset(goal_idx);
        }

        if let Some(robot) = self.robot.filter(|&r| r != start_idx) {
            let moved = self.cells[start_idx].pos.octile_distance(&self.cells[robot].pos);
            self.k_m = self.k_m.saturating_add(moved);
            self.robot = Some(start_idx);
        }

        let result = self.compute_shortest_path(start_idx, budget);
        self.ensure_layers();
        result?;
        self.extract_path(start_idx, goal_idx)
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
                    .zip(&self.touched)
                    .map(|(c, &touched)| {
                        let consistent = c.g == c.rhs;
                        match (c.heap_slot != 0, touched, consistent) {
                            (true, _, _) if c.g < c.rhs => CellMark::OpenRaise,
                            (true, _, _) => CellMark::Open,
                            (false, true, true) => CellMark::TouchedConsistent,
                            (false, true, false) => CellMark::TouchedInconsistent,
                            (false, false, _) => CellMark::None,
                        }
                    })
                    .collect();
                if let Some(root) = self.open.peek() {
                    marks[root] = CellMark::Next;
                }
                Some(LayerData::Marks(marks))
            }
            LayerKind::Backpointers => Some(LayerData::Backpointers(
                (0..self.cells.len())
                    .map(|i| match self.session_goal {
                        Some(goal) if goal == i => None,
                        _ => self.greedy_successor(i).map(|b| self.cells[b].pos),
                    })
                    .collect(),
            )),
            LayerKind::Costs => Some(LayerData::Costs(
                self.cells
                    .iter()
                    .map(|c| CostPair {
                        g: (c.g < OBSTACLE_COST).then_some(c.g),
                        rhs: (c.rhs < OBSTACLE_COST).then_some(c.rhs),
                    })
                    .collect(),
            )),
            LayerKind::Visited => None,
        }
    }

    fn cell_details(&self, node: GridNode) -> Option<String> {
        let cell = &self.cells[self.index_of(node).ok()?];
        let cost = |value: u32| {
            if value < OBSTACLE_COST {
                value.to_string()
            } else {
                "x".to_string()
            }
        };
        Some(format!(
            "Cell x = {}, y = {}{}\n - g_cost = {}\n - rhs = {}\n - key = ({}, {})\n - heapIndex = {}",
            node.x,
            node.y,
            if cell.blocked { " (Blocked)" } else { "" },
            cost(cell.g),
            cost(cell.rhs),
            cell.key.k1,
            cell.key.k2,
            cell.heap_slot
        ))
    }

    fn save_state(&self, writer: &mut dyn Write) -> PlanningResult<()> {
        let mut writer = BufWriter::new(writer);
        let height = if self.width == 0 { 0 } else { self.cells.len() / self.width };
        let raw = |cell: Option<usize>| cell.map_or(NO_CELL, |i| i as u32);

        write_u32(&mut writer, SNAPSHOT_MAGIC)?;
        write_u32(&mut writer, SNAPSHOT_VERSION)?;
        write_u32(&mut writer, self.width as u32)?;
        write_u32(&mut writer, height as u32)?;
        write_u32(&mut writer, self.k_m)?;
        write_u32(&mut writer, raw(self.start))?;
        write_u32(&mut writer, raw(self.session_goal))?;
        write_u32(&mut writer, raw(self.robot))?;

        for cell in &self.cells {
            write_u32(&mut writer, cell.g)?;
            write_u32(&mut writer, cell.rhs)?;
            write_u32(&mut writer, cell.key.k1)?;
            write_u32(&mut writer, cell.key.k2)?;
            write_u32(&mut writer, cell.heap_slot as u32)?;
            writer.write_all(&[u8::from(cell.blocked)])?;
        }
        writer.flush()?;
        debug!("[DStarLite] saved state of {} cells", self.cells.len());
        Ok(())
    }

    fn load_state(&mut self, reader: &mut dyn Read) -> PlanningResult<()> {
        let mut reader = BufReader::new(reader);
        let header = read_header(&mut reader)?;
        let height = if self.width == 0 { 0 } else { self.cells.len() / self.width };
        if header.width != self.width || header.height != height {
            return Err(PlanningError::InvalidSnapshot(format!(
                "snapshot is {}x{}, map is {}x{}",
                header.width, header.height, self.width, height
            )));
        }
        let count = self.cells.len();
        let start = checked_cell(header.start, count)?;
        let goal = checked_cell(header.goal, count)?;
        let robot = checked_cell(header.robot, count)?;

        let mut cells = self.cells.clone();
        for cell in cells.iter_mut() {
            cell.g = read_u32(&mut reader)?;
            cell.rhs = read_u32(&mut reader)?;
            cell.key = Key::new(read_u32(&mut reader)?, read_u32(&mut reader)?);
            cell.heap_slot = read_u32(&mut reader)? as usize;
            cell.blocked = read_u8(&mut reader)? != 0;
        }
        let mut open = OpenList::with_capacity(count);
        open.rebuild_from_slots(&cells).map_err(|index| {
            PlanningError::InvalidSnapshot(format!("inconsistent heap slot at cell {}", index))
        })?;
        open.check_invariant(&cells).map_err(|slot| {
            PlanningError::InvalidSnapshot(format!("heap order violated at slot {}", slot))
        })?;

        self.cells = cells;
        self.open = open;
        self.k_m = header.k_m;
        self.start = start;
        self.session_goal = goal;
        self.robot = robot;
        self.touched.iter_mut().for_each(|t| *t = false);
        self.ensure_layers();
        info!("[DStarLite] loaded state, {} cells open", self.open.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enumset::EnumSet;

    use crate::common::InputUpdate;
    use crate::path_planning::a_star::AStarPlanner;

    fn fresh() -> InputUpdates {
        InputUpdate::NewMap | InputUpdate::Start | InputUpdate::Goal
    }

    fn planner_for(grid: &OccupancyGrid) -> DStarLitePlanner {
        let mut planner = DStarLitePlanner::new();
        planner.init_map(grid).unwrap();
        planner
    }

    fn a_star_cost(grid: &OccupancyGrid, start: GridNode, goal: GridNode) -> Option<u32> {
        let mut planner = AStarPlanner::default();
        planner.init_map(grid).unwrap();
        planner.plan(start, goal).ok().map(|p| p.cost())
    }

    fn snapshot(planner: &DStarLitePlanner) -> Vec<u8> {
        let mut bytes = Vec::new();
        planner.save_state(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_d_star_lite_open_grid() {
        let grid = OccupancyGrid::new(6, 4);
        let mut planner = planner_for(&grid);
        let path = planner
            .calculate_path(GridNode::new(0, 0), GridNode::new(5, 3), fresh(), StepBudget::Unlimited)
            .unwrap();
        assert_eq!(path.first(), Some(GridNode::new(0, 0)));
        assert_eq!(path.last(), Some(GridNode::new(5, 3)));
        assert!(path.is_connected());
        assert_eq!(path.cost(), 3 * 14 + 2 * 10);
        assert_eq!(planner.debug_layers().len(), 3);
    }

    #[test]
    fn test_d_star_lite_start_equals_goal() {
        let grid = OccupancyGrid::new(3, 3);
        let mut planner = planner_for(&grid);
        let path = planner
            .calculate_path(GridNode::new(2, 1), GridNode::new(2, 1), fresh(), StepBudget::Unlimited)
            .unwrap();
        assert_eq!(path.cells, vec![GridNode::new(2, 1)]);
    }

    #[test]
    fn test_d_star_lite_blocked_and_unreachable() {
        let grid = OccupancyGrid::from_ascii(&["..#..", "..#..", "..#.#"]).unwrap();
        let mut planner = planner_for(&grid);
        assert!(matches!(
            planner.calculate_path(GridNode::new(0, 0), GridNode::new(4, 2), fresh(), StepBudget::Unlimited),
            Err(PlanningError::BlockedEndpoint(Endpoint::Goal))
        ));
        assert!(matches!(
            planner.calculate_path(GridNode::new(0, 0), GridNode::new(4, 0), fresh(), StepBudget::Unlimited),
            Err(PlanningError::NoPathFound)
        ));
    }

    #[test]
    fn test_d_star_lite_failed_first_call_then_success() {
        let mut grid = OccupancyGrid::from_ascii(&["....", ".#..", "...."]).unwrap();
        let mut planner = planner_for(&grid);
        let start = GridNode::new(0, 0);
        let goal = GridNode::new(1, 1);
        assert!(planner
            .calculate_path(start, goal, fresh(), StepBudget::Unlimited)
            .is_err());

        grid.set_blocked(goal, false);
        planner.update_map(&grid, GridRect::new(1, 1, 1, 1));
        let path = planner
            .calculate_path(start, goal, EnumSet::only(InputUpdate::Map), StepBudget::Unlimited)
            .unwrap();
        assert_eq!(path.cost(), 14);
    }

    #[test]
    fn test_d_star_lite_incremental_matches_a_star() {
        let mut grid = OccupancyGrid::new(9, 7);
        let mut planner = planner_for(&grid);
        let start = GridNode::new(0, 3);
        let goal = GridNode::new(8, 3);
        let first = planner
            .calculate_path(start, goal, fresh(), StepBudget::Unlimited)
            .unwrap();
        assert_eq!(first.cost(), 80);

        let wall = GridRect::new(4, 1, 1, 6);
        grid.fill_rect(wall, true);
        planner.update_map(&grid, wall);
        let second = planner
            .calculate_path(start, goal, EnumSet::only(InputUpdate::Map), StepBudget::Unlimited)
            .unwrap();
        assert!(second.is_connected());
        assert!(second.cells.iter().all(|c| !grid.is_blocked(*c)));
        assert_eq!(Some(second.cost()), a_star_cost(&grid, start, goal));

        grid.fill_rect(wall, false);
        planner.update_map(&grid, wall);
        let third = planner
            .calculate_path(start, goal, EnumSet::only(InputUpdate::Map), StepBudget::Unlimited)
            .unwrap();
        assert_eq!(third.cost(), 80);
    }

    #[test]
    fn test_d_star_lite_robot_moves() {
        let mut grid = OccupancyGrid::new(10, 10);
        let mut planner = planner_for(&grid);
        let goal = GridNode::new(9, 9);
        let mut start = GridNode::new(0, 0);
        let path = planner
            .calculate_path(start, goal, fresh(), StepBudget::Unlimited)
            .unwrap();
        start = path.cells[3];

        let block = GridRect::new(5, 5, 2, 2);
        grid.fill_rect(block, true);
        planner.update_map(&grid, block);
        let path = planner
            .calculate_path(start, goal, InputUpdate::Start | InputUpdate::Map, StepBudget::Unlimited)
            .unwrap();
        assert!(planner.k_m() > 0);
        assert_eq!(path.first(), Some(start));
        assert_eq!(Some(path.cost()), a_star_cost(&grid, start, goal));
    }

    #[test]
    fn test_d_star_lite_unblocked_goal_is_restored() {
        let mut grid = OccupancyGrid::new(5, 5);
        let mut planner = planner_for(&grid);
        let start = GridNode::new(0, 0);
        let goal = GridNode::new(4, 4);
        planner
            .calculate_path(start, goal, fresh(), StepBudget::Unlimited)
            .unwrap();

        let cell = GridRect::new(4, 4, 1, 1);
        grid.fill_rect(cell, true);
        planner.update_map(&grid, cell);
        grid.fill_rect(cell, false);
        planner.update_map(&grid, cell);
        let path = planner
            .calculate_path(start, goal, EnumSet::only(InputUpdate::Map), StepBudget::Unlimited)
            .unwrap();
        assert_eq!(path.cost(), 56);
    }

    #[test]
    fn test_d_star_lite_stepping_is_resumable() {
        let grid = OccupancyGrid::from_ascii(&[
            "........",
            "..####..",
            "......#.",
            "..#.....",
            "........",
        ])
        .unwrap();
        let start = GridNode::new(0, 0);
        let goal = GridNode::new(7, 4);

        let mut split = planner_for(&grid);
        let first = split.calculate_path(start, goal, fresh(), StepBudget::Steps(2));
        assert!(matches!(first, Err(PlanningError::ComputationIncomplete)));
        let second = split.calculate_path(start, goal, EnumSet::empty(), StepBudget::Steps(3));
        assert!(matches!(second, Err(PlanningError::ComputationIncomplete)));

        let mut whole = planner_for(&grid);
        let once = whole.calculate_path(start, goal, fresh(), StepBudget::Steps(5));
        assert!(matches!(once, Err(PlanningError::ComputationIncomplete)));
        assert_eq!(snapshot(&split), snapshot(&whole));

        let done = split
            .calculate_path(start, goal, EnumSet::empty(), StepBudget::Unlimited)
            .unwrap();
        assert_eq!(Some(done.cost()), a_star_cost(&grid, start, goal));
    }

    #[test]
    fn test_d_star_lite_snapshot_round_trip() {
        let grid = OccupancyGrid::from_ascii(&["....#", ".##..", "....."]).unwrap();
        let start = GridNode::new(0, 0);
        let goal = GridNode::new(4, 2);
        let mut planner = planner_for(&grid);
        planner
            .calculate_path(start, goal, fresh(), StepBudget::Steps(4))
            .unwrap_err();
        let bytes = snapshot(&planner);

        let stored = read_snapshot(&bytes[..]).unwrap();
        assert_eq!(stored.grid, grid);
        assert_eq!(stored.start, Some(start));
        assert_eq!(stored.goal, Some(goal));
        assert_eq!(read_snapshot_map(&bytes[..]).unwrap(), grid);

        let mut restored = planner_for(&grid);
        restored.load_state(&mut &bytes[..]).unwrap();
        assert_eq!(restored.open_len(), planner.open_len());
        assert_eq!(snapshot(&restored), bytes);

        let a = planner
            .calculate_path(start, goal, EnumSet::empty(), StepBudget::Unlimited)
            .unwrap();
        let b = restored
            .calculate_path(start, goal, EnumSet::empty(), StepBudget::Unlimited)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_d_star_lite_rejects_bad_snapshot() {
        let grid = OccupancyGrid::new(4, 4);
        let mut planner = planner_for(&grid);
        let other = planner_for(&OccupancyGrid::new(3, 4));
        let bytes = snapshot(&other);
        assert!(matches!(
            planner.load_state(&mut &bytes[..]),
            Err(PlanningError::InvalidSnapshot(_))
        ));
        assert!(matches!(
            planner.load_state(&mut &b"nope"[..]),
            Err(PlanningError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_d_star_lite_rejects_oversized_snapshot() {
        let header = |width: u32, height: u32| -> Vec<u8> {
            [SNAPSHOT_MAGIC, SNAPSHOT_VERSION, width, height, 0, NO_CELL, NO_CELL, NO_CELL]
                .iter()
                .flat_map(|v| v.to_le_bytes())
                .collect()
        };
        let huge = header(u32::MAX, u32::MAX);
        assert!(matches!(read_snapshot(&huge[..]), Err(PlanningError::InvalidSnapshot(_))));
        // plausible size but no cell records behind the header
        let truncated = header(60_000, 60_000);
        assert!(matches!(read_snapshot(&truncated[..]), Err(PlanningError::Io(_))));
    }

    #[test]
    fn test_d_star_lite_rejects_unordered_heap() {
        const HEADER: usize = 32;
        const RECORD: usize = 21;
        let field = |bytes: &[u8], cell: usize, offset: usize| -> u32 {
            let at = HEADER + cell * RECORD + offset;
            u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
        };

        let grid = OccupancyGrid::new(6, 6);
        let mut planner = planner_for(&grid);
        planner
            .calculate_path(GridNode::new(0, 0), GridNode::new(5, 5), fresh(), StepBudget::Steps(4))
            .unwrap_err();
        let mut bytes = snapshot(&planner);
        let key = |bytes: &[u8], cell: usize| Key::new(field(bytes, cell, 8), field(bytes, cell, 12));
        let root = (0..36).find(|&c| field(&bytes, c, 16) == 1).unwrap();
        let deeper = (0..36)
            .find(|&c| field(&bytes, c, 16) > 1 && key(&bytes, c) > key(&bytes, root))
            .unwrap();

        // swap the slots of the root and a larger-keyed member
        let slot = field(&bytes, deeper, 16);
        let at = |cell: usize| HEADER + cell * RECORD + 16;
        bytes[at(root)..at(root) + 4].copy_from_slice(&slot.to_le_bytes());
        bytes[at(deeper)..at(deeper) + 4].copy_from_slice(&1u32.to_le_bytes());

        let mut restored = planner_for(&grid);
        assert!(matches!(
            restored.load_state(&mut &bytes[..]),
            Err(PlanningError::InvalidSnapshot(_))
        ));
        assert_eq!(restored.open_len(), 0);
    }

    #[test]
    fn test_d_star_lite_cell_details() {
        let grid = OccupancyGrid::from_ascii(&["...", ".#.", "..."]).unwrap();
        let mut planner = planner_for(&grid);
        planner
            .calculate_path(GridNode::new(0, 0), GridNode::new(2, 0), fresh(), StepBudget::Unlimited)
            .unwrap();
        let goal = planner.cell_details(GridNode::new(2, 0)).unwrap();
        assert!(goal.starts_with("Cell x = 2, y = 0\n - g_cost = 0\n - rhs = 0\n - key = ("));
        let wall = planner.cell_details(GridNode::new(1, 1)).unwrap();
        assert!(wall.starts_with("Cell x = 1, y = 1 (Blocked)\n - g_cost = x\n - rhs = x"));
        assert!(planner.cell_details(GridNode::new(3, 0)).is_none());
    }

    #[test]
    fn test_d_star_lite_layers() {
        let grid = OccupancyGrid::new(4, 4);
        let mut planner = planner_for(&grid);
        planner
            .calculate_path(GridNode::new(0, 0), GridNode::new(3, 3), fresh(), StepBudget::Unlimited)
            .unwrap();
        let layers = planner.debug_layers();
        assert_eq!(layers[1].minimum_zoom_factor(), 6.0);
        assert_eq!(layers[2].minimum_zoom_factor(), 16.0);

        let Some(LayerData::Costs(costs)) = planner.debug_layer_data(LayerKind::Costs) else {
            panic!("missing cost layer");
        };
        assert_eq!(costs[15], CostPair { g: Some(0), rhs: Some(0) });
        let Some(LayerData::Backpointers(back)) = planner.debug_layer_data(LayerKind::Backpointers) else {
            panic!("missing backpointer layer");
        };
        assert_eq!(back[0], Some(GridNode::new(1, 1)));
        assert_eq!(back[15], None);
    }

    fn count_marks(planner: &DStarLitePlanner, mark: CellMark) -> usize {
        match planner.debug_layer_data(LayerKind::Lists) {
            Some(LayerData::Marks(marks)) => marks.iter().filter(|&&m| m == mark).count(),
            _ => 0,
        }
    }

    #[test]
    fn test_d_star_lite_open_marks() {
        // the start is cut off, so the search settles every reachable cell
        let mut grid = OccupancyGrid::from_ascii(&[".#...", ".#...", ".#..."]).unwrap();
        let mut planner = planner_for(&grid);
        let (start, goal) = (GridNode::new(0, 1), GridNode::new(4, 1));

        // lowering wave only: overconsistent cells
        planner.calculate_path(start, goal, fresh(), StepBudget::Steps(3)).unwrap_err();
        assert!(count_marks(&planner, CellMark::Open) > 0);
        assert_eq!(count_marks(&planner, CellMark::OpenRaise), 0);

        let result = planner.calculate_path(start, goal, EnumSet::empty(), StepBudget::Unlimited);
        assert!(matches!(result, Err(PlanningError::NoPathFound)));
        assert_eq!(planner.open_len(), 0);
        // cutting column 3 raises the costs of column 2
        let wall = GridRect::new(3, 0, 1, 3);
        grid.fill_rect(wall, true);
        planner.update_map(&grid, wall);
        assert!(count_marks(&planner, CellMark::OpenRaise) >= 2);
    }
}
