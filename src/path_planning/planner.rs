//! Shared planner contract
//!
//! [`GridPlanner`] owns the map, the start and goal poses and exactly one
//! active [`PlanningAlgorithm`]. It classifies every input change, decides
//! when the algorithm runs, keeps the last result and notifies listeners.

use std::fs::File;
use std::path::Path;
use std::time::Instant;

use enumset::EnumSet;
use log::{debug, info, warn};

use crate::common::{
    AlgorithmKind, GridNode, GridPath, GridRect, InputUpdate, InputUpdates, PlannerConfig,
    PlanningAlgorithm, PlanningError, PlanningResult, Pose2D, StepBudget,
};
use crate::path_planning::create_algorithm;
use crate::path_planning::d_star_lite::read_snapshot;
use crate::path_planning::debug_layer::{DebugLayer, LayerData};
use crate::utils::OccupancyGrid;

/// Change notification emitted by [`GridPlanner`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannerEvent {
    /// Path, error or debug data changed
    DataChanged,
    /// The occupancy grid was replaced or edited
    MapChanged,
    DebugLayerAdded { index: usize, name: String },
    DebugLayerRemoved { index: usize, name: String },
}

/// Handle returned by [`GridPlanner::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

pub type Listener = Box<dyn FnMut(&PlannerEvent)>;

pub struct GridPlanner {
    config: PlannerConfig,
    algorithm: Box<dyn PlanningAlgorithm>,
    grid: OccupancyGrid,
    start: Pose2D,
    goal: Pose2D,
    path: GridPath,
    last_error: String,
    last_failure: Option<PlanningError>,
    calc_time_ms: i64,
    pending: InputUpdates,
    stepping: bool,
    layers: Vec<DebugLayer>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: usize,
}

impl Default for GridPlanner {
    fn default() -> Self {
        Self::from_config(&PlannerConfig::default())
    }
}

impl GridPlanner {
    pub fn new(kind: AlgorithmKind) -> Self {
        let config = PlannerConfig {
            algorithm: kind,
            ..PlannerConfig::default()
        };
        Self::from_config(&config)
    }

    pub fn from_config(config: &PlannerConfig) -> Self {
        Self {
            config: config.clone(),
            algorithm: create_algorithm(config.algorithm, config),
            grid: OccupancyGrid::default(),
            start: Pose2D::invalid(),
            goal: Pose2D::invalid(),
            path: GridPath::new(),
            last_error: String::new(),
            last_failure: None,
            calc_time_ms: -1,
            pending: EnumSet::empty(),
            stepping: config.stepping,
            layers: Vec::new(),
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    // ---- observers ----

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&PlannerEvent) + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns false if `id` was not registered
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(other, _)| *other != id);
        self.listeners.len() != before
    }

    fn emit(&mut self, event: PlannerEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
    }

    // ---- inputs ----

    /// Replace the map. Start and goal become unset.
    pub fn set_map(&mut self, grid: OccupancyGrid) {
        info!("[Planner] new {}x{} map", grid.width(), grid.height());
        self.start = Pose2D::invalid();
        self.goal = Pose2D::invalid();
        self.path = GridPath::new();
        self.grid = grid;
        self.init_algorithm();
        self.pending = EnumSet::only(InputUpdate::NewMap);
        self.emit(PlannerEvent::MapChanged);
        self.emit(PlannerEvent::DataChanged);
    }

    /// Absorb an edit of `region`. A grid of a different size replaces the
    /// map; an empty region or one reaching outside the grid is ignored.
    pub fn update_map(&mut self, grid: &OccupancyGrid, region: GridRect) {
        if !grid.same_size(&self.grid) {
            self.set_map(grid.clone());
            return;
        }
        if region.is_empty() || !self.grid.bounds().contains_rect(&region) {
            debug!("[Planner] ignoring edit of {:?}", region);
            return;
        }
        self.grid.copy_region(grid, region);
        self.algorithm.update_map(&self.grid, region);
        if !self.pending.contains(InputUpdate::NewMap) {
            self.pending |= InputUpdate::Map;
        }
        self.emit(PlannerEvent::MapChanged);
        self.call_planner(self.default_budget());
    }

    /// Block or free every cell of `region`
    pub fn edit_region(&mut self, region: GridRect, blocked: bool) {
        let mut grid = self.grid.clone();
        grid.fill_rect(region, blocked);
        self.update_map(&grid, region);
    }

    pub fn set_start(&mut self, start: Pose2D) {
        if !start.is_valid() {
            self.start = start;
            self.path = GridPath::new();
            self.emit(PlannerEvent::DataChanged);
            return;
        }
        if self.in_bounds(&start) {
            self.start = start;
            self.pending |= InputUpdate::Start;
            self.call_planner(self.default_budget());
        }
    }

    pub fn set_goal(&mut self, goal: Pose2D) {
        if !goal.is_valid() {
            self.goal = goal;
            self.path = GridPath::new();
            self.emit(PlannerEvent::DataChanged);
            return;
        }
        if self.in_bounds(&goal) {
            self.goal = goal;
            self.pending |= InputUpdate::Goal;
            self.call_planner(self.default_budget());
        }
    }

    /// Set both endpoints with a single planner invocation
    pub fn set_start_goal(&mut self, start: Pose2D, goal: Pose2D) {
        match (start.is_valid(), goal.is_valid()) {
            (true, true) => {
                if !self.in_bounds(&start) || !self.in_bounds(&goal) {
                    return;
                }
                self.start = start;
                self.goal = goal;
                self.pending |= InputUpdate::Start | InputUpdate::Goal;
                self.call_planner(self.default_budget());
            }
            (false, _) => {
                self.set_start(start);
                self.set_goal(goal);
            }
            (true, false) => {
                self.set_goal(goal);
                self.set_start(start);
            }
        }
    }

    /// Enable or disable single stepping. Disabling runs the pending
    /// computation to completion.
    pub fn set_stepping(&mut self, enabled: bool) {
        let was_stepping = self.stepping;
        self.stepping = enabled;
        if was_stepping && !enabled {
            self.call_planner(StepBudget::Unlimited);
        }
    }

    /// Continue the current computation for at most `steps` expansions
    pub fn step(&mut self, steps: usize) {
        self.call_planner(StepBudget::Steps(steps));
    }

    /// Replace the active algorithm. Its state is discarded; the endpoints
    /// are kept and a plan is attempted right away.
    pub fn set_algorithm(&mut self, kind: AlgorithmKind, config: &PlannerConfig) {
        info!("[Planner] switching algorithm to {}", kind.display_name());
        self.config = PlannerConfig {
            algorithm: kind,
            ..config.clone()
        };
        self.clear_layers();
        self.algorithm = create_algorithm(kind, &self.config);
        self.init_algorithm();
        self.pending = EnumSet::only(InputUpdate::NewMap);
        self.call_planner(self.default_budget());
    }

    fn init_algorithm(&mut self) {
        self.last_failure = None;
        self.last_error.clear();
        if self.grid.is_empty() {
            return;
        }
        if let Err(err) = self.algorithm.init_map(&self.grid) {
            warn!("[Planner] {}: {}", self.algorithm.name(), err);
            self.last_error = err.to_string();
            self.last_failure = Some(err);
        }
    }

    fn in_bounds(&self, pose: &Pose2D) -> bool {
        pose.cell().is_some_and(|cell| self.grid.contains(cell))
    }

    fn default_budget(&self) -> StepBudget {
        if self.stepping && self.algorithm.supports_stepping() {
            StepBudget::Steps(0)
        } else {
            StepBudget::Unlimited
        }
    }

    fn endpoints(&self) -> Option<(GridNode, GridNode)> {
        if self.grid.is_empty() {
            return None;
        }
        Some((self.start.cell()?, self.goal.cell()?))
    }

    fn call_planner(&mut self, budget: StepBudget) {
        let Some((start, goal)) = self.endpoints() else {
            return;
        };
        self.last_error.clear();
        self.last_failure = None;
        self.path = GridPath::new();

        let timer = Instant::now();
        let result = self.algorithm.calculate_path(start, goal, self.pending, budget);
        self.calc_time_ms = timer.elapsed().as_millis() as i64;
        self.pending = EnumSet::empty();

        match result {
            Ok(path) => self.path = path,
            Err(err) => {
                debug!("[Planner] {}: {}", self.algorithm.name(), err);
                self.last_error = err.to_string();
                self.last_failure = Some(err);
            }
        }
        if self.path.is_empty() && self.last_error.is_empty() {
            self.last_error = "No Path set".to_string();
        }
        self.sync_layers();
        self.emit(PlannerEvent::DataChanged);
    }

    /// Mirror the algorithm's layer list, announcing every difference
    fn sync_layers(&mut self) {
        let current: Vec<DebugLayer> = self.algorithm.debug_layers().to_vec();
        let keep = self
            .layers
            .iter()
            .zip(&current)
            .take_while(|(a, b)| a.name() == b.name())
            .count();
        while self.layers.len() > keep {
            if let Some(layer) = self.layers.pop() {
                let index = self.layers.len();
                self.emit(PlannerEvent::DebugLayerRemoved { index, name: layer.name().to_string() });
            }
        }
        for layer in current.into_iter().skip(keep) {
            let index = self.layers.len();
            let name = layer.name().to_string();
            self.layers.push(layer);
            self.emit(PlannerEvent::DebugLayerAdded { index, name });
        }
    }

    fn clear_layers(&mut self) {
        while let Some(layer) = self.layers.pop() {
            let index = self.layers.len();
            self.emit(PlannerEvent::DebugLayerRemoved { index, name: layer.name().to_string() });
        }
    }

    // ---- outputs ----

    pub fn path(&self) -> &GridPath {
        &self.path
    }

    /// Human-readable description of the last failure, empty on success
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    pub fn last_failure(&self) -> Option<&PlanningError> {
        self.last_failure.as_ref()
    }

    /// Duration of the last invocation, -1 before the first one
    pub fn calc_time_ms(&self) -> i64 {
        self.calc_time_ms
    }

    pub fn start(&self) -> Pose2D {
        self.start
    }

    pub fn goal(&self) -> Pose2D {
        self.goal
    }

    pub fn map_size(&self) -> (usize, usize) {
        (self.grid.width(), self.grid.height())
    }

    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    pub fn is_stepping(&self) -> bool {
        self.stepping
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn algorithm(&self) -> &dyn PlanningAlgorithm {
        self.algorithm.as_ref()
    }

    pub fn debug_layers(&self) -> &[DebugLayer] {
        &self.layers
    }

    pub fn debug_layer_data(&self, index: usize) -> Option<LayerData> {
        let layer = self.layers.get(index)?;
        self.algorithm.debug_layer_data(layer.kind())
    }

    pub fn cell_details(&self, node: GridNode) -> Option<String> {
        self.algorithm.cell_details(node)
    }

    /// Write the active algorithm's search state to `path`
    pub fn save_state<P: AsRef<Path>>(&self, path: P) -> PlanningResult<()> {
        let mut file = File::create(path)?;
        self.algorithm.save_state(&mut file)
    }

    /// Restore a search state written by [`GridPlanner::save_state`].
    ///
    /// The map and endpoints stored in the snapshot replace the current
    /// ones; the restored search is not advanced, only its path extracted.
    pub fn load_state<P: AsRef<Path>>(&mut self, path: P) -> PlanningResult<()> {
        let bytes = std::fs::read(path)?;
        self.algorithm.load_state(&mut &bytes[..])?;
        let snapshot = read_snapshot(&bytes[..])?;
        self.grid = snapshot.grid;
        self.start = snapshot.start.map_or_else(Pose2D::invalid, Pose2D::from);
        self.goal = snapshot.goal.map_or_else(Pose2D::invalid, Pose2D::from);
        self.pending = EnumSet::empty();
        self.path = GridPath::new();
        self.emit(PlannerEvent::MapChanged);
        self.sync_layers();
        if self.endpoints().is_some() {
            self.call_planner(StepBudget::Steps(0));
        } else {
            self.emit(PlannerEvent::DataChanged);
        }
        Ok(())
    }
}
