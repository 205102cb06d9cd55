//! Common types used throughout raster_planner

/// Cost of a horizontal or vertical step between grid cells
pub const CARDINAL_COST: u32 = 10;
/// Cost of a diagonal step between grid cells (10 * sqrt(2), rounded)
pub const DIAGONAL_COST: u32 = 14;

/// 2D point representation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<GridNode> for Point2D {
    fn from(node: GridNode) -> Self {
        Self { x: node.x as f64, y: node.y as f64 }
    }
}

/// 2D pose (position + orientation) in grid units.
///
/// A pose with a NaN coordinate is "invalid" and stands for an unset
/// start or goal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self { x, y, yaw }
    }

    pub fn invalid() -> Self {
        Self { x: f64::NAN, y: f64::NAN, yaw: 0.0 }
    }

    pub fn is_valid(&self) -> bool {
        !self.x.is_nan() && !self.y.is_nan()
    }

    /// Nearest grid cell, or `None` for an invalid pose
    pub fn cell(&self) -> Option<GridNode> {
        if !self.is_valid() {
            return None;
        }
        Some(GridNode::new(self.x.round() as i32, self.y.round() as i32))
    }
}

impl Default for Pose2D {
    fn default() -> Self {
        Self::invalid()
    }
}

impl From<GridNode> for Pose2D {
    fn from(node: GridNode) -> Self {
        Self::new(node.x as f64, node.y as f64, 0.0)
    }
}

/// Grid cell coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GridNode {
    pub x: i32,
    pub y: i32,
}

impl GridNode {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// True when `other` is one of the 8 surrounding cells
    pub fn is_adjacent(&self, other: &GridNode) -> bool {
        let dx = (self.x - other.x).abs();
        let dy = (self.y - other.y).abs();
        dx <= 1 && dy <= 1 && (dx, dy) != (0, 0)
    }

    /// Cost of a single step to an adjacent cell
    pub fn step_cost(&self, other: &GridNode) -> u32 {
        if self.x != other.x && self.y != other.y {
            DIAGONAL_COST
        } else {
            CARDINAL_COST
        }
    }

    /// Exact obstacle-free cost on an 8-connected grid
    pub fn octile_distance(&self, other: &GridNode) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        let (lo, hi) = if dx < dy { (dx, dy) } else { (dy, dx) };
        DIAGONAL_COST * lo + CARDINAL_COST * (hi - lo)
    }

    /// Manhattan distance scaled to cardinal step cost
    pub fn manhattan_distance(&self, other: &GridNode) -> u32 {
        CARDINAL_COST * (self.x.abs_diff(other.x) + self.y.abs_diff(other.y))
    }
}

/// Axis-aligned rectangle of cells, used to describe map edits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl GridRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle spanning two corner cells (inclusive, any order)
    pub fn from_corners(a: GridNode, b: GridNode) -> Self {
        let x = a.x.min(b.x);
        let y = a.y.min(b.y);
        Self::new(x, y, a.x.max(b.x) - x + 1, a.y.max(b.y) - y + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains(&self, node: GridNode) -> bool {
        node.x >= self.x
            && node.y >= self.y
            && node.x < self.x + self.width
            && node.y < self.y + self.height
    }

    /// True when `other` lies completely inside this rectangle
    pub fn contains_rect(&self, other: &GridRect) -> bool {
        !other.is_empty()
            && other.x >= self.x
            && other.y >= self.y
            && other.x + other.width <= self.x + self.width
            && other.y + other.height <= self.y + self.height
    }

    /// Row-major iteration over the covered cells
    pub fn cells(&self) -> impl Iterator<Item = GridNode> {
        let (x0, w) = (self.x, self.width.max(0));
        let (y0, h) = (self.y, self.height.max(0));
        itertools::iproduct!(y0..y0 + h, x0..x0 + w).map(|(y, x)| GridNode::new(x, y))
    }
}

/// Ordered list of cells from start to goal.
///
/// Consecutive cells are 8-adjacent; an empty path means "no path".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GridPath {
    pub cells: Vec<GridNode>,
}

impl GridPath {
    pub fn new() -> Self {
        Self { cells: Vec::new() }
    }

    pub fn from_cells(cells: Vec<GridNode>) -> Self {
        Self { cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn first(&self) -> Option<GridNode> {
        self.cells.first().copied()
    }

    pub fn last(&self) -> Option<GridNode> {
        self.cells.last().copied()
    }

    /// Sum of 10/14 step costs along the path
    pub fn cost(&self) -> u32 {
        self.cells.windows(2).map(|w| w[0].step_cost(&w[1])).sum()
    }

    /// True when every consecutive pair is 8-adjacent
    pub fn is_connected(&self) -> bool {
        self.cells.windows(2).all(|w| w[0].is_adjacent(&w[1]))
    }
}
