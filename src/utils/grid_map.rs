//! Occupancy grid shared by all planners
//!
//! Cells are stored row-major (`index = y * width + x`) and are either
//! free or blocked. The shape never changes after construction; content
//! is edited in place.

use nalgebra as na;

use crate::common::{GridNode, GridRect, PlanningError, PlanningResult};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OccupancyGrid {
    width: usize,
    height: usize,
    blocked: Vec<bool>,
}

impl OccupancyGrid {
    /// Fully free grid
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, blocked: vec![false; width * height] }
    }

    pub fn from_fn<F>(width: usize, height: usize, mut is_blocked: F) -> Self
    where
        F: FnMut(GridNode) -> bool,
    {
        let blocked = (0..width * height)
            .map(|i| is_blocked(GridNode::new((i % width) as i32, (i / width) as i32)))
            .collect();
        Self { width, height, blocked }
    }

    /// Wrap row-major cell flags read from an external source
    pub fn from_cells(width: usize, height: usize, blocked: Vec<bool>) -> PlanningResult<Self> {
        if width.checked_mul(height) != Some(blocked.len()) {
            return Err(PlanningError::InvalidMap(format!(
                "{} cells do not fill a {}x{} grid",
                blocked.len(),
                width,
                height
            )));
        }
        Ok(Self { width, height, blocked })
    }

    /// Parse rows of text; `#` is blocked, any other character free
    pub fn from_ascii(rows: &[&str]) -> PlanningResult<Self> {
        let height = rows.len();
        let width = rows.first().map_or(0, |r| r.chars().count());
        let mut blocked = Vec::with_capacity(width * height);
        for (y, row) in rows.iter().enumerate() {
            if row.chars().count() != width {
                return Err(PlanningError::InvalidMap(format!(
                    "row {} has {} cells, expected {}",
                    y,
                    row.chars().count(),
                    width
                )));
            }
            blocked.extend(row.chars().map(|c| c == '#'));
        }
        Ok(Self { width, height, blocked })
    }

    /// Matrix rows are grid rows (y), columns are x; non-zero is blocked
    pub fn from_matrix(matrix: &na::DMatrix<i32>) -> Self {
        Self::from_fn(matrix.ncols(), matrix.nrows(), |n| {
            matrix[(n.y as usize, n.x as usize)] != 0
        })
    }

    /// Like [`OccupancyGrid::from_matrix`], with every source cell blown
    /// up to a `scale x scale` block
    pub fn from_matrix_scaled(matrix: &na::DMatrix<i32>, scale: usize) -> PlanningResult<Self> {
        if scale < 1 {
            return Err(PlanningError::InvalidMap("scale must be >= 1".to_string()));
        }
        let scaled = matrix.kronecker(&na::DMatrix::<i32>::repeat(scale, scale, 1));
        Ok(Self::from_matrix(&scaled))
    }

    pub fn to_matrix(&self) -> na::DMatrix<i32> {
        na::DMatrix::from_fn(self.height, self.width, |y, x| {
            i32::from(self.blocked[y * self.width + x])
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }

    pub fn same_size(&self, other: &OccupancyGrid) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub fn bounds(&self) -> GridRect {
        GridRect::new(0, 0, self.width as i32, self.height as i32)
    }

    pub fn contains(&self, node: GridNode) -> bool {
        node.x >= 0 && node.y >= 0 && (node.x as usize) < self.width && (node.y as usize) < self.height
    }

    pub fn index(&self, node: GridNode) -> Option<usize> {
        self.contains(node).then(|| node.y as usize * self.width + node.x as usize)
    }

    pub fn node(&self, index: usize) -> GridNode {
        GridNode::new((index % self.width) as i32, (index / self.width) as i32)
    }

    /// Out-of-bounds cells count as blocked
    pub fn is_blocked(&self, node: GridNode) -> bool {
        self.index(node).map_or(true, |i| self.blocked[i])
    }

    pub fn is_blocked_index(&self, index: usize) -> bool {
        self.blocked[index]
    }

    /// Ignored for out-of-bounds cells
    pub fn set_blocked(&mut self, node: GridNode, blocked: bool) {
        if let Some(i) = self.index(node) {
            self.blocked[i] = blocked;
        }
    }

    /// Set every in-bounds cell of `rect`
    pub fn fill_rect(&mut self, rect: GridRect, blocked: bool) {
        for node in rect.cells() {
            self.set_blocked(node, blocked);
        }
    }

    /// Copy the content of `rect` from a grid of the same size
    pub fn copy_region(&mut self, source: &OccupancyGrid, rect: GridRect) {
        for node in rect.cells() {
            if let Some(i) = self.index(node) {
                self.blocked[i] = source.blocked[i];
            }
        }
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.iter().filter(|&&b| b).count()
    }

    /// Coordinates of all blocked cells, row-major
    pub fn blocked_cells(&self) -> impl Iterator<Item = GridNode> + '_ {
        self.blocked
            .iter()
            .enumerate()
            .filter(|(_, &b)| b)
            .map(move |(i, _)| self.node(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_ascii() {
        let grid = OccupancyGrid::from_ascii(&["..#", "#..", "..."]).unwrap();
        assert_eq!(grid.width(), 3);
        assert_eq!(grid.height(), 3);
        assert!(grid.is_blocked(GridNode::new(2, 0)));
        assert!(grid.is_blocked(GridNode::new(0, 1)));
        assert!(!grid.is_blocked(GridNode::new(1, 1)));
        assert!(grid.is_blocked(GridNode::new(3, 0)));
        assert_eq!(grid.blocked_count(), 2);

        assert!(OccupancyGrid::from_ascii(&["...", ".."]).is_err());
    }

    #[test]
    fn test_index_roundtrip() {
        let grid = OccupancyGrid::new(7, 5);
        for i in 0..grid.len() {
            assert_eq!(grid.index(grid.node(i)), Some(i));
        }
        assert_eq!(grid.index(GridNode::new(-1, 0)), None);
        assert_eq!(grid.index(GridNode::new(0, 5)), None);
    }

    #[test]
    fn test_matrix_scaled() {
        let matrix = na::DMatrix::from_row_slice(2, 2, &[0, 1, 0, 0]);
        let grid = OccupancyGrid::from_matrix_scaled(&matrix, 3).unwrap();
        assert_eq!((grid.width(), grid.height()), (6, 6));
        assert!(grid.is_blocked(GridNode::new(3, 0)));
        assert!(grid.is_blocked(GridNode::new(5, 2)));
        assert!(!grid.is_blocked(GridNode::new(2, 2)));
        assert!(!grid.is_blocked(GridNode::new(5, 3)));
        assert_eq!(grid.blocked_count(), 9);
        assert!(OccupancyGrid::from_matrix_scaled(&matrix, 0).is_err());

        let back = OccupancyGrid::from_matrix(&grid.to_matrix());
        assert_eq!(back, grid);
    }

    #[test]
    fn test_fill_and_copy_region() {
        let mut grid = OccupancyGrid::new(5, 5);
        grid.fill_rect(GridRect::new(3, 3, 4, 4), true);
        assert_eq!(grid.blocked_count(), 4);

        let mut other = OccupancyGrid::new(5, 5);
        other.copy_region(&grid, GridRect::new(0, 0, 4, 4));
        assert_eq!(other.blocked_count(), 1);
        assert_eq!(other.blocked_cells().collect::<Vec<_>>(), vec![GridNode::new(3, 3)]);
    }

    #[test]
    fn test_from_cells() {
        let grid = OccupancyGrid::from_cells(2, 2, vec![false, true, false, false]).unwrap();
        assert_eq!(grid.blocked_cells().collect::<Vec<_>>(), vec![GridNode::new(1, 0)]);
        assert!(OccupancyGrid::from_cells(3, 2, vec![false; 4]).is_err());
        assert!(OccupancyGrid::from_cells(usize::MAX, 2, Vec::new()).is_err());
    }
}
