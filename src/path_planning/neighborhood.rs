//! Precomputed 8-connected neighbourhoods
//!
//! Every cell belongs to one of 16 boundary classes (touching the left,
//! right, top and/or bottom edge). Each class owns the list of moves that
//! stay inside the grid, so expanding a cell never needs a bounds check.

use itertools::iproduct;

use crate::common::{CARDINAL_COST, DIAGONAL_COST};

const X_MIN: u8 = 1;
const X_MAX: u8 = 2;
const Y_MIN: u8 = 4;
const Y_MAX: u8 = 8;

/// One admissible move out of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Move {
    /// Difference of the linear indices
    pub offset: isize,
    pub dx: i32,
    pub dy: i32,
    pub cost: u32,
}

/// A neighbouring cell as seen from the expanded cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    pub index: usize,
    pub cost: u32,
}

/// Owned iterator over at most eight neighbours.
///
/// Copies the moves out of the table so the caller may mutate its cell
/// arrays while iterating.
#[derive(Debug, Clone)]
pub struct Neighbors {
    origin: usize,
    moves: [Move; 8],
    len: usize,
    next: usize,
}

impl Iterator for Neighbors {
    type Item = Neighbor;

    fn next(&mut self) -> Option<Neighbor> {
        if self.next >= self.len {
            return None;
        }
        let m = self.moves[self.next];
        self.next += 1;
        Some(Neighbor {
            index: (self.origin as isize + m.offset) as usize,
            cost: m.cost,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.len - self.next;
        (rest, Some(rest))
    }
}

impl ExactSizeIterator for Neighbors {}

#[derive(Debug, Clone, Default)]
pub struct NeighborhoodTable {
    width: usize,
    variants: Vec<Vec<Move>>,
    classes: Vec<u8>,
}

impl NeighborhoodTable {
    pub fn new(width: usize, height: usize) -> Self {
        let variants = (0..16u8).map(|flags| Self::build_variant(width, flags)).collect();
        let classes = iproduct!(0..height, 0..width)
            .map(|(y, x)| Self::classify(x, y, width, height))
            .collect();
        Self { width, variants, classes }
    }

    fn classify(x: usize, y: usize, width: usize, height: usize) -> u8 {
        let mut flags = 0;
        if x == 0 {
            flags |= X_MIN;
        }
        if x + 1 == width {
            flags |= X_MAX;
        }
        if y == 0 {
            flags |= Y_MIN;
        }
        if y + 1 == height {
            flags |= Y_MAX;
        }
        flags
    }

    fn build_variant(width: usize, flags: u8) -> Vec<Move> {
        iproduct!(-1i32..=1, -1i32..=1)
            .filter(|&(dy, dx)| (dx, dy) != (0, 0))
            .filter(|&(dy, dx)| {
                !(dx < 0 && flags & X_MIN != 0
                    || dx > 0 && flags & X_MAX != 0
                    || dy < 0 && flags & Y_MIN != 0
                    || dy > 0 && flags & Y_MAX != 0)
            })
            .map(|(dy, dx)| Move {
                offset: dy as isize * width as isize + dx as isize,
                dx,
                dy,
                cost: if dx != 0 && dy != 0 { DIAGONAL_COST } else { CARDINAL_COST },
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// The admissible moves of the cell at `index`
    pub fn moves(&self, index: usize) -> &[Move] {
        &self.variants[self.classes[index] as usize]
    }

    pub fn neighbors(&self, index: usize) -> Neighbors {
        let variant = self.moves(index);
        let mut moves = [Move::default(); 8];
        moves[..variant.len()].copy_from_slice(variant);
        Neighbors { origin: index, moves, len: variant.len(), next: 0 }
    }

    /// Step cost between two cells, if they are neighbours
    pub fn cost_between(&self, from: usize, to: usize) -> Option<u32> {
        let offset = to as isize - from as isize;
        self.moves(from).iter().find(|m| m.offset == offset).map(|m| m.cost)
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbor_counts() {
        let table = NeighborhoodTable::new(4, 3);
        // corners
        assert_eq!(table.neighbors(0).count(), 3);
        assert_eq!(table.neighbors(3).count(), 3);
        assert_eq!(table.neighbors(8).count(), 3);
        assert_eq!(table.neighbors(11).count(), 3);
        // edges
        assert_eq!(table.neighbors(1).count(), 5);
        assert_eq!(table.neighbors(4).count(), 5);
        // interior
        assert_eq!(table.neighbors(5).count(), 8);
    }

    #[test]
    fn test_single_row_and_cell() {
        let table = NeighborhoodTable::new(5, 1);
        assert_eq!(table.neighbors(0).count(), 1);
        assert_eq!(table.neighbors(2).count(), 2);

        let single = NeighborhoodTable::new(1, 1);
        assert_eq!(single.neighbors(0).count(), 0);
    }

    #[test]
    fn test_neighbor_costs() {
        let table = NeighborhoodTable::new(3, 3);
        let mut neighbors: Vec<_> = table.neighbors(4).map(|n| (n.index, n.cost)).collect();
        neighbors.sort();
        assert_eq!(
            neighbors,
            vec![(0, 14), (1, 10), (2, 14), (3, 10), (5, 10), (6, 14), (7, 10), (8, 14)]
        );
        assert_eq!(table.cost_between(4, 8), Some(14));
        assert_eq!(table.cost_between(0, 2), None);
    }

    #[test]
    fn test_no_wraparound() {
        let table = NeighborhoodTable::new(4, 4);
        for index in 0..table.len() {
            let (x, y) = ((index % 4) as i32, (index / 4) as i32);
            for n in table.neighbors(index) {
                let (nx, ny) = ((n.index % 4) as i32, (n.index / 4) as i32);
                assert!((nx - x).abs() <= 1 && (ny - y).abs() <= 1);
            }
        }
    }
}
