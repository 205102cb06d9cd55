//! Indexed binary min-heap used as open list by all planners
//!
//! The heap stores cell indices; each cell remembers its own slot so
//! membership tests, removal and re-keying are O(1) / O(log n) without a
//! side table. Slots are 1-based, slot 0 means "not in the heap".

/// A cell that can live in an [`OpenList`]
pub trait HeapItem {
    type Key: Ord + Copy;

    fn key(&self) -> Self::Key;
    fn heap_slot(&self) -> usize;
    fn set_heap_slot(&mut self, slot: usize);
}

#[derive(Debug, Clone)]
pub struct OpenList {
    // heap[0] is unused so that children of slot i are 2i and 2i + 1
    heap: Vec<usize>,
}

impl Default for OpenList {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenList {
    pub fn new() -> Self {
        Self { heap: vec![0] }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut heap = Vec::with_capacity(capacity + 1);
        heap.push(0);
        Self { heap }
    }

    pub fn len(&self) -> usize {
        self.heap.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.heap.len() == 1
    }

    /// Cell index at the root
    pub fn peek(&self) -> Option<usize> {
        self.heap.get(1).copied()
    }

    /// Cell indices in heap order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.heap[1..].iter().copied()
    }

    pub fn contains<T: HeapItem>(&self, cells: &[T], index: usize) -> bool {
        cells[index].heap_slot() != 0
    }

    /// Drop all members, marking them absent
    pub fn clear<T: HeapItem>(&mut self, cells: &mut [T]) {
        for &index in &self.heap[1..] {
            cells[index].set_heap_slot(0);
        }
        self.heap.truncate(1);
    }

    /// Forget all members without touching the cells (they are about to
    /// be reinitialised by the caller)
    pub fn reset(&mut self) {
        self.heap.truncate(1);
    }

    /// Insert `index`, or restore heap order if it is already a member
    pub fn push<T: HeapItem>(&mut self, cells: &mut [T], index: usize) {
        if cells[index].heap_slot() != 0 {
            self.reposition(cells, index);
            return;
        }
        self.heap.push(index);
        let slot = self.heap.len() - 1;
        cells[index].set_heap_slot(slot);
        self.sift_up(cells, slot);
    }

    pub fn pop<T: HeapItem>(&mut self, cells: &mut [T]) -> Option<usize> {
        let root = self.peek()?;
        self.remove_slot(cells, 1);
        Some(root)
    }

    /// Remove `index` if it is a member
    pub fn remove<T: HeapItem>(&mut self, cells: &mut [T], index: usize) {
        let slot = cells[index].heap_slot();
        if slot != 0 {
            self.remove_slot(cells, slot);
        }
    }

    /// Restore heap order after the key of `index` changed in either direction
    pub fn reposition<T: HeapItem>(&mut self, cells: &mut [T], index: usize) {
        let slot = cells[index].heap_slot();
        if slot == 0 {
            return;
        }
        let slot = self.sift_up(cells, slot);
        self.sift_down(cells, slot);
    }

    /// Rebuild the heap from the slots stored in the cells
    pub fn rebuild_from_slots<T: HeapItem>(&mut self, cells: &[T]) -> Result<(), usize> {
        let members: Vec<usize> = (0..cells.len()).filter(|&i| cells[i].heap_slot() != 0).collect();
        self.heap = vec![usize::MAX; members.len() + 1];
        self.heap[0] = 0;
        for index in members {
            let slot = cells[index].heap_slot();
            if slot >= self.heap.len() || self.heap[slot] != usize::MAX {
                self.reset();
                return Err(index);
            }
            self.heap[slot] = index;
        }
        Ok(())
    }

    /// First slot whose key is smaller than its parent's, or whose cell
    /// does not point back at it
    pub fn check_invariant<T: HeapItem>(&self, cells: &[T]) -> Result<(), usize> {
        for slot in 1..self.heap.len() {
            let index = self.heap[slot];
            if cells[index].heap_slot() != slot {
                return Err(slot);
            }
            if slot > 1 && cells[index].key() < cells[self.heap[slot / 2]].key() {
                return Err(slot);
            }
        }
        Ok(())
    }

    fn remove_slot<T: HeapItem>(&mut self, cells: &mut [T], slot: usize) {
        let removed = self.heap[slot];
        cells[removed].set_heap_slot(0);
        let last = self.heap.len() - 1;
        if slot == last {
            self.heap.pop();
            return;
        }
        let moved = self.heap[last];
        self.heap[slot] = moved;
        self.heap.pop();
        cells[moved].set_heap_slot(slot);
        let slot = self.sift_up(cells, slot);
        self.sift_down(cells, slot);
    }

    fn swap<T: HeapItem>(&mut self, cells: &mut [T], a: usize, b: usize) {
        self.heap.swap(a, b);
        cells[self.heap[a]].set_heap_slot(a);
        cells[self.heap[b]].set_heap_slot(b);
    }

    fn sift_up<T: HeapItem>(&mut self, cells: &mut [T], mut slot: usize) -> usize {
        while slot > 1 {
            let parent = slot / 2;
            if cells[self.heap[slot]].key() < cells[self.heap[parent]].key() {
                self.swap(cells, slot, parent);
                slot = parent;
            } else {
                break;
            }
        }
        slot
    }

    // Ties sink: a parent equal to its smaller child moves down.
    fn sift_down<T: HeapItem>(&mut self, cells: &mut [T], mut slot: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * slot;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && cells[self.heap[right]].key() < cells[self.heap[left]].key() {
                right
            } else {
                left
            };
            if cells[self.heap[slot]].key() >= cells[self.heap[child]].key() {
                self.swap(cells, slot, child);
                slot = child;
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[derive(Debug, Clone, Default)]
    struct Item {
        key: u32,
        slot: usize,
    }

    impl HeapItem for Item {
        type Key = u32;

        fn key(&self) -> u32 {
            self.key
        }

        fn heap_slot(&self) -> usize {
            self.slot
        }

        fn set_heap_slot(&mut self, slot: usize) {
            self.slot = slot;
        }
    }

    fn items(keys: &[u32]) -> Vec<Item> {
        keys.iter().map(|&key| Item { key, slot: 0 }).collect()
    }

    #[test]
    fn test_pop_in_key_order() {
        let mut cells = items(&[5, 3, 9, 1, 7, 3]);
        let mut open = OpenList::new();
        for i in 0..cells.len() {
            open.push(&mut cells, i);
        }
        let mut keys = Vec::new();
        while let Some(i) = open.pop(&mut cells) {
            assert_eq!(cells[i].slot, 0);
            keys.push(cells[i].key);
        }
        assert_eq!(keys, vec![1, 3, 3, 5, 7, 9]);
        assert!(open.is_empty());
    }

    #[test]
    fn test_remove_and_reposition() {
        let mut cells = items(&[5, 3, 9, 1, 7]);
        let mut open = OpenList::new();
        for i in 0..cells.len() {
            open.push(&mut cells, i);
        }
        open.remove(&mut cells, 3);
        assert!(!open.contains(&cells, 3));
        assert_eq!(open.len(), 4);
        assert_eq!(open.peek(), Some(1));

        cells[2].key = 0;
        open.reposition(&mut cells, 2);
        assert_eq!(open.peek(), Some(2));

        cells[2].key = 100;
        open.push(&mut cells, 2);
        assert_eq!(open.peek(), Some(1));
        assert_eq!(open.len(), 4);
        assert!(open.check_invariant(&cells).is_ok());

        // removing a non-member is a no-op
        open.remove(&mut cells, 3);
        assert_eq!(open.len(), 4);
    }

    #[test]
    fn test_randomized_invariant() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut cells = items(&vec![0; 200]);
        let mut open = OpenList::with_capacity(200);
        for _ in 0..5000 {
            let i = rng.gen_range(0..cells.len());
            match rng.gen_range(0..4) {
                0 | 1 => {
                    cells[i].key = rng.gen_range(0..1000);
                    open.push(&mut cells, i);
                }
                2 => open.remove(&mut cells, i),
                _ => {
                    if let Some(root) = open.pop(&mut cells) {
                        assert!(open.iter().all(|m| cells[m].key >= cells[root].key));
                    }
                }
            }
            assert_eq!(open.check_invariant(&cells), Ok(()));
            let members = cells.iter().filter(|c| c.slot != 0).count();
            assert_eq!(members, open.len());
        }
    }

    #[test]
    fn test_rebuild_from_slots() {
        let mut cells = items(&[4, 8, 2, 6]);
        let mut open = OpenList::new();
        for i in 0..cells.len() {
            open.push(&mut cells, i);
        }
        let order: Vec<usize> = open.iter().collect();

        let mut rebuilt = OpenList::new();
        rebuilt.rebuild_from_slots(&cells).unwrap();
        assert_eq!(rebuilt.iter().collect::<Vec<_>>(), order);

        cells[0].slot = 9;
        assert!(rebuilt.rebuild_from_slots(&cells).is_err());
        assert!(rebuilt.is_empty());
    }

    #[test]
    fn test_clear_resets_slots() {
        let mut cells = items(&[1, 2, 3]);
        let mut open = OpenList::new();
        for i in 0..cells.len() {
            open.push(&mut cells, i);
        }
        open.clear(&mut cells);
        assert!(open.is_empty());
        assert!(cells.iter().all(|c| c.slot == 0));
    }
}
