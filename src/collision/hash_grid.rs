//! Spatial hash grid narrowing down which objects might touch
//! before the exact shape tests run.

use itertools::iproduct;
use rustc_hash::FxHashMap;

use super::shape::Rect;
use crate::math::Vec2;

/// Packed integer coordinates of a grid cell, x in the high half.
pub type CellId = u64;

#[inline]
fn cell_id(cx: i32, cy: i32) -> CellId {
    ((cx as u32 as u64) << 32) | cy as u32 as u64
}

const NO_BLOCK: u32 = u32::MAX;

/// Fixed-size chunk of a cell's bucket.
/// Cells holding more than `N` values chain additional blocks.
#[derive(Clone, Debug)]
#[repr(align(64))]
struct Block<V, const N: usize> {
    data: [V; N],
    next: u32,
    count: u16,
}

impl<V: Copy + Default, const N: usize> Block<V, N> {
    fn new(next: u32) -> Self {
        Block {
            data: [V::default(); N],
            next,
            count: 0,
        }
    }

    #[inline]
    fn values(&self) -> &[V] {
        &self.data[..self.count as usize]
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.count as usize == N
    }
}

/// A single-resolution spatial hash grid mapping cells to buckets of values.
///
/// Values are inserted into every cell their bounds touch and the grid does
/// no deduplication, so a query may return the same value once per cell.
/// Each cell's bucket is a chain of blocks of `N` values.
/// Overfull cells keep working but get slow to test pairwise,
/// so the first overflow of a grid logs a warning.
#[derive(Clone, Debug)]
pub struct HashGrid<V, const N: usize> {
    inv_cell_size: f32,
    cell_size: f32,
    // cell id -> index into `cells`
    cell_map: FxHashMap<CellId, u32>,
    // (cell id, first block) in insertion order
    cells: Vec<(CellId, u32)>,
    blocks: Vec<Block<V, N>>,
    free_blocks: Vec<u32>,
    overflow_warned: bool,
    scratch: Vec<V>,
}

impl<V, const N: usize> HashGrid<V, N>
where
    V: Copy + Default + PartialEq + std::fmt::Debug,
{
    pub fn new(cell_size: f32) -> Self {
        debug_assert!(cell_size > 0.0);
        debug_assert!(N > 0 && N <= u16::MAX as usize);
        HashGrid {
            inv_cell_size: 1.0 / cell_size,
            cell_size,
            cell_map: FxHashMap::default(),
            cells: Vec::new(),
            blocks: Vec::new(),
            free_blocks: Vec::new(),
            overflow_warned: false,
            scratch: Vec::new(),
        }
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Number of occupied cells.
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Remove everything, keeping allocations for reuse.
    pub fn clear(&mut self) {
        self.cell_map.clear();
        self.cells.clear();
        self.blocks.clear();
        self.free_blocks.clear();
    }

    #[inline]
    fn cell_coord(&self, v: f32) -> i32 {
        (v * self.inv_cell_size).floor() as i32
    }

    /// Inclusive ranges of cell coordinates touched by a rectangle.
    #[inline]
    fn covered(&self, r: &Rect) -> (std::ops::RangeInclusive<i32>, std::ops::RangeInclusive<i32>) {
        (
            self.cell_coord(r.x)..=self.cell_coord(r.x + r.width),
            self.cell_coord(r.y)..=self.cell_coord(r.y + r.height),
        )
    }

    /// Insert a value into every cell its bounds overlap.
    pub fn insert(&mut self, value: V, bounds: &Rect) {
        let (xs, ys) = self.covered(bounds);
        for (cx, cy) in iproduct!(xs, ys) {
            self.insert_into_cell(cell_id(cx, cy), value);
        }
    }

    /// Insert a value into the cells containing the given corners of a rotated shape.
    /// Corners sharing a cell only insert once.
    pub fn insert_corners(&mut self, value: V, corners: &[Vec2; 4]) {
        let mut ids = [0; 4];
        let mut id_count = 0;
        for c in corners {
            let id = cell_id(self.cell_coord(c.x), self.cell_coord(c.y));
            if !ids[..id_count].contains(&id) {
                ids[id_count] = id;
                id_count += 1;
            }
        }
        for &id in &ids[..id_count] {
            self.insert_into_cell(id, value);
        }
    }

    fn insert_into_cell(&mut self, id: CellId, value: V) {
        let cell_idx = match self.cell_map.get(&id) {
            Some(&idx) => idx as usize,
            None => {
                let block = self.alloc_block(NO_BLOCK);
                self.cell_map.insert(id, self.cells.len() as u32);
                self.cells.push((id, block));
                self.cells.len() - 1
            }
        };

        let mut head = self.cells[cell_idx].1;
        if self.blocks[head as usize].is_full() {
            self.warn_overflow(id);
            // new blocks go in front so only the head is ever partially filled
            head = self.alloc_block(head);
            self.cells[cell_idx].1 = head;
        }
        let block = &mut self.blocks[head as usize];
        block.data[block.count as usize] = value;
        block.count += 1;
    }

    fn alloc_block(&mut self, next: u32) -> u32 {
        match self.free_blocks.pop() {
            Some(idx) => {
                self.blocks[idx as usize] = Block::new(next);
                idx
            }
            None => {
                self.blocks.push(Block::new(next));
                (self.blocks.len() - 1) as u32
            }
        }
    }

    fn warn_overflow(&mut self, id: CellId) {
        let (cx, cy) = ((id >> 32) as u32 as i32, id as u32 as i32);
        if !self.overflow_warned {
            self.overflow_warned = true;
            log::warn!(
                "hash grid cell ({cx}, {cy}) holds more than {N} values, \
                 consider a smaller cell size"
            );
        } else {
            log::debug!("hash grid cell ({cx}, {cy}) overflowed");
        }
    }

    /// Iterate over the blocks of a cell's bucket.
    fn chain(&self, first: u32) -> impl Iterator<Item = &Block<V, N>> + '_ {
        std::iter::successors(
            (first != NO_BLOCK).then(|| &self.blocks[first as usize]),
            move |b| (b.next != NO_BLOCK).then(|| &self.blocks[b.next as usize]),
        )
    }

    /// Values in the cell at the given index (`0..cell_count()`).
    pub fn bucket(&self, cell_idx: usize) -> impl Iterator<Item = V> + '_ {
        self.chain(self.cells[cell_idx].1)
            .flat_map(|b| b.values().iter().copied())
    }

    /// Values in the cell containing a point.
    pub fn bucket_at(&self, point: Vec2) -> impl Iterator<Item = V> + '_ {
        let id = cell_id(self.cell_coord(point.x), self.cell_coord(point.y));
        let first = self
            .cell_map
            .get(&id)
            .map_or(NO_BLOCK, |&idx| self.cells[idx as usize].1);
        self.chain(first).flat_map(|b| b.values().iter().copied())
    }

    /// Append every value in every cell overlapping `area` to `out`.
    /// Values in several of those cells are appended once per cell.
    pub fn query(&self, area: &Rect, out: &mut Vec<V>) {
        let (xs, ys) = self.covered(area);
        for (cx, cy) in iproduct!(xs, ys) {
            if let Some(&idx) = self.cell_map.get(&cell_id(cx, cy)) {
                for block in self.chain(self.cells[idx as usize].1) {
                    out.extend_from_slice(block.values());
                }
            }
        }
    }

    /// Start removing values. The grid can't be queried until
    /// [`patch_holes`][Removal::patch_holes] has compacted it again.
    pub fn begin_removal(&mut self) -> Removal<'_, V, N> {
        Removal {
            grid: self,
            dirty: false,
        }
    }

    /// Repack every bucket so only the head block is partially filled,
    /// dropping cells that became empty.
    fn compact(&mut self) {
        let mut scratch = std::mem::take(&mut self.scratch);
        let mut cell_idx = 0;
        while cell_idx < self.cells.len() {
            let (id, first) = self.cells[cell_idx];
            scratch.clear();
            let mut block_ids = Vec::new();
            let mut next = first;
            while next != NO_BLOCK {
                let block = &self.blocks[next as usize];
                scratch.extend_from_slice(block.values());
                block_ids.push(next);
                next = block.next;
            }

            if scratch.is_empty() {
                self.free_blocks.extend(block_ids);
                self.cell_map.remove(&id);
                self.cells.swap_remove(cell_idx);
                if let Some(&(moved_id, _)) = self.cells.get(cell_idx) {
                    self.cell_map.insert(moved_id, cell_idx as u32);
                }
                continue;
            }

            let needed = (scratch.len() + N - 1) / N;
            self.free_blocks.extend(block_ids.drain(needed..));
            // the first block takes the remainder, the rest are full
            let head_len = scratch.len() - (needed - 1) * N;
            let mut values = scratch.iter().copied();
            for (i, &block_id) in block_ids.iter().enumerate() {
                let block = &mut self.blocks[block_id as usize];
                let take = if i == 0 { head_len } else { N };
                for slot in block.data[..take].iter_mut() {
                    // scratch holds exactly as many values as the blocks take
                    *slot = values.next().unwrap_or_default();
                }
                block.count = take as u16;
                block.next = block_ids.get(i + 1).copied().unwrap_or(NO_BLOCK);
            }
            cell_idx += 1;
        }
        self.scratch = scratch;
    }
}

/// An ongoing removal from a [`HashGrid`], leaving holes in the buckets
/// that are compacted by [`patch_holes`][Self::patch_holes].
///
/// Holding this borrows the grid mutably, so nothing can query
/// the grid while it has holes. Dropping it without patching compacts anyway.
#[must_use = "removals leave holes until `patch_holes` is called"]
pub struct Removal<'g, V, const N: usize>
where
    V: Copy + Default + PartialEq + std::fmt::Debug,
{
    grid: &'g mut HashGrid<V, N>,
    dirty: bool,
}

impl<'g, V, const N: usize> Removal<'g, V, N>
where
    V: Copy + Default + PartialEq + std::fmt::Debug,
{
    /// Remove every copy of `value` from the cells overlapped by `bounds`,
    /// which should be the bounds it was inserted with.
    /// Returns how many copies were removed.
    pub fn remove(&mut self, value: V, bounds: &Rect) -> usize {
        let (xs, ys) = self.grid.covered(bounds);
        let mut removed = 0;
        for (cx, cy) in iproduct!(xs, ys) {
            if let Some(&idx) = self.grid.cell_map.get(&cell_id(cx, cy)) {
                let first = self.grid.cells[idx as usize].1;
                removed += self.remove_in_chain(first, |v| *v == value);
            }
        }
        self.dirty |= removed > 0;
        removed
    }

    /// Remove every value matching a predicate anywhere in the grid.
    pub fn remove_where(&mut self, mut pred: impl FnMut(&V) -> bool) -> usize {
        let mut removed = 0;
        for cell_idx in 0..self.grid.cells.len() {
            let first = self.grid.cells[cell_idx].1;
            removed += self.remove_in_chain(first, &mut pred);
        }
        self.dirty |= removed > 0;
        removed
    }

    fn remove_in_chain(&mut self, first: u32, mut pred: impl FnMut(&V) -> bool) -> usize {
        let mut removed = 0;
        let mut next = first;
        while next != NO_BLOCK {
            let block = &mut self.grid.blocks[next as usize];
            let mut i = 0;
            while i < block.count as usize {
                if pred(&block.data[i]) {
                    // swap the last value into the hole
                    let last = block.count as usize - 1;
                    block.data.swap(i, last);
                    block.count -= 1;
                    removed += 1;
                } else {
                    i += 1;
                }
            }
            next = block.next;
        }
        removed
    }

    /// Compact the grid, ending the removal.
    pub fn patch_holes(mut self) {
        if self.dirty {
            self.grid.compact();
            self.dirty = false;
        }
    }
}

impl<'g, V, const N: usize> Drop for Removal<'g, V, N>
where
    V: Copy + Default + PartialEq + std::fmt::Debug,
{
    fn drop(&mut self) {
        if self.dirty {
            self.grid.compact();
        }
    }
}
