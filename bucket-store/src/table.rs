//! Ordered sequence of blocks.
//!
//! The table owns every block and is the only place blocks are created or
//! destroyed. Slots are addressed as `(block index, slot index)` pairs and
//! ordered block-major, slot-minor. The end position is `(len, 0)`.

use crate::block::Block;
use crate::error::StoreError;
use crate::slot::SlotMeta;

pub(crate) struct BlockTable<T> {
    blocks: Vec<Block<T>>,
    block_capacity: usize,
    /// Id handed to the next block. Never reused within one table lineage.
    next_id: u64,
}

impl<T> BlockTable<T> {
    pub(crate) fn new(block_capacity: usize, table_capacity: usize) -> Self {
        assert!(block_capacity > 0, "block capacity must be > 0");
        Self {
            blocks: Vec::with_capacity(table_capacity),
            block_capacity,
            next_id: 0,
        }
    }

    /// Empty table that continues this table's id sequence.
    pub(crate) fn successor(&self) -> Self {
        Self {
            blocks: Vec::new(),
            block_capacity: self.block_capacity,
            next_id: self.next_id,
        }
    }

    /// Number of blocks.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub(crate) fn block_capacity(&self) -> usize {
        self.block_capacity
    }

    /// Total slot capacity.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.blocks.len() * self.block_capacity
    }

    #[inline]
    pub(crate) fn block(&self, index: usize) -> &Block<T> {
        &self.blocks[index]
    }

    #[inline]
    pub(crate) fn block_mut(&mut self, index: usize) -> &mut Block<T> {
        &mut self.blocks[index]
    }

    #[inline]
    pub(crate) fn meta(&self, block: usize, slot: usize) -> SlotMeta {
        self.blocks[block].meta(slot)
    }

    #[inline]
    pub(crate) fn is_occupied(&self, block: usize, slot: usize) -> bool {
        block < self.blocks.len() && self.blocks[block].meta(slot).is_occupied()
    }

    /// Current index of the block with the given id.
    ///
    /// Ids are strictly increasing along the table, so this is a binary search.
    pub(crate) fn find(&self, id: u64) -> Option<usize> {
        self.blocks.binary_search_by_key(&id, Block::id).ok()
    }

    /// Append one fresh block, returning its index.
    ///
    /// Both the handle slot and the block storage are reserved before the
    /// table is touched, so a failure leaves it unchanged.
    pub(crate) fn try_grow(&mut self) -> Result<usize, StoreError> {
        self.blocks
            .try_reserve(1)
            .map_err(|_| StoreError::OutOfMemory {
                block_capacity: self.block_capacity,
            })?;
        let block = Block::try_new(self.next_id, self.block_capacity)?;

        self.next_id += 1;
        self.blocks.push(block);

        let index = self.blocks.len() - 1;
        tracing::debug!(block = index, blocks = self.blocks.len(), "allocated block");
        Ok(index)
    }

    /// Destroy the block at `index`, shifting later blocks down by one.
    ///
    /// Indices of later blocks change; their ids do not.
    pub(crate) fn remove_block(&mut self, index: usize) {
        let block = self.blocks.remove(index);
        tracing::debug!(
            block = index,
            id = block.id(),
            blocks = self.blocks.len(),
            "released block"
        );
    }

    /// Release every block from `len` onwards.
    pub(crate) fn truncate(&mut self, len: usize) {
        if len < self.blocks.len() {
            tracing::debug!(from = self.blocks.len(), to = len, "truncated block table");
            self.blocks.truncate(len);
        }
    }

    /// Release every block.
    pub(crate) fn clear(&mut self) {
        if !self.blocks.is_empty() {
            tracing::debug!(blocks = self.blocks.len(), "cleared block table");
        }
        self.blocks.clear();
    }

    /// First free slot in traversal order. Full blocks are skipped whole.
    pub(crate) fn first_free(&self) -> Option<(usize, usize)> {
        self.blocks
            .iter()
            .enumerate()
            .find_map(|(b, block)| block.first_free().map(|s| (b, s)))
    }

    /// Linear traversal index of a slot.
    #[inline]
    pub(crate) fn linear(&self, block: usize, slot: usize) -> usize {
        block * self.block_capacity + slot
    }

    /// Slot `steps` positions after `(block, slot)`, or the end position
    /// when that runs past the last block.
    #[inline]
    pub(crate) fn step_forward(&self, block: usize, slot: usize, steps: usize) -> (usize, usize) {
        let target = self.linear(block, slot).saturating_add(steps);
        if target >= self.capacity() {
            (self.blocks.len(), 0)
        } else {
            (target / self.block_capacity, target % self.block_capacity)
        }
    }

    /// Slot immediately before `(block, slot)`; `None` at the first slot.
    ///
    /// Accepts the end position and returns the last slot.
    #[inline]
    pub(crate) fn step_back(&self, block: usize, slot: usize) -> Option<(usize, usize)> {
        if slot > 0 {
            Some((block, slot - 1))
        } else if block > 0 {
            Some((block - 1, self.block_capacity - 1))
        } else {
            None
        }
    }

    /// Deep copy preserving block ids and skip metadata.
    ///
    /// On failure every block copied so far is dropped before returning.
    pub(crate) fn try_clone(&self) -> Result<Self, StoreError>
    where
        T: Clone,
    {
        let oom = StoreError::OutOfMemory {
            block_capacity: self.block_capacity,
        };
        let mut blocks = Vec::new();
        blocks.try_reserve_exact(self.blocks.len()).map_err(|_| oom)?;
        for block in &self.blocks {
            blocks.push(block.try_clone()?);
        }
        Ok(Self {
            blocks,
            block_capacity: self.block_capacity,
            next_id: self.next_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_blocks(cap: usize, blocks: usize) -> BlockTable<u32> {
        let mut table = BlockTable::new(cap, 0);
        for _ in 0..blocks {
            table.try_grow().unwrap();
        }
        table
    }

    #[test]
    fn grow_appends_fresh_blocks() {
        let mut table = BlockTable::<u32>::new(4, 0);
        assert_eq!(table.capacity(), 0);

        assert_eq!(table.try_grow().unwrap(), 0);
        assert_eq!(table.try_grow().unwrap(), 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.capacity(), 8);
        assert_eq!(table.block(0).id(), 0);
        assert_eq!(table.block(1).id(), 1);
        assert!(table.meta(1, 3).is_free());
    }

    #[test]
    fn remove_block_shifts_later_blocks_and_keeps_ids() {
        let mut table = table_with_blocks(4, 3);
        table.remove_block(1);

        assert_eq!(table.len(), 2);
        assert_eq!(table.block(1).id(), 2);
        assert_eq!(table.find(2), Some(1));
        assert_eq!(table.find(1), None);
    }

    #[test]
    fn ids_are_not_reused_after_removal() {
        let mut table = table_with_blocks(2, 2);
        table.remove_block(1);
        table.try_grow().unwrap();
        assert_eq!(table.block(1).id(), 2);
    }

    #[test]
    fn successor_continues_id_sequence() {
        let table = table_with_blocks(2, 3);
        let mut next = table.successor();
        next.try_grow().unwrap();
        assert_eq!(next.block(0).id(), 3);
    }

    #[test]
    fn first_free_skips_full_blocks() {
        let mut table = table_with_blocks(2, 2);
        table.block_mut(0).write(0, 1);
        table.block_mut(0).write(1, 2);
        assert_eq!(table.first_free(), Some((1, 0)));

        table.block_mut(1).write(0, 3);
        assert_eq!(table.first_free(), Some((1, 1)));

        table.block_mut(1).write(1, 4);
        assert_eq!(table.first_free(), None);
    }

    #[test]
    fn step_forward_crosses_blocks_and_clamps_to_end() {
        let table = table_with_blocks(4, 3);
        assert_eq!(table.step_forward(0, 3, 1), (1, 0));
        assert_eq!(table.step_forward(0, 2, 7), (2, 1));
        assert_eq!(table.step_forward(2, 3, 1), (3, 0));
        assert_eq!(table.step_forward(1, 0, 100), (3, 0));
        assert_eq!(table.step_forward(1, 0, usize::MAX), (3, 0));
    }

    #[test]
    fn step_back_crosses_blocks() {
        let table = table_with_blocks(4, 2);
        assert_eq!(table.step_back(1, 0), Some((0, 3)));
        assert_eq!(table.step_back(1, 2), Some((1, 1)));
        assert_eq!(table.step_back(0, 0), None);
        // From end
        assert_eq!(table.step_back(2, 0), Some((1, 3)));
    }

    #[test]
    fn clone_is_deep() {
        let mut table = table_with_blocks(2, 2);
        table.block_mut(1).write(1, 9);

        let mut copy = table.try_clone().unwrap();
        assert_eq!(copy.len(), 2);
        assert_eq!(copy.block(1).get(1), Some(&9));

        *copy.block_mut(1).get_mut(1).unwrap() = 10;
        assert_eq!(table.block(1).get(1), Some(&9));
    }

    #[test]
    #[should_panic(expected = "block capacity must be > 0")]
    fn zero_block_capacity_panics() {
        let _ = BlockTable::<u8>::new(0, 0);
    }
}
