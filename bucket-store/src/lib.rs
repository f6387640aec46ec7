//! bucket-store - block-allocated object store with stable positions.
//!
//! Values live in fixed-capacity blocks (default 64 slots). Inserting hands
//! back a [`Position`] that keeps naming the same value until that value is
//! erased, no matter what else is inserted or erased around it. Removal never
//! compacts: the slot is marked free and reused by a later insert, and a
//! block is released the moment its last value goes away.
//!
//! Traversal is ordered block-major, slot-minor. Free slots carry a forward
//! skip distance so iterating over a store full of holes jumps over each run
//! of removals in one step instead of probing every empty slot.
//!
//! # Example
//!
//! ```
//! use bucket_store::{BucketStore, StoreBuilder};
//!
//! let mut store: BucketStore<u64> = StoreBuilder::default().block_capacity(4).build();
//!
//! let a = store.insert(1);
//! let b = store.insert(2);
//! let c = store.insert(3);
//!
//! // Erasing returns the position of the next value in traversal order.
//! assert_eq!(store.erase(b), c);
//! assert_eq!(store.get(a), Some(&1));
//! assert_eq!(store.iter().copied().collect::<Vec<_>>(), vec![1, 3]);
//!
//! // The freed slot is reused.
//! store.insert(4);
//! assert_eq!(store.iter().copied().collect::<Vec<_>>(), vec![1, 4, 3]);
//! ```
//!
//! # Layout
//!
//! ```text
//! block 0            block 1            block 2
//! [a][b][ ][ ]  ->   [ ][ ][ ][c]  ->   [d][ ][e][ ]
//!        3  2         1  ...                 1
//!        skip distances point at the next occupied slot
//! ```
//!
//! # Positions
//!
//! A [`Position`] is a detached `(block id, slot, generation, stamp)` value,
//! not a borrow, so it can be stored and passed around freely. It is resolved
//! against the store on every use:
//!
//! - Positions of live values stay valid across any other insert or erase,
//!   including ones that release earlier blocks.
//! - Once its value is erased a position stops resolving, even after a later
//!   insert reuses the slot. It can still be advanced from.
//! - [`BucketStore::shrink_to_fit`], [`BucketStore::clear`] and
//!   [`BucketStore::drain`] invalidate every outstanding position; lookups
//!   through them return `None`.
//! - A position is only meaningful for the store that produced it (or a
//!   clone of it). Using it with an unrelated store is a logic error.
//!
//! # Thread safety
//!
//! The store has no internal synchronization. Every mutating operation takes
//! `&mut self`, so concurrent mutation needs an external lock.

#![warn(missing_docs)]

mod block;
mod cursor;
mod error;
mod skip;
mod slot;
mod table;

pub use cursor::{CursorMut, IntoIter, Iter, IterMut, Position, Positions};
pub use error::StoreError;

use std::alloc::{Layout, handle_alloc_error};
use std::fmt;

use table::BlockTable;

/// Slots per block when none is configured.
pub const DEFAULT_BLOCK_CAPACITY: usize = 64;

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`BucketStore`].
///
/// ```
/// use bucket_store::{BucketStore, StoreBuilder};
///
/// let store: BucketStore<String> = StoreBuilder::default()
///     .block_capacity(128)
///     .table_capacity(16)
///     .build();
/// assert_eq!(store.block_capacity(), 128);
/// assert_eq!(store.capacity(), 0);
/// ```
#[derive(Clone, Debug)]
pub struct StoreBuilder {
    block_capacity: usize,
    table_capacity: usize,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self {
            block_capacity: DEFAULT_BLOCK_CAPACITY,
            table_capacity: 0,
        }
    }
}

impl StoreBuilder {
    /// Slots per block. Default: 64.
    ///
    /// Must be non-zero.
    pub fn block_capacity(mut self, slots: usize) -> Self {
        self.block_capacity = slots;
        self
    }

    /// Pre-reserve room for this many block handles.
    ///
    /// No blocks are allocated up front; capacity still starts at zero.
    pub fn table_capacity(mut self, blocks: usize) -> Self {
        self.table_capacity = blocks;
        self
    }

    /// Build an empty store.
    ///
    /// # Panics
    /// Panics if the block capacity is zero.
    pub fn build<T>(self) -> BucketStore<T> {
        BucketStore {
            table: BlockTable::new(self.block_capacity, self.table_capacity),
            len: 0,
            generation: 0,
        }
    }
}

// =============================================================================
// BucketStore
// =============================================================================

/// Block-allocated object store with stable positions.
///
/// See the [crate docs](crate) for an overview.
pub struct BucketStore<T> {
    table: BlockTable<T>,
    len: usize,
    /// Bumped whenever values relocate or are dropped wholesale.
    generation: u64,
}

impl<T> BucketStore<T> {
    /// Create an empty store with 64-slot blocks.
    pub fn new() -> Self {
        StoreBuilder::default().build()
    }

    /// Create an empty store with `slots` slots per block.
    ///
    /// # Panics
    /// Panics if `slots` is zero.
    pub fn with_block_capacity(slots: usize) -> Self {
        StoreBuilder::default().block_capacity(slots).build()
    }

    /// Insert a value into the first free slot, growing by one block if full.
    ///
    /// On allocation failure the store is unchanged and `value` is dropped.
    pub fn try_insert(&mut self, value: T) -> Result<Position, StoreError> {
        if self.len == self.table.capacity() {
            self.table.try_grow()?;
        }

        let Some((block, slot)) = self.table.first_free() else {
            unreachable!("store below capacity has a free slot");
        };

        self.table.block_mut(block).write(slot, value);
        self.len += 1;
        skip::back_patch(&mut self.table, block, slot);

        Ok(self.position_at((block, slot)))
    }

    /// Insert a value, returning its position.
    ///
    /// Aborts via [`handle_alloc_error`] if a new block cannot be allocated.
    pub fn insert(&mut self, value: T) -> Position {
        match self.try_insert(value) {
            Ok(pos) => pos,
            Err(_) => handle_alloc_error(self.block_layout()),
        }
    }

    /// Remove and return the value at `pos`.
    ///
    /// Returns `None` if that value is no longer stored.
    pub fn remove(&mut self, pos: Position) -> Option<T> {
        self.remove_with_next(pos).map(|(value, _)| value)
    }

    /// Erase the value at `pos`, returning the position that follows it.
    ///
    /// Erasing a position whose value is no longer stored (already erased,
    /// stale, end, or any position on an empty store) is a silent no-op that
    /// returns the end position. Use [`try_erase`] to have that reported
    /// instead.
    ///
    /// Costs O(1) plus the length of the free run in front of the successor,
    /// whose skip distances are rewritten.
    ///
    /// [`try_erase`]: BucketStore::try_erase
    pub fn erase(&mut self, pos: Position) -> Position {
        self.try_erase(pos).unwrap_or(Position::END)
    }

    /// Erase the value at `pos`, returning the position that follows it.
    ///
    /// Fails with [`StoreError::InvalidPosition`] if the value `pos` was
    /// issued for is no longer stored; the store is left untouched in that
    /// case.
    pub fn try_erase(&mut self, pos: Position) -> Result<Position, StoreError> {
        self.remove_with_next(pos)
            .map(|(_, next)| next)
            .ok_or(StoreError::InvalidPosition)
    }

    /// Shared reference to the value at `pos`.
    ///
    /// `None` once that value has been erased, even if a later insert reused
    /// the slot.
    pub fn get(&self, pos: Position) -> Option<&T> {
        let (block, slot) = self.resolve(pos)?;
        self.table.block(block).get(slot)
    }

    /// Mutable reference to the value at `pos`.
    pub fn get_mut(&mut self, pos: Position) -> Option<&mut T> {
        let (block, slot) = self.resolve(pos)?;
        self.table.block_mut(block).get_mut(slot)
    }

    /// Returns true if the value `pos` was issued for is still stored.
    pub fn contains(&self, pos: Position) -> bool {
        self.resolve(pos).is_some()
    }

    /// Current block index of the value at `pos`.
    ///
    /// Indices shift down when an earlier block is released; the position
    /// itself does not.
    pub fn block_index(&self, pos: Position) -> Option<usize> {
        self.resolve(pos).map(|(block, _)| block)
    }

    /// Relocate every value to the front of the block sequence, preserving
    /// traversal order, and release the blocks left empty.
    ///
    /// Afterwards `capacity() == ceil(len / block_capacity) * block_capacity`.
    /// Every outstanding [`Position`] is invalidated.
    pub fn shrink_to_fit(&mut self) {
        let cap = self.table.block_capacity();
        let mut dst = 0;

        for block in 0..self.table.len() {
            for slot in 0..cap {
                if !self.table.meta(block, slot).is_occupied() {
                    continue;
                }
                if self.table.linear(block, slot) != dst {
                    let value = self.table.block_mut(block).take(slot);
                    self.table.block_mut(dst / cap).write(dst % cap, value);
                }
                dst += 1;
            }
        }
        debug_assert_eq!(dst, self.len);

        self.table.truncate(self.len.div_ceil(cap));

        // Distances recorded before the move describe slots that no longer exist.
        for linear in self.len..self.table.capacity() {
            self.table
                .block_mut(linear / cap)
                .set_free_meta(linear % cap, slot::SlotMeta::FRESH_FREE);
        }

        self.generation += 1;
        tracing::debug!(len = self.len, blocks = self.table.len(), "densified store");
    }

    /// Drop every value and release every block.
    ///
    /// Every outstanding [`Position`] is invalidated.
    pub fn clear(&mut self) {
        self.table.clear();
        self.len = 0;
        self.generation += 1;
    }

    /// Exchange contents with `other` in O(1).
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// Deep copy, reporting allocation failure instead of aborting.
    ///
    /// Positions obtained from `self` resolve to the corresponding values in
    /// the copy. On failure, or if `T::clone` panics, everything copied so
    /// far is dropped and `self` is untouched.
    pub fn try_clone(&self) -> Result<Self, StoreError>
    where
        T: Clone,
    {
        Ok(Self {
            table: self.table.try_clone()?,
            len: self.len,
            generation: self.generation,
        })
    }

    /// Number of stored values.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no values are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total slots across all allocated blocks.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Slots per block.
    #[inline]
    pub fn block_capacity(&self) -> usize {
        self.table.block_capacity()
    }

    /// Number of allocated blocks.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.table.len()
    }
}

// =============================================================================
// Internal
// =============================================================================

impl<T> BucketStore<T> {
    /// Map a position to `(block index, slot)` if its block still exists.
    ///
    /// The slot may be free, or hold a value inserted after `pos` was issued.
    /// Navigation starts from here.
    fn locate(&self, pos: Position) -> Option<(usize, usize)> {
        if pos.is_end() || pos.generation() != self.generation {
            return None;
        }
        if pos.slot() >= self.table.block_capacity() {
            return None;
        }
        let block = self.table.find(pos.block_id())?;
        Some((block, pos.slot()))
    }

    /// Like [`locate`](Self::locate), but only if the slot still holds the
    /// value `pos` was issued for.
    fn resolve(&self, pos: Position) -> Option<(usize, usize)> {
        let (block, slot) = self.locate(pos)?;
        let target = self.table.block(block);
        if target.meta(slot).is_occupied() && target.stamp(slot) == pos.stamp() {
            Some((block, slot))
        } else {
            None
        }
    }

    /// Public position for a raw `(block, slot)`; `(len, 0)` maps to end.
    fn position_at(&self, (block, slot): (usize, usize)) -> Position {
        if block >= self.table.len() {
            Position::END
        } else {
            let target = self.table.block(block);
            Position::new(target.id(), slot, self.generation, target.stamp(slot))
        }
    }

    /// Erase core: take the value, release its block if now empty, and
    /// refresh the skip distances leading up to the successor.
    fn remove_with_next(&mut self, pos: Position) -> Option<(T, Position)> {
        let (block, slot) = self.resolve(pos)?;

        // Successor is fixed by block id before any block moves.
        let (next_block, next_slot) = cursor::next_occupied(&self.table, block, slot);
        let next = self.position_at((next_block, next_slot));

        let value = self.table.block_mut(block).take(slot);
        self.len -= 1;

        let mut next_block = next_block;
        if self.table.block(block).is_empty() {
            self.table.remove_block(block);
            debug_assert!(next_block > block);
            next_block -= 1;
        }

        // Covers the erased slot, the free run before it, and any distances
        // that spanned a released block.
        if next_block < self.table.len() {
            skip::back_patch(&mut self.table, next_block, next_slot);
        }

        Some((value, next))
    }

    fn block_layout(&self) -> Layout {
        Layout::array::<T>(self.table.block_capacity()).unwrap_or_else(|_| Layout::new::<T>())
    }
}

// =============================================================================
// Trait impls
// =============================================================================

impl<T> Default for BucketStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for BucketStore<T> {
    /// Deep copy. Aborts via [`handle_alloc_error`] on allocation failure.
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(copy) => copy,
            Err(_) => handle_alloc_error(self.block_layout()),
        }
    }

    /// Copy is built in full before `self` is touched; a panicking
    /// `T::clone` leaves `self` as it was.
    fn clone_from(&mut self, source: &Self) {
        let copy = source.clone();
        *self = copy;
    }
}

impl<T: fmt::Debug> fmt::Debug for BucketStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> Extend<T> for BucketStore<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

impl<T> FromIterator<T> for BucketStore<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut store = Self::new();
        store.extend(iter);
        store
    }
}
