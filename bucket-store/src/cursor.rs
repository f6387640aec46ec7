//! Positions, navigation and iteration.
//!
//! Forward steps consult the skip index and cross a run of free slots in one
//! jump when a distance is recorded. Backward steps have no index and visit
//! each free slot, so walking backward over a run costs O(run length) however
//! the run was created.

use std::iter::FusedIterator;
use std::marker::PhantomData;

use crate::skip;
use crate::table::BlockTable;
use crate::BucketStore;

/// Block id reserved for the end position.
const BLOCK_END: u64 = u64::MAX;

// =============================================================================
// Position
// =============================================================================

/// Detached locator for a slot in a [`BucketStore`].
///
/// Names a slot by the id of its block (stable while the block lives), the
/// slot index within the block, the store generation it was issued in, and
/// the slot's stamp at that time. Erasing the value bumps the stamp, so a
/// position never names a later value that reuses its slot.
///
/// Positions order like traversal: by block, then slot, with end after every
/// slot. Only positions from the same store generation compare meaningfully.
///
/// ```
/// use bucket_store::BucketStore;
///
/// let mut store = BucketStore::with_block_capacity(2);
/// let a = store.insert('a');
/// let b = store.insert('b');
/// let c = store.insert('c');
///
/// assert!(a < b && b < c);
/// assert!(c < store.end());
///
/// store.erase(b);
/// let d = store.insert('d');
/// assert_eq!(d.slot(), b.slot());
/// assert_ne!(d, b);
/// assert_eq!(store.get(b), None);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    block: u64,
    slot: usize,
    generation: u64,
    stamp: u32,
}

impl Position {
    /// The one-past-the-last position. Has no value.
    pub const END: Position = Position {
        block: BLOCK_END,
        slot: 0,
        generation: 0,
        stamp: 0,
    };

    #[inline]
    pub(crate) const fn new(block: u64, slot: usize, generation: u64, stamp: u32) -> Self {
        Self {
            block,
            slot,
            generation,
            stamp,
        }
    }

    /// Returns true for the end position.
    #[inline]
    pub const fn is_end(self) -> bool {
        self.block == BLOCK_END
    }

    /// Slot index within the block.
    #[inline]
    pub const fn slot(self) -> usize {
        self.slot
    }

    #[inline]
    pub(crate) const fn block_id(self) -> u64 {
        self.block
    }

    #[inline]
    pub(crate) const fn generation(self) -> u64 {
        self.generation
    }

    #[inline]
    pub(crate) const fn stamp(self) -> u32 {
        self.stamp
    }
}

// =============================================================================
// Raw stepping
// =============================================================================

/// Next occupied slot strictly after `(block, slot)`, or end.
#[inline]
pub(crate) fn next_occupied<T>(table: &BlockTable<T>, block: usize, slot: usize) -> (usize, usize) {
    let (block, slot) = table.step_forward(block, slot, 1);
    skip::settle_forward(table, block, slot)
}

/// Previous occupied slot strictly before `(block, slot)`.
///
/// `(block, slot)` may be end. Returns `None` if nothing is occupied before it.
#[inline]
pub(crate) fn prev_occupied<T>(
    table: &BlockTable<T>,
    block: usize,
    slot: usize,
) -> Option<(usize, usize)> {
    let (block, slot) = table.step_back(block, slot)?;
    skip::settle_backward(table, block, slot)
}

/// Double-ended walk over occupied slots shared by all iterators.
///
/// `back` is exclusive. `remaining` counts unvisited values so the two ends
/// never cross.
#[derive(Clone, Debug)]
struct Walk {
    front: (usize, usize),
    back: (usize, usize),
    remaining: usize,
}

impl Walk {
    fn new<T>(table: &BlockTable<T>, len: usize) -> Self {
        Self {
            front: skip::settle_forward(table, 0, 0),
            back: (table.len(), 0),
            remaining: len,
        }
    }

    fn next<T>(&mut self, table: &BlockTable<T>) -> Option<(usize, usize)> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.front;
        self.front = next_occupied(table, current.0, current.1);
        self.remaining -= 1;
        Some(current)
    }

    fn next_back<T>(&mut self, table: &BlockTable<T>) -> Option<(usize, usize)> {
        if self.remaining == 0 {
            return None;
        }
        let current = prev_occupied(table, self.back.0, self.back.1)?;
        self.back = current;
        self.remaining -= 1;
        Some(current)
    }
}

// =============================================================================
// Navigation
// =============================================================================

impl<T> BucketStore<T> {
    /// Position of the first value, or end if the store is empty.
    pub fn begin(&self) -> Position {
        self.position_at(skip::settle_forward(&self.table, 0, 0))
    }

    /// The end position.
    #[inline]
    pub fn end(&self) -> Position {
        Position::END
    }

    /// Position of the value following `pos`, or end.
    ///
    /// Advancing end yields end. `pos` may name a slot whose value has been
    /// erased (or replaced); the walk starts from that slot. A position whose
    /// block was released, or that predates a densify or clear, advances to
    /// end.
    pub fn advance(&self, pos: Position) -> Position {
        if pos.is_end() {
            return pos;
        }
        match self.locate(pos) {
            Some((block, slot)) => self.position_at(next_occupied(&self.table, block, slot)),
            None => Position::END,
        }
    }

    /// Position of the value preceding `pos`.
    ///
    /// Retreating end yields the last value. Retreating the first value
    /// leaves it where it is; retreating an erased slot with no value before
    /// it yields [`begin`](Self::begin). Free slots are walked one at a time.
    /// A position whose block was released, or that predates a densify or
    /// clear, retreats to end.
    pub fn retreat(&self, pos: Position) -> Position {
        let (block, slot) = if pos.is_end() {
            (self.table.len(), 0)
        } else {
            match self.locate(pos) {
                Some(raw) => raw,
                None => return Position::END,
            }
        };
        match prev_occupied(&self.table, block, slot) {
            Some(raw) => self.position_at(raw),
            None if self.contains(pos) => pos,
            None => self.begin(),
        }
    }

    /// Step `distance` values forward (positive) or backward (negative).
    ///
    /// O(|distance|); there is no indexed access.
    pub fn advance_by(&self, pos: Position, distance: isize) -> Position {
        let mut pos = pos;
        if distance >= 0 {
            for _ in 0..distance {
                pos = self.advance(pos);
            }
        } else {
            for _ in 0..distance.unsigned_abs() {
                pos = self.retreat(pos);
            }
        }
        pos
    }

    /// Iterator over shared references in traversal order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            table: &self.table,
            walk: Walk::new(&self.table, self.len),
        }
    }

    /// Iterator over mutable references in traversal order.
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut {
            walk: Walk::new(&self.table, self.len),
            table: &self.table,
            _marker: PhantomData,
        }
    }

    /// Iterator over the positions of all values in traversal order.
    pub fn positions(&self) -> Positions<'_, T> {
        Positions {
            store: self,
            walk: Walk::new(&self.table, self.len),
        }
    }

    /// Move every value out, leaving the store empty.
    ///
    /// The store is emptied immediately; values not consumed from the
    /// returned iterator are dropped with it. Outstanding positions are
    /// invalidated.
    pub fn drain(&mut self) -> IntoIter<T> {
        let emptied = Self {
            table: self.table.successor(),
            len: 0,
            generation: self.generation + 1,
        };
        std::mem::replace(self, emptied).into_iter()
    }

    /// Mutable cursor starting at the first value.
    pub fn cursor_front(&mut self) -> CursorMut<'_, T> {
        let pos = self.begin();
        CursorMut { store: self, pos }
    }

    /// Mutable cursor starting at `pos`.
    pub fn cursor_at(&mut self, pos: Position) -> CursorMut<'_, T> {
        CursorMut { store: self, pos }
    }

    /// Keep only the values for which `keep` returns true.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&mut T) -> bool,
    {
        let mut cursor = self.cursor_front();
        while let Some(value) = cursor.current_mut() {
            if keep(value) {
                cursor.move_next();
            } else {
                cursor.remove_current();
            }
        }
    }
}

// =============================================================================
// CursorMut
// =============================================================================

/// A cursor over a store with in-place removal.
///
/// # Example
///
/// ```
/// use bucket_store::BucketStore;
///
/// let mut store: BucketStore<u32> = (1..=6).collect();
///
/// let mut cursor = store.cursor_front();
/// while let Some(value) = cursor.current_mut() {
///     if *value % 2 == 0 {
///         cursor.remove_current(); // removes and advances
///     } else {
///         *value *= 10;
///         cursor.move_next();
///     }
/// }
///
/// assert_eq!(store.iter().copied().collect::<Vec<_>>(), vec![10, 30, 50]);
/// ```
pub struct CursorMut<'a, T> {
    store: &'a mut BucketStore<T>,
    pos: Position,
}

impl<'a, T> CursorMut<'a, T> {
    /// Reference to the current value, `None` at end.
    #[inline]
    pub fn current(&self) -> Option<&T> {
        self.store.get(self.pos)
    }

    /// Mutable reference to the current value, `None` at end.
    #[inline]
    pub fn current_mut(&mut self) -> Option<&mut T> {
        self.store.get_mut(self.pos)
    }

    /// Position the cursor is at.
    #[inline]
    pub fn position(&self) -> Position {
        self.pos
    }

    /// Returns true if the cursor is at end.
    #[inline]
    pub fn is_end(&self) -> bool {
        self.pos.is_end()
    }

    /// Move to the next value (or end).
    #[inline]
    pub fn move_next(&mut self) {
        self.pos = self.store.advance(self.pos);
    }

    /// Move to the previous value. Stays put on the first value.
    #[inline]
    pub fn move_prev(&mut self) {
        self.pos = self.store.retreat(self.pos);
    }

    /// Remove the current value and move to the one after it.
    ///
    /// Returns `None` (and does not move) if the cursor is at end or on an
    /// erased slot.
    pub fn remove_current(&mut self) -> Option<T> {
        let (value, next) = self.store.remove_with_next(self.pos)?;
        self.pos = next;
        Some(value)
    }

    /// Peek at the value after the current one.
    pub fn peek_next(&self) -> Option<&T> {
        self.store.get(self.store.advance(self.pos))
    }
}

// =============================================================================
// Iterators
// =============================================================================

/// Iterator over references to stored values.
pub struct Iter<'a, T> {
    table: &'a BlockTable<T>,
    walk: Walk,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let (block, slot) = self.walk.next(self.table)?;
        self.table.block(block).get(slot)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.walk.remaining, Some(self.walk.remaining))
    }
}

impl<'a, T> DoubleEndedIterator for Iter<'a, T> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        let (block, slot) = self.walk.next_back(self.table)?;
        self.table.block(block).get(slot)
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            table: self.table,
            walk: self.walk.clone(),
        }
    }
}

/// Iterator over mutable references to stored values.
pub struct IterMut<'a, T> {
    table: &'a BlockTable<T>,
    walk: Walk,
    _marker: PhantomData<&'a mut T>,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let (block, slot) = self.walk.next(self.table)?;
        // SAFETY: the walk yields each occupied slot at most once, and the
        // store is mutably borrowed for 'a.
        Some(unsafe { &mut *self.table.block(block).value_ptr(slot) })
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.walk.remaining, Some(self.walk.remaining))
    }
}

impl<'a, T> DoubleEndedIterator for IterMut<'a, T> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        let (block, slot) = self.walk.next_back(self.table)?;
        // SAFETY: see `next`.
        Some(unsafe { &mut *self.table.block(block).value_ptr(slot) })
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}
impl<T> FusedIterator for IterMut<'_, T> {}

/// Iterator over the positions of stored values.
pub struct Positions<'a, T> {
    store: &'a BucketStore<T>,
    walk: Walk,
}

impl<T> Iterator for Positions<'_, T> {
    type Item = Position;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let raw = self.walk.next(&self.store.table)?;
        Some(self.store.position_at(raw))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.walk.remaining, Some(self.walk.remaining))
    }
}

impl<T> DoubleEndedIterator for Positions<'_, T> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        let raw = self.walk.next_back(&self.store.table)?;
        Some(self.store.position_at(raw))
    }
}

impl<T> ExactSizeIterator for Positions<'_, T> {}
impl<T> FusedIterator for Positions<'_, T> {}

/// Owning iterator. Values not yielded are dropped with it.
pub struct IntoIter<T> {
    store: BucketStore<T>,
    walk: Walk,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let (block, slot) = self.walk.next(&self.store.table)?;
        self.store.len -= 1;
        Some(self.store.table.block_mut(block).take(slot))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.walk.remaining, Some(self.walk.remaining))
    }
}

impl<T> DoubleEndedIterator for IntoIter<T> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        let (block, slot) = self.walk.next_back(&self.store.table)?;
        self.store.len -= 1;
        Some(self.store.table.block_mut(block).take(slot))
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {}
impl<T> FusedIterator for IntoIter<T> {}

impl<T> IntoIterator for BucketStore<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        let walk = Walk::new(&self.table, self.len);
        IntoIter { store: self, walk }
    }
}

impl<'a, T> IntoIterator for &'a BucketStore<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T> IntoIterator for &'a mut BucketStore<T> {
    type Item = &'a mut T;
    type IntoIter = IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
