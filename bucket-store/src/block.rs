//! A single fixed-capacity block of slots.
//!
//! The block pairs its value cells with their metadata so both are allocated,
//! moved and released as one unit. Cells are `MaybeUninit` and only the
//! metadata says which of them hold a live value.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

use crate::error::StoreError;
use crate::slot::SlotMeta;

/// Fixed-capacity run of slots plus their metadata.
///
/// Cells sit behind `UnsafeCell` so a mutable iterator can hand out
/// disjoint `&mut T` while only holding the table by shared reference.
pub(crate) struct Block<T> {
    /// Stable identity. Ids grow monotonically in table order.
    id: u64,
    cells: Box<[UnsafeCell<MaybeUninit<T>>]>,
    meta: Box<[SlotMeta]>,
    /// Per-slot reuse counter, bumped each time a value leaves the slot.
    stamps: Box<[u32]>,
    /// Number of occupied slots.
    occupied: usize,
}

// SAFETY: cells are only mutated through `&mut Block` or through the
// store's `IterMut`, which requires `&mut` access to the whole store.
unsafe impl<T: Sync> Sync for Block<T> {}

impl<T> Block<T> {
    /// Allocate a block with every slot fresh-free.
    ///
    /// Every buffer is reserved fallibly; on failure nothing is retained.
    pub(crate) fn try_new(id: u64, capacity: usize) -> Result<Self, StoreError> {
        debug_assert!(capacity > 0, "block capacity must be non-zero");
        let oom = StoreError::OutOfMemory {
            block_capacity: capacity,
        };

        let mut cells: Vec<UnsafeCell<MaybeUninit<T>>> = Vec::new();
        cells.try_reserve_exact(capacity).map_err(|_| oom)?;
        cells.resize_with(capacity, || UnsafeCell::new(MaybeUninit::uninit()));

        let mut meta = Vec::new();
        meta.try_reserve_exact(capacity).map_err(|_| oom)?;
        meta.resize(capacity, SlotMeta::FRESH_FREE);

        let mut stamps = Vec::new();
        stamps.try_reserve_exact(capacity).map_err(|_| oom)?;
        stamps.resize(capacity, 0);

        Ok(Self {
            id,
            cells: cells.into_boxed_slice(),
            meta: meta.into_boxed_slice(),
            stamps: stamps.into_boxed_slice(),
            occupied: 0,
        })
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.meta.len()
    }

    #[cfg(test)]
    pub(crate) fn occupied(&self) -> usize {
        self.occupied
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.occupied == self.capacity()
    }

    #[inline]
    pub(crate) fn meta(&self, slot: usize) -> SlotMeta {
        self.meta[slot]
    }

    /// Reuse counter of a slot. Changes whenever the slot's value is taken.
    #[inline]
    pub(crate) fn stamp(&self, slot: usize) -> u32 {
        self.stamps[slot]
    }

    /// Overwrite the skip metadata of a free slot.
    #[inline]
    pub(crate) fn set_free_meta(&mut self, slot: usize, meta: SlotMeta) {
        debug_assert!(self.meta[slot].is_free(), "skip metadata on occupied slot");
        debug_assert!(meta.is_free());
        self.meta[slot] = meta;
    }

    /// First free slot in this block, if any.
    pub(crate) fn first_free(&self) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        self.meta.iter().position(|m| m.is_free())
    }

    /// Construct `value` in a free slot and mark it occupied.
    ///
    /// # Panics
    /// Panics if the slot is already occupied.
    #[inline]
    pub(crate) fn write(&mut self, slot: usize, value: T) {
        assert!(self.meta[slot].is_free(), "writing into occupied slot");
        self.cells[slot].get_mut().write(value);
        self.meta[slot] = SlotMeta::OCCUPIED;
        self.occupied += 1;
    }

    /// Move the value out of an occupied slot, leaving it fresh-free and
    /// bumping its stamp.
    ///
    /// # Panics
    /// Panics if the slot is free.
    #[inline]
    pub(crate) fn take(&mut self, slot: usize) -> T {
        assert!(self.meta[slot].is_occupied(), "taking from free slot");
        self.meta[slot] = SlotMeta::FRESH_FREE;
        self.stamps[slot] = self.stamps[slot].wrapping_add(1);
        self.occupied -= 1;
        // SAFETY: metadata said the cell was initialized, and it is now
        // marked free so it will not be read or dropped again.
        unsafe { self.cells[slot].get_mut().assume_init_read() }
    }

    #[inline]
    pub(crate) fn get(&self, slot: usize) -> Option<&T> {
        if self.meta[slot].is_occupied() {
            // SAFETY: occupied cells are initialized; no `&mut` to this cell
            // can coexist with `&self`.
            Some(unsafe { (*self.cells[slot].get()).assume_init_ref() })
        } else {
            None
        }
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, slot: usize) -> Option<&mut T> {
        if self.meta[slot].is_occupied() {
            // SAFETY: occupied cells are initialized.
            Some(unsafe { self.cells[slot].get_mut().assume_init_mut() })
        } else {
            None
        }
    }

    /// Raw pointer to the value in an occupied slot.
    ///
    /// # Safety
    /// The slot must be occupied, and the caller must guarantee no other
    /// reference to this value is live while the pointer is dereferenced.
    #[inline]
    pub(crate) unsafe fn value_ptr(&self, slot: usize) -> *mut T {
        debug_assert!(self.meta[slot].is_occupied());
        self.cells[slot].get().cast::<T>()
    }

    /// Deep copy of values, metadata and stamps.
    ///
    /// Metadata of each slot is copied only after its value is in place, so a
    /// panicking `T::clone` leaves a partial block whose `Drop` releases
    /// exactly the values already cloned.
    pub(crate) fn try_clone(&self) -> Result<Self, StoreError>
    where
        T: Clone,
    {
        let mut copy = Self::try_new(self.id, self.capacity())?;
        copy.stamps.copy_from_slice(&self.stamps);
        for slot in 0..self.capacity() {
            match self.get(slot) {
                Some(value) => copy.write(slot, value.clone()),
                None => copy.meta[slot] = self.meta[slot],
            }
        }
        Ok(copy)
    }
}

impl<T> Drop for Block<T> {
    fn drop(&mut self) {
        if self.occupied == 0 {
            return;
        }
        for (cell, meta) in self.cells.iter_mut().zip(self.meta.iter()) {
            if meta.is_occupied() {
                // SAFETY: occupied cells are initialized and dropped once.
                unsafe { cell.get_mut().assume_init_drop() };
            }
        }
    }
}
